// src/plan.rs

//! The `plan` command: validate a definitions file and show what an
//! install would do, grouped into phases by DAG level.

use anyhow::Result;

use helmdag::{validate_charts, Chart, ChartGraph};

use crate::cli::PlanArgs;
use crate::config;

pub fn run(args: &PlanArgs) -> Result<()> {
    let definitions = config::load_and_validate(&args.file)?;
    let charts = config::definitions_to_charts(&definitions)?;
    validate_charts(&charts)?;
    let graph = ChartGraph::build(&charts)?;

    if args.graphviz {
        print!("{}", graph.to_dot());
        return Ok(());
    }
    print_phases(&graph, &charts);
    Ok(())
}

fn print_phases(graph: &ChartGraph, charts: &[Chart]) {
    let max_level = graph
        .names()
        .filter_map(|n| graph.level_of(n))
        .max()
        .unwrap_or(0);

    println!("{} charts, {} phases", charts.len(), max_level + 1);
    for level in 0..=max_level {
        println!("Phase {}:", level + 1);
        // Topological order keeps the listing stable between runs.
        for name in graph.topo_order() {
            if graph.level_of(name) != Some(level) {
                continue;
            }
            let title = graph.title_of(name).unwrap_or(name);
            let deps = graph.dependencies_of(name);
            if deps.is_empty() {
                println!("  - {title}");
            } else {
                println!("  - {title} (after: {})", deps.join(", "));
            }
        }
    }
}

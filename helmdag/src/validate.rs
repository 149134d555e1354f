// src/validate.rs

//! Chart-set validation: the gatekeeper run before any graph is walked.

use std::collections::HashSet;

use thiserror::Error;

use crate::chart::Chart;
use crate::dag::ChartGraph;

/// Why a chart set was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no charts were supplied")]
    NoCharts,

    #[error("empty title for chart at offset {0}")]
    EmptyTitle(usize),

    #[error("empty location for chart '{title}' (offset {offset})")]
    EmptyLocation { title: String, offset: usize },

    #[error("duplicate chart title '{0}'")]
    DuplicateTitle(String),

    #[error("chart '{chart}' has unknown dependency '{dependency}'")]
    UnknownDependency { chart: String, dependency: String },

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },
}

/// Run semantic validation against a chart set.
///
/// This checks:
/// - the set is non-empty
/// - every `title` and `location` is non-empty
/// - titles are unique (including after [`Chart::name`] sanitization,
///   since that key indexes the graph)
/// - every dependency refers to another chart's title in the same set
/// - the dependency graph is acyclic (via a trial graph build)
pub fn validate_charts(charts: &[Chart]) -> Result<(), ValidationError> {
    if charts.is_empty() {
        return Err(ValidationError::NoCharts);
    }
    ensure_fields(charts)?;
    ensure_unique_titles(charts)?;
    ensure_known_dependencies(charts)?;
    // Cycles (and anything the checks above missed) surface here.
    ChartGraph::build(charts)?;
    Ok(())
}

fn ensure_fields(charts: &[Chart]) -> Result<(), ValidationError> {
    for (offset, chart) in charts.iter().enumerate() {
        if chart.title.is_empty() {
            return Err(ValidationError::EmptyTitle(offset));
        }
        if chart.location.is_empty() {
            return Err(ValidationError::EmptyLocation {
                title: chart.title.clone(),
                offset,
            });
        }
    }
    Ok(())
}

fn ensure_unique_titles(charts: &[Chart]) -> Result<(), ValidationError> {
    let mut seen: HashSet<String> = HashSet::new();
    for chart in charts {
        if !seen.insert(chart.name()) {
            return Err(ValidationError::DuplicateTitle(chart.title.clone()));
        }
    }
    Ok(())
}

fn ensure_known_dependencies(charts: &[Chart]) -> Result<(), ValidationError> {
    for chart in charts {
        for dep in &chart.dependency_list {
            let known = charts.iter().any(|c| &c.title == dep);
            if !known {
                return Err(ValidationError::UnknownDependency {
                    chart: chart.title.clone(),
                    dependency: dep.clone(),
                });
            }
            if dep == &chart.title {
                return Err(ValidationError::DependencyCycle {
                    path: vec![chart.title.clone(), chart.title.clone()],
                });
            }
        }
    }
    Ok(())
}

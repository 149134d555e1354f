use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use helmdag::{validate_charts, Chart, ChartGraph, NodeFuture, ValidationError};
use helmdag_test_utils::builders::{sample_charts, ChartBuilder};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn build_assigns_levels_by_longest_path() -> TestResult {
    let graph = ChartGraph::build(&sample_charts())?;
    assert_eq!(graph.level_of("redis"), Some(0));
    assert_eq!(graph.level_of("someservice"), Some(0));
    assert_eq!(graph.level_of("anotherthing"), Some(1));
    assert_eq!(graph.level_of("toplevel"), Some(2));
    assert_eq!(graph.roots().len(), 2);
    Ok(())
}

#[test]
fn topological_order_respects_edges() -> TestResult {
    let graph = ChartGraph::build(&sample_charts())?;
    let order = graph.topo_order();
    let index = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(index("redis") < index("anotherthing"));
    assert!(index("anotherthing") < index("toplevel"));
    assert!(index("someservice") < index("toplevel"));
    Ok(())
}

#[test]
fn validation_rejects_cycles() {
    let mut charts = sample_charts();
    // redis -> anotherthing -> redis
    charts[3].dependency_list = vec!["anotherthing".to_string()];

    let err = validate_charts(&charts).expect_err("cycle must be rejected");
    assert!(err.to_string().contains("cycle"), "got: {err}");
    if let ValidationError::DependencyCycle { path } = err {
        assert!(path.len() >= 3);
        assert_eq!(path.first(), path.last());
    } else {
        panic!("expected DependencyCycle");
    }
}

#[test]
fn validation_rejects_self_dependency() {
    let charts = vec![ChartBuilder::new("solo").depends_on("solo").build()];
    let err = validate_charts(&charts).expect_err("self-dependency must be rejected");
    assert!(err.to_string().contains("cycle"), "got: {err}");
}

#[test]
fn validation_rejects_unknown_dependency() {
    let charts = vec![ChartBuilder::new("web").depends_on("ghost").build()];
    let err = validate_charts(&charts).expect_err("dangling edge must be rejected");
    assert!(matches!(
        err,
        ValidationError::UnknownDependency { ref dependency, .. } if dependency == "ghost"
    ));
}

#[test]
fn validation_rejects_duplicate_titles() {
    let charts = vec![
        ChartBuilder::new("redis").build(),
        ChartBuilder::new("redis").build(),
    ];
    let err = validate_charts(&charts).expect_err("duplicate titles must be rejected");
    assert!(matches!(err, ValidationError::DuplicateTitle(ref t) if t == "redis"));
}

#[test]
fn validation_rejects_titles_that_collide_after_sanitization() {
    let charts = vec![
        ChartBuilder::new("My Service").build(),
        ChartBuilder::new("my-service").build(),
    ];
    assert!(matches!(
        validate_charts(&charts),
        Err(ValidationError::DuplicateTitle(_))
    ));
}

#[test]
fn validation_rejects_empty_fields() {
    assert!(matches!(
        validate_charts(&[]),
        Err(ValidationError::NoCharts)
    ));

    let untitled = Chart {
        location: "/charts/x".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        validate_charts(&[untitled]),
        Err(ValidationError::EmptyTitle(0))
    ));

    let homeless = ChartBuilder::new("web").location("").build();
    assert!(matches!(
        validate_charts(&[homeless]),
        Err(ValidationError::EmptyLocation { .. })
    ));
}

/// Random acyclic chart sets: chart `i` may only depend on charts `< i`.
fn charts_strategy(max: usize) -> impl Strategy<Value = Vec<Chart>> {
    (2..=max).prop_flat_map(|n| {
        proptest::collection::vec(
            proptest::collection::vec(any::<prop::sample::Index>(), 0..3),
            n,
        )
        .prop_map(move |raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, picks)| {
                    let mut builder = ChartBuilder::new(&format!("chart-{i}"));
                    if i > 0 {
                        let mut seen = HashSet::new();
                        for pick in picks {
                            let dep = pick.index(i);
                            if seen.insert(dep) {
                                builder = builder.depends_on(&format!("chart-{dep}"));
                            }
                        }
                    }
                    builder.build()
                })
                .collect()
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For every edge u->v, visitor(u) finishes before visitor(v) starts,
    /// and every node is visited exactly once.
    #[test]
    fn walk_respects_every_edge(charts in charts_strategy(12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let graph = ChartGraph::build(&charts).expect("acyclic by construction");
            let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
            let visitor_log = Arc::clone(&log);
            graph
                .walk(&CancellationToken::new(), move |name| -> NodeFuture {
                    let log = Arc::clone(&visitor_log);
                    Box::pin(async move {
                        log.lock().unwrap().push(format!("start:{name}"));
                        tokio::task::yield_now().await;
                        log.lock().unwrap().push(format!("end:{name}"));
                        Ok(())
                    })
                })
                .await
                .expect("walk succeeds");

            let events = log.lock().unwrap().clone();
            let position = |needle: &str| events.iter().position(|e| e == needle);
            for chart in &charts {
                let name = chart.name();
                let start_key = format!("start:{}", name);
                prop_assert!(position(&start_key).is_some());
                for dep in &chart.dependency_list {
                    let dep_name = dep.to_lowercase();
                    let dep_end = position(&format!("end:{}", dep_name)).expect("dep visited");
                    let start = position(&format!("start:{}", name)).expect("node visited");
                    prop_assert!(dep_end < start, "edge {dep} -> {} violated", chart.title);
                }
            }
            prop_assert_eq!(events.len(), charts.len() * 2);
            Ok(())
        })?;
    }
}

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use helmdag::{
    Error as HelmdagError, HealthIndication, InstallOptions, Manager, ManagerConfig,
};
use helmdag_test_utils::builders::ChartBuilder;
use helmdag_test_utils::fakes::{crashed_pod, deployment, replica_set, FakeCluster, FakeHelm};

type TestResult = Result<(), Box<dyn Error>>;

fn fast_config() -> ManagerConfig {
    ManagerConfig {
        poll_interval: Duration::from_millis(10),
        retry_delay: Duration::from_millis(10),
        max_log_lines: Some(50),
    }
}

fn manager(
    cluster: &Arc<FakeCluster>,
    helm: &Arc<FakeHelm>,
) -> Manager<Arc<FakeCluster>, Arc<FakeHelm>> {
    Manager::with_config(Arc::clone(cluster), Arc::clone(helm), fast_config())
}

#[tokio::test]
async fn one_ready_pod_satisfies_at_least_one() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let dep = deployment("default", "web", 3, &[("app", "web")]);
    cluster.add_replica_set(replica_set(&dep, "web-abc123", 1));
    cluster.add_deployment(dep);

    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = vec![ChartBuilder::new("web")
        .wait_for_deployment("web")
        .health(HealthIndication::AtLeastOnePodHealthy)
        .build()];

    let releases = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await?;
    assert_eq!(releases.len(), 1);
    Ok(())
}

#[tokio::test]
async fn all_pods_healthy_waits_for_the_rollout() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let dep = deployment("default", "web", 3, &[("app", "web")]);
    cluster.add_replica_set(replica_set(&dep, "web-abc123", 1));
    cluster.add_deployment(dep);

    // The rollout completes while the poller is ticking.
    {
        let cluster = Arc::clone(&cluster);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            cluster.set_ready_replicas("web-abc123", 3);
        });
    }

    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = vec![ChartBuilder::new("web")
        .wait_for_deployment("web")
        .health(HealthIndication::AllPodsHealthy)
        .wait_timeout(Duration::from_secs(5))
        .build()];

    let releases = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await?;
    assert_eq!(releases["web"], "web");
    Ok(())
}

#[tokio::test]
async fn wait_timeout_mentions_timeout_and_carries_diagnostics() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let dep = deployment("default", "web", 2, &[("app", "web")]);
    cluster.add_replica_set(replica_set(&dep, "web-abc123", 0));
    cluster.add_deployment(dep);
    cluster.add_pod(crashed_pod("default", "web-abc123-x1", &[("app", "web")], "web", 1));
    cluster.set_log("web-abc123-x1", "web", "panic: connection refused\n");

    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = vec![ChartBuilder::new("web")
        .wait_for_deployment("web")
        .health(HealthIndication::AllPodsHealthy)
        .wait_timeout(Duration::from_millis(60))
        .build()];

    let err = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await
        .expect_err("unready deployment must time out");

    assert!(err.to_string().contains("timeout"), "got: {err}");
    let diagnostics = err.diagnostics().expect("diagnostics collected");
    let failed = &diagnostics.failed_deployments["web"];
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "web-abc123-x1");
    assert_eq!(failed[0].logs["web"], "panic: connection refused\n");
    Ok(())
}

#[tokio::test]
async fn missing_deployment_fails_the_readiness_check() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = vec![ChartBuilder::new("web")
        .wait_for_deployment("web")
        .health(HealthIndication::AtLeastOnePodHealthy)
        .wait_timeout(Duration::from_secs(5))
        .build()];

    let err = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await
        .expect_err("absent deployment must fail");
    assert!(matches!(err, HelmdagError::ReadinessCheck { ref chart, .. } if chart == "web"));
    Ok(())
}

#[tokio::test]
async fn helm_wait_skips_the_poller() -> TestResult {
    // No deployment exists, but wait_until_helm_ready trusts the
    // installer's readiness signal, so the poller never runs.
    let cluster = Arc::new(FakeCluster::new());
    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = vec![ChartBuilder::new("web")
        .wait_for_deployment("web")
        .health(HealthIndication::AllPodsHealthy)
        .helm_wait()
        .build()];

    let releases = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await?;
    assert_eq!(releases.len(), 1);
    Ok(())
}

#[tokio::test]
async fn cancellation_interrupts_polling() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let dep = deployment("default", "web", 2, &[("app", "web")]);
    cluster.add_replica_set(replica_set(&dep, "web-abc123", 0));
    cluster.add_deployment(dep);

    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = vec![ChartBuilder::new("web")
        .wait_for_deployment("web")
        .health(HealthIndication::AllPodsHealthy)
        .wait_timeout(Duration::from_secs(30))
        .build()];

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let err = mgr
        .install(&token, &charts, InstallOptions::new())
        .await
        .expect_err("cancelled poll must fail");
    assert!(matches!(err, HelmdagError::Cancelled));
    Ok(())
}

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use helmdag::{ChartError, Error as HelmdagError, InstallOptions, Manager, ManagerConfig};
use helmdag_test_utils::builders::ChartBuilder;
use helmdag_test_utils::fakes::{
    crashed_pod, daemon_set, deployment, job, pod, FakeCluster, FakeHelm,
};

type TestResult = Result<(), Box<dyn Error>>;

const MANIFEST: &str = r#"
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
---
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
---
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: agent
---
apiVersion: v1
kind: Pod
metadata:
  name: solo
---
apiVersion: v1
kind: Service
metadata:
  name: web
"#;

fn cluster_with_release_fixtures() -> FakeCluster {
    let cluster = FakeCluster::new();
    cluster.add_deployment(deployment("default", "web", 2, &[("app", "web")]));
    cluster.add_job(job("default", "migrate", &[("job-name", "migrate")]));
    cluster
}

#[tokio::test]
async fn populate_from_release_collects_each_workload_kind() -> TestResult {
    let cluster = FakeCluster::new();
    cluster.add_deployment(deployment("default", "web", 2, &[("app", "web")]));
    cluster.add_job(job("default", "migrate", &[("job-name", "migrate")]));
    cluster.add_daemon_set(daemon_set("default", "agent", &[("app", "agent")]));

    cluster.add_pod(crashed_pod("default", "web-1", &[("app", "web")], "web", 1));
    cluster.add_pod(pod("default", "web-2", &[("app", "web")], "Running"));
    cluster.add_pod(crashed_pod(
        "default",
        "migrate-1",
        &[("job-name", "migrate")],
        "migrate",
        2,
    ));
    cluster.add_pod(pod("default", "agent-1", &[("app", "agent")], "Running"));
    cluster.add_pod(crashed_pod("default", "solo", &[], "solo", 137));
    cluster.set_log("web-1", "web", "listen: address already in use\n");
    cluster.set_log("migrate-1", "migrate", "migration 007 failed\n");
    cluster.set_log("solo", "solo", "oom\n");

    let mut detail = ChartError::new();
    detail
        .populate_from_release(&cluster, "default", MANIFEST, Some(100))
        .await?;

    let web = &detail.failed_deployments["web"];
    assert_eq!(web.len(), 1);
    assert_eq!(web[0].name, "web-1");
    assert_eq!(web[0].phase, "Failed");
    assert_eq!(web[0].logs["web"], "listen: address already in use\n");

    let migrate = &detail.failed_jobs["migrate"];
    assert_eq!(migrate.len(), 1);
    assert_eq!(migrate[0].logs["migrate"], "migration 007 failed\n");

    // Every agent pod is healthy.
    assert!(detail.failed_daemon_sets["agent"].is_empty());

    assert_eq!(detail.failed_pods.len(), 1);
    assert_eq!(detail.failed_pods[0].name, "solo");
    assert_eq!(detail.failed_pods[0].logs["solo"], "oom\n");
    Ok(())
}

#[tokio::test]
async fn running_and_succeeded_pods_are_not_failures() -> TestResult {
    let cluster = FakeCluster::new();
    cluster.add_deployment(deployment("default", "web", 2, &[("app", "web")]));
    cluster.add_pod(pod("default", "web-1", &[("app", "web")], "Running"));
    cluster.add_pod(pod("default", "web-2", &[("app", "web")], "Succeeded"));
    cluster.add_pod(pod("default", "web-3", &[("app", "web")], "Pending"));

    let mut detail = ChartError::new();
    detail
        .populate_from_deployment(&cluster, "default", "web", None)
        .await?;

    let web = &detail.failed_deployments["web"];
    assert_eq!(web.len(), 1);
    assert_eq!(web[0].name, "web-3");
    assert_eq!(web[0].phase, "Pending");
    Ok(())
}

#[tokio::test]
async fn pod_list_failure_is_reported_as_such() {
    let cluster = cluster_with_release_fixtures();
    cluster.fail_pod_lists();

    let mut detail = ChartError::new();
    let err = detail
        .populate_from_release(&cluster, "default", MANIFEST, None)
        .await
        .expect_err("pod list failure must surface");
    assert!(matches!(err, HelmdagError::ListPods { .. }));
}

#[tokio::test]
async fn log_fetch_failure_is_reported_as_such() {
    let cluster = FakeCluster::new();
    cluster.add_deployment(deployment("default", "web", 2, &[("app", "web")]));
    cluster.add_pod(crashed_pod("default", "web-1", &[("app", "web")], "web", 1));
    cluster.fail_log_fetch();

    let mut detail = ChartError::new();
    let err = detail
        .populate_from_deployment(&cluster, "default", "web", Some(10))
        .await
        .expect_err("log fetch failure must surface");
    assert!(matches!(
        err,
        HelmdagError::LogFetch { ref pod, ref container, .. }
            if pod == "web-1" && container == "web"
    ));
}

#[test]
fn display_summarises_counts() {
    let mut detail = ChartError::new();
    detail.failed_deployments.insert("web".into(), Vec::new());
    detail.failed_jobs.insert("migrate".into(), Vec::new());
    assert_eq!(
        detail.to_string(),
        "failed resources: deployments: 1; jobs: 1; pods: 0; daemonsets: 0"
    );
}

#[tokio::test]
async fn failed_install_is_enriched_from_the_release_manifest() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    cluster.add_deployment(deployment("default", "web", 2, &[("app", "web")]));
    cluster.add_pod(crashed_pod("default", "web-1", &[("app", "web")], "web", 1));
    cluster.set_log("web-1", "web", "no such host\n");

    let helm = Arc::new(FakeHelm::new());
    helm.fail_release("web");
    helm.set_manifest(
        "web",
        "---\nkind: Deployment\nmetadata:\n  name: web\n",
    );

    let config = ManagerConfig {
        poll_interval: Duration::from_millis(10),
        retry_delay: Duration::from_millis(10),
        max_log_lines: Some(20),
    };
    let mgr = Manager::with_config(Arc::clone(&cluster), Arc::clone(&helm), config);
    let charts = vec![ChartBuilder::new("web").build()];

    let err = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await
        .expect_err("install must fail");

    assert!(matches!(err, HelmdagError::InstallFailed { ref chart, .. } if chart == "web"));
    let diagnostics = err.diagnostics().expect("diagnostics attached");
    assert_eq!(diagnostics.failed_deployments["web"][0].logs["web"], "no such host\n");
    Ok(())
}

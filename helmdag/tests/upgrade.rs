use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use helmdag::{Error as HelmdagError, InstallOptions, Manager, ManagerConfig};
use helmdag_test_utils::builders::sample_charts;
use helmdag_test_utils::fakes::{FakeCluster, FakeHelm};

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
async fn upgrade_walks_every_release() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = sample_charts();

    let releases = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await?;
    mgr.upgrade(
        &CancellationToken::new(),
        &releases,
        &charts,
        InstallOptions::new(),
    )
    .await?;

    let upgrades: Vec<String> = helm
        .events()
        .iter()
        .filter_map(|e| e.strip_prefix("upgrade:").map(str::to_string))
        .collect();
    assert_eq!(upgrades.len(), 4);
    // Dependency order holds for upgrades too.
    let index = |needle: &str| upgrades.iter().position(|e| e == needle).unwrap();
    assert!(index("redis") < index("anotherthing"));
    assert!(index("anotherthing") < index("toplevel"));
    Ok(())
}

#[tokio::test]
async fn upgrade_fails_fast_on_missing_release() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = sample_charts();

    let mut releases = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await?;
    releases.remove("toplevel");

    let err = mgr
        .upgrade(
            &CancellationToken::new(),
            &releases,
            &charts,
            InstallOptions::new(),
        )
        .await
        .expect_err("missing release must fail the upgrade");

    assert!(matches!(err, HelmdagError::MissingRelease(ref title) if title == "toplevel"));
    // Nothing was upgraded; the precondition is checked up front.
    assert!(!helm.events().iter().any(|e| e.starts_with("upgrade:")));
    Ok(())
}

#[tokio::test]
async fn failed_upgrade_reports_the_chart() -> TestResult {
    let cluster = Arc::new(FakeCluster::new());
    let helm = Arc::new(FakeHelm::new());
    let mgr = manager(&cluster, &helm);
    let charts = sample_charts();

    let releases = mgr
        .install(&CancellationToken::new(), &charts, InstallOptions::new())
        .await?;
    helm.fail_release("redis");

    let err = mgr
        .upgrade(
            &CancellationToken::new(),
            &releases,
            &charts,
            InstallOptions::new(),
        )
        .await
        .expect_err("upgrade must fail");

    assert!(matches!(err, HelmdagError::UpgradeFailed { ref chart, .. } if chart == "redis"));
    // Dependents of redis never started.
    assert!(!helm.events().iter().any(|e| e == "upgrade:anotherthing"));
    assert!(!helm.events().iter().any(|e| e == "upgrade:toplevel"));
    Ok(())
}

// src/install.rs

//! The `install` command: load definitions, connect to the cluster, and
//! drive the core manager.

use anyhow::{Context, Result};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tokio_util::sync::CancellationToken;
use tracing::info;

use helmdag::cluster::KubeCluster;
use helmdag::helm::HelmCli;
use helmdag::{release_name, Chart, InstallOptions, Manager, ManagerConfig, ReleaseMap};

use crate::cli::InstallArgs;
use crate::config;

/// Everything up to the actual install/upgrade call; failures here are
/// setup errors (exit code 1).
pub async fn prepare(
    args: &InstallArgs,
) -> Result<(Manager<KubeCluster, HelmCli>, Vec<Chart>, InstallOptions)> {
    let definitions = config::load_and_validate(&args.file)?;
    let charts = config::definitions_to_charts(&definitions)?;

    let client = kube_client(args.k8s_ctx.clone()).await?;
    let helm = HelmCli::new(args.k8s_ctx.clone());
    let manager_config = ManagerConfig {
        max_log_lines: match args.max_log_lines {
            0 => None,
            n => Some(n),
        },
        ..Default::default()
    };
    let manager = Manager::with_config(KubeCluster::new(client), helm, manager_config);

    let mut opts = InstallOptions::new();
    if let Some(ns) = &args.k8s_namespace {
        opts = opts.namespace(ns.clone());
    }
    if let Some(prefix) = &args.release_name_prefix {
        opts = opts.release_name_prefix(prefix.clone());
    }
    if let Some(timeout) = &args.timeout {
        let timeout = humantime::parse_duration(timeout)
            .with_context(|| format!("parsing timeout '{timeout}'"))?;
        opts = opts.timeout(timeout);
    }
    Ok((manager, charts, opts))
}

/// Run the install or upgrade and print the resulting release names.
pub async fn execute(
    args: &InstallArgs,
    manager: &Manager<KubeCluster, HelmCli>,
    charts: &[Chart],
    opts: InstallOptions,
) -> helmdag::Result<ReleaseMap> {
    let cancel = CancellationToken::new();
    {
        // Ctrl-C drains the walk instead of killing it mid-install.
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; cancelling");
                cancel.cancel();
            }
        });
    }

    if args.upgrade {
        let releases = expected_releases(args.release_name_prefix.as_deref(), charts);
        manager.upgrade(&cancel, &releases, charts, opts).await?;
        Ok(releases)
    } else {
        manager.install(&cancel, charts, opts).await
    }
}

/// The release names an earlier install with this prefix produced; the
/// scheduler refuses to invent names, so upgrades derive them the same
/// way installs did.
fn expected_releases(prefix: Option<&str>, charts: &[Chart]) -> ReleaseMap {
    let prefix = prefix.unwrap_or_default();
    charts
        .iter()
        .map(|c| {
            (
                c.title.clone(),
                release_name(&format!("{prefix}{}", c.title)),
            )
        })
        .collect()
}

async fn kube_client(context: Option<String>) -> Result<Client> {
    let config = match context {
        Some(context) => Config::from_kubeconfig(&KubeConfigOptions {
            context: Some(context),
            ..Default::default()
        })
        .await
        .context("loading kubeconfig")?,
        None => Config::infer().await.context("inferring kube config")?,
    };
    Client::try_from(config).context("creating Kubernetes client")
}

// src/lib.rs

//! Install and upgrade graphs of Helm charts in dependency order.
//!
//! Helm creates a release's resources all at once and leaves dependents
//! to crash-loop until their prerequisites stabilise. This crate replaces
//! that with a topologically scheduled install: charts declare
//! dependencies on each other, the [`Manager`] walks the resulting DAG
//! concurrently, and each chart proves readiness before its dependents
//! begin.
//!
//! ```no_run
//! use helmdag::{Chart, HealthIndication, InstallOptions, Manager};
//! use helmdag::cluster::KubeCluster;
//! use helmdag::helm::HelmCli;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> helmdag::Result<()> {
//! let client = kube::Client::try_default().await.expect("kube client");
//! let manager = Manager::new(KubeCluster::new(client), HelmCli::new(None));
//! let charts = vec![
//!     Chart {
//!         title: "db".into(),
//!         location: "./charts/db".into(),
//!         ..Default::default()
//!     },
//!     Chart {
//!         title: "api".into(),
//!         location: "./charts/api".into(),
//!         dependency_list: vec!["db".into()],
//!         wait_until_deployment: "api".into(),
//!         health_indication: HealthIndication::AllPodsHealthy,
//!         ..Default::default()
//!     },
//! ];
//! let releases = manager
//!     .install(&CancellationToken::new(), &charts, InstallOptions::new())
//!     .await?;
//! println!("installed {} releases", releases.len());
//! # Ok(())
//! # }
//! ```

pub mod chart;
pub mod cluster;
pub mod dag;
pub mod diagnostics;
pub mod errors;
pub mod helm;
pub mod manager;
pub mod validate;
mod wait;

pub use chart::{
    release_name, Chart, HealthIndication, DEFAULT_DEPLOYMENT_TIMEOUT, DEFAULT_NAMESPACE,
    MAX_RELEASE_NAME_LEN,
};
pub use dag::{ChartGraph, NodeFuture};
pub use diagnostics::{ChartError, FailedPod};
pub use errors::{Error, Result};
pub use manager::{
    CallbackAction, CompletedCallback, InstallCallback, InstallOptions, Manager, ManagerConfig,
    ReleaseMap,
};
pub use validate::{validate_charts, ValidationError};

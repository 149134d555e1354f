// src/errors.rs

//! Crate-wide error types.
//!
//! Anything that halts an install or upgrade surfaces as an [`Error`].
//! Adapter-level failures (Helm invocations, cluster API calls) travel as
//! `anyhow::Error` sources inside the structured variants, so callers can
//! match on the kind and still read a full causal chain.

use std::time::Duration;

use thiserror::Error;

use crate::diagnostics::ChartError;
use crate::validate::ValidationError;

#[derive(Error, Debug)]
pub enum Error {
    /// The chart set was rejected before anything was installed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The install callback returned [`CallbackAction::Abort`].
    ///
    /// [`CallbackAction::Abort`]: crate::manager::CallbackAction::Abort
    #[error("install callback requested abort for chart '{0}'")]
    CallbackAbort(String),

    /// The chart's primary deployment did not become ready in time.
    #[error("timeout waiting for chart '{chart}' to become ready after {timeout:?}")]
    WaitTimeout {
        chart: String,
        timeout: Duration,
        /// Failed-workload details gathered after the deadline, if any.
        diagnostics: Option<Box<ChartError>>,
    },

    /// The caller's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The global deadline for the whole walk fired.
    #[error("global timeout of {0:?} exceeded")]
    GlobalTimeout(Duration),

    /// Upgrade was called for a chart with no recorded release.
    #[error("no release recorded for chart '{0}'")]
    MissingRelease(String),

    /// Helm failed to install the chart.
    #[error("error installing chart '{chart}': {source}")]
    InstallFailed {
        chart: String,
        #[source]
        source: anyhow::Error,
        diagnostics: Option<Box<ChartError>>,
    },

    /// Helm failed to upgrade the chart's release.
    #[error("error upgrading chart '{chart}': {source}")]
    UpgradeFailed {
        chart: String,
        #[source]
        source: anyhow::Error,
        diagnostics: Option<Box<ChartError>>,
    },

    /// A readiness check against the cluster failed outright (as opposed
    /// to timing out).
    #[error("error checking readiness of chart '{chart}': {source}")]
    ReadinessCheck {
        chart: String,
        #[source]
        source: anyhow::Error,
    },

    /// Listing pods during failure diagnosis failed.
    #[error("error listing pods for selector '{selector}': {source}")]
    ListPods {
        selector: String,
        #[source]
        source: anyhow::Error,
    },

    /// Fetching a container log tail during failure diagnosis failed.
    #[error("error fetching logs for container '{container}' of pod '{pod}': {source}")]
    LogFetch {
        pod: String,
        container: String,
        #[source]
        source: anyhow::Error,
    },

    /// Scheduler bookkeeping failure. Indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The structured failure detail attached to this error, if any.
    pub fn diagnostics(&self) -> Option<&ChartError> {
        match self {
            Error::WaitTimeout { diagnostics, .. }
            | Error::InstallFailed { diagnostics, .. }
            | Error::UpgradeFailed { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

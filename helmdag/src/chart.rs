// src/chart.rs

//! The chart model: the unit of installation handed to the [`Manager`].
//!
//! A [`Chart`] is immutable once passed to the scheduler. Two derived
//! identifiers matter:
//!
//! - [`Chart::name`] keys the dependency graph and must be unique per set.
//! - [`release_name`] produces the identifier handed to Helm, which has
//!   stricter length and character constraints.
//!
//! [`Manager`]: crate::manager::Manager

use std::time::Duration;

/// How long to wait for a chart's primary deployment to become healthy if
/// the chart does not specify its own timeout.
pub const DEFAULT_DEPLOYMENT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Namespace used when the caller does not specify one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Helm rejects release names longer than this many code points.
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// The rule by which the readiness poller decides a chart is "up".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthIndication {
    /// Do not wait for anything; the install call returning is enough.
    #[default]
    IgnorePodHealth,
    /// At least one pod of the primary deployment is ready.
    AtLeastOnePodHealthy,
    /// Every desired pod of the primary deployment is ready.
    AllPodsHealthy,
}

/// A single installable Helm chart plus the metadata the scheduler needs:
/// dependencies, the workload that signals readiness, and timeouts.
#[derive(Debug, Clone, Default)]
pub struct Chart {
    /// Caller-visible name. Must be unique within a chart set.
    pub title: String,
    /// Chart location (directory or archive) passed through to Helm.
    pub location: String,
    /// Raw YAML values blob applied at install/upgrade time. May be empty.
    pub value_overrides: Vec<u8>,
    /// Titles of charts that must be ready before this one installs.
    pub dependency_list: Vec<String>,
    /// Name of the deployment whose readiness gates this chart.
    /// Empty means there is no workload to wait for.
    pub wait_until_deployment: String,
    /// Trust Helm's own readiness signal (`helm install --wait`) instead
    /// of polling the deployment.
    pub wait_until_helm_ready: bool,
    /// Per-chart deadline for reaching ready. Zero means
    /// [`DEFAULT_DEPLOYMENT_TIMEOUT`].
    pub wait_timeout: Duration,
    /// Readiness rule for the primary deployment.
    pub health_indication: HealthIndication,
}

impl Chart {
    /// The graph key derived from the title: lowercased, whitespace
    /// replaced with `-`, anything outside `[a-z0-9._-]` dropped.
    ///
    /// Distinct from the Helm release name; see [`release_name`].
    pub fn name(&self) -> String {
        self.title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-'))
            .collect()
    }

    /// The wait timeout with the module default applied.
    pub fn effective_wait_timeout(&self) -> Duration {
        if self.wait_timeout.is_zero() {
            DEFAULT_DEPLOYMENT_TIMEOUT
        } else {
            self.wait_timeout
        }
    }

    /// Whether the readiness poller runs for this chart at all.
    pub fn waits_for_deployment(&self) -> bool {
        !self.wait_until_helm_ready
            && self.health_indication != HealthIndication::IgnorePodHealth
            && !self.wait_until_deployment.is_empty()
    }
}

/// Sanitize an arbitrary string into a valid Helm release name.
///
/// Lowercases, maps every character outside `[a-z0-9-]` to `-`, collapses
/// dash runs, strips leading/trailing dashes, and truncates to
/// [`MAX_RELEASE_NAME_LEN`] code points. Inputs that sanitize to nothing
/// (e.g. all punctuation or non-ASCII) fall back to a deterministic
/// hash-derived name, so the result is never empty for non-empty input.
pub fn release_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' => out.push(c),
            _ => {
                if !out.is_empty() && !out.ends_with('-') {
                    out.push('-');
                }
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() && !input.is_empty() {
        let hex = blake3::hash(input.as_bytes()).to_hex();
        out = format!("chart-{}", &hex[..12]);
    }
    if out.chars().count() > MAX_RELEASE_NAME_LEN {
        out = out.chars().take(MAX_RELEASE_NAME_LEN).collect();
        while out.ends_with('-') {
            out.pop();
        }
    }
    out
}

// src/config/model.rs

use serde::Deserialize;

/// One chart entry in the YAML input file.
///
/// The file is a YAML list:
///
/// ```yaml
/// - name: redis
///   path: ./charts/redis
/// - name: api
///   path: ./charts/api
///   values_path: ./values/api.yml
///   primary_deployment: api
///   timeout: 10m
///   wait_for_all_pods: true
///   dependencies: [redis]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ChartDefinition {
    /// Name of the chart (must be unique within the file).
    pub name: String,

    /// Local filesystem path to the chart (directory or archive file).
    /// Relative paths are resolved against the input file's directory.
    pub path: String,

    /// Path to the values YAML file for overrides.
    #[serde(default)]
    pub values_path: Option<String>,

    /// The deployment created by the chart whose readiness determines
    /// chart health. Omit to ignore chart health.
    #[serde(default)]
    pub primary_deployment: Option<String>,

    /// How long to wait for the chart to become healthy before failing,
    /// as a duration string like "10m" or "90s".
    #[serde(default)]
    pub timeout: Option<String>,

    /// Wait for all pods of the primary deployment to be healthy?
    /// If false, only the first healthy pod is required.
    #[serde(default)]
    pub wait_for_all_pods: bool,

    /// Wait until Helm thinks the chart is ready (`helm install --wait`).
    /// Overrides `primary_deployment`.
    #[serde(default)]
    pub wait_for_helm: bool,

    /// Names of charts in the same file that must be ready first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

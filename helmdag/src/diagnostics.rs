// src/diagnostics.rs

//! Structured failure detail for a broken install or upgrade.
//!
//! When a chart fails, the manager gathers the failed workloads behind the
//! release: pods that are neither running nor completed, their conditions
//! and container statuses, and log tails for containers that exited
//! non-zero. Callers get all of it as a [`ChartError`] attached to the
//! originating error.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodCondition};
use serde::Deserialize;

use crate::cluster::ClusterApi;
use crate::errors::{Error, Result};
use crate::wait::selector_string;

/// A pod that was not `Running` or `Succeeded` when a chart failed.
#[derive(Debug, Clone, Default)]
pub struct FailedPod {
    pub name: String,
    pub phase: String,
    pub reason: String,
    pub message: String,
    pub conditions: Vec<PodCondition>,
    pub container_statuses: Vec<ContainerStatus>,
    /// Container name to raw log (stdout) output.
    pub logs: BTreeMap<String, String>,
}

/// Failed Kubernetes resources behind a chart install/upgrade error.
#[derive(Debug, Clone, Default)]
pub struct ChartError {
    /// Bare pods declared directly by the release.
    pub failed_pods: Vec<FailedPod>,
    /// Deployment name to its failed pods.
    pub failed_deployments: BTreeMap<String, Vec<FailedPod>>,
    /// Job name to its failed pods.
    pub failed_jobs: BTreeMap<String, Vec<FailedPod>>,
    /// DaemonSet name to its failed pods.
    pub failed_daemon_sets: BTreeMap<String, Vec<FailedPod>>,
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed resources: deployments: {}; jobs: {}; pods: {}; daemonsets: {}",
            self.failed_deployments.len(),
            self.failed_jobs.len(),
            self.failed_pods.len(),
            self.failed_daemon_sets.len()
        )
    }
}

impl std::error::Error for ChartError {}

/// The fields of a manifest document we route on.
#[derive(Debug, Deserialize)]
struct ManifestDoc {
    kind: Option<String>,
    metadata: Option<ManifestMeta>,
}

#[derive(Debug, Deserialize)]
struct ManifestMeta {
    name: Option<String>,
}

impl ChartError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything was actually collected.
    pub fn is_empty(&self) -> bool {
        self.failed_pods.is_empty()
            && self.failed_deployments.is_empty()
            && self.failed_jobs.is_empty()
            && self.failed_daemon_sets.is_empty()
    }

    /// Walk a release's rendered manifest and collect failed pods for
    /// every Deployment, Job, DaemonSet and bare Pod it declares.
    ///
    /// Workload selectors come from the live objects, not the manifest,
    /// since controllers may default them.
    pub async fn populate_from_release<C>(
        &mut self,
        cluster: &C,
        namespace: &str,
        manifest: &str,
        max_log_lines: Option<i64>,
    ) -> Result<()>
    where
        C: ClusterApi + ?Sized,
    {
        let entries: Vec<(String, String)> = serde_yaml::Deserializer::from_str(manifest)
            .filter_map(|doc| ManifestDoc::deserialize(doc).ok())
            .filter_map(|doc| match (doc.kind, doc.metadata.and_then(|m| m.name)) {
                (Some(kind), Some(name)) => Some((kind, name)),
                _ => None,
            })
            .collect();
        for (kind, name) in entries {
            match kind.as_str() {
                "Deployment" => {
                    let selector = match cluster.get_deployment(namespace, &name).await {
                        Ok(Some(dep)) => dep
                            .spec
                            .as_ref()
                            .and_then(|s| selector_string(s.selector.match_labels.as_ref()).ok()),
                        _ => None,
                    };
                    if let Some(selector) = selector {
                        let pods =
                            collect_failed_pods(cluster, namespace, &selector, max_log_lines)
                                .await?;
                        self.failed_deployments.insert(name, pods);
                    }
                }
                "Job" => {
                    let selector = match cluster.get_job(namespace, &name).await {
                        Ok(Some(job)) => job
                            .spec
                            .as_ref()
                            .and_then(|s| s.selector.as_ref())
                            .and_then(|s| selector_string(s.match_labels.as_ref()).ok()),
                        _ => None,
                    };
                    if let Some(selector) = selector {
                        let pods =
                            collect_failed_pods(cluster, namespace, &selector, max_log_lines)
                                .await?;
                        self.failed_jobs.insert(name, pods);
                    }
                }
                "DaemonSet" => {
                    let selector = match cluster.get_daemon_set(namespace, &name).await {
                        Ok(Some(ds)) => ds
                            .spec
                            .as_ref()
                            .and_then(|s| selector_string(s.selector.match_labels.as_ref()).ok()),
                        _ => None,
                    };
                    if let Some(selector) = selector {
                        let pods =
                            collect_failed_pods(cluster, namespace, &selector, max_log_lines)
                                .await?;
                        self.failed_daemon_sets.insert(name, pods);
                    }
                }
                "Pod" => {
                    if let Ok(Some(pod)) = cluster.get_pod(namespace, &name).await {
                        if pod_is_unhealthy(&pod) {
                            let fp =
                                failed_pod_from(cluster, namespace, &pod, max_log_lines).await?;
                            self.failed_pods.push(fp);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Collect the failed pods behind a single deployment.
    pub async fn populate_from_deployment<C>(
        &mut self,
        cluster: &C,
        namespace: &str,
        deployment: &str,
        max_log_lines: Option<i64>,
    ) -> Result<()>
    where
        C: ClusterApi + ?Sized,
    {
        let dep = match cluster.get_deployment(namespace, deployment).await {
            Ok(Some(dep)) => dep,
            _ => return Ok(()),
        };
        let selector = match dep
            .spec
            .as_ref()
            .and_then(|s| selector_string(s.selector.match_labels.as_ref()).ok())
        {
            Some(selector) => selector,
            None => return Ok(()),
        };
        let pods = collect_failed_pods(cluster, namespace, &selector, max_log_lines).await?;
        self.failed_deployments
            .insert(deployment.to_string(), pods);
        Ok(())
    }
}

/// List pods behind a selector and keep the unhealthy ones, with log
/// tails for containers whose last termination exited non-zero.
pub(crate) async fn collect_failed_pods<C>(
    cluster: &C,
    namespace: &str,
    selector: &str,
    max_log_lines: Option<i64>,
) -> Result<Vec<FailedPod>>
where
    C: ClusterApi + ?Sized,
{
    let pods = cluster
        .list_pods(namespace, selector)
        .await
        .map_err(|err| Error::ListPods {
            selector: selector.to_string(),
            source: err,
        })?;
    let mut failed = Vec::new();
    for pod in &pods {
        if pod_is_unhealthy(pod) {
            failed.push(failed_pod_from(cluster, namespace, pod, max_log_lines).await?);
        }
    }
    Ok(failed)
}

/// A pod counts as failed unless it is running or has completed.
fn pod_is_unhealthy(pod: &Pod) -> bool {
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("");
    phase != "Running" && phase != "Succeeded"
}

async fn failed_pod_from<C>(
    cluster: &C,
    namespace: &str,
    pod: &Pod,
    max_log_lines: Option<i64>,
) -> Result<FailedPod>
where
    C: ClusterApi + ?Sized,
{
    let name = pod.metadata.name.clone().unwrap_or_default();
    let status = pod.status.clone().unwrap_or_default();
    let mut fp = FailedPod {
        name: name.clone(),
        phase: status.phase.unwrap_or_default(),
        reason: status.reason.unwrap_or_default(),
        message: status.message.unwrap_or_default(),
        conditions: status.conditions.unwrap_or_default(),
        container_statuses: status.container_statuses.unwrap_or_default(),
        logs: BTreeMap::new(),
    };
    for cs in &fp.container_statuses {
        let exited_nonzero = cs
            .last_state
            .as_ref()
            .and_then(|s| s.terminated.as_ref())
            .map(|t| t.exit_code != 0)
            .unwrap_or(false);
        if !cs.ready && exited_nonzero {
            let logs = cluster
                .pod_logs(namespace, &name, &cs.name, max_log_lines)
                .await
                .map_err(|err| Error::LogFetch {
                    pod: name.clone(),
                    container: cs.name.clone(),
                    source: err,
                })?;
            fp.logs.insert(cs.name.clone(), logs);
        }
    }
    Ok(fp)
}

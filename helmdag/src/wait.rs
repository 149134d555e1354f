// src/wait.rs

//! Readiness polling for a chart's primary deployment.
//!
//! Ticks until the deployment's current-revision replica set reports
//! enough ready replicas, the per-chart timeout fires, or the walk is
//! cancelled.

use std::time::Duration;

use anyhow::{anyhow, Context};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chart::HealthIndication;
use crate::cluster::ClusterApi;

/// Annotation both the deployment and its current replica set carry,
/// maintained by the deployment controller.
const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Why readiness polling stopped without success.
#[derive(Debug)]
pub(crate) enum WaitError {
    Cancelled,
    Timeout(Duration),
    Api(anyhow::Error),
}

/// Poll until the deployment is ready under the given health rule.
pub(crate) async fn await_deployment_ready<C>(
    cluster: &C,
    cancel: &CancellationToken,
    namespace: &str,
    deployment: &str,
    health: HealthIndication,
    poll_interval: Duration,
    wait_timeout: Duration,
) -> Result<(), WaitError>
where
    C: ClusterApi + ?Sized,
{
    let poll = async {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                _ = ticker.tick() => {}
            }
            match check_once(cluster, namespace, deployment, health).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    debug!(deployment = %deployment, "not ready yet");
                }
                Err(err) => return Err(WaitError::Api(err)),
            }
        }
    };
    match tokio::time::timeout(wait_timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(WaitError::Timeout(wait_timeout)),
    }
}

/// One readiness probe: fetch the deployment, locate its current-revision
/// replica set, compare ready replicas against the health rule.
async fn check_once<C>(
    cluster: &C,
    namespace: &str,
    deployment: &str,
    health: HealthIndication,
) -> anyhow::Result<bool>
where
    C: ClusterApi + ?Sized,
{
    let dep = cluster
        .get_deployment(namespace, deployment)
        .await?
        .ok_or_else(|| anyhow!("deployment '{deployment}' not found"))?;
    let spec = dep
        .spec
        .as_ref()
        .ok_or_else(|| anyhow!("deployment '{deployment}' has no spec"))?;
    let desired = spec
        .replicas
        .ok_or_else(|| anyhow!("deployment '{deployment}' has no replica count"))?;

    let selector = selector_string(spec.selector.match_labels.as_ref())
        .with_context(|| format!("deployment '{deployment}' has no label selector"))?;

    let replica_sets = cluster.list_replica_sets(namespace, &selector).await?;
    let current = match current_replica_set(&dep, &replica_sets) {
        // The controller has not produced this revision's replica set yet.
        None => return Ok(false),
        Some(rs) => rs,
    };

    let ready = current
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let needed = match health {
        HealthIndication::IgnorePodHealth => return Ok(true),
        HealthIndication::AtLeastOnePodHealthy => 1,
        HealthIndication::AllPodsHealthy => desired,
    };
    debug!(
        deployment = %deployment,
        ready,
        needed,
        "readiness probe"
    );
    Ok(ready >= needed)
}

/// The replica set belonging to the deployment's current revision:
/// owned by the deployment and carrying the same revision annotation.
fn current_replica_set<'a>(
    dep: &Deployment,
    replica_sets: &'a [ReplicaSet],
) -> Option<&'a ReplicaSet> {
    let dep_uid = dep.metadata.uid.as_deref();
    let revision = dep
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION));
    replica_sets.iter().find(|rs| {
        let owned = rs
            .metadata
            .owner_references
            .as_ref()
            .map(|refs| refs.iter().any(|r| Some(r.uid.as_str()) == dep_uid))
            .unwrap_or(false);
        let same_revision = rs
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(REVISION_ANNOTATION))
            == revision;
        owned && same_revision
    })
}

/// Render `matchLabels` as the `k=v,k=v` selector string the list APIs
/// accept.
pub(crate) fn selector_string(
    match_labels: Option<&std::collections::BTreeMap<String, String>>,
) -> anyhow::Result<String> {
    let labels = match_labels.ok_or_else(|| anyhow!("missing matchLabels"))?;
    if labels.is_empty() {
        return Err(anyhow!("empty matchLabels"));
    }
    Ok(labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(","))
}

#![allow(dead_code)]

//! Controllable fakes for the scheduler's two client seams.
//!
//! [`FakeHelm`] records every install/upgrade into a shared event log so
//! tests can assert ordering; [`FakeCluster`] serves hand-built
//! deployments, replica sets and pods.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateTerminated, ContainerStatus, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};

use helmdag::cluster::ClusterApi;
use helmdag::helm::{HelmClient, ReleaseRequest};

/// Annotation the deployment controller keeps in sync between a
/// deployment and its current replica set.
const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// A [`HelmClient`] that records invocations instead of running Helm.
///
/// Events land in a shared log as `install:<release>` / `upgrade:<release>`
/// strings; tests typically share the same log with a completed-callback
/// that appends `done:<title>` markers, so cross-chart ordering can be
/// asserted from one sequence.
pub struct FakeHelm {
    log: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    fail_releases: Mutex<HashSet<String>>,
    manifests: Mutex<HashMap<String, String>>,
}

impl FakeHelm {
    pub fn new() -> Self {
        Self::with_log(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            delay: Duration::ZERO,
            fail_releases: Mutex::new(HashSet::new()),
            manifests: Mutex::new(HashMap::new()),
        }
    }

    /// Sleep this long inside every install/upgrade, giving cancellation
    /// tests a suspension point.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make installs/upgrades of this release fail.
    pub fn fail_release(&self, release: &str) {
        self.fail_releases
            .lock()
            .unwrap()
            .insert(release.to_string());
    }

    /// Serve this manifest from `release_manifest`.
    pub fn set_manifest(&self, release: &str, manifest: &str) {
        self.manifests
            .lock()
            .unwrap()
            .insert(release.to_string(), manifest.to_string());
    }

    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Releases recorded by install events, in order.
    pub fn installed(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("install:").map(str::to_string))
            .collect()
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

impl Default for FakeHelm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HelmClient for FakeHelm {
    async fn install_release(&self, req: ReleaseRequest) -> Result<String> {
        self.record(format!("install:{}", req.release_name));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_releases.lock().unwrap().contains(&req.release_name) {
            bail!("simulated install failure for '{}'", req.release_name);
        }
        Ok(req.release_name)
    }

    async fn upgrade_release(&self, req: ReleaseRequest) -> Result<()> {
        self.record(format!("upgrade:{}", req.release_name));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_releases.lock().unwrap().contains(&req.release_name) {
            bail!("simulated upgrade failure for '{}'", req.release_name);
        }
        Ok(())
    }

    async fn release_manifest(&self, _namespace: &str, release: &str) -> Result<String> {
        self.manifests
            .lock()
            .unwrap()
            .get(release)
            .cloned()
            .ok_or_else(|| anyhow!("release '{release}' not found"))
    }
}

/// A [`ClusterApi`] over hand-built fixtures.
#[derive(Default)]
pub struct FakeCluster {
    deployments: Mutex<HashMap<String, Deployment>>,
    replica_sets: Mutex<Vec<ReplicaSet>>,
    jobs: Mutex<HashMap<String, Job>>,
    daemon_sets: Mutex<HashMap<String, DaemonSet>>,
    pods: Mutex<Vec<Pod>>,
    logs: Mutex<HashMap<String, String>>,
    fail_pod_lists: AtomicBool,
    fail_log_fetch: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        let key = object_key(&deployment.metadata);
        self.deployments.lock().unwrap().insert(key, deployment);
    }

    pub fn add_replica_set(&self, replica_set: ReplicaSet) {
        self.replica_sets.lock().unwrap().push(replica_set);
    }

    pub fn add_job(&self, job: Job) {
        let key = object_key(&job.metadata);
        self.jobs.lock().unwrap().insert(key, job);
    }

    pub fn add_daemon_set(&self, daemon_set: DaemonSet) {
        let key = object_key(&daemon_set.metadata);
        self.daemon_sets.lock().unwrap().insert(key, daemon_set);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    pub fn set_log(&self, pod: &str, container: &str, log: &str) {
        self.logs
            .lock()
            .unwrap()
            .insert(format!("{pod}/{container}"), log.to_string());
    }

    /// Flip the ready-replica count of a named replica set, simulating a
    /// rollout making progress between polls.
    pub fn set_ready_replicas(&self, name: &str, ready: i32) {
        let mut sets = self.replica_sets.lock().unwrap();
        for rs in sets.iter_mut() {
            if rs.metadata.name.as_deref() == Some(name) {
                if let Some(status) = rs.status.as_mut() {
                    status.ready_replicas = Some(ready);
                }
            }
        }
    }

    pub fn fail_pod_lists(&self) {
        self.fail_pod_lists.store(true, Ordering::Relaxed);
    }

    pub fn fail_log_fetch(&self) {
        self.fail_log_fetch.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let key = format!("{namespace}/{name}");
        Ok(self.deployments.lock().unwrap().get(&key).cloned())
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ReplicaSet>> {
        let wanted = parse_selector(selector);
        Ok(self
            .replica_sets
            .lock()
            .unwrap()
            .iter()
            .filter(|rs| in_namespace(&rs.metadata, namespace))
            .filter(|rs| labels_match(&rs.metadata, &wanted))
            .cloned()
            .collect())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let key = format!("{namespace}/{name}");
        Ok(self.jobs.lock().unwrap().get(&key).cloned())
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        let key = format!("{namespace}/{name}");
        Ok(self.daemon_sets.lock().unwrap().get(&key).cloned())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                in_namespace(&p.metadata, namespace) && p.metadata.name.as_deref() == Some(name)
            })
            .cloned())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        if self.fail_pod_lists.load(Ordering::Relaxed) {
            bail!("simulated pod list failure");
        }
        let wanted = parse_selector(selector);
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| in_namespace(&p.metadata, namespace))
            .filter(|p| labels_match(&p.metadata, &wanted))
            .cloned()
            .collect())
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        _tail_lines: Option<i64>,
    ) -> Result<String> {
        if self.fail_log_fetch.load(Ordering::Relaxed) {
            bail!("simulated log fetch failure");
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(&format!("{pod}/{container}"))
            .cloned()
            .unwrap_or_default())
    }
}

fn object_key(meta: &ObjectMeta) -> String {
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or("")
    )
}

fn in_namespace(meta: &ObjectMeta, namespace: &str) -> bool {
    meta.namespace.as_deref().unwrap_or("default") == namespace
}

fn parse_selector(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn labels_match(meta: &ObjectMeta, wanted: &BTreeMap<String, String>) -> bool {
    let labels = match meta.labels.as_ref() {
        Some(labels) => labels,
        None => return wanted.is_empty(),
    };
    wanted
        .iter()
        .all(|(k, v)| labels.get(k).map(|have| have == v).unwrap_or(false))
}

/// Fixture: a deployment with a `matchLabels` selector, revision `1` and
/// a deterministic uid.
pub fn deployment(namespace: &str, name: &str, replicas: i32, labels: &[(&str, &str)]) -> Deployment {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            annotations: Some(BTreeMap::from([(
                REVISION_ANNOTATION.to_string(),
                "1".to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(k8s_openapi::api::apps::v1::DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fixture: the current-revision replica set of `owner`, reporting
/// `ready` ready replicas.
pub fn replica_set(owner: &Deployment, name: &str, ready: i32) -> ReplicaSet {
    let labels = owner
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default();
    ReplicaSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: owner.metadata.namespace.clone(),
            labels: Some(labels),
            annotations: Some(BTreeMap::from([(
                REVISION_ANNOTATION.to_string(),
                "1".to_string(),
            )])),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: owner.metadata.name.clone().unwrap_or_default(),
                uid: owner.metadata.uid.clone().unwrap_or_default(),
                ..Default::default()
            }]),
            ..Default::default()
        },
        status: Some(k8s_openapi::api::apps::v1::ReplicaSetStatus {
            ready_replicas: Some(ready),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fixture: a job with a `matchLabels` selector.
pub fn job(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Job {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(k8s_openapi::api::batch::v1::JobSpec {
            selector: Some(LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fixture: a daemon set with a `matchLabels` selector.
pub fn daemon_set(namespace: &str, name: &str, labels: &[(&str, &str)]) -> DaemonSet {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(k8s_openapi::api::apps::v1::DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fixture: a pod in the given phase.
pub fn pod(namespace: &str, name: &str, labels: &[(&str, &str)], phase: &str) -> Pod {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fixture: a failed pod whose container last exited with `exit_code`.
pub fn crashed_pod(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    container: &str,
    exit_code: i32,
) -> Pod {
    let mut pod = pod(namespace, name, labels, "Failed");
    if let Some(status) = pod.status.as_mut() {
        status.reason = Some("Error".to_string());
        status.message = Some("container crashed".to_string());
        status.container_statuses = Some(vec![ContainerStatus {
            name: container.to_string(),
            ready: false,
            restart_count: 3,
            last_state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
    }
    pod
}

// src/cluster.rs

//! Cluster API seam.
//!
//! The scheduler only needs a handful of read operations against the
//! orchestrator: fetch workloads, list replica sets and pods by label
//! selector, and read container logs. [`ClusterApi`] captures exactly
//! that, so tests swap in a fake and production wires a [`KubeCluster`]
//! around a shared `kube::Client`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::Client;

/// Read capabilities the scheduler needs from the cluster.
///
/// Implementations must be safe for concurrent use; sibling chart visitors
/// poll through one shared handle.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    /// Fetch a deployment, `None` when it does not exist.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// List replica sets matching a label selector.
    async fn list_replica_sets(&self, namespace: &str, selector: &str)
        -> Result<Vec<ReplicaSet>>;

    /// Fetch a job, `None` when it does not exist.
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    /// Fetch a daemon set, `None` when it does not exist.
    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>>;

    /// Fetch a single pod by name, `None` when it does not exist.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// List pods matching a label selector.
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    /// Read a container's log, optionally limited to the last `tail_lines`
    /// lines (`None` fetches the full log).
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail_lines: Option<i64>,
    ) -> Result<String>;
}

/// [`ClusterApi`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        ignore_not_found(api.get(name).await)
            .with_context(|| format!("getting deployment '{name}'"))
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ReplicaSet>> {
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(selector);
        let list = api
            .list(&lp)
            .await
            .with_context(|| format!("listing replica sets for selector '{selector}'"))?;
        Ok(list.items)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        ignore_not_found(api.get(name).await).with_context(|| format!("getting job '{name}'"))
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        ignore_not_found(api.get(name).await)
            .with_context(|| format!("getting daemon set '{name}'"))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        ignore_not_found(api.get(name).await).with_context(|| format!("getting pod '{name}'"))
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(selector);
        let list = api
            .list(&lp)
            .await
            .with_context(|| format!("listing pods for selector '{selector}'"))?;
        Ok(list.items)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail_lines: Option<i64>,
    ) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines,
            ..Default::default()
        };
        api.logs(pod, &params)
            .await
            .with_context(|| format!("fetching logs for container '{container}' of pod '{pod}'"))
    }
}

// Shared handles satisfy the trait too, so callers can keep a reference
// to the client they hand the manager.
#[async_trait]
impl<T: ClusterApi> ClusterApi for std::sync::Arc<T> {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.as_ref().get_deployment(namespace, name).await
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<ReplicaSet>> {
        self.as_ref().list_replica_sets(namespace, selector).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        self.as_ref().get_job(namespace, name).await
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        self.as_ref().get_daemon_set(namespace, name).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        self.as_ref().get_pod(namespace, name).await
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        self.as_ref().list_pods(namespace, selector).await
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail_lines: Option<i64>,
    ) -> Result<String> {
        self.as_ref()
            .pod_logs(namespace, pod, container, tail_lines)
            .await
    }
}

/// Map a 404 from the API server to `None`.
fn ignore_not_found<T>(res: kube::Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
        Err(err) => Err(err.into()),
    }
}

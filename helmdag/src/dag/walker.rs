// src/dag/walker.rs

//! Concurrent wave execution over a [`ChartGraph`].
//!
//! One tokio task per node, coordinated by single-shot completion signals
//! (a `watch` channel per node). Every zero-in-degree node starts
//! immediately; a downstream node starts the moment its last dependency
//! publishes success. There is no worker-pool cap; the graph's width is
//! the implicit bound.
//!
//! On the first visitor error the walk cancels: no further nodes start,
//! in-flight visitors observe the cancellation at their next suspension
//! point, and `walk` returns the first error once every task has exited.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dag::graph::ChartGraph;
use crate::errors::{Error, Result};

/// The boxed future a visitor returns for one node.
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Terminal state a node publishes to its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOutcome {
    /// Not finished yet. Initial channel value; never published.
    Pending,
    Succeeded,
    Failed,
    /// Not visited: a dependency failed or the walk was cancelled.
    Skipped,
}

impl ChartGraph {
    /// Visit every node concurrently, respecting dependency edges.
    ///
    /// `visitor` is called at most once per node, and only after every
    /// dependency's visitor returned success. Sibling nodes run
    /// concurrently with no ordering between them.
    ///
    /// Returns the first visitor error, [`Error::Cancelled`] when `cancel`
    /// fired with no preceding visitor error, or `Ok(())` once every node
    /// succeeded.
    pub async fn walk<V>(&self, cancel: &CancellationToken, visitor: V) -> Result<()>
    where
        V: Fn(String) -> NodeFuture + Send + Sync + 'static,
    {
        let visitor = Arc::new(visitor);
        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let any_skipped = Arc::new(AtomicBool::new(false));

        let mut senders: HashMap<String, watch::Sender<NodeOutcome>> = HashMap::new();
        let mut receivers: HashMap<String, watch::Receiver<NodeOutcome>> = HashMap::new();
        for name in self.names() {
            let (tx, rx) = watch::channel(NodeOutcome::Pending);
            senders.insert(name.to_string(), tx);
            receivers.insert(name.to_string(), rx);
        }

        let mut tasks = JoinSet::new();
        for name in self.topo_order() {
            let deps: Vec<watch::Receiver<NodeOutcome>> = self
                .dependencies_of(name)
                .iter()
                .map(|dep| receivers[dep.as_str()].clone())
                .collect();
            let tx = match senders.remove(name.as_str()) {
                Some(tx) => tx,
                None => return Err(Error::Internal(format!("no signal for node '{name}'"))),
            };
            let name = name.clone();
            let cancel = cancel.clone();
            let visitor = Arc::clone(&visitor);
            let first_error = Arc::clone(&first_error);
            let any_skipped = Arc::clone(&any_skipped);

            tasks.spawn(async move {
                let outcome = run_node(&name, deps, &cancel, visitor.as_ref()).await;
                let published = match &outcome {
                    Ok(()) => NodeOutcome::Succeeded,
                    Err(Skip) => NodeOutcome::Skipped,
                    Err(Visit(_)) => NodeOutcome::Failed,
                };
                if published == NodeOutcome::Skipped {
                    any_skipped.store(true, Ordering::Relaxed);
                }
                if let Err(Visit(err)) = outcome {
                    let mut slot = first_error.lock().expect("first-error lock poisoned");
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                    drop(slot);
                    cancel.cancel();
                }
                tx.send_replace(published);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_err) = joined {
                // A visitor panicked. The contract requires errors, not
                // panics; record it and stop the walk.
                warn!(error = %join_err, "node task aborted abnormally");
                let mut slot = first_error.lock().expect("first-error lock poisoned");
                if slot.is_none() {
                    *slot = Some(Error::Internal(format!("node task panicked: {join_err}")));
                }
                drop(slot);
                cancel.cancel();
            }
        }

        let taken = first_error
            .lock()
            .expect("first-error lock poisoned")
            .take();
        match taken {
            Some(err) => Err(err),
            // A cancel that landed after every visitor already finished
            // did not interrupt anything.
            None if cancel.is_cancelled() && any_skipped.load(Ordering::Relaxed) => {
                Err(Error::Cancelled)
            }
            None => Ok(()),
        }
    }
}

/// Why a node did not succeed.
enum NodeSkip {
    /// Dependency failure or cancellation; the visitor never ran.
    Skip,
    /// The visitor ran and returned this error.
    Visit(Error),
}

use NodeSkip::{Skip, Visit};

/// Wait for dependencies, then run the visitor for one node.
async fn run_node<V>(
    name: &str,
    deps: Vec<watch::Receiver<NodeOutcome>>,
    cancel: &CancellationToken,
    visitor: &V,
) -> std::result::Result<(), NodeSkip>
where
    V: Fn(String) -> NodeFuture + Send + Sync,
{
    for mut rx in deps {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(Skip),
            changed = rx.wait_for(|o| *o != NodeOutcome::Pending) => match changed {
                Ok(outcome) => *outcome,
                // Sender dropped without publishing; treat as a skip.
                Err(_) => return Err(Skip),
            },
        };
        if outcome != NodeOutcome::Succeeded {
            debug!(chart = %name, "dependency did not succeed; skipping");
            return Err(Skip);
        }
    }
    if cancel.is_cancelled() {
        return Err(Skip);
    }
    debug!(chart = %name, "dependencies satisfied; visiting");
    visitor(name.to_string()).await.map_err(Visit)
}

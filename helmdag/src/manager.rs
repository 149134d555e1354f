// src/manager.rs

//! The install/upgrade manager: validates a chart set, builds its graph,
//! and walks it concurrently, driving Helm and the readiness poller per
//! node.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chart::{release_name, Chart, DEFAULT_NAMESPACE};
use crate::cluster::ClusterApi;
use crate::dag::{ChartGraph, NodeFuture};
use crate::diagnostics::ChartError;
use crate::errors::{Error, Result};
use crate::helm::{HelmClient, ReleaseRequest};
use crate::validate::validate_charts;
use crate::wait::{await_deployment_ready, WaitError};

/// Chart title to installed release name.
pub type ReleaseMap = BTreeMap<String, String>;

/// Decision made by the install callback for one chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Proceed with the installation immediately.
    Continue,
    /// Not now; ask again after the retry delay.
    Wait,
    /// Do not install; fail the chart and halt the walk.
    Abort,
}

/// Pre-install decision hook. Called concurrently from sibling chart
/// visitors, so implementations must be thread-safe.
pub type InstallCallback = Arc<dyn Fn(&Chart) -> CallbackAction + Send + Sync>;

/// Post-chart notification hook: the chart and its result (`None` on
/// success). Invoked exactly once per chart whose visitor ran.
pub type CompletedCallback = Arc<dyn Fn(&Chart, Option<&Error>) + Send + Sync>;

/// Options accepted by [`Manager::install`] and [`Manager::upgrade`].
#[derive(Clone, Default)]
pub struct InstallOptions {
    namespace: Option<String>,
    release_name_prefix: Option<String>,
    install_callback: Option<InstallCallback>,
    completed_callback: Option<CompletedCallback>,
    timeout: Option<Duration>,
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target namespace. Defaults to `"default"`.
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Prefix prepended to each chart title before release-name
    /// sanitization.
    pub fn release_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.release_name_prefix = Some(prefix.into());
        self
    }

    /// Pre-install decision hook; see [`CallbackAction`].
    pub fn install_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Chart) -> CallbackAction + Send + Sync + 'static,
    {
        self.install_callback = Some(Arc::new(f));
        self
    }

    /// Post-chart notification hook.
    pub fn completed_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Chart, Option<&Error>) + Send + Sync + 'static,
    {
        self.completed_callback = Some(Arc::new(f));
        self
    }

    /// Global deadline for the entire walk.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

/// Scheduler tuning knobs. Tests lower the intervals to milliseconds.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Period between readiness probes.
    pub poll_interval: Duration,
    /// Sleep between install-callback retries after [`CallbackAction::Wait`].
    pub retry_delay: Duration,
    /// Log-tail cap for failure diagnostics; `None` fetches full logs.
    pub max_log_lines: Option<i64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            retry_delay: Duration::from_secs(10),
            max_log_lines: Some(500),
        }
    }
}

/// Manages installation and upgrade of chart graphs.
pub struct Manager<C, H> {
    cluster: Arc<C>,
    helm: Arc<H>,
    config: ManagerConfig,
}

impl<C, H> Manager<C, H>
where
    C: ClusterApi,
    H: HelmClient,
{
    pub fn new(cluster: C, helm: H) -> Self {
        Self::with_config(cluster, helm, ManagerConfig::default())
    }

    pub fn with_config(cluster: C, helm: H, config: ManagerConfig) -> Self {
        Self {
            cluster: Arc::new(cluster),
            helm: Arc::new(helm),
            config,
        }
    }

    /// Install charts in dependency order and return the release names.
    ///
    /// On failure the walk halts (installed releases are left in place)
    /// and the first error is returned.
    pub async fn install(
        &self,
        cancel: &CancellationToken,
        charts: &[Chart],
        opts: InstallOptions,
    ) -> Result<ReleaseMap> {
        validate_charts(charts)?;
        let graph = ChartGraph::build(charts)?;
        info!(charts = charts.len(), "installing chart graph");

        let ctx = self.walk_ctx(charts, &opts, ReleaseMap::new());
        let walk_cancel = ctx.cancel.clone();
        let deadline_hit = self.arm_deadline(&walk_cancel, cancel, opts.timeout);

        let visitor_ctx = Arc::clone(&ctx);
        let result = graph
            .walk(&walk_cancel, move |name| -> NodeFuture {
                let ctx = Arc::clone(&visitor_ctx);
                Box::pin(async move { install_chart(&ctx, &name).await })
            })
            .await;
        // Release the deadline watchdog.
        walk_cancel.cancel();

        match result {
            Ok(()) => {
                let releases = ctx.releases.lock().expect("release map lock poisoned");
                info!(releases = releases.len(), "chart graph installed");
                Ok(releases.clone())
            }
            Err(err) => Err(map_deadline(err, &deadline_hit, opts.timeout)),
        }
    }

    /// Upgrade previously installed charts in dependency order.
    ///
    /// Fails fast with [`Error::MissingRelease`] before touching the
    /// cluster if any chart lacks an entry in `releases`.
    pub async fn upgrade(
        &self,
        cancel: &CancellationToken,
        releases: &ReleaseMap,
        charts: &[Chart],
        opts: InstallOptions,
    ) -> Result<()> {
        validate_charts(charts)?;
        let graph = ChartGraph::build(charts)?;
        for chart in charts {
            if !releases.contains_key(&chart.title) {
                return Err(Error::MissingRelease(chart.title.clone()));
            }
        }
        info!(charts = charts.len(), "upgrading chart graph");

        let ctx = self.walk_ctx(charts, &opts, releases.clone());
        let walk_cancel = ctx.cancel.clone();
        let deadline_hit = self.arm_deadline(&walk_cancel, cancel, opts.timeout);

        let visitor_ctx = Arc::clone(&ctx);
        let result = graph
            .walk(&walk_cancel, move |name| -> NodeFuture {
                let ctx = Arc::clone(&visitor_ctx);
                Box::pin(async move { upgrade_chart(&ctx, &name).await })
            })
            .await;
        // Release the deadline watchdog.
        walk_cancel.cancel();

        result.map_err(|err| map_deadline(err, &deadline_hit, opts.timeout))
    }

    fn walk_ctx(
        &self,
        charts: &[Chart],
        opts: &InstallOptions,
        preset_releases: ReleaseMap,
    ) -> Arc<WalkCtx<C, H>> {
        Arc::new(WalkCtx {
            cluster: Arc::clone(&self.cluster),
            helm: Arc::clone(&self.helm),
            config: self.config.clone(),
            charts: charts.iter().map(|c| (c.name(), c.clone())).collect(),
            namespace: opts
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            prefix: opts.release_name_prefix.clone().unwrap_or_default(),
            install_callback: opts.install_callback.clone(),
            completed_callback: opts.completed_callback.clone(),
            releases: Mutex::new(ReleaseMap::new()),
            preset_releases,
            cancel: CancellationToken::new(),
        })
    }

    /// Arm the global deadline: a child token cancelled either by the
    /// caller's token or by the timer. The returned flag records whether
    /// the timer was what fired.
    fn arm_deadline(
        &self,
        walk_cancel: &CancellationToken,
        caller: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Arc<AtomicBool> {
        let deadline_hit = Arc::new(AtomicBool::new(false));
        let walk_cancel = walk_cancel.clone();
        let caller = caller.clone();
        let hit = Arc::clone(&deadline_hit);
        tokio::spawn(async move {
            match timeout {
                Some(d) => {
                    tokio::select! {
                        _ = caller.cancelled() => {}
                        _ = walk_cancel.cancelled() => return,
                        _ = tokio::time::sleep(d) => {
                            warn!(timeout = ?d, "global deadline fired; cancelling walk");
                            hit.store(true, Ordering::Relaxed);
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = caller.cancelled() => {}
                        _ = walk_cancel.cancelled() => return,
                    }
                }
            }
            walk_cancel.cancel();
        });
        deadline_hit
    }
}

/// Shared state a walk's visitors close over.
struct WalkCtx<C, H> {
    cluster: Arc<C>,
    helm: Arc<H>,
    config: ManagerConfig,
    /// Charts keyed by their graph name.
    charts: HashMap<String, Chart>,
    namespace: String,
    prefix: String,
    install_callback: Option<InstallCallback>,
    completed_callback: Option<CompletedCallback>,
    /// Releases recorded by this walk (install).
    releases: Mutex<ReleaseMap>,
    /// Releases recorded by a previous install (upgrade).
    preset_releases: ReleaseMap,
    cancel: CancellationToken,
}

/// Visitor for one chart during install: hook, helm install, readiness
/// wait, completion notification.
async fn install_chart<C, H>(ctx: &WalkCtx<C, H>, name: &str) -> Result<()>
where
    C: ClusterApi,
    H: HelmClient,
{
    let chart = lookup_chart(ctx, name)?;
    let result = install_chart_inner(ctx, chart).await;
    notify_completed(ctx, chart, &result);
    result
}

async fn install_chart_inner<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart) -> Result<()>
where
    C: ClusterApi,
    H: HelmClient,
{
    run_install_hook(ctx, chart).await?;

    let release = release_name(&format!("{}{}", ctx.prefix, chart.title));
    info!(chart = %chart.title, release = %release, "installing chart");
    let req = release_request(ctx, chart, &release);
    match ctx.helm.install_release(req).await {
        Ok(assigned) => {
            debug!(chart = %chart.title, release = %assigned, "release created");
            ctx.releases
                .lock()
                .expect("release map lock poisoned")
                .insert(chart.title.clone(), assigned);
        }
        Err(err) => {
            return Err(enrich_install_error(ctx, chart, &release, err, false).await);
        }
    }

    wait_for_chart(ctx, chart).await
}

/// Visitor for one chart during upgrade.
async fn upgrade_chart<C, H>(ctx: &WalkCtx<C, H>, name: &str) -> Result<()>
where
    C: ClusterApi,
    H: HelmClient,
{
    let chart = lookup_chart(ctx, name)?;
    let result = upgrade_chart_inner(ctx, chart).await;
    notify_completed(ctx, chart, &result);
    result
}

async fn upgrade_chart_inner<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart) -> Result<()>
where
    C: ClusterApi,
    H: HelmClient,
{
    run_install_hook(ctx, chart).await?;

    let release = match ctx.preset_releases.get(&chart.title) {
        Some(release) => release.clone(),
        // Checked up front; kept as a guard for direct callers.
        None => return Err(Error::MissingRelease(chart.title.clone())),
    };
    info!(chart = %chart.title, release = %release, "upgrading release");
    let req = release_request(ctx, chart, &release);
    if let Err(err) = ctx.helm.upgrade_release(req).await {
        return Err(enrich_install_error(ctx, chart, &release, err, true).await);
    }

    wait_for_chart(ctx, chart).await
}

fn lookup_chart<'a, C, H>(ctx: &'a WalkCtx<C, H>, name: &str) -> Result<&'a Chart> {
    ctx.charts
        .get(name)
        .ok_or_else(|| Error::Internal(format!("no chart behind graph node '{name}'")))
}

fn release_request<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart, release: &str) -> ReleaseRequest {
    ReleaseRequest {
        release_name: release.to_string(),
        chart_location: chart.location.clone(),
        namespace: ctx.namespace.clone(),
        values: chart.value_overrides.clone(),
        wait: chart.wait_until_helm_ready,
        wait_timeout: chart.effective_wait_timeout(),
    }
}

/// Ask the install callback until it settles on `Continue` or `Abort`.
/// `Wait` sleeps the retry delay and asks again; only cancellation breaks
/// the loop otherwise.
async fn run_install_hook<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart) -> Result<()> {
    let callback = match &ctx.install_callback {
        Some(cb) => cb,
        None => return Ok(()),
    };
    loop {
        match callback(chart) {
            CallbackAction::Continue => return Ok(()),
            CallbackAction::Abort => {
                warn!(chart = %chart.title, "install callback requested abort");
                return Err(Error::CallbackAbort(chart.title.clone()));
            }
            CallbackAction::Wait => {
                debug!(chart = %chart.title, "install callback deferred; retrying");
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(ctx.config.retry_delay) => {}
                }
            }
        }
    }
}

/// Post-install readiness gate for one chart.
async fn wait_for_chart<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart) -> Result<()>
where
    C: ClusterApi,
    H: HelmClient,
{
    if !chart.waits_for_deployment() {
        return Ok(());
    }
    debug!(
        chart = %chart.title,
        deployment = %chart.wait_until_deployment,
        "waiting for deployment to become ready"
    );
    let outcome = await_deployment_ready(
        ctx.cluster.as_ref(),
        &ctx.cancel,
        &ctx.namespace,
        &chart.wait_until_deployment,
        chart.health_indication,
        ctx.config.poll_interval,
        chart.effective_wait_timeout(),
    )
    .await;
    match outcome {
        Ok(()) => {
            info!(chart = %chart.title, "chart is ready");
            Ok(())
        }
        Err(WaitError::Cancelled) => Err(Error::Cancelled),
        Err(WaitError::Timeout(timeout)) => {
            let diagnostics = diagnose_deployment(ctx, chart).await;
            Err(Error::WaitTimeout {
                chart: chart.title.clone(),
                timeout,
                diagnostics,
            })
        }
        Err(WaitError::Api(source)) => Err(Error::ReadinessCheck {
            chart: chart.title.clone(),
            source,
        }),
    }
}

/// Gather failed-pod detail for the chart's primary deployment. Failures
/// here are logged, never allowed to mask the originating error.
async fn diagnose_deployment<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart) -> Option<Box<ChartError>>
where
    C: ClusterApi,
    H: HelmClient,
{
    let mut detail = ChartError::new();
    match detail
        .populate_from_deployment(
            ctx.cluster.as_ref(),
            &ctx.namespace,
            &chart.wait_until_deployment,
            ctx.config.max_log_lines,
        )
        .await
    {
        Ok(()) if !detail.is_empty() => Some(Box::new(detail)),
        Ok(()) => None,
        Err(err) => {
            warn!(chart = %chart.title, error = %err, "failed to collect deployment diagnostics");
            None
        }
    }
}

/// Wrap a Helm failure, enriching it with failed-workload detail from the
/// release manifest when one exists. A diagnostics failure is appended to
/// the message rather than replacing the original error.
async fn enrich_install_error<C, H>(
    ctx: &WalkCtx<C, H>,
    chart: &Chart,
    release: &str,
    source: anyhow::Error,
    upgrade: bool,
) -> Error
where
    C: ClusterApi,
    H: HelmClient,
{
    let mut diagnostics = None;
    let mut source = source;
    match ctx.helm.release_manifest(&ctx.namespace, release).await {
        Ok(manifest) => {
            let mut detail = ChartError::new();
            match detail
                .populate_from_release(
                    ctx.cluster.as_ref(),
                    &ctx.namespace,
                    &manifest,
                    ctx.config.max_log_lines,
                )
                .await
            {
                Ok(()) if !detail.is_empty() => diagnostics = Some(Box::new(detail)),
                Ok(()) => {}
                Err(err) => {
                    source = source.context(format!("collecting failure diagnostics: {err}"));
                }
            }
        }
        Err(err) => {
            debug!(release = %release, error = %err, "no release manifest for diagnostics");
        }
    }
    if upgrade {
        Error::UpgradeFailed {
            chart: chart.title.clone(),
            source,
            diagnostics,
        }
    } else {
        Error::InstallFailed {
            chart: chart.title.clone(),
            source,
            diagnostics,
        }
    }
}

fn notify_completed<C, H>(ctx: &WalkCtx<C, H>, chart: &Chart, result: &Result<()>) {
    if let Some(callback) = &ctx.completed_callback {
        callback(chart, result.as_ref().err());
    }
}

/// Translate a cancellation caused by the global deadline into a timeout
/// error the caller can recognise.
fn map_deadline(err: Error, deadline_hit: &AtomicBool, timeout: Option<Duration>) -> Error {
    if deadline_hit.load(Ordering::Relaxed) {
        if let (Error::Cancelled, Some(d)) = (&err, timeout) {
            return Error::GlobalTimeout(d);
        }
    }
    err
}

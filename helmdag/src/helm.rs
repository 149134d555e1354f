// src/helm.rs

//! Helm installer seam.
//!
//! [`HelmClient`] is the capability interface the scheduler drives;
//! [`HelmCli`] implements it by shelling out to the `helm` binary, which
//! is how releases are actually created. Tests substitute a fake.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

/// Everything one install or upgrade invocation needs.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// Sanitized release name; on install Helm may be trusted to keep it,
    /// but the response name is authoritative.
    pub release_name: String,
    /// Chart directory or archive.
    pub chart_location: String,
    pub namespace: String,
    /// Raw YAML values blob; empty means no overrides.
    pub values: Vec<u8>,
    /// Pass `--wait` so Helm itself blocks until resources are ready.
    pub wait: bool,
    /// Deadline handed to `--wait`.
    pub wait_timeout: Duration,
}

/// An object that can create and mutate Helm releases.
#[async_trait]
pub trait HelmClient: Send + Sync + 'static {
    /// Install a chart and return the release name Helm assigned.
    async fn install_release(&self, req: ReleaseRequest) -> Result<String>;

    /// Upgrade an existing release in place.
    async fn upgrade_release(&self, req: ReleaseRequest) -> Result<()>;

    /// The rendered manifest of an installed release.
    async fn release_manifest(&self, namespace: &str, release: &str) -> Result<String>;
}

// Shared handles satisfy the trait too, so callers can keep a reference
// to the client they hand the manager.
#[async_trait]
impl<T: HelmClient> HelmClient for std::sync::Arc<T> {
    async fn install_release(&self, req: ReleaseRequest) -> Result<String> {
        self.as_ref().install_release(req).await
    }

    async fn upgrade_release(&self, req: ReleaseRequest) -> Result<()> {
        self.as_ref().upgrade_release(req).await
    }

    async fn release_manifest(&self, namespace: &str, release: &str) -> Result<String> {
        self.as_ref().release_manifest(namespace, release).await
    }
}

/// [`HelmClient`] backed by the `helm` binary.
pub struct HelmCli {
    binary: PathBuf,
    kube_context: Option<String>,
}

/// The part of `helm install -o json` output we care about.
#[derive(Debug, Deserialize)]
struct InstallOutput {
    name: String,
}

impl HelmCli {
    pub fn new(kube_context: Option<String>) -> Self {
        Self {
            binary: PathBuf::from("helm"),
            kube_context,
        }
    }

    /// Override the helm binary path (e.g. a vendored helm).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(helm = %self.binary.display(), ?args, "running helm");
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ctx) = &self.kube_context {
            cmd.arg("--kube-context").arg(ctx);
        }
        let output = cmd
            .output()
            .await
            .with_context(|| format!("spawning {}", self.binary.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "helm {} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or(""),
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Write a values blob to a temp file Helm can read. The file must
    /// outlive the helm invocation, so the handle is returned.
    fn values_file(values: &[u8]) -> Result<Option<NamedTempFile>> {
        if values.is_empty() {
            return Ok(None);
        }
        let mut file = NamedTempFile::new().context("creating values temp file")?;
        file.write_all(values).context("writing values temp file")?;
        file.flush().context("flushing values temp file")?;
        Ok(Some(file))
    }

    fn common_args(req: &ReleaseRequest, values: Option<&NamedTempFile>) -> Vec<String> {
        let mut args = vec![
            req.release_name.clone(),
            req.chart_location.clone(),
            "--namespace".to_string(),
            req.namespace.clone(),
        ];
        if let Some(file) = values {
            args.push("--values".to_string());
            args.push(file.path().display().to_string());
        }
        if req.wait {
            args.push("--wait".to_string());
            args.push("--timeout".to_string());
            args.push(format!("{}s", req.wait_timeout.as_secs()));
        }
        args
    }
}

#[async_trait]
impl HelmClient for HelmCli {
    async fn install_release(&self, req: ReleaseRequest) -> Result<String> {
        let values = Self::values_file(&req.values)?;
        let mut args = vec!["install".to_string()];
        args.extend(Self::common_args(&req, values.as_ref()));
        args.push("--output".to_string());
        args.push("json".to_string());
        let stdout = self.run(&args).await?;
        let parsed: InstallOutput = serde_json::from_str(&stdout)
            .with_context(|| format!("parsing helm install output for '{}'", req.release_name))?;
        Ok(parsed.name)
    }

    async fn upgrade_release(&self, req: ReleaseRequest) -> Result<()> {
        let values = Self::values_file(&req.values)?;
        let mut args = vec!["upgrade".to_string()];
        args.extend(Self::common_args(&req, values.as_ref()));
        self.run(&args).await?;
        Ok(())
    }

    async fn release_manifest(&self, namespace: &str, release: &str) -> Result<String> {
        let args = vec![
            "get".to_string(),
            "manifest".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        self.run(&args).await
    }
}

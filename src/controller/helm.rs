//! Helm release mechanism
//!
//! Wraps the `helm` CLI: registering the chart repository once at startup and
//! running an atomic `upgrade --install` with a values file.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::settings::ReleaseTarget;

/// `helm repo list` error text when nothing is registered
const NO_REPOSITORIES: &str = "no repositories to show";

/// Result of a release invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Deployed,
    /// Diagnostic text from the release tool
    Failed(String),
}

#[async_trait]
pub trait ReleaseMechanism: Send + Sync {
    /// Make sure the chart source is registered and up to date
    async fn ensure_repository(&self) -> Result<()>;

    /// Apply the release with the given values file
    async fn deploy(&self, values_file: &Path) -> ReleaseOutcome;
}

/// Drives the `helm` binary
pub struct Helm {
    target: ReleaseTarget,
}

impl Helm {
    pub fn new(target: ReleaseTarget) -> Self {
        Self { target }
    }

    async fn helm<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        debug!("Running {} {:?}", self.target.helm_binary, args);
        Command::new(&self.target.helm_binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
    }

    /// Run a helm command that must succeed, returning its stdout
    async fn checked(&self, what: &str, args: &[&str]) -> Result<String> {
        let output = self
            .helm(args.iter().copied())
            .await
            .map_err(|e| Error::ReleaseError(format!("Failed to {what}: {e}")))?;

        if !output.status.success() {
            return Err(Error::ReleaseError(format!(
                "Failed to {what}: {}",
                format_helm_error(&output)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `helm repo list` output; a fresh helm with no repositories counts as empty
    async fn list_repositories(&self) -> Result<String> {
        let output = self
            .helm(["repo", "list"])
            .await
            .map_err(|e| Error::ReleaseError(format!("Failed to list Helm repos: {e}")))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let message = format_helm_error(&output);
        if message.contains(NO_REPOSITORIES) {
            debug!("No Helm repositories configured yet");
            return Ok(String::new());
        }
        Err(Error::ReleaseError(format!(
            "Failed to list Helm repos: {message}"
        )))
    }
}

#[async_trait]
impl ReleaseMechanism for Helm {
    #[instrument(skip(self), fields(repository = %self.target.repository_alias()))]
    async fn ensure_repository(&self) -> Result<()> {
        let alias = self.target.repository_alias();

        let repos = self.list_repositories().await?;
        if !repository_listed(&repos, alias) {
            info!(
                "Adding Helm repository {} ({})",
                alias, self.target.chart_repository
            );
            self.checked(
                "add Helm repo",
                &["repo", "add", alias, self.target.chart_repository.as_str()],
            )
            .await?;
        }

        self.checked("update Helm repos", &["repo", "update"]).await?;
        info!("Helm repository {} is up to date", alias);
        Ok(())
    }

    #[instrument(skip(self), fields(release = %self.target.release, namespace = %self.target.namespace))]
    async fn deploy(&self, values_file: &Path) -> ReleaseOutcome {
        let output = match self.helm(upgrade_args(&self.target, values_file)).await {
            Ok(output) => output,
            Err(e) => {
                return ReleaseOutcome::Failed(format!(
                    "failed to run {}: {}",
                    self.target.helm_binary, e
                ))
            }
        };

        if output.status.success() {
            info!("Release {} deployed", self.target.release);
            ReleaseOutcome::Deployed
        } else {
            ReleaseOutcome::Failed(format_helm_error(&output))
        }
    }
}

/// Renders values instead of deploying them
pub struct DryRunRelease;

#[async_trait]
impl ReleaseMechanism for DryRunRelease {
    async fn ensure_repository(&self) -> Result<()> {
        info!("Dry run: skipping Helm repository setup");
        Ok(())
    }

    async fn deploy(&self, values_file: &Path) -> ReleaseOutcome {
        match tokio::fs::read_to_string(values_file).await {
            Ok(values) => {
                info!("Dry run: would deploy values\n{}", values);
                ReleaseOutcome::Deployed
            }
            Err(e) => ReleaseOutcome::Failed(format!(
                "failed to read {}: {}",
                values_file.display(),
                e
            )),
        }
    }
}

/// Arguments for `helm upgrade --install`
pub fn upgrade_args(target: &ReleaseTarget, values_file: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "upgrade",
        "--install",
        target.release.as_str(),
        target.chart.as_str(),
        "--version",
        target.chart_version.as_str(),
        "--atomic",
        "--namespace",
        target.namespace.as_str(),
        "--create-namespace",
        "--values",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(values_file.as_os_str().to_owned());
    args
}

/// Whether `helm repo list` output names the repository `alias`
fn repository_listed(repo_list: &str, alias: &str) -> bool {
    repo_list
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == alias)
}

/// Prefer stderr, fall back to stdout, then the exit code
fn format_helm_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stdout.is_empty() {
        return stdout;
    }
    format!(
        "helm exited with status {}",
        output.status.code().unwrap_or(-1)
    )
}

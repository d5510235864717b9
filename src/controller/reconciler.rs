//! Reconciliation loop for the Gatus release
//!
//! Notifications are consumed one at a time. Each one that arrives while idle
//! starts a deploy cycle; notifications that arrive during a cycle collapse
//! into a single pending re-check, run after the debounce interval.

use std::io::Write;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::values::{BaseTemplate, ConfigDocument};

use super::change::ChangeDetector;
use super::endpoints::derive_endpoints;
use super::helm::{ReleaseMechanism, ReleaseOutcome};
use super::merge::merge;
use super::routes::RouteSource;
use super::watch::NoticeReceiver;

/// Reconciler state between notifications
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Deploying,
    /// A notification arrived during the current cycle
    DeployingWithPending,
}

pub struct Reconciler<S, R> {
    source: S,
    release: R,
    base: BaseTemplate,
    values_override: Option<String>,
    detector: ChangeDetector,
    debounce: Duration,
    state: LoopState,
    /// Watch failure seen while draining notifications mid-cycle
    fatal: Option<Error>,
}

impl<S: RouteSource, R: ReleaseMechanism> Reconciler<S, R> {
    pub fn new(settings: &Settings, source: S, release: R) -> Self {
        Self {
            source,
            release,
            base: BaseTemplate::new(&settings.db_file),
            values_override: settings.values_override.clone(),
            detector: ChangeDetector::new(&settings.snapshot_file),
            debounce: settings.debounce,
            state: LoopState::Idle,
            fatal: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// One-time setup before the loop may run
    pub async fn start(&self) -> Result<()> {
        self.release.ensure_repository().await
    }

    /// Consume notifications until the queue closes or the watch fails
    pub async fn run(&mut self, mut notices: NoticeReceiver) -> Result<()> {
        info!("Starting Gatus reconciliation loop");

        while let Some(notice) = notices.recv().await {
            let notice = notice?;
            debug!("Upstream change: {:?}", notice);

            if self.record_notification() {
                self.reconcile(&mut notices).await;
            }

            if let Some(e) = self.fatal.take() {
                return Err(e);
            }
        }

        info!("Notification queue closed, stopping reconciliation loop");
        Ok(())
    }

    /// Apply a notification to the state; true when a cycle should start
    fn record_notification(&mut self) -> bool {
        match self.state {
            LoopState::Idle => true,
            LoopState::Deploying => {
                self.state = LoopState::DeployingWithPending;
                false
            }
            LoopState::DeployingWithPending => false,
        }
    }

    async fn reconcile(&mut self, notices: &mut NoticeReceiver) {
        match self.build_document().await {
            Ok(document) => {
                self.state = LoopState::Deploying;
                self.deploy_cycle(document, notices).await;
            }
            Err(e) => error!("Error processing change: {}", e),
        }
        self.state = LoopState::Idle;
    }

    /// Fetch all routes and derive this pass's configuration
    pub async fn build_document(&self) -> Result<ConfigDocument> {
        let routes = self.source.list_routes().await?;
        let mut document = merge(&self.base, self.values_override.as_deref());
        document.config.endpoints = derive_endpoints(&routes, document.defaults());
        debug!(
            "Derived {} endpoints from {} routing resources",
            document.endpoints().len(),
            routes.len()
        );
        Ok(document)
    }

    #[instrument(skip_all)]
    async fn deploy_cycle(&mut self, mut document: ConfigDocument, notices: &mut NoticeReceiver) {
        loop {
            match self.detector.has_changed(&document).await {
                Ok(true) => {
                    if !self.deploy(&document).await {
                        warn!("Deployment failed, waiting for the next change");
                        return;
                    }
                }
                Ok(false) => debug!("No configuration change, skipping deploy"),
                Err(e) => {
                    error!("Failed to compare configuration: {}", e);
                    return;
                }
            }

            self.drain_notifications(notices);
            if self.fatal.is_some() || self.state != LoopState::DeployingWithPending {
                return;
            }

            self.state = LoopState::Deploying;
            debug!("Changes arrived during deploy, re-checking in {:?}", self.debounce);
            tokio::time::sleep(self.debounce).await;

            document = match self.build_document().await {
                Ok(document) => document,
                Err(e) => {
                    error!("Error re-checking configuration: {}", e);
                    return;
                }
            };
        }
    }

    /// Fold already-queued notifications into the pending flag
    fn drain_notifications(&mut self, notices: &mut NoticeReceiver) {
        loop {
            match notices.try_recv() {
                Ok(Ok(notice)) => {
                    debug!("Coalescing upstream change: {:?}", notice);
                    self.record_notification();
                }
                Ok(Err(e)) => {
                    self.fatal = Some(e);
                    return;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return,
            }
        }
    }

    /// Render, write to a scoped temp file and hand to the release mechanism.
    /// The file is removed when this returns.
    async fn deploy(&self, document: &ConfigDocument) -> bool {
        let values = match write_values(document) {
            Ok(values) => values,
            Err(e) => {
                error!("Failed to write values file: {}", e);
                return false;
            }
        };

        info!(
            "Deploying Gatus with {} endpoints",
            document.endpoints().len()
        );
        match self.release.deploy(values.path()).await {
            ReleaseOutcome::Deployed => true,
            ReleaseOutcome::Failed(diagnostic) => {
                error!("Deployment failed: {}", diagnostic);
                false
            }
        }
    }
}

fn write_values(document: &ConfigDocument) -> Result<tempfile::NamedTempFile> {
    let rendered = document.to_yaml()?;
    let mut file = tempfile::Builder::new()
        .prefix("gatus-values-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(rendered.as_bytes())?;
    file.flush()?;
    Ok(file)
}

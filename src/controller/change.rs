//! Change detection against the last deployed configuration
//!
//! The canonical rendering of every candidate document is compared with the
//! snapshot file. Only a textual difference triggers a deploy.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::values::ConfigDocument;

pub struct ChangeDetector {
    snapshot_file: PathBuf,
}

impl ChangeDetector {
    pub fn new(snapshot_file: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_file: snapshot_file.into(),
        }
    }

    /// Whether `document` differs from the last snapshot.
    ///
    /// On a difference the snapshot is overwritten. A failed write is logged
    /// and still reports a change. Only rendering the document can fail.
    pub async fn has_changed(&self, document: &ConfigDocument) -> Result<bool> {
        let canonical = document.canonical()?;

        if self.load_snapshot().await.as_deref() == Some(canonical.as_str()) {
            debug!("Configuration unchanged");
            return Ok(false);
        }

        info!("Configuration changed");
        if let Err(e) = tokio::fs::write(&self.snapshot_file, canonical.as_bytes()).await {
            error!(
                "Failed to save configuration snapshot to {}: {}",
                self.snapshot_file.display(),
                e
            );
        }
        Ok(true)
    }

    /// Last snapshot, or `None` when there is none or it cannot be read
    async fn load_snapshot(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.snapshot_file).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No configuration snapshot at {}", self.snapshot_file.display());
                None
            }
            Err(e) => {
                warn!(
                    "Failed to read configuration snapshot {}: {}",
                    self.snapshot_file.display(),
                    e
                );
                None
            }
        }
    }
}

//! Runtime settings for the operator
//!
//! Built once at startup from CLI flags / environment variables and shared
//! read-only by the merger, the release mechanism and the reconciliation loop.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_CHART: &str = "gatus/gatus";
pub const DEFAULT_CHART_REPOSITORY: &str = "https://avakarev.github.io/gatus-chart";
pub const DEFAULT_CHART_VERSION: &str = "2.5.5";
pub const DEFAULT_NAMESPACE: &str = "gatus";
pub const DEFAULT_RELEASE: &str = "gatus";
pub const DEFAULT_DB_FILE: &str = "/srv/gatus.db";
pub const DEFAULT_SNAPSHOT_FILE: &str = "/tmp/gatus-config.tmp.yaml";
pub const DEFAULT_DEBOUNCE_SECONDS: f64 = 1.0;

/// Identity of the single Helm release managed by this process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseTarget {
    /// Chart reference, e.g. `gatus/gatus`
    pub chart: String,
    pub chart_repository: String,
    pub chart_version: String,
    pub namespace: String,
    pub release: String,
    pub helm_binary: String,
}

impl ReleaseTarget {
    /// Repository alias registered with helm: the chart reference up to the first `/`
    pub fn repository_alias(&self) -> &str {
        self.chart
            .split_once('/')
            .map(|(alias, _)| alias)
            .unwrap_or(&self.chart)
    }
}

impl Default for ReleaseTarget {
    fn default() -> Self {
        Self {
            chart: DEFAULT_CHART.to_string(),
            chart_repository: DEFAULT_CHART_REPOSITORY.to_string(),
            chart_version: DEFAULT_CHART_VERSION.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            release: DEFAULT_RELEASE.to_string(),
            helm_binary: "helm".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub target: ReleaseTarget,
    /// Raw user override document (YAML or JSON); empty means none
    pub values_override: Option<String>,
    /// Location of Gatus' own sqlite database inside its pod
    pub db_file: PathBuf,
    /// Where the last deployed canonical configuration is kept
    pub snapshot_file: PathBuf,
    pub debounce: Duration,
    pub dry_run: bool,
}

impl Settings {
    /// Validate the debounce interval and normalise the override text
    pub fn new(
        target: ReleaseTarget,
        values_override: Option<String>,
        db_file: PathBuf,
        snapshot_file: PathBuf,
        debounce_seconds: f64,
        dry_run: bool,
    ) -> Result<Self> {
        if !debounce_seconds.is_finite() || debounce_seconds < 0.0 {
            return Err(Error::ConfigError(format!(
                "debounce interval must be a non-negative number of seconds, got {debounce_seconds}"
            )));
        }

        let values_override = values_override.filter(|v| !v.trim().is_empty());

        Ok(Self {
            target,
            values_override,
            db_file,
            snapshot_file,
            debounce: Duration::from_secs_f64(debounce_seconds),
            dry_run,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target: ReleaseTarget::default(),
            values_override: None,
            db_file: PathBuf::from(DEFAULT_DB_FILE),
            snapshot_file: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            debounce: Duration::from_secs_f64(DEFAULT_DEBOUNCE_SECONDS),
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_alias() {
        let target = ReleaseTarget::default();
        assert_eq!(target.repository_alias(), "gatus");

        let bare = ReleaseTarget {
            chart: "standalone".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.repository_alias(), "standalone");
    }

    #[test]
    fn test_debounce_validation() {
        let ok = Settings::new(
            ReleaseTarget::default(),
            None,
            DEFAULT_DB_FILE.into(),
            DEFAULT_SNAPSHOT_FILE.into(),
            0.25,
            false,
        )
        .unwrap();
        assert_eq!(ok.debounce, Duration::from_millis(250));

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let result = Settings::new(
                ReleaseTarget::default(),
                None,
                DEFAULT_DB_FILE.into(),
                DEFAULT_SNAPSHOT_FILE.into(),
                bad,
                false,
            );
            assert!(matches!(result, Err(Error::ConfigError(_))));
        }
    }

    #[test]
    fn test_blank_override_is_none() {
        let settings = Settings::new(
            ReleaseTarget::default(),
            Some("   \n".to_string()),
            DEFAULT_DB_FILE.into(),
            DEFAULT_SNAPSHOT_FILE.into(),
            1.0,
            false,
        )
        .unwrap();
        assert!(settings.values_override.is_none());
    }
}

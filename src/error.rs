//! Error types for the Gatus ingress operator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API call failed
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The Ingress watch stream failed; the reconciliation loop cannot continue
    #[error("Ingress watch failed: {0}")]
    WatchError(#[from] kube::runtime::watcher::Error),

    /// YAML parsing or rendering failed
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON parsing failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Filesystem or process I/O failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The release tool (helm) could not be prepared or invoked
    #[error("Release error: {0}")]
    ReleaseError(String),

    /// Invalid operator configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

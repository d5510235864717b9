//! Typed model of the Gatus chart values document
//!
//! The document is a root mapping whose `config` section is partly owned by
//! the operator (`storage`, `endpoints` and the shared endpoint defaults) and
//! partly passed through from the user override. Everything outside `config`
//! is passed through verbatim.

use std::path::Path;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// Top-level key holding the Gatus configuration
pub const CONFIG_KEY: &str = "config";
/// Well-known key of the shared endpoint defaults inside `config`
pub const DEFAULTS_KEY: &str = "x-default-endpoint";
/// Anchor name identifying the shared endpoint defaults fragment
pub const DEFAULTS_ANCHOR: &str = "x-default-endpoint";
pub const STORAGE_KEY: &str = "storage";
pub const ENDPOINTS_KEY: &str = "endpoints";

/// Keys under `config` that are always derived by the operator
pub const PROTECTED_CONFIG_KEYS: [&str; 2] = [ENDPOINTS_KEY, STORAGE_KEY];

/// Built-in polling interval for every endpoint
pub const DEFAULT_INTERVAL: &str = "1m";
/// Built-in success condition for every endpoint
pub const DEFAULT_CONDITION: &str = "[STATUS] == 200";

/// Gatus persistent storage section
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StorageDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    pub path: String,
}

impl StorageDescriptor {
    /// Local sqlite database at `path`
    pub fn sqlite(path: &Path) -> Self {
        Self {
            type_: "sqlite".to_string(),
            path: path.display().to_string(),
        }
    }
}

/// Non-owning reference from an endpoint to the shared defaults fragment,
/// resolved by anchor name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DefaultsLink(String);

impl DefaultsLink {
    pub fn anchor(&self) -> &str {
        &self.0
    }
}

/// Shared default settings merged into every endpoint.
///
/// Exactly one exists per document. `key` is where it lives under `config`
/// (normally `x-default-endpoint`, or the user's own key when the user tagged
/// a differently named fragment with the anchor); `anchor` is the stable
/// identity endpoints link to.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultsTemplate {
    pub key: String,
    pub anchor: String,
    pub settings: Mapping,
}

impl DefaultsTemplate {
    /// `interval: 1m` with a single `[STATUS] == 200` condition
    pub fn builtin() -> Self {
        let mut settings = Mapping::new();
        settings.insert("interval".into(), DEFAULT_INTERVAL.into());
        settings.insert(
            "conditions".into(),
            Value::Sequence(vec![DEFAULT_CONDITION.into()]),
        );
        Self::at(DEFAULTS_KEY, settings)
    }

    /// Defaults fragment stored under `key`, carrying the standard anchor
    pub fn at(key: impl Into<String>, settings: Mapping) -> Self {
        Self {
            key: key.into(),
            anchor: DEFAULTS_ANCHOR.to_string(),
            settings,
        }
    }

    pub fn link(&self) -> DefaultsLink {
        DefaultsLink(self.anchor.clone())
    }
}

/// One monitored URL derived from an Ingress rule path
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EndpointRecord {
    pub name: String,
    pub group: String,
    pub url: String,
    #[serde(skip)]
    pub defaults: DefaultsLink,
}

/// Operator-supplied base for every derived document
#[derive(Clone, Debug, PartialEq)]
pub struct BaseTemplate {
    pub storage: StorageDescriptor,
    pub defaults: DefaultsTemplate,
}

impl BaseTemplate {
    pub fn new(db_file: &Path) -> Self {
        Self {
            storage: StorageDescriptor::sqlite(db_file),
            defaults: DefaultsTemplate::builtin(),
        }
    }
}

/// The `config` section of the chart values
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSection {
    pub defaults: DefaultsTemplate,
    /// User-supplied keys other than the protected ones and the defaults fragment
    pub extra: Mapping,
    pub storage: StorageDescriptor,
    pub endpoints: Vec<EndpointRecord>,
}

/// Full chart values document
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigDocument {
    pub config: ConfigSection,
    /// Top-level user sections other than `config`, in user order
    pub sections: Mapping,
}

impl ConfigDocument {
    /// Document with no user content and no endpoints
    pub fn from_base(base: &BaseTemplate) -> Self {
        Self {
            config: ConfigSection {
                defaults: base.defaults.clone(),
                extra: Mapping::new(),
                storage: base.storage.clone(),
                endpoints: Vec::new(),
            },
            sections: Mapping::new(),
        }
    }

    pub fn defaults(&self) -> &DefaultsTemplate {
        &self.config.defaults
    }

    pub fn endpoints(&self) -> &[EndpointRecord] {
        &self.config.endpoints
    }

    /// Resolve an endpoint's defaults link against this document
    pub fn resolve(&self, link: &DefaultsLink) -> Option<&DefaultsTemplate> {
        (self.config.defaults.anchor == link.anchor()).then_some(&self.config.defaults)
    }
}

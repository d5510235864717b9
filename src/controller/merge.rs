//! Merging of the user values override with operator-managed configuration
//!
//! The user may supply any chart values. Top-level sections are copied as-is,
//! `config` is merged key by key, and `config.storage` / `config.endpoints`
//! always come from the operator.

use serde_yaml::{Mapping, Value};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::values::{
    BaseTemplate, ConfigDocument, DefaultsTemplate, CONFIG_KEY, DEFAULTS_ANCHOR, DEFAULTS_KEY,
    PROTECTED_CONFIG_KEYS,
};

/// Parse the raw override text.
///
/// Accepts YAML, or JSON that YAML rejects (e.g. tab-indented JSON). An empty
/// document yields `None`; anything other than a mapping is an error.
pub fn parse_override(text: &str) -> Result<Option<Mapping>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = match serde_yaml::from_str(text) {
        Ok(value) => value,
        Err(yaml_err) if looks_like_json(text) => {
            debug!("Override is not valid YAML ({}), retrying as JSON", yaml_err);
            serde_json::from_str(text)?
        }
        Err(e) => return Err(e.into()),
    };

    match value {
        Value::Null => Ok(None),
        Value::Mapping(mapping) => Ok(Some(mapping)),
        other => Err(Error::ConfigError(format!(
            "values override must be a mapping, got {}",
            value_kind(&other)
        ))),
    }
}

/// Build the document for this pass from the base template and the optional
/// user override. The returned document has no endpoints yet.
///
/// A malformed override is logged and ignored.
pub fn merge(base: &BaseTemplate, user_override: Option<&str>) -> ConfigDocument {
    let mut document = ConfigDocument::from_base(base);

    let Some(text) = user_override else {
        return document;
    };

    let user_values = match parse_override(text) {
        Ok(Some(values)) => values,
        Ok(None) => return document,
        Err(e) => {
            error!("Invalid values override, deploying without it: {}", e);
            return document;
        }
    };

    let mut user_config = Mapping::new();
    for (key, value) in user_values {
        if key.as_str() != Some(CONFIG_KEY) {
            document.sections.insert(key, value);
            continue;
        }

        match value {
            Value::Mapping(config) => {
                for (config_key, config_value) in config {
                    if is_protected(&config_key) {
                        debug!("Ignoring operator-managed key config.{:?}", config_key);
                        continue;
                    }
                    user_config.insert(config_key, config_value);
                }
            }
            other => warn!(
                "Ignoring values override `config` section: expected a mapping, got {}",
                value_kind(&other)
            ),
        }
    }

    if let Some(defaults) = take_user_defaults(&mut user_config, text) {
        debug!("Using endpoint defaults from override key {}", defaults.key);
        document.config.defaults = defaults;
    }
    document.config.extra = user_config;

    document
}

/// Pull the user's defaults fragment out of `config`, if there is one.
///
/// The well-known key wins; otherwise the first mapping directly under
/// `config` whose key carries the defaults anchor in the override text.
fn take_user_defaults(config: &mut Mapping, text: &str) -> Option<DefaultsTemplate> {
    match take_entry(config, DEFAULTS_KEY) {
        Some(Value::Mapping(settings)) => {
            return Some(DefaultsTemplate::at(DEFAULTS_KEY, settings));
        }
        Some(other) => warn!(
            "Ignoring config.{}: expected a mapping, got {}",
            DEFAULTS_KEY,
            value_kind(&other)
        ),
        None => {}
    }

    let key = anchored_config_keys(text, DEFAULTS_ANCHOR)
        .into_iter()
        .find(|key| matches!(config.get(key.as_str()), Some(Value::Mapping(_))))?;
    match take_entry(config, &key) {
        Some(Value::Mapping(settings)) => Some(DefaultsTemplate::at(key, settings)),
        _ => None,
    }
}

/// Keys of the direct children of the top-level `config` block that are
/// declared with `&anchor`, in document order
fn anchored_config_keys(text: &str, anchor: &str) -> Vec<String> {
    let marker = format!("&{anchor}");
    let mut keys = Vec::new();
    let mut in_config = false;
    let mut child_indent = None;

    for line in text.lines() {
        let body = line.trim_start();
        if body.is_empty() || body.starts_with('#') {
            continue;
        }

        let indent = line.len() - body.len();
        if indent == 0 {
            in_config = entry_key(body) == Some(CONFIG_KEY);
            child_indent = None;
            continue;
        }
        if !in_config || indent != *child_indent.get_or_insert(indent) {
            continue;
        }

        if let Some(key) = anchored_entry(body, &marker) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Key of a `key: &marker` block mapping entry
fn anchored_entry<'a>(body: &'a str, marker: &str) -> Option<&'a str> {
    let (_, rest) = body.split_once(':')?;
    let rest = rest.trim_start().strip_prefix(marker)?;
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    entry_key(body).filter(|key| !key.is_empty() && !key.starts_with('-'))
}

fn entry_key(body: &str) -> Option<&str> {
    let (key, _) = body.split_once(':')?;
    Some(key.trim().trim_matches(|c| c == '"' || c == '\''))
}

/// Remove `key` from `mapping`, keeping the order of the remaining entries
fn take_entry(mapping: &mut Mapping, key: &str) -> Option<Value> {
    if !mapping.contains_key(key) {
        return None;
    }

    let mut taken = None;
    *mapping = std::mem::take(mapping)
        .into_iter()
        .filter_map(|(k, v)| {
            if taken.is_none() && k.as_str() == Some(key) {
                taken = Some(v);
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    taken
}

fn is_protected(key: &Value) -> bool {
    key.as_str()
        .is_some_and(|k| PROTECTED_CONFIG_KEYS.contains(&k))
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::values::{StorageDescriptor, DEFAULT_INTERVAL};

    fn base() -> BaseTemplate {
        BaseTemplate::new(Path::new("/srv/gatus.db"))
    }

    #[test]
    fn test_no_override() {
        let doc = merge(&base(), None);

        assert!(doc.endpoints().is_empty());
        assert!(doc.sections.is_empty());
        assert!(doc.config.extra.is_empty());
        assert_eq!(doc.defaults(), &DefaultsTemplate::builtin());
        assert_eq!(
            doc.config.storage,
            StorageDescriptor::sqlite(Path::new("/srv/gatus.db"))
        );
        assert_eq!(
            doc.defaults().settings["interval"],
            Value::from(DEFAULT_INTERVAL)
        );
    }

    #[test]
    fn test_protected_keys_are_dropped() {
        let text = r#"
config:
  storage:
    type: postgres
    path: postgres://elsewhere
  endpoints:
    - name: injected
      url: https://evil.example
  ui:
    title: Cluster status
"#;
        let doc = merge(&base(), Some(text));

        assert_eq!(doc.config.storage, base().storage);
        assert!(doc.endpoints().is_empty());
        assert_eq!(doc.config.extra.len(), 1);
        assert_eq!(doc.config.extra["ui"]["title"], Value::from("Cluster status"));

        let yaml = doc.to_yaml().unwrap();
        assert!(!yaml.contains("postgres"));
        assert!(!yaml.contains("evil.example"));
    }

    #[test]
    fn test_top_level_sections_pass_through_in_order() {
        let text = "ingress:\n  enabled: true\nresources:\n  limits:\n    memory: 64Mi\n";
        let doc = merge(&base(), Some(text));

        let keys: Vec<&str> = doc.sections.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["ingress", "resources"]);
        assert_eq!(doc.sections["ingress"]["enabled"], Value::Bool(true));
    }

    #[test]
    fn test_malformed_override_is_ignored() {
        let doc = merge(&base(), Some("config: [unterminated"));
        assert_eq!(doc, ConfigDocument::from_base(&base()));

        let doc = merge(&base(), Some("just a string"));
        assert_eq!(doc, ConfigDocument::from_base(&base()));
    }

    #[test]
    fn test_json_override() {
        let text = "{\n\t\"config\": {\"ui\": {\"title\": \"JSON\"}, \"storage\": {\"type\": \"memory\"}},\n\t\"replicaCount\": 2\n}";
        let doc = merge(&base(), Some(text));

        assert_eq!(doc.config.extra["ui"]["title"], Value::from("JSON"));
        assert_eq!(doc.config.storage, base().storage);
        assert_eq!(doc.sections["replicaCount"], Value::from(2));
    }

    #[test]
    fn test_well_known_defaults_key_is_reused() {
        let text = r#"
config:
  x-default-endpoint:
    interval: 30s
    conditions:
      - "[STATUS] == 200"
      - "[RESPONSE_TIME] < 1000"
"#;
        let doc = merge(&base(), Some(text));

        assert_eq!(doc.defaults().key, DEFAULTS_KEY);
        assert_eq!(doc.defaults().settings["interval"], Value::from("30s"));
        assert!(doc.config.extra.is_empty());
    }

    #[test]
    fn test_anchored_defaults_under_other_key_are_reused() {
        let text = r#"
config:
  ui:
    title: Status
  my-custom-endpoint: &x-default-endpoint
    interval: 30s
    conditions:
      - "[STATUS] == 200"
      - "[RESPONSE_TIME] < 1000"
  alerting: {}
"#;
        let doc = merge(&base(), Some(text));

        let defaults = doc.defaults();
        assert_eq!(defaults.key, "my-custom-endpoint");
        assert_eq!(defaults.anchor, DEFAULTS_ANCHOR);
        assert_eq!(defaults.settings["interval"], Value::from("30s"));
        assert_eq!(defaults.settings["conditions"].as_sequence().unwrap().len(), 2);

        let keys: Vec<&str> = doc.config.extra.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["ui", "alerting"]);
    }

    #[test]
    fn test_unanchored_custom_key_is_not_defaults() {
        let text = "config:\n  my-custom-endpoint:\n    interval: 30s\n";
        let doc = merge(&base(), Some(text));

        assert_eq!(doc.defaults(), &DefaultsTemplate::builtin());
        assert!(doc.config.extra.contains_key("my-custom-endpoint"));
    }

    #[test]
    fn test_non_mapping_defaults_fall_back_to_builtin() {
        let doc = merge(&base(), Some("config:\n  x-default-endpoint: 5m\n"));
        assert_eq!(doc.defaults(), &DefaultsTemplate::builtin());
        assert!(doc.config.extra.is_empty());
    }

    #[test]
    fn test_non_mapping_config_is_ignored() {
        let doc = merge(&base(), Some("config: nope\nother: 1\n"));
        assert!(doc.config.extra.is_empty());
        assert_eq!(doc.sections.len(), 1);
    }

    #[test]
    fn test_anchor_outside_config_is_not_defaults() {
        let text = "ui: &x-default-endpoint\n  interval: 30s\nconfig:\n  ui:\n    title: Status\n";
        let doc = merge(&base(), Some(text));

        assert_eq!(doc.defaults(), &DefaultsTemplate::builtin());
        assert_eq!(doc.config.extra["ui"]["title"], Value::from("Status"));
        assert_eq!(doc.sections["ui"]["interval"], Value::from("30s"));

        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("  x-default-endpoint: &x-default-endpoint\n    interval: 1m\n"));
        assert!(!yaml.contains("ui: &x-default-endpoint"));
    }

    #[test]
    fn test_anchor_inside_config_wins_over_earlier_one() {
        let text = r#"
ingress: &x-default-endpoint
  enabled: true
config:
  ingress:
    hosts: []
  probes: &x-default-endpoint
    interval: 45s
"#;
        let doc = merge(&base(), Some(text));

        assert_eq!(doc.defaults().key, "probes");
        assert_eq!(doc.defaults().settings["interval"], Value::from("45s"));
        assert!(doc.config.extra.contains_key("ingress"));
    }

    #[test]
    fn test_anchored_config_keys_scan() {
        let keys = |text: &str| anchored_config_keys(text, DEFAULTS_ANCHOR);

        assert_eq!(keys("config:\n  mine: &x-default-endpoint\n"), vec!["mine"]);
        assert_eq!(
            keys("config:\n  # note\n  \"quoted\": &x-default-endpoint # note\n"),
            vec!["quoted"]
        );
        assert_eq!(
            keys("config:\n  a:\n    nested: &x-default-endpoint\n  b: &x-default-endpoint\n"),
            vec!["b"]
        );
        assert_eq!(
            keys("config:\n  a: &x-default-endpoint\nother:\n  b: &x-default-endpoint\n"),
            vec!["a"]
        );
        assert!(keys("top: &x-default-endpoint\n").is_empty());
        assert!(keys("config:\n  a: &x-default-endpoint-2\n").is_empty());
        assert!(keys("config:\n  - a: &x-default-endpoint\n").is_empty());
        assert!(keys("config:\n  a: *x-default-endpoint\n").is_empty());
    }

    #[test]
    fn test_take_entry_preserves_order() {
        let mut mapping: Mapping = serde_yaml::from_str("a: 1\nb: 2\nc: 3\n").unwrap();
        assert_eq!(take_entry(&mut mapping, "b"), Some(Value::from(2)));
        assert_eq!(take_entry(&mut mapping, "zz"), None);

        let keys: Vec<&str> = mapping.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_parse_override_empty_document() {
        assert!(parse_override("").unwrap().is_none());
        assert!(parse_override("~\n").unwrap().is_none());
        assert!(matches!(parse_override("[1, 2]"), Err(Error::ConfigError(_))));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn arb_leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::from),
                any::<i64>().prop_map(Value::from),
                "[a-z ]{0,12}".prop_map(Value::from),
            ]
        }

        fn arb_value() -> impl Strategy<Value = Value> {
            arb_leaf().prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Sequence),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(|m| {
                        Value::Mapping(m.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
                    }),
                ]
            })
        }

        fn arb_config_key() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("storage".to_string()),
                Just("endpoints".to_string()),
                Just(DEFAULTS_KEY.to_string()),
                "[a-z][a-z-]{0,9}",
            ]
        }

        proptest! {
            /// Whatever the override puts under `config`, storage and
            /// endpoints stay operator-owned.
            #[test]
            fn operator_keys_never_come_from_override(
                config in prop::collection::btree_map(arb_config_key(), arb_value(), 0..6),
                top_level in prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..3),
            ) {
                let mut values = Mapping::new();
                values.insert(
                    CONFIG_KEY.into(),
                    Value::Mapping(config.into_iter().map(|(k, v)| (Value::from(k), v)).collect()),
                );
                for (key, value) in top_level {
                    if key != CONFIG_KEY {
                        values.insert(key.into(), value);
                    }
                }
                let text = serde_yaml::to_string(&values).unwrap();

                let doc = merge(&base(), Some(&text));
                prop_assert_eq!(&doc.config.storage, &base().storage);
                prop_assert!(doc.endpoints().is_empty());
                prop_assert!(!doc.config.extra.keys().any(is_protected));

                let rendered: Value = serde_yaml::from_str(&doc.to_yaml().unwrap()).unwrap();
                prop_assert_eq!(&rendered["config"]["storage"]["type"], &Value::from("sqlite"));
                prop_assert_eq!(&rendered["config"]["storage"]["path"], &Value::from("/srv/gatus.db"));
                prop_assert_eq!(&rendered["config"]["endpoints"], &Value::Sequence(vec![]));
            }
        }
    }
}

//! YAML rendering of chart values
//!
//! serde_yaml cannot emit anchors or aliases, so the operator-owned part of
//! `config` is laid out here: the defaults fragment is written once with an
//! anchor and every endpoint pulls it in through a `<<: *anchor` merge key.
//! All leaf content is still produced by serde_yaml.

use serde_yaml::{Mapping, Value};

use super::types::{
    ConfigDocument, CONFIG_KEY, ENDPOINTS_KEY, STORAGE_KEY,
};
use crate::error::{Error, Result};

const INDENT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyOrder {
    /// Keep user keys in the order they were supplied
    Document,
    /// Sort every user mapping recursively
    Sorted,
}

impl ConfigDocument {
    /// Values file handed to helm
    pub fn to_yaml(&self) -> Result<String> {
        render(self, KeyOrder::Document)
    }

    /// Deterministic rendering used for change detection.
    ///
    /// Differences in user key order or source formatting do not show up
    /// here; aliases are kept in referential form exactly as in `to_yaml`.
    pub fn canonical(&self) -> Result<String> {
        render(self, KeyOrder::Sorted)
    }
}

fn render(doc: &ConfigDocument, order: KeyOrder) -> Result<String> {
    let mut out = String::new();
    let config = &doc.config;

    out.push_str(&render_key(&CONFIG_KEY.into())?);
    out.push_str(":\n");

    let defaults = &config.defaults;
    let settings = arrange(&Value::Mapping(defaults.settings.clone()), order);
    let key = render_key(&defaults.key.clone().into())?;
    match &settings {
        Value::Mapping(m) if m.is_empty() => {
            push_indented(&mut out, &format!("{key}: &{} {{}}\n", defaults.anchor), INDENT);
        }
        _ => {
            push_indented(&mut out, &format!("{key}: &{}\n", defaults.anchor), INDENT);
            push_indented(&mut out, &serde_yaml::to_string(&settings)?, INDENT * 2);
        }
    }

    for (key, value) in entries(&config.extra, order) {
        push_entry(&mut out, &key, &value, INDENT)?;
    }

    push_entry(
        &mut out,
        &STORAGE_KEY.into(),
        &serde_yaml::to_value(&config.storage)?,
        INDENT,
    )?;

    render_endpoints(&mut out, doc)?;

    for (key, value) in entries(&doc.sections, order) {
        push_entry(&mut out, &key, &value, 0)?;
    }

    Ok(out)
}

/// Endpoint list; every link must resolve to the document's defaults anchor
fn render_endpoints(out: &mut String, doc: &ConfigDocument) -> Result<()> {
    let endpoints = doc.endpoints();
    if endpoints.is_empty() {
        push_indented(out, &format!("{ENDPOINTS_KEY}: []\n"), INDENT);
        return Ok(());
    }

    push_indented(out, &format!("{ENDPOINTS_KEY}:\n"), INDENT);
    for endpoint in endpoints {
        let defaults = doc.resolve(&endpoint.defaults).ok_or_else(|| {
            Error::ConfigError(format!(
                "endpoint {} links to unknown defaults anchor {}",
                endpoint.name,
                endpoint.defaults.anchor()
            ))
        })?;
        push_indented(out, &format!("- <<: *{}\n", defaults.anchor), INDENT);
        push_indented(out, &serde_yaml::to_string(endpoint)?, INDENT * 2);
    }
    Ok(())
}

/// Render `key: value` as a single-entry mapping at `indent`
fn push_entry(out: &mut String, key: &Value, value: &Value, indent: usize) -> Result<()> {
    let mut entry = Mapping::new();
    entry.insert(key.clone(), value.clone());
    push_indented(out, &serde_yaml::to_string(&entry)?, indent);
    Ok(())
}

fn render_key(key: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(key)?.trim_end().to_string())
}

fn push_indented(out: &mut String, text: &str, indent: usize) {
    for line in text.lines() {
        if !line.is_empty() {
            out.extend(std::iter::repeat(' ').take(indent));
            out.push_str(line);
        }
        out.push('\n');
    }
}

fn entries(mapping: &Mapping, order: KeyOrder) -> Vec<(Value, Value)> {
    match arrange(&Value::Mapping(mapping.clone()), order) {
        Value::Mapping(m) => m.into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Apply `order` to every mapping nested in `value`
fn arrange(value: &Value, order: KeyOrder) -> Value {
    if order == KeyOrder::Document {
        return value.clone();
    }

    match value {
        Value::Mapping(mapping) => {
            let mut sorted: Vec<(String, Value, Value)> = mapping
                .iter()
                .map(|(k, v)| (sort_key(k), k.clone(), arrange(v, order)))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Mapping(sorted.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
        Value::Sequence(items) => {
            Value::Sequence(items.iter().map(|v| arrange(v, order)).collect())
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.clone();
            tagged.value = arrange(&tagged.value, order);
            Value::Tagged(tagged)
        }
        other => other.clone(),
    }
}

fn sort_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}

//! Chain folding and materialization
//!
//! Folds an extension chain into one document, fills every default, resolves
//! every reference and validates the result.

mod filter;

use lh_merge::{ArrayStrategy, EntryKey, MergePolicy};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{AuditDefinition, Category, Config, Group, Pass, PassFields, Settings};
use crate::document::{json_kind, Bindings, ConfigDocument, DEFAULT_PASS_NAME};
use crate::error::ConfigError;
use crate::reference::{AuditSpec, GathererSpec, ReferenceResolver, DIR_KEY};
use crate::units::ModuleLoader;
use crate::validate;

const KNOWN_FIELDS: &[&str] = &["settings", "passes", "audits", "categories", "groups"];

/// Merge policy for folding documents
pub fn fold_policy() -> Result<MergePolicy, ConfigError> {
    let reference_key = EntryKey::first_of(&["path", "implementation", "instance"]);

    Ok(MergePolicy::builder()
        .rule("settings.**", ArrayStrategy::Replace)
        .rule("passes.*.gatherers.*.options.**", ArrayStrategy::Replace)
        .rule("audits.*.options.**", ArrayStrategy::Replace)
        .rule(
            "passes",
            ArrayStrategy::MergeByKey(EntryKey::field("passName").with_fallback(DEFAULT_PASS_NAME)),
        )
        .rule("passes.*.gatherers", ArrayStrategy::MergeByKey(reference_key.clone()))
        .rule("passes.*.blockedUrlPatterns", ArrayStrategy::ConcatDedupe)
        .rule("audits", ArrayStrategy::MergeByKey(reference_key))
        .rule("categories.*.auditRefs", ArrayStrategy::MergeByKey(EntryKey::field("id")))
        .clear_on_empty("categories")
        .clear_on_empty("groups")
        .fallback(ArrayStrategy::ConcatDedupe)
        .build()?)
}

/// Turns a chain into a [`Config`]
pub struct Normalizer<'a> {
    loader: &'a dyn ModuleLoader,
    flags: Option<&'a Value>,
}

impl<'a> Normalizer<'a> {
    pub fn new(loader: &'a dyn ModuleLoader) -> Self {
        Self { loader, flags: None }
    }

    /// Settings overrides applied over the folded chain
    pub fn with_flags(mut self, flags: Option<&'a Value>) -> Self {
        self.flags = flags;
        self
    }

    /// Fold `chain` (most general first) and materialize it
    pub fn normalize(&self, chain: Vec<ConfigDocument>) -> Result<Config, ConfigError> {
        let (merged, bindings) = fold_chain(chain)?;
        let mut merged = match merged {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for key in merged.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                tracing::warn!(field = %key, "ignoring unknown configuration field");
            }
        }

        let settings = build_settings(merged.remove("settings"), self.flags)?;
        let references = ReferenceResolver::new(self.loader);

        let passes = match take_array(&mut merged, "passes")? {
            Some(items) => Some(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, pass)| build_pass(index, pass, &bindings, &references))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let audits = match take_array(&mut merged, "audits")? {
            Some(items) => Some(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| build_audit(index, entry, &bindings, &references))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let categories: Option<BTreeMap<String, Category>> = take_typed(&mut merged, "categories")?;
        let groups: Option<BTreeMap<String, Group>> = take_typed(&mut merged, "groups")?;

        let mut config = Config {
            settings,
            passes,
            audits,
            categories,
            groups,
        };
        filter::apply(&mut config);
        validate::validate(&config)?;
        Ok(config)
    }
}

/// Fold every document of the chain, honoring each one's `overwriteArrays`
fn fold_chain(chain: Vec<ConfigDocument>) -> Result<(Value, Bindings), ConfigError> {
    let policy = fold_policy()?;
    let mut merged = Value::Null;
    let mut bindings = Bindings::default();

    for document in chain {
        let origin = document.origin().to_string();
        let base_dir = document.base_dir().map(Path::to_path_buf);
        let (mut body, document_bindings, _) = document.into_parts();

        body.remove("extends");
        let replaced = take_overwrite_arrays(&mut body, &origin)?;
        expand_references(&mut body, base_dir.as_deref());

        let layer_policy = if replaced.is_empty() {
            policy.clone()
        } else {
            policy.with_replaced(&replaced)?
        };
        merged = lh_merge::merge(merged, Value::Object(body), &layer_policy, false)?;
        bindings.extend(document_bindings);
        tracing::debug!(document = %origin, replaced = ?replaced, "folded document");
    }
    Ok((merged, bindings))
}

fn take_overwrite_arrays(body: &mut Map<String, Value>, origin: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDocument {
        location: origin.to_string(),
        reason,
    };
    match body.remove("overwriteArrays") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(pattern) => Ok(pattern),
                other => Err(invalid(format!(
                    "'overwriteArrays' entries must be strings, found {}",
                    json_kind(&other)
                ))),
            })
            .collect(),
        Some(other) => Err(invalid(format!(
            "'overwriteArrays' must be an array, found {}",
            json_kind(&other)
        ))),
    }
}

/// Rewrite bare-string references as `{"path": ...}` and stamp path
/// references with the defining document's directory
fn expand_references(body: &mut Map<String, Value>, base_dir: Option<&Path>) {
    if let Some(Value::Array(passes)) = body.get_mut("passes") {
        for pass in passes.iter_mut() {
            if let Some(Value::Array(gatherers)) = pass.get_mut("gatherers") {
                gatherers.iter_mut().for_each(|entry| expand_entry(entry, base_dir));
            }
        }
    }
    if let Some(Value::Array(audits)) = body.get_mut("audits") {
        audits.iter_mut().for_each(|entry| expand_entry(entry, base_dir));
    }
}

fn expand_entry(entry: &mut Value, base_dir: Option<&Path>) {
    if let Value::String(path) = entry {
        let mut map = Map::new();
        map.insert("path".to_string(), Value::String(std::mem::take(path)));
        *entry = Value::Object(map);
    }
    if let (Value::Object(map), Some(dir)) = (entry, base_dir) {
        if map.get("path").map_or(false, Value::is_string) {
            map.insert(DIR_KEY.to_string(), Value::String(dir.display().to_string()));
        }
    }
}

/// Defaults, then the folded settings, then caller flags
fn build_settings(folded: Option<Value>, flags: Option<&Value>) -> Result<Settings, ConfigError> {
    let defaults = Settings::defaults_value()?;
    let replace = MergePolicy::replace_arrays();

    let mut layers = Vec::new();
    if let Some(folded) = folded {
        layers.push(("settings", folded));
    }
    if let Some(flags) = flags {
        if !flags.is_object() {
            return Err(ConfigError::InvalidSettings(format!(
                "flags must be an object, found {}",
                json_kind(flags)
            )));
        }
        layers.push(("flags", flags.clone()));
    }

    let mut merged = defaults.clone();
    for (source, layer) in layers {
        let mut unknown = Vec::new();
        unknown_keys(&defaults, &layer, "", &mut unknown);
        for key in unknown {
            tracing::warn!(source, key = %key, "ignoring unknown settings key");
        }
        merged = lh_merge::merge(merged, layer, &replace, true)
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
    }

    serde_json::from_value(merged).map_err(|e| ConfigError::InvalidSettings(e.to_string()))
}

/// Keys of `value` with no counterpart in `known`, descending into objects
/// `known` describes
fn unknown_keys(known: &Value, value: &Value, prefix: &str, out: &mut Vec<String>) {
    let (Value::Object(known), Value::Object(value)) = (known, value) else {
        return;
    };
    for (key, child) in value {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match known.get(key) {
            Some(known_child) => unknown_keys(known_child, child, &path, out),
            None => out.push(path),
        }
    }
}

fn take_array(merged: &mut Map<String, Value>, field: &str) -> Result<Option<Vec<Value>>, ConfigError> {
    match merged.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(ConfigError::InvalidDocument {
            location: field.to_string(),
            reason: format!("expected an array, found {}", json_kind(&other)),
        }),
    }
}

fn take_typed<T: DeserializeOwned>(merged: &mut Map<String, Value>, field: &str) -> Result<Option<T>, ConfigError> {
    match merged.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ConfigError::InvalidDocument {
                location: field.to_string(),
                reason: e.to_string(),
            }),
    }
}

fn build_pass(
    index: usize,
    pass: Value,
    bindings: &Bindings,
    references: &ReferenceResolver<'_>,
) -> Result<Pass, ConfigError> {
    let location = format!("passes[{}]", index);
    let mut map = match pass {
        Value::Object(map) => map,
        other => {
            return Err(ConfigError::InvalidDocument {
                location,
                reason: format!("expected an object, found {}", json_kind(&other)),
            })
        }
    };

    let entries = take_array(&mut map, "gatherers").map_err(|e| match e {
        ConfigError::InvalidDocument { reason, .. } => ConfigError::InvalidDocument {
            location: format!("{}.gatherers", location),
            reason,
        },
        other => other,
    })?;
    map.retain(|_, value| !value.is_null());
    let fields: PassFields =
        serde_json::from_value(Value::Object(map)).map_err(|e| ConfigError::InvalidDocument {
            location: location.clone(),
            reason: e.to_string(),
        })?;

    let mut gatherers = Vec::new();
    for (position, entry) in entries.unwrap_or_default().into_iter().enumerate() {
        let entry_location = format!("{}.gatherers[{}]", location, position);
        let (spec, dir) = GathererSpec::from_entry(&entry, bindings, &entry_location)?;
        gatherers.push(references.resolve_gatherer(spec, dir.as_deref())?);
    }

    tracing::debug!(pass = %fields.pass_name, gatherers = gatherers.len(), "resolved pass");
    Ok(Pass::new(fields, gatherers))
}

fn build_audit(
    index: usize,
    entry: Value,
    bindings: &Bindings,
    references: &ReferenceResolver<'_>,
) -> Result<AuditDefinition, ConfigError> {
    let location = format!("audits[{}]", index);
    let (spec, dir) = AuditSpec::from_entry(&entry, bindings, &location)?;
    references.resolve_audit(spec, dir.as_deref())
}

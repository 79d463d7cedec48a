//! Configuration documents
//!
//! A document is the sparse, user-authored form of a configuration. Its body
//! is plain JSON; references to in-memory units live in a side table of
//! [`Bindings`] and are named from the body by handle.

mod format;

pub use format::{toml_to_json, Format};

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::reference::{AuditSpec, GathererSpec};
use crate::units::{Audit, Gatherer, GathererFactory};

/// Pass name used for passes that do not declare one
pub const DEFAULT_PASS_NAME: &str = "defaultPass";

/// Where a document was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Constructed in memory, optionally anchored at a directory
    Inline { base_dir: Option<PathBuf> },
    /// Read from a file
    File(PathBuf),
    /// Built-in preset
    Preset(String),
}

impl fmt::Display for DocumentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentOrigin::Inline { .. } => write!(f, "<inline>"),
            DocumentOrigin::File(path) => write!(f, "{}", path.display()),
            DocumentOrigin::Preset(name) => write!(f, "{}", name),
        }
    }
}

/// A non-serializable unit bound into a document
#[derive(Debug, Clone)]
pub enum Binding {
    GathererImplementation(Arc<dyn GathererFactory>),
    GathererInstance(Arc<dyn Gatherer>),
    AuditImplementation(Arc<dyn Audit>),
}

/// Handle table for units referenced from a document body
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn get(&self, handle: &str) -> Option<&Binding> {
        self.entries.get(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bind_gatherer(&mut self, factory: Arc<dyn GathererFactory>) -> String {
        let handle = handle_for(factory.name(), Arc::as_ptr(&factory) as *const ());
        self.entries
            .insert(handle.clone(), Binding::GathererImplementation(factory));
        handle
    }

    pub fn bind_instance(&mut self, instance: Arc<dyn Gatherer>) -> String {
        let handle = handle_for(instance.name(), Arc::as_ptr(&instance) as *const ());
        self.entries
            .insert(handle.clone(), Binding::GathererInstance(instance));
        handle
    }

    pub fn bind_audit(&mut self, audit: Arc<dyn Audit>) -> String {
        let handle = handle_for(&audit.meta().id, Arc::as_ptr(&audit) as *const ());
        self.entries
            .insert(handle.clone(), Binding::AuditImplementation(audit));
        handle
    }

    /// Add every binding of `other`; handles are unique per unit
    pub fn extend(&mut self, other: Bindings) {
        self.entries.extend(other.entries);
    }
}

fn handle_for(name: &str, ptr: *const ()) -> String {
    format!("{}@{:p}", name, ptr)
}

/// A sparse configuration document
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    body: Map<String, Value>,
    bindings: Bindings,
    origin: DocumentOrigin,
}

impl ConfigDocument {
    /// Empty inline document
    pub fn new() -> Self {
        Self {
            body: Map::new(),
            bindings: Bindings::default(),
            origin: DocumentOrigin::Inline { base_dir: None },
        }
    }

    /// Inline document from a JSON value; must be an object
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Self::from_parts(value, DocumentOrigin::Inline { base_dir: None })
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Format::Json, DocumentOrigin::Inline { base_dir: None })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Format::Toml, DocumentOrigin::Inline { base_dir: None })
    }

    /// Read a document file; `.toml` files are TOML, anything else JSON
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::InvalidDocument {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::parse(&contents, Format::of(&path), DocumentOrigin::File(path))
    }

    pub(crate) fn preset(name: &str, contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Format::Json, DocumentOrigin::Preset(name.to_string()))
    }

    fn parse(contents: &str, format: Format, origin: DocumentOrigin) -> Result<Self, ConfigError> {
        let value = format
            .parse(contents)
            .map_err(|reason| ConfigError::InvalidDocument {
                location: origin.to_string(),
                reason,
            })?;
        Self::from_parts(value, origin)
    }

    fn from_parts(value: Value, origin: DocumentOrigin) -> Result<Self, ConfigError> {
        match value {
            Value::Object(body) => Ok(Self {
                body,
                bindings: Bindings::default(),
                origin,
            }),
            other => Err(ConfigError::InvalidDocument {
                location: origin.to_string(),
                reason: format!("expected an object, found {}", json_kind(&other)),
            }),
        }
    }

    /// Anchor an inline document so its relative references resolve from `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if let DocumentOrigin::Inline { base_dir } = &mut self.origin {
            *base_dir = Some(dir.into());
        }
        self
    }

    pub fn with_extends(mut self, extends: Value) -> Self {
        self.body.insert("extends".to_string(), extends);
        self
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn origin(&self) -> &DocumentOrigin {
        &self.origin
    }

    pub fn extends(&self) -> Option<&Value> {
        self.body.get("extends")
    }

    /// Directory relative references in this document are resolved against
    pub fn base_dir(&self) -> Option<&Path> {
        match &self.origin {
            DocumentOrigin::Inline { base_dir } => base_dir.as_deref(),
            DocumentOrigin::File(path) => path.parent(),
            DocumentOrigin::Preset(_) => None,
        }
    }

    pub(crate) fn into_parts(self) -> (Map<String, Value>, Bindings, DocumentOrigin) {
        (self.body, self.bindings, self.origin)
    }

    /// Append a gatherer to the named pass, creating the pass if needed
    pub fn add_gatherer(&mut self, pass_name: &str, spec: GathererSpec) -> &mut Self {
        let entry = self.lower_gatherer(spec);
        ensure_array(&mut self.body, "passes");
        let Some(Value::Array(passes)) = self.body.get_mut("passes") else {
            return self;
        };

        let existing = passes.iter().position(|pass| {
            pass.get("passName").and_then(Value::as_str).unwrap_or(DEFAULT_PASS_NAME) == pass_name
        });
        let index = match existing {
            Some(index) => index,
            None => {
                passes.push(json!({ "passName": pass_name }));
                passes.len() - 1
            }
        };

        if let Value::Object(pass) = &mut passes[index] {
            push_entry(pass, "gatherers", entry);
        }
        self
    }

    /// Append an audit
    pub fn add_audit(&mut self, spec: AuditSpec) -> &mut Self {
        let entry = self.lower_audit(spec);
        push_entry(&mut self.body, "audits", entry);
        self
    }

    fn lower_gatherer(&mut self, spec: GathererSpec) -> Value {
        let (mut entry, options) = match spec {
            GathererSpec::BarePath(path) => (json!({ "path": path }), None),
            GathererSpec::Path { path, options } => (json!({ "path": path }), options),
            GathererSpec::BareImplementation(factory) => {
                (json!({ "implementation": self.bindings.bind_gatherer(factory) }), None)
            }
            GathererSpec::Implementation {
                implementation,
                options,
            } => (
                json!({ "implementation": self.bindings.bind_gatherer(implementation) }),
                options,
            ),
            GathererSpec::BareInstance(instance) => {
                (json!({ "instance": self.bindings.bind_instance(instance) }), None)
            }
            GathererSpec::Instance { instance, options } => {
                (json!({ "instance": self.bindings.bind_instance(instance) }), options)
            }
        };
        if let (Some(options), Value::Object(map)) = (options, &mut entry) {
            map.insert("options".to_string(), options);
        }
        entry
    }

    fn lower_audit(&mut self, spec: AuditSpec) -> Value {
        let (mut entry, options) = match spec {
            AuditSpec::BarePath(path) => (json!({ "path": path }), None),
            AuditSpec::Path { path, options } => (json!({ "path": path }), options),
            AuditSpec::BareImplementation(audit) => {
                (json!({ "implementation": self.bindings.bind_audit(audit) }), None)
            }
            AuditSpec::Implementation {
                implementation,
                options,
            } => (
                json!({ "implementation": self.bindings.bind_audit(implementation) }),
                options,
            ),
        };
        if let (Some(options), Value::Object(map)) = (options, &mut entry) {
            map.insert("options".to_string(), options);
        }
        entry
    }
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace a missing or non-array value under `key` with an empty array
fn ensure_array(map: &mut Map<String, Value>, key: &str) {
    if !matches!(map.get(key), Some(Value::Array(_))) {
        map.insert(key.to_string(), Value::Array(Vec::new()));
    }
}

fn push_entry(map: &mut Map<String, Value>, key: &str, entry: Value) {
    ensure_array(map, key);
    if let Some(Value::Array(items)) = map.get_mut(key) {
        items.push(entry);
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{DeclaredGatherer, GathererInstance};
    use tempfile::TempDir;

    #[test]
    fn test_from_value_requires_object() {
        let err = ConfigDocument::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("expected an object, found array"));
    }

    #[test]
    fn test_from_file_anchors_base_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"extends": "lighthouse:default"}"#).unwrap();

        let doc = ConfigDocument::from_file(&path).unwrap();
        assert_eq!(doc.extends(), Some(&json!("lighthouse:default")));
        assert_eq!(
            doc.base_dir(),
            Some(dir.path().canonicalize().unwrap().as_path())
        );
    }

    #[test]
    fn test_from_file_missing() {
        let err = ConfigDocument::from_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument { .. }));
    }

    #[test]
    fn test_with_base_dir_only_for_inline() {
        let doc = ConfigDocument::new().with_base_dir("/cfg");
        assert_eq!(doc.base_dir(), Some(Path::new("/cfg")));

        let preset = ConfigDocument::preset("p", "{}").unwrap().with_base_dir("/cfg");
        assert_eq!(preset.base_dir(), None);
    }

    #[test]
    fn test_add_gatherer_binds_handles() {
        let mut doc = ConfigDocument::new();
        let factory: Arc<dyn GathererFactory> = Arc::new(DeclaredGatherer::new("Custom"));
        let instance: Arc<dyn Gatherer> = Arc::new(GathererInstance::new("Ready", json!({})));

        doc.add_gatherer("defaultPass", GathererSpec::BarePath("scripts".to_string()))
            .add_gatherer(
                "defaultPass",
                GathererSpec::Implementation {
                    implementation: factory,
                    options: Some(json!({"depth": 2})),
                },
            )
            .add_gatherer("offlinePass", GathererSpec::BareInstance(instance));

        let passes = doc.body()["passes"].as_array().unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0]["gatherers"][0], json!({"path": "scripts"}));

        let handle = passes[0]["gatherers"][1]["implementation"].as_str().unwrap();
        assert!(handle.starts_with("Custom@"));
        assert!(matches!(
            doc.bindings().get(handle),
            Some(Binding::GathererImplementation(_))
        ));
        assert_eq!(passes[0]["gatherers"][1]["options"], json!({"depth": 2}));

        let handle = passes[1]["gatherers"][0]["instance"].as_str().unwrap();
        assert!(matches!(doc.bindings().get(handle), Some(Binding::GathererInstance(_))));
        assert_eq!(doc.bindings().len(), 2);
    }

    #[test]
    fn test_add_gatherer_to_unnamed_pass() {
        let mut doc = ConfigDocument::from_value(json!({"passes": [{"recordTrace": true}]})).unwrap();
        doc.add_gatherer(DEFAULT_PASS_NAME, GathererSpec::BarePath("scripts".to_string()));

        let passes = doc.body()["passes"].as_array().unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0]["gatherers"], json!([{"path": "scripts"}]));
    }
}

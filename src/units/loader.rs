//! Unit lookup by locator
//!
//! A [`ModuleLoader`] answers whether one exact location names a unit. The
//! order in which locations are tried belongs to the reference resolver.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::{builtin_audits, builtin_gatherers, Audit, AuditMeta, DeclaredAudit, DeclaredGatherer, GathererFactory};
use crate::error::ConfigError;

const MANIFEST_EXTENSION: &str = "json";

/// One candidate location for a unit reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// File relative to the defining document
    File(PathBuf),
    /// Identifier in the plugin namespace
    Plugin(String),
    /// Built-in identifier
    Builtin(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::File(path) => write!(f, "file:{}", path.display()),
            Locator::Plugin(name) => write!(f, "plugin:{}", name),
            Locator::Builtin(name) => write!(f, "builtin:{}", name),
        }
    }
}

/// Source of gatherer and audit implementations
pub trait ModuleLoader: Send + Sync {
    fn load_gatherer(&self, locator: &Locator) -> Result<Option<Arc<dyn GathererFactory>>, ConfigError>;

    fn load_audit(&self, locator: &Locator) -> Result<Option<Arc<dyn Audit>>, ConfigError>;
}

/// On-disk declaration of a unit
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitManifest {
    Gatherer {
        name: String,
    },
    Audit {
        #[serde(flatten)]
        meta: AuditMeta,
        #[serde(default = "empty_options", rename = "defaultOptions")]
        default_options: Value,
    },
}

fn empty_options() -> Value {
    Value::Object(Map::new())
}

impl UnitManifest {
    /// Read a manifest file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::InvalidModule {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::InvalidModule {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read a file found next to a document. Files that do not declare a
    /// unit (other JSON data, the config itself) are not a match.
    pub fn from_candidate(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::InvalidModule {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let value: Value = match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!(path = %path.display(), "candidate file is not JSON");
                return Ok(None);
            }
        };
        let declares_unit = value
            .as_object()
            .map_or(false, |map| map.contains_key("gatherer") || map.contains_key("audit"));
        if !declares_unit {
            tracing::debug!(path = %path.display(), "candidate file declares no unit");
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ConfigError::InvalidModule {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn into_gatherer(self) -> Option<Arc<dyn GathererFactory>> {
        match self {
            UnitManifest::Gatherer { name } => Some(Arc::new(DeclaredGatherer::new(name))),
            UnitManifest::Audit { .. } => None,
        }
    }

    fn into_audit(self) -> Option<Arc<dyn Audit>> {
        match self {
            UnitManifest::Audit {
                meta,
                default_options,
            } => Some(Arc::new(DeclaredAudit::new(meta).with_default_options(default_options))),
            UnitManifest::Gatherer { .. } => None,
        }
    }
}

/// Built-in catalog, plugin directories and programmatic registrations
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    builtin_gatherers: BTreeMap<String, Arc<dyn GathererFactory>>,
    builtin_audits: BTreeMap<String, Arc<dyn Audit>>,
    plugin_gatherers: BTreeMap<String, Arc<dyn GathererFactory>>,
    plugin_audits: BTreeMap<String, Arc<dyn Audit>>,
    plugin_manifests: BTreeMap<String, PathBuf>,
}

impl ModuleRegistry {
    /// Empty registry: no built-ins, no plugins
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in catalog
    pub fn builtin() -> Self {
        Self {
            builtin_gatherers: builtin_gatherers().into_iter().collect(),
            builtin_audits: builtin_audits().into_iter().collect(),
            ..Self::default()
        }
    }

    /// Register a gatherer implementation in the plugin namespace
    pub fn register_gatherer(&mut self, identifier: impl Into<String>, factory: Arc<dyn GathererFactory>) {
        self.plugin_gatherers.insert(identifier.into(), factory);
    }

    /// Register an audit implementation in the plugin namespace
    pub fn register_audit(&mut self, identifier: impl Into<String>, audit: Arc<dyn Audit>) {
        self.plugin_audits.insert(identifier.into(), audit);
    }

    /// Index every manifest under `dir`.
    ///
    /// A manifest at `<dir>/seo/font-size.json` is addressed as `seo/font-size`.
    /// Directories indexed later shadow earlier ones.
    pub fn with_plugin_dir(mut self, dir: &Path) -> Result<Self, ConfigError> {
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| ConfigError::InvalidModule {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(MANIFEST_EXTENSION)
            {
                continue;
            }

            let relative = match path.strip_prefix(dir) {
                Ok(relative) => relative.with_extension(""),
                Err(_) => continue,
            };
            let identifier = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            tracing::debug!(identifier = %identifier, path = %path.display(), "indexed plugin unit");
            self.plugin_manifests.insert(identifier, path.to_path_buf());
        }
        Ok(self)
    }

    /// Identifiers available in the plugin namespace
    pub fn plugin_identifiers(&self) -> Vec<&str> {
        let mut identifiers: Vec<&str> = self
            .plugin_gatherers
            .keys()
            .chain(self.plugin_audits.keys())
            .chain(self.plugin_manifests.keys())
            .map(String::as_str)
            .collect();
        identifiers.sort_unstable();
        identifiers.dedup();
        identifiers
    }

    fn manifest_at(&self, locator: &Locator) -> Result<Option<UnitManifest>, ConfigError> {
        let path = match locator {
            Locator::File(path) => {
                return match manifest_file(path) {
                    Some(path) => UnitManifest::from_candidate(&path),
                    None => Ok(None),
                }
            }
            Locator::Plugin(name) => match self.plugin_manifests.get(name) {
                Some(path) => path.clone(),
                None => return Ok(None),
            },
            Locator::Builtin(_) => return Ok(None),
        };
        UnitManifest::from_file(&path).map(Some)
    }
}

/// The file a locator path names, trying the manifest extension second
fn manifest_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let mut with_extension = path.as_os_str().to_owned();
    with_extension.push(".");
    with_extension.push(MANIFEST_EXTENSION);
    let with_extension = PathBuf::from(with_extension);
    with_extension.is_file().then_some(with_extension)
}

impl ModuleLoader for ModuleRegistry {
    fn load_gatherer(&self, locator: &Locator) -> Result<Option<Arc<dyn GathererFactory>>, ConfigError> {
        let registered = match locator {
            Locator::Builtin(name) => self.builtin_gatherers.get(name),
            Locator::Plugin(name) => self.plugin_gatherers.get(name),
            Locator::File(_) => None,
        };
        if let Some(factory) = registered {
            return Ok(Some(Arc::clone(factory)));
        }
        Ok(self.manifest_at(locator)?.and_then(UnitManifest::into_gatherer))
    }

    fn load_audit(&self, locator: &Locator) -> Result<Option<Arc<dyn Audit>>, ConfigError> {
        let registered = match locator {
            Locator::Builtin(name) => self.builtin_audits.get(name),
            Locator::Plugin(name) => self.plugin_audits.get(name),
            Locator::File(_) => None,
        };
        if let Some(audit) = registered {
            return Ok(Some(Arc::clone(audit)));
        }
        Ok(self.manifest_at(locator)?.and_then(UnitManifest::into_audit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, contents: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_builtin_lookup() {
        let registry = ModuleRegistry::builtin();

        let gatherer = registry
            .load_gatherer(&Locator::Builtin("css-usage".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(gatherer.name(), "CSSUsage");

        let audit = registry
            .load_audit(&Locator::Builtin("seo/font-size".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(audit.meta().id, "font-size");

        assert!(registry
            .load_gatherer(&Locator::Builtin("nope".to_string()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_file_manifest_with_and_without_extension() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "custom.json", r#"{"gatherer": {"name": "Custom"}}"#);
        let registry = ModuleRegistry::new();

        for candidate in ["custom", "custom.json"] {
            let gatherer = registry
                .load_gatherer(&Locator::File(dir.path().join(candidate)))
                .unwrap()
                .unwrap();
            assert_eq!(gatherer.name(), "Custom");
        }
    }

    #[test]
    fn test_audit_manifest() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "audits/unused-bytes.json",
            r#"{"audit": {"id": "unused-bytes", "title": "Unused bytes",
                "requiredArtifacts": ["devtoolsLogs"], "defaultOptions": {"threshold": 2048}}}"#,
        );
        let registry = ModuleRegistry::new();

        let audit = registry
            .load_audit(&Locator::File(dir.path().join("audits/unused-bytes")))
            .unwrap()
            .unwrap();
        assert_eq!(audit.meta().required_artifacts, vec!["devtoolsLogs"]);
        assert_eq!(audit.default_options(), json!({"threshold": 2048}));
    }

    #[test]
    fn test_manifest_of_other_kind_is_not_a_match() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "g.json", r#"{"gatherer": {"name": "G"}}"#);

        let audit = ModuleRegistry::new()
            .load_audit(&Locator::File(dir.path().join("g")))
            .unwrap();
        assert!(audit.is_none());
    }

    #[test]
    fn test_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.json", r#"{"gatherer": {"title": "no name"}}"#);

        let err = ModuleRegistry::new()
            .load_gatherer(&Locator::File(dir.path().join("broken")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModule { .. }));
    }

    #[test]
    fn test_unrelated_file_is_not_a_match() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "scripts.json", r#"{"urls": ["https://example.com/app.js"]}"#);
        write(dir.path(), "notes", "plain text");
        let registry = ModuleRegistry::new();

        for candidate in ["scripts", "notes"] {
            let gatherer = registry
                .load_gatherer(&Locator::File(dir.path().join(candidate)))
                .unwrap();
            assert!(gatherer.is_none());
        }
    }

    #[test]
    fn test_plugin_dir_index() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "byte-efficiency/unused-bytes.json", r#"{"gatherer": {"name": "UnusedBytes"}}"#);
        write(dir.path(), "README.md", "not a unit");

        let registry = ModuleRegistry::new().with_plugin_dir(dir.path()).unwrap();
        assert_eq!(registry.plugin_identifiers(), vec!["byte-efficiency/unused-bytes"]);

        let gatherer = registry
            .load_gatherer(&Locator::Plugin("byte-efficiency/unused-bytes".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(gatherer.name(), "UnusedBytes");
    }

    #[test]
    fn test_registered_units_live_in_plugin_namespace() {
        let mut registry = ModuleRegistry::builtin();
        registry.register_gatherer("scripts", Arc::new(DeclaredGatherer::new("MyScripts")));

        let plugin = registry
            .load_gatherer(&Locator::Plugin("scripts".to_string()))
            .unwrap()
            .unwrap();
        let builtin = registry
            .load_gatherer(&Locator::Builtin("scripts".to_string()))
            .unwrap()
            .unwrap();

        assert_eq!(plugin.name(), "MyScripts");
        assert_eq!(builtin.name(), "Scripts");
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::Plugin("a/b".to_string()).to_string(), "plugin:a/b");
        assert_eq!(Locator::Builtin("x".to_string()).to_string(), "builtin:x");
        assert_eq!(Locator::File(PathBuf::from("/c/x")).to_string(), "file:/c/x");
    }
}

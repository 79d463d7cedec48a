//! Extension chain
//!
//! Follows `extends` links from a document to its root and returns the chain
//! most general first, ready to be folded.

mod presets;

pub use presets::{PresetRegistry, DEFAULT_PRESET, PRESET_PREFIX};

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::document::{json_kind, ConfigDocument, DocumentOrigin};
use crate::error::ConfigError;

/// What an `extends` value points at
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Preset(String),
    File(PathBuf),
}

/// Resolves `extends` links
pub struct ChainLoader<'a> {
    presets: &'a PresetRegistry,
    working_dir: &'a Path,
}

impl<'a> ChainLoader<'a> {
    /// `working_dir` anchors relative `extends` paths of documents that have
    /// no directory of their own
    pub fn new(presets: &'a PresetRegistry, working_dir: &'a Path) -> Self {
        Self { presets, working_dir }
    }

    /// The chain ending at `document`, most general first.
    ///
    /// An inline document with no directory is anchored at the working
    /// directory, for its `extends` and its unit references alike.
    pub fn load(&self, document: ConfigDocument) -> Result<Vec<ConfigDocument>, ConfigError> {
        let document = match document.origin() {
            DocumentOrigin::Inline { base_dir: None } => document.with_base_dir(self.working_dir),
            _ => document,
        };
        let mut chain = Vec::new();
        let mut in_progress = Vec::new();
        self.expand(document, &mut in_progress, &mut chain)?;
        tracing::debug!(
            chain = ?chain.iter().map(|doc| doc.origin().to_string()).collect::<Vec<_>>(),
            "resolved extension chain"
        );
        Ok(chain)
    }

    fn expand(
        &self,
        document: ConfigDocument,
        in_progress: &mut Vec<String>,
        chain: &mut Vec<ConfigDocument>,
    ) -> Result<(), ConfigError> {
        let identity = identity(document.origin());
        if let Some(id) = &identity {
            if let Some(start) = in_progress.iter().position(|seen| seen == id) {
                let mut cycle = in_progress[start..].to_vec();
                cycle.push(id.clone());
                return Err(ConfigError::CyclicExtension { chain: cycle });
            }
            in_progress.push(id.clone());
        }

        if let Some(target) = self.target_of(&document)? {
            let parent = match &target {
                Target::Preset(name) => {
                    tracing::debug!(from = %document.origin(), preset = %name, "extending preset");
                    self.presets.document(name)?
                }
                Target::File(path) => {
                    tracing::debug!(from = %document.origin(), path = %path.display(), "extending file");
                    ConfigDocument::from_file(path).map_err(|e| ConfigError::ExtensionNotFound {
                        target: path.display().to_string(),
                        from: document.origin().to_string(),
                        reason: match e {
                            ConfigError::InvalidDocument { reason, .. } => reason,
                            other => other.to_string(),
                        },
                    })?
                }
            };
            self.expand(parent, in_progress, chain)?;
        }

        chain.push(document);
        if identity.is_some() {
            in_progress.pop();
        }
        Ok(())
    }

    fn target_of(&self, document: &ConfigDocument) -> Result<Option<Target>, ConfigError> {
        match document.extends() {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
            Some(Value::Bool(true)) => {
                if self.presets.contains(DEFAULT_PRESET) {
                    Ok(Some(Target::Preset(DEFAULT_PRESET.to_string())))
                } else {
                    Err(ConfigError::UnknownPreset(DEFAULT_PRESET.to_string()))
                }
            }
            Some(Value::String(name)) if self.presets.contains(name) => Ok(Some(Target::Preset(name.clone()))),
            Some(Value::String(name)) if name.starts_with(PRESET_PREFIX) => {
                Err(ConfigError::UnknownPreset(name.clone()))
            }
            Some(Value::String(name)) if name.is_empty() => Err(ConfigError::InvalidDocument {
                location: document.origin().to_string(),
                reason: "'extends' is an empty string".to_string(),
            }),
            Some(Value::String(path)) => {
                let base = document.base_dir().unwrap_or(self.working_dir);
                Ok(Some(Target::File(base.join(path))))
            }
            Some(other) => Err(ConfigError::InvalidDocument {
                location: document.origin().to_string(),
                reason: format!(
                    "'extends' must be a boolean or a string, found {}",
                    json_kind(other)
                ),
            }),
        }
    }
}

/// Key used to detect cycles; inline documents cannot be extended and so
/// cannot take part in one
fn identity(origin: &DocumentOrigin) -> Option<String> {
    match origin {
        DocumentOrigin::Inline { .. } => None,
        DocumentOrigin::File(path) => Some(path.display().to_string()),
        DocumentOrigin::Preset(name) => Some(name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn origins(chain: &[ConfigDocument]) -> Vec<String> {
        chain.iter().map(|doc| doc.origin().to_string()).collect()
    }

    #[test]
    fn test_no_extends() {
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("."));

        for extends in [None, Some(json!(false)), Some(json!(null))] {
            let mut doc = ConfigDocument::new();
            if let Some(extends) = extends {
                doc = doc.with_extends(extends);
            }
            let chain = loader.load(doc).unwrap();
            assert_eq!(origins(&chain), vec!["<inline>"]);
        }
    }

    #[test]
    fn test_extends_true_uses_default_preset() {
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("."));

        let chain = loader.load(ConfigDocument::new().with_extends(json!(true))).unwrap();
        assert_eq!(origins(&chain), vec!["lighthouse:default", "<inline>"]);
    }

    #[test]
    fn test_preset_extending_preset() {
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("."));

        let chain = loader
            .load(ConfigDocument::new().with_extends(json!("lighthouse:full")))
            .unwrap();
        assert_eq!(
            origins(&chain),
            vec!["lighthouse:default", "lighthouse:full", "<inline>"]
        );
    }

    #[test]
    fn test_unknown_preset() {
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("."));

        let err = loader
            .load(ConfigDocument::new().with_extends(json!("lighthouse:mobile")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset(name) if name == "lighthouse:mobile"));
    }

    #[test]
    fn test_relative_path_from_working_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.json"), r#"{"settings": {"locale": "fr"}}"#).unwrap();
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, dir.path());

        let chain = loader
            .load(ConfigDocument::new().with_extends(json!("base.json")))
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].body()["settings"]["locale"], "fr");
        assert_eq!(chain[1].base_dir(), Some(dir.path()));
    }

    #[test]
    fn test_inline_document_keeps_its_own_dir() {
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("/work"));

        let chain = loader
            .load(ConfigDocument::new().with_base_dir("/configs"))
            .unwrap();
        assert_eq!(chain[0].base_dir(), Some(Path::new("/configs")));
    }

    #[test]
    fn test_relative_path_from_document_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/base.json"), r#"{"extends": "lighthouse:default"}"#).unwrap();
        fs::write(dir.path().join("nested/site.json"), r#"{"extends": "base.json"}"#).unwrap();
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("/"));

        let doc = ConfigDocument::from_file(&dir.path().join("nested/site.json")).unwrap();
        let chain = loader.load(doc).unwrap();

        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].origin(), &DocumentOrigin::Preset(DEFAULT_PRESET.to_string()));
        assert!(origins(&chain)[2].ends_with("site.json"));
    }

    #[test]
    fn test_missing_target() {
        let dir = TempDir::new().unwrap();
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, dir.path());

        let err = loader
            .load(ConfigDocument::new().with_extends(json!("missing.json")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ExtensionNotFound { ref target, .. } if target.ends_with("missing.json")));
    }

    #[test]
    fn test_unparsable_target() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, dir.path());

        let err = loader
            .load(ConfigDocument::new().with_extends(json!("broken.json")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ExtensionNotFound { .. }));
    }

    #[test]
    fn test_cycle_reported_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"extends": "b.json"}"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"extends": "a.json"}"#).unwrap();
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, dir.path());

        let doc = ConfigDocument::from_file(&dir.path().join("a.json")).unwrap();
        let err = loader.load(doc).unwrap_err();

        match err {
            ConfigError::CyclicExtension { chain } => {
                assert_eq!(chain.len(), 3);
                assert!(chain[0].ends_with("a.json"));
                assert!(chain[1].ends_with("b.json"));
                assert!(chain[2].ends_with("a.json"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_extension_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("self.json"), r#"{"extends": "self.json"}"#).unwrap();
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, dir.path());

        let doc = ConfigDocument::from_file(&dir.path().join("self.json")).unwrap();
        assert!(matches!(loader.load(doc), Err(ConfigError::CyclicExtension { .. })));
    }

    #[test]
    fn test_extends_wrong_type() {
        let presets = PresetRegistry::builtin();
        let loader = ChainLoader::new(&presets, Path::new("."));

        let err = loader
            .load(ConfigDocument::new().with_extends(json!(["lighthouse:default"])))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument { .. }));
    }
}

//! Resolution entry point
//!
//! Layering, lowest precedence first:
//! 1. Built-in settings and pass defaults
//! 2. Extension chain, most general document first
//! 3. Caller flags (settings overrides)

use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chain::{ChainLoader, PresetRegistry};
use crate::config::Config;
use crate::document::ConfigDocument;
use crate::error::ConfigError;
use crate::normalize::Normalizer;
use crate::units::{ModuleLoader, ModuleRegistry};

/// Knobs of a resolution
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Settings overrides applied after the whole chain
    pub flags: Option<Value>,
    /// Directories of unit manifests, later directories shadowing earlier
    pub plugin_dirs: Vec<PathBuf>,
    /// Base for relative `extends` of documents with no directory
    pub working_dir: PathBuf,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            flags: None,
            plugin_dirs: Vec::new(),
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Resolves documents into [`Config`]s.
///
/// Holds only read-only registries, so one resolver can serve concurrent
/// resolutions.
#[derive(Clone)]
pub struct Resolver {
    presets: PresetRegistry,
    loader: Arc<dyn ModuleLoader>,
    options: ResolveOptions,
}

impl Resolver {
    /// Resolver over the built-in presets, the built-in unit catalog and the
    /// configured plugin directories
    pub fn new(options: ResolveOptions) -> Result<Self, ConfigError> {
        let mut registry = ModuleRegistry::builtin();
        for dir in &options.plugin_dirs {
            registry = registry.with_plugin_dir(dir)?;
        }

        Ok(Self {
            presets: PresetRegistry::builtin(),
            loader: Arc::new(registry),
            options,
        })
    }

    /// Replace the unit loader
    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the preset table
    pub fn with_presets(mut self, presets: PresetRegistry) -> Self {
        self.presets = presets;
        self
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn resolve(&self, document: ConfigDocument) -> Result<Config, ConfigError> {
        let chain = ChainLoader::new(&self.presets, &self.options.working_dir).load(document)?;
        Normalizer::new(self.loader.as_ref())
            .with_flags(self.options.flags.as_ref())
            .normalize(chain)
    }

    pub fn resolve_file(&self, path: &Path) -> Result<Config, ConfigError> {
        self.resolve(ConfigDocument::from_file(path)?)
    }

    pub fn resolve_preset(&self, name: &str) -> Result<Config, ConfigError> {
        self.resolve(self.presets.document(name)?)
    }
}

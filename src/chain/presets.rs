//! Named base configurations

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::document::ConfigDocument;
use crate::error::ConfigError;

/// Preset used by `extends: true`
pub const DEFAULT_PRESET: &str = "lighthouse:default";

/// Namespace reserved for presets; such names never fall back to file paths
pub const PRESET_PREFIX: &str = "lighthouse:";

const DEFAULT_BODY: &str = include_str!("../../presets/default.json");
const FULL_BODY: &str = include_str!("../../presets/full.json");

/// Read-only table of preset documents
#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<String, Cow<'static, str>>,
}

impl PresetRegistry {
    /// Registry with no presets
    pub fn new() -> Self {
        Self::default()
    }

    /// `lighthouse:default` and `lighthouse:full`
    pub fn builtin() -> Self {
        Self::new()
            .with_preset(DEFAULT_PRESET, DEFAULT_BODY)
            .with_preset("lighthouse:full", FULL_BODY)
    }

    /// Add or replace a preset from its JSON source
    pub fn with_preset(mut self, name: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        self.presets.insert(name.into(), source.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// Parse the named preset
    pub fn document(&self, name: &str) -> Result<ConfigDocument, ConfigError> {
        let source = self
            .presets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?;
        ConfigDocument::preset(name, source)
    }
}

//! Per-field array strategies
//!
//! A policy is an ordered list of glob rules over field paths. The first rule
//! matching the path of an array decides how that array merges; arrays with no
//! matching rule use the fallback strategy.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::Value;

use crate::path::{pattern_to_glob, FieldPath};

/// Errors building a merge policy
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid field pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// How two arrays at the same field combine
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayStrategy {
    /// Extension array replaces the base array
    Replace,
    /// Base entries, then extension entries not already present
    ConcatDedupe,
    /// Entries matched by key merge in place; unmatched entries are appended
    MergeByKey(EntryKey),
}

/// Natural key of an array entry.
///
/// Object entries are keyed by the first listed field holding a string.
/// String entries are their own key.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryKey {
    fields: Vec<String>,
    fallback: Option<String>,
}

impl EntryKey {
    /// Key object entries by a single field
    pub fn field(name: &str) -> Self {
        Self::first_of(&[name])
    }

    /// Key object entries by the first of several fields that is present
    pub fn first_of(names: &[&str]) -> Self {
        Self {
            fields: names.iter().map(|name| name.to_string()).collect(),
            fallback: None,
        }
    }

    /// Key used for object entries that carry none of the key fields
    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }

    /// Extract the key of an entry, if it has one
    pub fn key_of(&self, entry: &Value) -> Option<String> {
        match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => self
                .fields
                .iter()
                .find_map(|field| map.get(field).and_then(Value::as_str))
                .map(str::to_string)
                .or_else(|| self.fallback.clone()),
            _ => None,
        }
    }
}

/// Ordered field rules for a merge
#[derive(Debug, Clone)]
pub struct MergePolicy {
    rules: Vec<(String, ArrayStrategy)>,
    clearing: Vec<String>,
    fallback: ArrayStrategy,
    rule_set: GlobSet,
    clearing_set: GlobSet,
}

impl Default for MergePolicy {
    /// No rules; every array concatenates with de-duplication.
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            clearing: Vec::new(),
            fallback: ArrayStrategy::ConcatDedupe,
            rule_set: GlobSet::empty(),
            clearing_set: GlobSet::empty(),
        }
    }
}

impl MergePolicy {
    pub fn builder() -> MergePolicyBuilder {
        MergePolicyBuilder::default()
    }

    /// Policy in which every array is replaced wholesale
    pub fn replace_arrays() -> Self {
        Self {
            fallback: ArrayStrategy::Replace,
            ..Self::default()
        }
    }

    /// Strategy for the array found at `path`
    pub fn strategy_for(&self, path: &FieldPath) -> &ArrayStrategy {
        self.rule_set
            .matches(path.matchable())
            .into_iter()
            .min()
            .map(|index| &self.rules[index].1)
            .unwrap_or(&self.fallback)
    }

    /// Whether an explicit empty object at `path` clears the base value
    pub fn clears_on_empty(&self, path: &FieldPath) -> bool {
        !path.is_root() && self.clearing_set.is_match(path.matchable())
    }

    /// Copy of this policy in which arrays under `patterns` are replaced.
    ///
    /// The new rules take precedence over every existing rule.
    pub fn with_replaced(&self, patterns: &[String]) -> Result<Self, PolicyError> {
        let mut builder = MergePolicyBuilder {
            rules: Vec::new(),
            clearing: self.clearing.clone(),
            fallback: self.fallback.clone(),
        };
        for pattern in patterns {
            builder = builder.rule(pattern, ArrayStrategy::Replace);
        }
        for (pattern, strategy) in &self.rules {
            builder = builder.rule(pattern, strategy.clone());
        }
        builder.build()
    }
}

/// Builder for [`MergePolicy`]
#[derive(Debug, Clone)]
pub struct MergePolicyBuilder {
    rules: Vec<(String, ArrayStrategy)>,
    clearing: Vec<String>,
    fallback: ArrayStrategy,
}

impl Default for MergePolicyBuilder {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            clearing: Vec::new(),
            fallback: ArrayStrategy::ConcatDedupe,
        }
    }
}

impl MergePolicyBuilder {
    /// Add a rule; earlier rules win over later ones
    pub fn rule(mut self, pattern: &str, strategy: ArrayStrategy) -> Self {
        self.rules.push((pattern.to_string(), strategy));
        self
    }

    /// Treat an explicit empty object at `pattern` as clearing the base value
    pub fn clear_on_empty(mut self, pattern: &str) -> Self {
        self.clearing.push(pattern.to_string());
        self
    }

    /// Strategy for arrays no rule matches
    pub fn fallback(mut self, strategy: ArrayStrategy) -> Self {
        self.fallback = strategy;
        self
    }

    pub fn build(self) -> Result<MergePolicy, PolicyError> {
        let rule_set = compile(self.rules.iter().map(|(pattern, _)| pattern.as_str()))?;
        let clearing_set = compile(self.clearing.iter().map(String::as_str))?;

        Ok(MergePolicy {
            rules: self.rules,
            clearing: self.clearing,
            fallback: self.fallback,
            rule_set,
            clearing_set,
        })
    }
}

fn compile<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<GlobSet, PolicyError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&pattern_to_glob(pattern))
            .literal_separator(true)
            .build()
            .map_err(|source| PolicyError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| PolicyError::InvalidPattern {
        pattern: "<set>".to_string(),
        source,
    })
}

//! Resolution errors
//!
//! Every failure is terminal: the first error aborts the resolution and no
//! partial [`Config`](crate::Config) is produced.

use lh_merge::{MergeError, PolicyError};
use std::fmt;
use std::path::PathBuf;

use crate::units::UnitKind;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extension,
    Merge,
    Reference,
    Normalize,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extension => "extension",
            Stage::Merge => "merge",
            Stage::Reference => "reference",
            Stage::Normalize => "normalize",
            Stage::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Configuration resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {kind} reference at {location}: {reason}")]
    InvalidReferenceShape {
        kind: UnitKind,
        location: String,
        reason: String,
    },

    #[error("ambiguous {kind} reference at {location}: {reason}")]
    AmbiguousReference {
        kind: UnitKind,
        location: String,
        reason: String,
    },

    #[error("{kind} '{identifier}' not found (searched: {})", .searched.join(", "))]
    ReferenceNotFound {
        kind: UnitKind,
        identifier: String,
        searched: Vec<String>,
    },

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("cannot extend '{target}' from {from}: {reason}")]
    ExtensionNotFound {
        target: String,
        from: String,
        reason: String,
    },

    #[error("cyclic extension: {}", .chain.join(" -> "))]
    CyclicExtension { chain: Vec<String> },

    #[error("duplicate pass name '{0}'")]
    DuplicatePass(String),

    #[error("duplicate audit id '{0}'")]
    DuplicateAudit(String),

    #[error("category '{category}' references unknown audit '{audit_id}'")]
    DanglingAuditRef { category: String, audit_id: String },

    #[error("audit ref '{audit_id}' in category '{category}' references unknown group '{group}'")]
    DanglingGroupRef {
        category: String,
        audit_id: String,
        group: String,
    },

    #[error("category '{category}' has degenerate weights: {reason}")]
    DegenerateCategory { category: String, reason: String },

    #[error("invalid document {location}: {reason}")]
    InvalidDocument { location: String, reason: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("invalid unit manifest {}: {reason}", .path.display())]
    InvalidModule { path: PathBuf, reason: String },

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("invalid merge policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("cannot fingerprint config: {0}")]
    Fingerprint(String),
}

impl ConfigError {
    /// Stage of the pipeline that raised this error
    pub fn stage(&self) -> Stage {
        match self {
            ConfigError::InvalidReferenceShape { .. }
            | ConfigError::AmbiguousReference { .. }
            | ConfigError::ReferenceNotFound { .. }
            | ConfigError::InvalidModule { .. } => Stage::Reference,
            ConfigError::UnknownPreset(_)
            | ConfigError::ExtensionNotFound { .. }
            | ConfigError::CyclicExtension { .. }
            | ConfigError::InvalidDocument { .. } => Stage::Extension,
            ConfigError::Merge(_) | ConfigError::Policy(_) => Stage::Merge,
            ConfigError::InvalidSettings(_) | ConfigError::Fingerprint(_) => Stage::Normalize,
            ConfigError::DuplicatePass(_)
            | ConfigError::DuplicateAudit(_)
            | ConfigError::DanglingAuditRef { .. }
            | ConfigError::DanglingGroupRef { .. }
            | ConfigError::DegenerateCategory { .. } => Stage::Validate,
        }
    }
}

//! lh-config - audit configuration resolver
//!
//! Resolves a layered, partially specified audit configuration document into a
//! fully materialized [`Config`]: `extends` chains are followed, documents are
//! deep-merged, defaults filled, gatherer and audit references resolved, and
//! the result validated.

pub mod chain;
pub mod config;
pub mod document;
pub mod error;
pub mod normalize;
pub mod reference;
pub mod resolver;
pub mod units;
pub mod validate;

pub use chain::{ChainLoader, PresetRegistry, DEFAULT_PRESET};
pub use config::{
    AuditDefinition, AuditRef, Category, Config, FormFactor, GathererDefinition, Group, OutputMode, Pass,
    PassFields, Settings, Throttling, ThrottlingMethod,
};
pub use document::{ConfigDocument, DocumentOrigin};
pub use error::{ConfigError, Stage};
pub use reference::{AuditSpec, GathererSpec};
pub use resolver::{ResolveOptions, Resolver};
pub use units::{Audit, AuditMeta, Gatherer, GathererFactory, ModuleLoader, ModuleRegistry};

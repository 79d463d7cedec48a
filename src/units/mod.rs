//! Gatherer and audit units
//!
//! Units are the opaque implementations a configuration wires together. The
//! resolver only needs their identity and options; what they do at run time
//! belongs to the runner.

mod catalog;
mod loader;

pub use catalog::{builtin_audits, builtin_gatherers};
pub use loader::{Locator, ModuleLoader, ModuleRegistry, UnitManifest};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Which kind of unit a reference names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Gatherer,
    Audit,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Gatherer => write!(f, "gatherer"),
            UnitKind::Audit => write!(f, "audit"),
        }
    }
}

/// A constructed gatherer, ready to run in a pass
pub trait Gatherer: Send + Sync + fmt::Debug {
    /// Name of the artifact this gatherer produces
    fn name(&self) -> &str;

    /// Options the instance was constructed with
    fn options(&self) -> &Value;
}

/// A gatherer implementation that can be instantiated with options
pub trait GathererFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn instantiate(&self, options: Value) -> Arc<dyn Gatherer>;
}

/// Static description of an audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMeta {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Artifacts the audit reads; gatherer names plus `traces`/`devtoolsLogs`
    #[serde(default)]
    pub required_artifacts: Vec<String>,
}

/// An audit implementation. Audits are stateless; the implementation itself
/// is what a definition holds.
pub trait Audit: Send + Sync + fmt::Debug {
    fn meta(&self) -> &AuditMeta;

    fn default_options(&self) -> Value {
        Value::Object(Map::new())
    }
}

/// Gatherer known only by its artifact name (built-in catalog or manifest)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredGatherer {
    name: String,
}

impl DeclaredGatherer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl GathererFactory for DeclaredGatherer {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, options: Value) -> Arc<dyn Gatherer> {
        Arc::new(GathererInstance {
            name: self.name.clone(),
            options,
        })
    }
}

/// Instance of a [`DeclaredGatherer`]
#[derive(Debug, Clone, PartialEq)]
pub struct GathererInstance {
    name: String,
    options: Value,
}

impl GathererInstance {
    pub fn new(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

impl Gatherer for GathererInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &Value {
        &self.options
    }
}

/// Audit known only by its metadata (built-in catalog or manifest)
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredAudit {
    meta: AuditMeta,
    default_options: Value,
}

impl DeclaredAudit {
    pub fn new(meta: AuditMeta) -> Self {
        Self {
            meta,
            default_options: Value::Object(Map::new()),
        }
    }

    pub fn with_default_options(mut self, options: Value) -> Self {
        self.default_options = options;
        self
    }
}

impl Audit for DeclaredAudit {
    fn meta(&self) -> &AuditMeta {
        &self.meta
    }

    fn default_options(&self) -> Value {
        self.default_options.clone()
    }
}

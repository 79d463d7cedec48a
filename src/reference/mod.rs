//! Gatherer and audit references
//!
//! A reference names a unit in one of several shapes. Parsing turns the JSON
//! form into a [`GathererSpec`] or [`AuditSpec`]; resolution turns a spec into
//! the canonical definition held by a pass or by the audit list.
//!
//! Resolution policy, highest priority first:
//! 1. an instance is used as-is; its own options are overlaid by the explicit
//!    options
//! 2. an implementation is instantiated with the explicit options
//! 3. a path is looked up (defining document's directory, then the plugin
//!    namespace, then built-ins) and handled as an implementation

use lh_merge::MergePolicy;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{AuditDefinition, GathererDefinition};
use crate::document::{json_kind, Binding, Bindings};
use crate::error::ConfigError;
use crate::units::{Audit, Gatherer, GathererFactory, Locator, ModuleLoader, UnitKind};

/// Reserved entry key carrying the directory of the document that declared a
/// path reference
pub const DIR_KEY: &str = "$dir";

/// The shapes a gatherer reference may take
#[derive(Debug, Clone)]
pub enum GathererSpec {
    Path {
        path: String,
        options: Option<Value>,
    },
    Implementation {
        implementation: Arc<dyn GathererFactory>,
        options: Option<Value>,
    },
    Instance {
        instance: Arc<dyn Gatherer>,
        options: Option<Value>,
    },
    BareInstance(Arc<dyn Gatherer>),
    BareImplementation(Arc<dyn GathererFactory>),
    BarePath(String),
}

/// The shapes an audit reference may take
#[derive(Debug, Clone)]
pub enum AuditSpec {
    Path {
        path: String,
        options: Option<Value>,
    },
    Implementation {
        implementation: Arc<dyn Audit>,
        options: Option<Value>,
    },
    BareImplementation(Arc<dyn Audit>),
    BarePath(String),
}

/// Fields of a reference object, checked for shape and ambiguity
struct RawReference<'a> {
    path: Option<&'a str>,
    implementation: Option<&'a str>,
    instance: Option<&'a str>,
    options: Option<Value>,
    dir: Option<PathBuf>,
}

impl<'a> RawReference<'a> {
    fn parse(map: &'a Map<String, Value>, kind: UnitKind, location: &str) -> Result<Self, ConfigError> {
        let shape_error = |reason: String| ConfigError::InvalidReferenceShape {
            kind,
            location: location.to_string(),
            reason,
        };
        let string_field = |key: &str| -> Result<Option<&'a str>, ConfigError> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.as_str())),
                Some(other) => Err(shape_error(format!(
                    "'{}' must be a non-empty string, found {}",
                    key,
                    json_kind(other)
                ))),
            }
        };

        let path = string_field("path")?;
        let implementation = string_field("implementation")?;
        let instance = string_field("instance")?;

        let options = match map.get("options") {
            None | Some(Value::Null) => None,
            Some(Value::Object(options)) => Some(Value::Object(options.clone())),
            Some(other) => {
                return Err(shape_error(format!(
                    "'options' must be an object, found {}",
                    json_kind(other)
                )))
            }
        };
        let dir = map.get(DIR_KEY).and_then(Value::as_str).map(PathBuf::from);

        let ambiguity = match (path.is_some(), implementation.is_some(), instance.is_some()) {
            (true, true, _) => Some("both 'path' and 'implementation' are set"),
            (true, _, true) => Some("both 'path' and 'instance' are set"),
            (_, true, true) => Some("both 'implementation' and 'instance' are set"),
            _ => None,
        };
        if let Some(reason) = ambiguity {
            return Err(ConfigError::AmbiguousReference {
                kind,
                location: location.to_string(),
                reason: reason.to_string(),
            });
        }

        Ok(Self {
            path,
            implementation,
            instance,
            options,
            dir,
        })
    }
}

fn unbound(kind: UnitKind, location: &str, handle: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidReferenceShape {
        kind,
        location: location.to_string(),
        reason: format!("'{}' is not a bound {}", handle, expected),
    }
}

impl GathererSpec {
    /// Parse a gatherer entry, returning the spec and the directory stamped
    /// on it by its defining document
    pub fn from_entry(
        entry: &Value,
        bindings: &Bindings,
        location: &str,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let kind = UnitKind::Gatherer;
        let map = match entry {
            Value::String(path) if !path.is_empty() => return Ok((GathererSpec::BarePath(path.clone()), None)),
            Value::Object(map) => map,
            other => {
                return Err(ConfigError::InvalidReferenceShape {
                    kind,
                    location: location.to_string(),
                    reason: format!("expected a path or a reference object, found {}", json_kind(other)),
                })
            }
        };
        let raw = RawReference::parse(map, kind, location)?;

        let spec = if let Some(handle) = raw.instance {
            match bindings.get(handle) {
                Some(Binding::GathererInstance(instance)) => GathererSpec::Instance {
                    instance: Arc::clone(instance),
                    options: raw.options,
                },
                _ => return Err(unbound(kind, location, handle, "gatherer instance")),
            }
        } else if let Some(handle) = raw.implementation {
            match bindings.get(handle) {
                Some(Binding::GathererImplementation(factory)) => GathererSpec::Implementation {
                    implementation: Arc::clone(factory),
                    options: raw.options,
                },
                _ => return Err(unbound(kind, location, handle, "gatherer implementation")),
            }
        } else if let Some(path) = raw.path {
            GathererSpec::Path {
                path: path.to_string(),
                options: raw.options,
            }
        } else {
            return Err(ConfigError::InvalidReferenceShape {
                kind,
                location: location.to_string(),
                reason: "reference names no path, implementation or instance".to_string(),
            });
        };
        Ok((spec, raw.dir))
    }
}

impl AuditSpec {
    /// Parse an audit entry, returning the spec and the directory stamped on
    /// it by its defining document
    pub fn from_entry(
        entry: &Value,
        bindings: &Bindings,
        location: &str,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let kind = UnitKind::Audit;
        let map = match entry {
            Value::String(path) if !path.is_empty() => return Ok((AuditSpec::BarePath(path.clone()), None)),
            Value::Object(map) => map,
            other => {
                return Err(ConfigError::InvalidReferenceShape {
                    kind,
                    location: location.to_string(),
                    reason: format!("expected a path or a reference object, found {}", json_kind(other)),
                })
            }
        };
        let raw = RawReference::parse(map, kind, location)?;
        if raw.instance.is_some() {
            return Err(ConfigError::InvalidReferenceShape {
                kind,
                location: location.to_string(),
                reason: "audits cannot be referenced by instance".to_string(),
            });
        }

        let spec = if let Some(handle) = raw.implementation {
            match bindings.get(handle) {
                Some(Binding::AuditImplementation(audit)) => AuditSpec::Implementation {
                    implementation: Arc::clone(audit),
                    options: raw.options,
                },
                _ => return Err(unbound(kind, location, handle, "audit implementation")),
            }
        } else if let Some(path) = raw.path {
            AuditSpec::Path {
                path: path.to_string(),
                options: raw.options,
            }
        } else {
            return Err(ConfigError::InvalidReferenceShape {
                kind,
                location: location.to_string(),
                reason: "reference names no path or implementation".to_string(),
            });
        };
        Ok((spec, raw.dir))
    }
}

/// Turns specs into definitions using a [`ModuleLoader`]
pub struct ReferenceResolver<'a> {
    loader: &'a dyn ModuleLoader,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(loader: &'a dyn ModuleLoader) -> Self {
        Self { loader }
    }

    pub fn resolve_gatherer(
        &self,
        spec: GathererSpec,
        base_dir: Option<&Path>,
    ) -> Result<GathererDefinition, ConfigError> {
        match spec {
            GathererSpec::Instance { instance, options } => {
                let options = overlay(instance.options().clone(), options)?;
                Ok(GathererDefinition {
                    implementation: None,
                    instance,
                    path: None,
                    options,
                })
            }
            GathererSpec::BareInstance(instance) => self.resolve_gatherer(
                GathererSpec::Instance {
                    instance,
                    options: None,
                },
                base_dir,
            ),
            GathererSpec::Implementation {
                implementation,
                options,
            } => Ok(instantiate(implementation, None, options)),
            GathererSpec::BareImplementation(implementation) => Ok(instantiate(implementation, None, None)),
            GathererSpec::Path { path, options } => {
                let factory = self.load_gatherer(&path, base_dir)?;
                Ok(instantiate(factory, Some(path), options))
            }
            GathererSpec::BarePath(path) => {
                let factory = self.load_gatherer(&path, base_dir)?;
                Ok(instantiate(factory, Some(path), None))
            }
        }
    }

    pub fn resolve_audit(&self, spec: AuditSpec, base_dir: Option<&Path>) -> Result<AuditDefinition, ConfigError> {
        let (implementation, path, options) = match spec {
            AuditSpec::Implementation {
                implementation,
                options,
            } => (implementation, None, options),
            AuditSpec::BareImplementation(implementation) => (implementation, None, None),
            AuditSpec::Path { path, options } => (self.load_audit(&path, base_dir)?, Some(path), options),
            AuditSpec::BarePath(path) => (self.load_audit(&path, base_dir)?, Some(path), None),
        };
        let options = overlay(implementation.default_options(), options)?;
        Ok(AuditDefinition {
            implementation,
            path,
            options,
        })
    }

    fn load_gatherer(&self, identifier: &str, base_dir: Option<&Path>) -> Result<Arc<dyn GathererFactory>, ConfigError> {
        let locators = candidates(identifier, base_dir);
        for locator in &locators {
            if let Some(factory) = self.loader.load_gatherer(locator)? {
                tracing::debug!(identifier, %locator, "resolved gatherer");
                return Ok(factory);
            }
        }
        Err(not_found(UnitKind::Gatherer, identifier, &locators))
    }

    fn load_audit(&self, identifier: &str, base_dir: Option<&Path>) -> Result<Arc<dyn Audit>, ConfigError> {
        let locators = candidates(identifier, base_dir);
        for locator in &locators {
            if let Some(audit) = self.loader.load_audit(locator)? {
                tracing::debug!(identifier, %locator, "resolved audit");
                return Ok(audit);
            }
        }
        Err(not_found(UnitKind::Audit, identifier, &locators))
    }
}

/// Search order for a path reference
fn candidates(identifier: &str, base_dir: Option<&Path>) -> Vec<Locator> {
    let mut locators = Vec::with_capacity(3);
    let as_path = Path::new(identifier);
    match base_dir {
        Some(dir) => locators.push(Locator::File(dir.join(as_path))),
        None if as_path.is_absolute() => locators.push(Locator::File(as_path.to_path_buf())),
        None => {}
    }
    locators.push(Locator::Plugin(identifier.to_string()));
    locators.push(Locator::Builtin(identifier.to_string()));
    locators
}

fn not_found(kind: UnitKind, identifier: &str, locators: &[Locator]) -> ConfigError {
    ConfigError::ReferenceNotFound {
        kind,
        identifier: identifier.to_string(),
        searched: locators.iter().map(ToString::to_string).collect(),
    }
}

fn instantiate(
    factory: Arc<dyn GathererFactory>,
    path: Option<String>,
    options: Option<Value>,
) -> GathererDefinition {
    let options = options.unwrap_or_else(|| Value::Object(Map::new()));
    let instance = factory.instantiate(options.clone());
    GathererDefinition {
        implementation: Some(factory),
        instance,
        path,
        options,
    }
}

/// Explicit options over a unit's own options; option arrays are replaced
fn overlay(own: Value, explicit: Option<Value>) -> Result<Value, ConfigError> {
    let own = match own {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    match explicit {
        Some(explicit) => Ok(lh_merge::merge(own, explicit, &MergePolicy::replace_arrays(), false)?),
        None => Ok(own),
    }
}

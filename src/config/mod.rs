//! Resolved configuration
//!
//! [`Config`] is the fully materialized output of a resolution: every
//! setting filled, every gatherer and audit reference resolved to a
//! definition, and every structural invariant checked.

mod defaults;

pub use defaults::{
    DEVTOOLS_RTT_ADJUSTMENT_FACTOR, DEVTOOLS_THROUGHPUT_ADJUSTMENT_FACTOR, MOBILE_RTT_MS,
    MOBILE_THROUGHPUT_KBPS,
};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::units::{Audit, Gatherer, GathererFactory};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Json,
    Html,
    Csv,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Json => "json",
            OutputMode::Html => "html",
            OutputMode::Csv => "csv",
        }
    }
}

/// How network and CPU throttling is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    Devtools,
    Simulate,
    Provided,
}

impl ThrottlingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottlingMethod::Devtools => "devtools",
            ThrottlingMethod::Simulate => "simulate",
            ThrottlingMethod::Provided => "provided",
        }
    }
}

/// Emulated device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    Mobile,
    Desktop,
    None,
}

impl FormFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormFactor::Mobile => "mobile",
            FormFactor::Desktop => "desktop",
            FormFactor::None => "none",
        }
    }
}

/// Throttling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Throttling {
    pub rtt_ms: f64,
    pub throughput_kbps: f64,
    pub request_latency_ms: f64,
    pub download_throughput_kbps: f64,
    pub upload_throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
}

/// Run settings. Every field is required; nullable fields are `None`, never
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub output: OutputMode,
    /// Page load timeout (ms)
    pub max_wait_for_load: u64,
    pub throttling_method: ThrottlingMethod,
    pub throttling: Throttling,
    pub audit_mode: bool,
    pub gather_mode: bool,
    pub disable_storage_reset: bool,
    pub disable_device_emulation: bool,
    pub emulated_form_factor: FormFactor,
    pub locale: String,
    pub blocked_url_patterns: Option<Vec<String>>,
    pub additional_trace_categories: Option<String>,
    pub extra_headers: Option<BTreeMap<String, String>>,
    pub only_audits: Option<Vec<String>>,
    pub only_categories: Option<Vec<String>>,
    pub skip_audits: Option<Vec<String>>,
    pub precomputed_lantern_data: Option<Value>,
    pub channel: String,
}

/// Scalar fields of a pass, as read from a merged document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PassFields {
    pub pass_name: String,
    pub record_trace: bool,
    pub use_throttling: bool,
    pub pause_after_load_ms: u64,
    pub network_quiet_threshold_ms: u64,
    pub cpu_quiet_threshold_ms: u64,
    pub blocked_url_patterns: Vec<String>,
    pub blank_page: String,
    pub blank_duration: u64,
}

/// One page load and the gatherers that observe it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pass {
    pub pass_name: String,
    pub record_trace: bool,
    pub use_throttling: bool,
    pub pause_after_load_ms: u64,
    pub network_quiet_threshold_ms: u64,
    pub cpu_quiet_threshold_ms: u64,
    pub blocked_url_patterns: Vec<String>,
    pub blank_page: String,
    pub blank_duration: u64,
    pub gatherers: Vec<GathererDefinition>,
}

impl Pass {
    pub fn new(fields: PassFields, gatherers: Vec<GathererDefinition>) -> Self {
        Self {
            pass_name: fields.pass_name,
            record_trace: fields.record_trace,
            use_throttling: fields.use_throttling,
            pause_after_load_ms: fields.pause_after_load_ms,
            network_quiet_threshold_ms: fields.network_quiet_threshold_ms,
            cpu_quiet_threshold_ms: fields.cpu_quiet_threshold_ms,
            blocked_url_patterns: fields.blocked_url_patterns,
            blank_page: fields.blank_page,
            blank_duration: fields.blank_duration,
            gatherers,
        }
    }

    /// Artifact names produced by this pass
    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.gatherers.iter().map(|g| g.instance.name())
    }
}

/// A resolved gatherer
#[derive(Debug, Clone)]
pub struct GathererDefinition {
    /// Absent when the reference supplied a ready instance
    pub implementation: Option<Arc<dyn GathererFactory>>,
    pub instance: Arc<dyn Gatherer>,
    pub path: Option<String>,
    pub options: Value,
}

impl GathererDefinition {
    pub fn name(&self) -> &str {
        self.instance.name()
    }
}

impl Serialize for GathererDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GathererDefinition", 3)?;
        state.serialize_field("name", self.instance.name())?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("options", &self.options)?;
        state.end()
    }
}

/// A resolved audit
#[derive(Debug, Clone)]
pub struct AuditDefinition {
    pub implementation: Arc<dyn Audit>,
    pub path: Option<String>,
    pub options: Value,
}

impl AuditDefinition {
    pub fn id(&self) -> &str {
        &self.implementation.meta().id
    }

    pub fn required_artifacts(&self) -> &[String] {
        &self.implementation.meta().required_artifacts
    }
}

impl Serialize for AuditDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AuditDefinition", 3)?;
        state.serialize_field("id", self.id())?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("options", &self.options)?;
        state.end()
    }
}

/// Weighted reference from a category to an audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRef {
    pub id: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Scored collection of audits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_description: Option<String>,
    #[serde(default)]
    pub audit_refs: Vec<AuditRef>,
}

/// Display grouping of audit refs within a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Fully resolved configuration.
///
/// `None` collections were never defined anywhere in the chain, which is
/// distinct from a collection explicitly cleared to empty.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub settings: Settings,
    pub passes: Option<Vec<Pass>>,
    pub audits: Option<Vec<AuditDefinition>>,
    pub categories: Option<BTreeMap<String, Category>>,
    pub groups: Option<BTreeMap<String, Group>>,
}

impl Config {
    pub fn pass(&self, name: &str) -> Option<&Pass> {
        self.passes.as_ref()?.iter().find(|p| p.pass_name == name)
    }

    pub fn audit(&self, id: &str) -> Option<&AuditDefinition> {
        self.audits.as_ref()?.iter().find(|a| a.id() == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.as_ref()?.get(id)
    }

    /// SHA-256 over the canonical (RFC 8785) JSON form, hex encoded
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let jcs_bytes =
            serde_json_canonicalizer::to_vec(self).map_err(|e| ConfigError::Fingerprint(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Short human-readable summary
    pub fn to_human(&self) -> String {
        let mut lines = Vec::new();
        let settings = &self.settings;
        lines.push(format!(
            "Settings: {} output, {} throttling, {} form factor, locale {}",
            settings.output.as_str(),
            settings.throttling_method.as_str(),
            settings.emulated_form_factor.as_str(),
            settings.locale
        ));

        match &self.passes {
            Some(passes) => {
                lines.push(format!("Passes ({}):", passes.len()));
                for pass in passes {
                    let names: Vec<&str> = pass.artifacts().collect();
                    lines.push(format!("  {} [{}]", pass.pass_name, names.join(", ")));
                }
            }
            None => lines.push("Passes: none".to_string()),
        }

        match &self.audits {
            Some(audits) => lines.push(format!("Audits: {}", audits.len())),
            None => lines.push("Audits: none".to_string()),
        }

        match &self.categories {
            Some(categories) => {
                lines.push(format!("Categories ({}):", categories.len()));
                for (id, category) in categories {
                    lines.push(format!(
                        "  {} \"{}\" ({} audit refs)",
                        id,
                        category.title,
                        category.audit_refs.len()
                    ));
                }
            }
            None => lines.push("Categories: none".to_string()),
        }

        lines.join("\n")
    }
}

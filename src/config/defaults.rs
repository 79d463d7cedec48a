//! Built-in defaults
//!
//! Every settings field and every pass field has a value here, so the merged
//! settings of any chain can be read without optional fields.

use serde_json::Value;

use super::{FormFactor, OutputMode, PassFields, Settings, Throttling, ThrottlingMethod};
use crate::document::DEFAULT_PASS_NAME;
use crate::error::ConfigError;

/// Simulated mobile network round trip (ms)
pub const MOBILE_RTT_MS: f64 = 150.0;
/// Simulated mobile throughput (Kbps)
pub const MOBILE_THROUGHPUT_KBPS: f64 = 1.6 * 1024.0;
/// Request latency applied by devtools throttling
pub const DEVTOOLS_RTT_ADJUSTMENT_FACTOR: f64 = 3.75;
/// Throughput factor applied by devtools throttling
pub const DEVTOOLS_THROUGHPUT_ADJUSTMENT_FACTOR: f64 = 0.9;

impl Default for Throttling {
    fn default() -> Self {
        Self {
            rtt_ms: MOBILE_RTT_MS,
            throughput_kbps: MOBILE_THROUGHPUT_KBPS,
            request_latency_ms: MOBILE_RTT_MS * DEVTOOLS_RTT_ADJUSTMENT_FACTOR,
            download_throughput_kbps: MOBILE_THROUGHPUT_KBPS * DEVTOOLS_THROUGHPUT_ADJUSTMENT_FACTOR,
            upload_throughput_kbps: 750.0 * DEVTOOLS_THROUGHPUT_ADJUSTMENT_FACTOR,
            cpu_slowdown_multiplier: 4.0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: OutputMode::Json,
            max_wait_for_load: 45_000,
            throttling_method: ThrottlingMethod::Devtools,
            throttling: Throttling::default(),
            audit_mode: false,
            gather_mode: false,
            disable_storage_reset: false,
            disable_device_emulation: false,
            emulated_form_factor: FormFactor::Mobile,
            locale: "en-US".to_string(),
            blocked_url_patterns: None,
            additional_trace_categories: None,
            extra_headers: None,
            only_audits: None,
            only_categories: None,
            skip_audits: None,
            precomputed_lantern_data: None,
            channel: "node".to_string(),
        }
    }
}

impl Settings {
    /// Defaults as a JSON value, the base layer for settings merges
    pub fn defaults_value() -> Result<Value, ConfigError> {
        serde_json::to_value(Settings::default()).map_err(|e| ConfigError::InvalidSettings(e.to_string()))
    }
}

impl Default for PassFields {
    fn default() -> Self {
        Self {
            pass_name: DEFAULT_PASS_NAME.to_string(),
            record_trace: false,
            use_throttling: false,
            pause_after_load_ms: 0,
            network_quiet_threshold_ms: 0,
            cpu_quiet_threshold_ms: 0,
            blocked_url_patterns: Vec::new(),
            blank_page: "about:blank".to_string(),
            blank_duration: 300,
        }
    }
}

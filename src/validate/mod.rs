//! Structural checks over a normalized config
//!
//! Runs once, after normalization, and stops at the first violation.

use std::collections::BTreeSet;

use crate::config::{Category, Config};
use crate::error::ConfigError;

/// Check every structural invariant of `config`
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_passes(config)?;
    validate_audits(config)?;
    validate_categories(config)?;
    Ok(())
}

fn validate_passes(config: &Config) -> Result<(), ConfigError> {
    let Some(passes) = &config.passes else {
        return Ok(());
    };

    let mut seen = BTreeSet::new();
    for pass in passes {
        if !seen.insert(pass.pass_name.as_str()) {
            return Err(ConfigError::DuplicatePass(pass.pass_name.clone()));
        }
        if pass.use_throttling && !pass.record_trace {
            tracing::warn!(
                pass = %pass.pass_name,
                "pass uses throttling but does not record a trace"
            );
        }
    }
    Ok(())
}

fn validate_audits(config: &Config) -> Result<(), ConfigError> {
    let Some(audits) = &config.audits else {
        return Ok(());
    };

    let mut seen = BTreeSet::new();
    for audit in audits {
        if !seen.insert(audit.id()) {
            return Err(ConfigError::DuplicateAudit(audit.id().to_string()));
        }
    }
    Ok(())
}

fn validate_categories(config: &Config) -> Result<(), ConfigError> {
    let Some(categories) = &config.categories else {
        return Ok(());
    };

    let audit_ids: BTreeSet<&str> = config
        .audits
        .iter()
        .flatten()
        .map(|audit| audit.id())
        .collect();

    for (id, category) in categories {
        for audit_ref in &category.audit_refs {
            if !audit_ids.contains(audit_ref.id.as_str()) {
                return Err(ConfigError::DanglingAuditRef {
                    category: id.clone(),
                    audit_id: audit_ref.id.clone(),
                });
            }
            if let Some(group) = &audit_ref.group {
                let known = config
                    .groups
                    .as_ref()
                    .map_or(false, |groups| groups.contains_key(group));
                if !known {
                    return Err(ConfigError::DanglingGroupRef {
                        category: id.clone(),
                        audit_id: audit_ref.id.clone(),
                        group: group.clone(),
                    });
                }
            }
        }
        validate_weights(id, category)?;
    }
    Ok(())
}

/// Weights must be finite and non-negative. A category whose weights are all
/// zero is informational and accepted.
fn validate_weights(id: &str, category: &Category) -> Result<(), ConfigError> {
    for audit_ref in &category.audit_refs {
        let weight = audit_ref.weight;
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::DegenerateCategory {
                category: id.to_string(),
                reason: format!("audit '{}' has weight {}", audit_ref.id, weight),
            });
        }
    }
    Ok(())
}

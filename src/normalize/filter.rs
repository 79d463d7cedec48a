//! Audit selection
//!
//! Applies `onlyCategories`, `onlyAudits` and `skipAudits`, then drops the
//! gatherers and passes no remaining audit needs.

use std::collections::BTreeSet;

use crate::config::{Config, Pass};

const TRACES: &str = "traces";
const DEVTOOLS_LOGS: &str = "devtoolsLogs";

/// Restrict `config` to the selected categories and audits. A config with no
/// selection settings is left untouched.
pub(crate) fn apply(config: &mut Config) {
    let only_categories = config.settings.only_categories.clone();
    let only_audits = config.settings.only_audits.clone();
    let skip_audits = config.settings.skip_audits.clone();
    if only_categories.is_none() && only_audits.is_none() && skip_audits.is_none() {
        return;
    }

    let selective = only_categories.is_some() || only_audits.is_some();
    let only_categories: BTreeSet<String> = only_categories.unwrap_or_default().into_iter().collect();
    let only_audits: BTreeSet<String> = only_audits.unwrap_or_default().into_iter().collect();
    let skip_audits: BTreeSet<String> = skip_audits.unwrap_or_default().into_iter().collect();

    for id in &only_audits {
        if skip_audits.contains(id) {
            tracing::warn!(audit = %id, "audit is both selected and skipped; skipping it");
        }
    }

    if let Some(categories) = &mut config.categories {
        for id in &only_categories {
            if !categories.contains_key(id) {
                tracing::warn!(category = %id, "unknown category in onlyCategories");
            }
        }

        if selective {
            categories.retain(|id, category| {
                if only_categories.contains(id) {
                    return true;
                }
                category.audit_refs.retain(|r| only_audits.contains(&r.id));
                !category.audit_refs.is_empty()
            });
        }
        for category in categories.values_mut() {
            category.audit_refs.retain(|r| !skip_audits.contains(&r.id));
        }
    }

    let Some(audits) = &mut config.audits else {
        return;
    };

    for id in only_audits.iter().chain(skip_audits.iter()) {
        if !audits.iter().any(|audit| audit.id() == id) {
            tracing::warn!(audit = %id, "unknown audit in audit selection");
        }
    }

    let requested: Option<BTreeSet<String>> = selective.then(|| {
        let mut requested = only_audits.clone();
        if let Some(categories) = &config.categories {
            requested.extend(
                categories
                    .values()
                    .flat_map(|category| category.audit_refs.iter().map(|r| r.id.clone())),
            );
        }
        requested
    });
    audits.retain(|audit| {
        let id = audit.id();
        requested.as_ref().map_or(true, |requested| requested.contains(id)) && !skip_audits.contains(id)
    });

    let required: BTreeSet<&str> = audits
        .iter()
        .flat_map(|audit| audit.required_artifacts().iter().map(String::as_str))
        .collect();
    if let Some(passes) = &mut config.passes {
        prune_passes(passes, &required);
    }
}

fn prune_passes(passes: &mut Vec<Pass>, required: &BTreeSet<&str>) {
    let needs_trace = required.contains(TRACES) || required.contains(DEVTOOLS_LOGS);

    for pass in passes.iter_mut() {
        pass.gatherers.retain(|gatherer| required.contains(gatherer.name()));
    }
    passes.retain(|pass| {
        let keep = !pass.gatherers.is_empty() || (pass.record_trace && needs_trace);
        if !keep {
            tracing::debug!(pass = %pass.pass_name, "dropping pass with no required artifacts");
        }
        keep
    });
}

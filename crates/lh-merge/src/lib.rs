//! Structural merge for layered configuration documents
//!
//! Merge semantics:
//! - Objects: deep-merge by key (recursive)
//! - Arrays: per-field strategy from the [`MergePolicy`] (replace,
//!   concat-dedupe, merge-by-key); an explicit empty array clears
//! - Scalars: override (extension wins)
//! - Null extension: no contribution (base kept)
//! - Null base: extension taken as-is

mod path;
mod policy;

pub use path::FieldPath;
pub use policy::{ArrayStrategy, EntryKey, MergePolicy, MergePolicyBuilder, PolicyError};

use serde_json::Value;

/// Merge errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error("type mismatch at '{path}': cannot merge {found} onto {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Merge `extension` onto `base`.
///
/// With `overwrite_arrays` every array below this point is replaced instead
/// of merged, regardless of the policy.
pub fn merge(
    base: Value,
    extension: Value,
    policy: &MergePolicy,
    overwrite_arrays: bool,
) -> Result<Value, MergeError> {
    let mut path = FieldPath::root();
    merge_at(&mut path, base, extension, policy, overwrite_arrays)
}

/// Fold layers in order (first is most general, last has highest precedence)
pub fn fold<I>(layers: I, policy: &MergePolicy) -> Result<Value, MergeError>
where
    I: IntoIterator<Item = Value>,
{
    layers
        .into_iter()
        .try_fold(Value::Null, |merged, layer| merge(merged, layer, policy, false))
}

fn merge_at(
    path: &mut FieldPath,
    base: Value,
    extension: Value,
    policy: &MergePolicy,
    overwrite_arrays: bool,
) -> Result<Value, MergeError> {
    match (base, extension) {
        (base, Value::Null) => Ok(base),
        (Value::Null, extension) => Ok(extension),

        (Value::Object(mut base_map), Value::Object(extension_map)) => {
            if extension_map.is_empty() && policy.clears_on_empty(path) {
                return Ok(Value::Object(extension_map));
            }
            for (key, extension_value) in extension_map {
                path.push_key(&key);
                let merged = match base_map.remove(&key) {
                    Some(base_value) => {
                        merge_at(path, base_value, extension_value, policy, overwrite_arrays)?
                    }
                    None => extension_value,
                };
                path.pop();
                base_map.insert(key, merged);
            }
            Ok(Value::Object(base_map))
        }

        (Value::Array(base_items), Value::Array(extension_items)) => {
            if overwrite_arrays || extension_items.is_empty() {
                return Ok(Value::Array(extension_items));
            }
            let merged = match policy.strategy_for(path) {
                ArrayStrategy::Replace => extension_items,
                ArrayStrategy::ConcatDedupe => concat_dedupe(base_items, extension_items),
                ArrayStrategy::MergeByKey(key) => {
                    merge_by_key(path, base_items, extension_items, key, policy)?
                }
            };
            Ok(Value::Array(merged))
        }

        (base, extension @ (Value::Object(_) | Value::Array(_))) => Err(MergeError::TypeMismatch {
            path: path.to_string(),
            expected: kind(&base),
            found: kind(&extension),
        }),

        // Scalars and any other case: extension wins
        (_, extension) => Ok(extension),
    }
}

fn concat_dedupe(mut base: Vec<Value>, extension: Vec<Value>) -> Vec<Value> {
    for item in extension {
        if !base.contains(&item) {
            base.push(item);
        }
    }
    base
}

/// Extension entries are matched against base entries only, so entries the
/// extension itself repeats stay repeated.
fn merge_by_key(
    path: &mut FieldPath,
    mut merged: Vec<Value>,
    extension: Vec<Value>,
    key: &EntryKey,
    policy: &MergePolicy,
) -> Result<Vec<Value>, MergeError> {
    let base_keys: Vec<Option<String>> = merged.iter().map(|entry| key.key_of(entry)).collect();

    for entry in extension {
        let entry_key = key.key_of(&entry);
        let position = entry_key
            .as_ref()
            .and_then(|k| base_keys.iter().position(|candidate| candidate.as_ref() == Some(k)));

        match position {
            Some(index) => {
                path.push_index(index);
                let current = std::mem::take(&mut merged[index]);
                merged[index] = merge_at(path, current, entry, policy, false)?;
                path.pop();
            }
            None if entry_key.is_some() => merged.push(entry),
            None => {
                if !merged.contains(&entry) {
                    merged.push(entry);
                }
            }
        }
    }
    Ok(merged)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passes_policy() -> MergePolicy {
        MergePolicy::builder()
            .rule(
                "passes",
                ArrayStrategy::MergeByKey(EntryKey::field("passName").with_fallback("defaultPass")),
            )
            .rule(
                "passes.*.gatherers",
                ArrayStrategy::MergeByKey(EntryKey::first_of(&["path", "implementation"])),
            )
            .rule("settings.**", ArrayStrategy::Replace)
            .clear_on_empty("categories")
            .build()
            .unwrap()
    }

    #[test]
    fn test_scalar_override() {
        let result = merge(
            json!({"maxWaitForLoad": 45000}),
            json!({"maxWaitForLoad": 30000}),
            &MergePolicy::default(),
            false,
        )
        .unwrap();
        assert_eq!(result["maxWaitForLoad"], 30000);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({
            "settings": {
                "throttling": {"rttMs": 150, "cpuSlowdownMultiplier": 4}
            }
        });
        let overlay = json!({
            "settings": {
                "throttling": {"rttMs": 40}
            }
        });
        let result = merge(base, overlay, &MergePolicy::default(), false).unwrap();

        assert_eq!(result["settings"]["throttling"]["rttMs"], 40);
        assert_eq!(result["settings"]["throttling"]["cpuSlowdownMultiplier"], 4);
    }

    #[test]
    fn test_unkeyed_array_concat_dedupe() {
        let result = merge(
            json!({"blockedUrlPatterns": ["*.css", "*.png"]}),
            json!({"blockedUrlPatterns": ["*.png", "*.woff"]}),
            &MergePolicy::default(),
            false,
        )
        .unwrap();

        assert_eq!(result["blockedUrlPatterns"], json!(["*.css", "*.png", "*.woff"]));
    }

    #[test]
    fn test_overwrite_arrays_replaces() {
        let result = merge(
            json!({"blockedUrlPatterns": ["*.css", "*.png", "*.svg"]}),
            json!({"blockedUrlPatterns": ["*.woff", "*.ttf"]}),
            &MergePolicy::default(),
            true,
        )
        .unwrap();

        assert_eq!(result["blockedUrlPatterns"], json!(["*.woff", "*.ttf"]));
    }

    #[test]
    fn test_replace_rule() {
        let result = merge(
            json!({"settings": {"onlyAudits": ["a", "b"]}}),
            json!({"settings": {"onlyAudits": ["c"]}}),
            &passes_policy(),
            false,
        )
        .unwrap();

        assert_eq!(result["settings"]["onlyAudits"], json!(["c"]));
    }

    #[test]
    fn test_keyed_entries_merge_in_place() {
        let base = json!({
            "passes": [
                {"passName": "defaultPass", "recordTrace": true, "gatherers": [{"path": "scripts"}]},
                {"passName": "offlinePass", "gatherers": [{"path": "offline"}]}
            ]
        });
        let extension = json!({
            "passes": [
                {"passName": "redirectPass", "gatherers": [{"path": "http-redirect"}]},
                {"passName": "defaultPass", "gatherers": [{"path": "extra"}]}
            ]
        });
        let result = merge(base, extension, &passes_policy(), false).unwrap();
        let passes = result["passes"].as_array().unwrap();

        assert_eq!(passes.len(), 3);
        assert_eq!(passes[0]["passName"], "defaultPass");
        assert_eq!(passes[0]["recordTrace"], true);
        assert_eq!(
            passes[0]["gatherers"],
            json!([{"path": "scripts"}, {"path": "extra"}])
        );
        assert_eq!(passes[1]["passName"], "offlinePass");
        assert_eq!(passes[2]["passName"], "redirectPass");
    }

    #[test]
    fn test_keyed_entry_options_merge() {
        let base = json!({"passes": [{"passName": "p", "gatherers": [{"path": "g", "options": {"a": 1}}]}]});
        let extension = json!({"passes": [{"passName": "p", "gatherers": [{"path": "g", "options": {"b": 2}}]}]});
        let result = merge(base, extension, &passes_policy(), false).unwrap();

        assert_eq!(
            result["passes"][0]["gatherers"],
            json!([{"path": "g", "options": {"a": 1, "b": 2}}])
        );
    }

    #[test]
    fn test_missing_key_uses_fallback() {
        let base = json!({"passes": [{"passName": "defaultPass", "recordTrace": true}]});
        let extension = json!({"passes": [{"useThrottling": true}]});
        let result = merge(base, extension, &passes_policy(), false).unwrap();
        let passes = result["passes"].as_array().unwrap();

        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0]["recordTrace"], true);
        assert_eq!(passes[0]["useThrottling"], true);
    }

    #[test]
    fn test_repeated_extension_entries_kept() {
        let extension = json!({"passes": [{"passName": "x"}, {"passName": "x"}]});
        let result = merge(json!({"passes": []}), extension, &passes_policy(), false).unwrap();

        assert_eq!(result["passes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_array_clears() {
        let result = merge(
            json!({"audits": ["a", "b"]}),
            json!({"audits": []}),
            &MergePolicy::default(),
            false,
        )
        .unwrap();

        assert_eq!(result["audits"], json!([]));
    }

    #[test]
    fn test_empty_object_clears_only_configured_maps() {
        let base = json!({"categories": {"seo": {"title": "SEO"}}, "groups": {"g": {"title": "G"}}});
        let extension = json!({"categories": {}, "groups": {}});
        let result = merge(base, extension, &passes_policy(), false).unwrap();

        assert_eq!(result["categories"], json!({}));
        assert_eq!(result["groups"]["g"]["title"], "G");
    }

    #[test]
    fn test_null_extension_is_no_contribution() {
        let result = merge(
            json!({"passes": [{"passName": "a"}], "value": 100}),
            json!({"passes": null, "value": null}),
            &passes_policy(),
            false,
        )
        .unwrap();

        assert_eq!(result["passes"], json!([{"passName": "a"}]));
        assert_eq!(result["value"], 100);
    }

    #[test]
    fn test_null_base_yields_extension() {
        let extension = json!({"a": [1, 2]});
        let result = merge(Value::Null, extension.clone(), &MergePolicy::default(), false).unwrap();
        assert_eq!(result, extension);
    }

    #[test]
    fn test_type_mismatch() {
        let err = merge(
            json!({"passes": [{"passName": "a"}]}),
            json!({"passes": {"passName": "a"}}),
            &passes_policy(),
            false,
        )
        .unwrap_err();

        assert_eq!(
            err,
            MergeError::TypeMismatch {
                path: "passes".to_string(),
                expected: "array",
                found: "object",
            }
        );
    }

    #[test]
    fn test_type_mismatch_reports_nested_path() {
        let err = merge(
            json!({"passes": [{"passName": "a", "gatherers": [{"path": "g", "options": 1}]}]}),
            json!({"passes": [{"passName": "a", "gatherers": [{"path": "g", "options": {"x": 1}}]}]}),
            &passes_policy(),
            false,
        )
        .unwrap_err();

        assert!(err.to_string().contains("passes[0].gatherers[0].options"));
    }

    #[test]
    fn test_fold_layers() {
        let preset = json!({
            "maxWaitForLoad": 45000,
            "throttling": {"rttMs": 150, "cpuSlowdownMultiplier": 4}
        });
        let extension = json!({"maxWaitForLoad": 60000});
        let site = json!({"throttling": {"rttMs": 40}});
        let flags = json!({"maxWaitForLoad": 10000});

        let result = fold(vec![preset, extension, site, flags], &MergePolicy::default()).unwrap();

        assert_eq!(result["maxWaitForLoad"], 10000);
        assert_eq!(result["throttling"]["rttMs"], 40);
        assert_eq!(result["throttling"]["cpuSlowdownMultiplier"], 4);
    }
}

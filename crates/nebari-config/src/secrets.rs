//! Secret placeholders and `NEBARI_SECRET__` environment overrides.

use crate::error::{ConfigError, Result};
use crate::path::set_nested_value;
use serde_yaml::Value;

/// Leaf values starting with this prefix are replaced by an environment variable.
pub const SECRET_PLACEHOLDER_PREFIX: &str = "NEBARI_SECRET_";

/// Environment variables starting with this prefix override configuration fields.
pub const OVERRIDE_PREFIX: &str = "NEBARI_SECRET__";

/// Separator between path segments in an override variable name.
pub const OVERRIDE_SEPARATOR: &str = "__";

/// Replaces every `NEBARI_SECRET_<VAR>` leaf with the value of `<VAR>`.
pub fn resolve_placeholders<F>(node: &mut Value, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match node {
        Value::Mapping(map) => {
            for (_, child) in map.iter_mut() {
                resolve_placeholders(child, lookup)?;
            }
        }
        Value::Sequence(seq) => {
            for child in seq.iter_mut() {
                resolve_placeholders(child, lookup)?;
            }
        }
        Value::String(text) => {
            if let Some(var) = text.strip_prefix(SECRET_PLACEHOLDER_PREFIX)
                && !var.is_empty()
            {
                let resolved = lookup(var).ok_or_else(|| ConfigError::MissingSecret {
                    placeholder: text.clone(),
                    var: var.to_string(),
                })?;
                tracing::debug!(var = %var, "resolved secret placeholder");
                *text = resolved;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Applies `NEBARI_SECRET__a__b__0=value` style variables to the raw tree.
///
/// Variables are applied in name order. Returns the names that were applied.
pub fn apply_env_overrides<I>(root: &mut Value, vars: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(name, _)| name.starts_with(OVERRIDE_PREFIX))
        .collect();
    overrides.sort_by(|a, b| a.0.cmp(&b.0));

    let mut applied = Vec::with_capacity(overrides.len());
    for (name, raw) in overrides {
        let rest = &name[OVERRIDE_PREFIX.len()..];
        let segments: Vec<&str> = rest.split(OVERRIDE_SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::EnvOverride {
                var: name.clone(),
                reason: "empty path segment".to_string(),
            });
        }

        set_nested_value(root, &segments, parse_scalar(&raw)).map_err(|e| {
            ConfigError::EnvOverride {
                var: name.clone(),
                reason: e.to_string(),
            }
        })?;

        // Values may be credentials, only the key is logged.
        tracing::debug!(var = %name, "applied configuration override");
        applied.push(name);
    }

    Ok(applied)
}

/// Interprets an override value the way it would read if written in the file.
fn parse_scalar(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::String(raw.to_string());
    }
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

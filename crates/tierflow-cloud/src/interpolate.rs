//! `${type.name.attribute}` reference handling in synthesized configs

use crate::error::{CloudError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static INTERPOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-z0-9_]+)\.([A-Za-z0-9_\-]+)\.([A-Za-z0-9_]+)\}")
        .expect("interpolation pattern is valid")
});

/// A reference found in a config value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interpolation {
    /// Referenced resource address (type.name)
    pub address: String,
    /// Referenced attribute
    pub attribute: String,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.address, self.attribute)
    }
}

/// All references contained in `value`, sorted and deduplicated
pub fn references(value: &Value) -> Vec<Interpolation> {
    let mut found = BTreeSet::new();
    collect(value, &mut found);
    found.into_iter().collect()
}

fn collect(value: &Value, found: &mut BTreeSet<Interpolation>) {
    match value {
        Value::String(s) => {
            for caps in INTERPOLATION.captures_iter(s) {
                found.insert(Interpolation {
                    address: format!("{}.{}", &caps[1], &caps[2]),
                    attribute: caps[3].to_string(),
                });
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect(v, found)),
        _ => {}
    }
}

/// Replace every reference in `value` using `lookup`
///
/// A string that is exactly one reference takes the referenced value with
/// its JSON type. References embedded in longer strings are substituted as
/// text. `resource` names the owner of `value` for error reporting.
pub fn resolve<F>(resource: &str, value: &Value, lookup: &F) -> Result<Value>
where
    F: Fn(&str, &str) -> Option<Value>,
{
    match value {
        Value::String(s) => resolve_string(resource, s, lookup),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(resource, v, lookup))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve(resource, v, lookup)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string<F>(resource: &str, s: &str, lookup: &F) -> Result<Value>
where
    F: Fn(&str, &str) -> Option<Value>,
{
    let mut out = String::with_capacity(s.len());
    let mut last = 0;

    for caps in INTERPOLATION.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let address = format!("{}.{}", &caps[1], &caps[2]);
        let value = lookup(&address, &caps[3]).ok_or_else(|| CloudError::Dependency {
            resource: resource.to_string(),
            reference: format!("{}.{}", address, &caps[3]),
        })?;

        if whole.start() == 0 && whole.end() == s.len() {
            return Ok(value);
        }

        out.push_str(&s[last..whole.start()]);
        match value {
            Value::String(text) => out.push_str(&text),
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }

    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

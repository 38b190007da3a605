//! Config loading: builds the `config` half of a [`Context`] from the
//! process environment, with explicit `--config KEY=VALUE` CLI overrides
//! layered on top so that explicit overrides always beat environment
//! defaults.

use serde_json::Value;
use std::collections::HashMap;

/// Values are parsed as JSON when possible (so `--config count=3` yields a
/// number), falling back to a raw string otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Load config from the environment, then apply `overrides` (already parsed
/// `KEY=VALUE` pairs) on top.
pub fn load_config(overrides: impl IntoIterator<Item = (String, Value)>) -> HashMap<String, Value> {
    let mut config: HashMap<String, Value> = std::env::vars()
        .map(|(k, v)| (k, parse_value(&v)))
        .collect();

    for (key, value) in overrides {
        config.insert(key, value);
    }

    config
}

/// Parse a single `KEY=VALUE` CLI argument.
pub fn parse_key_value(entry: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{entry}'"))?;
    if key.is_empty() {
        anyhow::bail!("empty key in '{entry}'");
    }
    Ok((key.to_string(), parse_value(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_value_prefers_json() {
        assert_eq!(parse_value("3"), json!(3));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("plain"), json!("plain"));
    }

    #[test]
    fn parse_key_value_splits_on_first_equals() {
        let (k, v) = parse_key_value("url=http://x=y").unwrap();
        assert_eq!(k, "url");
        assert_eq!(v, json!("http://x=y"));
    }

    #[test]
    fn parse_key_value_rejects_missing_separator() {
        assert!(parse_key_value("no-separator").is_err());
    }
}

//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PARLEY_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ParleySettings;

/// Resolve the default settings file path (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_overrides_from<F>(settings: &mut ParleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16_in("PARLEY_PORT", 0, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64_in("PARLEY_PONG_WAIT_SECS", 1, 3600) {
        settings.session.pong_wait_secs = v;
    }
    if let Some(v) = env.u64_in("PARLEY_WRITE_WAIT_SECS", 1, 600) {
        settings.session.write_wait_secs = v;
    }
    if let Some(v) = env.usize_in("PARLEY_MAX_MESSAGE_SIZE", 64, 16 * 1024 * 1024) {
        settings.session.max_message_size = v;
    }
    if let Some(v) = env.usize_in("PARLEY_SEND_QUEUE", 1, 65_536) {
        settings.session.send_queue_capacity = v;
    }
    if let Some(v) = env.string("PARLEY_REDIS_URL") {
        settings.backplane.redis_url = Some(v);
    }
    if let Some(v) = env.bool("PARLEY_HISTORY_ENABLED") {
        settings.backplane.history_enabled = v;
    }
    if let Some(v) = env.usize_in("PARLEY_HISTORY_LIMIT", 1, 10_000) {
        settings.backplane.history_limit = v;
    }
    if let Some(v) = env.bool("PARLEY_FANOUT_ENABLED") {
        settings.backplane.fanout_enabled = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer and keep it only when it lies in `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let parsed = parse_bool(&val);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        parsed
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = (self.lookup)(name)?;
        let parsed = parse_in_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        parsed
    }

    fn u16_in(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.ranged(name, min, max)
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.ranged(name, min, max)
    }

    fn usize_in(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.ranged(name, min, max)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"session": {"pongWaitSecs": 60, "writeWaitSecs": 10}});
        let source = serde_json::json!({"session": {"pongWaitSecs": 20}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["session"]["pongWaitSecs"], 20);
        assert_eq!(merged["session"]["writeWaitSecs"], 10);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let settings = read_settings_file(Path::new("/nonexistent/parley.json")).unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.backplane.history_limit, 50);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 8088}, "backplane": {"redisUrl": "redis://cache:6379"}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.server.port, 8088);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(
            settings.backplane.redis_url.as_deref(),
            Some("redis://cache:6379")
        );
        assert!(settings.backplane.fanout_enabled);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_settings_file(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"writeWaitSecs": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = ParleySettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("PARLEY_HOST", "127.0.0.1"),
                ("PARLEY_PORT", "9000"),
                ("PARLEY_PONG_WAIT_SECS", "20"),
                ("PARLEY_REDIS_URL", "redis://localhost:6379"),
                ("PARLEY_HISTORY_ENABLED", "off"),
                ("PARLEY_HISTORY_LIMIT", "10"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.session.pong_wait_secs, 20);
        assert_eq!(
            settings.backplane.redis_url.as_deref(),
            Some("redis://localhost:6379")
        );
        assert!(!settings.backplane.history_enabled);
        assert_eq!(settings.backplane.history_limit, 10);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = ParleySettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("PARLEY_PORT", "not-a-port"),
                ("PARLEY_PONG_WAIT_SECS", "0"),
                ("PARLEY_FANOUT_ENABLED", "maybe"),
                ("PARLEY_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.session.pong_wait_secs, 60);
        assert!(settings.backplane.fanout_enabled);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range::<u64>("60", 1, 3600), Some(60));
        assert_eq!(parse_in_range::<u64>("0", 1, 3600), None);
        assert_eq!(parse_in_range::<u16>("70000", 0, u16::MAX), None);
        assert_eq!(parse_in_range::<usize>(" 12 ", 1, 100), Some(12));
        assert_eq!(parse_in_range::<usize>("abc", 1, 100), None);
    }
}

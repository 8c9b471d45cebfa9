use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// Lua heap limit per sandbox: 16 MB.
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Time budget for one entry into bundle code (evaluation, render, effect).
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 2_000;

/// Module part of mock entity names: datasource `ds` becomes entity `Preview.ds`.
pub const DEFAULT_ENTITY_MODULE: &str = "Preview";

/// Record field used as natural identity when every record carries it.
pub const DEFAULT_IDENTITY_KEY: &str = "id";

/// Upper bound on renders triggered by one update (hook state, data mutations).
pub const DEFAULT_MAX_RERENDERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub memory_limit_bytes: usize,
    pub script_timeout_ms: u64,
    pub entity_module: String,
    /// `None` disables natural-key identity; guids then always follow array index.
    pub identity_key: Option<String>,
    pub max_rerenders: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            entity_module: DEFAULT_ENTITY_MODULE.to_string(),
            identity_key: Some(DEFAULT_IDENTITY_KEY.to_string()),
            max_rerenders: DEFAULT_MAX_RERENDERS,
        }
    }
}

impl SandboxConfig {
    /// Defaults overridden by `WIDGET_SANDBOX_*` environment variables.
    pub fn from_env() -> Result<Self, SandboxError> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("WIDGET_SANDBOX_MEMORY_LIMIT") {
            config.memory_limit_bytes = parse_env("WIDGET_SANDBOX_MEMORY_LIMIT", &v)?;
        }
        if let Ok(v) = std::env::var("WIDGET_SANDBOX_TIMEOUT_MS") {
            config.script_timeout_ms = parse_env("WIDGET_SANDBOX_TIMEOUT_MS", &v)?;
        }
        if let Ok(v) = std::env::var("WIDGET_SANDBOX_ENTITY_MODULE") {
            config.entity_module = v;
        }
        if let Ok(v) = std::env::var("WIDGET_SANDBOX_IDENTITY_KEY") {
            config.identity_key = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = std::env::var("WIDGET_SANDBOX_MAX_RERENDERS") {
            config.max_rerenders = parse_env("WIDGET_SANDBOX_MAX_RERENDERS", &v)?;
        }
        Ok(config)
    }

    /// Parse a YAML config file; missing fields keep their defaults.
    pub fn from_yaml(text: &str) -> Result<Self, SandboxError> {
        serde_yaml::from_str(text).map_err(|e| SandboxError::Config(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SandboxError> {
    value
        .trim()
        .parse()
        .map_err(|_| SandboxError::Config(format!("{} has invalid value '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_keeps_defaults_for_missing_fields() {
        let config = SandboxConfig::from_yaml("script_timeout_ms: 500\nidentity_key: null\n").unwrap();
        assert_eq!(config.script_timeout_ms, 500);
        assert_eq!(config.identity_key, None);
        assert_eq!(config.memory_limit_bytes, DEFAULT_MEMORY_LIMIT_BYTES);
        assert_eq!(config.entity_module, "Preview");
    }

    #[test]
    fn test_invalid_yaml_is_a_config_error() {
        assert!(matches!(
            SandboxConfig::from_yaml("max_rerenders: many"),
            Err(SandboxError::Config(_))
        ));
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        assert_eq!(parse_env::<u64>("X", " 42 ").unwrap(), 42);
        assert!(parse_env::<u64>("X", "soon").is_err());
    }
}

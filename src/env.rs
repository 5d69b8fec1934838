//! Environment variable names used to configure the sanitizer from a
//! service's environment.
//!
//! These are helpers only; [`RecordSanitizer`](crate::formatter::RecordSanitizer)
//! never reads the environment itself.

use crate::error::ConfigError;
use crate::init::{FormatterConfig, LayerConfig};
use std::collections::BTreeMap;
use tracing::Level;

/// strftime pattern for `asctime`; setting it also enables `asctime`.
pub const LOG_SANITIZER_DATEFMT_ENV: &str = "LOG_SANITIZER_DATEFMT";

/// JSON object of namespace to field list, e.g. `{"record": ["tenant"]}`.
pub const LOG_SANITIZER_WHITELISTS_ENV: &str = "LOG_SANITIZER_WHITELISTS";

/// `1`/`true`/`yes` to replace the built-in lists instead of extending them.
pub const LOG_SANITIZER_REPLACE_ENV: &str = "LOG_SANITIZER_REPLACE";

/// Least severe level the layer formats (`error`, `warn`, `info`, ...).
pub const LOG_SANITIZER_MIN_LEVEL_ENV: &str = "LOG_SANITIZER_MIN_LEVEL";

/// [`LayerConfig`] from the process environment.
pub fn layer_config_from_env() -> Result<LayerConfig, ConfigError> {
    layer_config_from_lookup(|key| std::env::var(key).ok())
}

impl FormatterConfig {
    /// [`FormatterConfig`] from the `LOG_SANITIZER_*` process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        formatter_config_from_lookup(|key| std::env::var(key).ok())
    }
}

/// [`LayerConfig`] from an arbitrary variable lookup.
pub fn layer_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<LayerConfig, ConfigError> {
    let mut config = LayerConfig {
        formatter: formatter_config_from_lookup(&lookup)?,
        ..LayerConfig::default()
    };
    if let Some(level) = lookup(LOG_SANITIZER_MIN_LEVEL_ENV) {
        config.min_level = level.trim().parse::<Level>().map_err(|e| ConfigError::InvalidEnv {
            var: LOG_SANITIZER_MIN_LEVEL_ENV,
            reason: e.to_string(),
        })?;
    }
    Ok(config)
}

/// [`FormatterConfig`] from an arbitrary variable lookup.
pub fn formatter_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<FormatterConfig, ConfigError> {
    let mut config = FormatterConfig::default();

    if let Some(datefmt) = lookup(LOG_SANITIZER_DATEFMT_ENV).filter(|v| !v.is_empty()) {
        config.datefmt = Some(datefmt);
        config.use_time = true;
    }

    if let Some(raw) = lookup(LOG_SANITIZER_WHITELISTS_ENV).filter(|v| !v.trim().is_empty()) {
        let whitelists: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw).map_err(|e| {
            ConfigError::InvalidEnv { var: LOG_SANITIZER_WHITELISTS_ENV, reason: e.to_string() }
        })?;
        config.whitelists = Some(whitelists);
    }

    if let Some(raw) = lookup(LOG_SANITIZER_REPLACE_ENV) {
        config.replace = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "" | "0" | "false" | "no" => false,
            other => {
                return Err(ConfigError::InvalidEnv {
                    var: LOG_SANITIZER_REPLACE_ENV,
                    reason: format!("expected a boolean, got `{}`", other),
                })
            }
        };
    }

    Ok(config)
}

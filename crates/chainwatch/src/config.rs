#![forbid(unsafe_code)]

//! Chain tree configuration.
//!
//! Environment variables:
//! - `CHAINWATCH_NOTIFY_ON_TARGET_CHANGE` (bool)
//! - `CHAINWATCH_MAX_REENTRANT_ROUNDS` (positive integer)

use std::env;

use thiserror::Error;

pub const ENV_NOTIFY_ON_TARGET_CHANGE: &str = "CHAINWATCH_NOTIFY_ON_TARGET_CHANGE";
pub const ENV_MAX_REENTRANT_ROUNDS: &str = "CHAINWATCH_MAX_REENTRANT_ROUNDS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTreeConfig {
    /// Evaluate every registered chain when the root target is swapped.
    pub notify_on_target_change: bool,
    /// Upper bound on updates processed in one drain of the notification
    /// queue. Listeners that keep mutating the observed graph would otherwise
    /// never let the drain finish.
    pub max_reentrant_rounds: usize,
}

impl Default for ChainTreeConfig {
    fn default() -> Self {
        Self {
            notify_on_target_change: true,
            max_reentrant_rounds: 1_024,
        }
    }
}

/// Configuration parse diagnostics (env + validation).
#[derive(Debug, Clone)]
pub struct ConfigParse {
    pub config: ChainTreeConfig,
    pub errors: Vec<ConfigError>,
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}={value} ({message})")]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl ChainTreeConfig {
    #[must_use]
    pub fn with_notify_on_target_change(mut self, enabled: bool) -> Self {
        self.notify_on_target_change = enabled;
        self
    }

    #[must_use]
    pub fn with_max_reentrant_rounds(mut self, rounds: usize) -> Self {
        self.max_reentrant_rounds = rounds;
        self
    }

    /// Parse config from environment variables, ignoring invalid entries.
    #[must_use]
    pub fn from_env() -> ChainTreeConfig {
        Self::from_env_with_diagnostics().config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.max_reentrant_rounds == 0 {
            errors.push(ConfigError::new(
                "max_reentrant_rounds",
                "0",
                "must be >= 1",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Build a config from an arbitrary key lookup. Invalid values keep the
/// default and are reported in [`ConfigParse::errors`].
pub fn from_env_with<F>(mut get: F) -> ConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = ChainTreeConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_NOTIFY_ON_TARGET_CHANGE) {
        match parse_bool(&value) {
            Some(parsed) => config.notify_on_target_change = parsed,
            None => errors.push(ConfigError::new(
                "notify_on_target_change",
                value,
                "expected bool (1/0/true/false/yes/no/on/off)",
            )),
        }
    }

    if let Some(value) = get(ENV_MAX_REENTRANT_ROUNDS) {
        match parse_usize(&value) {
            Some(parsed) if parsed > 0 => config.max_reentrant_rounds = parsed,
            _ => errors.push(ConfigError::new(
                "max_reentrant_rounds",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Err(mut invalid) = config.validate() {
        errors.append(&mut invalid);
    }

    ConfigParse { config, errors }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(pairs: &[(&str, &str)]) -> ConfigParse {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        from_env_with(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = ChainTreeConfig::default();
        assert!(config.notify_on_target_change);
        assert_eq!(config.max_reentrant_rounds, 1_024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let parsed = parse(&[
            (ENV_NOTIFY_ON_TARGET_CHANGE, "off"),
            (ENV_MAX_REENTRANT_ROUNDS, "8"),
        ]);
        assert!(parsed.errors.is_empty());
        assert!(!parsed.config.notify_on_target_change);
        assert_eq!(parsed.config.max_reentrant_rounds, 8);
    }

    #[test]
    fn invalid_values_are_reported() {
        let parsed = parse(&[
            (ENV_NOTIFY_ON_TARGET_CHANGE, "maybe"),
            (ENV_MAX_REENTRANT_ROUNDS, "0"),
        ]);
        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.config, ChainTreeConfig::default());
        assert_eq!(parsed.errors[0].field, "notify_on_target_change");
        assert!(parsed.errors[1].to_string().starts_with("max_reentrant_rounds=0"));
    }

    #[test]
    fn zero_rounds_fails_validation() {
        let config = ChainTreeConfig::default().with_max_reentrant_rounds(0);
        assert_eq!(config.validate().unwrap_err().len(), 1);
    }
}

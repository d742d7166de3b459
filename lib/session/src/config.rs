//! Session layer configuration.
//!
//! Fields with defaults can be omitted when loading from environment variables
//! or configuration files.

use serde::{Deserialize, Serialize};

/// Tuning for the auth state machine and the deferred-action envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Coalescing window for raw identity-provider events, in milliseconds.
    /// Default: 100
    #[serde(default = "default_debounce_window_ms")]
    debounce_window_ms: u64,
    /// How long a captured deferred action stays resumable, in seconds.
    /// Default: 300
    #[serde(default = "default_deferred_expiry_seconds")]
    deferred_expiry_seconds: i64,
    /// Durable storage key holding the pending deferred action.
    /// Default: "pendingAction"
    #[serde(default = "default_deferred_storage_key")]
    deferred_storage_key: String,
}

fn default_debounce_window_ms() -> u64 {
    100
}

fn default_deferred_expiry_seconds() -> i64 {
    300
}

fn default_deferred_storage_key() -> String {
    "pendingAction".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: default_debounce_window_ms(),
            deferred_expiry_seconds: default_deferred_expiry_seconds(),
            deferred_storage_key: default_deferred_storage_key(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration builder starting from the defaults.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Returns the debounce window.
    #[must_use]
    pub fn debounce_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_window_ms)
    }

    /// Returns the deferred-action expiry window.
    #[must_use]
    pub fn deferred_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.deferred_expiry_seconds)
    }

    /// Returns the storage key for the pending deferred action.
    #[must_use]
    pub fn deferred_storage_key(&self) -> &str {
        &self.deferred_storage_key
    }
}

/// Builder for `SessionConfig`.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Sets the debounce window.
    #[must_use]
    pub fn debounce_window(mut self, window: std::time::Duration) -> Self {
        self.config.debounce_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the deferred-action expiry window. Negative windows clamp to zero.
    #[must_use]
    pub fn deferred_expiry(mut self, expiry: chrono::Duration) -> Self {
        self.config.deferred_expiry_seconds = expiry.num_seconds().max(0);
        self
    }

    /// Sets the storage key for the pending deferred action.
    #[must_use]
    pub fn deferred_storage_key(mut self, key: impl Into<String>) -> Self {
        self.config.deferred_storage_key = key.into();
        self
    }

    /// Builds the `SessionConfig`.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behavior() {
        let config = SessionConfig::default();
        assert_eq!(config.debounce_window(), std::time::Duration::from_millis(100));
        assert_eq!(config.deferred_expiry(), chrono::Duration::minutes(5));
        assert_eq!(config.deferred_storage_key(), "pendingAction");
    }

    #[test]
    fn builder_allows_customization() {
        let config = SessionConfig::builder()
            .debounce_window(std::time::Duration::from_millis(250))
            .deferred_expiry(chrono::Duration::minutes(10))
            .deferred_storage_key("workincz.pending")
            .build();

        assert_eq!(config.debounce_window(), std::time::Duration::from_millis(250));
        assert_eq!(config.deferred_expiry(), chrono::Duration::minutes(10));
        assert_eq!(config.deferred_storage_key(), "workincz.pending");
    }

    #[test]
    fn negative_expiry_clamps_to_zero() {
        let config = SessionConfig::builder()
            .deferred_expiry(chrono::Duration::seconds(-30))
            .build();
        assert_eq!(config.deferred_expiry(), chrono::Duration::zero());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"debounce_window_ms": 50}"#).expect("deserialize");

        assert_eq!(config.debounce_window(), std::time::Duration::from_millis(50));
        assert_eq!(config.deferred_expiry(), chrono::Duration::minutes(5));
        assert_eq!(config.deferred_storage_key(), "pendingAction");
    }
}

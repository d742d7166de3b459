//! Console configuration.
//!
//! Loaded via the `config` crate from `WORKINCZ__`-prefixed environment
//! variables, e.g. `WORKINCZ__STORAGE_DIR` or
//! `WORKINCZ__SESSION__DEBOUNCE_WINDOW_MS`.
//!
//! See [`SessionConfig`] for the session-layer settings.

use serde::Deserialize;
use std::path::PathBuf;
use workincz_session::SessionConfig;

/// Console configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Directory used as durable client storage.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".workincz")
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            session: SessionConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(
            config::Environment::with_prefix("WORKINCZ")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

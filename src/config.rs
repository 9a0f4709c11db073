//! Configuration loading
//!
//! Settings come from three layers, lowest to highest precedence: built-in
//! defaults, an optional `greenroom.toml` (or the file named by
//! `GREENROOM_CONFIG_PATH`), and `GREENROOM_*` environment variables. A
//! `.env` file is honored if present.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dump the full canonical store at debug level after every rebind pass.
    pub verbose_variables: bool,

    /// Buffered capacity of the scene-loaded event channel. Slow subscribers
    /// past this depth see a lag notice instead of the missed events.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose_variables: false,
            event_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from the default search path.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Start building a configuration with explicit overrides.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    fn load_from(path_override: Option<PathBuf>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path_override.or_else(|| {
            std::env::var("GREENROOM_CONFIG_PATH")
                .ok()
                .map(PathBuf::from)
        });

        let mut builder = config::Config::builder();

        builder = match path {
            // An explicitly named file must exist; the default one need not.
            Some(path) => builder.add_source(config::File::from(path.as_path())),
            None => builder.add_source(config::File::with_name("greenroom").required(false)),
        };

        let settings = builder
            .add_source(config::Environment::with_prefix("GREENROOM").try_parsing(true))
            .build()
            .context("Failed to load configuration")?;

        // Missing keys fall back to Default via serde(default)
        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}

/// Builder for a [`Config`] with caller-supplied overrides
///
/// `None` slots fall through to the file/env/default layering.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    verbose_variables: Option<bool>,
    event_capacity: Option<usize>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn verbose_variables(mut self, verbose: Option<bool>) -> Self {
        self.verbose_variables = verbose;
        self
    }

    pub fn event_capacity(mut self, capacity: Option<usize>) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<Config> {
        let mut config = Config::load_from(self.config_path)?;

        if let Some(verbose) = self.verbose_variables {
            config.verbose_variables = verbose;
        }
        if let Some(capacity) = self.event_capacity {
            config.event_capacity = capacity;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.verbose_variables);
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("greenroom-{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "verbose_variables = true\nevent_capacity = 8\n").unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(config.verbose_variables);
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_builder_overrides_win_over_file() {
        let path = std::env::temp_dir().join(format!("greenroom-{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "verbose_variables = false\n").unwrap();

        let config = Config::builder()
            .config_path(Some(path.clone()))
            .verbose_variables(Some(true))
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert!(config.verbose_variables);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("greenroom-absent-{}.toml", Uuid::new_v4()));
        assert!(Config::load_from(Some(path)).is_err());
    }
}

use super::types::ProbeConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};

/// Prefix of environment overrides, e.g. `SERVING_PROBE__CANARY__TOLERANCE`
pub const ENV_PREFIX: &str = "SERVING_PROBE";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
        }
    }

    /// Load configuration from file (TOML, YAML or JSON by extension)
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<ProbeConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&ProbeConfig::default())?);

        if let Some(config_path) = &self.config_file {
            // An explicit file must exist
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            // Try to load from standard locations
            builder = builder
                .add_source(File::with_name("serving-probe").required(false))
                .add_source(File::with_name("config/serving-probe").required(false));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: ProbeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

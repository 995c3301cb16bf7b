//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate, later sources
//! winning:
//!
//! 1. built-in defaults (environment from `DUALWRITE_ENV`)
//! 2. an optional TOML file
//! 3. environment variables such as `DUALWRITE__QUEUE__DRAIN_CONCURRENCY=4`
//!    or `DUALWRITE__SCHEMAS__ACCOUNTS__SECONDARY=false`
//!
//! The merged result is deserialized into [`DualWriteConfig`] and validated.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::ConfigResult;
use super::DualWriteConfig;
use crate::constants::{current_environment, CONFIG_ENV_PREFIX};

/// Builder-style loader for [`DualWriteConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    environment: String,
    file: Option<PathBuf>,
    inline_toml: Option<String>,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            environment: current_environment(),
            file: None,
            inline_toml: None,
            env_prefix: Some(CONFIG_ENV_PREFIX.to_string()),
        }
    }

    /// Read a TOML file; it must exist
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Layer TOML text after the file
    pub fn with_toml(mut self, toml: impl Into<String>) -> Self {
        self.inline_toml = Some(toml.into());
        self
    }

    /// Default environment when neither the file nor the variables set one
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Variable prefix; tests use a unique one to stay isolated
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    pub fn load(&self) -> ConfigResult<DualWriteConfig> {
        let mut builder = Config::builder().set_default("environment", self.environment.clone())?;

        if let Some(path) = &self.file {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(true));
        }

        if let Some(toml) = &self.inline_toml {
            builder = builder.add_source(File::from_str(toml, FileFormat::Toml));
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: DualWriteConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %config.environment,
            schemas = config.schemas.len(),
            queue = config.queue.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

//! # Configuration
//!
//! Typed configuration for schemas and the write queue. A [`DualWriteConfig`]
//! is normally produced by [`ConfigLoader`] from a TOML file layered with
//! `DUALWRITE__*` environment variables, but every struct can also be built in
//! code.
//!
//! ```toml
//! environment = "production"
//!
//! [queue]
//! transition_topic = "dualwrite-metadata"
//! drain_concurrency = 4
//!
//! [queue.transport]
//! provider = "postgres"
//! database_url = "postgresql://localhost/dualwrite"
//!
//! [schemas.accounts]
//! primary = "cassandra"
//! secondary = "postgres"
//! hide_error_trace = true
//! ```

pub mod error;
pub mod loader;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::{current_environment, DEFAULT_DRAIN_CONCURRENCY, DEFAULT_TRANSITION_TOPIC};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualWriteConfig {
    /// Deployment environment; part of every default queue key
    #[serde(default = "current_environment")]
    pub environment: String,

    /// Write queue settings; absent means no schema gets a queue
    #[serde(default)]
    pub queue: Option<QueueConfig>,

    #[serde(default)]
    pub schemas: HashMap<String, SchemaConfig>,
}

impl Default for DualWriteConfig {
    fn default() -> Self {
        Self {
            environment: current_environment(),
            queue: None,
            schemas: HashMap::new(),
        }
    }
}

impl DualWriteConfig {
    pub fn schema(&self, name: &str) -> ConfigResult<&SchemaConfig> {
        self.schemas
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownSchema {
                schema: name.to_string(),
            })
    }

    /// Checks that do not need the backend registry
    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "environment",
                &self.environment,
                "must not be empty",
            ));
        }

        if let Some(queue) = &self.queue {
            queue.validate()?;
        }

        for (name, schema) in &self.schemas {
            schema.validate(name)?;
        }

        Ok(())
    }
}

/// Per-schema settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub primary: Option<String>,

    /// Secondary backend name; `false`, empty or missing disables mirroring
    #[serde(default, deserialize_with = "deserialize_secondary")]
    pub secondary: Option<String>,

    /// Log secondary failures by their display form instead of the full chain
    #[serde(default)]
    pub hide_error_trace: bool,

    /// Overrides `dualwrite-<schema>-<environment>`
    #[serde(default)]
    pub queue_key: Option<String>,
}

impl SchemaConfig {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: Some(primary.into()),
            ..Self::default()
        }
    }

    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn with_hide_error_trace(mut self, hide: bool) -> Self {
        self.hide_error_trace = hide;
        self
    }

    pub fn with_queue_key(mut self, queue_key: impl Into<String>) -> Self {
        self.queue_key = Some(queue_key.into());
        self
    }

    pub fn validate(&self, schema: &str) -> ConfigResult<()> {
        let primary = match self.primary.as_deref() {
            Some(primary) if !primary.trim().is_empty() => primary,
            _ => return Err(ConfigurationError::missing_primary(schema)),
        };

        if self.secondary.as_deref() == Some(primary) {
            return Err(ConfigurationError::primary_equals_secondary(schema, primary));
        }

        if matches!(self.queue_key.as_deref(), Some(key) if key.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                format!("schemas.{schema}.queue_key"),
                "",
                "must not be empty",
            ));
        }

        Ok(())
    }
}

/// Write queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default = "default_transition_topic")]
    pub transition_topic: String,

    /// Replays allowed in flight at once while draining
    #[serde(default = "default_drain_concurrency")]
    pub drain_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            transition_topic: default_transition_topic(),
            drain_concurrency: default_drain_concurrency(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.transition_topic.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "queue.transition_topic",
                &self.transition_topic,
                "must not be empty",
            ));
        }

        if self.drain_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.drain_concurrency",
                "0",
                "must be at least 1",
            ));
        }

        if let TransportConfig::Postgres {
            database_url,
            max_connections,
        } = &self.transport
        {
            if database_url.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "queue.transport.database_url",
                    database_url,
                    "must not be empty",
                ));
            }
            if *max_connections == 0 {
                return Err(ConfigurationError::invalid_value(
                    "queue.transport.max_connections",
                    "0",
                    "must be at least 1",
                ));
            }
        }

        Ok(())
    }
}

/// Broker backing the write queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Process-local broker; transitions only reach this process
    #[default]
    InMemory,
    Postgres {
        database_url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_transition_topic() -> String {
    DEFAULT_TRANSITION_TOPIC.to_string()
}

fn default_drain_concurrency() -> usize {
    DEFAULT_DRAIN_CONCURRENCY
}

fn default_max_connections() -> u32 {
    5
}

/// Accepts a backend name, `false`, or nothing
fn deserialize_secondary<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(name)) => {
            let name = name.trim();
            if name.is_empty() || name.eq_ignore_ascii_case("false") {
                Ok(None)
            } else {
                Ok(Some(name.to_string()))
            }
        }
        Some(other) => Err(serde::de::Error::custom(format!(
            "secondary must be a backend name or false, got {other}"
        ))),
    }
}

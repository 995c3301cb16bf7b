//! # System Constants
//!
//! Names and defaults shared by the proxy, the write queue and the configuration
//! layer. Keeping them in one place keeps every instance that shares a schema
//! name agreeing on the same queue keys and transition topic.

/// Prefix carried by every message written to the schema logger
pub const LOG_PREFIX: &str = "[dualwrite]";

/// Default pub/sub topic used to broadcast queue-state transitions
pub const DEFAULT_TRANSITION_TOPIC: &str = "dualwrite-metadata";

/// Environment variable naming the deployment environment
pub const ENVIRONMENT_VAR: &str = "DUALWRITE_ENV";

/// Environment used when [`ENVIRONMENT_VAR`] is unset
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Prefix for environment variable overrides read by the config loader
pub const CONFIG_ENV_PREFIX: &str = "DUALWRITE";

/// Default number of replays kept in flight while draining a schema queue
pub const DEFAULT_DRAIN_CONCURRENCY: usize = 1;

/// Capacity of the per-topic broadcast channel in the in-memory broker
pub const IN_MEMORY_TOPIC_CAPACITY: usize = 256;

/// Table backing the PostgreSQL list queue
pub const PG_QUEUE_TABLE: &str = "dualwrite_queue";

/// Resolve the current deployment environment
pub fn current_environment() -> String {
    std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
}

/// Default broker list key for a schema: `dualwrite-<schema>-<environment>`
pub fn default_queue_key(schema: &str, environment: &str) -> String {
    format!("dualwrite-{schema}-{environment}")
}

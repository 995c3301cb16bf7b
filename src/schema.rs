//! # Schema Composition
//!
//! A schema binds a name to a primary backend, an optional secondary backend,
//! a logger and optionally a write queue. [`SchemaBuilder`] collects backends
//! during setup, validates the composition once, and produces a
//! [`DispatchProxy`]. After `build` the composition is immutable and shared
//! through [`SchemaContext`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::backend::{Backend, BackendRegistry};
use crate::config::{ConfigResult, ConfigurationError, DualWriteConfig, SchemaConfig};
use crate::constants::{current_environment, default_queue_key};
use crate::logging::{Logger, NoopLogger};
use crate::proxy::DispatchProxy;
use crate::queue::{QueuePolicy, WriteQueueManager};

/// Frozen composition of one schema
pub struct SchemaContext {
    name: String,
    primary: String,
    primary_backend: Arc<dyn Backend>,
    secondary: Option<(String, Arc<dyn Backend>)>,
    registry: BackendRegistry,
    policies: HashMap<String, QueuePolicy>,
    logger: Arc<dyn Logger>,
    hide_error_trace: bool,
}

impl SchemaContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    pub fn primary_backend(&self) -> &Arc<dyn Backend> {
        &self.primary_backend
    }

    pub fn secondary_name(&self) -> Option<&str> {
        self.secondary.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn secondary_backend(&self) -> Option<&Arc<dyn Backend>> {
        self.secondary.as_ref().map(|(_, backend)| backend)
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn hide_error_trace(&self) -> bool {
        self.hide_error_trace
    }

    /// Whether queuing mode buffers `operation` for `backend`
    pub fn buffers(&self, backend: &str, operation: &str) -> bool {
        self.policies
            .get(backend)
            .map_or(true, |policy| policy.buffers(operation))
    }

    /// Rendered form of a secondary-path error for the logger
    pub fn error_detail(&self, err: &anyhow::Error) -> String {
        if self.hide_error_trace {
            err.to_string()
        } else {
            format!("{err:?}")
        }
    }

    /// Backend a buffered record named `model` replays against
    ///
    /// The primary is never a replay target.
    pub(crate) fn replay_target(&self, model: &str) -> Option<&Arc<dyn Backend>> {
        if model == self.primary {
            return None;
        }
        self.registry.get(model)
    }
}

impl fmt::Debug for SchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaContext")
            .field("name", &self.name)
            .field("primary", &self.primary)
            .field("secondary", &self.secondary_name())
            .field("registry", &self.registry)
            .field("hide_error_trace", &self.hide_error_trace)
            .finish()
    }
}

/// Setup-time builder for a schema
///
/// # Example
///
/// ```rust
/// use dualwrite::backend::FnBackend;
/// use dualwrite::config::SchemaConfig;
/// use dualwrite::schema::SchemaBuilder;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let proxy = SchemaBuilder::new("accounts")
///     .backend("a", FnBackend::builder().operation("update", |_| async { Ok(json!("a updated")) }).build())
///     .backend("b", FnBackend::builder().operation("update", |_| async { Ok(json!("b updated")) }).build())
///     .build(&SchemaConfig::new("a").with_secondary("b"))?;
///
/// assert_eq!(proxy.call("update", vec![]).await?, json!("a updated"));
/// # Ok(())
/// # }
/// ```
pub struct SchemaBuilder {
    name: String,
    registry: BackendRegistry,
    policies: HashMap<String, QueuePolicy>,
    logger: Arc<dyn Logger>,
    queue: Option<Arc<WriteQueueManager>>,
    environment: Option<String>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: BackendRegistry::new(),
            policies: HashMap::new(),
            logger: Arc::new(NoopLogger),
            queue: None,
            environment: None,
        }
    }

    /// Register a backend under `name`; a repeated name replaces the earlier one
    pub fn backend(self, name: impl Into<String>, backend: impl Backend) -> Self {
        self.shared_backend(name, Arc::new(backend))
    }

    pub fn shared_backend(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.registry.register(name, backend);
        self
    }

    /// Limit which operations on `backend` are buffered while queuing
    pub fn queue_policy(mut self, backend: impl Into<String>, policy: QueuePolicy) -> Self {
        self.policies.insert(backend.into(), policy);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn write_queue(mut self, manager: Arc<WriteQueueManager>) -> Self {
        self.queue = Some(manager);
        self
    }

    /// Environment used for the default queue key; `DUALWRITE_ENV` otherwise
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Build using this schema's entry of a loaded configuration
    pub fn build_from(self, config: &DualWriteConfig) -> ConfigResult<DispatchProxy> {
        let schema = config.schema(&self.name)?.clone();
        let builder = if self.environment.is_some() {
            self
        } else {
            self.environment(config.environment.clone())
        };
        builder.build(&schema)
    }

    pub fn build(self, config: &SchemaConfig) -> ConfigResult<DispatchProxy> {
        config.validate(&self.name)?;

        let primary = config
            .primary
            .clone()
            .ok_or_else(|| ConfigurationError::missing_primary(&self.name))?;
        let primary_backend = self
            .registry
            .get(&primary)
            .cloned()
            .ok_or_else(|| ConfigurationError::unknown_primary(&self.name, &primary))?;

        let secondary = match config.secondary.as_deref() {
            None => None,
            Some(name) => {
                let backend = self
                    .registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigurationError::unknown_secondary(&self.name, name))?;
                Some((name.to_string(), backend))
            }
        };

        let context = Arc::new(SchemaContext {
            name: self.name,
            primary,
            primary_backend,
            secondary,
            registry: self.registry,
            policies: self.policies,
            logger: self.logger,
            hide_error_trace: config.hide_error_trace,
        });

        let queue = self.queue.map(|manager| {
            let environment = self.environment.unwrap_or_else(current_environment);
            let queue_key = config
                .queue_key
                .clone()
                .unwrap_or_else(|| default_queue_key(context.name(), &environment));
            manager.register_schema(Arc::clone(&context), queue_key)
        });

        info!(
            schema = %context.name(),
            primary = %context.primary_name(),
            secondary = context.secondary_name().unwrap_or("none"),
            queued = queue.is_some(),
            "Schema built"
        );

        Ok(DispatchProxy::new(context, queue))
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .field("queued", &self.queue.is_some())
            .finish()
    }
}

//! # Dispatch Proxy
//!
//! Stand-in for a schema's primary backend. Exposes exactly the operations the
//! primary declares; each call:
//!
//! 1. runs against the primary and settles with the primary's result or error,
//! 2. only if the primary succeeded and the secondary declares the same
//!    operation, mirrors the call to the secondary on a detached task (or
//!    buffers it while the schema is queuing).
//!
//! Secondary failures are logged, never returned.

pub mod mirror;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::Args;
use crate::error::{DispatchError, QueueError};
use crate::queue::{QueueMode, SchemaQueue};
use crate::schema::SchemaContext;

pub use mirror::MirrorOutcome;

pub(crate) struct Binding {
    context: Arc<SchemaContext>,
    queue: Option<Arc<SchemaQueue>>,
}

/// Result of a tracked dispatch
#[derive(Debug)]
pub struct Dispatched {
    /// The primary's result
    pub value: Value,
    /// Handle of the mirror task, if the call was mirrored
    pub mirror: Option<JoinHandle<MirrorOutcome>>,
}

impl Dispatched {
    /// Wait for the mirror task
    ///
    /// A panicking secondary shows up as [`MirrorOutcome::Failed`].
    pub async fn mirror_outcome(self) -> Option<MirrorOutcome> {
        let handle = self.mirror?;
        Some(match handle.await {
            Ok(outcome) => outcome,
            Err(err) => MirrorOutcome::Failed(format!("mirror task did not complete: {err}")),
        })
    }
}

/// Dispatch function bound to one primary operation
#[derive(Clone)]
pub struct DispatchFn {
    operation: Arc<str>,
    mirrors: bool,
    binding: Arc<Binding>,
}

impl DispatchFn {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Whether successful calls are mirrored to a secondary
    pub fn mirrors(&self) -> bool {
        self.mirrors
    }

    /// Call the primary; mirror to the secondary in the background on success
    pub async fn call(&self, args: Args) -> Result<Value, DispatchError> {
        self.call_tracked(args).await.map(|dispatched| dispatched.value)
    }

    /// Like [`DispatchFn::call`], also returning the mirror task handle
    pub async fn call_tracked(&self, args: Args) -> Result<Dispatched, DispatchError> {
        let context = &self.binding.context;
        let mirror_args = self.mirrors.then(|| args.clone());

        let value = context
            .primary_backend()
            .invoke(&self.operation, args)
            .await
            .map_err(|source| {
                debug!(
                    schema = %context.name(),
                    primary = %context.primary_name(),
                    operation = %self.operation,
                    "Primary call failed"
                );
                DispatchError::Primary {
                    schema: context.name().to_string(),
                    backend: context.primary_name().to_string(),
                    operation: self.operation.to_string(),
                    source,
                }
            })?;

        let mirror = mirror_args.and_then(|args| mirror::spawn(&self.binding, &self.operation, args));
        Ok(Dispatched { value, mirror })
    }
}

impl fmt::Debug for DispatchFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFn")
            .field("schema", &self.binding.context.name())
            .field("operation", &self.operation)
            .field("mirrors", &self.mirrors)
            .finish()
    }
}

/// Callable surface of a schema
#[derive(Clone)]
pub struct DispatchProxy {
    binding: Arc<Binding>,
    functions: BTreeMap<String, DispatchFn>,
}

impl DispatchProxy {
    pub(crate) fn new(context: Arc<SchemaContext>, queue: Option<Arc<SchemaQueue>>) -> Self {
        let binding = Arc::new(Binding { context, queue });
        let context = &binding.context;
        let secondary = context.secondary_backend();

        let functions: BTreeMap<String, DispatchFn> = context
            .primary_backend()
            .operations()
            .iter()
            .map(|operation| {
                let dispatch = DispatchFn {
                    operation: Arc::from(operation),
                    mirrors: secondary.is_some_and(|backend| backend.supports(operation)),
                    binding: Arc::clone(&binding),
                };
                (operation.to_string(), dispatch)
            })
            .collect();

        info!(
            schema = %context.name(),
            operations = functions.len(),
            mirrored = functions.values().filter(|f| f.mirrors).count(),
            "Dispatch proxy ready"
        );

        Self { binding, functions }
    }

    pub fn schema(&self) -> &str {
        self.binding.context.name()
    }

    pub fn context(&self) -> &SchemaContext {
        &self.binding.context
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn has_operation(&self, operation: &str) -> bool {
        self.functions.contains_key(operation)
    }

    /// Dispatch function for `operation`, if the primary declares it
    pub fn operation(&self, operation: &str) -> Option<&DispatchFn> {
        self.functions.get(operation)
    }

    pub async fn call(&self, operation: &str, args: Args) -> Result<Value, DispatchError> {
        self.resolve(operation)?.call(args).await
    }

    pub async fn call_tracked(&self, operation: &str, args: Args) -> Result<Dispatched, DispatchError> {
        self.resolve(operation)?.call_tracked(args).await
    }

    /// Current queue mode; `None` when no write queue is attached
    pub fn queue_mode(&self) -> Option<QueueMode> {
        self.binding.queue.as_ref().map(|queue| queue.mode())
    }

    pub fn write_queue(&self) -> Option<&Arc<SchemaQueue>> {
        self.binding.queue.as_ref()
    }

    /// Broadcast a queue-state transition for this schema
    pub async fn set_queue_state(&self, should_queue: bool) -> Result<(), QueueError> {
        let queue = self
            .binding
            .queue
            .as_ref()
            .ok_or_else(|| QueueError::NotConfigured {
                schema: self.schema().to_string(),
            })?;
        queue.request_transition(should_queue).await?;
        Ok(())
    }

    fn resolve(&self, operation: &str) -> Result<&DispatchFn, DispatchError> {
        self.functions
            .get(operation)
            .ok_or_else(|| DispatchError::UnknownOperation {
                schema: self.schema().to_string(),
                primary: self.binding.context.primary_name().to_string(),
                operation: operation.to_string(),
            })
    }
}

impl fmt::Debug for DispatchProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchProxy")
            .field("schema", &self.schema())
            .field("operations", &self.functions.keys().collect::<Vec<_>>())
            .field("queue_mode", &self.queue_mode())
            .finish()
    }
}

//! Per-schema queue binding.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, RwLock, RwLockWriteGuard};
use tracing::debug;

use super::state::{QueueMode, QueueStateCell};
use crate::messaging::{Broker, BrokerResult, QueuedOperation, TransitionMessage};
use crate::schema::SchemaContext;

/// Whether a mirrored write goes to the buffer
pub(crate) enum Admission {
    /// Buffer it; the permit holds off drain completion until the push lands
    Buffer(OwnedRwLockReadGuard<()>),
    Direct,
    /// A drain is settling; decide once it has
    Pending,
}

/// One schema's view of the write queue: its list key, its state cell and
/// the broker both live here so the proxy can buffer without touching the
/// manager.
pub struct SchemaQueue {
    context: Arc<SchemaContext>,
    queue_key: String,
    transition_topic: String,
    broker: Arc<dyn Broker>,
    state: QueueStateCell,
    /// Shared by in-flight buffered pushes, exclusive while a drain settles
    gate: Arc<RwLock<()>>,
}

impl SchemaQueue {
    pub(crate) fn new(
        context: Arc<SchemaContext>,
        queue_key: String,
        transition_topic: String,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            context,
            queue_key,
            transition_topic,
            broker,
            state: QueueStateCell::new(),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn mode(&self) -> QueueMode {
        self.state.mode()
    }

    pub fn is_buffering(&self) -> bool {
        self.state.is_buffering()
    }

    /// Whether a call to `operation` on `backend` would be buffered right now
    pub fn buffers(&self, backend: &str, operation: &str) -> bool {
        self.state.is_buffering() && self.context.buffers(backend, operation)
    }

    /// Decide without waiting whether a write to `operation` on `backend` is buffered
    pub(crate) fn try_admit(&self, backend: &str, operation: &str) -> Admission {
        match Arc::clone(&self.gate).try_read_owned() {
            Ok(permit) if self.buffers(backend, operation) => Admission::Buffer(permit),
            Ok(_) => Admission::Direct,
            Err(_) => Admission::Pending,
        }
    }

    /// Wait out a settling drain, then decide; `Some` means buffer
    pub(crate) async fn admit(&self, backend: &str, operation: &str) -> Option<OwnedRwLockReadGuard<()>> {
        let permit = Arc::clone(&self.gate).read_owned().await;
        self.buffers(backend, operation).then_some(permit)
    }

    /// Block new admissions and wait for admitted pushes to land
    pub(crate) async fn settle(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    /// Append a record to the tail of this schema's list
    pub async fn enqueue(&self, record: &QueuedOperation) -> BrokerResult<()> {
        let payload = record.to_payload()?;
        self.broker.push_right(&self.queue_key, &payload).await?;
        debug!(
            schema = %self.name(),
            queue_key = %self.queue_key,
            model = %record.model,
            func = %record.func,
            "Buffered secondary write"
        );
        Ok(())
    }

    /// Broadcast a transition for this schema to every listening instance
    pub async fn request_transition(&self, queue: bool) -> BrokerResult<()> {
        let payload = TransitionMessage::new(self.name(), queue).to_payload()?;
        self.broker.publish(&self.transition_topic, &payload).await
    }

    pub async fn pending(&self) -> BrokerResult<usize> {
        self.broker.len(&self.queue_key).await
    }

    pub(crate) fn state(&self) -> &QueueStateCell {
        &self.state
    }

    pub(crate) fn context(&self) -> &SchemaContext {
        &self.context
    }
}

impl fmt::Debug for SchemaQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaQueue")
            .field("schema", &self.name())
            .field("queue_key", &self.queue_key)
            .field("mode", &self.mode())
            .field("broker", &self.broker.provider_name())
            .finish()
    }
}

//! Secondary mirroring.
//!
//! After a primary call succeeds the same call is mirrored to the secondary on
//! a detached task: either executed directly, or, while the schema is queuing,
//! appended to the schema's broker list. Nothing here can fail the caller.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::Binding;
use crate::backend::Args;
use crate::constants::LOG_PREFIX;
use crate::messaging::QueuedOperation;
use crate::queue::{Admission, SchemaQueue};

/// How a mirrored call settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Executed against the secondary
    Mirrored,
    /// Buffered in the write queue
    Queued,
    /// The secondary failed; the failure was logged
    Failed(String),
    /// Buffering failed; the failure was logged and the write is lost
    EnqueueFailed(String),
}

/// Start mirroring `operation` to the schema's secondary
///
/// The queue-state decision is taken here, after the primary has settled, so
/// a transition that lands while the primary is running is honored. A write
/// admitted to the buffer holds its permit until the push lands, so a drain
/// cannot settle with that record still in flight.
pub(super) fn spawn(binding: &Arc<Binding>, operation: &Arc<str>, args: Args) -> Option<JoinHandle<MirrorOutcome>> {
    let secondary = binding.context.secondary_name()?;
    let admission = binding
        .queue
        .as_ref()
        .map(|queue| queue.try_admit(secondary, operation));

    let binding = Arc::clone(binding);
    let operation = Arc::clone(operation);

    Some(tokio::spawn(async move {
        let Some(queue) = binding.queue.as_ref() else {
            return mirror(&binding, &operation, args).await;
        };

        let permit = match admission {
            Some(Admission::Buffer(permit)) => Some(permit),
            Some(Admission::Pending) => {
                let secondary = binding.context.secondary_name().unwrap_or_default();
                queue.admit(secondary, &operation).await
            }
            Some(Admission::Direct) | None => None,
        };

        match permit {
            Some(_permit) => enqueue(&binding, queue, &operation, args).await,
            None => mirror(&binding, &operation, args).await,
        }
    }))
}

async fn enqueue(binding: &Binding, queue: &SchemaQueue, operation: &str, args: Args) -> MirrorOutcome {
    let context = &binding.context;
    let secondary = context.secondary_name().unwrap_or_default();
    let record = QueuedOperation::new(context.name(), secondary, operation, args);

    match queue.enqueue(&record).await {
        Ok(()) => MirrorOutcome::Queued,
        Err(err) => {
            context.logger().error(
                &format!(
                    "{LOG_PREFIX} [t={}] Failed to queue write for secondary model: {secondary}#{operation}",
                    Utc::now().to_rfc3339()
                ),
                &err.to_string(),
            );
            error!(
                schema = %context.name(),
                secondary = %secondary,
                operation = %operation,
                error = %err,
                "Failed to buffer secondary write"
            );
            MirrorOutcome::EnqueueFailed(err.to_string())
        }
    }
}

async fn mirror(binding: &Binding, operation: &str, args: Args) -> MirrorOutcome {
    let context = &binding.context;
    let (Some(secondary), Some(backend)) = (context.secondary_name(), context.secondary_backend()) else {
        return MirrorOutcome::Mirrored;
    };

    match backend.invoke(operation, args).await {
        Ok(_) => {
            debug!(schema = %context.name(), secondary = %secondary, operation = %operation, "Mirrored to secondary");
            MirrorOutcome::Mirrored
        }
        Err(err) => {
            context.logger().error(
                &format!(
                    "{LOG_PREFIX} [t={}] Captured error on secondary model: {secondary}#{operation}",
                    Utc::now().to_rfc3339()
                ),
                &context.error_detail(&err),
            );
            warn!(
                schema = %context.name(),
                secondary = %secondary,
                operation = %operation,
                error = %err,
                "Secondary call failed"
            );
            MirrorOutcome::Failed(err.to_string())
        }
    }
}

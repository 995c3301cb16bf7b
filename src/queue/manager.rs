//! # Write Queue Manager
//!
//! Coordinates buffering for every schema of this process. Schemas register
//! themselves at build time; the manager then:
//!
//! - broadcasts queue-state transitions on the transition topic
//!   ([`WriteQueueManager::set_queue_state`]),
//! - applies transitions received on that topic, in arrival order
//!   ([`WriteQueueManager::listen`], [`WriteQueueManager::handle_transition`]),
//! - drains a schema's list when it leaves queuing mode, replaying each record
//!   against the backend named in the record. Writes buffered while the drain
//!   runs are replayed by it; the drain only settles once every admitted
//!   push has landed.
//!
//! Replay failures are logged through the schema's logger and never stop a
//! drain. A broker failure while popping aborts the drain after in-flight
//! replays settle, and the schema stays in queuing mode.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::schema_queue::SchemaQueue;
use super::state::{QueueMode, StateChange};
use crate::config::{QueueConfig, TransportConfig};
use crate::constants::{DEFAULT_DRAIN_CONCURRENCY, DEFAULT_TRANSITION_TOPIC, LOG_PREFIX};
use crate::error::QueueError;
use crate::logging::Logger;
use crate::messaging::{Broker, BrokerError, InMemoryBroker, QueuedOperation, TransitionMessage};
use crate::schema::SchemaContext;

#[cfg(feature = "postgres")]
use crate::messaging::PgBroker;

/// What applying a transition did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Unchanged,
    EnteredQueuing,
    /// A drain was already running and absorbed the request
    DrainInProgress,
    /// This transition drained the schema; `count` records were processed
    Drained { count: usize },
}

enum Transition {
    Settled(TransitionOutcome),
    Drain(Arc<SchemaQueue>),
}

/// Process-wide write queue
pub struct WriteQueueManager {
    instance_id: Uuid,
    broker: Arc<dyn Broker>,
    transition_topic: String,
    drain_concurrency: usize,
    logger: Arc<dyn Logger>,
    schemas: DashMap<String, Arc<SchemaQueue>>,
}

impl WriteQueueManager {
    pub fn new(broker: Arc<dyn Broker>, logger: Arc<dyn Logger>) -> Self {
        let instance_id = Uuid::new_v4();
        info!(
            instance_id = %instance_id,
            broker = broker.provider_name(),
            "Creating write queue manager"
        );

        Self {
            instance_id,
            broker,
            transition_topic: DEFAULT_TRANSITION_TOPIC.to_string(),
            drain_concurrency: DEFAULT_DRAIN_CONCURRENCY,
            logger,
            schemas: DashMap::new(),
        }
    }

    pub fn with_transition_topic(mut self, topic: impl Into<String>) -> Self {
        self.transition_topic = topic.into();
        self
    }

    /// Replays kept in flight while draining; values below 1 are raised to 1
    pub fn with_drain_concurrency(mut self, concurrency: usize) -> Self {
        self.drain_concurrency = concurrency.max(1);
        self
    }

    /// Build a manager and its broker from configuration
    pub async fn from_config(config: &QueueConfig, logger: Arc<dyn Logger>) -> Result<Self, QueueError> {
        let broker: Arc<dyn Broker> = match &config.transport {
            TransportConfig::InMemory => Arc::new(InMemoryBroker::new()),
            #[cfg(feature = "postgres")]
            TransportConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let broker = PgBroker::connect(database_url, *max_connections).await?;
                broker.ensure_schema().await?;
                Arc::new(broker)
            }
            #[cfg(not(feature = "postgres"))]
            TransportConfig::Postgres { .. } => {
                return Err(BrokerError::unsupported("postgres", "connect").into());
            }
        };

        Ok(Self::new(broker, logger)
            .with_transition_topic(config.transition_topic.clone())
            .with_drain_concurrency(config.drain_concurrency))
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn transition_topic(&self) -> &str {
        &self.transition_topic
    }

    pub fn drain_concurrency(&self) -> usize {
        self.drain_concurrency
    }

    /// Attach a schema; a schema registered twice replaces its earlier binding
    pub(crate) fn register_schema(&self, context: Arc<SchemaContext>, queue_key: String) -> Arc<SchemaQueue> {
        let name = context.name().to_string();
        let queue = Arc::new(SchemaQueue::new(
            context,
            queue_key,
            self.transition_topic.clone(),
            Arc::clone(&self.broker),
        ));

        if self.schemas.insert(name.clone(), Arc::clone(&queue)).is_some() {
            warn!(schema = %name, "Schema re-registered with write queue, replacing previous binding");
        }
        debug!(schema = %name, queue_key = %queue.queue_key(), "Schema registered with write queue");

        queue
    }

    pub fn schema(&self, name: &str) -> Option<Arc<SchemaQueue>> {
        self.schemas.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn mode(&self, schema: &str) -> Option<QueueMode> {
        self.schemas.get(schema).map(|entry| entry.mode())
    }

    /// Whether `schema` is currently buffering its secondary writes
    pub fn is_queuing(&self, schema: &str) -> bool {
        self.mode(schema).is_some_and(|mode| mode.is_buffering())
    }

    /// Records waiting in `schema`'s list
    pub async fn pending(&self, schema: &str) -> Result<usize, QueueError> {
        let queue = self.require(schema)?;
        Ok(queue.pending().await?)
    }

    /// Ask every instance to start or stop queuing `schema`
    ///
    /// Only publishes; local state changes when this instance's listener
    /// receives its own message, like every other instance.
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn set_queue_state(&self, schema: &str, should_queue: bool) -> Result<(), QueueError> {
        self.logger.log(&format!(
            "{LOG_PREFIX} Setting queue state for {schema} to {should_queue}"
        ));

        let payload = TransitionMessage::new(schema, should_queue).to_payload()?;
        self.broker.publish(&self.transition_topic, &payload).await?;
        Ok(())
    }

    /// Subscribe to the transition topic and apply transitions as they arrive
    ///
    /// Returns once the subscription is confirmed. State decisions are taken
    /// in delivery order on the listener task; drains run on their own tasks
    /// so one slow drain never delays other schemas' transitions.
    pub async fn listen(self: &Arc<Self>) -> Result<JoinHandle<()>, QueueError> {
        let subscription = self.broker.subscribe(&self.transition_topic).await?;
        self.logger.log(&format!(
            "{LOG_PREFIX} Subscribed to channel: {}",
            subscription.topic()
        ));
        info!(
            instance_id = %self.instance_id,
            topic = %subscription.topic(),
            "Write queue listening for transitions"
        );

        let manager = Arc::clone(self);
        let mut deliveries = subscription.into_stream();

        Ok(tokio::spawn(async move {
            while let Some(delivery) = deliveries.next().await {
                manager.route_delivery(&delivery.payload);
            }
            warn!(instance_id = %manager.instance_id, "Transition subscription closed");
        }))
    }

    fn route_delivery(self: &Arc<Self>, payload: &str) {
        let message = match TransitionMessage::from_payload(payload) {
            Ok(message) => message,
            Err(err) => {
                self.logger.error(
                    &format!("{LOG_PREFIX} Ignoring malformed transition message"),
                    &err.to_string(),
                );
                warn!(error = %err, "Malformed transition message");
                return;
            }
        };

        if let Ok(Transition::Drain(queue)) = self.begin_transition(&message) {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = manager.finish_drain(&queue).await {
                    debug!(error = %err, "Background drain ended with failure");
                }
            });
        }
    }

    /// Apply one transition and, if it starts a drain, run the drain to the end
    pub async fn handle_transition(&self, message: &TransitionMessage) -> Result<TransitionOutcome, QueueError> {
        match self.begin_transition(message)? {
            Transition::Settled(outcome) => Ok(outcome),
            Transition::Drain(queue) => {
                let count = self.finish_drain(&queue).await?;
                Ok(TransitionOutcome::Drained { count })
            }
        }
    }

    fn begin_transition(&self, message: &TransitionMessage) -> Result<Transition, QueueError> {
        self.logger.log(&format!(
            "{LOG_PREFIX} Transitioning queue state for {} to {}",
            message.model, message.queue
        ));

        let Some(queue) = self.schema(&message.model) else {
            self.logger.error(
                &format!("{LOG_PREFIX} No existing model of type \"{}\"", message.model),
                "",
            );
            warn!(schema = %message.model, "Transition for unknown schema");
            return Err(QueueError::UnknownSchema {
                schema: message.model.clone(),
            });
        };

        let transition = match queue.state().request(message.queue) {
            StateChange::Unchanged => Transition::Settled(TransitionOutcome::Unchanged),
            StateChange::EnteredQueuing => {
                info!(schema = %queue.name(), "Schema entered queuing mode");
                Transition::Settled(TransitionOutcome::EnteredQueuing)
            }
            StateChange::DrainInProgress => Transition::Settled(TransitionOutcome::DrainInProgress),
            StateChange::DrainStarted => Transition::Drain(queue),
        };
        Ok(transition)
    }

    async fn finish_drain(&self, queue: &SchemaQueue) -> Result<usize, QueueError> {
        info!(schema = %queue.name(), queue_key = %queue.queue_key(), "Draining write queue");

        match self.drain(queue).await {
            Ok((count, mode)) => {
                self.logger.log(&format!(
                    "{LOG_PREFIX} Re-processed {count} messages for {}",
                    queue.name()
                ));
                info!(schema = %queue.name(), count, mode = %mode, "Write queue drained");
                Ok(count)
            }
            Err(source) => {
                queue.state().abort_drain();
                self.logger.error(
                    &format!("{LOG_PREFIX} Problem with reprocessing {}", queue.name()),
                    &source.to_string(),
                );
                error!(schema = %queue.name(), error = %source, "Drain aborted, schema remains queuing");
                Err(QueueError::Drain {
                    schema: queue.name().to_string(),
                    source,
                })
            }
        }
    }

    /// Replay until the list is empty, then settle the state with no buffered
    /// push still in flight
    async fn drain(&self, queue: &SchemaQueue) -> Result<(usize, QueueMode), BrokerError> {
        let mut count = self.replay_pending(queue).await?;

        let _settling = queue.settle().await;
        count += self.replay_pending(queue).await?;
        Ok((count, queue.state().complete_drain()))
    }

    async fn replay_pending(&self, queue: &SchemaQueue) -> Result<usize, BrokerError> {
        let records = stream::unfold(
            (Arc::clone(&self.broker), queue.queue_key().to_string(), true),
            |(broker, queue_key, more)| async move {
                if !more {
                    return None;
                }
                match broker.pop_left(&queue_key).await {
                    Ok(Some(payload)) => Some((Ok(payload), (broker, queue_key, true))),
                    Ok(None) => None,
                    Err(err) => Some((Err(err), (broker, queue_key, false))),
                }
            },
        )
        .boxed();

        records
            .map(move |record| async move {
                let payload = record?;
                self.replay(queue, payload).await;
                Ok::<(), BrokerError>(())
            })
            .buffer_unordered(self.drain_concurrency)
            .fold(Ok(0usize), |total, result| async move {
                match (total, result) {
                    (Ok(count), Ok(())) => Ok(count + 1),
                    (Err(err), _) | (Ok(_), Err(err)) => Err(err),
                }
            })
            .await
    }

    async fn replay(&self, queue: &SchemaQueue, payload: String) {
        let context = queue.context();

        let record = match QueuedOperation::from_payload(&payload) {
            Ok(record) => record,
            Err(err) => {
                context.logger().error(
                    &format!("{LOG_PREFIX} Error during reprocessing: unreadable record"),
                    &err.to_string(),
                );
                return;
            }
        };

        let Some(backend) = context.replay_target(&record.model) else {
            context.logger().error(
                &format!(
                    "{LOG_PREFIX} Error during reprocessing: no secondary model named \"{}\"",
                    record.model
                ),
                "",
            );
            return;
        };

        if let Err(err) = backend.invoke(&record.func, record.args).await {
            context.logger().error(
                &format!(
                    "{LOG_PREFIX} Error during reprocessing: {}#{}",
                    record.model, record.func
                ),
                &context.error_detail(&err),
            );
            debug!(schema = %queue.name(), model = %record.model, func = %record.func, "Replay failed");
        }
    }

    fn require(&self, schema: &str) -> Result<Arc<SchemaQueue>, QueueError> {
        self.schema(schema).ok_or_else(|| QueueError::UnknownSchema {
            schema: schema.to_string(),
        })
    }
}

impl fmt::Debug for WriteQueueManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteQueueManager")
            .field("instance_id", &self.instance_id)
            .field("broker", &self.broker.provider_name())
            .field("transition_topic", &self.transition_topic)
            .field("drain_concurrency", &self.drain_concurrency)
            .field("schemas", &self.schema_names())
            .finish()
    }
}

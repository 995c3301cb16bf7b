//! # Broker Trait
//!
//! Provider-agnostic contract for the external list queue and pub/sub channel
//! the write queue persists to and coordinates through.
//!
//! Implementations provide:
//!
//! - FIFO list operations keyed by string (`push_right` / `pop_left`)
//! - Topic publish with delivery to every subscriber, the publisher included
//! - Topic subscription as an asynchronous stream of deliveries
//!
//! Reconnection and transport-level retry are the provider's concern.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::errors::BrokerResult;

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: String,
}

/// Stream of deliveries for one topic subscription
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// An active topic subscription
///
/// Returned once the provider has confirmed the subscription; dropping it
/// unsubscribes.
pub struct Subscription {
    topic: String,
    deliveries: DeliveryStream,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, deliveries: DeliveryStream) -> Self {
        Self {
            topic: topic.into(),
            deliveries,
        }
    }

    /// Topic this subscription was confirmed for
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Consume the subscription into its delivery stream
    pub fn into_stream(self) -> DeliveryStream {
        self.deliveries
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("deliveries", &"DeliveryStream")
            .finish()
    }
}

/// External queue and pub/sub transport
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Append a serialized record to the tail of the list at `queue_key`
    async fn push_right(&self, queue_key: &str, payload: &str) -> BrokerResult<()>;

    /// Remove and return the oldest record at `queue_key`, or `None` when empty
    async fn pop_left(&self, queue_key: &str) -> BrokerResult<Option<String>>;

    /// Publish a serialized message to every subscriber of `topic`
    async fn publish(&self, topic: &str, payload: &str) -> BrokerResult<()>;

    /// Subscribe to `topic`
    async fn subscribe(&self, topic: &str) -> BrokerResult<Subscription>;

    /// Number of records waiting at `queue_key`
    ///
    /// Providers that cannot report a length return
    /// [`BrokerError::Unsupported`](super::BrokerError::Unsupported).
    async fn len(&self, queue_key: &str) -> BrokerResult<usize>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

//! # In-Memory Broker
//!
//! Thread-safe in-process broker for testing, development and single-process
//! deployments.
//!
//! - **Shared state**: clones share the same queues and topics, so several write
//!   queue managers built from clones of one broker behave like separate
//!   processes sharing one external broker.
//! - **FIFO lists**: a `VecDeque` per queue key behind `tokio::sync::RwLock`.
//! - **Pub/sub**: a `tokio::sync::broadcast` channel per topic; every live
//!   subscriber (the publisher's own included) receives each message.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::constants::IN_MEMORY_TOPIC_CAPACITY;
use crate::messaging::broker::{Broker, Delivery, Subscription};
use crate::messaging::errors::BrokerResult;

#[derive(Debug, Default)]
struct InMemoryState {
    queues: RwLock<HashMap<String, VecDeque<String>>>,
    topics: RwLock<HashMap<String, broadcast::Sender<Delivery>>>,
    total_pushed: AtomicU64,
    total_popped: AtomicU64,
    total_published: AtomicU64,
}

/// In-memory broker
///
/// # Example
///
/// ```rust
/// use dualwrite::messaging::{Broker, InMemoryBroker};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
///
/// broker.push_right("dualwrite-accounts-test", r#"{"func":"update"}"#).await?;
/// let oldest = broker.pop_left("dualwrite-accounts-test").await?;
/// assert!(oldest.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<InMemoryState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records waiting at `queue_key` (for testing)
    pub async fn queue_length(&self, queue_key: &str) -> usize {
        let queues = self.state.queues.read().await;
        queues.get(queue_key).map(VecDeque::len).unwrap_or(0)
    }

    /// Snapshot of the records waiting at `queue_key`, oldest first (for testing)
    pub async fn peek_all(&self, queue_key: &str) -> Vec<String> {
        let queues = self.state.queues.read().await;
        queues
            .get(queue_key)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of messages published on any topic
    pub fn published_count(&self) -> u64 {
        self.state.total_published.load(Ordering::Relaxed)
    }

    pub fn pushed_count(&self) -> u64 {
        self.state.total_pushed.load(Ordering::Relaxed)
    }

    pub fn popped_count(&self) -> u64 {
        self.state.total_popped.load(Ordering::Relaxed)
    }

    async fn topic_sender(&self, topic: &str) -> broadcast::Sender<Delivery> {
        if let Some(sender) = self.state.topics.read().await.get(topic) {
            return sender.clone();
        }

        let mut topics = self.state.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(IN_MEMORY_TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn push_right(&self, queue_key: &str, payload: &str) -> BrokerResult<()> {
        let mut queues = self.state.queues.write().await;
        queues
            .entry(queue_key.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.state.total_pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn pop_left(&self, queue_key: &str) -> BrokerResult<Option<String>> {
        let mut queues = self.state.queues.write().await;
        let popped = queues.get_mut(queue_key).and_then(VecDeque::pop_front);
        if popped.is_some() {
            self.state.total_popped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(popped)
    }

    async fn publish(&self, topic: &str, payload: &str) -> BrokerResult<()> {
        let sender = self.topic_sender(topic).await;
        self.state.total_published.fetch_add(1, Ordering::Relaxed);

        let delivery = Delivery {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };

        // No subscribers is not an error: the message simply has no audience.
        match sender.send(delivery) {
            Ok(receivers) => debug!(topic = %topic, receivers = receivers, "Published message"),
            Err(_) => debug!(topic = %topic, "Published message with no subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BrokerResult<Subscription> {
        let receiver = self.topic_sender(topic).await.subscribe();
        let topic_name = topic.to_string();

        let deliveries = futures::stream::unfold(receiver, move |mut receiver| {
            let topic_name = topic_name.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(delivery) => return Some((delivery, receiver)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic_name, skipped = skipped, "Subscriber lagged; messages dropped");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed();

        Ok(Subscription::new(topic, deliveries))
    }

    async fn len(&self, queue_key: &str) -> BrokerResult<usize> {
        Ok(self.queue_length(queue_key).await)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

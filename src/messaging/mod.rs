//! # Messaging Module
//!
//! Broker abstraction, wire formats and broker providers used by the write
//! queue to persist buffered secondary writes and broadcast queue-state
//! transitions between instances.

pub mod broker;
pub mod errors;
pub mod message;
pub mod providers;

pub use broker::{Broker, Delivery, DeliveryStream, Subscription};
pub use errors::{BrokerError, BrokerResult};
pub use message::{QueuedOperation, TransitionMessage};
pub use providers::InMemoryBroker;
#[cfg(feature = "postgres")]
pub use providers::PgBroker;

//! # Write Queue
//!
//! Buffers secondary writes in a broker-held FIFO list while a schema is in
//! queuing mode, and replays them when the schema leaves it. Queue-state
//! transitions are broadcast over pub/sub so every instance sharing a schema
//! name switches together.

pub mod manager;
pub mod policy;
pub mod schema_queue;
pub mod state;

pub use manager::{TransitionOutcome, WriteQueueManager};
pub use policy::QueuePolicy;
pub(crate) use schema_queue::Admission;
pub use schema_queue::SchemaQueue;
pub use state::{QueueMode, QueueStateCell, StateChange};

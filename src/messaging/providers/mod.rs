//! # Broker Providers
//!
//! - [`InMemoryBroker`] - in-process queues and broadcast topics
//! - [`PgBroker`] - PostgreSQL table queue with LISTEN/NOTIFY (feature `postgres`)

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryBroker;
#[cfg(feature = "postgres")]
pub use postgres::PgBroker;

#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # dualwrite
//!
//! Dual-write dispatch for migrating between data stores.
//!
//! ## Overview
//!
//! A schema pairs a **primary** backend (the current source of truth) with an
//! optional **secondary** backend (the store being migrated to). Calls go
//! through a [`DispatchProxy`] that looks exactly like the primary: callers get
//! the primary's result or error, and every successful call is mirrored to the
//! secondary in the background. Secondary failures are logged, never returned.
//!
//! While the secondary is unavailable, a [`WriteQueueManager`] can put a schema
//! into **queuing mode**: mirrored writes are appended to a broker-held FIFO
//! list instead, and replayed once queuing is switched off. Queue-state
//! transitions are broadcast over pub/sub so every instance sharing a schema
//! name switches together.
//!
//! ## Module Organization
//!
//! - [`backend`] - Backend capability trait, closure backends, registry
//! - [`proxy`] - Dispatch proxy and secondary mirroring
//! - [`queue`] - Write queue state machine, buffering and draining
//! - [`messaging`] - Broker abstraction, wire formats, in-memory and PostgreSQL brokers
//! - [`schema`] - Schema composition and validation
//! - [`config`] - Typed configuration and layered loading
//! - [`logging`] - Structured logging and the injectable schema logger
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dualwrite::args;
//! use dualwrite::backend::FnBackend;
//! use dualwrite::config::SchemaConfig;
//! use dualwrite::logging::TracingLogger;
//! use dualwrite::messaging::InMemoryBroker;
//! use dualwrite::queue::WriteQueueManager;
//! use dualwrite::schema::SchemaBuilder;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(WriteQueueManager::new(
//!     Arc::new(InMemoryBroker::new()),
//!     Arc::new(TracingLogger),
//! ));
//! let _listener = queue.listen().await?;
//!
//! let accounts = SchemaBuilder::new("accounts")
//!     .backend("cassandra", FnBackend::builder().operation("update", |_| async { Ok(json!("ok")) }).build())
//!     .backend("postgres", FnBackend::builder().operation("update", |_| async { Ok(json!("ok")) }).build())
//!     .logger(Arc::new(TracingLogger))
//!     .write_queue(Arc::clone(&queue))
//!     .build(&SchemaConfig::new("cassandra").with_secondary("postgres"))?;
//!
//! accounts.call("update", args!["id-1", {"name": "Ada"}]).await?;
//!
//! // Buffer writes while the secondary is down, replay them afterwards.
//! accounts.set_queue_state(true).await?;
//! accounts.set_queue_state(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub(crate) mod macros;
pub mod messaging;
pub mod proxy;
pub mod queue;
pub mod schema;

pub use backend::{Args, Backend, BackendRegistry, FnBackend, OperationSet};
pub use config::{ConfigLoader, DualWriteConfig, QueueConfig, SchemaConfig, TransportConfig};
pub use error::{ConfigurationError, DispatchError, Error, QueueError, Result};
pub use logging::{init_structured_logging, Logger, NoopLogger, TracingLogger};
pub use messaging::{Broker, BrokerError, InMemoryBroker, QueuedOperation, TransitionMessage};
#[cfg(feature = "postgres")]
pub use messaging::PgBroker;
pub use proxy::{DispatchFn, DispatchProxy, Dispatched, MirrorOutcome};
pub use queue::{QueueMode, QueuePolicy, TransitionOutcome, WriteQueueManager};
pub use schema::{SchemaBuilder, SchemaContext};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

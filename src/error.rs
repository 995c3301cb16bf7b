//! # Error Types
//!
//! Only primary-path failures ever reach a dispatch caller. Secondary and
//! replication-path failures are logged where they happen and never surface
//! through [`DispatchError`].

use thiserror::Error;

pub use crate::config::ConfigurationError;
use crate::messaging::BrokerError;

/// Failure of a dispatch call
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The primary backend does not declare the requested operation
    #[error("Operation '{operation}' is not exposed by primary backend '{primary}' of schema '{schema}'")]
    UnknownOperation {
        schema: String,
        primary: String,
        operation: String,
    },

    /// The primary backend's operation failed; `source` is its error, untouched
    #[error("Primary backend '{backend}' failed on '{operation}': {source}")]
    Primary {
        schema: String,
        backend: String,
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// The primary backend's own error, if this is a primary failure
    pub fn primary_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Primary { source, .. } => Some(source),
            Self::UnknownOperation { .. } => None,
        }
    }

    /// Consume into the primary backend's own error
    pub fn into_primary_error(self) -> Option<anyhow::Error> {
        match self {
            Self::Primary { source, .. } => Some(source),
            Self::UnknownOperation { .. } => None,
        }
    }
}

/// Failure in the write queue's control path
#[derive(Debug, Error)]
pub enum QueueError {
    /// A transition or query named a schema this instance never registered
    #[error("No existing model of type \"{schema}\"")]
    UnknownSchema { schema: String },

    /// The schema was built without a write queue
    #[error("Schema '{schema}' has no write queue attached")]
    NotConfigured { schema: String },

    /// A drain attempt was aborted; the schema stays in queuing mode
    #[error("Draining schema '{schema}' failed: {source}")]
    Drain {
        schema: String,
        #[source]
        source: BrokerError,
    },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

pub type Result<T> = std::result::Result<T, Error>;

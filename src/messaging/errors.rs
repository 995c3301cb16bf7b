//! # Messaging Error Types
//!
//! Structured error handling for broker transports using thiserror, so that
//! queue and pub/sub failures carry the key or topic they happened on.

use thiserror::Error;

/// Broker transport errors
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Queue operation failed: {queue_key}: {operation}: {message}")]
    QueueOperation {
        queue_key: String,
        operation: String,
        message: String,
    },

    #[error("Publish to topic {topic} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscribe to topic {topic} failed: {message}")]
    Subscribe { topic: String, message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Operation {operation} is not supported by the {provider} broker")]
    Unsupported {
        provider: &'static str,
        operation: String,
    },
}

impl BrokerError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_key: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_key: queue_key.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a subscribe error
    pub fn subscribe(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(provider: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            provider,
            operation: operation.into(),
        }
    }
}

/// Conversion from sqlx::Error to BrokerError
#[cfg(feature = "postgres")]
impl From<sqlx::Error> for BrokerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                BrokerError::queue_operation("database", "query", db_err.to_string())
            }
            sqlx::Error::PoolTimedOut => BrokerError::connection("database pool timed out"),
            sqlx::Error::PoolClosed => BrokerError::connection("database pool is closed"),
            _ => BrokerError::connection(err.to_string()),
        }
    }
}

/// Conversion from serde_json::Error to BrokerError
impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            BrokerError::message_deserialization(err.to_string())
        } else {
            BrokerError::message_serialization(err.to_string())
        }
    }
}

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

//! # Wire Message Structures
//!
//! JSON formats exchanged through the broker: buffered secondary writes pushed
//! onto a schema's list queue, and queue-state transitions broadcast on the
//! transition topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::BrokerResult;
use crate::backend::Args;

/// A secondary-bound call captured while its schema was queuing
///
/// Field names are part of the persisted format and shared with every
/// instance draining the same queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Schema the call was dispatched through
    pub schema: String,
    /// Name of the backend the call was destined for
    pub model: String,
    /// Operation name
    pub func: String,
    /// Positional arguments, in call order
    pub args: Args,
    /// When the call was buffered; informational only on read
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
}

impl QueuedOperation {
    /// Capture a call, stamped with the current time
    pub fn new(
        schema: impl Into<String>,
        model: impl Into<String>,
        func: impl Into<String>,
        args: Args,
    ) -> Self {
        Self {
            schema: schema.into(),
            model: model.into(),
            func: func.into(),
            args,
            datetime: Some(Utc::now()),
        }
    }

    /// Serialize for the broker
    pub fn to_payload(&self) -> BrokerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a payload popped from the broker
    pub fn from_payload(payload: &str) -> BrokerResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Instruction for every instance to enter or leave queuing mode for a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionMessage {
    /// `true` to start buffering, `false` to drain and resume
    pub queue: bool,
    /// Schema name
    pub model: String,
}

impl TransitionMessage {
    pub fn new(schema: impl Into<String>, queue: bool) -> Self {
        Self {
            queue,
            model: schema.into(),
        }
    }

    pub fn to_payload(&self) -> BrokerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(payload: &str) -> BrokerResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

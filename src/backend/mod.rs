//! # Backend Capability Layer
//!
//! A backend is any data store or service client a schema forwards calls to.
//! Instead of discovering callables at runtime, each backend declares the
//! operation names it supports through [`Backend::operations`]; the proxy binds
//! one dispatch function per name the primary declares.
//!
//! Arguments travel as positional JSON values ([`Args`]) so the exact call can
//! be persisted to the broker and replayed later.

pub mod fn_backend;
pub mod registry;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

pub use fn_backend::{FnBackend, FnBackendBuilder};
pub use registry::BackendRegistry;

/// Positional call arguments
pub type Args = Vec<Value>;

/// Result of a backend operation
///
/// Backends fail with an opaque [`anyhow::Error`]; the proxy propagates primary
/// failures verbatim and only logs secondary ones.
pub type BackendResult = anyhow::Result<Value>;

/// A pluggable backend exposing named asynchronous operations
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Names of every operation this backend can execute
    fn operations(&self) -> OperationSet;

    /// Execute `operation` with positional `args`
    async fn invoke(&self, operation: &str, args: Args) -> BackendResult;

    /// Whether `operation` is declared by this backend
    fn supports(&self, operation: &str) -> bool {
        self.operations().contains(operation)
    }
}

/// Set of operation names declared by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSet(BTreeSet<String>);

impl OperationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, operation: impl Into<String>) -> bool {
        self.0.insert(operation.into())
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.0.contains(operation)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Union with the operations of a parent capability set
    pub fn extend_from(&mut self, parent: &OperationSet) {
        self.0.extend(parent.0.iter().cloned());
    }
}

impl<S: Into<String>> FromIterator<S> for OperationSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", names.join(", "))
    }
}

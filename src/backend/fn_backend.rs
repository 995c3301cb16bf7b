//! # Closure-Table Backend
//!
//! [`FnBackend`] turns a table of async closures into a [`Backend`]. It is the
//! quickest way to adapt an existing client: one closure per operation, each
//! receiving the positional arguments.
//!
//! Capability hierarchies are expressed with [`FnBackend::extending`]: the new
//! backend starts with every operation of its parent and may override some of
//! them, so inherited operations are declared (and proxied) like its own.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::{Args, Backend, BackendResult, OperationSet};

type Handler = Arc<dyn Fn(Args) -> BoxFuture<'static, BackendResult> + Send + Sync>;

/// Backend assembled from per-operation closures
///
/// # Example
///
/// ```rust
/// use dualwrite::backend::{Backend, FnBackend};
/// use serde_json::json;
///
/// # async fn example() -> anyhow::Result<()> {
/// let backend = FnBackend::builder()
///     .operation("ping", |_args| async { Ok(json!("pong")) })
///     .build();
///
/// assert_eq!(backend.invoke("ping", vec![]).await?, json!("pong"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct FnBackend {
    handlers: HashMap<String, Handler>,
}

impl FnBackend {
    pub fn builder() -> FnBackendBuilder {
        FnBackendBuilder::default()
    }

    /// Start a builder that inherits every operation of `parent`
    pub fn extending(parent: &FnBackend) -> FnBackendBuilder {
        FnBackendBuilder {
            handlers: parent.handlers.clone(),
        }
    }
}

impl fmt::Debug for FnBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBackend")
            .field("operations", &self.operations())
            .finish()
    }
}

#[async_trait]
impl Backend for FnBackend {
    fn operations(&self) -> OperationSet {
        self.handlers.keys().cloned().collect()
    }

    async fn invoke(&self, operation: &str, args: Args) -> BackendResult {
        let handler = self
            .handlers
            .get(operation)
            .ok_or_else(|| anyhow!("operation '{operation}' is not declared by this backend"))?;
        handler(args).await
    }

    fn supports(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }
}

/// Builder for [`FnBackend`]
#[derive(Default)]
pub struct FnBackendBuilder {
    handlers: HashMap<String, Handler>,
}

impl FnBackendBuilder {
    /// Declare `name`, replacing any inherited operation of the same name
    pub fn operation<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| handler(args).boxed());
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn build(self) -> FnBackend {
        FnBackend {
            handlers: self.handlers,
        }
    }
}

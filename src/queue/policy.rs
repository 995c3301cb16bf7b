//! Which secondary operations a schema buffers while queuing.

use crate::backend::OperationSet;

/// Buffering policy for one secondary backend
///
/// Operations outside an `Only` set bypass the queue and run against the
/// secondary immediately, even while the schema is queuing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueuePolicy {
    #[default]
    All,
    Only(OperationSet),
}

impl QueuePolicy {
    pub fn only<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(operations.into_iter().collect())
    }

    pub fn buffers(&self, operation: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(operations) => operations.contains(operation),
        }
    }
}

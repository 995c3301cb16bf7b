//! # Backend Registry
//!
//! Name → backend mapping owned by whichever component composes a schema.
//! Registration happens during setup; once a schema is built the registry is
//! frozen behind an `Arc` and only read.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::Backend;

/// Backends registered for one schema, in registration order
#[derive(Clone, Default)]
pub struct BackendRegistry {
    entries: Vec<(String, Arc<dyn Backend>)>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under `name`
    ///
    /// Re-registering a name replaces the previous backend in place; the return
    /// value says whether a replacement happened.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> bool {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            debug!(backend = %name, "Replacing registered backend");
            slot.1 = backend;
            return true;
        }

        debug!(backend = %name, operations = %backend.operations(), "Registered backend");
        self.entries.push((name, backend));
        false
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, backend)| backend)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Backend>)> {
        self.entries
            .iter()
            .map(|(name, backend)| (name.as_str(), backend))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

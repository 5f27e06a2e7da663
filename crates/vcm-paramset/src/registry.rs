//! The ParamSet registry
//!
//! One process-wide table of registered parameter bundles, keyed by content
//! hash with a name index on top. Registration is idempotent; a name can
//! never silently move to different content.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::hash::HashError;
use crate::paramset::{canonical_hash, ParamContent, ParamSet, ParamSetId};

/// Errors surfaced by [`ParamSetRegistry`] operations
#[derive(Debug, thiserror::Error)]
pub enum ParamSetError {
    /// Name already bound to different content
    #[error("paramset name '{name}' is already bound to {existing}, refusing to rebind to {offered}")]
    Conflict {
        name: String,
        existing: ParamSetId,
        offered: ParamSetId,
    },

    /// No ParamSet registered under this id
    #[error("paramset {0} not found")]
    NotFound(ParamSetId),

    /// No ParamSet registered under this name
    #[error("paramset name '{0}' not found")]
    NameNotFound(String),

    /// Content could not be canonically encoded
    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<ParamSetId, Arc<ParamSet>>,
    by_name: HashMap<String, ParamSetId>,
}

/// Thread-safe registry of immutable parameter bundles
///
/// # Semantics
///
/// - `register` with a name already bound to the same content hash is a
///   no-op returning the existing id.
/// - `register` with a name bound to *different* content fails with
///   [`ParamSetError::Conflict`]; names never rebind.
/// - The same content may be registered under several names; all of them
///   resolve to one id, and the stored record keeps the name it was first
///   registered under.
#[derive(Default)]
pub struct ParamSetRegistry {
    inner: RwLock<RegistryInner>,
}

impl ParamSetRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter bundle, returning its content-addressed id
    ///
    /// # Errors
    /// Returns [`ParamSetError::Conflict`] if `name` is already bound to
    /// different content, or a hash error if the content cannot be encoded.
    pub fn register(
        &self,
        name: &str,
        version: u32,
        description: &str,
        content: ParamContent,
    ) -> Result<ParamSetId, ParamSetError> {
        let id = ParamSetId::new(canonical_hash(&content)?);

        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_name.get(name) {
            if *existing == id {
                tracing::debug!("paramset '{}' re-registered, no-op ({})", name, id.short());
                return Ok(id);
            }
            return Err(ParamSetError::Conflict {
                name: name.to_string(),
                existing: *existing,
                offered: id,
            });
        }

        if !inner.by_id.contains_key(&id) {
            let set = ParamSet::new(name, version, description, content)?;
            inner.by_id.insert(id, Arc::new(set));
        }
        inner.by_name.insert(name.to_string(), id);
        tracing::info!("registered paramset '{}' as {}", name, id.short());
        Ok(id)
    }

    /// Fetch a registered bundle by id
    ///
    /// # Errors
    /// Returns [`ParamSetError::NotFound`] if the id is unknown.
    pub fn get(&self, id: ParamSetId) -> Result<Arc<ParamSet>, ParamSetError> {
        self.inner
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(ParamSetError::NotFound(id))
    }

    /// Fetch a registered bundle by name
    ///
    /// # Errors
    /// Returns [`ParamSetError::NameNotFound`] if the name is unknown.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<ParamSet>, ParamSetError> {
        let inner = self.inner.read();
        let id = inner
            .by_name
            .get(name)
            .ok_or_else(|| ParamSetError::NameNotFound(name.to_string()))?;
        inner
            .by_id
            .get(id)
            .cloned()
            .ok_or(ParamSetError::NotFound(*id))
    }

    /// Whether an id is registered
    #[must_use]
    pub fn contains(&self, id: ParamSetId) -> bool {
        self.inner.read().by_id.contains_key(&id)
    }

    /// Number of distinct content hashes registered
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}

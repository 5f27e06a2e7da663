//! Immutable, content-addressed parameter bundles
//!
//! A [`ParamSet`] captures everything a segmentation run is parameterised
//! by. Its identity is a hash of the content, so two bundles with the same
//! parameters are the same ParamSet no matter who registered them or in
//! which order the keys were assembled.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::hash::{HashError, ParamHash};

/// Parameter content: string keys to arbitrary JSON values
///
/// `BTreeMap` keeps iteration (and therefore the canonical encoding) sorted
/// by key at the top level; nested objects inside `serde_json::Value` are
/// also key-sorted, which makes the encoding insertion-order independent at
/// every depth.
pub type ParamContent = BTreeMap<String, serde_json::Value>;

/// Compute the content-addressed identity of a parameter bundle
///
/// # Errors
/// Returns error if the content cannot be serialized to JSON
pub fn canonical_hash(content: &ParamContent) -> Result<ParamHash, HashError> {
    ParamHash::compute_serializable(content)
}

/// Identity of a registered [`ParamSet`]
///
/// A thin wrapper around the content hash. Equal ids imply byte-identical
/// canonical content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParamSetId(ParamHash);

impl ParamSetId {
    /// Wrap a content hash as a ParamSet id
    #[inline]
    #[must_use]
    pub const fn new(hash: ParamHash) -> Self {
        Self(hash)
    }

    /// The underlying content hash
    #[inline]
    #[must_use]
    pub const fn hash(&self) -> &ParamHash {
        &self.0
    }

    /// Short string representation for logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl Display for ParamSetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// An immutable, registered parameter bundle
///
/// Constructed by [`ParamSetRegistry::register`](crate::ParamSetRegistry::register)
/// and handed out behind `Arc`; fields are private so a registered bundle
/// can never be mutated in place. Serialize-only: rebuilding one goes back
/// through the registry so the id always matches the content.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSet {
    name: String,
    version: u32,
    description: String,
    content: ParamContent,
    id: ParamSetId,
}

impl ParamSet {
    pub(crate) fn new(
        name: impl Into<String>,
        version: u32,
        description: impl Into<String>,
        content: ParamContent,
    ) -> Result<Self, HashError> {
        let id = ParamSetId::new(canonical_hash(&content)?);
        Ok(Self {
            name: name.into(),
            version,
            description: description.into(),
            content,
            id,
        })
    }

    /// The name this bundle was first registered under
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller-supplied version tag
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Free-form description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The parameter key/value content
    #[inline]
    #[must_use]
    pub const fn content(&self) -> &ParamContent {
        &self.content
    }

    /// Content-addressed identity
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ParamSetId {
        self.id
    }

    /// Look up a single parameter value by key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.content.get(key)
    }
}

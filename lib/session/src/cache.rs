//! In-memory profile cache keyed by identity.
//!
//! Avoids re-reading profiles already resolved during this runtime. The cache
//! is purged on sign-out so a second user on a shared device never sees the
//! previous user's data.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use workincz_core::Identity;

use crate::profile::{Profile, ProfilePatch};

/// Shared profile cache. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    entries: Arc<RwLock<HashMap<Identity, Profile>>>,
}

impl SessionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached profile for an identity.
    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<Profile> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Inserts or overwrites the profile for an identity.
    pub fn put(&self, identity: Identity, profile: Profile) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, profile);
    }

    /// Shallow-merges a patch into an existing entry.
    ///
    /// Returns `false` without inserting anything when no entry exists;
    /// callers must `put` before they `merge`.
    pub fn merge(&self, identity: &Identity, patch: &ProfilePatch) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(identity) {
            Some(profile) => {
                profile.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Removes a single entry.
    pub fn remove(&self, identity: &Identity) -> Option<Profile> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
    }

    /// Purges every cached profile.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let purged = entries.len();
        entries.clear();
        tracing::debug!(purged, "session cache cleared");
    }

    /// Returns the number of cached profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

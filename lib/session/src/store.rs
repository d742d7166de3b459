//! Profile backing store seam.

use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use workincz_core::Identity;

use crate::error::ProfileStoreError;
use crate::profile::Profile;

/// Remote store holding one profile per identity.
///
/// A failed `read` is a transient condition and must never be taken to mean
/// that the user has no profile; that is what `Ok(None)` is for.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Reads the profile for an identity.
    async fn read(&self, identity: &Identity) -> Result<Option<Profile>, Report<ProfileStoreError>>;

    /// Creates or replaces the profile for its identity.
    async fn write(&self, profile: &Profile) -> Result<(), Report<ProfileStoreError>>;
}

/// Profile store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<RwLock<HashMap<Identity, Profile>>>,
}

impl MemoryProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with profiles.
    #[must_use]
    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.identity().clone(), p))
            .collect();
        Self {
            profiles: Arc::new(RwLock::new(profiles)),
        }
    }

    /// Returns the stored profile without going through the async seam.
    #[must_use]
    pub fn snapshot(&self, identity: &Identity) -> Option<Profile> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn read(&self, identity: &Identity) -> Result<Option<Profile>, Report<ProfileStoreError>> {
        Ok(self.snapshot(identity))
    }

    async fn write(&self, profile: &Profile) -> Result<(), Report<ProfileStoreError>> {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.identity().clone(), profile.clone());
        Ok(())
    }
}

//! The current session and the auth state exposed to subscribers.
//!
//! A session pairs the signed-in [`Identity`] with its [`Profile`]. The
//! profile half may be absent when loading it failed; consumers must treat
//! that as "signed in, details unknown" rather than as signed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use workincz_core::Identity;

use crate::profile::Profile;
use crate::role::{Capability, Role};

/// The active (Identity, Profile) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    identity: Identity,
    profile: Option<Profile>,
    signed_in_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for an identity whose profile may not be loaded.
    #[must_use]
    pub fn new(identity: Identity, profile: Option<Profile>) -> Self {
        Self {
            identity,
            profile,
            signed_in_at: Utc::now(),
        }
    }

    /// Returns the signed-in identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the profile, or `None` if it could not be loaded.
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Returns true when the profile is missing.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.profile.is_none()
    }

    /// Returns the role, if the profile is known.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(Profile::role)
    }

    /// Returns true if the profile is known and holds the capability.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.profile.as_ref().is_some_and(|p| p.can(capability))
    }

    /// Returns when the session was established.
    #[must_use]
    pub fn signed_in_at(&self) -> DateTime<Utc> {
        self.signed_in_at
    }

    pub(crate) fn replace_profile(&mut self, profile: Option<Profile>) {
        self.profile = profile;
    }
}

/// Settled authentication state delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// Nobody is signed in.
    SignedOut,
    /// A session is active.
    SignedIn(Session),
}

impl AuthState {
    /// Returns the session, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedOut => None,
            Self::SignedIn(session) => Some(session),
        }
    }

    /// Returns the signed-in identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.session().map(Session::identity)
    }

    /// Returns true if a session is active.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn(_))
    }
}

impl From<Option<Session>> for AuthState {
    fn from(session: Option<Session>) -> Self {
        session.map_or(Self::SignedOut, Self::SignedIn)
    }
}

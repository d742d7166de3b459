//! Error types for the session crate.
//!
//! Errors are wrapped in `rootcause::Report` as they propagate:
//! - `SessionError`: failures surfaced by session operations
//! - `AuthorizationError`: capability checks against the current session
//! - `ProfileStoreError`: failures of the profile backing store
//! - `StorageError`: failures of durable client storage
//! - `DispatchError`: failures raised by deferred-action handlers
//!
//! Only `SessionError` and `AuthorizationError` reach callers. The others are
//! logged where they occur and degrade to "no change".

use std::fmt;
use workincz_core::Identity;

use crate::role::Capability;

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session is active.
    NotAuthenticated,
    /// The session is active but its profile could not be loaded.
    ProfileUnavailable { identity: Identity },
    /// Writing the profile to the backing store failed.
    ProfileWriteFailed { identity: Identity, reason: String },
    /// No deferred-action envelope was configured.
    DeferralUnavailable,
    /// Capturing a deferred action failed.
    DeferralFailed { reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::ProfileUnavailable { identity } => {
                write!(f, "profile for {identity} is not loaded")
            }
            Self::ProfileWriteFailed { identity, reason } => {
                write!(f, "failed to write profile for {identity}: {reason}")
            }
            Self::DeferralUnavailable => write!(f, "deferred actions are not enabled"),
            Self::DeferralFailed { reason } => {
                write!(f, "failed to capture deferred action: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from capability checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// Nobody is signed in.
    NotAuthenticated,
    /// The signed-in profile lacks the capability, or is not loaded.
    MissingCapability {
        identity: Identity,
        capability: Capability,
    },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "user is not authenticated"),
            Self::MissingCapability {
                identity,
                capability,
            } => {
                write!(f, "user {identity} lacks capability {capability}")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from the profile backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// The store could not be reached. Retrying later may succeed.
    Unavailable { reason: String },
    /// The stored record could not be decoded.
    Corrupt { identity: Identity, reason: String },
    /// The store rejected the write.
    Rejected { identity: Identity, reason: String },
}

impl fmt::Display for ProfileStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "profile store unavailable: {reason}"),
            Self::Corrupt { identity, reason } => {
                write!(f, "stored profile for {identity} is corrupt: {reason}")
            }
            Self::Rejected { identity, reason } => {
                write!(f, "profile write for {identity} rejected: {reason}")
            }
        }
    }
}

impl std::error::Error for ProfileStoreError {}

/// Errors from durable client storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The key cannot be mapped onto the storage medium.
    InvalidKey { key: String },
    /// Reading a value failed.
    ReadFailed { key: String, reason: String },
    /// Writing a value failed.
    WriteFailed { key: String, reason: String },
    /// Removing a value failed.
    RemoveFailed { key: String, reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey { key } => write!(f, "invalid storage key: {key:?}"),
            Self::ReadFailed { key, reason } => write!(f, "failed to read '{key}': {reason}"),
            Self::WriteFailed { key, reason } => write!(f, "failed to write '{key}': {reason}"),
            Self::RemoveFailed { key, reason } => {
                write!(f, "failed to remove '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Errors raised by deferred-action handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The target of the action no longer accepts it (closed listing, blocked user).
    TargetUnavailable { reason: String },
    /// The handler failed for another reason.
    HandlerFailed { reason: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetUnavailable { reason } => write!(f, "action target unavailable: {reason}"),
            Self::HandlerFailed { reason } => write!(f, "action handler failed: {reason}"),
        }
    }
}

impl std::error::Error for DispatchError {}

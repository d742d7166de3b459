//! Authentication session core for WorkInCZ.
//!
//! This crate provides:
//! - The auth state machine (`AuthService`) that debounces identity-provider
//!   events and publishes settled `AuthState`s
//! - A profile cache (`SessionCache`) purged on sign-out
//! - Deferred actions (`DeferredActions`) captured while signed out and
//!   replayed once after sign-in
//! - Roles and capabilities (`Role`, `Capability`, `CapabilitySet`)
//! - Seams for the profile store and durable client storage
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use workincz_core::Identity;
//! use workincz_session::{AuthService, MemoryProfileStore, Profile, Role};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryProfileStore::with_profiles([
//!     Profile::new(Identity::new("uid_1")).with_role(Role::Employer),
//! ]));
//! let auth = AuthService::builder(store).start();
//!
//! auth.subscribe(|state| println!("signed in: {}", state.is_signed_in()));
//! auth.on_raw_state_change(Some(Identity::new("uid_1")));
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod deferred;
pub mod envelope;
pub mod error;
pub mod profile;
pub mod role;
pub mod session;
pub mod storage;
pub mod store;
pub mod subscriber;

// Re-export main types at crate root
pub use auth::{AuthService, AuthServiceBuilder};
pub use cache::SessionCache;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use debounce::Debouncer;
pub use deferred::{
    Acknowledger, ActionHandler, ActionKind, Attempt, DeferredAction, DeferredActions,
    PendingAction, ResumeOutcome, TracingAcknowledger,
};
pub use error::{
    AuthorizationError, DispatchError, ProfileStoreError, SessionError, StorageError,
};
pub use profile::{Profile, ProfilePatch};
pub use role::{Capability, CapabilitySet, Role, UnknownRole};
pub use session::{AuthState, Session};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use store::{MemoryProfileStore, ProfileStore};
pub use subscriber::SubscriberRegistry;

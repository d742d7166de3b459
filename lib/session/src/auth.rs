//! The auth state machine: single source of truth for who is signed in.
//!
//! Raw identity-provider events are debounced, enriched with the cached or
//! freshly loaded profile, and fanned out to subscribers as settled
//! [`AuthState`]s. After each settled sign-in the pending deferred action, if
//! any, is replayed.
//!
//! Ordering within one settle:
//! - sign-in: cache write, then current-session update, then notify, then resume
//! - sign-out: cache purge, then current-session clear, then notify
//!
//! Settles and profile replacements are applied one at a time on the settle
//! task, so every notification follows the mutation it reports and a stale
//! profile can never be announced after sign-out. Deferred actions resume on
//! their own task and never hold up the next settle.

use rootcause::prelude::Report;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot};
use workincz_core::{Identity, SubscriberId};

use crate::cache::SessionCache;
use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::deferred::{Attempt, DeferredAction, DeferredActions};
use crate::error::{AuthorizationError, SessionError};
use crate::profile::{Profile, ProfilePatch};
use crate::role::Capability;
use crate::session::{AuthState, Session};
use crate::store::ProfileStore;
use crate::subscriber::{self, Callback, SubscriberRegistry};

/// Handle to the running auth state machine.
///
/// Clones share the same state. When the last handle is dropped the
/// background tasks finish processing pending events and stop.
#[derive(Clone)]
pub struct AuthService {
    shared: Arc<Shared>,
    events: Debouncer<Option<Identity>>,
    updates: mpsc::UnboundedSender<ProfileUpdate>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("signed_in", &self.current_state().identity())
            .field("cached_profiles", &self.shared.cache.len())
            .field("subscribers", &self.shared.subscribers.len())
            .finish_non_exhaustive()
    }
}

struct Shared {
    store: Arc<dyn ProfileStore>,
    cache: SessionCache,
    current: RwLock<Option<Session>>,
    subscribers: SubscriberRegistry,
    deferred: Option<Arc<DeferredActions>>,
}

/// A profile replacement applied on the settle task.
struct ProfileUpdate {
    identity: Identity,
    profile: Profile,
    reply: Option<oneshot::Sender<Option<Session>>>,
}

/// Builder for [`AuthService`].
pub struct AuthServiceBuilder {
    store: Arc<dyn ProfileStore>,
    config: SessionConfig,
    deferred: Option<Arc<DeferredActions>>,
}

impl AuthServiceBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables deferred-action resumption after sign-in.
    #[must_use]
    pub fn deferred(mut self, deferred: Arc<DeferredActions>) -> Self {
        self.deferred = Some(deferred);
        self
    }

    /// Starts the state machine in the `SignedOut` state.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(self) -> AuthService {
        let shared = Arc::new(Shared {
            store: self.store,
            cache: SessionCache::new(),
            current: RwLock::new(None),
            subscribers: SubscriberRegistry::new(),
            deferred: self.deferred,
        });
        let (events, settled) = Debouncer::spawn(self.config.debounce_window());
        let (updates, pending_updates) = mpsc::unbounded_channel();
        tokio::spawn(settle_loop(Arc::clone(&shared), settled, pending_updates));
        tracing::debug!(window = ?self.config.debounce_window(), "auth state machine started");
        AuthService {
            shared,
            events,
            updates,
        }
    }
}

impl AuthService {
    /// Creates a builder over the given profile store.
    #[must_use]
    pub fn builder(store: Arc<dyn ProfileStore>) -> AuthServiceBuilder {
        AuthServiceBuilder {
            store,
            config: SessionConfig::default(),
            deferred: None,
        }
    }

    /// Feeds a raw identity-provider event.
    ///
    /// Events arriving within the debounce window collapse to the last one.
    pub fn on_raw_state_change(&self, identity: Option<Identity>) {
        if !self.events.push(identity) {
            tracing::warn!("auth state machine stopped; dropping provider event");
        }
    }

    /// Returns the active session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.shared.current()
    }

    /// Returns the settled state.
    #[must_use]
    pub fn current_state(&self) -> AuthState {
        AuthState::from(self.shared.current())
    }

    /// Registers a callback for settled transitions.
    ///
    /// The callback is invoked once right away, before this returns, with the
    /// current state, so a late subscriber never misses an existing sign-in.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let id = self.shared.subscribers.insert(Arc::clone(&callback));
        subscriber::invoke(id, &callback, &self.current_state());
        id
    }

    /// Removes a callback. Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.shared.subscribers.unsubscribe(id)
    }

    /// Returns the profile cache.
    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.shared.cache
    }

    /// Returns the deferred-action envelope, if resumption is enabled.
    #[must_use]
    pub fn deferred(&self) -> Option<&Arc<DeferredActions>> {
        self.shared.deferred.as_ref()
    }

    /// Checks that the current session may use a capability.
    ///
    /// # Errors
    ///
    /// Returns an error when signed out, or when the profile is missing or
    /// lacks the capability.
    pub fn require(&self, capability: Capability) -> Result<Session, Report<AuthorizationError>> {
        let session = self
            .current_session()
            .ok_or(AuthorizationError::NotAuthenticated)?;
        if session.can(capability) {
            Ok(session)
        } else {
            Err(AuthorizationError::MissingCapability {
                identity: session.identity().clone(),
                capability,
            }
            .into())
        }
    }

    /// Performs an action now if signed in, or captures it for after sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if resumption is not enabled, or if the intent could
    /// not be captured.
    pub async fn attempt(&self, action: DeferredAction) -> Result<Attempt, Report<SessionError>> {
        let deferred = self
            .shared
            .deferred
            .as_ref()
            .ok_or(SessionError::DeferralUnavailable)?;

        if let Some(session) = self.current_session() {
            return Ok(Attempt::Performed(deferred.perform(&session, action).await));
        }

        let id = deferred
            .capture(action)
            .await
            .map_err(|e| SessionError::DeferralFailed {
                reason: e.to_string(),
            })?;
        Ok(Attempt::Deferred(id))
    }

    /// Re-reads the current profile from the store.
    ///
    /// Subscribers are notified if the profile changed. A failed read keeps
    /// the prior state. Returns the session after the refresh.
    pub async fn refresh_profile(&self) -> Option<Session> {
        let identity = self.current_session()?.identity().clone();
        match self.shared.store.read(&identity).await {
            Ok(Some(profile)) => self.install_profile(identity, profile).await,
            Ok(None) => {
                tracing::warn!(%identity, "profile missing on refresh; keeping cached state");
                self.current_session()
            }
            Err(error) => {
                tracing::warn!(%identity, %error, "profile refresh failed; keeping prior state");
                self.current_session()
            }
        }
    }

    /// Edits the current profile and writes it through to the store.
    ///
    /// # Errors
    ///
    /// Returns an error when signed out, when the profile is not loaded, or
    /// when the store rejects the write. The cache is left untouched on error.
    /// If the session ends while the write is in flight, the written profile
    /// is not installed and `NotAuthenticated` is returned.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Profile, Report<SessionError>> {
        let session = self
            .current_session()
            .ok_or(SessionError::NotAuthenticated)?;
        let identity = session.identity().clone();
        let mut profile =
            session
                .profile()
                .cloned()
                .ok_or_else(|| SessionError::ProfileUnavailable {
                    identity: identity.clone(),
                })?;

        profile.apply(&patch);
        self.shared
            .store
            .write(&profile)
            .await
            .map_err(|e| SessionError::ProfileWriteFailed {
                identity: identity.clone(),
                reason: e.to_string(),
            })?;

        self.install_profile(identity, profile.clone())
            .await
            .ok_or(SessionError::NotAuthenticated)?;
        Ok(profile)
    }

    /// Merges a partial update pushed by the backing store.
    ///
    /// Only cached profiles are updated. The session and subscribers catch
    /// up once the settle task applies the merged profile. Returns `false`
    /// when the identity was not cached.
    pub fn apply_remote_update(&self, identity: &Identity, patch: &ProfilePatch) -> bool {
        if !self.shared.cache.merge(identity, patch) {
            return false;
        }
        if let Some(profile) = self.shared.cache.get(identity) {
            self.send_update(ProfileUpdate {
                identity: identity.clone(),
                profile,
                reply: None,
            });
        }
        true
    }

    /// Installs a profile on the settle task, returning the updated session
    /// if `identity` is still signed in when it is applied.
    async fn install_profile(&self, identity: Identity, profile: Profile) -> Option<Session> {
        let (reply, installed) = oneshot::channel();
        self.send_update(ProfileUpdate {
            identity,
            profile,
            reply: Some(reply),
        });
        installed.await.ok().flatten()
    }

    fn send_update(&self, update: ProfileUpdate) {
        if self.updates.send(update).is_err() {
            tracing::warn!("auth state machine stopped; dropping profile update");
        }
    }
}

impl Shared {
    fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, session: Option<Session>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    async fn sign_in(&self, identity: Identity) {
        match self.current() {
            Some(existing) if existing.identity() == &identity => {
                if existing.is_partial() {
                    tracing::info!(%identity, "retrying profile load for partial session");
                    if let Some(profile) = self.load_profile(&identity).await {
                        self.replace_profile(&identity, profile);
                    }
                } else {
                    tracing::debug!(%identity, "identity unchanged; no transition");
                }
                return;
            }
            Some(existing) => {
                tracing::info!(
                    previous = %existing.identity(),
                    %identity,
                    "account switched without sign-out; purging cache"
                );
                self.cache.clear();
            }
            None => {}
        }

        let profile = self.load_profile(&identity).await;
        let session = Session::new(identity, profile);
        self.set_current(Some(session.clone()));
        tracing::info!(
            identity = %session.identity(),
            partial = session.is_partial(),
            "signed in"
        );

        self.subscribers
            .notify_all(&AuthState::SignedIn(session.clone()));

        if let Some(deferred) = &self.deferred {
            let deferred = Arc::clone(deferred);
            tokio::spawn(async move {
                let outcome = deferred.try_resume(&session).await;
                tracing::debug!(?outcome, "deferred action resumption finished");
            });
        }
    }

    fn sign_out(&self) {
        let Some(previous) = self.current() else {
            tracing::debug!("already signed out; no transition");
            return;
        };

        self.cache.clear();
        self.set_current(None);
        tracing::info!(identity = %previous.identity(), "signed out");
        self.subscribers.notify_all(&AuthState::SignedOut);
    }

    async fn load_profile(&self, identity: &Identity) -> Option<Profile> {
        if let Some(profile) = self.cache.get(identity) {
            return Some(profile);
        }

        match self.store.read(identity).await {
            Ok(Some(profile)) => {
                self.cache.put(identity.clone(), profile.clone());
                Some(profile)
            }
            Ok(None) => {
                let profile = Profile::new(identity.clone());
                if let Err(error) = self.store.write(&profile).await {
                    tracing::warn!(%identity, %error, "failed to persist new profile");
                } else {
                    tracing::info!(%identity, "created profile on first sign-in");
                }
                self.cache.put(identity.clone(), profile.clone());
                Some(profile)
            }
            Err(error) => {
                tracing::warn!(
                    %identity,
                    %error,
                    "profile load failed; continuing with partial session"
                );
                None
            }
        }
    }

    fn install(&self, update: ProfileUpdate) {
        let session = self.replace_profile(&update.identity, update.profile);
        if session.is_none() {
            tracing::debug!(identity = %update.identity, "session changed; profile update dropped");
        }
        if let Some(reply) = update.reply {
            // The caller may have given up waiting.
            let _ = reply.send(session);
        }
    }

    /// Installs a new profile for the identity if it is still current.
    ///
    /// Only called from the settle task.
    fn replace_profile(&self, identity: &Identity, profile: Profile) -> Option<Session> {
        let (session, changed) = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let session = current.as_mut().filter(|s| s.identity() == identity)?;
            let changed = session.profile() != Some(&profile);
            self.cache.put(identity.clone(), profile.clone());
            session.replace_profile(Some(profile));
            (session.clone(), changed)
        };

        if changed {
            self.subscribers
                .notify_all(&AuthState::SignedIn(session.clone()));
        }
        Some(session)
    }
}

async fn settle_loop(
    shared: Arc<Shared>,
    mut settled: mpsc::UnboundedReceiver<Option<Identity>>,
    mut updates: mpsc::UnboundedReceiver<ProfileUpdate>,
) {
    loop {
        tokio::select! {
            biased;
            event = settled.recv() => match event {
                Some(Some(identity)) => shared.sign_in(identity).await,
                Some(None) => shared.sign_out(),
                None => break,
            },
            Some(update) = updates.recv() => shared.install(update),
        }
    }
    tracing::debug!("auth settle loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::{ActionHandler, ActionKind, ResumeOutcome};
    use crate::error::{DispatchError, ProfileStoreError};
    use crate::role::Role;
    use crate::storage::{DurableStorage, MemoryStorage};
    use crate::store::MemoryProfileStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use workincz_core::JobId;

    /// Store that fails every call while `failing` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryProfileStore,
        failing: AtomicBool,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ProfileStore for FlakyStore {
        async fn read(
            &self,
            identity: &Identity,
        ) -> Result<Option<Profile>, Report<ProfileStoreError>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProfileStoreError::Unavailable {
                    reason: "network".to_string(),
                }
                .into());
            }
            self.inner.read(identity).await
        }

        async fn write(&self, profile: &Profile) -> Result<(), Report<ProfileStoreError>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProfileStoreError::Unavailable {
                    reason: "network".to_string(),
                }
                .into());
            }
            self.inner.write(profile).await
        }
    }

    /// Store whose writes wait for a release while `gated` is set.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryProfileStore,
        gated: AtomicBool,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ProfileStore for GatedStore {
        async fn read(
            &self,
            identity: &Identity,
        ) -> Result<Option<Profile>, Report<ProfileStoreError>> {
            self.inner.read(identity).await
        }

        async fn write(&self, profile: &Profile) -> Result<(), Report<ProfileStoreError>> {
            if self.gated.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            self.inner.write(profile).await
        }
    }

    /// Handler that never completes.
    struct Stuck;

    #[async_trait]
    impl ActionHandler for Stuck {
        async fn handle(
            &self,
            _session: &Session,
            _action: DeferredAction,
        ) -> Result<(), Report<DispatchError>> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Identity, DeferredAction)>>,
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        async fn handle(
            &self,
            session: &Session,
            action: DeferredAction,
        ) -> Result<(), Report<DispatchError>> {
            self.calls
                .lock()
                .expect("calls")
                .push((session.identity().clone(), action));
            Ok(())
        }
    }

    type States = Arc<Mutex<Vec<AuthState>>>;

    fn record(service: &AuthService) -> States {
        let states: States = Arc::default();
        let sink = Arc::clone(&states);
        service.subscribe(move |state| sink.lock().expect("states").push(state.clone()));
        states
    }

    fn signed_in(states: &States) -> Vec<Identity> {
        states
            .lock()
            .expect("states")
            .iter()
            .filter_map(|s| s.identity().cloned())
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    fn alice() -> Identity {
        Identity::new("uid_alice")
    }

    fn bob() -> Identity {
        Identity::new("uid_bob")
    }

    fn seeded_store() -> Arc<MemoryProfileStore> {
        Arc::new(MemoryProfileStore::with_profiles([
            Profile::new(alice()).with_display_name("Alice"),
            Profile::new(bob()).with_role(Role::Employer),
        ]))
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_events_collapse_into_one_notification() {
        let service = AuthService::builder(seeded_store()).start();
        let states = record(&service);

        for _ in 0..5 {
            service.on_raw_state_change(Some(alice()));
        }
        settle().await;

        assert_eq!(signed_in(&states), vec![alice()]);
        let session = service.current_session().expect("session");
        assert_eq!(session.profile().and_then(Profile::display_name), Some("Alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_final_identity_survives_a_burst() {
        let service = AuthService::builder(seeded_store()).start();
        let states = record(&service);

        service.on_raw_state_change(Some(alice()));
        service.on_raw_state_change(None);
        service.on_raw_state_change(Some(bob()));
        settle().await;

        assert_eq!(signed_in(&states), vec![bob()]);
        assert!(service.cache().get(&alice()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscriber_receives_current_state_immediately() {
        let service = AuthService::builder(seeded_store()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;

        let states = record(&service);

        assert_eq!(signed_in(&states), vec![alice()]);
        assert_eq!(states.lock().expect("states").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_is_purged_before_sign_out_is_announced() {
        let service = AuthService::builder(seeded_store()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;
        assert!(service.cache().get(&alice()).is_some());

        let observed: Arc<Mutex<Vec<bool>>> = Arc::default();
        let sink = Arc::clone(&observed);
        let cache = service.cache().clone();
        service.subscribe(move |state| {
            if !state.is_signed_in() {
                let purged = cache.get(&alice()).is_none() && cache.is_empty();
                sink.lock().expect("observed").push(purged);
            }
        });

        service.on_raw_state_change(None);
        settle().await;

        assert_eq!(*observed.lock().expect("observed"), vec![true]);
        assert!(service.current_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_subscriber_does_not_starve_others() {
        let service = AuthService::builder(seeded_store()).start();
        let armed = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&armed);
        service.subscribe(move |_| {
            if trigger.load(Ordering::SeqCst) {
                panic!("widget failure");
            }
        });
        armed.store(true, Ordering::SeqCst);
        let states = record(&service);

        service.on_raw_state_change(Some(alice()));
        settle().await;

        assert_eq!(signed_in(&states), vec![alice()]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_identity_is_not_a_transition() {
        let store = Arc::new(FlakyStore::default());
        let service = AuthService::builder(store.clone()).start();
        let states = record(&service);

        service.on_raw_state_change(Some(alice()));
        settle().await;
        service.on_raw_state_change(Some(alice()));
        settle().await;

        assert_eq!(signed_in(&states), vec![alice()]);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_while_signed_out_is_silent() {
        let service = AuthService::builder(seeded_store()).start();
        let states = record(&service);

        service.on_raw_state_change(None);
        settle().await;

        assert_eq!(*states.lock().expect("states"), vec![AuthState::SignedOut]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_sign_in_creates_profile() {
        let store = Arc::new(MemoryProfileStore::new());
        let service = AuthService::builder(store.clone()).start();
        let carol = Identity::new("uid_carol");

        service.on_raw_state_change(Some(carol.clone()));
        settle().await;

        let stored = store.snapshot(&carol).expect("profile written");
        assert_eq!(stored.role(), Role::Jobseeker);
        assert_eq!(service.current_session().and_then(|s| s.role()), Some(Role::Jobseeker));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_load_failure_keeps_user_signed_in() {
        let store = Arc::new(FlakyStore::default());
        store
            .inner
            .write(&Profile::new(alice()).with_role(Role::Agency))
            .await
            .expect("seed");
        store.failing.store(true, Ordering::SeqCst);

        let service = AuthService::builder(store.clone()).start();
        let states = record(&service);
        service.on_raw_state_change(Some(alice()));
        settle().await;

        let session = service.current_session().expect("still signed in");
        assert!(session.is_partial());
        assert!(service.cache().is_empty());
        assert_eq!(signed_in(&states), vec![alice()]);

        store.failing.store(false, Ordering::SeqCst);
        let refreshed = service.refresh_profile().await.expect("session");

        assert_eq!(refreshed.role(), Some(Role::Agency));
        assert!(service.cache().get(&alice()).is_some());
        assert_eq!(signed_in(&states), vec![alice(), alice()]);
    }

    #[tokio::test(start_paused = true)]
    async fn reemitted_identity_retries_partial_profile() {
        let store = Arc::new(FlakyStore::default());
        store
            .inner
            .write(&Profile::new(alice()).with_role(Role::Agency))
            .await
            .expect("seed");
        store.failing.store(true, Ordering::SeqCst);

        let service = AuthService::builder(store.clone()).start();
        let states = record(&service);
        service.on_raw_state_change(Some(alice()));
        settle().await;
        assert!(service.current_session().expect("session").is_partial());

        store.failing.store(false, Ordering::SeqCst);
        service.on_raw_state_change(Some(alice()));
        settle().await;

        let session = service.current_session().expect("session");
        assert!(!session.is_partial());
        assert_eq!(session.role(), Some(Role::Agency));
        assert!(service.cache().get(&alice()).is_some());
        assert_eq!(signed_in(&states), vec![alice(), alice()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_handler_does_not_block_sign_out() {
        let deferred = Arc::new(DeferredActions::new(
            Arc::new(MemoryStorage::new()),
            &SessionConfig::default(),
        ));
        deferred.register(ActionKind::Apply, Arc::new(Stuck));
        let service = AuthService::builder(seeded_store()).deferred(deferred).start();

        let attempt = service
            .attempt(DeferredAction::Apply {
                job_id: JobId::new("job-42"),
            })
            .await
            .expect("attempt");
        assert!(matches!(attempt, Attempt::Deferred(_)));

        service.on_raw_state_change(Some(alice()));
        settle().await;
        assert!(service.current_session().is_some());

        service.on_raw_state_change(None);
        settle().await;

        assert!(service.current_session().is_none());
        assert!(service.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn profile_write_racing_sign_out_is_not_announced() {
        let store = Arc::new(GatedStore::default());
        let service = AuthService::builder(store.clone()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;
        let states = record(&service);

        store.gated.store(true, Ordering::SeqCst);
        let updating = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .update_profile(ProfilePatch::new().display_name("Alice N."))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        service.on_raw_state_change(None);
        settle().await;
        store.release.notify_one();

        let err = updating
            .await
            .expect("join")
            .expect_err("session ended mid-write");
        assert!(err.to_string().contains("not authenticated"));

        settle().await;
        assert!(service.current_session().is_none());
        assert!(service.cache().is_empty());
        assert_eq!(
            states.lock().expect("states").last(),
            Some(&AuthState::SignedOut)
        );
        assert_eq!(signed_in(&states), vec![alice()]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_keeps_prior_profile() {
        let store = Arc::new(FlakyStore::default());
        let service = AuthService::builder(store.clone()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;

        store.failing.store(true, Ordering::SeqCst);
        let session = service.refresh_profile().await.expect("session");

        assert!(!session.is_partial());
        assert!(service.cache().get(&alice()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_accounts_purges_previous_profile() {
        let service = AuthService::builder(seeded_store()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;

        service.on_raw_state_change(Some(bob()));
        settle().await;

        assert!(service.cache().get(&alice()).is_none());
        assert_eq!(service.current_session().and_then(|s| s.role()), Some(Role::Employer));
    }

    #[tokio::test(start_paused = true)]
    async fn update_profile_writes_through() {
        let store = seeded_store();
        let service = AuthService::builder(store.clone()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;
        let states = record(&service);

        let profile = service
            .update_profile(ProfilePatch::new().display_name("Alice N."))
            .await
            .expect("update");

        assert_eq!(profile.display_name(), Some("Alice N."));
        assert_eq!(
            store.snapshot(&alice()).and_then(|p| p.display_name().map(str::to_string)),
            Some("Alice N.".to_string())
        );
        assert_eq!(
            service.cache().get(&alice()).and_then(|p| p.display_name().map(str::to_string)),
            Some("Alice N.".to_string())
        );
        assert_eq!(signed_in(&states).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn update_profile_failure_leaves_cache_untouched() {
        let store = Arc::new(FlakyStore::default());
        let service = AuthService::builder(store.clone()).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;

        store.failing.store(true, Ordering::SeqCst);
        let err = service
            .update_profile(ProfilePatch::new().premium(true))
            .await
            .expect_err("write fails");

        assert!(err.to_string().contains("failed to write profile"));
        assert!(!service.cache().get(&alice()).expect("cached").is_premium());
    }

    #[tokio::test(start_paused = true)]
    async fn update_profile_requires_session() {
        let service = AuthService::builder(seeded_store()).start();
        let err = service
            .update_profile(ProfilePatch::new().premium(true))
            .await
            .expect_err("signed out");
        assert!(err.to_string().contains("not authenticated"));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_update_merges_into_session() {
        let service = AuthService::builder(seeded_store()).start();
        service.on_raw_state_change(Some(bob()));
        settle().await;

        assert!(service.require(Capability::FeaturedListings).is_err());
        assert!(service.apply_remote_update(&bob(), &ProfilePatch::new().premium(true)));
        assert!(!service.apply_remote_update(&alice(), &ProfilePatch::new().premium(true)));
        settle().await;

        let session = service.require(Capability::FeaturedListings).expect("premium");
        assert_eq!(session.identity(), &bob());
    }

    #[tokio::test(start_paused = true)]
    async fn require_checks_role_capabilities() {
        let service = AuthService::builder(seeded_store()).start();
        let err = service.require(Capability::PostJobs).expect_err("signed out");
        assert!(err.to_string().contains("not authenticated"));

        service.on_raw_state_change(Some(alice()));
        settle().await;

        assert!(service.require(Capability::ApplyToJobs).is_ok());
        let err = service.require(Capability::PostJobs).expect_err("jobseeker");
        assert!(err.to_string().contains("post_jobs"));
    }

    #[tokio::test(start_paused = true)]
    async fn soft_auth_apply_resumes_after_sign_in() {
        let storage = MemoryStorage::new();
        let config = SessionConfig::default();
        let deferred = Arc::new(DeferredActions::new(Arc::new(storage.clone()), &config));
        let recorder = Arc::new(Recorder::default());
        deferred.register(ActionKind::Apply, recorder.clone());

        let service = AuthService::builder(seeded_store())
            .config(config)
            .deferred(deferred)
            .start();

        let apply = DeferredAction::Apply {
            job_id: JobId::new("job-42"),
        };
        let attempt = service.attempt(apply.clone()).await.expect("attempt");
        assert!(matches!(attempt, Attempt::Deferred(_)));
        assert!(recorder.calls.lock().expect("calls").is_empty());

        tokio::time::sleep(Duration::from_secs(120)).await;
        service.on_raw_state_change(Some(alice()));
        settle().await;

        assert_eq!(*recorder.calls.lock().expect("calls"), vec![(alice(), apply)]);
        assert_eq!(storage.get("pendingAction").await.expect("get"), None);

        service.on_raw_state_change(None);
        settle().await;
        service.on_raw_state_change(Some(alice()));
        settle().await;
        assert_eq!(recorder.calls.lock().expect("calls").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_while_signed_in_dispatches_immediately() {
        let deferred = Arc::new(DeferredActions::new(
            Arc::new(MemoryStorage::new()),
            &SessionConfig::default(),
        ));
        let recorder = Arc::new(Recorder::default());
        deferred.register(ActionKind::Save, recorder.clone());
        let service = AuthService::builder(seeded_store()).deferred(deferred).start();
        service.on_raw_state_change(Some(alice()));
        settle().await;

        let attempt = service
            .attempt(DeferredAction::Save {
                job_id: JobId::new("job-9"),
            })
            .await
            .expect("attempt");

        assert_eq!(attempt, Attempt::Performed(ResumeOutcome::Dispatched(ActionKind::Save)));
        assert_eq!(recorder.calls.lock().expect("calls").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_without_envelope_is_an_error() {
        let service = AuthService::builder(seeded_store()).start();
        let err = service
            .attempt(DeferredAction::Save {
                job_id: JobId::new("job-9"),
            })
            .await
            .expect_err("no envelope");
        assert!(err.to_string().contains("deferred actions are not enabled"));
    }
}

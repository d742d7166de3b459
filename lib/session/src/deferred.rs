//! Soft-auth deferred actions.
//!
//! When a signed-out user attempts a privileged action (apply to a job,
//! message an employer, save a listing) the intent is captured in durable
//! storage instead of being refused. After the next settled sign-in the intent
//! is replayed through the handler its feature module registered.
//!
//! Only one intent is pending at a time: a second capture replaces the first.
//! Intents older than the expiry window are dropped unseen, because acting on
//! stale context (a listing that has since closed) would mislead the user.
//! Every resumption failure is logged and swallowed so that it can never
//! interfere with the sign-in itself.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use workincz_core::{ActionId, Identity, JobId};

use crate::config::SessionConfig;
use crate::envelope::{Envelope, RawEnvelope};
use crate::error::{DispatchError, StorageError};
use crate::role::{Capability, Role};
use crate::session::Session;
use crate::storage::DurableStorage;

/// Kind of a deferred action; the key of the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Apply,
    Message,
    Save,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apply => "apply",
            Self::Message => "message",
            Self::Save => "save",
        })
    }
}

/// A captured intent with its typed context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "context", rename_all = "snake_case")]
pub enum DeferredAction {
    /// Apply to a job listing.
    Apply { job_id: JobId },
    /// Open a conversation, optionally about a listing.
    Message {
        recipient: Identity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    /// Bookmark a job listing.
    Save { job_id: JobId },
}

impl DeferredAction {
    /// Returns the dispatch key.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Apply { .. } => ActionKind::Apply,
            Self::Message { .. } => ActionKind::Message,
            Self::Save { .. } => ActionKind::Save,
        }
    }

    /// Returns the capability a profile with `role` must hold to resume this.
    ///
    /// Hiring roles message candidates; everyone else messages employers.
    #[must_use]
    pub fn required_capability(&self, role: Role) -> Capability {
        match self {
            Self::Apply { .. } => Capability::ApplyToJobs,
            Self::Message { .. } if role.is_hiring() => Capability::MessageCandidates,
            Self::Message { .. } => Capability::MessageEmployers,
            Self::Save { .. } => Capability::SaveJobs,
        }
    }

    /// Returns the notice shown when the action resumes.
    #[must_use]
    pub fn acknowledgment(&self) -> &'static str {
        match self {
            Self::Apply { .. } => "Continuing your application",
            Self::Message { .. } => "Continuing your message",
            Self::Save { .. } => "Saving the listing you selected",
        }
    }
}

/// How far past `now`, in seconds, a capture time may lie before the value is
/// treated as corrupt.
pub const CLOCK_SKEW_TOLERANCE_SECONDS: i64 = 60;

/// A deferred action as persisted in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    id: ActionId,
    action: DeferredAction,
    captured_at: DateTime<Utc>,
}

impl PendingAction {
    /// Returns the capture handle.
    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Returns the captured intent.
    #[must_use]
    pub fn action(&self) -> &DeferredAction {
        &self.action
    }

    /// Returns when the intent was captured.
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns true once more than `window` has passed since capture.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.captured_at > window
    }

    /// Returns true if the capture time lies further in the future than
    /// [`CLOCK_SKEW_TOLERANCE_SECONDS`] allows.
    #[must_use]
    pub fn is_future_dated_at(&self, now: DateTime<Utc>) -> bool {
        self.captured_at - now > Duration::seconds(CLOCK_SKEW_TOLERANCE_SECONDS)
    }
}

/// Feature-module handler for one action kind.
///
/// The envelope guarantees at-most-once invocation per captured intent.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Performs the action on behalf of the signed-in session.
    async fn handle(
        &self,
        session: &Session,
        action: DeferredAction,
    ) -> Result<(), Report<DispatchError>>;
}

/// User-visible "continuing your action" notice.
pub trait Acknowledger: Send + Sync {
    fn acknowledge(&self, action: &DeferredAction, message: &str);
}

/// Acknowledger that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAcknowledger;

impl Acknowledger for TracingAcknowledger {
    fn acknowledge(&self, action: &DeferredAction, message: &str) {
        tracing::info!(kind = %action.kind(), notice = message, "resuming deferred action");
    }
}

/// What happened to the pending intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No intent was pending.
    Nothing,
    /// The stored value was unreadable or from another version and was dropped.
    Discarded,
    /// The intent was older than the expiry window and was dropped.
    Expired,
    /// The intent could not be removed from storage, so it was not replayed.
    Retained,
    /// No handler is registered for the kind; the intent was consumed.
    HandlerMissing(ActionKind),
    /// The signed-in profile may not perform the action; the intent was consumed.
    NotPermitted(ActionKind),
    /// The handler ran and failed.
    Failed(ActionKind),
    /// The handler ran and succeeded.
    Dispatched(ActionKind),
}

/// Result of attempting an action through [`AuthService::attempt`](crate::AuthService::attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// A session was active and the action was dispatched immediately.
    Performed(ResumeOutcome),
    /// Nobody was signed in; the intent was captured for later.
    Deferred(ActionId),
}

/// Capture, expiry and replay of the single pending intent.
pub struct DeferredActions {
    storage: Arc<dyn DurableStorage>,
    handlers: RwLock<HashMap<ActionKind, Arc<dyn ActionHandler>>>,
    acknowledger: Arc<dyn Acknowledger>,
    key: String,
    expiry: Duration,
    consuming: tokio::sync::Mutex<()>,
}

impl fmt::Debug for DeferredActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<ActionKind> = self.read_handlers().keys().copied().collect();
        f.debug_struct("DeferredActions")
            .field("key", &self.key)
            .field("expiry", &self.expiry)
            .field("handlers", &kinds)
            .finish_non_exhaustive()
    }
}

impl DeferredActions {
    /// Creates an envelope over the given storage.
    #[must_use]
    pub fn new(storage: Arc<dyn DurableStorage>, config: &SessionConfig) -> Self {
        Self {
            storage,
            handlers: RwLock::new(HashMap::new()),
            acknowledger: Arc::new(TracingAcknowledger),
            key: config.deferred_storage_key().to_string(),
            expiry: config.deferred_expiry(),
            consuming: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the acknowledger.
    #[must_use]
    pub fn with_acknowledger(mut self, acknowledger: Arc<dyn Acknowledger>) -> Self {
        self.acknowledger = acknowledger;
        self
    }

    /// Registers the handler for a kind, returning any handler it replaces.
    pub fn register(
        &self,
        kind: ActionKind,
        handler: Arc<dyn ActionHandler>,
    ) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, handler)
    }

    /// Removes the handler for a kind.
    pub fn unregister(&self, kind: ActionKind) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .is_some()
    }

    /// Captures an intent now, replacing any pending one.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent cannot be written to storage.
    pub async fn capture(&self, action: DeferredAction) -> Result<ActionId, Report<StorageError>> {
        self.capture_at(action, Utc::now()).await
    }

    /// Captures an intent with an explicit capture time.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent cannot be written to storage.
    pub async fn capture_at(
        &self,
        action: DeferredAction,
        captured_at: DateTime<Utc>,
    ) -> Result<ActionId, Report<StorageError>> {
        let pending = PendingAction {
            id: ActionId::new(),
            action,
            captured_at,
        };
        let json = Envelope::new(&pending)
            .to_json()
            .map_err(|e| StorageError::WriteFailed {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;

        self.storage.set(&self.key, &json).await?;
        tracing::info!(
            action_id = %pending.id,
            kind = %pending.action.kind(),
            "captured deferred action"
        );
        Ok(pending.id)
    }

    /// Returns the pending intent without consuming it.
    ///
    /// Expired, corrupt and unreadable values read as `None`.
    pub async fn pending(&self) -> Option<PendingAction> {
        let raw = self.storage.get(&self.key).await.ok()??;
        let now = Utc::now();
        decode(&raw).filter(|p| !p.is_expired_at(now, self.expiry) && !p.is_future_dated_at(now))
    }

    /// Drops the pending intent, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if storage refuses the removal.
    pub async fn discard(&self) -> Result<(), Report<StorageError>> {
        self.storage.remove(&self.key).await
    }

    /// Replays the pending intent for a freshly signed-in session.
    pub async fn try_resume(&self, session: &Session) -> ResumeOutcome {
        self.try_resume_at(session, Utc::now()).await
    }

    /// Replays the pending intent, judging expiry against `now`.
    pub async fn try_resume_at(&self, session: &Session, now: DateTime<Utc>) -> ResumeOutcome {
        match self.take_at(now).await {
            Ok(pending) => self.perform(session, pending.action).await,
            Err(outcome) => outcome,
        }
    }

    /// Reads and consumes the pending intent.
    ///
    /// Concurrent callers are serialized, so at most one of them obtains it.
    async fn take_at(&self, now: DateTime<Utc>) -> Result<PendingAction, ResumeOutcome> {
        let _consuming = self.consuming.lock().await;
        let raw = match self.storage.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(ResumeOutcome::Nothing),
            Err(error) => {
                tracing::warn!(%error, "failed to read pending action");
                return Err(ResumeOutcome::Nothing);
            }
        };

        let Some(pending) = decode(&raw) else {
            tracing::warn!(key = %self.key, "discarding unreadable pending action");
            self.remove_quietly().await;
            return Err(ResumeOutcome::Discarded);
        };

        if pending.is_future_dated_at(now) {
            tracing::warn!(
                action_id = %pending.id,
                captured_at = %pending.captured_at,
                "discarding future-dated pending action"
            );
            self.remove_quietly().await;
            return Err(ResumeOutcome::Discarded);
        }

        if pending.is_expired_at(now, self.expiry) {
            tracing::info!(
                action_id = %pending.id,
                kind = %pending.action.kind(),
                captured_at = %pending.captured_at,
                "discarding expired deferred action"
            );
            self.remove_quietly().await;
            return Err(ResumeOutcome::Expired);
        }

        // Consume before dispatch so a crash mid-handler cannot replay it.
        if let Err(error) = self.storage.remove(&self.key).await {
            tracing::warn!(%error, action_id = %pending.id, "could not consume pending action");
            return Err(ResumeOutcome::Retained);
        }

        Ok(pending)
    }

    /// Dispatches an action for an active session through the handler table.
    pub async fn perform(&self, session: &Session, action: DeferredAction) -> ResumeOutcome {
        let kind = action.kind();
        let Some(handler) = self.handler_for(kind) else {
            tracing::warn!(%kind, "no handler registered for deferred action");
            return ResumeOutcome::HandlerMissing(kind);
        };

        if let Some(profile) = session.profile() {
            let capability = action.required_capability(profile.role());
            if !profile.can(capability) {
                tracing::info!(
                    %kind,
                    %capability,
                    identity = %session.identity(),
                    "signed-in profile may not perform deferred action"
                );
                return ResumeOutcome::NotPermitted(kind);
            }
        }

        self.acknowledger.acknowledge(&action, action.acknowledgment());

        match AssertUnwindSafe(handler.handle(session, action))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {
                tracing::info!(%kind, identity = %session.identity(), "deferred action dispatched");
                ResumeOutcome::Dispatched(kind)
            }
            Ok(Err(error)) => {
                tracing::warn!(%kind, %error, "deferred action handler failed");
                ResumeOutcome::Failed(kind)
            }
            Err(_) => {
                tracing::error!(%kind, "deferred action handler panicked");
                ResumeOutcome::Failed(kind)
            }
        }
    }

    fn handler_for(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.read_handlers().get(&kind).cloned()
    }

    fn read_handlers(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ActionKind, Arc<dyn ActionHandler>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn remove_quietly(&self) {
        if let Err(error) = self.storage.remove(&self.key).await {
            tracing::warn!(%error, "failed to remove pending action");
        }
    }
}

fn decode(raw: &str) -> Option<PendingAction> {
    let envelope = RawEnvelope::from_json(raw).ok()?;
    if !envelope.is_current_version() {
        return None;
    }
    envelope
        .decode::<PendingAction>()
        .ok()
        .map(Envelope::into_payload)
}

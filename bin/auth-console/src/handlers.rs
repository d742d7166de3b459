//! Deferred-action handlers for the console.
//!
//! The console has no marketplace backend; handlers log the action they
//! would perform.

use async_trait::async_trait;
use rootcause::prelude::Report;
use std::sync::Arc;
use workincz_session::{
    ActionHandler, ActionKind, DeferredAction, DeferredActions, DispatchError, Session,
};

/// Handler that records the action in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl ActionHandler for LoggingHandler {
    async fn handle(
        &self,
        session: &Session,
        action: DeferredAction,
    ) -> Result<(), Report<DispatchError>> {
        match &action {
            DeferredAction::Apply { job_id } => {
                tracing::info!(identity = %session.identity(), %job_id, "application submitted");
            }
            DeferredAction::Message { recipient, job_id } => {
                tracing::info!(
                    identity = %session.identity(),
                    %recipient,
                    ?job_id,
                    "conversation opened"
                );
            }
            DeferredAction::Save { job_id } => {
                tracing::info!(identity = %session.identity(), %job_id, "listing saved");
            }
        }
        Ok(())
    }
}

/// Registers [`LoggingHandler`] for every action kind.
pub fn register_all(deferred: &DeferredActions) {
    let handler = Arc::new(LoggingHandler);
    for kind in [ActionKind::Apply, ActionKind::Message, ActionKind::Save] {
        deferred.register(kind, handler.clone());
    }
}

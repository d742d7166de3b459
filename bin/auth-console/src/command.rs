//! JSON-line commands accepted on stdin.
//!
//! ```text
//! {"op":"sign_in","identity":"uid_1"}
//! {"op":"attempt","action":{"kind":"apply","context":{"job_id":"job-42"}}}
//! {"op":"update","patch":{"display_name":"Jana"}}
//! {"op":"wait","ms":200}
//! ```

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use workincz_core::Identity;
use workincz_session::{
    Attempt, AuthService, AuthState, DeferredAction, ProfilePatch, ResumeOutcome,
};

/// One console command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Raw provider event: someone signed in.
    SignIn { identity: Identity },
    /// Raw provider event: nobody is signed in.
    SignOut,
    /// Perform an action now, or defer it until sign-in.
    Attempt { action: DeferredAction },
    /// Edit the signed-in profile.
    Update { patch: ProfilePatch },
    /// Re-read the signed-in profile.
    Refresh,
    /// Report the settled state.
    Status,
    /// Sleep, letting pending events settle.
    Wait { ms: u64 },
}

impl Command {
    /// Parses a command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a known command.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Runs the command and returns a reply, if any.
    pub async fn run(self, auth: &AuthService) -> Option<Value> {
        match self {
            Self::SignIn { identity } => {
                auth.on_raw_state_change(Some(identity));
                None
            }
            Self::SignOut => {
                auth.on_raw_state_change(None);
                None
            }
            Self::Attempt { action } => Some(match auth.attempt(action).await {
                Ok(Attempt::Deferred(id)) => json!({"attempt": "deferred", "id": id.to_string()}),
                Ok(Attempt::Performed(outcome)) => {
                    json!({"attempt": "performed", "outcome": describe(outcome)})
                }
                Err(error) => json!({"error": error.to_string()}),
            }),
            Self::Update { patch } => Some(match auth.update_profile(patch).await {
                Ok(profile) => json!({"profile": profile}),
                Err(error) => json!({"error": error.to_string()}),
            }),
            Self::Refresh => Some(match auth.refresh_profile().await {
                Some(session) => json!({"session": session}),
                None => json!({"error": "not signed in"}),
            }),
            Self::Status => Some(state_json(&auth.current_state())),
            Self::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                None
            }
        }
    }
}

/// Renders a settled state as a reply line.
pub fn state_json(state: &AuthState) -> Value {
    match state {
        AuthState::SignedOut => json!({"state": "signed_out"}),
        AuthState::SignedIn(session) => json!({"state": "signed_in", "session": session}),
    }
}

fn describe(outcome: ResumeOutcome) -> String {
    match outcome {
        ResumeOutcome::Nothing => "nothing".to_string(),
        ResumeOutcome::Discarded => "discarded".to_string(),
        ResumeOutcome::Expired => "expired".to_string(),
        ResumeOutcome::Retained => "retained".to_string(),
        ResumeOutcome::HandlerMissing(kind) => format!("no handler for {kind}"),
        ResumeOutcome::NotPermitted(kind) => format!("{kind} not permitted"),
        ResumeOutcome::Failed(kind) => format!("{kind} failed"),
        ResumeOutcome::Dispatched(kind) => format!("{kind} dispatched"),
    }
}

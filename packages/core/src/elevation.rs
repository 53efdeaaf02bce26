//! Retry policy for connect/disconnect failures.
//!
//! Without operator rights `tailscale up`/`down` exit non-zero. The user is
//! asked once whether to retry through the escalation wrapper (which also
//! registers them as operator via `up --operator`). The elevated attempt is
//! the last one: if it fails too, the command is given up.

use tracing::{info, warn};

use crate::command::Invocation;

/// Asks the user whether a failed command may be retried with elevated
/// privileges. Implemented by the UI layer.
pub trait ElevationPrompt: Send {
    fn confirm_elevation(&mut self, failed: &Invocation) -> bool;
}

impl<F> ElevationPrompt for F
where
    F: FnMut(&Invocation) -> bool + Send,
{
    fn confirm_elevation(&mut self, failed: &Invocation) -> bool {
        self(failed)
    }
}

/// What to do about a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run this (escalated) invocation next.
    Retry(Invocation),
    /// Stop; the failure is final.
    GiveUp,
    /// The command kind is not retried with elevation.
    NotApplicable,
}

/// Single-shot elevation retry.
pub struct RetryWithElevation<P> {
    prompt: P,
    enabled: bool,
}

impl<P: ElevationPrompt> RetryWithElevation<P> {
    /// `enabled` is false when no escalation wrapper is configured.
    pub fn new(prompt: P, enabled: bool) -> Self {
        Self { prompt, enabled }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn on_failure(&mut self, failed: &Invocation) -> RetryDecision {
        if !failed.kind.supports_elevation() {
            return RetryDecision::NotApplicable;
        }
        if failed.escalated {
            warn!(kind = ?failed.kind, "elevated attempt failed as well, giving up");
            return RetryDecision::GiveUp;
        }
        if !self.enabled {
            warn!(kind = ?failed.kind, "command failed and privilege escalation is disabled");
            return RetryDecision::GiveUp;
        }
        if !self.prompt.confirm_elevation(failed) {
            info!(kind = ?failed.kind, "elevated retry declined");
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry(failed.clone().escalated())
    }
}

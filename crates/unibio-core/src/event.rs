//! Normalized events and the listener contract

use serde::{Deserialize, Serialize};

use crate::method::ModuleTag;
use crate::reason::{FailureReason, HelpReason};

/// Outcome of one native signal after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A module authenticated the user
    Success { tag: ModuleTag },
    /// A module reported a failure, retried or terminal
    Failure { reason: FailureReason, tag: ModuleTag },
    /// Guidance while the probe keeps scanning
    Help {
        reason: HelpReason,
        message: Option<String>,
    },
    /// Raw acquisition progress from the sensor
    AcquisitionProgress { code: i32 },
}

impl AuthEvent {
    /// Hand this event to a listener
    pub fn deliver(&self, listener: &dyn AuthenticationListener) {
        match self {
            AuthEvent::Success { tag } => listener.on_success(*tag),
            AuthEvent::Failure { reason, tag } => listener.on_failure(*reason, *tag),
            AuthEvent::Help { reason, message } => listener.on_help(*reason, message.as_deref()),
            AuthEvent::AcquisitionProgress { code } => listener.on_progress(*code),
        }
    }

    pub fn tag(&self) -> Option<ModuleTag> {
        match self {
            AuthEvent::Success { tag } | AuthEvent::Failure { tag, .. } => Some(*tag),
            AuthEvent::Help { .. } | AuthEvent::AcquisitionProgress { .. } => None,
        }
    }
}

/// Receives normalized authentication events in real time.
///
/// A session may see several `on_failure` calls: one per retried attempt
/// plus a terminal one. Only `on_success` or a failure that is not followed
/// by a restart ends the session for that module.
pub trait AuthenticationListener: Send + Sync {
    fn on_success(&self, tag: ModuleTag);

    fn on_failure(&self, reason: FailureReason, tag: ModuleTag);

    fn on_help(&self, reason: HelpReason, message: Option<&str>);

    fn on_progress(&self, _code: i32) {}
}

//! Restart policy for failed authentication attempts
//!
//! A policy decides whether a terminal native failure should be retried
//! silently or surfaced as the end of the probe. Sensor glitches and single
//! failed matches get a bounded number of retries; every other reason is
//! final because retrying cannot change its outcome.
//!
//! Clones of a policy share their retry budget. One policy instance handed
//! to the dispatcher therefore governs a whole authentication session,
//! across restarts and across modules.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::reason::FailureReason;
use crate::DEFAULT_MAX_RESTARTS;

type Decide = dyn Fn(FailureReason) -> bool + Send + Sync;

#[derive(Clone)]
enum PolicyKind {
    Never,
    Bounded { remaining: Arc<AtomicU32>, max: u32 },
    Custom(Arc<Decide>),
}

/// Decides whether a failed probe restarts
#[derive(Clone)]
pub struct RestartPolicy {
    kind: PolicyKind,
}

impl RestartPolicy {
    /// Retry sensor failures and failed matches, `max` times in total.
    ///
    /// Both reasons draw from a single budget. Invocation `max + 1` is the
    /// first to return false. Other reasons return false without touching
    /// the budget.
    pub fn restart_timeouts(max: u32) -> Self {
        Self {
            kind: PolicyKind::Bounded {
                remaining: Arc::new(AtomicU32::new(max)),
                max,
            },
        }
    }

    /// `restart_timeouts(5)`
    pub fn default_policy() -> Self {
        Self::restart_timeouts(DEFAULT_MAX_RESTARTS)
    }

    /// Never restart
    pub fn never_restart() -> Self {
        Self {
            kind: PolicyKind::Never,
        }
    }

    /// Caller supplied decision function
    pub fn custom<F>(decide: F) -> Self
    where
        F: Fn(FailureReason) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: PolicyKind::Custom(Arc::new(decide)),
        }
    }

    /// Whether a probe that failed with `reason` should be restarted
    pub fn decide(&self, reason: FailureReason) -> bool {
        match &self.kind {
            PolicyKind::Never => false,
            PolicyKind::Bounded { remaining, .. } => {
                if !reason.is_sample_failure() {
                    return false;
                }
                remaining
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
                    .is_ok()
            }
            PolicyKind::Custom(decide) => decide(reason),
        }
    }

    /// Retries left in the budget, `None` for unbounded or custom policies
    pub fn remaining(&self) -> Option<u32> {
        match &self.kind {
            PolicyKind::Bounded { remaining, .. } => Some(remaining.load(Ordering::Acquire)),
            PolicyKind::Never => Some(0),
            PolicyKind::Custom(_) => None,
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl fmt::Debug for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PolicyKind::Never => f.write_str("RestartPolicy::Never"),
            PolicyKind::Bounded { remaining, max } => f
                .debug_struct("RestartPolicy::Bounded")
                .field("max", max)
                .field("remaining", &remaining.load(Ordering::Acquire))
                .finish(),
            PolicyKind::Custom(_) => f.write_str("RestartPolicy::Custom"),
        }
    }
}

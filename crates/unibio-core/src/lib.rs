//! unibio Core - Shared taxonomy, events and retry policy
//!
//! This crate provides the foundational types for the unibio biometric
//! dispatcher: the normalized failure and help categories every vendor
//! adapter maps into, the catalogue of supported biometric methods, the
//! listener contract and the restart policy.

pub mod error;
pub mod event;
pub mod method;
pub mod reason;
pub mod restart;

pub use error::{Error, Result};
pub use event::{AuthEvent, AuthenticationListener};
pub use method::{BiometricMethod, BiometricType, ModuleTag};
pub use reason::{FailureReason, HelpReason};
pub use restart::RestartPolicy;

/// How long a module stays locked out after a terminal failure burst (milliseconds)
pub const LOCKOUT_WINDOW_MS: u64 = 31_000;

/// Retry budget of the default restart policy
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

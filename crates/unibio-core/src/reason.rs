//! Normalized failure and help categories
//!
//! Vendor adapters translate every native error and help code into exactly
//! one of these categories before anything reaches the dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an authentication attempt did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The device has no sensor of this kind
    NoHardware,
    /// The sensor exists but cannot be used right now
    HardwareUnavailable,
    /// No template is enrolled on the sensor
    NoBiometricsRegistered,
    /// The sensor could not process the sample
    SensorFailed,
    /// The sample did not match an enrolled template
    AuthenticationFailed,
    /// The vendor service gave up waiting for a sample
    Timeout,
    /// Too many failures, the module refuses to probe for a while
    LockedOut,
    /// Anything the vendor reported that has no better category
    Unknown,
}

impl FailureReason {
    /// All failure reasons, in declaration order
    pub const ALL: [FailureReason; 8] = [
        FailureReason::NoHardware,
        FailureReason::HardwareUnavailable,
        FailureReason::NoBiometricsRegistered,
        FailureReason::SensorFailed,
        FailureReason::AuthenticationFailed,
        FailureReason::Timeout,
        FailureReason::LockedOut,
        FailureReason::Unknown,
    ];

    /// Failures caused by a bad sample rather than by the device state.
    ///
    /// These are the only reasons the default restart policy retries, and the
    /// only ones that put a module into lockout once retries run out.
    pub fn is_sample_failure(self) -> bool {
        matches!(
            self,
            FailureReason::SensorFailed | FailureReason::AuthenticationFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::NoHardware => "NO_HARDWARE",
            FailureReason::HardwareUnavailable => "HARDWARE_UNAVAILABLE",
            FailureReason::NoBiometricsRegistered => "NO_BIOMETRICS_REGISTERED",
            FailureReason::SensorFailed => "SENSOR_FAILED",
            FailureReason::AuthenticationFailed => "AUTHENTICATION_FAILED",
            FailureReason::Timeout => "TIMEOUT",
            FailureReason::LockedOut => "LOCKED_OUT",
            FailureReason::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guidance surfaced while a probe keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelpReason {
    /// The sample was good
    Good,
    /// Only part of the biometric was captured
    Partial,
    /// The sample was too noisy or faint
    Insufficient,
    /// The sensor surface needs cleaning
    ImagerDirty,
    /// The user moved too slowly
    TooSlow,
    /// The user moved too quickly
    TooFast,
    /// Vendor specific guidance, see the accompanying message
    Vendor,
    /// Generic hint for codes without a dedicated category
    Hint,
}

impl HelpReason {
    /// First help code reserved for vendor extensions
    pub const VENDOR_BASE: i32 = 1000;

    /// Resolve a vendor help code, falling back to [`HelpReason::Hint`]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => HelpReason::Good,
            1 => HelpReason::Partial,
            2 => HelpReason::Insufficient,
            3 => HelpReason::ImagerDirty,
            4 => HelpReason::TooSlow,
            5 => HelpReason::TooFast,
            6 => HelpReason::Vendor,
            c if c >= Self::VENDOR_BASE => HelpReason::Vendor,
            _ => HelpReason::Hint,
        }
    }

    /// Canonical help code, if the category has one
    pub fn code(self) -> Option<i32> {
        match self {
            HelpReason::Good => Some(0),
            HelpReason::Partial => Some(1),
            HelpReason::Insufficient => Some(2),
            HelpReason::ImagerDirty => Some(3),
            HelpReason::TooSlow => Some(4),
            HelpReason::TooFast => Some(5),
            HelpReason::Vendor => Some(6),
            HelpReason::Hint => None,
        }
    }
}

impl fmt::Display for HelpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HelpReason::Good => "GOOD",
            HelpReason::Partial => "PARTIAL",
            HelpReason::Insufficient => "INSUFFICIENT",
            HelpReason::ImagerDirty => "IMAGER_DIRTY",
            HelpReason::TooSlow => "TOO_SLOW",
            HelpReason::TooFast => "TOO_FAST",
            HelpReason::Vendor => "VENDOR",
            HelpReason::Hint => "HINT",
        };
        f.write_str(name)
    }
}

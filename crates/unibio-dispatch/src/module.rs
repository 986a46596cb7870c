//! Biometric module contract and the vendor adapter
//!
//! A module binds one vendor sensor service. It answers presence, enrollment
//! and lockout queries and runs authentication probes, translating the
//! vendor's signals into [`AuthEvent`]s for the listener.
//!
//! # Probe lifecycle
//!
//! ```text
//! Idle -> Probing -> Success reported
//!                 -> Failure reported (no restart)
//!                 -> Cancelled
//!                 -> Probing (help, progress, failed match, restart)
//! ```
//!
//! A restart re-issues the native probe with the same token, listener and
//! policy, so the policy's budget spans the whole session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use unibio_core::{
    AuthEvent, AuthenticationListener, BiometricMethod, FailureReason, ModuleTag, RestartPolicy,
};

use crate::cancel::CancelToken;
use crate::lockout::LockoutTracker;
use crate::native::NativeSensor;
use crate::vendor::{Decoded, NativeFailure, VendorCodes};

/// How a probe session ended for one module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// `on_success` was delivered
    Succeeded,
    /// A terminal `on_failure` was delivered
    Failed(FailureReason),
    /// The user dismissed the vendor prompt; nothing was delivered
    UserCancelled,
    /// The system cancelled the operation; nothing was delivered
    Suppressed,
    /// The probe's token was cancelled
    Cancelled,
}

/// One sensor binding
#[async_trait]
pub trait BiometricModule: Send + Sync {
    fn method(&self) -> BiometricMethod;

    fn tag(&self) -> ModuleTag {
        self.method().tag()
    }

    /// Whether the vendor service was found when the module was built
    fn is_manager_accessible(&self) -> bool;

    fn is_hardware_present(&self) -> bool;

    fn has_enrolled(&self) -> bool;

    /// Clears an expired lockout record as a side effect
    fn is_locked_out(&self) -> bool;

    /// Start a lockout window unless one is already running
    fn lockout(&self);

    /// Run one probe session until it succeeds, fails without restart or is
    /// cancelled.
    async fn authenticate(
        &self,
        cancel: CancelToken,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> ProbeOutcome;
}

/// Result of a single native probe
enum Attempt {
    /// The session is over
    Finished(ProbeOutcome),
    /// Terminal native error, subject to the restart policy
    Failed(FailureReason),
}

/// Module adapter for a vendor service speaking the code space `C`
pub struct VendorModule<C: VendorCodes> {
    method: BiometricMethod,
    sensor: Option<Arc<dyn NativeSensor>>,
    codes: C,
    lockout: Arc<LockoutTracker>,
    restart_delay: Duration,
}

impl<C: VendorCodes> VendorModule<C> {
    /// `sensor` is `None` when the vendor service could not be found
    pub fn new(
        method: BiometricMethod,
        sensor: Option<Arc<dyn NativeSensor>>,
        codes: C,
        lockout: Arc<LockoutTracker>,
    ) -> Self {
        Self {
            method,
            sensor,
            codes,
            lockout,
            restart_delay: Duration::ZERO,
        }
    }

    /// Pause before re-issuing a restarted probe
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Deliver an event unless the probe has been cancelled meanwhile
    fn emit(
        &self,
        cancel: &CancelToken,
        listener: &Arc<dyn AuthenticationListener>,
        event: AuthEvent,
    ) {
        if cancel.is_cancelled() {
            debug!(module = %self.tag(), ?event, "Dropping event of cancelled probe");
            return;
        }
        event.deliver(listener.as_ref());
    }

    fn fail(
        &self,
        cancel: &CancelToken,
        listener: &Arc<dyn AuthenticationListener>,
        reason: FailureReason,
    ) -> Attempt {
        self.emit(
            cancel,
            listener,
            AuthEvent::Failure {
                reason,
                tag: self.tag(),
            },
        );
        Attempt::Finished(ProbeOutcome::Failed(reason))
    }

    async fn attempt(
        &self,
        sensor: &dyn NativeSensor,
        cancel: &CancelToken,
        listener: &Arc<dyn AuthenticationListener>,
    ) -> Attempt {
        let tag = self.tag();

        if !self.is_hardware_present() {
            return self.fail(cancel, listener, FailureReason::HardwareUnavailable);
        }
        if !self.has_enrolled() {
            return self.fail(cancel, listener, FailureReason::NoBiometricsRegistered);
        }

        let mut probe = match sensor.authenticate(cancel) {
            Ok(probe) => probe,
            Err(e) => {
                warn!(module = %tag, "Failed to start native probe: {}", e);
                return self.fail(cancel, listener, FailureReason::Unknown);
            }
        };

        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempt::Finished(ProbeOutcome::Cancelled),
                signal = probe.next() => signal,
            };

            let Some(signal) = signal else {
                warn!(module = %tag, "Native service dropped the probe");
                return self.fail(cancel, listener, FailureReason::Unknown);
            };

            if cancel.is_cancelled() {
                return Attempt::Finished(ProbeOutcome::Cancelled);
            }

            let decoded = self.codes.decode(&signal);
            debug!(module = %tag, vendor = self.codes.name(), ?signal, ?decoded, "Native signal");

            match decoded {
                Decoded::Success => {
                    self.lockout.clear_permanent(tag);
                    info!(module = %tag, "Authentication succeeded");
                    self.emit(cancel, listener, AuthEvent::Success { tag });
                    return Attempt::Finished(ProbeOutcome::Succeeded);
                }
                Decoded::Mismatch => self.emit(
                    cancel,
                    listener,
                    AuthEvent::Failure {
                        reason: FailureReason::AuthenticationFailed,
                        tag,
                    },
                ),
                Decoded::Help(reason, message) => {
                    self.emit(cancel, listener, AuthEvent::Help { reason, message })
                }
                Decoded::Progress(code) => {
                    self.emit(cancel, listener, AuthEvent::AcquisitionProgress { code })
                }
                Decoded::Terminal(NativeFailure::SystemCancelled) => {
                    debug!(module = %tag, "Probe cancelled by the system");
                    return Attempt::Finished(ProbeOutcome::Suppressed);
                }
                Decoded::Terminal(NativeFailure::UserCancelled) => {
                    debug!(module = %tag, "Probe cancelled by the user");
                    return Attempt::Finished(ProbeOutcome::UserCancelled);
                }
                Decoded::Terminal(NativeFailure::Lockout) => {
                    self.lockout();
                    return Attempt::Failed(FailureReason::LockedOut);
                }
                Decoded::Terminal(NativeFailure::PermanentLockout) => {
                    self.lockout.set_permanently_locked(tag);
                    return Attempt::Failed(FailureReason::HardwareUnavailable);
                }
                Decoded::Terminal(NativeFailure::Reason(reason)) => {
                    return Attempt::Failed(reason);
                }
            }
        }
    }
}

#[async_trait]
impl<C: VendorCodes> BiometricModule for VendorModule<C> {
    fn method(&self) -> BiometricMethod {
        self.method
    }

    fn is_manager_accessible(&self) -> bool {
        self.sensor.is_some()
    }

    fn is_hardware_present(&self) -> bool {
        let Some(sensor) = &self.sensor else {
            return false;
        };
        match sensor.is_hardware_present() {
            Ok(present) => present,
            Err(e) => {
                warn!(module = %self.tag(), "Hardware query failed: {}", e);
                false
            }
        }
    }

    fn has_enrolled(&self) -> bool {
        let Some(sensor) = &self.sensor else {
            return false;
        };
        if !self.is_hardware_present() {
            return false;
        }
        match sensor.has_enrolled_templates() {
            Ok(enrolled) => enrolled,
            Err(e) => {
                warn!(module = %self.tag(), "Enrollment query failed: {}", e);
                false
            }
        }
    }

    fn is_locked_out(&self) -> bool {
        self.lockout.is_locked_out(self.tag())
    }

    fn lockout(&self) {
        self.lockout.lockout(self.tag());
    }

    async fn authenticate(
        &self,
        cancel: CancelToken,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> ProbeOutcome {
        let tag = self.tag();

        let Some(sensor) = self.sensor.clone() else {
            warn!(module = %tag, "Authenticate called on a module without a native service");
            self.emit(
                &cancel,
                &listener,
                AuthEvent::Failure {
                    reason: FailureReason::HardwareUnavailable,
                    tag,
                },
            );
            return ProbeOutcome::Failed(FailureReason::HardwareUnavailable);
        };

        loop {
            let reason = match self.attempt(sensor.as_ref(), &cancel, &listener).await {
                Attempt::Finished(outcome) => return outcome,
                Attempt::Failed(reason) => reason,
            };

            if policy.decide(reason) {
                debug!(module = %tag, %reason, "Restarting probe");
                self.emit(&cancel, &listener, AuthEvent::Failure { reason, tag });
                if !self.restart_delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
                        _ = tokio::time::sleep(self.restart_delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    return ProbeOutcome::Cancelled;
                }
                continue;
            }

            let reason = if reason.is_sample_failure() {
                self.lockout();
                FailureReason::LockedOut
            } else {
                reason
            };
            info!(module = %tag, %reason, "Authentication failed");
            self.emit(&cancel, &listener, AuthEvent::Failure { reason, tag });
            return ProbeOutcome::Failed(reason);
        }
    }
}

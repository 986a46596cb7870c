//! Contract for native vendor sensor services
//!
//! Vendor services are callback driven: starting a probe returns at once and
//! results arrive later from a vendor thread. Here a started probe is a
//! channel of raw [`NativeSignal`]s. The service keeps the [`ProbeSender`]
//! for as long as the probe runs and drops it when the native side goes
//! away.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;

/// Raw signal from a vendor service, before normalization
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum NativeSignal {
    /// Terminal error callback with a vendor error code
    Error { code: i32, message: Option<String> },
    /// Non-terminal help callback with a vendor help code
    Help { code: i32, message: Option<String> },
    /// Acquisition progress
    Acquired { code: i32 },
    /// The sample matched an enrolled template
    Succeeded,
    /// The sample did not match; the sensor keeps scanning
    Failed,
    /// Single status callback, for vendors that report every outcome this way
    Status { code: i32 },
}

/// Failure of a native call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NativeError {
    #[error("Native service unavailable")]
    Unavailable,

    #[error("Native call failed: {0}")]
    Call(String),
}

/// A vendor sensor service.
///
/// Calls are synchronous and cheap; only the probe itself is asynchronous.
pub trait NativeSensor: Send + Sync {
    fn is_hardware_present(&self) -> Result<bool, NativeError>;

    fn has_enrolled_templates(&self) -> Result<bool, NativeError>;

    /// Start one probe. The service should stop emitting once `cancel` fires.
    fn authenticate(&self, cancel: &CancelToken) -> Result<NativeProbe, NativeError>;
}

/// Receiving end of a running probe
#[derive(Debug)]
pub struct NativeProbe {
    rx: mpsc::UnboundedReceiver<NativeSignal>,
}

/// Sending end of a running probe, held by the native service
#[derive(Debug, Clone)]
pub struct ProbeSender {
    tx: mpsc::UnboundedSender<NativeSignal>,
}

impl NativeProbe {
    pub fn channel() -> (ProbeSender, NativeProbe) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProbeSender { tx }, NativeProbe { rx })
    }

    /// Next signal, or `None` once the native side dropped the probe
    pub async fn next(&mut self) -> Option<NativeSignal> {
        self.rx.recv().await
    }
}

impl ProbeSender {
    /// Emit a signal; false once the probe has been abandoned
    pub fn emit(&self, signal: NativeSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the dispatcher has dropped the probe
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_channel_delivers_in_order() {
        let (sender, mut probe) = NativeProbe::channel();
        assert!(sender.emit(NativeSignal::Acquired { code: 1 }));
        assert!(sender.emit(NativeSignal::Succeeded));
        drop(sender);

        assert_eq!(probe.next().await, Some(NativeSignal::Acquired { code: 1 }));
        assert_eq!(probe.next().await, Some(NativeSignal::Succeeded));
        assert_eq!(probe.next().await, None);
    }

    #[test]
    fn test_emit_after_abandon() {
        let (sender, probe) = NativeProbe::channel();
        drop(probe);
        assert!(sender.is_closed());
        assert!(!sender.emit(NativeSignal::Failed));
    }

    #[test]
    fn test_signal_json_shape() {
        let signal: NativeSignal =
            serde_json::from_str(r#"{"signal":"error","code":7,"message":null}"#).unwrap();
        assert_eq!(
            signal,
            NativeSignal::Error {
                code: 7,
                message: None
            }
        );
    }
}

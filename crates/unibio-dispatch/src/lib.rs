//! unibio Dispatch - Multi-module biometric authentication dispatcher
//!
//! This crate provides:
//! - The native sensor contract vendor services are consumed through
//! - Vendor code tables normalizing native signals into the core taxonomy
//! - The module adapter with lockout bookkeeping and restart loop
//! - Encrypted persistence for lockout state
//! - The registry that fans authentication out to every module
//! - Scripted sensors for tests and demos

pub mod cancel;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod factory;
pub mod lockout;
pub mod module;
pub mod native;
pub mod registry;
pub mod sim;
pub mod store;
pub mod vendor;

pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DispatchConfig;
pub use delivery::{CallbackQueue, QueuedListener};
pub use error::{DispatchError, Result};
pub use factory::{ModuleFactory, SensorProvider};
pub use lockout::LockoutTracker;
pub use module::{BiometricModule, ProbeOutcome, VendorModule};
pub use native::{NativeError, NativeProbe, NativeSensor, NativeSignal, ProbeSender};
pub use registry::{AuthSession, Registry};
pub use sim::{
    RecordingListener, Scenario, ScriptStep, SensorScript, SimulatedProvider, SimulatedSensor,
};
pub use store::{EncryptedFileStore, MemoryStore, SecureStore};
pub use vendor::{Decoded, FrameworkCodes, NativeFailure, SamsungPassCodes, VendorCodes};

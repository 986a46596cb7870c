//! Scripted sensors for tests and demos
//!
//! A [`SimulatedSensor`] plays back one script per started probe. Scripts
//! are plain data, so whole scenarios can be loaded from JSON:
//!
//! ```json
//! {
//!   "sensors": [
//!     {
//!       "method": "fingerprint_framework",
//!       "attempts": [
//!         [{ "emit": { "signal": "error", "code": 2 } }],
//!         [{ "wait": { "ms": 50 } }, { "emit": { "signal": "succeeded" } }]
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;
use unibio_core::{
    AuthEvent, AuthenticationListener, BiometricMethod, FailureReason, HelpReason, ModuleTag,
};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::factory::SensorProvider;
use crate::native::{NativeError, NativeProbe, NativeSensor, NativeSignal, ProbeSender};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One step of a probe script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    Emit(NativeSignal),
    Wait { ms: u64 },
}

/// Sensor that replays scripted probes.
///
/// Each started probe consumes the next script. Once a script runs out the
/// probe stays open, like a sensor waiting for a finger, until it is
/// cancelled or dropped.
pub struct SimulatedSensor {
    hardware_present: AtomicBool,
    enrolled: AtomicBool,
    failing_queries: AtomicBool,
    failing_start: AtomicBool,
    attempts: Mutex<VecDeque<Vec<ScriptStep>>>,
    tokens: Mutex<Vec<CancelToken>>,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSensor {
    /// A present sensor with enrolled templates and no scripts
    pub fn new() -> Self {
        Self {
            hardware_present: AtomicBool::new(true),
            enrolled: AtomicBool::new(true),
            failing_queries: AtomicBool::new(false),
            failing_start: AtomicBool::new(false),
            attempts: Mutex::new(VecDeque::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_attempt(self, steps: Vec<ScriptStep>) -> Self {
        self.push_attempt(steps);
        self
    }

    pub fn push_attempt(&self, steps: Vec<ScriptStep>) {
        lock(&self.attempts).push_back(steps);
    }

    pub fn set_hardware_present(&self, present: bool) {
        self.hardware_present.store(present, Ordering::SeqCst);
    }

    pub fn set_enrolled(&self, enrolled: bool) {
        self.enrolled.store(enrolled, Ordering::SeqCst);
    }

    /// Make presence and enrollment queries return errors
    pub fn set_failing_queries(&self, failing: bool) {
        self.failing_queries.store(failing, Ordering::SeqCst);
    }

    /// Make the next probes fail to start
    pub fn set_failing_start(&self, failing: bool) {
        self.failing_start.store(failing, Ordering::SeqCst);
    }

    pub fn probes_started(&self) -> usize {
        lock(&self.tokens).len()
    }

    /// Tokens of every started probe, oldest first
    pub fn tokens(&self) -> Vec<CancelToken> {
        lock(&self.tokens).clone()
    }

    fn query(&self, flag: &AtomicBool) -> std::result::Result<bool, NativeError> {
        if self.failing_queries.load(Ordering::SeqCst) {
            return Err(NativeError::Call("simulated query failure".to_string()));
        }
        Ok(flag.load(Ordering::SeqCst))
    }
}

impl NativeSensor for SimulatedSensor {
    fn is_hardware_present(&self) -> std::result::Result<bool, NativeError> {
        self.query(&self.hardware_present)
    }

    fn has_enrolled_templates(&self) -> std::result::Result<bool, NativeError> {
        self.query(&self.enrolled)
    }

    fn authenticate(&self, cancel: &CancelToken) -> std::result::Result<NativeProbe, NativeError> {
        if self.failing_start.load(Ordering::SeqCst) {
            return Err(NativeError::Unavailable);
        }

        let steps = lock(&self.attempts).pop_front().unwrap_or_default();
        lock(&self.tokens).push(cancel.clone());

        let (sender, probe) = NativeProbe::channel();
        tokio::spawn(play(steps, sender, cancel.clone()));
        Ok(probe)
    }
}

async fn play(steps: Vec<ScriptStep>, sender: ProbeSender, cancel: CancelToken) {
    for step in steps {
        if cancel.is_cancelled() {
            return;
        }
        match step {
            ScriptStep::Emit(signal) => {
                if !sender.emit(signal) {
                    return;
                }
            }
            ScriptStep::Wait { ms } => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                }
            }
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = sender.closed() => {}
    }
    debug!("Simulated probe finished");
}

/// Scripted sensor description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorScript {
    pub method: BiometricMethod,
    #[serde(default = "default_true")]
    pub hardware_present: bool,
    #[serde(default = "default_true")]
    pub enrolled: bool,
    #[serde(default)]
    pub fail_start: bool,
    #[serde(default)]
    pub attempts: Vec<Vec<ScriptStep>>,
}

fn default_true() -> bool {
    true
}

/// A whole host: every vendor service it exposes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub sensors: Vec<SensorScript>,
}

/// Provider backed by simulated sensors
#[derive(Default)]
pub struct SimulatedProvider {
    sensors: BTreeMap<BiometricMethod, Arc<SimulatedSensor>>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensor(mut self, method: BiometricMethod, sensor: Arc<SimulatedSensor>) -> Self {
        self.sensors.insert(method, sensor);
        self
    }

    pub fn sensor(&self, method: BiometricMethod) -> Option<Arc<SimulatedSensor>> {
        self.sensors.get(&method).cloned()
    }

    pub fn from_scenario(scenario: &Scenario) -> Self {
        let mut provider = Self::new();
        for script in &scenario.sensors {
            let sensor = SimulatedSensor::new();
            sensor.set_hardware_present(script.hardware_present);
            sensor.set_enrolled(script.enrolled);
            sensor.set_failing_start(script.fail_start);
            for attempt in &script.attempts {
                sensor.push_attempt(attempt.clone());
            }
            provider.sensors.insert(script.method, Arc::new(sensor));
        }
        provider
    }

    /// Load a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&content)?;
        Ok(Self::from_scenario(&scenario))
    }
}

impl SensorProvider for SimulatedProvider {
    fn probe(&self, method: BiometricMethod) -> Option<Arc<dyn NativeSensor>> {
        let sensor: Arc<dyn NativeSensor> = self.sensors.get(&method)?.clone();
        Some(sensor)
    }
}

/// Listener that records every event it receives
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<AuthEvent>>,
    notify: Notify,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failures(&self) -> Vec<(FailureReason, ModuleTag)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                AuthEvent::Failure { reason, tag } => Some((*reason, *tag)),
                _ => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<ModuleTag> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                AuthEvent::Success { tag } => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` events arrived; false on timeout
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len() >= count;
            }
        }
    }

    fn record(&self, event: AuthEvent) {
        lock(&self.events).push(event);
        self.notify.notify_waiters();
    }
}

impl AuthenticationListener for RecordingListener {
    fn on_success(&self, tag: ModuleTag) {
        self.record(AuthEvent::Success { tag });
    }

    fn on_failure(&self, reason: FailureReason, tag: ModuleTag) {
        self.record(AuthEvent::Failure { reason, tag });
    }

    fn on_help(&self, reason: HelpReason, message: Option<&str>) {
        self.record(AuthEvent::Help {
            reason,
            message: message.map(str::to_string),
        });
    }

    fn on_progress(&self, code: i32) {
        self.record(AuthEvent::AcquisitionProgress { code });
    }
}

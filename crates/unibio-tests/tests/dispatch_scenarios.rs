//! End-to-end dispatch scenarios
//!
//! These tests drive the registry, module adapters, lockout tracker and
//! delivery queue together against simulated vendor services.

use std::sync::Arc;
use std::time::Duration;

use unibio_core::{
    AuthEvent, BiometricMethod, BiometricType, FailureReason, ModuleTag, RestartPolicy,
};
use unibio_dispatch::{
    sim::Scenario, vendor::framework, vendor::samsung, AuthSession, BiometricModule,
    DispatchError, EncryptedFileStore, LockoutTracker, ManualClock, MemoryStore,
    ModuleFactory, NativeSignal, ProbeOutcome, RecordingListener, Registry, ScriptStep,
    SecureStore, SimulatedProvider, SimulatedSensor,
};

const WAIT: Duration = Duration::from_secs(5);

/// A host process: one store, one clock, one registry
struct Host {
    clock: Arc<ManualClock>,
    lockout: Arc<LockoutTracker>,
    factory: ModuleFactory,
    registry: Registry,
}

impl Host {
    fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    fn with_store(store: Arc<dyn SecureStore>) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let lockout = Arc::new(LockoutTracker::new(store, clock.clone()));
        Self {
            clock,
            factory: ModuleFactory::new(lockout.clone()),
            lockout,
            registry: Registry::new(),
        }
    }

    async fn install(&self, provider: &SimulatedProvider) -> Vec<ModuleTag> {
        self.factory
            .initialize(&self.registry, &BiometricMethod::ALL, provider)
            .await
    }

    async fn module(&self, method: BiometricMethod) -> Arc<dyn BiometricModule> {
        self.registry.module(method.tag()).await.unwrap()
    }

    async fn authenticate(&self, listener: &Arc<RecordingListener>) -> AuthSession {
        self.registry
            .authenticate(listener.clone(), RestartPolicy::default_policy())
            .await
    }
}

fn emit(signal: NativeSignal) -> ScriptStep {
    ScriptStep::Emit(signal)
}

fn framework_error(code: i32) -> ScriptStep {
    emit(NativeSignal::Error {
        code,
        message: None,
    })
}

fn samsung_status(code: i32) -> ScriptStep {
    emit(NativeSignal::Status { code })
}

async fn wait_until_started(sensor: &SimulatedSensor, count: usize) {
    tokio::time::timeout(WAIT, async {
        while sensor.probes_started() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("probe did not start");
}

#[tokio::test]
async fn test_lockout_window_expires_on_simulated_clock() {
    let host = Host::new();
    let provider = SimulatedProvider::new()
        .with_sensor(BiometricMethod::FaceFramework, Arc::new(SimulatedSensor::new()));
    host.install(&provider).await;
    let face = host.module(BiometricMethod::FaceFramework).await;

    face.lockout();
    assert!(face.is_locked_out());
    assert!(host.registry.is_locked_out().await);

    host.clock.advance(Duration::from_millis(30_999));
    assert!(face.is_locked_out());

    host.clock.advance(Duration::from_millis(1));
    assert!(!face.is_locked_out());
    assert_eq!(host.lockout.remaining(face.tag()), None);
    assert!(!host.registry.is_locked_out().await);
}

#[tokio::test]
async fn test_module_without_hardware_is_never_registered() {
    let host = Host::new();
    let absent = Arc::new(SimulatedSensor::new());
    absent.set_hardware_present(false);
    let provider = SimulatedProvider::new()
        .with_sensor(BiometricMethod::IrisFramework, absent.clone())
        .with_sensor(BiometricMethod::FingerprintFramework, Arc::new(SimulatedSensor::new()));

    let registered = host.install(&provider).await;
    assert_eq!(registered, vec![BiometricMethod::FingerprintFramework.tag()]);
    assert!(host.registry.module(BiometricMethod::IrisFramework.tag()).await.is_none());
    assert!(!host.registry.is_hardware_detected_for(BiometricType::Iris).await);

    // Hardware appearing later does not register the module retroactively
    absent.set_hardware_present(true);
    assert!(host.registry.module(BiometricMethod::IrisFramework.tag()).await.is_none());
}

#[tokio::test]
async fn test_second_authenticate_leaves_one_live_handle() {
    let host = Host::new();
    let sensor = Arc::new(SimulatedSensor::new());
    let provider =
        SimulatedProvider::new().with_sensor(BiometricMethod::FaceFramework, sensor.clone());
    host.install(&provider).await;
    let face = host.module(BiometricMethod::FaceFramework).await;
    let listener = Arc::new(RecordingListener::new());

    let first = host
        .registry
        .authenticate_module(face.clone(), listener.clone(), RestartPolicy::default_policy())
        .await
        .unwrap();
    wait_until_started(&sensor, 1).await;

    let second = host
        .registry
        .authenticate_module(face.clone(), listener.clone(), RestartPolicy::default_policy())
        .await
        .unwrap();
    wait_until_started(&sensor, 2).await;

    assert_eq!(host.registry.active_probes().await, vec![face.tag()]);
    let tokens = sensor.tokens();
    assert!(tokens[0].is_cancelled());
    assert!(!tokens[1].is_cancelled());

    assert_eq!(first.join().await[0].1, ProbeOutcome::Cancelled);
    host.registry.cancel_authentication().await;
    assert_eq!(second.join().await[0].1, ProbeOutcome::Cancelled);
    assert!(listener.is_empty());
}

#[tokio::test]
async fn test_cancellation_codes_never_report_failure() {
    let host = Host::new();
    let user = Arc::new(
        SimulatedSensor::new().with_attempt(vec![framework_error(framework::ERROR_USER_CANCELED)]),
    );
    let system = Arc::new(
        SimulatedSensor::new().with_attempt(vec![framework_error(framework::ERROR_CANCELED)]),
    );
    let samsung_user = Arc::new(
        SimulatedSensor::new()
            .with_attempt(vec![samsung_status(samsung::STATUS_USER_CANCELLED_BY_TOUCH_OUTSIDE)]),
    );
    let provider = SimulatedProvider::new()
        .with_sensor(BiometricMethod::FingerprintFramework, user)
        .with_sensor(BiometricMethod::FaceFramework, system)
        .with_sensor(BiometricMethod::FingerprintSamsung, samsung_user);
    host.install(&provider).await;

    let listener = Arc::new(RecordingListener::new());
    let mut outcomes = host.authenticate(&listener).await.join().await;
    outcomes.sort_by_key(|(tag, _)| *tag);

    assert_eq!(
        outcomes,
        vec![
            (BiometricMethod::FingerprintFramework.tag(), ProbeOutcome::UserCancelled),
            (BiometricMethod::FingerprintSamsung.tag(), ProbeOutcome::UserCancelled),
            (BiometricMethod::FaceFramework.tag(), ProbeOutcome::Suppressed),
        ]
    );
    assert!(listener.is_empty());
    assert!(host.registry.active_probes().await.is_empty());
}

#[tokio::test]
async fn test_sensor_and_match_failures_share_budget_then_lock_out() {
    let host = Host::new();
    let sensor = Arc::new(SimulatedSensor::new());
    for status in [
        samsung::STATUS_SENSOR_FAILED,
        samsung::STATUS_QUALITY_FAILED,
        samsung::STATUS_SENSOR_FAILED,
        samsung::STATUS_AUTHENTIFICATION_FAILED,
        samsung::STATUS_AUTHENTIFICATION_FAILED,
        samsung::STATUS_AUTHENTIFICATION_FAILED,
    ] {
        sensor.push_attempt(vec![samsung_status(status)]);
    }
    let provider =
        SimulatedProvider::new().with_sensor(BiometricMethod::FingerprintSamsung, sensor.clone());
    host.install(&provider).await;

    let listener = Arc::new(RecordingListener::new());
    let outcomes = host.authenticate(&listener).await.join().await;

    let tag = BiometricMethod::FingerprintSamsung.tag();
    assert_eq!(outcomes, vec![(tag, ProbeOutcome::Failed(FailureReason::LockedOut))]);
    assert_eq!(
        listener.failures(),
        vec![
            (FailureReason::SensorFailed, tag),
            (FailureReason::SensorFailed, tag),
            (FailureReason::SensorFailed, tag),
            (FailureReason::AuthenticationFailed, tag),
            (FailureReason::AuthenticationFailed, tag),
            (FailureReason::LockedOut, tag),
        ]
    );
    assert_eq!(sensor.probes_started(), 6);
    assert!(host.module(BiometricMethod::FingerprintSamsung).await.is_locked_out());

    // A locked-out module is skipped by the next fan-out
    let listener = Arc::new(RecordingListener::new());
    let session = host.authenticate(&listener).await;
    assert!(session.is_empty());
    assert_eq!(sensor.probes_started(), 6);
}

#[tokio::test]
async fn test_budget_is_shared_across_modules_of_one_session() {
    let host = Host::new();
    let finger = Arc::new(SimulatedSensor::new());
    let face = Arc::new(SimulatedSensor::new());
    for _ in 0..3 {
        finger.push_attempt(vec![framework_error(framework::ERROR_UNABLE_TO_PROCESS)]);
        face.push_attempt(vec![framework_error(framework::ERROR_UNABLE_TO_PROCESS)]);
    }
    let provider = SimulatedProvider::new()
        .with_sensor(BiometricMethod::FingerprintFramework, finger.clone())
        .with_sensor(BiometricMethod::FaceFramework, face.clone());
    host.install(&provider).await;

    let listener = Arc::new(RecordingListener::new());
    let policy = RestartPolicy::restart_timeouts(2);
    let outcomes = host
        .registry
        .authenticate(listener.clone(), policy.clone())
        .await
        .join()
        .await;

    // Two restarts between both modules, then each module locks out
    assert_eq!(policy.remaining(), Some(0));
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| *outcome == ProbeOutcome::Failed(FailureReason::LockedOut)));
    assert_eq!(finger.probes_started() + face.probes_started(), 4);

    let failures = listener.failures();
    let raw = failures
        .iter()
        .filter(|(reason, _)| *reason == FailureReason::SensorFailed)
        .count();
    assert_eq!(raw, 2);
    assert_eq!(failures.len(), 4);
}

#[tokio::test]
async fn test_one_success_does_not_stop_other_modules() {
    let host = Host::new();
    let finger = Arc::new(SimulatedSensor::new().with_attempt(vec![emit(NativeSignal::Succeeded)]));
    let face = Arc::new(SimulatedSensor::new());
    let provider = SimulatedProvider::new()
        .with_sensor(BiometricMethod::FingerprintFramework, finger)
        .with_sensor(BiometricMethod::FaceFramework, face.clone());
    host.install(&provider).await;

    let listener = Arc::new(RecordingListener::new());
    let session = host.authenticate(&listener).await;
    assert!(listener.wait_for(1, WAIT).await);
    wait_until_started(&face, 1).await;

    assert_eq!(listener.successes(), vec![BiometricMethod::FingerprintFramework.tag()]);
    assert_eq!(host.registry.active_probes().await, vec![BiometricMethod::FaceFramework.tag()]);
    assert!(!face.tokens()[0].is_cancelled());

    host.registry.cancel_module(BiometricMethod::FaceFramework.tag()).await;
    let mut outcomes = session.join().await;
    outcomes.sort_by_key(|(tag, _)| *tag);
    assert_eq!(
        outcomes,
        vec![
            (BiometricMethod::FingerprintFramework.tag(), ProbeOutcome::Succeeded),
            (BiometricMethod::FaceFramework.tag(), ProbeOutcome::Cancelled),
        ]
    );
    assert_eq!(listener.len(), 1);
}

#[tokio::test]
async fn test_events_after_cancel_are_dropped() {
    let host = Host::new();
    let sensor = Arc::new(SimulatedSensor::new().with_attempt(vec![
        ScriptStep::Wait { ms: 50 },
        emit(NativeSignal::Succeeded),
    ]));
    let provider =
        SimulatedProvider::new().with_sensor(BiometricMethod::IrisSamsung, sensor.clone());
    host.install(&provider).await;

    let listener = Arc::new(RecordingListener::new());
    let session = host.authenticate(&listener).await;
    wait_until_started(&sensor, 1).await;
    host.registry.cancel_authentication().await;

    assert_eq!(session.join().await[0].1, ProbeOutcome::Cancelled);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(listener.is_empty());
}

#[tokio::test]
async fn test_restart_delay_is_interrupted_by_cancel() {
    let host = Host::new();
    let factory =
        ModuleFactory::new(host.lockout.clone()).with_restart_delay(Duration::from_secs(60));
    let sensor = Arc::new(SimulatedSensor::new().with_attempt(vec![framework_error(
        framework::ERROR_UNABLE_TO_PROCESS,
    )]));
    let provider =
        SimulatedProvider::new().with_sensor(BiometricMethod::FingerprintFramework, sensor.clone());
    factory
        .initialize(&host.registry, &[BiometricMethod::FingerprintFramework], &provider)
        .await;

    let listener = Arc::new(RecordingListener::new());
    let session = host.authenticate(&listener).await;
    assert!(listener.wait_for(1, WAIT).await);
    host.registry.cancel_authentication().await;

    let outcomes = tokio::time::timeout(WAIT, session.join()).await.unwrap();
    assert_eq!(outcomes[0].1, ProbeOutcome::Cancelled);
    assert_eq!(
        listener.failures(),
        vec![(FailureReason::SensorFailed, BiometricMethod::FingerprintFramework.tag())]
    );
    assert_eq!(sensor.probes_started(), 1);
}

#[tokio::test]
async fn test_precondition_violation_is_an_error_not_an_event() {
    let host = Host::new();
    let sensor = Arc::new(SimulatedSensor::new());
    sensor.set_enrolled(false);
    let provider =
        SimulatedProvider::new().with_sensor(BiometricMethod::FaceSamsung, sensor.clone());
    host.install(&provider).await;
    let face = host.module(BiometricMethod::FaceSamsung).await;

    let listener = Arc::new(RecordingListener::new());
    let result = host
        .registry
        .authenticate_module(face, listener.clone(), RestartPolicy::default_policy())
        .await;
    assert!(matches!(
        result,
        Err(DispatchError::ModuleNotReady {
            reason: "no biometrics enrolled",
            ..
        })
    ));
    assert!(listener.is_empty());
    assert_eq!(sensor.probes_started(), 0);
}

#[tokio::test]
async fn test_authenticate_type_only_probes_that_type() {
    let host = Host::new();
    let finger = Arc::new(SimulatedSensor::new());
    let face = Arc::new(SimulatedSensor::new().with_attempt(vec![emit(NativeSignal::Succeeded)]));
    let provider = SimulatedProvider::new()
        .with_sensor(BiometricMethod::FingerprintFramework, finger.clone())
        .with_sensor(BiometricMethod::FaceFramework, face);
    host.install(&provider).await;

    let listener = Arc::new(RecordingListener::new());
    let session = host
        .registry
        .authenticate_type(BiometricType::Face, listener.clone(), RestartPolicy::default_policy())
        .await;
    assert_eq!(session.tags(), vec![BiometricMethod::FaceFramework.tag()]);
    assert_eq!(session.join().await[0].1, ProbeOutcome::Succeeded);
    assert_eq!(finger.probes_started(), 0);
}

#[tokio::test]
async fn test_lockout_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lockout.store");
    let tag = BiometricMethod::FingerprintFramework.tag();

    {
        let store = Arc::new(EncryptedFileStore::open(&path, "correct horse").unwrap());
        let host = Host::with_store(store);
        host.lockout.lockout(tag);
        host.lockout.set_permanently_locked(BiometricMethod::FaceFramework.tag());
    }

    let store = Arc::new(EncryptedFileStore::open(&path, "correct horse").unwrap());
    let host = Host::with_store(store);
    // The stored timestamp came from the same simulated clock start
    assert!(host.lockout.is_locked_out(tag));
    assert!(host.lockout.is_permanently_locked(BiometricMethod::FaceFramework.tag()));

    host.clock.advance(Duration::from_secs(31));
    assert!(!host.lockout.is_locked_out(tag));
}

#[tokio::test]
async fn test_permanent_lockout_blocks_until_reset() {
    let host = Host::new();
    let sensor = Arc::new(
        SimulatedSensor::new()
            .with_attempt(vec![framework_error(framework::ERROR_LOCKOUT_PERMANENT)])
            .with_attempt(vec![emit(NativeSignal::Succeeded)]),
    );
    let provider = SimulatedProvider::new().with_sensor(BiometricMethod::FaceFramework, sensor);
    host.install(&provider).await;
    let face = host.module(BiometricMethod::FaceFramework).await;

    let listener = Arc::new(RecordingListener::new());
    let outcomes = host.authenticate(&listener).await.join().await;
    assert_eq!(outcomes[0].1, ProbeOutcome::Failed(FailureReason::HardwareUnavailable));
    assert!(face.is_locked_out());

    // No window: the lock outlasts any amount of time
    host.clock.advance(Duration::from_secs(3600));
    let result = host
        .registry
        .authenticate_module(face.clone(), listener.clone(), RestartPolicy::default_policy())
        .await;
    assert!(matches!(
        result,
        Err(DispatchError::ModuleNotReady {
            reason: "locked out",
            ..
        })
    ));

    host.lockout.clear(face.tag());
    let session = host
        .registry
        .authenticate_module(face.clone(), listener.clone(), RestartPolicy::default_policy())
        .await
        .unwrap();
    assert_eq!(session.join().await[0].1, ProbeOutcome::Succeeded);
    assert!(!face.is_locked_out());
    assert_eq!(listener.successes(), vec![face.tag()]);
}

#[tokio::test]
async fn test_scenario_file_drives_full_session() {
    let json = r#"{
        "sensors": [
            {
                "method": "fingerprint_framework",
                "attempts": [
                    [
                        { "emit": { "signal": "acquired", "code": 1 } },
                        { "emit": { "signal": "help", "code": 5, "message": "Too fast" } },
                        { "emit": { "signal": "failed" } },
                        { "emit": { "signal": "succeeded" } }
                    ]
                ]
            },
            { "method": "iris_framework", "hardware_present": false }
        ]
    }"#;
    let scenario: Scenario = serde_json::from_str(json).unwrap();
    let provider = SimulatedProvider::from_scenario(&scenario);

    let host = Host::new();
    let registered = host.install(&provider).await;
    assert_eq!(registered, vec![BiometricMethod::FingerprintFramework.tag()]);

    let listener = Arc::new(RecordingListener::new());
    let outcomes = host.authenticate(&listener).await.join().await;
    let tag = BiometricMethod::FingerprintFramework.tag();
    assert_eq!(outcomes, vec![(tag, ProbeOutcome::Succeeded)]);

    let events = listener.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], AuthEvent::AcquisitionProgress { code: 1 });
    assert!(matches!(events[1], AuthEvent::Help { .. }));
    assert_eq!(
        events[2],
        AuthEvent::Failure {
            reason: FailureReason::AuthenticationFailed,
            tag
        }
    );
    assert_eq!(events[3], AuthEvent::Success { tag });
}

#[tokio::test]
async fn test_cancel_without_probes_is_noop() {
    let host = Host::new();
    host.registry.cancel_authentication().await;
    host.registry.cancel_module(ModuleTag(1)).await;
    assert!(host.registry.active_probes().await.is_empty());
}

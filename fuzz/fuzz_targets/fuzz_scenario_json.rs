#![no_main]

use libfuzzer_sys::fuzz_target;
use unibio_dispatch::{DispatchConfig, NativeSignal, Scenario, SimulatedProvider};

fuzz_target!(|data: &[u8]| {
    // Malformed input must be rejected, never panic
    if let Ok(scenario) = serde_json::from_slice::<Scenario>(data) {
        let _ = SimulatedProvider::from_scenario(&scenario);

        let encoded = serde_json::to_vec(&scenario).unwrap();
        let decoded: Scenario = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.sensors.len(), scenario.sensors.len());
    }

    if let Ok(signal) = serde_json::from_slice::<NativeSignal>(data) {
        let encoded = serde_json::to_vec(&signal).unwrap();
        let decoded: NativeSignal = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, signal);
    }

    if let Ok(config) = serde_json::from_slice::<DispatchConfig>(data) {
        let _ = config.validate();
        let _ = config.restart_policy();
    }
});

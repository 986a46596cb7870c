//! Module construction
//!
//! The host exposes its vendor services through a [`SensorProvider`]. The
//! factory pairs each service with the code table its vendor speaks and
//! registers the resulting modules.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use unibio_core::{BiometricMethod, ModuleTag};

use crate::config::DispatchConfig;
use crate::lockout::LockoutTracker;
use crate::module::{BiometricModule, VendorModule};
use crate::native::NativeSensor;
use crate::registry::Registry;
use crate::vendor::{FrameworkCodes, SamsungPassCodes};

/// Source of vendor sensor services
pub trait SensorProvider: Send + Sync {
    /// The service backing `method`, if the host has one
    fn probe(&self, method: BiometricMethod) -> Option<Arc<dyn NativeSensor>>;
}

/// Builds modules sharing one lockout tracker
pub struct ModuleFactory {
    lockout: Arc<LockoutTracker>,
    restart_delay: Duration,
}

impl ModuleFactory {
    pub fn new(lockout: Arc<LockoutTracker>) -> Self {
        Self {
            lockout,
            restart_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &DispatchConfig, lockout: Arc<LockoutTracker>) -> Self {
        Self::new(lockout).with_restart_delay(config.restart_delay())
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn lockout(&self) -> &Arc<LockoutTracker> {
        &self.lockout
    }

    /// Build the module for `method`.
    ///
    /// A missing service still yields a module; it reports no hardware.
    pub fn build(
        &self,
        method: BiometricMethod,
        provider: &dyn SensorProvider,
    ) -> Arc<dyn BiometricModule> {
        let sensor = provider.probe(method);
        if sensor.is_none() {
            debug!("No native service for {}", method);
        }

        // Samsung Pass only covers fingerprints; the other Samsung services
        // report through framework callbacks.
        match method {
            BiometricMethod::FingerprintSamsung => Arc::new(
                VendorModule::new(method, sensor, SamsungPassCodes, self.lockout.clone())
                    .with_restart_delay(self.restart_delay),
            ),
            _ => Arc::new(
                VendorModule::new(method, sensor, FrameworkCodes, self.lockout.clone())
                    .with_restart_delay(self.restart_delay),
            ),
        }
    }

    pub fn build_all(
        &self,
        methods: &[BiometricMethod],
        provider: &dyn SensorProvider,
    ) -> BTreeMap<ModuleTag, Arc<dyn BiometricModule>> {
        methods
            .iter()
            .map(|&method| (method.tag(), self.build(method, provider)))
            .collect()
    }

    /// Build and register a module per method; returns the registered tags
    pub async fn initialize(
        &self,
        registry: &Registry,
        methods: &[BiometricMethod],
        provider: &dyn SensorProvider,
    ) -> Vec<ModuleTag> {
        let mut registered = Vec::new();
        for (tag, module) in self.build_all(methods, provider) {
            if registry.register_module(module).await {
                registered.push(tag);
            }
        }
        info!("Initialized {} of {} biometric modules", registered.len(), methods.len());
        registered
    }
}

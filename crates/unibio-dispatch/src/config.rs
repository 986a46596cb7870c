//! Dispatcher configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use unibio_core::{BiometricMethod, RestartPolicy, DEFAULT_MAX_RESTARTS, LOCKOUT_WINDOW_MS};

use crate::error::DispatchError;

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a module stays locked out after a failure burst (milliseconds)
    pub lockout_window_ms: u64,

    /// Restart budget for sensor and match failures, per session
    pub max_restarts: u32,

    /// Pause before re-issuing a restarted probe (milliseconds)
    pub restart_delay_ms: u64,

    /// Encrypted lockout store
    pub store_path: PathBuf,

    /// Methods the host should try to build modules for
    pub enabled_methods: Vec<BiometricMethod>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lockout_window_ms: LOCKOUT_WINDOW_MS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_delay_ms: 200,
            store_path: Self::default_store_path(),
            enabled_methods: BiometricMethod::ALL.to_vec(),
        }
    }
}

impl DispatchConfig {
    fn default_store_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("unibio")
            .join("lockout.store")
    }

    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create the store directory if it doesn't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.lockout_window_ms == 0 {
            return Err(DispatchError::Config(
                "lockout_window_ms must be positive".to_string(),
            ));
        }
        for (i, method) in self.enabled_methods.iter().enumerate() {
            if self.enabled_methods[..i].contains(method) {
                return Err(DispatchError::Config(format!(
                    "method {} enabled twice",
                    method
                )));
            }
        }
        Ok(())
    }

    /// A fresh session policy with this configuration's budget
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::restart_timeouts(self.max_restarts)
    }

    pub fn lockout_window(&self) -> Duration {
        Duration::from_millis(self.lockout_window_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

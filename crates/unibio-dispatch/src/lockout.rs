//! Per-module lockout bookkeeping
//!
//! After a burst of failed attempts a module refuses to probe for a fixed
//! window. The timestamp of the burst is persisted under the module tag, so
//! the lockout survives a restart of the host process. Expired entries are
//! cleared lazily by the read that notices the expiry.
//!
//! A vendor service may also report that its sensor is permanently locked.
//! That flag has no window; it stays until the module authenticates
//! successfully or the lockout is reset explicitly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use unibio_core::{ModuleTag, LOCKOUT_WINDOW_MS};

use crate::clock::Clock;
use crate::store::SecureStore;

/// Lockout state for every module, backed by a shared secure store
pub struct LockoutTracker {
    store: Arc<dyn SecureStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl LockoutTracker {
    pub fn new(store: Arc<dyn SecureStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_window(store, clock, Duration::from_millis(LOCKOUT_WINDOW_MS))
    }

    pub fn with_window(
        store: Arc<dyn SecureStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn timestamp_key(tag: ModuleTag) -> String {
        format!("lockout.{}", tag)
    }

    fn permanent_key(tag: ModuleTag) -> String {
        format!("lockout.permanent.{}", tag)
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    /// Whether the module is locked out, by timestamp or permanently.
    ///
    /// Clears an expired timestamp as a side effect.
    pub fn is_locked_out(&self, tag: ModuleTag) -> bool {
        self.is_permanently_locked(tag) || self.is_timed_out(tag)
    }

    fn is_timed_out(&self, tag: ModuleTag) -> bool {
        let key = Self::timestamp_key(tag);
        let timestamp = match self.store.get(&key) {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Failed to read lockout state for module {}: {}", tag, e);
                return false;
            }
        };

        if timestamp == 0 {
            return false;
        }

        let elapsed = self.clock.now_millis().saturating_sub(timestamp);
        if elapsed >= self.window_millis() {
            debug!("Lockout of module {} expired", tag);
            if let Err(e) = self.store.remove(&key) {
                warn!("Failed to clear expired lockout for module {}: {}", tag, e);
            }
            return false;
        }

        true
    }

    /// Start a lockout window now, unless one is already running
    pub fn lockout(&self, tag: ModuleTag) {
        if self.is_timed_out(tag) {
            return;
        }
        let now = self.clock.now_millis();
        debug!("Locking out module {} at {}", tag, now);
        if let Err(e) = self.store.put(&Self::timestamp_key(tag), now) {
            warn!("Failed to persist lockout for module {}: {}", tag, e);
        }
    }

    /// Time left in the current lockout window
    pub fn remaining(&self, tag: ModuleTag) -> Option<Duration> {
        if !self.is_timed_out(tag) {
            return None;
        }
        let timestamp = self.store.get(&Self::timestamp_key(tag)).ok()?;
        let elapsed = self.clock.now_millis().saturating_sub(timestamp).max(0);
        let left = self.window_millis().saturating_sub(elapsed).max(0);
        Some(Duration::from_millis(u64::try_from(left).unwrap_or(0)))
    }

    pub fn is_permanently_locked(&self, tag: ModuleTag) -> bool {
        match self.store.get(&Self::permanent_key(tag)) {
            Ok(flag) => flag != 0,
            Err(e) => {
                warn!("Failed to read permanent lockout for module {}: {}", tag, e);
                false
            }
        }
    }

    pub fn set_permanently_locked(&self, tag: ModuleTag) {
        debug!("Module {} reported permanent lockout", tag);
        if let Err(e) = self.store.put(&Self::permanent_key(tag), 1) {
            warn!("Failed to persist permanent lockout for module {}: {}", tag, e);
        }
    }

    pub fn clear_permanent(&self, tag: ModuleTag) {
        if let Err(e) = self.store.remove(&Self::permanent_key(tag)) {
            warn!("Failed to clear permanent lockout for module {}: {}", tag, e);
        }
    }

    /// Drop every lockout record of the module
    pub fn clear(&self, tag: ModuleTag) {
        if let Err(e) = self.store.remove(&Self::timestamp_key(tag)) {
            warn!("Failed to clear lockout for module {}: {}", tag, e);
        }
        self.clear_permanent(tag);
    }
}

//! Module registry and authentication fan-out
//!
//! The registry owns the set of registered modules, keyed by tag, and the
//! cancellation handle of every running probe. One module has at most one
//! running probe: starting a new one cancels the previous handle first.
//!
//! Aggregate queries ask every registered module; the per-type variants
//! only ask modules of one biometric type. Listener callbacks of every
//! session go through the registry's single [`CallbackQueue`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use unibio_core::{
    AuthenticationListener, BiometricType, FailureReason, ModuleTag, RestartPolicy,
};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::delivery::{CallbackQueue, QueuedListener};
use crate::error::{DispatchError, Result};
use crate::module::{BiometricModule, ProbeOutcome};

type Handles = Arc<Mutex<HashMap<ModuleTag, CancelToken>>>;

/// Registered modules and their running probes
#[derive(Default)]
pub struct Registry {
    modules: RwLock<BTreeMap<ModuleTag, Arc<dyn BiometricModule>>>,
    handles: Handles,
    delivery: OnceLock<CallbackQueue>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivery queue, spawned on first use inside the runtime
    fn delivery(&self) -> &CallbackQueue {
        self.delivery.get_or_init(CallbackQueue::spawn)
    }

    /// Register a module.
    ///
    /// Returns false when the tag is taken or the module has no hardware.
    pub async fn register_module(&self, module: Arc<dyn BiometricModule>) -> bool {
        let tag = module.tag();
        let mut modules = self.modules.write().await;

        if modules.contains_key(&tag) {
            debug!("Module {} already registered", tag);
            return false;
        }

        if !module.is_hardware_present() {
            info!("Module {} has no hardware, not registering", tag);
            return false;
        }

        info!("Registered module {} ({})", tag, module.method());
        modules.insert(tag, module);
        true
    }

    /// Cancel every probe and drop every module
    pub async fn clean_modules(&self) {
        self.cancel_authentication().await;
        self.modules.write().await.clear();
        debug!("Registry cleared");
    }

    /// Registered modules in tag order
    pub async fn modules(&self) -> Vec<Arc<dyn BiometricModule>> {
        self.modules.read().await.values().cloned().collect()
    }

    pub async fn module(&self, tag: ModuleTag) -> Option<Arc<dyn BiometricModule>> {
        self.modules.read().await.get(&tag).cloned()
    }

    async fn modules_of(&self, ty: BiometricType) -> Vec<Arc<dyn BiometricModule>> {
        self.modules
            .read()
            .await
            .values()
            .filter(|module| module.method().biometric_type() == ty)
            .cloned()
            .collect()
    }

    pub async fn is_hardware_detected(&self) -> bool {
        self.modules
            .read()
            .await
            .values()
            .any(|module| module.is_hardware_present())
    }

    pub async fn has_enrolled(&self) -> bool {
        self.modules
            .read()
            .await
            .values()
            .any(|module| module.has_enrolled())
    }

    pub async fn is_locked_out(&self) -> bool {
        self.modules
            .read()
            .await
            .values()
            .any(|module| module.is_locked_out())
    }

    pub async fn is_hardware_detected_for(&self, ty: BiometricType) -> bool {
        self.modules_of(ty)
            .await
            .iter()
            .any(|module| module.is_hardware_present())
    }

    pub async fn has_enrolled_for(&self, ty: BiometricType) -> bool {
        self.modules_of(ty).await.iter().any(|module| module.has_enrolled())
    }

    pub async fn is_locked_out_for(&self, ty: BiometricType) -> bool {
        self.modules_of(ty).await.iter().any(|module| module.is_locked_out())
    }

    /// Start a probe on every registered module that is ready.
    ///
    /// Modules without hardware or enrollment, and modules that are locked
    /// out, are skipped.
    pub async fn authenticate(
        &self,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> AuthSession {
        let modules = self.modules().await;
        self.fan_out(modules, listener, policy).await
    }

    /// Like [`Registry::authenticate`], restricted to one biometric type
    pub async fn authenticate_type(
        &self,
        ty: BiometricType,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> AuthSession {
        let modules = self.modules_of(ty).await;
        self.fan_out(modules, listener, policy).await
    }

    /// Start a probe on one module.
    ///
    /// Fails with [`DispatchError::ModuleNotReady`] when the module lacks
    /// hardware or enrollment, or is locked out.
    pub async fn authenticate_module(
        &self,
        module: Arc<dyn BiometricModule>,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> Result<AuthSession> {
        let id = Uuid::new_v4();
        let listener = self.delivery().front(listener);
        let probe = self.start_probe(module, &listener, policy, id).await?;
        Ok(AuthSession {
            id,
            queue: self.delivery().clone(),
            probes: vec![probe],
        })
    }

    /// Start a probe on the registered module with this tag
    pub async fn authenticate_tag(
        &self,
        tag: ModuleTag,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> Result<AuthSession> {
        let module = self
            .module(tag)
            .await
            .ok_or(DispatchError::ModuleNotRegistered(tag))?;
        self.authenticate_module(module, listener, policy).await
    }

    async fn fan_out(
        &self,
        modules: Vec<Arc<dyn BiometricModule>>,
        listener: Arc<dyn AuthenticationListener>,
        policy: RestartPolicy,
    ) -> AuthSession {
        let id = Uuid::new_v4();
        let listener = self.delivery().front(listener);
        let mut probes = Vec::new();

        for module in modules {
            let tag = module.tag();
            match self.start_probe(module, &listener, policy.clone(), id).await {
                Ok(probe) => probes.push(probe),
                Err(e) => debug!(session = %id, "Skipping module {}: {}", tag, e),
            }
        }

        if probes.is_empty() {
            warn!(session = %id, "No module ready to authenticate");
        } else {
            info!(session = %id, modules = probes.len(), "Authentication started");
        }

        AuthSession {
            id,
            queue: self.delivery().clone(),
            probes,
        }
    }

    async fn start_probe(
        &self,
        module: Arc<dyn BiometricModule>,
        listener: &QueuedListener,
        policy: RestartPolicy,
        session: Uuid,
    ) -> Result<ProbeTask> {
        let tag = module.tag();

        let not_ready = |reason| DispatchError::ModuleNotReady { tag, reason };
        if !module.is_hardware_present() {
            return Err(not_ready("hardware not present"));
        }
        if !module.has_enrolled() {
            return Err(not_ready("no biometrics enrolled"));
        }
        if module.is_locked_out() {
            return Err(not_ready("locked out"));
        }

        let token = CancelToken::new();
        if let Some(previous) = self.handles.lock().await.insert(tag, token.clone()) {
            debug!(session = %session, "Cancelling previous probe of module {}", tag);
            previous.cancel();
        }

        let listener: Arc<dyn AuthenticationListener> = Arc::new(listener.clone());
        let handles = Arc::clone(&self.handles);
        let task = tokio::spawn(async move {
            let outcome = module.authenticate(token.clone(), listener, policy).await;
            debug!(session = %session, module = %tag, ?outcome, "Probe finished");

            let mut handles = handles.lock().await;
            if handles.get(&tag).is_some_and(|current| current.same_as(&token)) {
                handles.remove(&tag);
                if outcome == ProbeOutcome::UserCancelled {
                    token.cancel();
                }
            }
            outcome
        });

        Ok(ProbeTask { tag, task })
    }

    /// Cancel every running probe
    pub async fn cancel_authentication(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain().collect();
        for (tag, token) in handles {
            debug!("Cancelling probe of module {}", tag);
            token.cancel();
        }
    }

    /// Cancel the running probe of one module, if any
    pub async fn cancel_module(&self, tag: ModuleTag) {
        let token = self.handles.lock().await.remove(&tag);
        if let Some(token) = token {
            debug!("Cancelling probe of module {}", tag);
            token.cancel();
        }
    }

    /// Token of the module's running probe
    pub async fn handle(&self, tag: ModuleTag) -> Option<CancelToken> {
        self.handles.lock().await.get(&tag).cloned()
    }

    /// Tags of modules with a running probe
    pub async fn active_probes(&self) -> Vec<ModuleTag> {
        let mut tags: Vec<_> = self.handles.lock().await.keys().copied().collect();
        tags.sort();
        tags
    }
}

struct ProbeTask {
    tag: ModuleTag,
    task: JoinHandle<ProbeOutcome>,
}

/// Probes started by one authenticate call.
///
/// Dropping the session does not stop its probes; use the registry's cancel
/// operations for that.
pub struct AuthSession {
    id: Uuid,
    queue: CallbackQueue,
    probes: Vec<ProbeTask>,
}

impl AuthSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Tags of the modules that started a probe
    pub fn tags(&self) -> Vec<ModuleTag> {
        self.probes.iter().map(|probe| probe.tag).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Wait until every event posted so far reached its listener
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// Wait for every probe to end, then for the listener to catch up
    pub async fn join(self) -> Vec<(ModuleTag, ProbeOutcome)> {
        let mut outcomes = Vec::with_capacity(self.probes.len());
        for probe in self.probes {
            let outcome = match probe.task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(session = %self.id, "Probe of module {} aborted: {}", probe.tag, e);
                    ProbeOutcome::Failed(FailureReason::Unknown)
                }
            };
            outcomes.push((probe.tag, outcome));
        }
        self.queue.flush().await;
        outcomes
    }
}

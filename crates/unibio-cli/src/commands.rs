//! CLI command implementations

use std::io::{BufRead, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use unibio_core::{
    AuthEvent, AuthenticationListener, BiometricMethod, BiometricType, FailureReason, HelpReason,
    ModuleTag,
};
use unibio_dispatch::{
    DispatchConfig, EncryptedFileStore, LockoutTracker, MemoryStore, ModuleFactory, Registry,
    SecureStore, SimulatedProvider, SystemClock,
};

/// Prints every event as one JSON line on stdout
struct PrintingListener;

impl PrintingListener {
    fn print(&self, event: AuthEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode event {:?}: {}", event, e),
        }
    }
}

impl AuthenticationListener for PrintingListener {
    fn on_success(&self, tag: ModuleTag) {
        self.print(AuthEvent::Success { tag });
    }

    fn on_failure(&self, reason: FailureReason, tag: ModuleTag) {
        self.print(AuthEvent::Failure { reason, tag });
    }

    fn on_help(&self, reason: HelpReason, message: Option<&str>) {
        self.print(AuthEvent::Help {
            reason,
            message: message.map(str::to_string),
        });
    }

    fn on_progress(&self, code: i32) {
        self.print(AuthEvent::AcquisitionProgress { code });
    }
}

pub fn memory_store() -> Arc<dyn SecureStore> {
    Arc::new(MemoryStore::new())
}

pub const PASSPHRASE_ENV: &str = "UNIBIO_STORE_PASSPHRASE";

/// Store passphrase from the flag, the environment, or one line of stdin
pub fn store_passphrase(flag: Option<String>) -> Result<String> {
    if let Some(passphrase) = flag {
        warn!("--passphrase is visible in process listings, prefer {}", PASSPHRASE_ENV);
        return Ok(passphrase);
    }
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        return Ok(passphrase);
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("Lockout store passphrase: ");
    }
    read_passphrase(stdin.lock())
}

fn read_passphrase(mut reader: impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read the store passphrase from stdin")?;

    let passphrase = line.trim_end_matches(['\r', '\n']);
    if passphrase.is_empty() {
        anyhow::bail!("A store passphrase is required ({} or stdin)", PASSPHRASE_ENV);
    }
    Ok(passphrase.to_string())
}

pub fn open_store(config: &DispatchConfig, passphrase: &str) -> Result<Arc<dyn SecureStore>> {
    let store = EncryptedFileStore::open(&config.store_path, passphrase)
        .with_context(|| format!("Failed to open lockout store {}", config.store_path.display()))?;
    Ok(Arc::new(store))
}

fn tracker(config: &DispatchConfig, store: Arc<dyn SecureStore>) -> Arc<LockoutTracker> {
    Arc::new(LockoutTracker::with_window(
        store,
        Arc::new(SystemClock),
        config.lockout_window(),
    ))
}

fn method_label(tag: ModuleTag) -> String {
    BiometricMethod::from_tag(tag)
        .map(|method| method.to_string())
        .unwrap_or_else(|_| tag.to_string())
}

/// Register the scenario's sensors and authenticate until every probe ends
pub async fn simulate(
    config: &DispatchConfig,
    store: Arc<dyn SecureStore>,
    scenario: &Path,
    biometric_type: Option<BiometricType>,
    timeout_ms: u64,
) -> Result<()> {
    let provider = SimulatedProvider::load(scenario)
        .with_context(|| format!("Failed to load scenario {}", scenario.display()))?;

    let factory = ModuleFactory::from_config(config, tracker(config, store));
    let registry = Registry::new();
    let registered = factory
        .initialize(&registry, &config.enabled_methods, &provider)
        .await;
    if registered.is_empty() {
        anyhow::bail!("No biometric hardware present in {}", scenario.display());
    }

    let listener: Arc<dyn AuthenticationListener> = Arc::new(PrintingListener);
    let policy = config.restart_policy();
    let session = match biometric_type {
        Some(ty) => registry.authenticate_type(ty, listener, policy).await,
        None => registry.authenticate(listener, policy).await,
    };

    if session.is_empty() {
        println!("No module ready to authenticate");
        return Ok(());
    }
    info!(session = %session.id(), "Probing {} module(s)", session.tags().len());

    let join = session.join();
    tokio::pin!(join);
    let outcomes = tokio::select! {
        outcomes = &mut join => outcomes,
        _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
            warn!("Timed out after {}ms, cancelling authentication", timeout_ms);
            registry.cancel_authentication().await;
            join.await
        }
    };

    println!();
    println!("Outcomes:");
    for (tag, outcome) in outcomes {
        println!("  {:<24} {:?}", method_label(tag), outcome);
    }

    Ok(())
}

pub fn lockout_status(config: &DispatchConfig, store: Arc<dyn SecureStore>) {
    let tracker = tracker(config, store);

    println!("Lockout state (window {}ms):", config.lockout_window_ms);
    for method in BiometricMethod::ALL {
        let tag = method.tag();
        let state = if tracker.is_permanently_locked(tag) {
            "permanently locked".to_string()
        } else if let Some(left) = tracker.remaining(tag) {
            format!("locked, {:.1}s left", left.as_secs_f64())
        } else {
            "clear".to_string()
        };
        println!("  {:<24} [{:>3}] {}", method, tag, state);
    }
}

pub fn lockout_clear(
    config: &DispatchConfig,
    store: Arc<dyn SecureStore>,
    method: Option<&str>,
) -> Result<()> {
    let tracker = tracker(config, store);
    let methods = match method {
        Some(method) => vec![method.parse::<BiometricMethod>()?],
        None => BiometricMethod::ALL.to_vec(),
    };

    for method in methods {
        tracker.clear(method.tag());
        println!("✓ Cleared lockout of {}", method);
    }
    Ok(())
}

pub fn list_methods() {
    println!("{:>5}  {:<24} {:<12} vendor", "tag", "method", "type");
    for method in BiometricMethod::ALL {
        println!(
            "{:>5}  {:<24} {:<12} {}",
            method.tag(),
            method,
            method.biometric_type(),
            method.vendor()
        );
    }
}

//! Error types for the dispatcher

use thiserror::Error;
use unibio_core::ModuleTag;

/// Result type alias for dispatcher operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur in the dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] unibio_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Secure store error
    #[error("Store error: {0}")]
    Store(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Store contents could not be decrypted
    #[error("Decryption failed - wrong passphrase or corrupted store")]
    DecryptionFailed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication requested on a module that is not ready.
    ///
    /// Callers are expected to filter candidates first, so this is a
    /// programming error rather than an authentication outcome.
    #[error("Module {tag} not ready: {reason}")]
    ModuleNotReady { tag: ModuleTag, reason: &'static str },

    /// No module with this tag is registered
    #[error("Module not registered: {0}")]
    ModuleNotRegistered(ModuleTag),
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Serialization(e.to_string())
    }
}

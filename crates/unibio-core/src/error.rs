//! Error types for unibio core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown biometric method tag: {0}")]
    UnknownMethodTag(u32),

    #[error("Unknown biometric method: {0}")]
    UnknownMethodName(String),

    #[error("Unknown biometric type: {0}")]
    UnknownBiometricType(String),
}

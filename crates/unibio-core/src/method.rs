//! Catalogue of supported biometric methods

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable identity of a module, unique per module kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleTag(pub u32);

impl ModuleTag {
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of biometric a sensor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometricType {
    Fingerprint,
    Face,
    Iris,
}

impl fmt::Display for BiometricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BiometricType::Fingerprint => "fingerprint",
            BiometricType::Face => "face",
            BiometricType::Iris => "iris",
        };
        f.pad(name)
    }
}

impl FromStr for BiometricType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fingerprint" => Ok(BiometricType::Fingerprint),
            "face" => Ok(BiometricType::Face),
            "iris" => Ok(BiometricType::Iris),
            _ => Err(Error::UnknownBiometricType(s.to_string())),
        }
    }
}

/// A vendor binding for one kind of sensor.
///
/// Tags are grouped by type: fingerprint below 100, face from 100, iris
/// from 200. They are persisted as lockout keys and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricMethod {
    /// Platform fingerprint service
    FingerprintFramework,
    /// Samsung Pass fingerprint service
    FingerprintSamsung,
    /// Platform face service
    FaceFramework,
    /// Samsung face service
    FaceSamsung,
    /// Platform iris service
    IrisFramework,
    /// Samsung iris service
    IrisSamsung,
}

impl BiometricMethod {
    /// Every known method, in tag order
    pub const ALL: [BiometricMethod; 6] = [
        BiometricMethod::FingerprintFramework,
        BiometricMethod::FingerprintSamsung,
        BiometricMethod::FaceFramework,
        BiometricMethod::FaceSamsung,
        BiometricMethod::IrisFramework,
        BiometricMethod::IrisSamsung,
    ];

    pub const fn tag(self) -> ModuleTag {
        match self {
            BiometricMethod::FingerprintFramework => ModuleTag(1),
            BiometricMethod::FingerprintSamsung => ModuleTag(3),
            BiometricMethod::FaceFramework => ModuleTag(100),
            BiometricMethod::FaceSamsung => ModuleTag(101),
            BiometricMethod::IrisFramework => ModuleTag(200),
            BiometricMethod::IrisSamsung => ModuleTag(201),
        }
    }

    pub const fn biometric_type(self) -> BiometricType {
        match self {
            BiometricMethod::FingerprintFramework | BiometricMethod::FingerprintSamsung => {
                BiometricType::Fingerprint
            }
            BiometricMethod::FaceFramework | BiometricMethod::FaceSamsung => BiometricType::Face,
            BiometricMethod::IrisFramework | BiometricMethod::IrisSamsung => BiometricType::Iris,
        }
    }

    /// Vendor that provides the native service
    pub const fn vendor(self) -> &'static str {
        match self {
            BiometricMethod::FingerprintFramework
            | BiometricMethod::FaceFramework
            | BiometricMethod::IrisFramework => "framework",
            BiometricMethod::FingerprintSamsung
            | BiometricMethod::FaceSamsung
            | BiometricMethod::IrisSamsung => "samsung",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            BiometricMethod::FingerprintFramework => "fingerprint_framework",
            BiometricMethod::FingerprintSamsung => "fingerprint_samsung",
            BiometricMethod::FaceFramework => "face_framework",
            BiometricMethod::FaceSamsung => "face_samsung",
            BiometricMethod::IrisFramework => "iris_framework",
            BiometricMethod::IrisSamsung => "iris_samsung",
        }
    }

    /// Look up a method by its persisted tag
    pub fn from_tag(tag: ModuleTag) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.tag() == tag)
            .ok_or(Error::UnknownMethodTag(tag.0))
    }
}

impl fmt::Display for BiometricMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for BiometricMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(tag) = s.parse::<u32>() {
            return Self::from_tag(ModuleTag(tag));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownMethodName(s.to_string()))
    }
}

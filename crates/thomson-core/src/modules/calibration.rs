//! Spectral and absolute calibration artifacts and their per-fiber selection.

use super::response::ExpectedResponseTable;
use crate::common::config::read_json_artifact;
use crate::domain::{ThomsonError, ThomsonResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Relative channel sensitivities keyed by polychromator name prefix.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SpectralCalibrationSet {
    entries: BTreeMap<String, Vec<f64>>,
}

impl SpectralCalibrationSet {
    pub fn new(entries: BTreeMap<String, Vec<f64>>) -> Self {
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> ThomsonResult<Self> {
        Ok(read_json_artifact(path)?)
    }

    /// Case-insensitive prefix match of the fiber name against the stored
    /// keys. With several matches the longest key wins.
    pub fn lookup(&self, fiber_name: &str) -> Option<&[f64]> {
        let name = fiber_name.to_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| name.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, values)| values.as_slice())
    }
}

/// Photo-electrons per unit density and laser energy, keyed by exact fiber name.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AbsoluteCalibrationSet {
    entries: BTreeMap<String, f64>,
}

impl AbsoluteCalibrationSet {
    pub fn new(entries: BTreeMap<String, f64>) -> Self {
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> ThomsonResult<Self> {
        Ok(read_json_artifact(path)?)
    }

    pub fn lookup(&self, fiber_name: &str) -> Option<f64> {
        self.entries.get(fiber_name).copied()
    }
}

/// Calibration inputs of one fiber.
///
/// Only the spectral vector is mandatory; a fiber without an absolute
/// calibration or response table still integrates its signals but takes no
/// part in Te/ne fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct FiberCalibration {
    pub spectral: Vec<f64>,
    pub absolute: Option<f64>,
    pub response: Option<Arc<ExpectedResponseTable>>,
}

impl FiberCalibration {
    pub fn new(spectral: Vec<f64>) -> Self {
        Self {
            spectral,
            absolute: None,
            response: None,
        }
    }

    pub fn with_absolute(mut self, absolute: f64) -> Self {
        self.absolute = Some(absolute);
        self
    }

    pub fn with_response(mut self, response: Arc<ExpectedResponseTable>) -> Self {
        self.response = Some(response);
        self
    }

    /// Selects a fiber's entries from the loaded sets. A missing spectral
    /// vector is a configuration error; missing absolute calibration is not.
    pub fn select(
        fiber_name: &str,
        spectral: &SpectralCalibrationSet,
        absolute: &AbsoluteCalibrationSet,
        response: Option<Arc<ExpectedResponseTable>>,
    ) -> ThomsonResult<Self> {
        let vector = spectral.lookup(fiber_name).ok_or_else(|| {
            ThomsonError::input_validation(
                "CONFIG.SPECTRAL_CALIBRATION",
                format!("no spectral calibration entry matches fiber '{fiber_name}'"),
            )
        })?;

        Ok(Self {
            spectral: vector.to_vec(),
            absolute: absolute.lookup(fiber_name),
            response,
        })
    }

    pub fn capability(&self) -> FitCapability {
        match (&self.response, self.absolute) {
            (Some(_), Some(_)) => FitCapability::TemperatureAndDensity,
            (Some(_), None) => FitCapability::TemperatureOnly,
            (None, _) => FitCapability::IntegralsOnly,
        }
    }
}

/// Which pipeline outputs a fiber can produce with its calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitCapability {
    IntegralsOnly,
    TemperatureOnly,
    TemperatureAndDensity,
}

impl FitCapability {
    pub const fn fits_temperature(self) -> bool {
        !matches!(self, Self::IntegralsOnly)
    }

    pub const fn fits_density(self) -> bool {
        matches!(self, Self::TemperatureAndDensity)
    }
}

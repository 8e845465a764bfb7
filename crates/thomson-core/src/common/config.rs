//! Typed pipeline configuration and the JSON artifact loader shared by every
//! calibration and layout file.

use super::constants::{DEFAULT_APD_GAIN, DIGITIZER_SAMPLE_STEP_NS, ELECTRON_CHARGE};
use crate::domain::{LaserParameters, ThomsonError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Number of leading samples used for the baseline level and tracking noise.
    pub noise_len: usize,
    /// Digitizer sampling step in ns.
    pub sample_step: f64,
    pub excess_noise_factor: f64,
    /// The first decoded record is a null trigger and is skipped by default.
    pub first_shot: usize,
    pub shot_count: Option<usize>,
}

impl IntegrationConfig {
    pub fn shot_range(&self, available: usize) -> Range<usize> {
        let start = self.first_shot.min(available);
        let end = match self.shot_count {
            Some(count) => start.saturating_add(count).min(available),
            None => available,
        };
        start..end
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            noise_len: 400,
            sample_step: DIGITIZER_SAMPLE_STEP_NS,
            excess_noise_factor: 3.0,
            first_shot: 1,
            shot_count: None,
        }
    }
}

/// Unit convention of the absolute calibration constant.
///
/// The absolute calibration is expressed without the APD multiplication and
/// the electron charge; both enter the density normalization through
/// `laser_wavelength / (detector_gain * electron_charge)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DensityConvention {
    pub detector_gain: f64,
    pub electron_charge: f64,
}

impl DensityConvention {
    pub fn unit_correction(&self, laser: &LaserParameters) -> f64 {
        laser.wavelength / (self.detector_gain * self.electron_charge)
    }
}

impl Default for DensityConvention {
    fn default() -> Self {
        Self {
            detector_gain: DEFAULT_APD_GAIN,
            electron_charge: ELECTRON_CHARGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub integration: IntegrationConfig,
    pub density: DensityConvention,
    pub laser: LaserParameters,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ThomsonError> {
        if self.integration.noise_len < 2 {
            return Err(ThomsonError::input_validation(
                "CONFIG.NOISE_LEN",
                format!(
                    "noise_len must cover at least 2 samples, got {}",
                    self.integration.noise_len
                ),
            ));
        }

        for (field, value) in [
            ("integration.sample_step", self.integration.sample_step),
            ("density.detector_gain", self.density.detector_gain),
            ("density.electron_charge", self.density.electron_charge),
            ("laser.wavelength", self.laser.wavelength),
            ("laser.energy", self.laser.energy),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ThomsonError::input_validation(
                    "CONFIG.NON_POSITIVE",
                    format!("{field} must be finite and > 0, got {value}"),
                ));
            }
        }

        if !self.integration.excess_noise_factor.is_finite()
            || self.integration.excess_noise_factor < 0.0
        {
            return Err(ThomsonError::input_validation(
                "CONFIG.NON_POSITIVE",
                format!(
                    "integration.excess_noise_factor must be finite and >= 0, got {}",
                    self.integration.excess_noise_factor
                ),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read artifact '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse artifact '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ArtifactError> for ThomsonError {
    fn from(error: ArtifactError) -> Self {
        match error {
            ArtifactError::Read { .. } => {
                ThomsonError::io_system("IO.ARTIFACT_READ", error.to_string())
            }
            ArtifactError::Parse { .. } => {
                ThomsonError::input_validation("INPUT.ARTIFACT_PARSE", error.to_string())
            }
        }
    }
}

pub fn read_json_artifact<T>(path: impl AsRef<Path>) -> Result<T, ArtifactError>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_pipeline_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ThomsonError> {
    let config: PipelineConfig = read_json_artifact(path)?;
    config.validate()?;
    Ok(config)
}

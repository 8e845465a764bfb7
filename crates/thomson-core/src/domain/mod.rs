pub mod errors;

pub use errors::{ErrorCategory, ThomsonError, ThomsonResult};

use crate::common::constants::{DEFAULT_LASER_ENERGY_J, ND_YAG_WAVELENGTH_M};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Integration,
    Temperature,
    Density,
    Uncertainty,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 4] = [
        Self::Integration,
        Self::Temperature,
        Self::Density,
        Self::Uncertainty,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integration => "INTEGRATION",
            Self::Temperature => "TEMPERATURE",
            Self::Density => "DENSITY",
            Self::Uncertainty => "UNCERTAINTY",
        }
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Probing laser shared by every fiber of one discharge.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LaserParameters {
    /// Wavelength in meters.
    #[serde(default = "default_wavelength")]
    pub wavelength: f64,
    /// Pulse energy in joules.
    #[serde(default = "default_energy")]
    pub energy: f64,
}

impl LaserParameters {
    pub const fn new(wavelength: f64, energy: f64) -> Self {
        Self { wavelength, energy }
    }
}

impl Default for LaserParameters {
    fn default() -> Self {
        Self::new(ND_YAG_WAVELENGTH_M, DEFAULT_LASER_ENERGY_J)
    }
}

fn default_wavelength() -> f64 {
    ND_YAG_WAVELENGTH_M
}

fn default_energy() -> f64 {
    DEFAULT_LASER_ENERGY_J
}

/// Signal integration bounds of one polychromator channel, in time-axis units (ns).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ChannelWindow {
    #[serde(alias = "sig_LeftBord")]
    pub left_bound: f64,
    #[serde(alias = "sig_RightBord")]
    pub right_bound: f64,
}

impl ChannelWindow {
    pub const fn new(left_bound: f64, right_bound: f64) -> Self {
        Self {
            left_bound,
            right_bound,
        }
    }

    pub fn width(&self) -> f64 {
        self.right_bound - self.left_bound
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FiberIdentity {
    pub name: String,
    pub fiber_number: u32,
    /// Position along the measurement chord, centimeters.
    pub z_cm: f64,
}

impl FiberIdentity {
    pub fn new(name: impl Into<String>, fiber_number: u32, z_cm: f64) -> Self {
        Self {
            name: name.into(),
            fiber_number,
            z_cm,
        }
    }
}

/// One laser-fire event: a time axis and one waveform per channel sampled on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotRecord {
    time: Vec<f64>,
    channels: Vec<Vec<f64>>,
}

impl ShotRecord {
    pub fn new(time: Vec<f64>, channels: Vec<Vec<f64>>) -> ThomsonResult<Self> {
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != time.len())
        {
            return Err(ThomsonError::input_validation(
                "CONFIG.SHOT_SAMPLES",
                format!(
                    "channel {} has {} samples but the time axis has {}",
                    channel,
                    samples.len(),
                    time.len()
                ),
            ));
        }

        Ok(Self { time, channels })
    }

    /// Regroups a `channel -> shot -> samples` matrix with a `shot -> time` axis
    /// into per-shot records.
    pub fn from_channel_major(
        time: &[Vec<f64>],
        channels: &[Vec<Vec<f64>>],
    ) -> ThomsonResult<Vec<Self>> {
        if let Some((channel, shots)) = channels
            .iter()
            .enumerate()
            .find(|(_, shots)| shots.len() != time.len())
        {
            return Err(ThomsonError::input_validation(
                "CONFIG.SHOT_COUNT",
                format!(
                    "channel {} holds {} shots but the time axis holds {}",
                    channel,
                    shots.len(),
                    time.len()
                ),
            ));
        }

        time.iter()
            .enumerate()
            .map(|(shot, axis)| {
                let samples = channels
                    .iter()
                    .map(|shots| shots[shot].clone())
                    .collect();
                Self::new(axis.clone(), samples)
            })
            .collect()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

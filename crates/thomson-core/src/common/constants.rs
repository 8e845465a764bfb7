//! Physical constants and unit conversions shared by the pipeline stages.
//!
//! Values match the ones the calibration artifacts were produced with
//! (e.g. `1.6e-19` for the elementary charge).

pub const ELECTRON_CHARGE: f64 = 1.6e-19;
pub const CLASSICAL_ELECTRON_RADIUS: f64 = 2.81e-15;
pub const MV_TO_V: f64 = 1.0e-3;
pub const NS_TO_S: f64 = 1.0e-9;

pub const ND_YAG_WAVELENGTH_M: f64 = 1064.4e-9;
pub const DEFAULT_LASER_ENERGY_J: f64 = 1.5;
pub const DEFAULT_APD_GAIN: f64 = 100.0;

/// Digitizer sampling step, ns.
pub const DIGITIZER_SAMPLE_STEP_NS: f64 = 0.325;
/// Position the channel-0 peak is aligned to on the shot time axis, ns.
pub const PEAK_ALIGNMENT_SHIFT_NS: f64 = 100.0;

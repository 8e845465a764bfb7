//! Expected relative polychromator response versus electron temperature.
//!
//! The table is precomputed offline (scattering cross-section × filter
//! transmission × detector efficiency) and only consumed here. Temperatures
//! are kept as a sorted array and addressed by index, so a fitted temperature
//! never has to be looked up again by value.

use crate::common::config::read_json_artifact;
use crate::domain::{ThomsonError, ThomsonResult};
use serde_json::Value;
use std::path::Path;

/// Metadata keys stored inline with the temperature entries in legacy files.
pub const LEGACY_WAVELENGTH_KEY: &str = "wl_grid";
pub const LEGACY_TEMPERATURE_KEY: &str = "Te_grid";

#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePoint {
    pub temperature: f64,
    pub response: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedResponseTable {
    points: Vec<ResponsePoint>,
    channel_count: usize,
    wavelength_grid: Option<Vec<f64>>,
}

impl ExpectedResponseTable {
    pub fn new(points: Vec<ResponsePoint>) -> ThomsonResult<Self> {
        if points.len() < 2 {
            return Err(ThomsonError::input_validation(
                "CONFIG.RESPONSE_GRID",
                format!(
                    "expected-response table needs at least 2 temperatures, got {}",
                    points.len()
                ),
            ));
        }

        let channel_count = points[0].response.len();
        if channel_count == 0 {
            return Err(ThomsonError::input_validation(
                "CONFIG.RESPONSE_CHANNELS",
                "expected-response vectors are empty",
            ));
        }

        for (index, point) in points.iter().enumerate() {
            if !point.temperature.is_finite() {
                return Err(ThomsonError::input_validation(
                    "CONFIG.RESPONSE_GRID",
                    format!("temperature at index {index} is not finite"),
                ));
            }
            if point.response.len() != channel_count {
                return Err(ThomsonError::input_validation(
                    "CONFIG.RESPONSE_CHANNELS",
                    format!(
                        "response at T={} has {} channels, expected {}",
                        point.temperature,
                        point.response.len(),
                        channel_count
                    ),
                ));
            }
            if let Some(value) = point.response.iter().find(|value| !value.is_finite()) {
                return Err(ThomsonError::input_validation(
                    "CONFIG.RESPONSE_VALUE",
                    format!("response at T={} holds {}", point.temperature, value),
                ));
            }
        }

        if let Some(window) = points
            .windows(2)
            .find(|window| window[1].temperature <= window[0].temperature)
        {
            return Err(ThomsonError::input_validation(
                "CONFIG.RESPONSE_GRID",
                format!(
                    "temperature grid must be strictly ascending, {} follows {}",
                    window[1].temperature, window[0].temperature
                ),
            ));
        }

        Ok(Self {
            points,
            channel_count,
            wavelength_grid: None,
        })
    }

    pub fn from_pairs<I>(pairs: I) -> ThomsonResult<Self>
    where
        I: IntoIterator<Item = (f64, Vec<f64>)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(temperature, response)| ResponsePoint {
                    temperature,
                    response,
                })
                .collect(),
        )
    }

    pub fn with_wavelength_grid(mut self, grid: Vec<f64>) -> Self {
        self.wavelength_grid = Some(grid);
        self
    }

    /// Reads the legacy JSON layout: an object whose keys are stringified
    /// temperatures plus the reserved `wl_grid` / `Te_grid` metadata entries.
    pub fn from_legacy_json(source: &str) -> ThomsonResult<Self> {
        let value: Value = serde_json::from_str(source).map_err(|error| {
            ThomsonError::input_validation(
                "INPUT.RESPONSE_PARSE",
                format!("failed to parse expected-response table: {error}"),
            )
        })?;
        Self::from_legacy_value(&value)
    }

    pub fn load_legacy(path: impl AsRef<Path>) -> ThomsonResult<Self> {
        let value: Value = read_json_artifact(path)?;
        Self::from_legacy_value(&value)
    }

    fn from_legacy_value(value: &Value) -> ThomsonResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            ThomsonError::input_validation(
                "INPUT.RESPONSE_PARSE",
                "expected-response table must be a JSON object",
            )
        })?;

        let wavelength_grid = object
            .get(LEGACY_WAVELENGTH_KEY)
            .map(|grid| number_array(grid, LEGACY_WAVELENGTH_KEY))
            .transpose()?;
        let declared_grid = object
            .get(LEGACY_TEMPERATURE_KEY)
            .map(|grid| number_array(grid, LEGACY_TEMPERATURE_KEY))
            .transpose()?;

        let mut points = Vec::with_capacity(object.len());
        for (key, entry) in object {
            if key == LEGACY_WAVELENGTH_KEY || key == LEGACY_TEMPERATURE_KEY {
                continue;
            }
            let temperature: f64 = key.trim().parse().map_err(|_| {
                ThomsonError::input_validation(
                    "INPUT.RESPONSE_KEY",
                    format!("expected-response key '{key}' is not a temperature"),
                )
            })?;
            points.push(ResponsePoint {
                temperature,
                response: number_array(entry, key)?,
            });
        }
        points.sort_by(|lhs, rhs| lhs.temperature.total_cmp(&rhs.temperature));

        if let Some(declared) = &declared_grid {
            if declared.len() != points.len() {
                return Err(ThomsonError::input_validation(
                    "CONFIG.RESPONSE_GRID",
                    format!(
                        "'{}' declares {} temperatures but {} entries are present",
                        LEGACY_TEMPERATURE_KEY,
                        declared.len(),
                        points.len()
                    ),
                ));
            }
        }

        let table = Self::new(points)?;
        Ok(match wavelength_grid {
            Some(grid) => table.with_wavelength_grid(grid),
            None => table,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn wavelength_grid(&self) -> Option<&[f64]> {
        self.wavelength_grid.as_deref()
    }

    pub fn points(&self) -> &[ResponsePoint] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<&ResponsePoint> {
        self.points.get(index)
    }

    pub fn temperatures(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|point| point.temperature)
    }

    /// Exact grid position of `temperature`.
    pub fn index_of(&self, temperature: f64) -> Option<usize> {
        self.points
            .binary_search_by(|point| point.temperature.total_cmp(&temperature))
            .ok()
    }

    /// `(response[T] - response[T_next]) / (T_next - T)` per channel; `None`
    /// for the last grid point.
    pub fn local_derivative(&self, index: usize) -> Option<Vec<f64>> {
        let current = self.points.get(index)?;
        let next = self.points.get(index + 1)?;
        let step = next.temperature - current.temperature;
        Some(
            current
                .response
                .iter()
                .zip(&next.response)
                .map(|(here, there)| (here - there) / step)
                .collect(),
        )
    }
}

fn number_array(value: &Value, key: &str) -> ThomsonResult<Vec<f64>> {
    let entries = value.as_array().ok_or_else(|| {
        ThomsonError::input_validation(
            "INPUT.RESPONSE_PARSE",
            format!("expected-response entry '{key}' must be an array"),
        )
    })?;
    entries
        .iter()
        .map(|entry| {
            entry.as_f64().ok_or_else(|| {
                ThomsonError::input_validation(
                    "INPUT.RESPONSE_PARSE",
                    format!("expected-response entry '{key}' holds a non-numeric value"),
                )
            })
        })
        .collect()
}

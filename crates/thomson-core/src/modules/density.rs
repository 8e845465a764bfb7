//! Electron density from the amplitude of the fitted spectral shape.

use super::fiber::Fiber;
use super::response::ExpectedResponseTable;
use super::temperature::{
    TemperatureFit, check_channel_lengths, check_noise, projection_sums, weighted_response,
};
use super::traits::{FiberStage, StageSummary};
use crate::common::config::DensityConvention;
use crate::common::constants::CLASSICAL_ELECTRON_RADIUS;
use crate::domain::{LaserParameters, PipelineStage, ThomsonError, ThomsonResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityEstimator {
    convention: DensityConvention,
    laser: LaserParameters,
}

impl DensityEstimator {
    pub fn new(convention: DensityConvention, laser: LaserParameters) -> Self {
        Self { convention, laser }
    }

    pub fn convention(&self) -> &DensityConvention {
        &self.convention
    }

    pub fn laser(&self) -> &LaserParameters {
        &self.laser
    }

    /// `K = E_laser · C_abs · r_e² · λ / (M · q_e)`; photo-electrons per unit
    /// density and unit response.
    pub fn normalization(&self, absolute: f64) -> f64 {
        self.laser.energy
            * absolute
            * CLASSICAL_ELECTRON_RADIUS.powi(2)
            * self.convention.unit_correction(&self.laser)
    }

    /// `ne = S1 / (S2 · K)` at the fitted grid temperature.
    pub fn density(
        &self,
        observed: &[f64],
        noise: &[f64],
        spectral: &[f64],
        table: &ExpectedResponseTable,
        fit: &TemperatureFit,
        absolute: f64,
    ) -> ThomsonResult<f64> {
        check_channel_lengths(observed, noise, spectral, table)?;
        check_noise(noise)?;
        let point = table.point(fit.index).ok_or_else(|| {
            ThomsonError::internal(
                "SYS.GRID_INDEX",
                format!("grid index {} out of range", fit.index),
            )
        })?;

        let weights = weighted_response(&point.response, spectral);
        let sums = projection_sums(observed, noise, &weights);
        let denominator = sums.s2 * self.normalization(absolute);
        if denominator == 0.0 || !denominator.is_finite() {
            return Err(ThomsonError::computation(
                "RUN.DEGENERATE_DENSITY",
                format!(
                    "density denominator is {denominator} at Te={}",
                    point.temperature
                ),
            ));
        }

        Ok(sums.s1 / denominator)
    }

    /// Photo-electrons each channel should collect for a given `(Te, ne)`;
    /// the forward counterpart of [`DensityEstimator::density`].
    pub fn expected_photoelectrons(
        &self,
        table: &ExpectedResponseTable,
        grid_index: usize,
        spectral: &[f64],
        density: f64,
        absolute: f64,
    ) -> Option<Vec<f64>> {
        let point = table.point(grid_index)?;
        let scale = density * self.normalization(absolute);
        Some(
            weighted_response(&point.response, spectral)
                .into_iter()
                .map(|weight| weight * scale)
                .collect(),
        )
    }
}

impl FiberStage for DensityEstimator {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Density
    }

    fn execute(&self, fiber: &mut Fiber) -> ThomsonResult<StageSummary> {
        let absolute = fiber.calibration().absolute.ok_or_else(|| {
            ThomsonError::input_validation(
                "CONFIG.ABSOLUTE_CALIBRATION_MISSING",
                format!("fiber '{}' has no absolute calibration", fiber.name()),
            )
        })?;
        let table = fiber.calibration().response.clone().ok_or_else(|| {
            ThomsonError::input_validation(
                "CONFIG.RESPONSE_MISSING",
                format!("fiber '{}' has no expected-response table", fiber.name()),
            )
        })?;
        let spectral = fiber.calibration().spectral.clone();

        let outcomes: Vec<Option<ThomsonResult<f64>>> = fiber
            .results()
            .iter()
            .map(|result| match (&result.integrals, &result.fit) {
                (Some(integrals), Some(fit)) => Some(self.density(
                    &integrals.photoelectrons(),
                    &integrals.noise(),
                    &spectral,
                    &table,
                    fit,
                    absolute,
                )),
                _ => None,
            })
            .collect();

        let mut summary = StageSummary::new(self.stage());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(density)) => {
                    fiber.results_mut()[index].density = Some(density);
                    summary.processed += 1;
                }
                Some(Err(error)) => {
                    let shot = fiber.results()[index].shot;
                    fiber.record_failure(shot, self.stage(), error);
                    summary.skipped += 1;
                }
                None => summary.skipped += 1,
            }
        }

        Ok(summary)
    }
}

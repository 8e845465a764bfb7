//! Linearized Te/ne uncertainties from the local response derivative.

use super::density::DensityEstimator;
use super::fiber::Fiber;
use super::response::ExpectedResponseTable;
use super::temperature::check_noise;
use super::traits::{FiberStage, StageSummary};
use crate::domain::{PipelineStage, ThomsonError, ThomsonResult};
use crate::numerics::stable_sum_by;

/// One-sigma uncertainties of a shot. Both fields are 0 when propagation
/// was not possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uncertainty {
    pub temperature: f64,
    pub density: f64,
}

impl Uncertainty {
    pub const UNAVAILABLE: Uncertainty = Uncertainty {
        temperature: 0.0,
        density: 0.0,
    };

    pub fn is_available(&self) -> bool {
        *self != Self::UNAVAILABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorPropagator {
    density: DensityEstimator,
}

impl ErrorPropagator {
    pub fn new(density: DensityEstimator) -> Self {
        Self { density }
    }

    /// Propagates channel noise through the fit at grid position `index`,
    /// using the finite difference towards the next grid temperature.
    ///
    /// `normalization` is the `K` of the density estimate.
    pub fn propagate(
        &self,
        table: &ExpectedResponseTable,
        index: usize,
        noise: &[f64],
        density: f64,
        normalization: f64,
    ) -> ThomsonResult<Uncertainty> {
        check_noise(noise)?;
        let point = table.point(index).ok_or_else(|| {
            ThomsonError::internal("SYS.GRID_INDEX", format!("grid index {index} out of range"))
        })?;
        let derivative = table.local_derivative(index).ok_or_else(|| {
            ThomsonError::computation(
                "RUN.NO_GRID_SUCCESSOR",
                format!(
                    "Te={} is the last grid temperature, no derivative available",
                    point.temperature
                ),
            )
        })?;
        if noise.len() != point.response.len() {
            return Err(ThomsonError::internal(
                "SYS.CHANNEL_LENGTH",
                format!(
                    "noise covers {} channels, response covers {}",
                    noise.len(),
                    point.response.len()
                ),
            ));
        }

        let channels = || point.response.iter().zip(&derivative).zip(noise);
        let a = stable_sum_by(channels(), |((f, _), sigma)| (f / sigma).powi(2));
        let b = stable_sum_by(channels(), |((_, d), sigma)| (d / sigma).powi(2));
        let c = stable_sum_by(channels(), |((f, d), sigma)| (d * f / (sigma * sigma)).powi(2));

        let determinant = a * b - c;
        if !determinant.is_finite() || determinant <= 0.0 {
            return Err(ThomsonError::computation(
                "RUN.SINGULAR_PROPAGATION",
                format!("propagation determinant is {determinant} at Te={}", point.temperature),
            ));
        }

        let temperature = (a / determinant / (density * normalization).powi(2)).sqrt();
        let density = (b / determinant / normalization.powi(2)).sqrt();
        if !temperature.is_finite() || !density.is_finite() {
            return Err(ThomsonError::computation(
                "RUN.NON_FINITE_UNCERTAINTY",
                format!("uncertainties evaluate to ({temperature}, {density})"),
            ));
        }

        Ok(Uncertainty {
            temperature,
            density,
        })
    }
}

impl FiberStage for ErrorPropagator {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Uncertainty
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
        let normalization = self.density.normalization(absolute);

        let outcomes: Vec<Option<ThomsonResult<Uncertainty>>> = fiber
            .results()
            .iter()
            .map(|result| match (&result.integrals, &result.fit, result.density) {
                (Some(integrals), Some(fit), Some(density)) => Some(self.propagate(
                    &table,
                    fit.index,
                    &integrals.noise(),
                    density,
                    normalization,
                )),
                _ => None,
            })
            .collect();

        let mut summary = StageSummary::new(self.stage());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(uncertainty)) => {
                    fiber.results_mut()[index].uncertainty = uncertainty;
                    summary.processed += 1;
                }
                Some(Err(error)) => {
                    fiber.results_mut()[index].uncertainty = Uncertainty::UNAVAILABLE;
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

//! Shape-only chi-square fit of the observed photo-electrons against the
//! expected-response grid. The amplitude is eliminated analytically, so only
//! the spectral shape decides the temperature.

use super::fiber::Fiber;
use super::response::ExpectedResponseTable;
use super::traits::{FiberStage, StageSummary};
use crate::domain::{PipelineStage, ThomsonError, ThomsonResult};
use crate::numerics::{argmin, stable_sum_by};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionSums {
    /// `Σ obs·w/σ²`
    pub s1: f64,
    /// `Σ w²/σ²`
    pub s2: f64,
}

impl ProjectionSums {
    pub fn scale(&self) -> Option<f64> {
        (self.s2 != 0.0).then(|| self.s1 / self.s2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureFit {
    /// Position of the temperature on the response grid.
    pub index: usize,
    pub temperature: f64,
    pub chi_square: f64,
}

/// Expected response corrected by the channel spectral sensitivity.
pub fn weighted_response(response: &[f64], spectral: &[f64]) -> Vec<f64> {
    response
        .iter()
        .zip(spectral)
        .map(|(value, sensitivity)| value * sensitivity)
        .collect()
}

pub fn projection_sums(observed: &[f64], noise: &[f64], weights: &[f64]) -> ProjectionSums {
    let channels = observed.iter().zip(noise).zip(weights);
    ProjectionSums {
        s1: stable_sum_by(channels.clone(), |((obs, sigma), w)| obs * w / (sigma * sigma)),
        s2: stable_sum_by(channels, |((_, sigma), w)| w * w / (sigma * sigma)),
    }
}

/// Residual chi-square after projecting out the best-fit scale `S1/S2`;
/// `None` when the weights vanish (`S2 = 0`).
pub fn chi_square(observed: &[f64], noise: &[f64], weights: &[f64]) -> Option<f64> {
    let scale = projection_sums(observed, noise, weights).scale()?;
    Some(stable_sum_by(
        observed.iter().zip(noise).zip(weights),
        |((obs, sigma), w)| {
            let residual = obs - scale * w;
            residual * residual / (sigma * sigma)
        },
    ))
}

/// Every noise value must be finite and non-zero before it is used as a weight.
pub fn check_noise(noise: &[f64]) -> ThomsonResult<()> {
    match noise
        .iter()
        .position(|sigma| *sigma == 0.0 || !sigma.is_finite())
    {
        Some(channel) => Err(ThomsonError::computation(
            "RUN.ZERO_NOISE",
            format!(
                "channel {channel} noise is {}, chi-square weights are undefined",
                noise[channel]
            ),
        )),
        None => Ok(()),
    }
}

pub(crate) fn check_channel_lengths(
    observed: &[f64],
    noise: &[f64],
    spectral: &[f64],
    table: &ExpectedResponseTable,
) -> ThomsonResult<()> {
    let expected = table.channel_count();
    if observed.len() != expected || noise.len() != expected || spectral.len() != expected {
        return Err(ThomsonError::internal(
            "SYS.CHANNEL_LENGTH",
            format!(
                "observed={}, noise={}, spectral={} channels against a {}-channel response table",
                observed.len(),
                noise.len(),
                spectral.len(),
                expected
            ),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemperatureEstimator;

impl TemperatureEstimator {
    /// Chi-square for every grid temperature, in grid order. Candidates whose
    /// weighted response vanishes get `+inf`.
    pub fn chi_square_profile(
        &self,
        observed: &[f64],
        noise: &[f64],
        spectral: &[f64],
        table: &ExpectedResponseTable,
    ) -> ThomsonResult<Vec<f64>> {
        check_channel_lengths(observed, noise, spectral, table)?;
        check_noise(noise)?;

        Ok(table
            .points()
            .iter()
            .map(|point| {
                let weights = weighted_response(&point.response, spectral);
                chi_square(observed, noise, &weights).unwrap_or(f64::INFINITY)
            })
            .collect())
    }

    pub fn fit(
        &self,
        observed: &[f64],
        noise: &[f64],
        spectral: &[f64],
        table: &ExpectedResponseTable,
    ) -> ThomsonResult<TemperatureFit> {
        let profile = self.chi_square_profile(observed, noise, spectral, table)?;
        let index = argmin(&profile)
            .filter(|index| profile[*index].is_finite())
            .ok_or_else(|| {
                ThomsonError::computation(
                    "RUN.DEGENERATE_RESPONSE",
                    "no grid temperature yields a finite chi-square",
                )
            })?;

        let temperature = table
            .point(index)
            .map(|point| point.temperature)
            .ok_or_else(|| {
                ThomsonError::internal("SYS.GRID_INDEX", format!("grid index {index} out of range"))
            })?;

        Ok(TemperatureFit {
            index,
            temperature,
            chi_square: profile[index],
        })
    }
}

impl FiberStage for TemperatureEstimator {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Temperature
    }

    fn execute(&self, fiber: &mut Fiber) -> ThomsonResult<StageSummary> {
        let table = fiber.calibration().response.clone().ok_or_else(|| {
            ThomsonError::input_validation(
                "CONFIG.RESPONSE_MISSING",
                format!("fiber '{}' has no expected-response table", fiber.name()),
            )
        })?;
        let spectral = fiber.calibration().spectral.clone();

        let outcomes: Vec<Option<ThomsonResult<TemperatureFit>>> = fiber
            .results()
            .iter()
            .map(|result| {
                result.integrals.as_ref().map(|integrals| {
                    self.fit(
                        &integrals.photoelectrons(),
                        &integrals.noise(),
                        &spectral,
                        &table,
                    )
                })
            })
            .collect();

        let mut summary = StageSummary::new(self.stage());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(fit)) => {
                    fiber.results_mut()[index].fit = Some(fit);
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

#[cfg(test)]
mod tests {
    use super::{TemperatureEstimator, chi_square, check_noise, projection_sums};
    use crate::modules::response::ExpectedResponseTable;

    fn four_point_table() -> ExpectedResponseTable {
        ExpectedResponseTable::from_pairs([
            (10.0, vec![1.0, 3.0]),
            (20.0, vec![1.0, 2.0]),
            (30.0, vec![2.0, 2.0]),
            (40.0, vec![3.0, 1.0]),
        ])
        .expect("table")
    }

    #[test]
    fn exact_shape_match_has_zero_chi_square_and_is_selected() {
        let table = four_point_table();
        let estimator = TemperatureEstimator;
        let observed = [2.0, 4.0];
        let noise = [1.0, 1.0];
        let spectral = [1.0, 1.0];

        let profile = estimator
            .chi_square_profile(&observed, &noise, &spectral, &table)
            .expect("profile");
        assert_eq!(profile.len(), 4);
        assert!(profile[1].abs() < 1.0e-12);
        assert!((profile[0] - 0.4).abs() < 1.0e-12);
        assert!(profile[2] > 0.0);
        assert!(profile[3] > 0.0);

        let fit = estimator
            .fit(&observed, &noise, &spectral, &table)
            .expect("fit");
        assert_eq!(fit.index, 1);
        assert_eq!(fit.temperature, 20.0);
    }

    #[test]
    fn spectral_calibration_reshapes_the_expected_response() {
        let table = four_point_table();
        // [2, 2] observed through a channel-0 sensitivity of 0.5 matches T=20's [1, 2]
        let fit = TemperatureEstimator
            .fit(&[1.0, 4.0], &[1.0, 1.0], &[0.5, 1.0], &table)
            .expect("fit");
        assert_eq!(fit.temperature, 20.0);
    }

    #[test]
    fn ties_resolve_to_the_lowest_temperature() {
        let table = ExpectedResponseTable::from_pairs([
            (5.0, vec![4.0, 1.0]),
            (6.0, vec![1.0, 1.0]),
            (7.0, vec![2.0, 2.0]),
            (8.0, vec![3.0, 3.0]),
        ])
        .expect("table");
        let fit = TemperatureEstimator
            .fit(&[5.0, 5.0], &[1.0, 1.0], &[1.0, 1.0], &table)
            .expect("fit");
        assert_eq!(fit.index, 1);
        assert_eq!(fit.temperature, 6.0);
    }

    #[test]
    fn reserved_metadata_entries_never_become_candidates() {
        let source = r#"{
            "wl_grid": [700.0, 700.2],
            "Te_grid": [15.0, 25.0],
            "15.0": [1.0, 2.0],
            "25.0": [2.0, 1.0]
        }"#;
        let table = ExpectedResponseTable::from_legacy_json(source).expect("table");
        let profile = TemperatureEstimator
            .chi_square_profile(&[1.0, 2.0], &[1.0, 1.0], &[1.0, 1.0], &table)
            .expect("profile");

        assert_eq!(profile.len(), 2);
        let fit = TemperatureEstimator
            .fit(&[1.0, 2.0], &[1.0, 1.0], &[1.0, 1.0], &table)
            .expect("fit");
        assert_eq!(fit.temperature, 15.0);
    }

    #[test]
    fn zero_noise_is_a_domain_error() {
        let error = TemperatureEstimator
            .fit(&[2.0, 4.0], &[1.0, 0.0], &[1.0, 1.0], &four_point_table())
            .expect_err("zero noise should fail");
        assert_eq!(error.code(), "RUN.ZERO_NOISE");
        assert!(check_noise(&[1.0, f64::NAN]).is_err());
        assert!(check_noise(&[1.0, 2.0]).is_ok());
    }

    #[test]
    fn all_zero_response_is_degenerate() {
        let table =
            ExpectedResponseTable::from_pairs([(1.0, vec![0.0, 0.0]), (2.0, vec![0.0, 0.0])])
                .expect("table");
        let error = TemperatureEstimator
            .fit(&[1.0, 1.0], &[1.0, 1.0], &[1.0, 1.0], &table)
            .expect_err("zero response should fail");
        assert_eq!(error.code(), "RUN.DEGENERATE_RESPONSE");
    }

    #[test]
    fn projection_scale_recovers_the_amplitude() {
        let sums = projection_sums(&[3.0, 6.0], &[0.5, 2.0], &[1.0, 2.0]);
        assert!((sums.scale().expect("scale") - 3.0).abs() < 1.0e-12);
        assert!(chi_square(&[3.0, 6.0], &[0.5, 2.0], &[1.0, 2.0]).expect("chi") < 1.0e-12);
        assert_eq!(chi_square(&[1.0], &[1.0], &[0.0]), None);
    }
}

//! Baseline-corrected charge integration of polychromator waveforms.
//!
//! Per channel the baseline is the median of the leading `noise_len` samples
//! and is removed as `baseline × window width` from the windowed sum, not per
//! sample. The photo-electron noise adds the baseline tracking noise and the
//! APD excess noise in quadrature.

use super::fiber::Fiber;
use super::gain::GainModel;
use super::traits::{FiberStage, StageSummary};
use crate::common::config::IntegrationConfig;
use crate::domain::{ChannelWindow, PipelineStage, ShotRecord, ThomsonError, ThomsonResult};
use crate::numerics::{bisect_left, bisect_right, median, sample_std_dev, stable_sum};

/// Photo-electron count substituted for non-positive integrals.
pub const CLAMPED_PHOTOELECTRONS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowIndices {
    pub left: usize,
    pub right: usize,
}

impl WindowIndices {
    pub fn len(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left
    }
}

/// Sample range `[left, right)` covered by `window` on a sorted time axis.
///
/// Bounds outside the axis collapse onto its first/last index.
pub fn window_indices(time: &[f64], window: &ChannelWindow) -> WindowIndices {
    WindowIndices {
        left: bisect_left(time, window.left_bound),
        right: bisect_right(time, window.right_bound),
    }
}

/// Windowed sum × step minus the baseline level over the physical window width.
pub fn baseline_corrected_integral(
    samples: &[f64],
    indices: WindowIndices,
    window: &ChannelWindow,
    baseline: f64,
    sample_step: f64,
) -> f64 {
    stable_sum(&samples[indices.left..indices.right]) * sample_step - baseline * window.width()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelIntegral {
    /// Photo-electrons after the non-positive clamp.
    pub photoelectrons: f64,
    /// Standard deviation of `photoelectrons`.
    pub noise: f64,
    /// Gain-scaled integral before the clamp.
    pub raw_photoelectrons: f64,
    pub baseline: f64,
    pub clamped: bool,
    pub window: WindowIndices,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotIntegrals {
    pub shot: usize,
    pub channels: Vec<ChannelIntegral>,
}

impl ShotIntegrals {
    pub fn photoelectrons(&self) -> Vec<f64> {
        self.channels
            .iter()
            .map(|channel| channel.photoelectrons)
            .collect()
    }

    pub fn noise(&self) -> Vec<f64> {
        self.channels.iter().map(|channel| channel.noise).collect()
    }

    pub fn clamped_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.clamped)
            .map(|(index, _)| index)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalIntegrator {
    config: IntegrationConfig,
}

impl SignalIntegrator {
    pub fn new(config: IntegrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn integrate_channel(
        &self,
        time: &[f64],
        samples: &[f64],
        window: &ChannelWindow,
        gain: &GainModel,
    ) -> ThomsonResult<ChannelIntegral> {
        if samples.len() != time.len() {
            return Err(ThomsonError::internal(
                "SYS.SAMPLE_COUNT",
                format!(
                    "waveform has {} samples but the time axis has {}",
                    samples.len(),
                    time.len()
                ),
            ));
        }

        let indices = window_indices(time, window);
        if indices.is_empty() {
            return Err(ThomsonError::computation(
                "RUN.EMPTY_WINDOW",
                format!(
                    "window [{}, {}) selects no samples",
                    window.left_bound, window.right_bound
                ),
            ));
        }

        let noise_len = self.config.noise_len;
        if noise_len > indices.left {
            return Err(ThomsonError::computation(
                "RUN.BASELINE_OVERLAP",
                format!(
                    "baseline region of {} samples overlaps the window starting at sample {}",
                    noise_len, indices.left
                ),
            ));
        }

        let baseline_region = &samples[..noise_len];
        let (Some(baseline), Some(deviation)) =
            (median(baseline_region), sample_std_dev(baseline_region))
        else {
            return Err(ThomsonError::computation(
                "RUN.BASELINE_REGION",
                format!("baseline region of {noise_len} samples is too short"),
            ));
        };

        let step = self.config.sample_step;
        let integral = baseline_corrected_integral(samples, indices, window, baseline, step);
        if !integral.is_finite() || !deviation.is_finite() {
            return Err(ThomsonError::computation(
                "RUN.NON_FINITE_SIGNAL",
                "waveform contains non-finite samples",
            ));
        }

        let multiplier = gain.multiplier();
        let raw_photoelectrons = integral * multiplier;
        let tracking = deviation * multiplier * step * indices.len() as f64;

        let (photoelectrons, excess, clamped) = if raw_photoelectrons > 0.0 {
            (
                raw_photoelectrons,
                raw_photoelectrons * self.config.excess_noise_factor,
                false,
            )
        } else {
            (CLAMPED_PHOTOELECTRONS, 0.0, true)
        };

        Ok(ChannelIntegral {
            photoelectrons,
            noise: (tracking * tracking + excess).sqrt(),
            raw_photoelectrons,
            baseline,
            clamped,
            window: indices,
        })
    }

    pub fn integrate_shot(
        &self,
        shot_index: usize,
        shot: &ShotRecord,
        windows: &[ChannelWindow],
        gain: &GainModel,
    ) -> ThomsonResult<ShotIntegrals> {
        let channels = windows
            .iter()
            .enumerate()
            .map(|(channel, window)| {
                let samples = shot.channel(channel).ok_or_else(|| {
                    ThomsonError::internal(
                        "SYS.CHANNEL_INDEX",
                        format!("shot {shot_index} has no channel {channel}"),
                    )
                })?;
                self.integrate_channel(shot.time(), samples, window, gain)
                    .map_err(|error| {
                        ThomsonError::new(
                            error.category(),
                            error.code(),
                            format!("channel {channel}: {}", error.message()),
                        )
                    })
            })
            .collect::<ThomsonResult<Vec<_>>>()?;

        Ok(ShotIntegrals {
            shot: shot_index,
            channels,
        })
    }
}

impl FiberStage for SignalIntegrator {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Integration
    }

    fn execute(&self, fiber: &mut Fiber) -> ThomsonResult<StageSummary> {
        let range = self.config.shot_range(fiber.shots().len());
        fiber.reset_results(range.clone());

        let outcomes: Vec<ThomsonResult<ShotIntegrals>> = range
            .map(|shot| {
                self.integrate_shot(shot, &fiber.shots()[shot], fiber.windows(), fiber.gain())
            })
            .collect();

        let mut summary = StageSummary::new(self.stage());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(integrals) => {
                    let clamped = integrals.clamped_channels();
                    if !clamped.is_empty() {
                        tracing::debug!(
                            fiber = %fiber.name(),
                            shot = integrals.shot,
                            ?clamped,
                            "non-positive integrals clamped to {CLAMPED_PHOTOELECTRONS} photo-electron"
                        );
                    }
                    fiber.results_mut()[index].integrals = Some(integrals);
                    summary.processed += 1;
                }
                Err(error) => {
                    let shot = fiber.results()[index].shot;
                    fiber.record_failure(shot, self.stage(), error);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}

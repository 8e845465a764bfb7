use super::calibration::{FiberCalibration, FitCapability};
use super::gain::GainModel;
use super::integrator::ShotIntegrals;
use super::response::ExpectedResponseTable;
use super::temperature::TemperatureFit;
use super::uncertainty::Uncertainty;
use crate::domain::{
    ChannelWindow, FiberIdentity, PipelineStage, ShotRecord, ThomsonError, ThomsonResult,
};

/// Per-shot derived state, filled stage by stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotResult {
    pub shot: usize,
    pub integrals: Option<ShotIntegrals>,
    pub fit: Option<TemperatureFit>,
    pub density: Option<f64>,
    pub uncertainty: Uncertainty,
}

impl ShotResult {
    fn pending(shot: usize) -> Self {
        Self {
            shot,
            integrals: None,
            fit: None,
            density: None,
            uncertainty: Uncertainty::UNAVAILABLE,
        }
    }

    pub fn temperature(&self) -> Option<f64> {
        self.fit.map(|fit| fit.temperature)
    }
}

/// A shot that a stage could not process.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotFailure {
    pub shot: usize,
    pub stage: PipelineStage,
    pub error: ThomsonError,
}

/// A fiber excluded from the discharge results, either while it was assembled
/// (`stage` is `None`) or by a stage that could not run on it.
#[derive(Debug, Clone, PartialEq)]
pub struct FiberFailure {
    pub name: String,
    pub stage: Option<PipelineStage>,
    pub error: ThomsonError,
}

/// One polychromator fiber: raw shots, calibration, and the derived results.
#[derive(Debug, Clone)]
pub struct Fiber {
    identity: FiberIdentity,
    shots: Vec<ShotRecord>,
    windows: Vec<ChannelWindow>,
    gain: GainModel,
    calibration: FiberCalibration,
    channel_count: usize,
    results: Vec<ShotResult>,
    failures: Vec<ShotFailure>,
}

impl Fiber {
    pub fn new(
        identity: FiberIdentity,
        shots: Vec<ShotRecord>,
        windows: Vec<ChannelWindow>,
        gain: GainModel,
        calibration: FiberCalibration,
    ) -> ThomsonResult<Self> {
        let name = identity.name.as_str();
        let channel_count = windows.len();
        if channel_count == 0 {
            return Err(ThomsonError::input_validation(
                "CONFIG.CHANNEL_COUNT",
                format!("fiber '{name}' has no channel windows"),
            ));
        }

        if calibration.spectral.len() != channel_count {
            return Err(channel_mismatch(
                name,
                "spectral calibration",
                calibration.spectral.len(),
                channel_count,
            ));
        }

        if let Some(table) = &calibration.response {
            if table.channel_count() != channel_count {
                return Err(channel_mismatch(
                    name,
                    "expected-response table",
                    table.channel_count(),
                    channel_count,
                ));
            }
        }

        if let Some((index, shot)) = shots
            .iter()
            .enumerate()
            .find(|(_, shot)| shot.channel_count() != channel_count)
        {
            return Err(ThomsonError::input_validation(
                "CONFIG.CHANNEL_COUNT",
                format!(
                    "fiber '{name}' shot {index} carries {} channels, expected {channel_count}",
                    shot.channel_count()
                ),
            ));
        }

        for (channel, window) in windows.iter().enumerate() {
            if !window.left_bound.is_finite()
                || !window.right_bound.is_finite()
                || window.left_bound >= window.right_bound
            {
                return Err(ThomsonError::input_validation(
                    "CONFIG.WINDOW",
                    format!(
                        "fiber '{name}' channel {channel} window [{}, {}) is not a valid interval",
                        window.left_bound, window.right_bound
                    ),
                ));
            }
        }

        if let Some(value) = calibration.spectral.iter().find(|value| !value.is_finite()) {
            return Err(ThomsonError::input_validation(
                "CONFIG.SPECTRAL_CALIBRATION",
                format!("fiber '{name}' spectral calibration holds {value}"),
            ));
        }

        if let Some(absolute) = calibration.absolute {
            if !absolute.is_finite() || absolute <= 0.0 {
                return Err(ThomsonError::input_validation(
                    "CONFIG.ABSOLUTE_CALIBRATION",
                    format!("fiber '{name}' absolute calibration must be > 0, got {absolute}"),
                ));
            }
        }

        Ok(Self {
            identity,
            shots,
            windows,
            gain,
            calibration,
            channel_count,
            results: Vec::new(),
            failures: Vec::new(),
        })
    }

    pub fn identity(&self) -> &FiberIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn shots(&self) -> &[ShotRecord] {
        &self.shots
    }

    pub fn windows(&self) -> &[ChannelWindow] {
        &self.windows
    }

    pub fn gain(&self) -> &GainModel {
        &self.gain
    }

    pub fn calibration(&self) -> &FiberCalibration {
        &self.calibration
    }

    pub fn capability(&self) -> FitCapability {
        self.calibration.capability()
    }

    pub fn response_table(&self) -> Option<&ExpectedResponseTable> {
        self.calibration.response.as_deref()
    }

    pub fn results(&self) -> &[ShotResult] {
        &self.results
    }

    pub fn result_for_shot(&self, shot: usize) -> Option<&ShotResult> {
        self.results.iter().find(|result| result.shot == shot)
    }

    pub fn failures(&self) -> &[ShotFailure] {
        &self.failures
    }

    pub fn temperatures(&self) -> Vec<Option<f64>> {
        self.results.iter().map(ShotResult::temperature).collect()
    }

    pub fn densities(&self) -> Vec<Option<f64>> {
        self.results.iter().map(|result| result.density).collect()
    }

    pub fn errors_t(&self) -> Vec<f64> {
        self.results
            .iter()
            .map(|result| result.uncertainty.temperature)
            .collect()
    }

    pub fn errors_n(&self) -> Vec<f64> {
        self.results
            .iter()
            .map(|result| result.uncertainty.density)
            .collect()
    }

    /// Drops derived state and prepares one pending row per shot in `shots`.
    pub(crate) fn reset_results(&mut self, shots: impl IntoIterator<Item = usize>) {
        self.results = shots.into_iter().map(ShotResult::pending).collect();
        self.failures.clear();
    }

    pub(crate) fn results_mut(&mut self) -> &mut [ShotResult] {
        &mut self.results
    }

    pub(crate) fn record_failure(&mut self, shot: usize, stage: PipelineStage, error: ThomsonError) {
        tracing::warn!(
            fiber = %self.identity.name,
            shot,
            stage = %stage,
            code = error.code(),
            "{}",
            error.message()
        );
        self.failures.push(ShotFailure { shot, stage, error });
    }
}

fn channel_mismatch(name: &str, what: &str, actual: usize, expected: usize) -> ThomsonError {
    ThomsonError::input_validation(
        "CONFIG.CHANNEL_COUNT",
        format!("fiber '{name}' {what} covers {actual} channels, expected {expected}"),
    )
}

#[cfg(test)]
mod tests {
    use super::Fiber;
    use crate::domain::{ChannelWindow, FiberIdentity, ShotRecord};
    use crate::modules::calibration::{FiberCalibration, FitCapability};
    use crate::modules::gain::GainFamily;
    use crate::modules::response::ExpectedResponseTable;
    use std::sync::Arc;

    fn shot(channels: usize) -> ShotRecord {
        ShotRecord::new(vec![0.0, 1.0, 2.0], vec![vec![0.0; 3]; channels]).expect("shot")
    }

    fn windows(channels: usize) -> Vec<ChannelWindow> {
        vec![ChannelWindow::new(1.0, 2.0); channels]
    }

    #[test]
    fn construction_checks_every_channel_count() {
        let identity = FiberIdentity::new("eqTS_42_G10", 2, -37.1);
        let gain = GainFamily::Equator.model();

        let error = Fiber::new(
            identity.clone(),
            vec![shot(2)],
            windows(2),
            gain,
            FiberCalibration::new(vec![1.0, 1.0, 1.0]),
        )
        .expect_err("spectral mismatch should fail");
        assert_eq!(error.code(), "CONFIG.CHANNEL_COUNT");

        let error = Fiber::new(
            identity.clone(),
            vec![shot(2), shot(3)],
            windows(2),
            gain,
            FiberCalibration::new(vec![1.0, 1.0]),
        )
        .expect_err("raw data mismatch should fail");
        assert_eq!(error.code(), "CONFIG.CHANNEL_COUNT");

        let table = Arc::new(
            ExpectedResponseTable::from_pairs([(1.0, vec![1.0]), (2.0, vec![2.0])]).expect("table"),
        );
        let error = Fiber::new(
            identity,
            vec![shot(2)],
            windows(2),
            gain,
            FiberCalibration::new(vec![1.0, 1.0]).with_response(table),
        )
        .expect_err("response mismatch should fail");
        assert_eq!(error.code(), "CONFIG.CHANNEL_COUNT");
    }

    #[test]
    fn construction_rejects_inverted_windows_and_bad_absolute_calibration() {
        let identity = FiberIdentity::new("T15_34_G10", 7, -43.25);
        let gain = GainFamily::T15_34.model();

        let error = Fiber::new(
            identity.clone(),
            vec![shot(1)],
            vec![ChannelWindow::new(2.0, 1.0)],
            gain,
            FiberCalibration::new(vec![1.0]),
        )
        .expect_err("inverted window should fail");
        assert_eq!(error.code(), "CONFIG.WINDOW");

        let error = Fiber::new(
            identity,
            vec![shot(1)],
            windows(1),
            gain,
            FiberCalibration::new(vec![1.0]).with_absolute(-1.0),
        )
        .expect_err("negative absolute calibration should fail");
        assert_eq!(error.code(), "CONFIG.ABSOLUTE_CALIBRATION");
    }

    #[test]
    fn auxiliary_fiber_without_tables_is_valid() {
        let fiber = Fiber::new(
            FiberIdentity::new("Novosib", 9, -45.55),
            vec![shot(4)],
            windows(4),
            GainFamily::Equator.model(),
            FiberCalibration::new(vec![1.0; 4]),
        )
        .expect("auxiliary fiber");

        assert_eq!(fiber.capability(), FitCapability::IntegralsOnly);
        assert!(fiber.response_table().is_none());
        assert!(fiber.results().is_empty());
        assert!(fiber.temperatures().is_empty());
    }
}

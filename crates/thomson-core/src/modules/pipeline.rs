//! Stage sequencing per fiber and the per-discharge fan-out over fibers.

use super::density::DensityEstimator;
use super::fiber::{Fiber, FiberFailure};
use super::integrator::SignalIntegrator;
use super::temperature::TemperatureEstimator;
use super::traits::{FiberStage, StageSummary};
use super::uncertainty::ErrorPropagator;
use crate::common::config::PipelineConfig;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiberPipeline {
    integrator: SignalIntegrator,
    temperature: TemperatureEstimator,
    density: DensityEstimator,
    uncertainty: ErrorPropagator,
}

impl FiberPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        let density = DensityEstimator::new(config.density, config.laser);
        Self {
            integrator: SignalIntegrator::new(config.integration),
            temperature: TemperatureEstimator,
            density,
            uncertainty: ErrorPropagator::new(density),
        }
    }

    /// Stages the fiber's calibration supports, in execution order.
    pub fn stages_for(&self, fiber: &Fiber) -> Vec<&dyn FiberStage> {
        let capability = fiber.capability();
        let mut stages: Vec<&dyn FiberStage> = vec![&self.integrator];
        if capability.fits_temperature() {
            stages.push(&self.temperature);
        }
        if capability.fits_density() {
            stages.push(&self.density);
            stages.push(&self.uncertainty);
        }
        stages
    }

    /// Runs every supported stage; the first fiber-level error stops the fiber.
    pub fn run(&self, fiber: &mut Fiber) -> Result<Vec<StageSummary>, FiberFailure> {
        let mut summaries = Vec::new();
        for stage in self.stages_for(fiber) {
            let summary = stage.execute(fiber).map_err(|error| FiberFailure {
                name: fiber.name().to_string(),
                stage: Some(stage.stage()),
                error,
            })?;
            tracing::debug!(
                stage = %summary.stage,
                processed = summary.processed,
                skipped = summary.skipped,
                "stage finished"
            );
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

/// Outcome of one discharge: processed fibers in input order and the ones
/// that were excluded.
#[derive(Debug, Clone, Default)]
pub struct DischargeReport {
    pub completed: Vec<Fiber>,
    pub failed: Vec<FiberFailure>,
}

impl DischargeReport {
    pub fn shot_failure_count(&self) -> usize {
        self.completed
            .iter()
            .map(|fiber| fiber.failures().len())
            .sum()
    }

    pub fn fiber(&self, name: &str) -> Option<&Fiber> {
        self.completed.iter().find(|fiber| fiber.name() == name)
    }

    pub fn passed(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn render_discharge_summary(discharge: &str, report: &DischargeReport) -> String {
    let status = if report.passed() { "PASS" } else { "PARTIAL" };
    let mut lines = vec![
        format!("Discharge {discharge} status: {status}"),
        format!(
            "Fibers: {} processed, {} excluded, {} shot failures",
            report.completed.len(),
            report.failed.len(),
            report.shot_failure_count()
        ),
    ];
    for fiber in &report.completed {
        let fitted = fiber
            .temperatures()
            .iter()
            .filter(|temperature| temperature.is_some())
            .count();
        lines.push(format!(
            "  {} (z={} cm): {}/{} shots fitted",
            fiber.name(),
            fiber.identity().z_cm,
            fitted,
            fiber.results().len()
        ));
    }
    for failure in &report.failed {
        let stage = failure
            .stage
            .map_or_else(|| "ASSEMBLY".to_string(), |stage| stage.to_string());
        lines.push(format!(
            "  excluded {} at {stage}: {}",
            failure.name,
            failure.error.diagnostic_line()
        ));
    }
    lines.join("\n")
}

/// Runs the pipeline on every fiber in parallel, one rayon task per fiber.
pub fn process_discharge(pipeline: &FiberPipeline, fibers: Vec<Fiber>) -> DischargeReport {
    let outcomes: Vec<Result<Fiber, FiberFailure>> = fibers
        .into_par_iter()
        .map(|mut fiber| {
            let span = tracing::info_span!("fiber", name = %fiber.name());
            let _entered = span.enter();
            let summaries = pipeline.run(&mut fiber)?;
            tracing::info!(
                stages = summaries.len(),
                shots = fiber.results().len(),
                shot_failures = fiber.failures().len(),
                "fiber processed"
            );
            Ok(fiber)
        })
        .collect();

    let mut report = DischargeReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(fiber) => report.completed.push(fiber),
            Err(failure) => {
                tracing::warn!(
                    fiber = %failure.name,
                    code = failure.error.code(),
                    "fiber excluded: {}",
                    failure.error.message()
                );
                report.failed.push(failure);
            }
        }
    }
    report
}

use super::CliError;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use thomson_core::common::config::{PipelineConfig, load_pipeline_config};
use thomson_core::modules::{
    AbsoluteCalibrationSet, CalibrationArtifacts, ExpectedResponseTable, SpectralCalibrationSet,
};
use tracing_subscriber::EnvFilter;

/// Stderr subscriber; `RUST_LOG` wins over the verbosity flag.
pub(super) fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn parse_response_table_arg(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((key, path)) if !key.is_empty() && !path.is_empty() => {
            Ok((key.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected KEY=PATH, got '{raw}'")),
    }
}

pub(super) fn load_config(path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    match path {
        Some(path) => load_pipeline_config(path).map_err(CliError::Compute),
        None => Ok(PipelineConfig::default()),
    }
}

pub(super) fn load_calibrations(
    spectral: &Path,
    absolute: &Path,
    responses: &[(String, PathBuf)],
) -> Result<CalibrationArtifacts, CliError> {
    let mut artifacts = CalibrationArtifacts::new(
        SpectralCalibrationSet::load(spectral).map_err(CliError::Compute)?,
        AbsoluteCalibrationSet::load(absolute).map_err(CliError::Compute)?,
    );
    for (key, path) in responses {
        let table = ExpectedResponseTable::load_legacy(path).map_err(CliError::Compute)?;
        tracing::debug!(
            key = %key,
            temperatures = table.len(),
            channels = table.channel_count(),
            "loaded expected-response table"
        );
        artifacts = artifacts.with_response_table(key.clone(), table);
    }
    Ok(artifacts)
}

pub(super) fn output_directory(root: &Path, discharge: &str) -> Result<PathBuf, CliError> {
    let directory = root.join(discharge);
    fs::create_dir_all(&directory).with_context(|| {
        format!("failed to create output directory '{}'", directory.display())
    })?;
    Ok(directory)
}

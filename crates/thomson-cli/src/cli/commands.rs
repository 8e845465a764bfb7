use super::CliError;
use super::helpers::{
    load_calibrations, load_config, output_directory, parse_response_table_arg,
};
use serde::Serialize;
use std::path::PathBuf;
use thomson_core::modules::digitizer::{JsonWaveformDecoder, decode_digitizers, discharge_sources};
use thomson_core::modules::layout::AssembledDischarge;
use thomson_core::modules::serialization::{
    DEFAULT_PROFILE_SHOTS, write_profile_tables, write_raw_signals,
};
use thomson_core::modules::{
    DischargeLayout, FiberPipeline, GainFamily, assemble_fibers, process_discharge,
    render_discharge_summary,
};

#[derive(clap::Args)]
pub(super) struct ProcessArgs {
    /// Discharge number; names the data and output subdirectories
    pub(super) discharge: String,

    /// Directory holding one subdirectory of digitizer dumps per discharge
    #[arg(long, default_value = "data")]
    pub(super) data_root: PathBuf,

    /// Fiber and digitizer layout
    #[arg(long, default_value = "config/layout.json")]
    pub(super) layout: PathBuf,

    /// Spectral calibration (name prefix -> channel sensitivities)
    #[arg(long, default_value = "calibrations/spectral.json")]
    pub(super) spectral: PathBuf,

    /// Absolute calibration (fiber name -> constant)
    #[arg(long, default_value = "calibrations/absolute.json")]
    pub(super) absolute: PathBuf,

    /// Expected-response table referenced by the layout; repeatable
    #[arg(long = "response", value_name = "KEY=PATH", value_parser = parse_response_table_arg)]
    pub(super) responses: Vec<(String, PathBuf)>,

    /// Pipeline configuration; built-in defaults when omitted
    #[arg(long)]
    pub(super) config: Option<PathBuf>,

    /// Output root; tables land in <output>/<discharge>/
    #[arg(long, default_value = "output")]
    pub(super) output: PathBuf,

    /// First shot written to the profile tables
    #[arg(long, default_value_t = DEFAULT_PROFILE_SHOTS.start)]
    pub(super) from_shot: usize,

    /// Shot after the last one written to the profile tables
    #[arg(long, default_value_t = DEFAULT_PROFILE_SHOTS.end)]
    pub(super) to_shot: usize,

    /// Also dump raw per-channel waveforms of every fiber
    #[arg(long)]
    pub(super) raw_signals: bool,
}

#[derive(clap::Args)]
pub(super) struct GainsArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub(super) fn run_process_command(args: ProcessArgs) -> Result<i32, CliError> {
    if args.from_shot > args.to_shot {
        return Err(CliError::Usage(format!(
            "--from-shot ({}) must not exceed --to-shot ({})",
            args.from_shot, args.to_shot
        )));
    }

    let config = load_config(args.config.as_deref())?;
    let layout = DischargeLayout::load(&args.layout).map_err(CliError::Compute)?;
    let artifacts = load_calibrations(&args.spectral, &args.absolute, &args.responses)?;

    let sources = discharge_sources(&args.data_root, &args.discharge, &layout.digitizers);
    let records = decode_digitizers(&JsonWaveformDecoder, &sources, &layout.alignment)
        .map_err(CliError::Compute)?;
    let AssembledDischarge {
        laser_times,
        fibers,
        failures,
    } = assemble_fibers(&layout, &records, &artifacts).map_err(CliError::Compute)?;

    let mut report = process_discharge(&FiberPipeline::new(&config), fibers);
    report.failed.splice(0..0, failures);

    let directory = output_directory(&args.output, &args.discharge)?;
    let mut written = write_profile_tables(
        &directory,
        &args.discharge,
        &laser_times,
        &report.completed,
        args.from_shot..args.to_shot,
    )
    .map_err(CliError::Compute)?;
    if args.raw_signals {
        for fiber in &report.completed {
            written.extend(
                write_raw_signals(&directory, fiber, layout.alignment.sample_step)
                    .map_err(CliError::Compute)?,
            );
        }
    }

    println!("{}", render_discharge_summary(&args.discharge, &report));
    for path in &written {
        println!("Wrote {}", path.display());
    }

    if report.passed() { Ok(0) } else { Ok(1) }
}

#[derive(Debug, Serialize)]
struct GainRow {
    family: &'static str,
    full_gain: f64,
    multiplier: f64,
}

pub(super) fn run_gains_command(args: GainsArgs) -> Result<i32, CliError> {
    let rows: Vec<GainRow> = GainFamily::ALL
        .iter()
        .map(|family| {
            let model = family.model();
            GainRow {
                family: family.as_str(),
                full_gain: model.constants().full_gain(),
                multiplier: model.multiplier(),
            }
        })
        .collect();

    if args.json {
        let rendered = serde_json::to_string_pretty(&rows)
            .map_err(|error| CliError::Internal(error.into()))?;
        println!("{rendered}");
    } else {
        println!("{:<8} {:>14} {:>14}", "family", "full_gain", "multiplier");
        for row in &rows {
            println!(
                "{:<8} {:>14.6e} {:>14.6}",
                row.family, row.full_gain, row.multiplier
            );
        }
    }
    Ok(0)
}

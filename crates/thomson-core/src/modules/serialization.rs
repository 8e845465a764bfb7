//! Text artifacts written after a discharge: Te/ne profile tables and raw
//! per-channel waveform dumps.

use super::fiber::{Fiber, ShotResult};
use crate::domain::{ThomsonError, ThomsonResult};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Records written to the profile tables unless the caller asks otherwise:
/// records 4 through 20, i.e. the fourth to twentieth processed shot after
/// the null trigger.
pub const DEFAULT_PROFILE_SHOTS: Range<usize> = 4..21;

pub const PROFILE_HEADER_LEAD: &str = "Z(cm)";

/// Plain notation for ordinary magnitudes, exponent notation for densities and
/// other very large or very small values.
pub fn format_csv_f64(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1.0e-4..1.0e6).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> ThomsonResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| write_error(parent, error))?;
    }
    fs::write(path, normalize_text_artifact(content)).map_err(|error| write_error(path, error))
}

fn write_error(path: &Path, error: std::io::Error) -> ThomsonError {
    ThomsonError::io_system(
        "IO.ARTIFACT_WRITE",
        format!("failed to write '{}': {error}", path.display()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileQuantity {
    Temperature,
    Density,
}

impl ProfileQuantity {
    pub const fn file_suffix(self) -> &'static str {
        match self {
            Self::Temperature => "Te",
            Self::Density => "ne",
        }
    }

    fn value(self, result: &ShotResult) -> Option<f64> {
        match self {
            Self::Temperature => result.temperature(),
            Self::Density => result.density,
        }
    }

    fn error(self, result: &ShotResult) -> f64 {
        match self {
            Self::Temperature => result.uncertainty.temperature,
            Self::Density => result.uncertainty.density,
        }
    }
}

/// One row per fiber: `z, value, error, value, error, ...` over `shots`,
/// with the laser-shot times in the header. Missing values are written as
/// `nan` and missing errors as 0.
pub fn render_profile_table(
    laser_times: &[f64],
    fibers: &[Fiber],
    quantity: ProfileQuantity,
    shots: Range<usize>,
) -> String {
    let shots = shots.start.min(laser_times.len())..shots.end.min(laser_times.len());

    let mut header = vec![PROFILE_HEADER_LEAD.to_string()];
    for time in &laser_times[shots.clone()] {
        header.push(format_csv_f64(*time));
        header.push("error".to_string());
    }
    let mut lines = vec![header.join(", ")];

    for fiber in fibers {
        let mut row = vec![format_csv_f64(fiber.identity().z_cm)];
        for shot in shots.clone() {
            let result = fiber.result_for_shot(shot);
            let value = result
                .and_then(|result| quantity.value(result))
                .unwrap_or(f64::NAN);
            let error = result.map_or(0.0, |result| quantity.error(result));
            row.push(format_csv_f64(value));
            row.push(format_csv_f64(error));
        }
        lines.push(row.join(", "));
    }

    lines.join("\n")
}

/// Writes `{discharge}_Te.csv` and `{discharge}_ne.csv` into `directory`.
pub fn write_profile_tables(
    directory: &Path,
    discharge: &str,
    laser_times: &[f64],
    fibers: &[Fiber],
    shots: Range<usize>,
) -> ThomsonResult<Vec<PathBuf>> {
    [ProfileQuantity::Temperature, ProfileQuantity::Density]
        .into_iter()
        .map(|quantity| {
            let path = directory.join(format!("{discharge}_{}.csv", quantity.file_suffix()));
            let table = render_profile_table(laser_times, fibers, quantity, shots.clone());
            write_text_artifact(&path, &table)?;
            Ok(path)
        })
        .collect()
}

/// `sample_time, shot0, shot1, ...` rows for one channel, on the raw sample
/// index axis.
pub fn render_raw_channel_csv(fiber: &Fiber, channel: usize, sample_step: f64) -> Option<String> {
    let waveforms = fiber
        .shots()
        .iter()
        .map(|shot| shot.channel(channel))
        .collect::<Option<Vec<&[f64]>>>()?;
    let samples = waveforms.iter().map(|waveform| waveform.len()).max().unwrap_or(0);

    let lines: Vec<String> = (0..samples)
        .map(|index| {
            let mut row = vec![format_csv_f64(index as f64 * sample_step)];
            row.extend(waveforms.iter().map(|waveform| {
                waveform
                    .get(index)
                    .map_or_else(String::new, |value| format_csv_f64(*value))
            }));
            row.join(", ")
        })
        .collect();
    Some(lines.join("\n"))
}

/// One `{name}_{n}channel.csv` per channel, `n` counted from 1.
pub fn write_raw_signals(
    directory: &Path,
    fiber: &Fiber,
    sample_step: f64,
) -> ThomsonResult<Vec<PathBuf>> {
    (0..fiber.channel_count())
        .filter_map(|channel| {
            render_raw_channel_csv(fiber, channel, sample_step).map(|content| (channel, content))
        })
        .map(|(channel, content)| {
            let path = directory.join(format!("{}_{}channel.csv", fiber.name(), channel + 1));
            write_text_artifact(&path, &content)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_PROFILE_SHOTS, ProfileQuantity, format_csv_f64, normalize_text_artifact,
        render_profile_table, render_raw_channel_csv, write_profile_tables, write_raw_signals,
    };
    use crate::common::config::PipelineConfig;
    use crate::domain::{ChannelWindow, FiberIdentity, ShotRecord};
    use crate::modules::calibration::FiberCalibration;
    use crate::modules::fiber::Fiber;
    use crate::modules::gain::GainFamily;
    use crate::modules::pipeline::{FiberPipeline, process_discharge};
    use crate::modules::response::ExpectedResponseTable;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn processed_fibers() -> Vec<Fiber> {
        let time: Vec<f64> = (0..10).map(f64::from).collect();
        let samples = vec![0.0, 1.0, 0.0, 1.0, 5.0, 5.0, 5.0, 5.0, 0.0, 1.0];
        let shots = vec![
            ShotRecord::new(time.clone(), vec![vec![0.0; 10]; 2]).expect("null shot"),
            ShotRecord::new(time, vec![samples.clone(), samples]).expect("shot"),
        ];
        let table = Arc::new(
            ExpectedResponseTable::from_pairs([(10.0, vec![2.0, 1.0]), (20.0, vec![1.0, 1.0])])
                .expect("table"),
        );
        let fitted = Fiber::new(
            FiberIdentity::new("eqTS_42_G10", 2, -37.1),
            shots.clone(),
            vec![ChannelWindow::new(4.0, 8.0); 2],
            GainFamily::Equator.model(),
            FiberCalibration::new(vec![1.0, 1.0]).with_response(table),
        )
        .expect("fiber");
        let auxiliary = Fiber::new(
            FiberIdentity::new("Handmade_G10", 1, -35.7),
            shots,
            vec![ChannelWindow::new(4.0, 8.0); 2],
            GainFamily::Equator.model(),
            FiberCalibration::new(vec![1.0, 1.0]),
        )
        .expect("fiber");

        let mut config = PipelineConfig::default();
        config.integration.noise_len = 2;
        config.integration.sample_step = 1.0;
        let report =
            process_discharge(&FiberPipeline::new(&config), vec![fitted, auxiliary]);
        report.completed
    }

    #[test]
    fn csv_numbers_switch_to_exponent_for_extreme_magnitudes() {
        assert_eq!(format_csv_f64(20.0), "20");
        assert_eq!(format_csv_f64(-37.1), "-37.1");
        assert_eq!(format_csv_f64(0.0), "0");
        assert_eq!(format_csv_f64(1.5e19), "1.5e19");
        assert_eq!(format_csv_f64(f64::NAN), "nan");
    }

    #[test]
    fn profile_table_pairs_values_with_errors() {
        let fibers = processed_fibers();
        let table = render_profile_table(
            &[0.0, 0.033],
            &fibers,
            ProfileQuantity::Temperature,
            1..20,
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Z(cm), 0.033, error");
        assert_eq!(lines[1], "-37.1, 20, 0");
        assert_eq!(lines[2], "-35.7, nan, 0");

        let density = render_profile_table(&[0.0, 0.033], &fibers, ProfileQuantity::Density, 1..2);
        assert!(density.lines().nth(1).is_some_and(|row| row == "-37.1, nan, 0"));
    }

    #[test]
    fn default_slice_starts_at_the_fourth_shot_after_the_null_trigger() {
        let times: Vec<f64> = (0..30).map(|record| record as f64 * 0.033).collect();
        let table =
            render_profile_table(&times, &[], ProfileQuantity::Temperature, DEFAULT_PROFILE_SHOTS);
        let header: Vec<&str> = table.lines().next().expect("header").split(", ").collect();

        assert_eq!(header.len(), 1 + 2 * 17);
        assert_eq!(header[1], format_csv_f64(times[4]));
        assert_eq!(header[header.len() - 2], format_csv_f64(times[20]));
    }

    #[test]
    fn tables_and_raw_dumps_land_in_the_output_directory() {
        let temp = TempDir::new().expect("tempdir should be created");
        let directory = temp.path().join("44644");
        let fibers = processed_fibers();

        let written = write_profile_tables(&directory, "44644", &[0.0, 0.033], &fibers, 0..2)
            .expect("tables should be written");
        assert_eq!(written.len(), 2);
        assert!(directory.join("44644_Te.csv").is_file());
        let density = fs::read_to_string(directory.join("44644_ne.csv")).expect("ne table");
        assert!(density.starts_with("Z(cm), 0, error, 0.033, error\n"));

        let raw = write_raw_signals(&directory, &fibers[0], 0.325).expect("raw dumps");
        assert_eq!(raw.len(), 2);
        let channel = fs::read_to_string(directory.join("eqTS_42_G10_2channel.csv"))
            .expect("channel dump");
        assert_eq!(channel.lines().count(), 10);
        assert_eq!(channel.lines().nth(4), Some("1.3, 0, 5"));
    }

    #[test]
    fn raw_channel_outside_the_fiber_is_none() {
        let fibers = processed_fibers();
        assert!(render_raw_channel_csv(&fibers[0], 5, 0.325).is_none());
        assert_eq!(normalize_text_artifact("a\r\nb"), "a\nb\n");
    }
}

//! Digitizer dumps: decoding, per-shot peak alignment of the time axis, and the
//! per-file worker pool.

use crate::common::config::read_json_artifact;
use crate::common::constants::{DIGITIZER_SAMPLE_STEP_NS, PEAK_ALIGNMENT_SHIFT_NS};
use crate::domain::{ThomsonError, ThomsonResult};
use crate::numerics::argmax;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One laser-shot record as written by the acquisition: trigger timestamp and
/// one waveform per digitizer channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DigitizerShot {
    #[serde(rename = "t")]
    pub trigger_time: f64,
    #[serde(rename = "ch")]
    pub channels: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitizerSource {
    pub unit: u32,
    pub path: PathBuf,
}

/// Turns one digitizer file into its shot records.
pub trait WaveformDecoder: Sync {
    fn decode(&self, path: &Path) -> ThomsonResult<Vec<DigitizerShot>>;
}

/// Reads dumps already converted to a JSON array of `{"t": .., "ch": [[..], ..]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWaveformDecoder;

impl WaveformDecoder for JsonWaveformDecoder {
    fn decode(&self, path: &Path) -> ThomsonResult<Vec<DigitizerShot>> {
        Ok(read_json_artifact(path)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub sample_step: f64,
    /// Time assigned to the reference-channel maximum, ns.
    pub time_shift: f64,
    pub reference_channel: usize,
    /// Records kept per file; `None` keeps all of them.
    pub processed_shots: Option<usize>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            sample_step: DIGITIZER_SAMPLE_STEP_NS,
            time_shift: PEAK_ALIGNMENT_SHIFT_NS,
            reference_channel: 0,
            processed_shots: Some(30),
        }
    }
}

/// `time[i] = time_shift - (argmax - i) * sample_step`, so the reference
/// maximum always sits at `time_shift`.
pub fn aligned_time_axis(reference: &[f64], sample_step: f64, time_shift: f64) -> Vec<f64> {
    let Some(peak) = argmax(reference) else {
        return Vec::new();
    };
    (0..reference.len())
        .map(|index| time_shift - (peak as f64 - index as f64) * sample_step)
        .collect()
}

fn round_to_millis(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Decoded contents of one digitizer unit, regrouped channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitizerRecord {
    unit: u32,
    /// Trigger time of every record relative to record 0; index-aligned with
    /// the shots, so entry 0 is the null trigger.
    laser_times: Vec<f64>,
    shot_times: Vec<Vec<f64>>,
    /// `channel -> shot -> samples`
    channels: Vec<Vec<Vec<f64>>>,
}

impl DigitizerRecord {
    pub fn from_shots(
        unit: u32,
        mut shots: Vec<DigitizerShot>,
        alignment: &AlignmentConfig,
    ) -> ThomsonResult<Self> {
        if let Some(limit) = alignment.processed_shots {
            shots.truncate(limit);
        }
        let Some(first) = shots.first() else {
            return Err(ThomsonError::input_validation(
                "INPUT.DIGITIZER_EMPTY",
                format!("digitizer {unit} holds no shot records"),
            ));
        };
        let origin = first.trigger_time;
        let channel_count = first.channels.len();

        let mut laser_times = Vec::with_capacity(shots.len());
        let mut shot_times = Vec::with_capacity(shots.len());
        let mut channels = vec![Vec::with_capacity(shots.len()); channel_count];
        for (index, shot) in shots.into_iter().enumerate() {
            if shot.channels.len() != channel_count {
                return Err(ThomsonError::input_validation(
                    "INPUT.DIGITIZER_CHANNELS",
                    format!(
                        "digitizer {unit} record {index} has {} channels, expected {channel_count}",
                        shot.channels.len()
                    ),
                ));
            }
            let reference = shot
                .channels
                .get(alignment.reference_channel)
                .ok_or_else(|| {
                    ThomsonError::input_validation(
                        "INPUT.DIGITIZER_CHANNELS",
                        format!(
                            "digitizer {unit} has no reference channel {}",
                            alignment.reference_channel
                        ),
                    )
                })?;

            laser_times.push(round_to_millis(shot.trigger_time - origin));
            shot_times.push(aligned_time_axis(
                reference,
                alignment.sample_step,
                alignment.time_shift,
            ));
            for (channel, samples) in shot.channels.into_iter().enumerate() {
                channels[channel].push(samples);
            }
        }

        Ok(Self {
            unit,
            laser_times,
            shot_times,
            channels,
        })
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn shot_count(&self) -> usize {
        self.shot_times.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn laser_times(&self) -> &[f64] {
        &self.laser_times
    }

    pub fn shot_times(&self) -> &[Vec<f64>] {
        &self.shot_times
    }

    /// All shots of one channel.
    pub fn channel(&self, channel: usize) -> Option<&[Vec<f64>]> {
        self.channels.get(channel).map(Vec::as_slice)
    }
}

/// `{root}/{discharge}/{unit}.json` for every unit.
pub fn discharge_sources(root: &Path, discharge: &str, units: &[u32]) -> Vec<DigitizerSource> {
    units
        .iter()
        .map(|unit| DigitizerSource {
            unit: *unit,
            path: root.join(discharge).join(format!("{unit}.json")),
        })
        .collect()
}

/// Decodes every source file as one task on the rayon pool. Records come back
/// in source order; the first failing file fails the whole batch.
pub fn decode_digitizers<D>(
    decoder: &D,
    sources: &[DigitizerSource],
    alignment: &AlignmentConfig,
) -> ThomsonResult<Vec<DigitizerRecord>>
where
    D: WaveformDecoder + ?Sized,
{
    sources
        .par_iter()
        .map(|source| {
            let shots = decoder.decode(&source.path)?;
            tracing::debug!(
                unit = source.unit,
                records = shots.len(),
                path = %source.path.display(),
                "decoded digitizer file"
            );
            DigitizerRecord::from_shots(source.unit, shots, alignment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        AlignmentConfig, DigitizerRecord, DigitizerShot, JsonWaveformDecoder, WaveformDecoder,
        aligned_time_axis, decode_digitizers, discharge_sources,
    };
    use std::fs;
    use tempfile::TempDir;

    fn shot(trigger_time: f64, peak: usize) -> DigitizerShot {
        let mut reference = vec![0.0; 8];
        reference[peak] = 50.0;
        DigitizerShot {
            trigger_time,
            channels: vec![reference, vec![1.0; 8]],
        }
    }

    #[test]
    fn time_axis_places_reference_peak_at_the_shift() {
        let axis = aligned_time_axis(&[0.0, 1.0, 9.0, 2.0], 0.325, 100.0);
        assert_eq!(axis.len(), 4);
        assert!((axis[2] - 100.0).abs() < 1.0e-12);
        assert!((axis[0] - 99.35).abs() < 1.0e-12);
        assert!((axis[3] - 100.325).abs() < 1.0e-12);
        assert!(aligned_time_axis(&[], 0.325, 100.0).is_empty());
    }

    #[test]
    fn records_regroup_channel_major_with_relative_laser_times() {
        let shots = vec![shot(10.0, 3), shot(10.0333, 2), shot(10.0666, 5)];
        let record = DigitizerRecord::from_shots(2, shots, &AlignmentConfig::default())
            .expect("record");

        assert_eq!(record.unit(), 2);
        assert_eq!(record.shot_count(), 3);
        assert_eq!(record.channel_count(), 2);
        assert_eq!(record.laser_times(), &[0.0, 0.033, 0.067]);
        assert!((record.shot_times()[1][2] - 100.0).abs() < 1.0e-12);
        assert_eq!(record.channel(1).expect("channel")[2], vec![1.0; 8]);
    }

    #[test]
    fn processed_shots_limits_the_records_kept() {
        let shots = (0..5).map(|index| shot(index as f64, 1)).collect();
        let alignment = AlignmentConfig {
            processed_shots: Some(3),
            ..AlignmentConfig::default()
        };
        let record = DigitizerRecord::from_shots(0, shots, &alignment).expect("record");
        assert_eq!(record.shot_count(), 3);

        let error = DigitizerRecord::from_shots(0, Vec::new(), &alignment)
            .expect_err("empty file should fail");
        assert_eq!(error.code(), "INPUT.DIGITIZER_EMPTY");
    }

    #[test]
    fn ragged_channel_counts_are_rejected() {
        let mut broken = shot(1.0, 1);
        broken.channels.pop();
        let error =
            DigitizerRecord::from_shots(0, vec![shot(0.0, 1), broken], &AlignmentConfig::default())
                .expect_err("ragged record should fail");
        assert_eq!(error.code(), "INPUT.DIGITIZER_CHANNELS");
    }

    #[test]
    fn decoding_runs_every_source_in_order() {
        let temp = TempDir::new().expect("tempdir should be created");
        let discharge = temp.path().join("44644");
        fs::create_dir_all(&discharge).expect("discharge dir");
        for unit in [0_u32, 1] {
            let shots = vec![shot(0.0, unit as usize + 1), shot(0.5, 4)];
            fs::write(
                discharge.join(format!("{unit}.json")),
                serde_json::to_string(&shots).expect("serialize"),
            )
            .expect("dump should be written");
        }

        let sources = discharge_sources(temp.path(), "44644", &[1, 0]);
        let records = decode_digitizers(&JsonWaveformDecoder, &sources, &AlignmentConfig::default())
            .expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].unit(), 1);
        assert_eq!(records[1].unit(), 0);
        assert!((records[0].shot_times()[0][2] - 100.0).abs() < 1.0e-12);
    }

    #[test]
    fn missing_file_fails_the_batch() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sources = discharge_sources(temp.path(), "1", &[0]);
        let decoder: &dyn WaveformDecoder = &JsonWaveformDecoder;
        let error = decode_digitizers(decoder, &sources, &AlignmentConfig::default())
            .expect_err("missing dump should fail");
        assert_eq!(error.code(), "IO.ARTIFACT_READ");
    }
}

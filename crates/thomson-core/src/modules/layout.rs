//! Discharge layout: which digitizer channels feed which polychromator, and the
//! assembly of [`Fiber`]s from decoded records and calibration artifacts.

use super::calibration::{AbsoluteCalibrationSet, FiberCalibration, SpectralCalibrationSet};
use super::digitizer::{AlignmentConfig, DigitizerRecord};
use super::fiber::{Fiber, FiberFailure};
use super::gain::GainFamily;
use super::response::ExpectedResponseTable;
use crate::common::config::read_json_artifact;
use crate::domain::{ChannelWindow, FiberIdentity, ShotRecord, ThomsonError, ThomsonResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelSource {
    pub unit: u32,
    pub channel: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FiberLayout {
    pub name: String,
    pub fiber_number: u32,
    pub z_cm: f64,
    pub gain: GainFamily,
    /// Digitizer whose aligned time axis the fiber's channels are read on.
    pub time_unit: u32,
    pub channels: Vec<ChannelSource>,
    pub windows: Vec<ChannelWindow>,
    /// Key into the loaded expected-response tables; `None` for fibers that
    /// are only integrated.
    #[serde(default)]
    pub response_table: Option<String>,
}

impl FiberLayout {
    pub fn identity(&self) -> FiberIdentity {
        FiberIdentity::new(self.name.clone(), self.fiber_number, self.z_cm)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DischargeLayout {
    /// Digitizer units to decode; laser-shot times come from the first one.
    pub digitizers: Vec<u32>,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    pub fibers: Vec<FiberLayout>,
}

impl DischargeLayout {
    pub fn load(path: impl AsRef<Path>) -> ThomsonResult<Self> {
        let layout: Self = read_json_artifact(path)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> ThomsonResult<()> {
        if self.digitizers.is_empty() {
            return Err(layout_error("layout lists no digitizers"));
        }
        let units: BTreeSet<u32> = self.digitizers.iter().copied().collect();
        let mut names = BTreeSet::new();

        for fiber in &self.fibers {
            if !names.insert(fiber.name.as_str()) {
                return Err(layout_error(format!("fiber '{}' is listed twice", fiber.name)));
            }
            if fiber.channels.len() != fiber.windows.len() {
                return Err(layout_error(format!(
                    "fiber '{}' maps {} channels but defines {} windows",
                    fiber.name,
                    fiber.channels.len(),
                    fiber.windows.len()
                )));
            }
            let referenced = std::iter::once(fiber.time_unit)
                .chain(fiber.channels.iter().map(|source| source.unit));
            for unit in referenced {
                if !units.contains(&unit) {
                    return Err(layout_error(format!(
                        "fiber '{}' references digitizer {unit}, which is not decoded",
                        fiber.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn layout_error(message: impl Into<String>) -> ThomsonError {
    ThomsonError::input_validation("CONFIG.LAYOUT", message)
}

/// Calibration inputs shared by every fiber of a discharge.
#[derive(Debug, Clone, Default)]
pub struct CalibrationArtifacts {
    pub spectral: SpectralCalibrationSet,
    pub absolute: AbsoluteCalibrationSet,
    pub response_tables: BTreeMap<String, Arc<ExpectedResponseTable>>,
}

impl CalibrationArtifacts {
    pub fn new(spectral: SpectralCalibrationSet, absolute: AbsoluteCalibrationSet) -> Self {
        Self {
            spectral,
            absolute,
            response_tables: BTreeMap::new(),
        }
    }

    pub fn with_response_table(
        mut self,
        key: impl Into<String>,
        table: ExpectedResponseTable,
    ) -> Self {
        self.response_tables.insert(key.into(), Arc::new(table));
        self
    }

    pub fn response_table(&self, key: &str) -> Option<Arc<ExpectedResponseTable>> {
        self.response_tables.get(key).cloned()
    }
}

fn record_for(records: &[DigitizerRecord], unit: u32) -> ThomsonResult<&DigitizerRecord> {
    records
        .iter()
        .find(|record| record.unit() == unit)
        .ok_or_else(|| {
            ThomsonError::input_validation(
                "CONFIG.DIGITIZER_MISSING",
                format!("digitizer {unit} was not decoded"),
            )
        })
}

pub fn assemble_fiber(
    layout: &FiberLayout,
    records: &[DigitizerRecord],
    artifacts: &CalibrationArtifacts,
) -> ThomsonResult<Fiber> {
    let time = record_for(records, layout.time_unit)?.shot_times();

    let mut channels = Vec::with_capacity(layout.channels.len());
    for source in &layout.channels {
        let shots = record_for(records, source.unit)?
            .channel(source.channel)
            .ok_or_else(|| {
                ThomsonError::input_validation(
                    "CONFIG.DIGITIZER_CHANNEL",
                    format!(
                        "fiber '{}' reads channel {} of digitizer {}, which does not exist",
                        layout.name, source.channel, source.unit
                    ),
                )
            })?;
        channels.push(shots.to_vec());
    }
    let shots = ShotRecord::from_channel_major(time, &channels)?;

    let response = match &layout.response_table {
        Some(key) => Some(artifacts.response_table(key).ok_or_else(|| {
            ThomsonError::input_validation(
                "CONFIG.RESPONSE_MISSING",
                format!(
                    "fiber '{}' needs expected-response table '{key}', which is not loaded",
                    layout.name
                ),
            )
        })?),
        None => None,
    };
    let calibration = FiberCalibration::select(
        &layout.name,
        &artifacts.spectral,
        &artifacts.absolute,
        response,
    )?;

    Fiber::new(
        layout.identity(),
        shots,
        layout.windows.clone(),
        layout.gain.model(),
        calibration,
    )
}

/// Fibers ready for the pipeline plus the ones whose configuration was rejected.
#[derive(Debug, Clone)]
pub struct AssembledDischarge {
    pub laser_times: Vec<f64>,
    pub fibers: Vec<Fiber>,
    pub failures: Vec<FiberFailure>,
}

pub fn assemble_fibers(
    layout: &DischargeLayout,
    records: &[DigitizerRecord],
    artifacts: &CalibrationArtifacts,
) -> ThomsonResult<AssembledDischarge> {
    let first_unit = layout
        .digitizers
        .first()
        .copied()
        .ok_or_else(|| layout_error("layout lists no digitizers"))?;
    let laser_times = record_for(records, first_unit)?.laser_times().to_vec();

    let mut fibers = Vec::with_capacity(layout.fibers.len());
    let mut failures = Vec::new();
    for fiber_layout in &layout.fibers {
        match assemble_fiber(fiber_layout, records, artifacts) {
            Ok(fiber) => fibers.push(fiber),
            Err(error) => {
                tracing::warn!(
                    fiber = %fiber_layout.name,
                    code = error.code(),
                    "fiber excluded: {}",
                    error.message()
                );
                failures.push(FiberFailure {
                    name: fiber_layout.name.clone(),
                    stage: None,
                    error,
                });
            }
        }
    }

    Ok(AssembledDischarge {
        laser_times,
        fibers,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        CalibrationArtifacts, ChannelSource, DischargeLayout, FiberLayout, assemble_fiber,
        assemble_fibers,
    };
    use crate::domain::ChannelWindow;
    use crate::modules::calibration::{
        AbsoluteCalibrationSet, FitCapability, SpectralCalibrationSet,
    };
    use crate::modules::digitizer::{AlignmentConfig, DigitizerRecord, DigitizerShot};
    use crate::modules::gain::GainFamily;
    use crate::modules::response::ExpectedResponseTable;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn record(unit: u32, fill: f64) -> DigitizerRecord {
        let shots = (0..3)
            .map(|index| {
                let mut reference = vec![0.0; 6];
                reference[2] = 10.0;
                DigitizerShot {
                    trigger_time: index as f64 * 0.033,
                    channels: vec![reference, vec![fill; 6], vec![fill + 1.0; 6]],
                }
            })
            .collect();
        DigitizerRecord::from_shots(unit, shots, &AlignmentConfig::default()).expect("record")
    }

    fn fiber_layout(name: &str, response_table: Option<&str>) -> FiberLayout {
        FiberLayout {
            name: name.to_string(),
            fiber_number: 2,
            z_cm: -37.1,
            gain: GainFamily::Equator,
            time_unit: 0,
            channels: vec![
                ChannelSource {
                    unit: 0,
                    channel: 1,
                },
                ChannelSource {
                    unit: 1,
                    channel: 2,
                },
            ],
            windows: vec![ChannelWindow::new(99.0, 100.5); 2],
            response_table: response_table.map(str::to_string),
        }
    }

    fn artifacts() -> CalibrationArtifacts {
        let spectral = SpectralCalibrationSet::new(BTreeMap::from([(
            "eqTS".to_string(),
            vec![1.0, 0.9],
        )]));
        let absolute =
            AbsoluteCalibrationSet::new(BTreeMap::from([("eqTS_42_G10".to_string(), 3.0e-11)]));
        CalibrationArtifacts::new(spectral, absolute).with_response_table(
            "equator",
            ExpectedResponseTable::from_pairs([(1.0, vec![1.0, 2.0]), (2.0, vec![2.0, 1.0])])
                .expect("table"),
        )
    }

    #[test]
    fn channels_can_come_from_several_digitizers() {
        let records = [record(0, 5.0), record(1, 7.0)];
        let fiber = assemble_fiber(&fiber_layout("eqTS_42_G10", Some("equator")), &records, &artifacts())
            .expect("fiber");

        assert_eq!(fiber.shots().len(), 3);
        assert_eq!(fiber.channel_count(), 2);
        let shot = &fiber.shots()[1];
        assert_eq!(shot.channel(0), Some(&[5.0; 6][..]));
        assert_eq!(shot.channel(1), Some(&[8.0; 6][..]));
        assert!((shot.time()[2] - 100.0).abs() < 1.0e-12);
        assert_eq!(fiber.capability(), FitCapability::TemperatureAndDensity);
    }

    #[test]
    fn missing_response_table_excludes_only_that_fiber() {
        let records = [record(0, 5.0), record(1, 7.0)];
        let layout = DischargeLayout {
            digitizers: vec![0, 1],
            alignment: AlignmentConfig::default(),
            fibers: vec![
                fiber_layout("eqTS_42_G10", Some("equator")),
                fiber_layout("eqTS_47_G10", Some("t15")),
            ],
        };
        layout.validate().expect("layout is consistent");

        let assembled = assemble_fibers(&layout, &records, &artifacts()).expect("assembled");
        assert_eq!(assembled.laser_times, vec![0.0, 0.033, 0.066]);
        assert_eq!(assembled.fibers.len(), 1);
        assert_eq!(assembled.failures.len(), 1);
        assert_eq!(assembled.failures[0].name, "eqTS_47_G10");
        assert_eq!(assembled.failures[0].error.code(), "CONFIG.RESPONSE_MISSING");
    }

    #[test]
    fn unknown_digitizer_channel_is_a_configuration_error() {
        let records = [record(0, 5.0), record(1, 7.0)];
        let mut layout = fiber_layout("eqTS_42_G10", None);
        layout.channels[1].channel = 9;
        let error = assemble_fiber(&layout, &records, &artifacts()).expect_err("bad channel");
        assert_eq!(error.code(), "CONFIG.DIGITIZER_CHANNEL");

        let error = assemble_fiber(&fiber_layout("eqTS_42_G10", None), &records[..1], &artifacts())
            .expect_err("missing digitizer");
        assert_eq!(error.code(), "CONFIG.DIGITIZER_MISSING");
    }

    #[test]
    fn layout_validation_catches_inconsistent_fibers() {
        let mut fiber = fiber_layout("eqTS_42_G10", None);
        fiber.windows.pop();
        let layout = DischargeLayout {
            digitizers: vec![0, 1],
            alignment: AlignmentConfig::default(),
            fibers: vec![fiber],
        };
        assert_eq!(layout.validate().expect_err("mismatch").code(), "CONFIG.LAYOUT");

        let layout = DischargeLayout {
            digitizers: vec![0],
            alignment: AlignmentConfig::default(),
            fibers: vec![fiber_layout("eqTS_42_G10", None)],
        };
        assert_eq!(layout.validate().expect_err("unknown unit").code(), "CONFIG.LAYOUT");
    }

    #[test]
    fn layout_loads_from_json_with_legacy_window_names() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("layout.json");
        fs::write(
            &path,
            r#"{
                "digitizers": [0],
                "alignment": {"processed_shots": null},
                "fibers": [{
                    "name": "T15_35_G10",
                    "fiber_number": 8,
                    "z_cm": -44.35,
                    "gain": "t15-35",
                    "time_unit": 0,
                    "channels": [{"unit": 0, "channel": 11}],
                    "windows": [{"sig_LeftBord": 95.0, "sig_RightBord": 120.0}]
                }]
            }"#,
        )
        .expect("layout should be written");

        let layout = DischargeLayout::load(&path).expect("layout should load");
        assert_eq!(layout.alignment.processed_shots, None);
        assert_eq!(layout.alignment.sample_step, 0.325);
        assert_eq!(layout.fibers[0].gain, GainFamily::T15_35);
        assert_eq!(layout.fibers[0].windows[0], ChannelWindow::new(95.0, 120.0));
        assert_eq!(layout.fibers[0].response_table, None);
    }
}

pub mod calibration;
pub mod density;
pub mod digitizer;
pub mod fiber;
pub mod gain;
pub mod integrator;
pub mod layout;
pub mod pipeline;
pub mod response;
pub mod serialization;
pub mod temperature;
pub mod uncertainty;

mod traits;

pub use calibration::{AbsoluteCalibrationSet, FiberCalibration, FitCapability, SpectralCalibrationSet};
pub use fiber::{Fiber, FiberFailure, ShotFailure, ShotResult};
pub use gain::{GainConstants, GainFamily, GainModel};
pub use layout::{CalibrationArtifacts, DischargeLayout, assemble_fibers};
pub use pipeline::{DischargeReport, FiberPipeline, process_discharge, render_discharge_summary};
pub use response::ExpectedResponseTable;
pub use traits::{FiberStage, StageSummary};

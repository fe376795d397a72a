pub mod outcome;
pub mod types;

pub use outcome::{
    CaptureFailure, CycleOutcome, OutcomeSummary, RecognitionFailure, SelectionFailure,
};
pub use types::{CycleStage, DaemonStatus, Geometry, SelectionRect};

//! Calibration session and step result data model.

pub mod params;
pub mod timestamp;
pub mod types;

pub use params::{NewSession, NewStepResult, SessionPage, SessionPatch, SessionQuery, StepResultPatch};
pub use types::*;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::WIZARD_STEPS;
use crate::session::{CalibrationSession, SessionStatus, StepState};

/// Row of the session list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    #[serde(with = "crate::session::timestamp")]
    pub registered: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(with = "crate::session::timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::session::timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub printer_name: Option<String>,
    pub nozzle_diameter: Option<f64>,
    pub notes: Option<String>,
    pub done: usize,
    pub skipped: usize,
    pub incomplete: usize,
    /// Step types without any recorded result.
    pub pending: usize,
    pub step_count: usize,
}

impl SessionSummary {
    /// Counts use the latest result of each step type.
    pub fn from_session(session: &CalibrationSession) -> Self {
        let (mut done, mut skipped, mut incomplete, mut pending) = (0, 0, 0, 0);
        for step_type in WIZARD_STEPS {
            match session.step_state(step_type) {
                Some(StepState::Done) => done += 1,
                Some(StepState::Skipped) => skipped += 1,
                Some(StepState::Incomplete) => incomplete += 1,
                None => pending += 1,
            }
        }
        Self {
            id: session.id,
            registered: session.registered,
            status: session.status,
            started_at: session.started_at,
            completed_at: session.completed_at,
            printer_name: session.printer_name.clone(),
            nozzle_diameter: session.nozzle_diameter,
            notes: session.notes.clone(),
            done,
            skipped,
            incomplete,
            pending,
            step_count: session.steps.len(),
        }
    }

    /// Done or deliberately skipped.
    pub fn settled(&self) -> usize {
        self.done + self.skipped
    }
}

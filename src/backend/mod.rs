//! Persistence of calibration sessions and step results.
//!
//! The wizard and session list only talk to [`CalibrationBackend`]. Two
//! implementations ship with the crate:
//! - [`SpoolmanClient`]: the calibration endpoints of a Spoolman server
//! - [`SqliteBackend`]: a local SQLite database with the same schema

pub mod spoolman;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::{
    CalibrationSession, NewSession, NewStepResult, SessionPage, SessionPatch, SessionQuery,
    StepResult, StepResultPatch,
};

pub use spoolman::SpoolmanClient;
pub use sqlite::{SqliteBackend, SqliteStore};

/// CRUD operations on sessions and their step results.
///
/// Implementations return `CalibrationError::NotFound` for unknown ids and
/// list sessions newest first with their steps attached.
#[async_trait]
pub trait CalibrationBackend: Send + Sync {
    async fn list_sessions(&self, query: &SessionQuery) -> Result<SessionPage>;

    async fn get_session(&self, session_id: i64) -> Result<CalibrationSession>;

    async fn create_session(&self, params: &NewSession) -> Result<CalibrationSession>;

    async fn update_session(
        &self,
        session_id: i64,
        patch: &SessionPatch,
    ) -> Result<CalibrationSession>;

    /// Deletes the session and all of its step results.
    async fn delete_session(&self, session_id: i64) -> Result<()>;

    async fn create_step(&self, session_id: i64, params: &NewStepResult) -> Result<StepResult>;

    async fn get_step(&self, step_id: i64) -> Result<StepResult>;

    async fn update_step(&self, step_id: i64, patch: &StepResultPatch) -> Result<StepResult>;

    async fn delete_step(&self, step_id: i64) -> Result<()>;
}

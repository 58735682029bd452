use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::CalibrationBackend;
use crate::error::{CalibrationError, Result};
use crate::session::timestamp;
use crate::session::{
    CalibrationSession, Confidence, FieldValues, NewSession, NewStepResult, SessionPage, SessionPatch,
    SessionQuery, StepResult, StepResultPatch,
};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS calibration_session (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        registered TEXT NOT NULL,
        filament_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        printer_name TEXT,
        nozzle_diameter REAL,
        notes TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_calibration_session_filament
        ON calibration_session(filament_id);
    CREATE TABLE IF NOT EXISTS calibration_step_result (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL
            REFERENCES calibration_session(id) ON DELETE CASCADE,
        step_type TEXT NOT NULL,
        inputs TEXT,
        outputs TEXT,
        selected_values TEXT,
        notes TEXT,
        confidence TEXT,
        recorded_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_calibration_step_session
        ON calibration_step_result(session_id);
";

const SESSION_COLUMNS: &str = "id, registered, filament_id, status, started_at, completed_at,
    printer_name, nozzle_diameter, notes";

const STEP_COLUMNS: &str = "id, session_id, step_type, inputs, outputs, selected_values,
    notes, confidence, recorded_at";

/// Raw session row; text columns are parsed outside the rusqlite closure.
struct SessionRow {
    id: i64,
    registered: String,
    filament_id: i64,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    printer_name: Option<String>,
    nozzle_diameter: Option<f64>,
    notes: Option<String>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            registered: row.get(1)?,
            filament_id: row.get(2)?,
            status: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            printer_name: row.get(6)?,
            nozzle_diameter: row.get(7)?,
            notes: row.get(8)?,
        })
    }

    fn into_session(self, steps: Vec<StepResult>) -> Result<CalibrationSession> {
        Ok(CalibrationSession {
            id: self.id,
            registered: parse_time(&self.registered)?,
            filament_id: self.filament_id,
            status: self.status.parse()?,
            started_at: self.started_at.as_deref().map(parse_time).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_time).transpose()?,
            printer_name: self.printer_name,
            nozzle_diameter: self.nozzle_diameter,
            notes: self.notes,
            steps,
        })
    }
}

struct StepRow {
    id: i64,
    session_id: i64,
    step_type: String,
    inputs: Option<String>,
    outputs: Option<String>,
    selected_values: Option<String>,
    notes: Option<String>,
    confidence: Option<String>,
    recorded_at: String,
}

impl StepRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            step_type: row.get(2)?,
            inputs: row.get(3)?,
            outputs: row.get(4)?,
            selected_values: row.get(5)?,
            notes: row.get(6)?,
            confidence: row.get(7)?,
            recorded_at: row.get(8)?,
        })
    }

    fn into_step(self) -> Result<StepResult> {
        Ok(StepResult {
            id: self.id,
            session_id: self.session_id,
            step_type: self.step_type.parse()?,
            inputs: decode_values(self.inputs)?,
            outputs: decode_values(self.outputs)?,
            selected_values: decode_values(self.selected_values)?,
            notes: self.notes,
            confidence: self
                .confidence
                .as_deref()
                .map(str::parse::<Confidence>)
                .transpose()?,
            recorded_at: parse_time(&self.recorded_at)?,
        })
    }
}

fn parse_time(raw: &str) -> Result<chrono::DateTime<Utc>> {
    timestamp::parse(raw)
        .ok_or_else(|| CalibrationError::Storage(format!("Invalid stored timestamp '{}'", raw)))
}

fn encode_values(values: Option<&FieldValues>) -> Result<Option<String>> {
    values
        .map(|v| serde_json::to_string(v).map_err(CalibrationError::from))
        .transpose()
}

fn decode_values(raw: Option<String>) -> Result<Option<FieldValues>> {
    match raw {
        Some(json) if !json.is_empty() => Ok(Some(serde_json::from_str(&json)?)),
        _ => Ok(None),
    }
}

fn now_secs() -> chrono::DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// SQLite store for calibration sessions and step results.
/// All operations are synchronous (rusqlite is blocking).
/// Async callers go through [`SqliteBackend`], which uses `spawn_blocking`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create or open the calibration database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalibrationError::Storage(format!("Failed to create data dir: {}", e))
            })?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self::with_connection(conn)?;
        info!("Opened calibration database at {:?}", db_path);
        Ok(store)
    }

    /// A throwaway database, used by tests and previews.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn list_sessions(&self, query: &SessionQuery) -> Result<SessionPage> {
        let total_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM calibration_session
             WHERE ?1 IS NULL OR filament_id = ?1",
            params![query.filament_id],
            |row| row.get(0),
        )?;

        // LIMIT -1 means no limit in SQLite.
        let limit = query.limit.map_or(-1, i64::from);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM calibration_session
             WHERE ?1 IS NULL OR filament_id = ?1
             ORDER BY registered DESC, id DESC
             LIMIT ?2 OFFSET ?3",
            SESSION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![query.filament_id, limit, query.offset], SessionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let steps = self.steps_for(row.id)?;
            items.push(row.into_session(steps)?);
        }
        debug!(
            "Listed {} of {} sessions (filament {:?})",
            items.len(),
            total_count,
            query.filament_id
        );
        Ok(SessionPage {
            items,
            total_count: total_count.max(0) as u64,
        })
    }

    pub fn get_session(&self, session_id: i64) -> Result<CalibrationSession> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM calibration_session WHERE id = ?1",
                    SESSION_COLUMNS
                ),
                params![session_id],
                SessionRow::from_row,
            )
            .optional()?
            .ok_or_else(|| session_not_found(session_id))?;
        let steps = self.steps_for(session_id)?;
        row.into_session(steps)
    }

    pub fn create_session(&self, params: &NewSession) -> Result<CalibrationSession> {
        params.validate()?;
        self.conn.execute(
            "INSERT INTO calibration_session
             (registered, filament_id, status, started_at, printer_name, nozzle_diameter, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                timestamp::format(&now_secs()),
                params.filament_id,
                params.status.as_str(),
                params.started_at.as_ref().map(timestamp::format),
                params.printer_name,
                params.nozzle_diameter,
                params.notes,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(
            "Created calibration session {} for filament {}",
            id, params.filament_id
        );
        self.get_session(id)
    }

    pub fn update_session(&self, session_id: i64, patch: &SessionPatch) -> Result<CalibrationSession> {
        patch.validate()?;
        let mut session = self.get_session(session_id)?;
        patch.apply_to(&mut session);
        self.conn.execute(
            "UPDATE calibration_session
             SET status = ?1, started_at = ?2, completed_at = ?3,
                 printer_name = ?4, nozzle_diameter = ?5, notes = ?6
             WHERE id = ?7",
            params![
                session.status.as_str(),
                session.started_at.as_ref().map(timestamp::format),
                session.completed_at.as_ref().map(timestamp::format),
                session.printer_name,
                session.nozzle_diameter,
                session.notes,
                session_id,
            ],
        )?;
        info!("Updated calibration session {}", session_id);
        Ok(session)
    }

    pub fn delete_session(&self, session_id: i64) -> Result<()> {
        let count = self.conn.execute(
            "DELETE FROM calibration_session WHERE id = ?1",
            params![session_id],
        )?;
        if count == 0 {
            return Err(session_not_found(session_id));
        }
        info!("Deleted calibration session {}", session_id);
        Ok(())
    }

    pub fn create_step(&self, session_id: i64, params: &NewStepResult) -> Result<StepResult> {
        params.validate()?;
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM calibration_session WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(session_not_found(session_id));
        }

        let recorded_at = params.recorded_at.unwrap_or_else(now_secs);
        self.conn.execute(
            "INSERT INTO calibration_step_result
             (session_id, step_type, inputs, outputs, selected_values, notes, confidence, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session_id,
                params.step_type.as_str(),
                encode_values(params.inputs.as_ref())?,
                encode_values(params.outputs.as_ref())?,
                encode_values(params.selected_values.as_ref())?,
                params.notes,
                params.confidence.map(|c| c.as_str()),
                timestamp::format(&recorded_at),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(
            "Recorded {} step {} in session {}",
            params.step_type, id, session_id
        );
        self.get_step(id)
    }

    pub fn get_step(&self, step_id: i64) -> Result<StepResult> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM calibration_step_result WHERE id = ?1",
                    STEP_COLUMNS
                ),
                params![step_id],
                StepRow::from_row,
            )
            .optional()?
            .ok_or_else(|| step_not_found(step_id))?
            .into_step()
    }

    pub fn update_step(&self, step_id: i64, patch: &StepResultPatch) -> Result<StepResult> {
        patch.validate()?;
        let mut step = self.get_step(step_id)?;
        if let Some(step_type) = patch.step_type {
            step.step_type = step_type;
        }
        if let Some(ref inputs) = patch.inputs {
            step.inputs = Some(inputs.clone());
        }
        if let Some(ref outputs) = patch.outputs {
            step.outputs = Some(outputs.clone());
        }
        if let Some(ref selected) = patch.selected_values {
            step.selected_values = Some(selected.clone());
        }
        if let Some(ref notes) = patch.notes {
            step.notes = notes.clone();
        }
        if let Some(confidence) = patch.confidence {
            step.confidence = confidence;
        }
        if let Some(recorded_at) = patch.recorded_at {
            step.recorded_at = recorded_at;
        }

        self.conn.execute(
            "UPDATE calibration_step_result
             SET step_type = ?1, inputs = ?2, outputs = ?3, selected_values = ?4,
                 notes = ?5, confidence = ?6, recorded_at = ?7
             WHERE id = ?8",
            params![
                step.step_type.as_str(),
                encode_values(step.inputs.as_ref())?,
                encode_values(step.outputs.as_ref())?,
                encode_values(step.selected_values.as_ref())?,
                step.notes,
                step.confidence.map(|c| c.as_str()),
                timestamp::format(&step.recorded_at),
                step_id,
            ],
        )?;
        info!("Updated calibration step {}", step_id);
        Ok(step)
    }

    pub fn delete_step(&self, step_id: i64) -> Result<()> {
        let count = self.conn.execute(
            "DELETE FROM calibration_step_result WHERE id = ?1",
            params![step_id],
        )?;
        if count == 0 {
            return Err(step_not_found(step_id));
        }
        info!("Deleted calibration step {}", step_id);
        Ok(())
    }

    fn steps_for(&self, session_id: i64) -> Result<Vec<StepResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM calibration_step_result WHERE session_id = ?1 ORDER BY id",
            STEP_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![session_id], StepRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StepRow::into_step).collect()
    }
}

fn session_not_found(session_id: i64) -> CalibrationError {
    CalibrationError::NotFound(format!("No calibration session with ID {} found.", session_id))
}

fn step_not_found(step_id: i64) -> CalibrationError {
    CalibrationError::NotFound(format!(
        "No calibration step result with ID {} found.",
        step_id
    ))
}

/// Async [`CalibrationBackend`] over a shared [`SqliteStore`].
#[derive(Clone)]
pub struct SqliteBackend {
    store: Arc<Mutex<SqliteStore>>,
}

impl SqliteBackend {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(SqliteStore::open(db_path)?))
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let store = store
                .lock()
                .map_err(|e| CalibrationError::Storage(format!("Store lock poisoned: {}", e)))?;
            f(&store)
        })
        .await
        .map_err(|e| CalibrationError::Storage(format!("Store task panicked: {}", e)))?
    }
}

#[async_trait]
impl CalibrationBackend for SqliteBackend {
    async fn list_sessions(&self, query: &SessionQuery) -> Result<SessionPage> {
        let query = query.clone();
        self.run(move |store| store.list_sessions(&query)).await
    }

    async fn get_session(&self, session_id: i64) -> Result<CalibrationSession> {
        self.run(move |store| store.get_session(session_id)).await
    }

    async fn create_session(&self, params: &NewSession) -> Result<CalibrationSession> {
        let params = params.clone();
        self.run(move |store| store.create_session(&params)).await
    }

    async fn update_session(
        &self,
        session_id: i64,
        patch: &SessionPatch,
    ) -> Result<CalibrationSession> {
        let patch = patch.clone();
        self.run(move |store| store.update_session(session_id, &patch))
            .await
    }

    async fn delete_session(&self, session_id: i64) -> Result<()> {
        self.run(move |store| store.delete_session(session_id)).await
    }

    async fn create_step(&self, session_id: i64, params: &NewStepResult) -> Result<StepResult> {
        let params = params.clone();
        self.run(move |store| store.create_step(session_id, &params))
            .await
    }

    async fn get_step(&self, step_id: i64) -> Result<StepResult> {
        self.run(move |store| store.get_step(step_id)).await
    }

    async fn update_step(&self, step_id: i64, patch: &StepResultPatch) -> Result<StepResult> {
        let patch = patch.clone();
        self.run(move |store| store.update_step(step_id, &patch)).await
    }

    async fn delete_step(&self, step_id: i64) -> Result<()> {
        self.run(move |store| store.delete_step(step_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionStatus, StepState, StepType};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("calibration.db")).unwrap();
        (store, dir)
    }

    fn values(v: serde_json::Value) -> FieldValues {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_and_get_session() {
        let (store, _dir) = create_test_store();

        let mut params = NewSession::new(7);
        params.printer_name = Some("Ender 3".to_string());
        params.nozzle_diameter = Some(0.4);
        params.notes = Some("First calibration run".to_string());
        let session = store.create_session(&params).unwrap();

        assert!(session.id > 0);
        assert_eq!(session.filament_id, 7);
        assert_eq!(session.status, SessionStatus::Planned);
        assert_eq!(session.printer_name.as_deref(), Some("Ender 3"));
        assert_eq!(session.nozzle_diameter, Some(0.4));
        assert!(session.steps.is_empty());

        let fetched = store.get_session(session.id).unwrap();
        assert_eq!(fetched, session);
    }

    #[test]
    fn test_get_session_not_found() {
        let (store, _dir) = create_test_store();
        let result = store.get_session(999);
        assert!(matches!(result, Err(CalibrationError::NotFound(_))));
    }

    #[test]
    fn test_list_sessions_by_filament_with_paging() {
        let (store, _dir) = create_test_store();
        let a = store.create_session(&NewSession::new(1)).unwrap();
        let b = store.create_session(&NewSession::started(1)).unwrap();
        store.create_session(&NewSession::new(2)).unwrap();

        let page = store.list_sessions(&SessionQuery::for_filament(1)).unwrap();
        assert_eq!(page.total_count, 2);
        let ids: Vec<i64> = page.items.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b.id, a.id], "newest first");

        let paged = store
            .list_sessions(&SessionQuery {
                filament_id: Some(1),
                limit: Some(1),
                offset: 1,
            })
            .unwrap();
        assert_eq!(paged.total_count, 2);
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.items[0].id, a.id);

        let all = store.list_sessions(&SessionQuery::default()).unwrap();
        assert_eq!(all.total_count, 3);
    }

    #[test]
    fn test_update_session_patch() {
        let (store, _dir) = create_test_store();
        let session = store.create_session(&NewSession::new(1)).unwrap();

        let patch = SessionPatch {
            status: Some(SessionStatus::InProgress),
            printer_name: Some(Some("Prusa MK4".to_string())),
            notes: Some(Some("first try".to_string())),
            ..SessionPatch::default()
        };
        let updated = store.update_session(session.id, &patch).unwrap();
        assert_eq!(updated.status, SessionStatus::InProgress);
        assert_eq!(updated.printer_name.as_deref(), Some("Prusa MK4"));

        let reread = store.get_session(session.id).unwrap();
        assert_eq!(reread.status, SessionStatus::InProgress);

        let clear = SessionPatch {
            notes: Some(None),
            ..SessionPatch::default()
        };
        let cleared = store.update_session(session.id, &clear).unwrap();
        assert!(cleared.notes.is_none());
        assert_eq!(cleared.printer_name.as_deref(), Some("Prusa MK4"));

        let missing = store.update_session(999, &SessionPatch::complete());
        assert!(matches!(missing, Err(CalibrationError::NotFound(_))));
    }

    #[test]
    fn test_step_round_trip() {
        let (store, _dir) = create_test_store();
        let session = store.create_session(&NewSession::new(1)).unwrap();

        let body = NewStepResult {
            inputs: Some(values(json!({"start_temp": 195, "end_temp": 235, "temp_step": 5}))),
            outputs: Some(values(json!({"temperature": 215}))),
            selected_values: Some(values(json!({"temperature": 215}))),
            ..NewStepResult::new(StepType::Temperature)
        }
        .with_notes(Some("Tower looked good at 215".to_string()))
        .with_confidence(Some(Confidence::High));

        let step = store.create_step(session.id, &body).unwrap();
        assert_eq!(step.session_id, session.id);
        assert_eq!(step.step_type, StepType::Temperature);
        assert_eq!(step.inputs, body.inputs);
        assert_eq!(step.selected_values, body.selected_values);
        assert_eq!(step.notes.as_deref(), Some("Tower looked good at 215"));
        assert_eq!(step.state(), StepState::Done);

        let session = store.get_session(session.id).unwrap();
        assert_eq!(session.steps.len(), 1);
        assert_eq!(session.steps[0], step);
    }

    #[test]
    fn test_skipped_step_round_trip() {
        let (store, _dir) = create_test_store();
        let session = store.create_session(&NewSession::new(1)).unwrap();
        let step = store
            .create_step(session.id, &NewStepResult::skipped(StepType::InputShaping))
            .unwrap();
        assert!(step.is_skipped());
        assert!(step.inputs.is_none());
        assert!(step.selected_values.is_none());
        assert_eq!(step.state(), StepState::Skipped);
    }

    #[test]
    fn test_create_step_for_missing_session() {
        let (store, _dir) = create_test_store();
        let result = store.create_step(999, &NewStepResult::new(StepType::Temperature));
        assert!(matches!(result, Err(CalibrationError::NotFound(_))));
    }

    #[test]
    fn test_update_and_delete_step() {
        let (store, _dir) = create_test_store();
        let session = store.create_session(&NewSession::new(1)).unwrap();
        let step = store
            .create_step(session.id, &NewStepResult::new(StepType::FlowRate))
            .unwrap();
        assert_eq!(step.state(), StepState::Incomplete);

        let patch = StepResultPatch {
            selected_values: Some(values(json!({"flow_ratio": 0.98}))),
            confidence: Some(Some(Confidence::Low)),
            ..StepResultPatch::default()
        };
        let updated = store.update_step(step.id, &patch).unwrap();
        assert_eq!(updated.state(), StepState::Done);
        assert_eq!(updated.confidence, Some(Confidence::Low));
        assert_eq!(store.get_step(step.id).unwrap(), updated);

        let clear = StepResultPatch {
            confidence: Some(None),
            ..StepResultPatch::default()
        };
        let cleared = store.update_step(step.id, &clear).unwrap();
        assert!(cleared.confidence.is_none());
        assert_eq!(cleared.selected_values, updated.selected_values);

        store.delete_step(step.id).unwrap();
        assert!(matches!(
            store.get_step(step.id),
            Err(CalibrationError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_step(step.id),
            Err(CalibrationError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_session_cascades_to_steps() {
        let (store, _dir) = create_test_store();
        let session = store.create_session(&NewSession::new(1)).unwrap();
        let step = store
            .create_step(session.id, &NewStepResult::new(StepType::Vfa))
            .unwrap();

        store.delete_session(session.id).unwrap();
        assert!(matches!(
            store.get_session(session.id),
            Err(CalibrationError::NotFound(_))
        ));
        assert!(matches!(
            store.get_step(step.id),
            Err(CalibrationError::NotFound(_))
        ));
    }

    #[test]
    fn test_validation_rejected_before_insert() {
        let (store, _dir) = create_test_store();
        let mut params = NewSession::new(1);
        params.nozzle_diameter = Some(-0.4);
        assert!(matches!(
            store.create_session(&params),
            Err(CalibrationError::Validation(_))
        ));
        assert_eq!(
            store.list_sessions(&SessionQuery::default()).unwrap().total_count,
            0
        );
    }

    #[tokio::test]
    async fn test_backend_runs_store_off_thread() {
        let backend = SqliteBackend::new(SqliteStore::open_in_memory().unwrap());
        let session = backend.create_session(&NewSession::started(4)).await.unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert!(session.started_at.is_some());

        backend
            .create_step(session.id, &NewStepResult::skipped(StepType::Cornering))
            .await
            .unwrap();
        let page = backend
            .list_sessions(&SessionQuery::for_filament(4))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].steps.len(), 1);
    }
}

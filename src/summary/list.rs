use std::sync::Arc;

use tracing::{debug, info};

use super::recommended::{recommended_settings, RecommendedStep};
use super::sessions::SessionSummary;
use crate::backend::CalibrationBackend;
use crate::confirm::{ConfirmGuard, ConfirmTarget, Confirmation};
use crate::error::{CalibrationError, Result};
use crate::registry::StepRegistry;
use crate::session::{
    CalibrationSession, NewSession, NewStepResult, SessionPatch, SessionQuery, SessionStatus,
    StepResult, StepResultPatch, StepType,
};
use crate::wizard::{ActiveStep, StepForm, Wizard};

/// Sessions of one filament, with the actions of the session list view.
pub struct SessionList {
    backend: Arc<dyn CalibrationBackend>,
    registry: Arc<StepRegistry>,
    filament_id: i64,
    sessions: Vec<CalibrationSession>,
    total_count: u64,
    confirm: ConfirmGuard,
}

impl SessionList {
    pub async fn load(
        backend: Arc<dyn CalibrationBackend>,
        registry: Arc<StepRegistry>,
        filament_id: i64,
        confirm: ConfirmGuard,
    ) -> Result<Self> {
        let mut list = Self {
            backend,
            registry,
            filament_id,
            sessions: Vec::new(),
            total_count: 0,
            confirm,
        };
        list.refresh().await?;
        Ok(list)
    }

    /// Reload every session of the filament.
    pub async fn refresh(&mut self) -> Result<()> {
        let page = self
            .backend
            .list_sessions(&SessionQuery::for_filament(self.filament_id))
            .await?;
        debug!(
            "Loaded {} sessions for filament {}",
            page.items.len(),
            self.filament_id
        );
        self.sessions = page.items;
        self.total_count = page.total_count;
        Ok(())
    }

    pub fn filament_id(&self) -> i64 {
        self.filament_id
    }

    /// Newest first.
    pub fn sessions(&self) -> &[CalibrationSession] {
        &self.sessions
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.iter().map(SessionSummary::from_session).collect()
    }

    pub fn recommended(&self) -> Vec<RecommendedStep> {
        recommended_settings(&self.registry, &self.sessions)
    }

    /// The newest session that is neither complete nor archived.
    pub fn resumable(&self) -> Option<&CalibrationSession> {
        self.sessions.iter().find(|s| {
            matches!(s.status, SessionStatus::Planned | SessionStatus::InProgress)
        })
    }

    fn session(&self, session_id: i64) -> Result<&CalibrationSession> {
        self.sessions
            .iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| {
                CalibrationError::NotFound(format!(
                    "Session {} is not in the list for filament {}",
                    session_id, self.filament_id
                ))
            })
    }

    fn step(&self, step_id: i64) -> Result<&StepResult> {
        self.sessions
            .iter()
            .flat_map(|s| s.steps.iter())
            .find(|s| s.id == step_id)
            .ok_or_else(|| {
                CalibrationError::NotFound(format!("Step {} is not in the list", step_id))
            })
    }

    // --- wizard ---------------------------------------------------------------

    /// Start a new in-progress session and open the wizard on it.
    pub async fn start_wizard(&mut self) -> Result<Wizard> {
        let wizard =
            Wizard::start(self.backend.clone(), self.registry.clone(), self.filament_id).await?;
        self.refresh().await?;
        Ok(wizard)
    }

    pub async fn resume_wizard(&self, session_id: i64) -> Result<Wizard> {
        self.session(session_id)?;
        Wizard::resume(self.backend.clone(), self.registry.clone(), session_id).await
    }

    // --- session CRUD -----------------------------------------------------------

    /// Create a session from the session form. The filament is always the
    /// list's own.
    pub async fn create_session(&mut self, mut params: NewSession) -> Result<CalibrationSession> {
        params.filament_id = self.filament_id;
        let session = self.backend.create_session(&params).await?;
        self.refresh().await?;
        Ok(session)
    }

    pub async fn update_session(
        &mut self,
        session_id: i64,
        patch: &SessionPatch,
    ) -> Result<CalibrationSession> {
        self.session(session_id)?;
        let session = self.backend.update_session(session_id, patch).await?;
        self.refresh().await?;
        Ok(session)
    }

    /// Delete a session and its steps. The first call only arms the delete.
    pub async fn delete_session(&mut self, session_id: i64) -> Result<Confirmation> {
        self.session(session_id)?;
        let confirmation = self.confirm.confirm(ConfirmTarget::Session(session_id));
        if confirmation == Confirmation::Confirmed {
            self.backend.delete_session(session_id).await?;
            info!("Session {} deleted from the list", session_id);
            self.refresh().await?;
        }
        Ok(confirmation)
    }

    // --- step CRUD --------------------------------------------------------------

    /// Blank editor for adding a step result to a session.
    pub fn new_step_editor(&self, step_type: StepType) -> ActiveStep {
        ActiveStep::new(self.registry.clone(), step_type)
    }

    /// Editor seeded from a recorded step result.
    pub fn step_editor(&self, step_id: i64) -> Result<ActiveStep> {
        let step = self.step(step_id)?;
        Ok(ActiveStep::with_form(
            self.registry.clone(),
            step.step_type,
            StepForm::from_step(step),
        ))
    }

    pub async fn add_step(&mut self, session_id: i64, editor: &ActiveStep) -> Result<StepResult> {
        self.session(session_id)?;
        let form = editor.form();
        let body = NewStepResult::completed(
            editor.step_type(),
            form.inputs.clone(),
            form.result.clone(),
        )
        .with_notes(form.notes.clone())
        .with_confidence(form.confidence);
        let step = self.backend.create_step(session_id, &body).await?;
        self.refresh().await?;
        Ok(step)
    }

    /// Save an edited step. The result is written as both outputs and
    /// selected values, as when it was first recorded.
    pub async fn update_step(&mut self, step_id: i64, editor: &ActiveStep) -> Result<StepResult> {
        self.step(step_id)?;
        let form = editor.form();
        let patch = StepResultPatch {
            step_type: Some(editor.step_type()),
            inputs: Some(form.inputs.clone()),
            outputs: Some(form.result.clone()),
            selected_values: Some(form.result.clone()),
            notes: Some(form.notes.clone().filter(|n| !n.trim().is_empty())),
            confidence: Some(form.confidence),
            recorded_at: None,
        };
        let step = self.backend.update_step(step_id, &patch).await?;
        self.refresh().await?;
        Ok(step)
    }

    /// Delete one step result. The first call only arms the delete.
    pub async fn delete_step(&mut self, step_id: i64) -> Result<Confirmation> {
        self.step(step_id)?;
        let confirmation = self.confirm.confirm(ConfirmTarget::Step(step_id));
        if confirmation == Confirmation::Confirmed {
            self.backend.delete_step(step_id).await?;
            info!("Step {} deleted from the list", step_id);
            self.refresh().await?;
        }
        Ok(confirmation)
    }

    pub fn armed(&self) -> Option<ConfirmTarget> {
        self.confirm.armed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SqliteBackend, SqliteStore};
    use crate::session::Confidence;
    use serde_json::json;
    use std::time::Duration;

    async fn list_for(filament_id: i64) -> SessionList {
        let backend: Arc<dyn CalibrationBackend> =
            Arc::new(SqliteBackend::new(SqliteStore::open_in_memory().unwrap()));
        SessionList::load(
            backend,
            Arc::new(StepRegistry::builtin()),
            filament_id,
            ConfirmGuard::new(Duration::from_secs(60)),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_wizard_adds_session() {
        let mut list = list_for(3).await;
        assert!(list.sessions().is_empty());

        let wizard = list.start_wizard().await.unwrap();
        assert_eq!(list.total_count(), 1);
        assert_eq!(list.resumable().map(|s| s.id), Some(wizard.session().id));
    }

    #[tokio::test]
    async fn test_delete_session_requires_confirmation() {
        let mut list = list_for(3).await;
        let session = list.create_session(NewSession::new(999)).await.unwrap();
        assert_eq!(session.filament_id, 3);

        assert_eq!(
            list.delete_session(session.id).await.unwrap(),
            Confirmation::Armed
        );
        assert_eq!(list.sessions().len(), 1);
        assert_eq!(list.armed(), Some(ConfirmTarget::Session(session.id)));

        assert_eq!(
            list.delete_session(session.id).await.unwrap(),
            Confirmation::Confirmed
        );
        assert!(list.sessions().is_empty());
        assert!(matches!(
            list.delete_session(session.id).await,
            Err(CalibrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_edit_delete_step() {
        let mut list = list_for(3).await;
        let session = list.create_session(NewSession::new(3)).await.unwrap();

        let mut editor = list.new_step_editor(StepType::Retraction);
        editor.set_input("start_retract", json!(0.2)).unwrap();
        editor.set_input("factor", json!(0.1)).unwrap();
        editor.set_input("measured_height", json!(4.0)).unwrap();
        editor.set_output("retraction_speed", json!(40)).unwrap();
        let step = list.add_step(session.id, &editor).await.unwrap();
        assert_eq!(
            step.selected_values.as_ref().unwrap()["retraction_length"],
            json!(0.6)
        );

        let recommended = list.recommended();
        assert_eq!(recommended.len(), 1);
        assert_eq!(recommended[0].values[0].display, "0.6 mm");
        assert_eq!(recommended[0].values[1].display, "40 mm/s");

        let mut editor = list.step_editor(step.id).unwrap();
        assert_eq!(editor.form().inputs["factor"], json!(0.1));
        editor.set_output("retraction_speed", json!(35)).unwrap();
        let updated = list.update_step(step.id, &editor).await.unwrap();
        assert_eq!(
            updated.selected_values.as_ref().unwrap()["retraction_speed"],
            json!(35)
        );
        assert_eq!(list.recommended()[0].values[1].display, "35 mm/s");

        assert_eq!(list.delete_step(step.id).await.unwrap(), Confirmation::Armed);
        assert_eq!(
            list.delete_step(step.id).await.unwrap(),
            Confirmation::Confirmed
        );
        assert!(list.recommended().is_empty());
        assert_eq!(list.summaries()[0].pending, 9);
    }

    #[tokio::test]
    async fn test_edit_clears_notes_and_confidence() {
        let mut list = list_for(3).await;
        let session = list.create_session(NewSession::new(3)).await.unwrap();

        let mut editor = list.new_step_editor(StepType::Cornering);
        editor.set_output("cornering_value", json!(8.0)).unwrap();
        editor.set_notes(Some("old note".to_string()));
        editor.set_confidence(Some(Confidence::High));
        let step = list.add_step(session.id, &editor).await.unwrap();
        assert_eq!(step.notes.as_deref(), Some("old note"));

        let mut editor = list.step_editor(step.id).unwrap();
        editor.set_notes(None);
        editor.set_confidence(None);
        let updated = list.update_step(step.id, &editor).await.unwrap();
        assert!(updated.notes.is_none());
        assert!(updated.confidence.is_none());
        assert_eq!(
            updated.selected_values.as_ref().unwrap()["cornering_value"],
            json!(8.0)
        );
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::active_step::{ActiveStep, StepForm, StepView};
use crate::backend::CalibrationBackend;
use crate::error::{CalibrationError, Result};
use crate::registry::{StepRegistry, WIZARD_STEPS};
use crate::session::{
    CalibrationSession, NewSession, NewStepResult, SessionPatch, SessionStatus, StepResult,
    StepState, StepType,
};

/// What a wizard action led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WizardOutcome {
    /// The wizard now shows the step at `index`.
    Moved { index: usize, step_type: StepType },
    /// Skipping the last step finishes the session; call `confirm_finish`.
    NeedsConfirmation,
    /// The session was marked complete.
    Completed { session: CalibrationSession },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SidebarState {
    Current,
    Done,
    Skipped,
    Incomplete,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebarEntry {
    pub index: usize,
    pub step_type: StepType,
    pub title: String,
    pub state: SidebarState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WizardControls {
    pub can_go_back: bool,
    pub is_last_step: bool,
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardView {
    pub session_id: i64,
    pub index: usize,
    pub step_count: usize,
    pub step: StepView,
    pub sidebar: Vec<SidebarEntry>,
    pub controls: WizardControls,
}

/// Step navigation and persistence for one open calibration session.
pub struct Wizard {
    backend: Arc<dyn CalibrationBackend>,
    registry: Arc<StepRegistry>,
    session: CalibrationSession,
    index: usize,
    done: HashSet<StepType>,
    cache: HashMap<StepType, StepForm>,
    active: ActiveStep,
    finish_requested: bool,
    finished: bool,
}

impl Wizard {
    /// Open the wizard on an existing session, positioned at the first step
    /// without a persisted result (or the first step when all have one).
    pub fn open(
        backend: Arc<dyn CalibrationBackend>,
        registry: Arc<StepRegistry>,
        session: CalibrationSession,
    ) -> Self {
        let done: HashSet<StepType> = session.steps.iter().map(|s| s.step_type).collect();
        let cache: HashMap<StepType, StepForm> = WIZARD_STEPS
            .iter()
            .filter_map(|&t| session.latest_step(t).map(|s| (t, StepForm::from_step(s))))
            .collect();
        let index = WIZARD_STEPS
            .iter()
            .position(|t| !done.contains(t))
            .unwrap_or(0);
        let step_type = WIZARD_STEPS[index];
        let form = cache.get(&step_type).cloned().unwrap_or_default();
        let active = ActiveStep::with_form(registry.clone(), step_type, form);

        info!(
            "Opened wizard for session {} at step {} ({} of {} done)",
            session.id,
            step_type,
            done.len(),
            WIZARD_STEPS.len()
        );

        Self {
            backend,
            registry,
            session,
            index,
            done,
            cache,
            active,
            finish_requested: false,
            finished: false,
        }
    }

    /// Create a new in-progress session for the filament and open it.
    pub async fn start(
        backend: Arc<dyn CalibrationBackend>,
        registry: Arc<StepRegistry>,
        filament_id: i64,
    ) -> Result<Self> {
        let session = backend
            .create_session(&NewSession::started(filament_id))
            .await?;
        Ok(Self::open(backend, registry, session))
    }

    /// Reload a session from the backend and open it. A session still
    /// `planned` is moved to `in_progress` first.
    pub async fn resume(
        backend: Arc<dyn CalibrationBackend>,
        registry: Arc<StepRegistry>,
        session_id: i64,
    ) -> Result<Self> {
        let mut session = backend.get_session(session_id).await?;
        if session.status == SessionStatus::Planned {
            let patch = SessionPatch {
                status: Some(SessionStatus::InProgress),
                started_at: session.started_at.or_else(|| Some(Utc::now())),
                ..SessionPatch::default()
            };
            let steps = std::mem::take(&mut session.steps);
            session = backend.update_session(session_id, &patch).await?;
            if session.steps.is_empty() {
                session.steps = steps;
            }
        }
        Ok(Self::open(backend, registry, session))
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn step_type(&self) -> StepType {
        WIZARD_STEPS[self.index]
    }

    pub fn is_done(&self, step_type: StepType) -> bool {
        self.done.contains(&step_type)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn active(&self) -> &ActiveStep {
        &self.active
    }

    /// The step being edited. Edits stay in memory until saved.
    pub fn active_mut(&mut self) -> Result<&mut ActiveStep> {
        self.ensure_open()?;
        Ok(&mut self.active)
    }

    fn is_last_step(&self) -> bool {
        self.index + 1 == WIZARD_STEPS.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(CalibrationError::InvalidTransition(format!(
                "session {} is already finished",
                self.session.id
            )));
        }
        Ok(())
    }

    /// Jump to any step. The current form is kept in memory and restored
    /// when the step is visited again.
    pub fn navigate(&mut self, index: usize) -> Result<WizardOutcome> {
        self.ensure_open()?;
        let Some(&step_type) = WIZARD_STEPS.get(index) else {
            return Err(CalibrationError::Validation(format!(
                "step index {} is out of range (0..{})",
                index,
                WIZARD_STEPS.len()
            )));
        };

        self.finish_requested = false;
        if index == self.index {
            return Ok(WizardOutcome::Moved { index, step_type });
        }

        let form = self.cache.get(&step_type).cloned().unwrap_or_default();
        let next = ActiveStep::with_form(self.registry.clone(), step_type, form);
        let left = std::mem::replace(&mut self.active, next);
        self.cache.insert(left.step_type(), left.into_form());
        self.index = index;
        debug!("Wizard for session {} moved to {}", self.session.id, step_type);
        Ok(WizardOutcome::Moved { index, step_type })
    }

    pub fn back(&mut self) -> Result<WizardOutcome> {
        self.ensure_open()?;
        if self.index == 0 {
            return Err(CalibrationError::InvalidTransition(
                "already at the first step".to_string(),
            ));
        }
        self.navigate(self.index - 1)
    }

    /// Persist the active form as a completed result and move on.
    pub async fn save_and_continue(&mut self) -> Result<WizardOutcome> {
        self.ensure_open()?;
        let step_type = self.step_type();
        let form = self.active.form().clone();
        let body = NewStepResult::completed(step_type, form.inputs.clone(), form.result.clone())
            .with_notes(form.notes.clone())
            .with_confidence(form.confidence);

        let step = self.backend.create_step(self.session.id, &body).await?;
        self.record(step);
        self.cache.insert(step_type, form);
        self.after_save().await
    }

    /// Move past the current step without persisting anything. On the last
    /// step this only asks for confirmation.
    pub fn skip(&mut self) -> Result<WizardOutcome> {
        self.ensure_open()?;
        if self.is_last_step() {
            self.finish_requested = true;
            return Ok(WizardOutcome::NeedsConfirmation);
        }
        self.navigate(self.index + 1)
    }

    /// Finish the session after a skip on the last step.
    pub async fn confirm_finish(&mut self) -> Result<WizardOutcome> {
        self.ensure_open()?;
        if !self.finish_requested {
            return Err(CalibrationError::InvalidTransition(
                "finishing was not requested".to_string(),
            ));
        }
        self.complete().await
    }

    /// Withdraw a pending finish request.
    pub fn cancel_finish(&mut self) {
        self.finish_requested = false;
    }

    /// Record the current step as not applicable and move on.
    pub async fn skip_not_applicable(&mut self) -> Result<WizardOutcome> {
        self.ensure_open()?;
        let step_type = self.step_type();
        let step = self
            .backend
            .create_step(self.session.id, &NewStepResult::skipped(step_type))
            .await?;
        self.record(step);
        self.cache.remove(&step_type);
        self.active = ActiveStep::new(self.registry.clone(), step_type);
        self.after_save().await
    }

    /// Leave the wizard without saving. The session keeps its status.
    pub fn close(self) -> CalibrationSession {
        info!(
            "Closed wizard for session {} at step {}",
            self.session.id,
            self.step_type()
        );
        self.session
    }

    fn record(&mut self, step: StepResult) {
        info!(
            "Session {}: {} saved as {:?}",
            self.session.id,
            step.step_type,
            step.state()
        );
        self.done.insert(step.step_type);
        self.session.steps.push(step);
    }

    async fn after_save(&mut self) -> Result<WizardOutcome> {
        if self.is_last_step() {
            // The step is persisted either way; a failed completion can be
            // retried with confirm_finish.
            self.finish_requested = true;
            return self.complete().await;
        }
        self.navigate(self.index + 1)
    }

    async fn complete(&mut self) -> Result<WizardOutcome> {
        let result = self
            .backend
            .update_session(self.session.id, &SessionPatch::complete())
            .await;
        match result {
            Ok(mut session) => {
                if session.steps.is_empty() {
                    session.steps = std::mem::take(&mut self.session.steps);
                }
                self.session = session;
                self.finished = true;
                self.finish_requested = false;
                info!("Calibration session {} complete", self.session.id);
                Ok(WizardOutcome::Completed {
                    session: self.session.clone(),
                })
            }
            Err(e) => {
                warn!(
                    "Failed to complete calibration session {}: {}",
                    self.session.id, e
                );
                Err(e)
            }
        }
    }

    pub fn sidebar(&self) -> Vec<SidebarEntry> {
        WIZARD_STEPS
            .iter()
            .enumerate()
            .map(|(index, &step_type)| {
                let state = if index == self.index {
                    SidebarState::Current
                } else {
                    match self.session.step_state(step_type) {
                        Some(StepState::Done) => SidebarState::Done,
                        Some(StepState::Skipped) => SidebarState::Skipped,
                        Some(StepState::Incomplete) => SidebarState::Incomplete,
                        None => SidebarState::Pending,
                    }
                };
                SidebarEntry {
                    index,
                    step_type,
                    title: self.registry.copy(step_type).title.clone(),
                    state,
                }
            })
            .collect()
    }

    pub fn controls(&self) -> WizardControls {
        WizardControls {
            can_go_back: self.index > 0 && !self.finished,
            is_last_step: self.is_last_step(),
            busy: false,
        }
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            session_id: self.session.id,
            index: self.index,
            step_count: WIZARD_STEPS.len(),
            step: self.active.view(),
            sidebar: self.sidebar(),
            controls: self.controls(),
        }
    }
}

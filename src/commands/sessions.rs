//! Tauri commands for the session list and the add/edit step drawer.

use serde::Serialize;
use tauri::State;
use tracing::info;

use super::CalibrationState;
use crate::confirm::Confirmation;
use crate::session::{
    CalibrationSession, FieldValues, NewSession, SessionPatch, StepResult, StepType,
};
use crate::summary::{RecommendedStep, SessionList, SessionSummary};
use crate::wizard::{ActiveStep, StepForm, StepView};

#[derive(Debug, Clone, Serialize)]
pub struct SessionListView {
    pub filament_id: i64,
    pub sessions: Vec<SessionSummary>,
    pub total_count: u64,
    pub recommended: Vec<RecommendedStep>,
    /// Newest session that can still be resumed.
    pub resumable_session_id: Option<i64>,
}

impl SessionListView {
    fn new(list: &SessionList) -> Self {
        Self {
            filament_id: list.filament_id(),
            sessions: list.summaries(),
            total_count: list.total_count(),
            recommended: list.recommended(),
            resumable_session_id: list.resumable().map(|s| s.id),
        }
    }
}

/// Drawer contents for adding or editing a step.
#[derive(Debug, Clone, Serialize)]
pub struct StepFormView {
    pub form: StepForm,
    pub view: StepView,
}

impl StepFormView {
    fn new(editor: &ActiveStep) -> Self {
        Self {
            form: editor.form().clone(),
            view: editor.view(),
        }
    }
}

fn editor(
    state: &CalibrationState,
    step_type: StepType,
    form: StepForm,
) -> Result<ActiveStep, String> {
    let editor = ActiveStep::with_form(state.registry.clone(), step_type, form);
    editor.validate()?;
    Ok(editor)
}

/// Load the sessions of a filament and make them the current list.
#[tauri::command]
pub async fn open_session_list(
    state: State<'_, CalibrationState>,
    filament_id: i64,
) -> Result<SessionListView, String> {
    let list = SessionList::load(
        state.backend.clone(),
        state.registry.clone(),
        filament_id,
        state.config.confirm_guard(),
    )
    .await?;
    let view = SessionListView::new(&list);
    info!(
        "Opened session list for filament {} ({} sessions)",
        filament_id, view.total_count
    );
    *state.list.lock().await = Some(list);
    Ok(view)
}

#[tauri::command]
pub async fn create_session(
    state: State<'_, CalibrationState>,
    params: NewSession,
) -> Result<CalibrationSession, String> {
    let mut guard = state.list.lock().await;
    let list = guard.as_mut().ok_or("No session list is open")?;
    Ok(list.create_session(params).await?)
}

#[tauri::command]
pub async fn update_session(
    state: State<'_, CalibrationState>,
    session_id: i64,
    patch: SessionPatch,
) -> Result<CalibrationSession, String> {
    let mut guard = state.list.lock().await;
    let list = guard.as_mut().ok_or("No session list is open")?;
    Ok(list.update_session(session_id, &patch).await?)
}

/// First call arms the delete, a second call within the window performs it.
#[tauri::command]
pub async fn delete_session(
    state: State<'_, CalibrationState>,
    session_id: i64,
) -> Result<Confirmation, String> {
    let mut guard = state.list.lock().await;
    let list = guard.as_mut().ok_or("No session list is open")?;
    Ok(list.delete_session(session_id).await?)
}

#[tauri::command]
pub async fn new_step_form(
    state: State<'_, CalibrationState>,
    step_type: StepType,
) -> Result<StepFormView, String> {
    Ok(StepFormView::new(&ActiveStep::new(
        state.registry.clone(),
        step_type,
    )))
}

#[tauri::command]
pub async fn edit_step_form(
    state: State<'_, CalibrationState>,
    step_id: i64,
) -> Result<StepFormView, String> {
    let guard = state.list.lock().await;
    let list = guard.as_ref().ok_or("No session list is open")?;
    Ok(StepFormView::new(&list.step_editor(step_id)?))
}

/// Outputs the step's formula derives from `inputs`.
#[tauri::command]
pub fn compute_step(
    state: State<'_, CalibrationState>,
    step_type: StepType,
    inputs: FieldValues,
) -> FieldValues {
    state.registry.compute(step_type, &inputs)
}

#[tauri::command]
pub async fn add_step(
    state: State<'_, CalibrationState>,
    session_id: i64,
    step_type: StepType,
    form: StepForm,
) -> Result<StepResult, String> {
    let editor = editor(&state, step_type, form)?;
    let mut guard = state.list.lock().await;
    let list = guard.as_mut().ok_or("No session list is open")?;
    Ok(list.add_step(session_id, &editor).await?)
}

#[tauri::command]
pub async fn update_step(
    state: State<'_, CalibrationState>,
    step_id: i64,
    step_type: StepType,
    form: StepForm,
) -> Result<StepResult, String> {
    let editor = editor(&state, step_type, form)?;
    let mut guard = state.list.lock().await;
    let list = guard.as_mut().ok_or("No session list is open")?;
    Ok(list.update_step(step_id, &editor).await?)
}

/// First call arms the delete, a second call within the window performs it.
#[tauri::command]
pub async fn delete_step(
    state: State<'_, CalibrationState>,
    step_id: i64,
) -> Result<Confirmation, String> {
    let mut guard = state.list.lock().await;
    let list = guard.as_mut().ok_or("No session list is open")?;
    Ok(list.delete_step(step_id).await?)
}

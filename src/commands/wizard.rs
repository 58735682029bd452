//! Tauri commands driving the open calibration wizard.
//!
//! Every mutating command goes through [`WizardHandle`], so a second click
//! while a save is still pending returns the busy error instead of saving
//! twice.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tauri::State;
use tracing::info;

use super::CalibrationState;
use crate::calculator::{FlowMethod, PaMethod};
use crate::error::Result as CalibrationResult;
use crate::session::{CalibrationSession, Confidence};
use crate::wizard::{ActiveStep, Wizard, WizardHandle, WizardOutcome, WizardView};

/// Result of a navigation or save, with the view to render next.
#[derive(Debug, Clone, Serialize)]
pub struct WizardResponse {
    pub outcome: WizardOutcome,
    pub view: WizardView,
}

/// One interaction with the flow-rate calculator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FlowAction {
    SelectMethod { method: FlowMethod },
    Start,
    SetFlowRatio { value: Option<f64> },
    SetModifier { value: Option<f64> },
    Next,
    Back,
    Cancel,
    Apply,
}

impl FlowAction {
    fn run(self, step: &mut ActiveStep) -> CalibrationResult<()> {
        if let FlowAction::Apply = self {
            step.apply_flow_calculator()?;
            return Ok(());
        }
        let calc = step.flow_calculator_mut()?;
        match self {
            FlowAction::SelectMethod { method } => calc.select_method(method),
            FlowAction::Start => calc.start()?,
            FlowAction::SetFlowRatio { value } => calc.set_flow_ratio(value)?,
            FlowAction::SetModifier { value } => calc.set_modifier(value)?,
            FlowAction::Next => calc.next()?,
            FlowAction::Back => calc.back()?,
            FlowAction::Cancel => calc.cancel(),
            FlowAction::Apply => {}
        }
        Ok(())
    }
}

async fn open(state: &CalibrationState, wizard: Wizard) -> WizardView {
    let handle = WizardHandle::new(wizard);
    let view = handle.view().await;
    *state.wizard.lock().await = Some(handle);
    view
}

async fn edit(
    state: &CalibrationState,
    f: impl FnOnce(&mut ActiveStep) -> CalibrationResult<()>,
) -> Result<WizardView, String> {
    let handle = state.wizard_handle().await?;
    handle.edit(f).await?;
    Ok(handle.view().await)
}

async fn respond(
    handle: &WizardHandle,
    outcome: CalibrationResult<WizardOutcome>,
) -> Result<WizardResponse, String> {
    let outcome = outcome?;
    Ok(WizardResponse {
        outcome,
        view: handle.view().await,
    })
}

/// Create an in-progress session for the filament and open the wizard on it.
#[tauri::command]
pub async fn start_wizard(
    state: State<'_, CalibrationState>,
    filament_id: i64,
) -> Result<WizardView, String> {
    let wizard = Wizard::start(state.backend.clone(), state.registry.clone(), filament_id).await?;
    info!("Started calibration wizard for filament {}", filament_id);
    Ok(open(&state, wizard).await)
}

#[tauri::command]
pub async fn resume_wizard(
    state: State<'_, CalibrationState>,
    session_id: i64,
) -> Result<WizardView, String> {
    let wizard = Wizard::resume(state.backend.clone(), state.registry.clone(), session_id).await?;
    Ok(open(&state, wizard).await)
}

#[tauri::command]
pub async fn wizard_view(state: State<'_, CalibrationState>) -> Result<WizardView, String> {
    Ok(state.wizard_handle().await?.view().await)
}

#[tauri::command]
pub async fn wizard_set_input(
    state: State<'_, CalibrationState>,
    key: String,
    value: Value,
) -> Result<WizardView, String> {
    edit(&state, |step| step.set_input(&key, value).map(|_| ())).await
}

#[tauri::command]
pub async fn wizard_set_output(
    state: State<'_, CalibrationState>,
    key: String,
    value: Value,
) -> Result<WizardView, String> {
    edit(&state, |step| step.set_output(&key, value)).await
}

#[tauri::command]
pub async fn wizard_set_notes(
    state: State<'_, CalibrationState>,
    notes: Option<String>,
    confidence: Option<Confidence>,
) -> Result<WizardView, String> {
    edit(&state, |step| {
        step.set_notes(notes);
        step.set_confidence(confidence);
        Ok(())
    })
    .await
}

#[tauri::command]
pub async fn wizard_set_pa_method(
    state: State<'_, CalibrationState>,
    method: PaMethod,
) -> Result<WizardView, String> {
    edit(&state, |step| step.set_pa_method(method).map(|_| ())).await
}

#[tauri::command]
pub async fn wizard_flow_calculator(
    state: State<'_, CalibrationState>,
    action: FlowAction,
) -> Result<WizardView, String> {
    edit(&state, |step| action.run(step)).await
}

#[tauri::command]
pub async fn wizard_add_artifact_speed(
    state: State<'_, CalibrationState>,
    speed: u32,
) -> Result<WizardView, String> {
    edit(&state, |step| step.add_artifact_speed(speed)).await
}

#[tauri::command]
pub async fn wizard_remove_artifact_speed(
    state: State<'_, CalibrationState>,
    index: usize,
) -> Result<WizardView, String> {
    edit(&state, |step| step.remove_artifact_speed(index).map(|_| ())).await
}

#[tauri::command]
pub async fn wizard_navigate(
    state: State<'_, CalibrationState>,
    index: usize,
) -> Result<WizardResponse, String> {
    let handle = state.wizard_handle().await?;
    respond(&handle, handle.navigate(index).await).await
}

#[tauri::command]
pub async fn wizard_back(state: State<'_, CalibrationState>) -> Result<WizardResponse, String> {
    let handle = state.wizard_handle().await?;
    respond(&handle, handle.back().await).await
}

#[tauri::command]
pub async fn wizard_skip(state: State<'_, CalibrationState>) -> Result<WizardResponse, String> {
    let handle = state.wizard_handle().await?;
    respond(&handle, handle.skip().await).await
}

#[tauri::command]
pub async fn wizard_skip_not_applicable(
    state: State<'_, CalibrationState>,
) -> Result<WizardResponse, String> {
    let handle = state.wizard_handle().await?;
    respond(&handle, handle.skip_not_applicable().await).await
}

#[tauri::command]
pub async fn wizard_save_and_continue(
    state: State<'_, CalibrationState>,
) -> Result<WizardResponse, String> {
    let handle = state.wizard_handle().await?;
    respond(&handle, handle.save_and_continue().await).await
}

#[tauri::command]
pub async fn wizard_confirm_finish(
    state: State<'_, CalibrationState>,
) -> Result<WizardResponse, String> {
    let handle = state.wizard_handle().await?;
    respond(&handle, handle.confirm_finish().await).await
}

#[tauri::command]
pub async fn wizard_cancel_finish(
    state: State<'_, CalibrationState>,
) -> Result<WizardView, String> {
    let handle = state.wizard_handle().await?;
    handle.cancel_finish().await?;
    Ok(handle.view().await)
}

/// Close the wizard without saving the open step. Returns the session as
/// last seen by the wizard.
#[tauri::command]
pub async fn close_wizard(
    state: State<'_, CalibrationState>,
) -> Result<Option<CalibrationSession>, String> {
    let Some(handle) = state.wizard.lock().await.take() else {
        return Ok(None);
    };
    let session = handle.session().await;
    info!("Closed calibration wizard for session {}", session.id);
    Ok(Some(session))
}

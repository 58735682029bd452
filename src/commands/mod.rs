//! Tauri commands exposing the session list and the wizard to the webview.
//!
//! All commands return `Result<T, String>`; errors are rendered with
//! [`CalibrationError`](crate::error::CalibrationError)'s `Display`.

pub mod sessions;
pub mod wizard;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::CalibrationBackend;
use crate::config::CalibrationConfig;
use crate::registry::StepRegistry;
use crate::summary::SessionList;
use crate::wizard::WizardHandle;

/// Shared state managed by Tauri.
pub struct CalibrationState {
    pub(crate) backend: Arc<dyn CalibrationBackend>,
    pub(crate) registry: Arc<StepRegistry>,
    pub(crate) config: CalibrationConfig,
    /// Session list of the filament currently shown.
    pub(crate) list: Mutex<Option<SessionList>>,
    /// The open wizard, if any.
    pub(crate) wizard: Mutex<Option<WizardHandle>>,
}

impl CalibrationState {
    pub fn new(
        config: CalibrationConfig,
        backend: Arc<dyn CalibrationBackend>,
        registry: StepRegistry,
    ) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
            config,
            list: Mutex::new(None),
            wizard: Mutex::new(None),
        }
    }

    /// Build state from the user's config file and environment.
    pub fn from_config(config: CalibrationConfig) -> anyhow::Result<Self> {
        let backend = config.connect()?;
        let registry = config.registry()?;
        Ok(Self::new(config, backend, registry))
    }

    pub(crate) async fn wizard_handle(&self) -> Result<WizardHandle, String> {
        self.wizard
            .lock()
            .await
            .clone()
            .ok_or_else(|| "No calibration wizard is open".to_string())
    }
}

/// Tauri builder with the calibration state and commands registered.
/// The embedding application supplies its context and calls `run`.
pub fn builder(state: CalibrationState) -> tauri::Builder<tauri::Wry> {
    crate::init_tracing();
    tauri::Builder::default()
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            sessions::open_session_list,
            sessions::create_session,
            sessions::update_session,
            sessions::delete_session,
            sessions::new_step_form,
            sessions::edit_step_form,
            sessions::compute_step,
            sessions::add_step,
            sessions::update_step,
            sessions::delete_step,
            wizard::start_wizard,
            wizard::resume_wizard,
            wizard::wizard_view,
            wizard::wizard_set_input,
            wizard::wizard_set_output,
            wizard::wizard_set_notes,
            wizard::wizard_set_pa_method,
            wizard::wizard_flow_calculator,
            wizard::wizard_add_artifact_speed,
            wizard::wizard_remove_artifact_speed,
            wizard::wizard_navigate,
            wizard::wizard_back,
            wizard::wizard_skip,
            wizard::wizard_skip_not_applicable,
            wizard::wizard_save_and_continue,
            wizard::wizard_confirm_finish,
            wizard::wizard_cancel_finish,
            wizard::close_wizard,
        ])
}

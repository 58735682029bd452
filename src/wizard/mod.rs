//! The calibration wizard: step navigation, per-step editing and
//! persistence of results for one session.
//!
//! ```ignore
//! let wizard = Wizard::start(backend, registry, filament_id).await?;
//! let handle = WizardHandle::new(wizard);
//! handle.edit(|step| step.set_input("start_temp", json!(190))).await?;
//! handle.save_and_continue().await?;
//! ```

pub mod active_step;
mod handle;
mod orchestrator;

pub use active_step::{ActiveStep, FieldView, StepForm, StepView, ToolView};
pub use handle::WizardHandle;
pub use orchestrator::{
    SidebarEntry, SidebarState, Wizard, WizardControls, WizardOutcome, WizardView,
};

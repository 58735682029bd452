use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::debug;

use super::active_step::ActiveStep;
use super::orchestrator::{SidebarEntry, Wizard, WizardControls, WizardOutcome, WizardView};
use crate::error::{CalibrationError, Result};
use crate::session::CalibrationSession;

/// Clears the in-flight flag when a mutating call returns or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared, cloneable access to an open [`Wizard`].
///
/// Only one mutating call may run at a time; a second one made while the
/// first is still awaiting the backend fails with [`CalibrationError::Busy`]
/// instead of queueing.
#[derive(Clone)]
pub struct WizardHandle {
    wizard: Arc<Mutex<Wizard>>,
    busy: Arc<AtomicBool>,
    /// Controls as of the last completed call, reported while busy.
    controls: Arc<StdMutex<WizardControls>>,
}

impl WizardHandle {
    pub fn new(wizard: Wizard) -> Self {
        let controls = wizard.controls();
        Self {
            wizard: Arc::new(Mutex::new(wizard)),
            busy: Arc::new(AtomicBool::new(false)),
            controls: Arc::new(StdMutex::new(controls)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn begin(&self) -> Result<InFlight<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!("Rejected wizard action: request in flight");
                CalibrationError::Busy
            })?;
        Ok(InFlight(&self.busy))
    }

    fn remember(&self, wizard: &Wizard) {
        if let Ok(mut controls) = self.controls.lock() {
            *controls = wizard.controls();
        }
    }

    /// Apply a synchronous edit to the wizard.
    pub async fn update<T>(&self, f: impl FnOnce(&mut Wizard) -> Result<T>) -> Result<T> {
        let _in_flight = self.begin()?;
        let mut wizard = self.wizard.lock().await;
        let result = f(&mut wizard);
        self.remember(&wizard);
        result
    }

    /// Apply an edit to the active step's form or helpers.
    pub async fn edit<T>(&self, f: impl FnOnce(&mut ActiveStep) -> Result<T>) -> Result<T> {
        self.update(|wizard| f(wizard.active_mut()?)).await
    }

    pub async fn navigate(&self, index: usize) -> Result<WizardOutcome> {
        self.update(|wizard| wizard.navigate(index)).await
    }

    pub async fn back(&self) -> Result<WizardOutcome> {
        self.update(Wizard::back).await
    }

    pub async fn skip(&self) -> Result<WizardOutcome> {
        self.update(Wizard::skip).await
    }

    pub async fn cancel_finish(&self) -> Result<()> {
        self.update(|wizard| {
            wizard.cancel_finish();
            Ok(())
        })
        .await
    }

    pub async fn save_and_continue(&self) -> Result<WizardOutcome> {
        let _in_flight = self.begin()?;
        let mut wizard = self.wizard.lock().await;
        let result = wizard.save_and_continue().await;
        self.remember(&wizard);
        result
    }

    pub async fn skip_not_applicable(&self) -> Result<WizardOutcome> {
        let _in_flight = self.begin()?;
        let mut wizard = self.wizard.lock().await;
        let result = wizard.skip_not_applicable().await;
        self.remember(&wizard);
        result
    }

    pub async fn confirm_finish(&self) -> Result<WizardOutcome> {
        let _in_flight = self.begin()?;
        let mut wizard = self.wizard.lock().await;
        let result = wizard.confirm_finish().await;
        self.remember(&wizard);
        result
    }

    /// Current session as the wizard sees it.
    pub async fn session(&self) -> CalibrationSession {
        self.wizard.lock().await.session().clone()
    }

    pub async fn view(&self) -> WizardView {
        let mut view = self.wizard.lock().await.view();
        view.controls.busy = self.is_busy();
        view
    }

    pub async fn sidebar(&self) -> Vec<SidebarEntry> {
        self.wizard.lock().await.sidebar()
    }

    /// Never waits on an in-flight request.
    pub fn controls(&self) -> WizardControls {
        let mut controls = self
            .controls
            .lock()
            .map(|c| *c)
            .unwrap_or_default();
        controls.busy = self.is_busy();
        controls
    }
}

//! Guided filament calibration: per-step formulas, the wizard that walks a
//! session through the calibration tests, and persistence of the results to
//! a Spoolman server or a local SQLite database.

pub mod backend;
pub mod calculator;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod confirm;
pub mod error;
pub mod registry;
pub mod session;
pub mod summary;
pub mod wizard;

pub use backend::{CalibrationBackend, SpoolmanClient, SqliteBackend, SqliteStore};
pub use config::CalibrationConfig;
pub use error::{CalibrationError, Result};
pub use registry::{StepRegistry, WIZARD_STEPS};
pub use session::{CalibrationSession, StepResult, StepState, StepType};
pub use summary::SessionList;
pub use wizard::{Wizard, WizardHandle};

/// Install the `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
/// Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

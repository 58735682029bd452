//! Runtime configuration, read from
//! `<config_dir>/filament-calibration/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Two environment variables override the backend location:
//! - `FILAMENT_CALIBRATION_SPOOLMAN_URL` selects the Spoolman backend at that URL
//! - `FILAMENT_CALIBRATION_DB` selects the SQLite backend at that path

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{CalibrationBackend, SpoolmanClient, SqliteBackend};
use crate::confirm::ConfirmGuard;
use crate::registry::StepRegistry;

pub const APP_DIR: &str = "filament-calibration";
pub const ENV_SPOOLMAN_URL: &str = "FILAMENT_CALIBRATION_SPOOLMAN_URL";
pub const ENV_DB: &str = "FILAMENT_CALIBRATION_DB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Spoolman,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub spoolman_url: String,
    pub request_timeout_secs: u64,
    /// Defaults to `<data_dir>/filament-calibration/calibration.db`.
    pub database_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Spoolman,
            spoolman_url: "http://localhost:7912".to_string(),
            request_timeout_secs: 10,
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// How long a first delete request stays armed.
    pub confirm_window_ms: u64,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            confirm_window_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub fields_path: Option<PathBuf>,
    pub copy_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub backend: BackendConfig,
    pub wizard: WizardConfig,
    pub registry: RegistryConfig,
}

impl CalibrationConfig {
    /// `<config_dir>/filament-calibration/config.toml`, if the platform has a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: CalibrationConfig =
            toml::from_str(content).context("Invalid calibration config")?;
        Ok(config)
    }

    /// Read the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        info!("Loaded calibration config from {:?}", path);
        Ok(config)
    }

    /// Load from the default location, then apply environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup. The database override wins
    /// when both are set.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_SPOOLMAN_URL).filter(|v| !v.trim().is_empty()) {
            info!("Using Spoolman at {} from {}", url, ENV_SPOOLMAN_URL);
            self.backend.kind = BackendKind::Spoolman;
            self.backend.spoolman_url = url;
        }
        if let Some(path) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            info!("Using SQLite database {} from {}", path, ENV_DB);
            self.backend.kind = BackendKind::Sqlite;
            self.backend.database_path = Some(PathBuf::from(path));
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs.max(1))
    }

    pub fn confirm_window(&self) -> Duration {
        Duration::from_millis(self.wizard.confirm_window_ms)
    }

    pub fn confirm_guard(&self) -> ConfirmGuard {
        ConfirmGuard::new(self.confirm_window())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match self.backend.database_path {
            Some(ref path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR).join("calibration.db"))
                .context("No data directory available for the calibration database"),
        }
    }

    /// Step tables, with any configured replacements applied.
    pub fn registry(&self) -> Result<StepRegistry> {
        StepRegistry::load(
            self.registry.fields_path.as_deref(),
            self.registry.copy_path.as_deref(),
        )
    }

    /// Build the configured backend.
    pub fn connect(&self) -> Result<Arc<dyn CalibrationBackend>> {
        match self.backend.kind {
            BackendKind::Spoolman => {
                let client =
                    SpoolmanClient::with_timeout(&self.backend.spoolman_url, self.request_timeout())?;
                info!("Calibration backend: Spoolman at {}", client.api_base());
                Ok(Arc::new(client))
            }
            BackendKind::Sqlite => {
                let path = self.database_path()?;
                let backend = SqliteBackend::open(&path)?;
                info!("Calibration backend: SQLite at {:?}", path);
                Ok(Arc::new(backend))
            }
        }
    }
}

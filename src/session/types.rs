use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CalibrationError;

/// Field key -> value mapping used for step inputs, outputs and selected values.
pub type FieldValues = serde_json::Map<String, Value>;

/// Key of the sentinel the backend stores in `outputs` for a deliberate skip.
pub const SKIPPED_KEY: &str = "_skipped";

/// Calibration step types, as named by the OrcaSlicer calibration guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Temperature,
    VolumetricSpeed,
    PressureAdvance,
    FlowRate,
    Retraction,
    Tolerance,
    Cornering,
    InputShaping,
    Vfa,
}

impl StepType {
    pub const ALL: [StepType; 9] = [
        StepType::Temperature,
        StepType::VolumetricSpeed,
        StepType::PressureAdvance,
        StepType::FlowRate,
        StepType::Retraction,
        StepType::Tolerance,
        StepType::Cornering,
        StepType::InputShaping,
        StepType::Vfa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Temperature => "temperature",
            StepType::VolumetricSpeed => "volumetric_speed",
            StepType::PressureAdvance => "pressure_advance",
            StepType::FlowRate => "flow_rate",
            StepType::Retraction => "retraction",
            StepType::Tolerance => "tolerance",
            StepType::Cornering => "cornering",
            StepType::InputShaping => "input_shaping",
            StepType::Vfa => "vfa",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CalibrationError::Validation(format!("Unknown step type '{}'", s)))
    }
}

/// Lifecycle status of a calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Planned,
    InProgress,
    Complete,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Complete => "complete",
            SessionStatus::Archived => "archived",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(SessionStatus::Planned),
            "in_progress" => Ok(SessionStatus::InProgress),
            "complete" => Ok(SessionStatus::Complete),
            "archived" => Ok(SessionStatus::Archived),
            other => Err(CalibrationError::Validation(format!(
                "Unknown session status '{}'",
                other
            ))),
        }
    }
}

/// Subjective confidence the user has in a step result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl FromStr for Confidence {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(CalibrationError::Validation(format!(
                "Unknown confidence '{}'",
                other
            ))),
        }
    }
}

/// How a persisted step result reads in the sidebar and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Deliberately marked not applicable.
    Skipped,
    /// Has confirmed selected values.
    Done,
    /// Persisted without selected values.
    Incomplete,
}

/// One recorded calibration step within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: i64,
    pub session_id: i64,
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_values: Option<FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(with = "super::timestamp")]
    pub recorded_at: DateTime<Utc>,
}

impl StepResult {
    /// True when `outputs` carries the skip sentinel.
    pub fn is_skipped(&self) -> bool {
        self.outputs
            .as_ref()
            .and_then(|o| o.get(SKIPPED_KEY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_selected_values(&self) -> bool {
        self.selected_values
            .as_ref()
            .map_or(false, |values| !values.is_empty())
    }

    pub fn state(&self) -> StepState {
        if self.is_skipped() {
            StepState::Skipped
        } else if self.has_selected_values() {
            StepState::Done
        } else {
            StepState::Incomplete
        }
    }

    /// Outputs with the skip sentinel removed.
    pub fn measured_outputs(&self) -> FieldValues {
        let mut outputs = self.outputs.clone().unwrap_or_default();
        outputs.remove(SKIPPED_KEY);
        outputs
    }
}

/// One end-to-end calibration attempt for a filament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub id: i64,
    #[serde(with = "super::timestamp")]
    pub registered: DateTime<Utc>,
    pub filament_id: i64,
    pub status: SessionStatus,
    #[serde(
        default,
        with = "super::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "super::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nozzle_diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepResult>,
}

impl CalibrationSession {
    /// The most recently recorded result of the given type, if any.
    ///
    /// Ties on `recorded_at` are broken by the higher id.
    pub fn latest_step(&self, step_type: StepType) -> Option<&StepResult> {
        self.steps
            .iter()
            .filter(|s| s.step_type == step_type)
            .max_by_key(|s| (s.recorded_at, s.id))
    }

    pub fn step_state(&self, step_type: StepType) -> Option<StepState> {
        self.latest_step(step_type).map(StepResult::state)
    }
}

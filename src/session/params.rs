//! Request bodies for session and step persistence.
//!
//! Limits mirror the Spoolman calibration API so invalid requests fail
//! locally instead of round-tripping to the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::types::{
    CalibrationSession, Confidence, FieldValues, SessionStatus, StepType, SKIPPED_KEY,
};
use crate::error::{CalibrationError, Result};

pub const PRINTER_NAME_MAX: usize = 256;
pub const NOTES_MAX: usize = 1024;

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(CalibrationError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

fn check_nozzle(value: Option<f64>) -> Result<()> {
    match value {
        Some(d) if !(d > 0.0) => Err(CalibrationError::Validation(
            "nozzle_diameter must be greater than 0".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Body for creating a calibration session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub filament_id: i64,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nozzle_diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default,
        with = "super::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<DateTime<Utc>>,
}

impl NewSession {
    pub fn new(filament_id: i64) -> Self {
        Self {
            filament_id,
            status: SessionStatus::Planned,
            printer_name: None,
            nozzle_diameter: None,
            notes: None,
            started_at: None,
        }
    }

    /// A session started from the wizard: in progress, started now.
    pub fn started(filament_id: i64) -> Self {
        Self {
            status: SessionStatus::InProgress,
            started_at: Some(Utc::now()),
            ..Self::new(filament_id)
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_len("printer_name", self.printer_name.as_deref(), PRINTER_NAME_MAX)?;
        check_len("notes", self.notes.as_deref(), NOTES_MAX)?;
        check_nozzle(self.nozzle_diameter)
    }
}

/// Partial update of a session. `None` leaves a field alone; for the
/// clearable fields `Some(None)` is sent as `null` and clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub printer_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub nozzle_diameter: Option<Option<f64>>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
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
}

impl SessionPatch {
    /// Marks a session finished now.
    pub fn complete() -> Self {
        Self {
            status: Some(SessionStatus::Complete),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_len(
            "printer_name",
            self.printer_name.as_ref().and_then(|n| n.as_deref()),
            PRINTER_NAME_MAX,
        )?;
        check_len("notes", self.notes.as_ref().and_then(|n| n.as_deref()), NOTES_MAX)?;
        check_nozzle(self.nozzle_diameter.flatten())
    }

    pub fn apply_to(&self, session: &mut CalibrationSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(ref name) = self.printer_name {
            session.printer_name = name.clone();
        }
        if let Some(diameter) = self.nozzle_diameter {
            session.nozzle_diameter = diameter;
        }
        if let Some(ref notes) = self.notes {
            session.notes = notes.clone();
        }
        if let Some(started_at) = self.started_at {
            session.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            session.completed_at = Some(completed_at);
        }
    }
}

/// Reads a present field, `null` included, as `Some`. Absent fields fall
/// back to `#[serde(default)]`.
fn clearable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body for recording a step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStepResult {
    pub step_type: StepType,
    #[serde(default)]
    pub inputs: Option<FieldValues>,
    #[serde(default)]
    pub outputs: Option<FieldValues>,
    #[serde(default)]
    pub selected_values: Option<FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(
        default,
        with = "super::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl NewStepResult {
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            inputs: None,
            outputs: None,
            selected_values: None,
            notes: None,
            confidence: None,
            recorded_at: None,
        }
    }

    /// A completed step: the result is stored both as outputs and as the
    /// user-confirmed selected values.
    pub fn completed(step_type: StepType, inputs: FieldValues, result: FieldValues) -> Self {
        Self {
            inputs: Some(inputs),
            outputs: Some(result.clone()),
            selected_values: Some(result),
            ..Self::new(step_type)
        }
    }

    /// A step the user marked as not applicable.
    pub fn skipped(step_type: StepType) -> Self {
        let mut outputs = FieldValues::new();
        outputs.insert(SKIPPED_KEY.to_string(), Value::Bool(true));
        Self {
            outputs: Some(outputs),
            ..Self::new(step_type)
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn with_confidence(mut self, confidence: Option<Confidence>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_len("notes", self.notes.as_deref(), NOTES_MAX)?;
        reject_stray_sentinel(self.outputs.as_ref(), self.selected_values.as_ref())
    }
}

/// Partial update of a step result. Only `Some` fields are sent; notes and
/// confidence are cleared with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResultPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<FieldValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_values: Option<FieldValues>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub confidence: Option<Option<Confidence>>,
    #[serde(
        default,
        with = "super::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl StepResultPatch {
    pub fn validate(&self) -> Result<()> {
        check_len("notes", self.notes.as_ref().and_then(|n| n.as_deref()), NOTES_MAX)?;
        reject_stray_sentinel(self.outputs.as_ref(), self.selected_values.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A skipped step never carries selected values.
fn reject_stray_sentinel(
    outputs: Option<&FieldValues>,
    selected_values: Option<&FieldValues>,
) -> Result<()> {
    let skipped = outputs
        .and_then(|o| o.get(SKIPPED_KEY))
        .map_or(false, |v| *v == json!(true));
    let has_selected = selected_values.map_or(false, |s| !s.is_empty());
    if skipped && has_selected {
        return Err(CalibrationError::Validation(
            "a skipped step cannot carry selected values".to_string(),
        ));
    }
    Ok(())
}

/// Filter and paging for `list_sessions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionQuery {
    pub filament_id: Option<i64>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl SessionQuery {
    pub fn for_filament(filament_id: i64) -> Self {
        Self {
            filament_id: Some(filament_id),
            ..Self::default()
        }
    }
}

/// One page of sessions, newest first, with the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionPage {
    pub items: Vec<CalibrationSession>,
    pub total_count: u64,
}

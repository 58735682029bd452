//! Type definitions for the step registry.
//!
//! These types support both TOML deserialization (for loading the tables)
//! and JSON serialization (for frontend communication).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::StepType;

// =============================================================================
// CONFIGURATION TYPES (loaded from TOML)
// =============================================================================

/// Root of `step_fields.toml`, keyed by step type name.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldsConfig {
    pub steps: BTreeMap<String, StepFieldsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepFieldsConfig {
    #[serde(default)]
    pub recommended_keys: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Widget kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    Select,
    Boolean,
}

/// Which mapping of a step result a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Inputs,
    Outputs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Half,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// One input or output field of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub section: Section,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    /// Maximum number of decimals the control accepts.
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSchema {
    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

/// Root of `step_copy.toml`, keyed by step type name.
pub type CopyConfig = BTreeMap<String, StepCopy>;

/// Human-readable copy for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCopy {
    pub title: String,
    pub description: String,
    pub reference_url: String,
}

// =============================================================================
// RESOLVED TYPES
// =============================================================================

/// Validated schema of one step type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSchema {
    pub step_type: StepType,
    pub fields: Vec<FieldSchema>,
    pub recommended_keys: Vec<String>,
}

impl StepSchema {
    pub fn field(&self, key: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.section == Section::Inputs)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.section == Section::Outputs)
    }

    pub fn recommended_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.recommended_keys
            .iter()
            .filter_map(move |key| self.field(key))
    }
}

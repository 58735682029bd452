//! Controller for the step currently being edited, in the wizard or in the
//! standalone add/edit step drawer.
//!
//! Holds the editable form values plus the transient helper state of the
//! step (flow calculator, artifact speeds). Every input edit reruns the
//! step's formula and merges the computed outputs into the result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::calculator::{
    ArtifactSpeeds, FlowMethod, FlowPhase, FlowRateCalculator, PaMethod,
};
use crate::error::{CalibrationError, Result};
use crate::registry::formulas::{self, round_half_up};
use crate::registry::{FieldKind, FieldSchema, Layout, Section, SelectOption, StepRegistry};
use crate::session::{Confidence, FieldValues, StepResult, StepType};

/// Tower-only inputs hidden while the pattern method is selected.
const PA_TOWER_INPUTS: [&str; 2] = ["pa_step_a", "measured_height_b"];

/// Editable values of one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepForm {
    pub inputs: FieldValues,
    pub result: FieldValues,
    pub notes: Option<String>,
    pub confidence: Option<Confidence>,
}

impl StepForm {
    /// Seed a form from a persisted result: its inputs, and its selected
    /// values when present, otherwise its outputs. The skip sentinel is
    /// never carried into the form.
    pub fn from_step(step: &StepResult) -> Self {
        let result = if step.has_selected_values() {
            step.selected_values.clone().unwrap_or_default()
        } else {
            step.measured_outputs()
        };
        Self {
            inputs: step.inputs.clone().unwrap_or_default(),
            result,
            notes: step.notes.clone(),
            confidence: step.confidence,
        }
    }
}

/// Transient helper state; discarded whenever the active step changes.
#[derive(Debug, Clone, PartialEq)]
enum StepTools {
    None,
    FlowRate(FlowRateCalculator),
    Vfa(ArtifactSpeeds),
}

impl StepTools {
    fn for_step(step_type: StepType) -> Self {
        match step_type {
            StepType::FlowRate => StepTools::FlowRate(FlowRateCalculator::new()),
            StepType::Vfa => StepTools::Vfa(ArtifactSpeeds::new()),
            _ => StepTools::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveStep {
    registry: Arc<StepRegistry>,
    step_type: StepType,
    form: StepForm,
    tools: StepTools,
}

impl ActiveStep {
    pub fn new(registry: Arc<StepRegistry>, step_type: StepType) -> Self {
        Self::with_form(registry, step_type, StepForm::default())
    }

    /// Open a step with previously edited values. Schema defaults fill any
    /// field the form does not set.
    pub fn with_form(registry: Arc<StepRegistry>, step_type: StepType, mut form: StepForm) -> Self {
        for field in &registry.schema(step_type).fields {
            if let Some(ref default) = field.default {
                let target = match field.section {
                    Section::Inputs => &mut form.inputs,
                    Section::Outputs => &mut form.result,
                };
                target
                    .entry(field.key.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Self {
            registry,
            step_type,
            form,
            tools: StepTools::for_step(step_type),
        }
    }

    pub fn step_type(&self) -> StepType {
        self.step_type
    }

    pub fn form(&self) -> &StepForm {
        &self.form
    }

    pub fn into_form(self) -> StepForm {
        self.form
    }

    /// Change which step the drawer edits. Values and helper state start over.
    pub fn switch_to(&mut self, step_type: StepType) {
        if step_type == self.step_type {
            return;
        }
        debug!("Active step {} -> {}", self.step_type, step_type);
        *self = Self::new(self.registry.clone(), step_type);
    }

    /// Set (or clear with `Value::Null`) an input and recompute outputs.
    ///
    /// Returns the outputs the formula produced, which have already been
    /// merged into the result.
    pub fn set_input(&mut self, key: &str, value: Value) -> Result<FieldValues> {
        let field = self.field_in(key, Section::Inputs)?;
        validate_value(field, &value)?;
        if value.is_null() {
            self.form.inputs.remove(key);
        } else {
            self.form.inputs.insert(key.to_string(), value);
        }
        Ok(self.recompute())
    }

    /// Set (or clear) a result value entered directly by the user.
    pub fn set_output(&mut self, key: &str, value: Value) -> Result<()> {
        let field = self.field_in(key, Section::Outputs)?;
        validate_value(field, &value)?;
        if value.is_null() {
            self.form.result.remove(key);
        } else {
            self.form.result.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.form.notes = notes;
    }

    pub fn set_confidence(&mut self, confidence: Option<Confidence>) {
        self.form.confidence = confidence;
    }

    /// Check every value of a form that was filled in elsewhere. Computed
    /// outputs are only checked for their kind; a formula result is taken
    /// as is even outside the field's input range.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.form.inputs {
            validate_value(self.field_in(key, Section::Inputs)?, value)?;
        }
        let derived = formulas::derived_keys(self.step_type);
        for (key, value) in &self.form.result {
            let field = self.field_in(key, Section::Outputs)?;
            if derived.contains(&key.as_str()) {
                check_value(field, value, false)?;
            } else {
                validate_value(field, value)?;
            }
        }
        Ok(())
    }

    fn recompute(&mut self) -> FieldValues {
        let computed = self.registry.compute(self.step_type, &self.form.inputs);
        for (key, value) in &computed {
            self.form.result.insert(key.clone(), value.clone());
        }
        computed
    }

    // --- pressure advance ---------------------------------------------------

    pub fn pa_method(&self) -> Option<PaMethod> {
        (self.step_type == StepType::PressureAdvance)
            .then(|| PaMethod::from_inputs(&self.form.inputs))
    }

    pub fn set_pa_method(&mut self, method: PaMethod) -> Result<FieldValues> {
        if self.step_type != StepType::PressureAdvance {
            return Err(no_tool(self.step_type, "pressure advance method"));
        }
        PaMethod::write_to(&method, &mut self.form.inputs);
        Ok(self.recompute())
    }

    // --- flow rate ----------------------------------------------------------

    pub fn flow_calculator(&self) -> Option<&FlowRateCalculator> {
        match &self.tools {
            StepTools::FlowRate(calc) => Some(calc),
            _ => None,
        }
    }

    /// Mutable access to the flow calculator for start/method/edit/next/back.
    pub fn flow_calculator_mut(&mut self) -> Result<&mut FlowRateCalculator> {
        match self.tools {
            StepTools::FlowRate(ref mut calc) => Ok(calc),
            _ => Err(no_tool(self.step_type, "flow rate calculator")),
        }
    }

    /// Write the calculator result into the `flow_ratio` result field.
    pub fn apply_flow_calculator(&mut self) -> Result<f64> {
        match self.tools {
            StepTools::FlowRate(ref mut calc) => calc.apply(&mut self.form.result),
            _ => Err(no_tool(self.step_type, "flow rate calculator")),
        }
    }

    // --- vfa ----------------------------------------------------------------

    pub fn artifact_speeds(&self) -> Option<&[u32]> {
        match &self.tools {
            StepTools::Vfa(speeds) => Some(speeds.speeds()),
            _ => None,
        }
    }

    pub fn add_artifact_speed(&mut self, speed: u32) -> Result<()> {
        match self.tools {
            StepTools::Vfa(ref mut speeds) => {
                speeds.add(speed, &mut self.form.result);
                Ok(())
            }
            _ => Err(no_tool(self.step_type, "artifact speed list")),
        }
    }

    pub fn remove_artifact_speed(&mut self, index: usize) -> Result<u32> {
        match self.tools {
            StepTools::Vfa(ref mut speeds) => speeds
                .remove(index, &mut self.form.result)
                .ok_or_else(|| {
                    CalibrationError::Validation(format!("no artifact speed at position {}", index))
                }),
            _ => Err(no_tool(self.step_type, "artifact speed list")),
        }
    }

    // --- view ---------------------------------------------------------------

    /// Render model of the step: copy, fields with current values, helper state.
    pub fn view(&self) -> StepView {
        let schema = self.registry.schema(self.step_type);
        let copy = self.registry.copy(self.step_type);
        let pattern = self.pa_method() == Some(PaMethod::Pattern);

        let inputs = schema
            .inputs()
            .filter(|f| !(pattern && PA_TOWER_INPUTS.contains(&f.key.as_str())))
            .map(|f| FieldView::new(f, self.form.inputs.get(&f.key)))
            .collect();
        let outputs = schema
            .outputs()
            .map(|f| FieldView::new(f, self.form.result.get(&f.key)))
            .collect();

        let tool = match &self.tools {
            StepTools::FlowRate(calc) => ToolView::FlowRate {
                method: calc.method(),
                phase: calc.phase(),
                flow_ratio: calc.flow_ratio(),
                modifier: calc.modifier(),
                result: calc.result(),
            },
            StepTools::Vfa(speeds) => ToolView::Vfa {
                speeds: speeds.speeds().to_vec(),
            },
            StepTools::None => match self.pa_method() {
                Some(method) => ToolView::PressureAdvance { method },
                None => ToolView::None,
            },
        };

        StepView {
            step_type: self.step_type,
            title: copy.title.clone(),
            description: copy.description.clone(),
            reference_url: copy.reference_url.clone(),
            auto_computed: formulas::has_formula(self.step_type) && !pattern,
            inputs,
            outputs,
            recommended_keys: schema.recommended_keys.clone(),
            notes: self.form.notes.clone(),
            confidence: self.form.confidence,
            tool,
        }
    }

    fn field_in(&self, key: &str, section: Section) -> Result<&FieldSchema> {
        let field = self.registry.schema(self.step_type).field(key).ok_or_else(|| {
            CalibrationError::Validation(format!("step {} has no field '{}'", self.step_type, key))
        })?;
        if field.section != section {
            return Err(CalibrationError::Validation(format!(
                "field '{}' of step {} is not an {:?} field",
                key, self.step_type, section
            )));
        }
        Ok(field)
    }
}

fn no_tool(step_type: StepType, tool: &str) -> CalibrationError {
    CalibrationError::InvalidTransition(format!("step {} has no {}", step_type, tool))
}

/// Check a value against the control constraints of its field.
pub fn validate_value(field: &FieldSchema, value: &Value) -> Result<()> {
    check_value(field, value, true)
}

/// Kind check, plus min/max/precision when `bounded`.
fn check_value(field: &FieldSchema, value: &Value, bounded: bool) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let invalid = |reason: String| -> Result<()> {
        Err(CalibrationError::Validation(format!(
            "{} ({}): {}",
            field.label, field.key, reason
        )))
    };
    match field.kind {
        FieldKind::Number => {
            let Some(n) = value.as_f64().filter(|n| n.is_finite()) else {
                return invalid(format!("expected a number, got {}", value));
            };
            if !bounded {
                return Ok(());
            }
            if let Some(min) = field.min {
                if n < min {
                    return invalid(format!("{} is below the minimum {}", n, min));
                }
            }
            if let Some(max) = field.max {
                if n > max {
                    return invalid(format!("{} is above the maximum {}", n, max));
                }
            }
            if let Some(precision) = field.precision {
                if (round_half_up(n, precision) - n).abs() > 1e-9 {
                    return invalid(format!("{} has more than {} decimals", n, precision));
                }
            }
            Ok(())
        }
        FieldKind::Select => match value.as_str() {
            Some(s) if field.options.iter().any(|o| o.value == s) => Ok(()),
            _ => invalid(format!("{} is not one of the options", value)),
        },
        FieldKind::Boolean => {
            if value.is_boolean() {
                Ok(())
            } else {
                invalid(format!("expected true or false, got {}", value))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub key: String,
    pub label: String,
    pub unit: Option<String>,
    pub kind: FieldKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub precision: Option<u32>,
    pub options: Vec<SelectOption>,
    pub layout: Option<Layout>,
    pub value: Value,
}

impl FieldView {
    fn new(field: &FieldSchema, value: Option<&Value>) -> Self {
        Self {
            key: field.key.clone(),
            label: field.label.clone(),
            unit: field.unit.clone(),
            kind: field.kind,
            min: field.min,
            max: field.max,
            step: field.step,
            precision: field.precision,
            options: field.options.clone(),
            layout: field.layout,
            value: value.cloned().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolView {
    None,
    FlowRate {
        method: FlowMethod,
        phase: FlowPhase,
        flow_ratio: Option<f64>,
        modifier: Option<f64>,
        result: Option<f64>,
    },
    Vfa {
        speeds: Vec<u32>,
    },
    PressureAdvance {
        method: PaMethod,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub step_type: StepType,
    pub title: String,
    pub description: String,
    pub reference_url: String,
    /// Outputs are filled in from the inputs as they are edited.
    pub auto_computed: bool,
    pub inputs: Vec<FieldView>,
    pub outputs: Vec<FieldView>,
    pub recommended_keys: Vec<String>,
    pub notes: Option<String>,
    pub confidence: Option<Confidence>,
    pub tool: ToolView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn active(step_type: StepType) -> ActiveStep {
        ActiveStep::new(Arc::new(StepRegistry::builtin()), step_type)
    }

    #[test]
    fn test_input_edit_recomputes_output() {
        let mut step = active(StepType::Tolerance);
        assert!(step.set_input("test_size", json!(20.0)).unwrap().is_empty());

        let computed = step.set_input("measured_size", json!(19.85)).unwrap();
        assert_eq!(computed["tolerance_offset"], json!(0.15));
        assert_eq!(step.form().result["tolerance_offset"], json!(0.15));
    }

    #[test]
    fn test_clearing_input_keeps_previous_output() {
        let mut step = active(StepType::Tolerance);
        step.set_input("test_size", json!(20.0)).unwrap();
        step.set_input("measured_size", json!(19.9)).unwrap();
        step.set_input("measured_size", Value::Null).unwrap();

        assert!(!step.form().inputs.contains_key("measured_size"));
        assert!(step.form().result.contains_key("tolerance_offset"));
    }

    #[test]
    fn test_input_constraints_enforced() {
        let mut step = active(StepType::Temperature);
        assert!(step.set_input("start_temp", json!(100)).is_err(), "below min");
        assert!(step.set_input("start_temp", json!(200.5)).is_err(), "too precise");
        assert!(step.set_input("start_temp", json!("200")).is_err(), "not a number");
        assert!(step.set_input("temperature", json!(210)).is_err(), "output key");
        assert!(step.set_input("bogus", json!(1)).is_err());
        step.set_input("start_temp", json!(190)).unwrap();
    }

    #[test]
    fn test_select_and_boolean_constraints() {
        let mut step = active(StepType::InputShaping);
        assert!(step.set_output("shaper_type", json!("fancy")).is_err());
        step.set_output("shaper_type", json!("mzv")).unwrap();
        assert!(step.set_input("firmware_managed", json!(1)).is_err());
        step.set_input("firmware_managed", json!(true)).unwrap();
    }

    #[test]
    fn test_schema_defaults_seed_form() {
        let step = active(StepType::PressureAdvance);
        assert_eq!(step.form().inputs["method"], json!("tower"));
        assert_eq!(step.pa_method(), Some(PaMethod::Tower));
    }

    #[test]
    fn test_pattern_method_hides_tower_inputs_and_stops_formula() {
        let mut step = active(StepType::PressureAdvance);
        step.set_input("pa_step_a", json!(0.002)).unwrap();
        step.set_input("measured_height_b", json!(10.0)).unwrap();
        assert_eq!(step.form().result["pressure_advance"], json!(0.02));

        step.set_pa_method(PaMethod::Pattern).unwrap();
        step.set_output("pressure_advance", json!(0.031)).unwrap();
        let computed = step.set_input("pa_step_a", json!(0.004)).unwrap();
        assert!(computed.is_empty());
        assert_eq!(step.form().result["pressure_advance"], json!(0.031));

        let view = step.view();
        assert!(!view.auto_computed);
        assert_eq!(view.inputs.len(), 1);
        assert_eq!(view.inputs[0].key, "method");
        assert_eq!(
            view.tool,
            ToolView::PressureAdvance {
                method: PaMethod::Pattern
            }
        );
    }

    #[test]
    fn test_flow_calculator_applies_into_result() {
        let mut step = active(StepType::FlowRate);
        {
            let calc = step.flow_calculator_mut().unwrap();
            calc.select_method(FlowMethod::Legacy);
            calc.start().unwrap();
            calc.set_modifier(Some(-2.5)).unwrap();
            calc.next().unwrap();
            calc.set_modifier(Some(0.0)).unwrap();
        }
        assert_eq!(step.apply_flow_calculator().unwrap(), 0.975);
        assert_eq!(step.form().result["flow_ratio"], json!(0.975));
    }

    #[test]
    fn test_switching_away_from_flow_rate_resets_calculator() {
        let mut step = active(StepType::FlowRate);
        {
            let calc = step.flow_calculator_mut().unwrap();
            calc.select_method(FlowMethod::Legacy);
            calc.start().unwrap();
        }
        step.switch_to(StepType::Vfa);
        assert!(step.flow_calculator().is_none());
        step.switch_to(StepType::FlowRate);

        let calc = step.flow_calculator().unwrap();
        assert_eq!(calc.method(), FlowMethod::Yolo);
        assert_eq!(calc.phase(), FlowPhase::Idle);
    }

    #[test]
    fn test_tools_not_available_on_other_steps() {
        let mut step = active(StepType::Temperature);
        assert!(step.flow_calculator_mut().is_err());
        assert!(step.add_artifact_speed(100).is_err());
        assert!(step.set_pa_method(PaMethod::Pattern).is_err());
        assert_eq!(step.view().tool, ToolView::None);
    }

    #[test]
    fn test_vfa_speeds_drive_result() {
        let mut step = active(StepType::Vfa);
        step.add_artifact_speed(140).unwrap();
        step.add_artifact_speed(90).unwrap();
        assert_eq!(step.artifact_speeds(), Some(&[90, 140][..]));
        assert_eq!(step.form().result["min_avoidance_speed"], json!(90));
        assert_eq!(step.form().result["max_avoidance_speed"], json!(140));

        assert_eq!(step.remove_artifact_speed(0).unwrap(), 90);
        assert!(step.remove_artifact_speed(3).is_err());
    }

    #[test]
    fn test_validate_prefilled_form() {
        let registry = Arc::new(StepRegistry::builtin());
        let mut form = StepForm::default();
        form.result.insert("cornering_value".into(), json!(8.0));
        let step = ActiveStep::with_form(registry.clone(), StepType::Cornering, form.clone());
        step.validate().unwrap();

        form.inputs.insert("pa_step_a".into(), json!(0.002));
        let step = ActiveStep::with_form(registry, StepType::Cornering, form);
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_computed_output_outside_field_range() {
        let mut step = active(StepType::Tolerance);
        step.set_input("test_size", json!(20)).unwrap();
        let computed = step.set_input("measured_size", json!(26)).unwrap();
        assert_eq!(computed["tolerance_offset"], json!(-6.0));
        step.validate().unwrap();

        let mut step = active(StepType::FlowRate);
        {
            let calc = step.flow_calculator_mut().unwrap();
            calc.start().unwrap();
            calc.set_flow_ratio(Some(1.45)).unwrap();
            calc.set_modifier(Some(0.1)).unwrap();
        }
        assert_eq!(step.apply_flow_calculator().unwrap(), 1.55);
        step.validate().unwrap();

        // Typed-in values still honour the field range.
        assert!(step.set_output("flow_ratio", json!(1.55)).is_err());
        let mut form = step.form().clone();
        form.result.insert("flow_ratio".into(), json!("high"));
        let step = ActiveStep::with_form(Arc::new(StepRegistry::builtin()), StepType::FlowRate, form);
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_form_from_skipped_step_drops_sentinel() {
        let step: StepResult = serde_json::from_value(json!({
            "id": 1,
            "session_id": 1,
            "step_type": "input_shaping",
            "outputs": {"_skipped": true},
            "recorded_at": "2026-02-20T12:00:00Z"
        }))
        .unwrap();
        let form = StepForm::from_step(&step);
        assert!(form.result.is_empty());
        assert!(form.inputs.is_empty());
    }

    #[test]
    fn test_form_from_step_prefers_selected_values() {
        let step: StepResult = serde_json::from_value(json!({
            "id": 1,
            "session_id": 1,
            "step_type": "temperature",
            "inputs": {"start_temp": 190},
            "outputs": {"temperature": 205},
            "selected_values": {"temperature": 210},
            "confidence": "medium",
            "recorded_at": "2026-02-20T12:00:00Z"
        }))
        .unwrap();
        let form = StepForm::from_step(&step);
        assert_eq!(form.result["temperature"], json!(210));
        assert_eq!(form.inputs["start_temp"], json!(190));
        assert_eq!(form.confidence, Some(Confidence::Medium));
    }
}

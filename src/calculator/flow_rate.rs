//! Guided flow-rate calculator.
//!
//! YOLO runs a single pass (`Idle -> Pass1`) with an additive modifier.
//! Legacy runs two percentage passes (`Idle -> Pass1 -> Pass2`), where the
//! second pass starts from the first pass's result.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

use crate::error::{CalibrationError, Result};
use crate::registry::formulas::{legacy_flow_ratio, yolo_flow_ratio};
use crate::session::FieldValues;

/// Result field the calculator writes into.
pub const FLOW_RATIO_KEY: &str = "flow_ratio";

/// Flow ratio the calculator starts from.
pub const DEFAULT_FLOW_RATIO: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowMethod {
    #[default]
    Yolo,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowPhase {
    #[default]
    Idle,
    Pass1,
    Pass2,
}

/// Calculator state. All fields reset together whenever the method changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRateCalculator {
    method: FlowMethod,
    phase: FlowPhase,
    flow_ratio: Option<f64>,
    modifier: Option<f64>,
    pass2_flow_ratio: Option<f64>,
    pass2_modifier: Option<f64>,
}

impl Default for FlowRateCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRateCalculator {
    pub fn new() -> Self {
        Self::with_method(FlowMethod::Yolo)
    }

    fn with_method(method: FlowMethod) -> Self {
        Self {
            method,
            phase: FlowPhase::Idle,
            flow_ratio: Some(DEFAULT_FLOW_RATIO),
            modifier: None,
            pass2_flow_ratio: None,
            pass2_modifier: None,
        }
    }

    pub fn method(&self) -> FlowMethod {
        self.method
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn flow_ratio(&self) -> Option<f64> {
        match self.phase {
            FlowPhase::Pass2 => self.pass2_flow_ratio,
            _ => self.flow_ratio,
        }
    }

    pub fn modifier(&self) -> Option<f64> {
        match self.phase {
            FlowPhase::Pass2 => self.pass2_modifier,
            _ => self.modifier,
        }
    }

    /// Switch method; always returns to `Idle` with default fields.
    pub fn select_method(&mut self, method: FlowMethod) {
        debug!("Flow calculator method -> {:?}", method);
        *self = Self::with_method(method);
    }

    /// Force back to `Idle` with the default YOLO method.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_phase(FlowPhase::Idle, "start")?;
        self.phase = FlowPhase::Pass1;
        Ok(())
    }

    /// Set the flow ratio of the current pass.
    pub fn set_flow_ratio(&mut self, value: Option<f64>) -> Result<()> {
        match self.phase {
            FlowPhase::Idle => return Err(self.invalid("edit the flow ratio")),
            FlowPhase::Pass1 => self.flow_ratio = value,
            FlowPhase::Pass2 => self.pass2_flow_ratio = value,
        }
        Ok(())
    }

    /// Set the modifier of the current pass: additive for YOLO, percent for Legacy.
    pub fn set_modifier(&mut self, value: Option<f64>) -> Result<()> {
        match self.phase {
            FlowPhase::Idle => return Err(self.invalid("edit the modifier")),
            FlowPhase::Pass1 => self.modifier = value,
            FlowPhase::Pass2 => self.pass2_modifier = value,
        }
        Ok(())
    }

    /// Result of the current pass, once both of its inputs are set.
    pub fn result(&self) -> Option<f64> {
        let ratio = self.flow_ratio().filter(|v| v.is_finite())?;
        let modifier = self.modifier().filter(|v| v.is_finite())?;
        match (self.method, self.phase) {
            (_, FlowPhase::Idle) => None,
            (FlowMethod::Yolo, _) => Some(yolo_flow_ratio(ratio, modifier)),
            (FlowMethod::Legacy, _) => Some(legacy_flow_ratio(ratio, modifier)),
        }
    }

    /// Legacy only: carry the pass-1 result into pass 2.
    pub fn next(&mut self) -> Result<()> {
        if self.method != FlowMethod::Legacy {
            return Err(self.invalid("advance to a second pass"));
        }
        self.expect_phase(FlowPhase::Pass1, "advance to pass 2")?;
        let seed = self
            .result()
            .ok_or_else(|| CalibrationError::Validation("pass 1 has no result yet".to_string()))?;
        self.pass2_flow_ratio = Some(seed);
        self.pass2_modifier = None;
        self.phase = FlowPhase::Pass2;
        Ok(())
    }

    /// Legacy only: return from pass 2 to pass 1, dropping the pass-2 modifier.
    pub fn back(&mut self) -> Result<()> {
        self.expect_phase(FlowPhase::Pass2, "go back to pass 1")?;
        self.pass2_modifier = None;
        self.phase = FlowPhase::Pass1;
        Ok(())
    }

    /// Abandon the calculation without writing anything.
    pub fn cancel(&mut self) {
        *self = Self::with_method(self.method);
    }

    /// Write the final result into `flow_ratio` of `result`, keeping other
    /// result fields, and return to `Idle`.
    pub fn apply(&mut self, result: &mut FieldValues) -> Result<f64> {
        let terminal = match self.method {
            FlowMethod::Yolo => FlowPhase::Pass1,
            FlowMethod::Legacy => FlowPhase::Pass2,
        };
        self.expect_phase(terminal, "apply")?;
        let value = self
            .result()
            .ok_or_else(|| CalibrationError::Validation("no flow ratio computed yet".to_string()))?;
        let number = Number::from_f64(value).ok_or_else(|| {
            CalibrationError::Validation(format!("flow ratio {} is not finite", value))
        })?;
        result.insert(FLOW_RATIO_KEY.to_string(), Value::Number(number));
        debug!("Applied flow ratio {}", value);
        *self = Self::with_method(self.method);
        Ok(value)
    }

    fn expect_phase(&self, phase: FlowPhase, action: &str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &str) -> CalibrationError {
        CalibrationError::InvalidTransition(format!(
            "cannot {} while the {:?} flow calculator is {:?}",
            action, self.method, self.phase
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let calc = FlowRateCalculator::new();
        assert_eq!(calc.method(), FlowMethod::Yolo);
        assert_eq!(calc.phase(), FlowPhase::Idle);
        assert_eq!(calc.flow_ratio(), Some(1.0));
        assert_eq!(calc.modifier(), None);
        assert_eq!(calc.result(), None);
    }

    #[test]
    fn test_yolo_apply_merges_into_result() {
        let mut calc = FlowRateCalculator::new();
        calc.start().unwrap();
        calc.set_modifier(Some(0.05)).unwrap();
        assert_eq!(calc.result(), Some(1.05));

        let mut result = FieldValues::new();
        result.insert("notes_field".to_string(), json!("keep me"));
        let applied = calc.apply(&mut result).unwrap();

        assert_eq!(applied, 1.05);
        assert_eq!(result["flow_ratio"], json!(1.05));
        assert_eq!(result["notes_field"], json!("keep me"));
        assert_eq!(calc.phase(), FlowPhase::Idle);
        assert_eq!(calc.modifier(), None);
    }

    #[test]
    fn test_yolo_has_no_second_pass() {
        let mut calc = FlowRateCalculator::new();
        calc.start().unwrap();
        calc.set_modifier(Some(-0.02)).unwrap();
        assert!(calc.next().is_err());
        assert_eq!(calc.phase(), FlowPhase::Pass1);
    }

    #[test]
    fn test_legacy_two_pass_seeds_pass2_exactly() {
        let mut calc = FlowRateCalculator::new();
        calc.select_method(FlowMethod::Legacy);
        calc.start().unwrap();
        calc.set_modifier(Some(-2.5)).unwrap();
        let pass1 = calc.result().unwrap();
        assert_eq!(pass1, 0.975);

        calc.next().unwrap();
        assert_eq!(calc.phase(), FlowPhase::Pass2);
        assert_eq!(calc.flow_ratio(), Some(pass1));
        assert_eq!(calc.modifier(), None);

        calc.set_modifier(Some(1.0)).unwrap();
        let mut result = FieldValues::new();
        let applied = calc.apply(&mut result).unwrap();
        assert_eq!(applied, legacy_flow_ratio(pass1, 1.0));
        assert_eq!(calc.phase(), FlowPhase::Idle);
        assert_eq!(calc.method(), FlowMethod::Legacy);
    }

    #[test]
    fn test_legacy_apply_in_pass1_rejected() {
        let mut calc = FlowRateCalculator::new();
        calc.select_method(FlowMethod::Legacy);
        calc.start().unwrap();
        calc.set_modifier(Some(5.0)).unwrap();
        let mut result = FieldValues::new();
        assert!(calc.apply(&mut result).is_err());
        assert!(result.is_empty());
    }

    #[test]
    fn test_legacy_back_clears_only_pass2_modifier() {
        let mut calc = FlowRateCalculator::new();
        calc.select_method(FlowMethod::Legacy);
        calc.start().unwrap();
        calc.set_modifier(Some(-5.0)).unwrap();
        calc.next().unwrap();
        calc.set_modifier(Some(2.0)).unwrap();

        calc.back().unwrap();
        assert_eq!(calc.phase(), FlowPhase::Pass1);
        assert_eq!(calc.modifier(), Some(-5.0));

        calc.next().unwrap();
        assert_eq!(calc.modifier(), None, "pass-2 modifier was cleared");
    }

    #[test]
    fn test_cancel_writes_nothing() {
        let mut calc = FlowRateCalculator::new();
        calc.start().unwrap();
        calc.set_flow_ratio(Some(0.98)).unwrap();
        calc.set_modifier(Some(0.01)).unwrap();
        calc.cancel();
        assert_eq!(calc.phase(), FlowPhase::Idle);
        assert_eq!(calc.flow_ratio(), Some(1.0));
    }

    #[test]
    fn test_select_method_mid_flow_resets() {
        let mut calc = FlowRateCalculator::new();
        calc.select_method(FlowMethod::Legacy);
        calc.start().unwrap();
        calc.set_flow_ratio(Some(0.95)).unwrap();
        calc.set_modifier(Some(3.0)).unwrap();
        calc.next().unwrap();

        calc.select_method(FlowMethod::Yolo);
        assert_eq!(calc.phase(), FlowPhase::Idle);
        assert_eq!(calc.flow_ratio(), Some(1.0));
        assert_eq!(calc.modifier(), None);
    }

    #[test]
    fn test_edit_while_idle_rejected() {
        let mut calc = FlowRateCalculator::new();
        assert!(matches!(
            calc.set_modifier(Some(1.0)),
            Err(CalibrationError::InvalidTransition(_))
        ));
    }
}

//! Auto-compute formulas mapping measured inputs to recommended outputs.
//!
//! Every formula is pure: it reads the inputs mapping and returns only the
//! output keys it could compute. A formula with any required input missing or
//! non-numeric returns nothing, so existing outputs stay untouched.

use serde_json::{Number, Value};

use crate::session::{FieldValues, StepType};

/// Pressure-advance `method` input value that disables the tower formula.
pub const PA_METHOD_PATTERN: &str = "pattern";

/// Round half-up toward positive infinity, as `Math.round(x * 10^n) / 10^n`.
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor + 0.5).floor() / factor
}

/// Numeric value of `key`, if present and finite.
pub fn number(values: &FieldValues, key: &str) -> Option<f64> {
    values
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

fn insert_number(target: &mut FieldValues, key: &str, value: f64) {
    if let Some(n) = Number::from_f64(value) {
        target.insert(key.to_string(), Value::Number(n));
    }
}

/// Whether `compute` can ever produce a value for this step type.
pub fn has_formula(step_type: StepType) -> bool {
    matches!(
        step_type,
        StepType::VolumetricSpeed
            | StepType::PressureAdvance
            | StepType::Retraction
            | StepType::Tolerance
    )
}

/// Output keys a formula or a step helper writes instead of the user.
pub fn derived_keys(step_type: StepType) -> &'static [&'static str] {
    match step_type {
        StepType::VolumetricSpeed => &["max_volumetric_speed"],
        StepType::PressureAdvance => &["pressure_advance"],
        StepType::Retraction => &["retraction_length"],
        StepType::Tolerance => &["tolerance_offset"],
        StepType::FlowRate => &["flow_ratio"],
        StepType::Vfa => &["min_avoidance_speed", "max_avoidance_speed"],
        StepType::Temperature | StepType::Cornering | StepType::InputShaping => &[],
    }
}

/// Outputs derivable from `inputs` for the given step type.
pub fn compute(step_type: StepType, inputs: &FieldValues) -> FieldValues {
    let mut outputs = FieldValues::new();
    let n = |key: &str| number(inputs, key);

    match step_type {
        StepType::VolumetricSpeed => {
            if let (Some(start), Some(height), Some(step)) =
                (n("start_speed"), n("measured_height"), n("step_size"))
            {
                insert_number(
                    &mut outputs,
                    "max_volumetric_speed",
                    round_half_up(start + height * step, 2),
                );
            }
        }
        StepType::PressureAdvance => {
            let pattern = inputs.get("method").and_then(Value::as_str) == Some(PA_METHOD_PATTERN);
            if !pattern {
                if let (Some(step), Some(height)) = (n("pa_step_a"), n("measured_height_b")) {
                    insert_number(
                        &mut outputs,
                        "pressure_advance",
                        round_half_up(step * height, 4),
                    );
                }
            }
        }
        StepType::Retraction => {
            if let (Some(start), Some(height), Some(factor)) =
                (n("start_retract"), n("measured_height"), n("factor"))
            {
                insert_number(
                    &mut outputs,
                    "retraction_length",
                    round_half_up(start + height * factor, 5),
                );
            }
        }
        StepType::Tolerance => {
            if let (Some(test), Some(measured)) = (n("test_size"), n("measured_size")) {
                insert_number(
                    &mut outputs,
                    "tolerance_offset",
                    round_half_up(test - measured, 3),
                );
            }
        }
        StepType::Temperature
        | StepType::FlowRate
        | StepType::Cornering
        | StepType::InputShaping
        | StepType::Vfa => {}
    }

    outputs
}

/// YOLO flow calibration: additive modifier on the current ratio.
pub fn yolo_flow_ratio(current_flow_ratio: f64, modifier: f64) -> f64 {
    round_half_up(current_flow_ratio + modifier, 5)
}

/// Legacy flow calibration pass: percentage modifier on the ratio.
pub fn legacy_flow_ratio(flow_ratio: f64, modifier_percent: f64) -> f64 {
    round_half_up(flow_ratio * (100.0 + modifier_percent) / 100.0, 5)
}

/// Avoidance range for VFA artifact speeds; both null when empty.
pub fn vfa_range(speeds: &[u32]) -> FieldValues {
    let mut outputs = FieldValues::new();
    let min = speeds.iter().min().map_or(Value::Null, |v| Value::from(*v));
    let max = speeds.iter().max().map_or(Value::Null, |v| Value::from(*v));
    outputs.insert("min_avoidance_speed".to_string(), min);
    outputs.insert("max_avoidance_speed".to_string(), max);
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> FieldValues {
        v.as_object().cloned().unwrap()
    }

    fn approx(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("formula should produce a value");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_round_half_up_matches_browser_rounding() {
        assert_eq!(round_half_up(1.005, 0), 1.0);
        assert_eq!(round_half_up(2.5, 0), 3.0);
        assert_eq!(round_half_up(-2.5, 0), -2.0);
        approx(Some(round_half_up(0.123456, 4)), 0.1235);
    }

    #[test]
    fn test_volumetric_speed() {
        let out = compute(
            StepType::VolumetricSpeed,
            &values(json!({"start_speed": 5, "measured_height": 12.3, "step_size": 0.5})),
        );
        approx(number(&out, "max_volumetric_speed"), 11.15);
    }

    #[test]
    fn test_volumetric_speed_rounds_to_two_decimals() {
        let out = compute(
            StepType::VolumetricSpeed,
            &values(json!({"start_speed": 2, "measured_height": 10.333, "step_size": 1})),
        );
        approx(number(&out, "max_volumetric_speed"), 12.33);
    }

    #[test]
    fn test_pressure_advance_tower() {
        let out = compute(
            StepType::PressureAdvance,
            &values(json!({"method": "tower", "pa_step_a": 0.002, "measured_height_b": 17.5})),
        );
        approx(number(&out, "pressure_advance"), 0.035);
    }

    #[test]
    fn test_pressure_advance_without_method_uses_tower() {
        let out = compute(
            StepType::PressureAdvance,
            &values(json!({"pa_step_a": 0.005, "measured_height_b": 3.3})),
        );
        approx(number(&out, "pressure_advance"), 0.0165);
    }

    #[test]
    fn test_pressure_advance_pattern_ignores_stale_tower_inputs() {
        let out = compute(
            StepType::PressureAdvance,
            &values(json!({"method": "pattern", "pa_step_a": 0.002, "measured_height_b": 17.5})),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_retraction() {
        let out = compute(
            StepType::Retraction,
            &values(json!({"start_retract": 0.2, "measured_height": 7.5, "factor": 0.1})),
        );
        approx(number(&out, "retraction_length"), 0.95);
    }

    #[test]
    fn test_tolerance_can_be_negative() {
        let out = compute(
            StepType::Tolerance,
            &values(json!({"test_size": 20.0, "measured_size": 20.1234})),
        );
        approx(number(&out, "tolerance_offset"), -0.123);
    }

    #[test]
    fn test_missing_input_withholds_update() {
        let out = compute(
            StepType::Retraction,
            &values(json!({"start_retract": 0.2, "measured_height": null, "factor": 0.1})),
        );
        assert!(out.is_empty());

        let out = compute(
            StepType::Tolerance,
            &values(json!({"test_size": "20", "measured_size": 19.9})),
        );
        assert!(out.is_empty(), "string inputs are not numeric");
    }

    #[test]
    fn test_steps_without_formula_compute_nothing() {
        let inputs = values(json!({"start_temp": 190, "end_temp": 230}));
        for step_type in [
            StepType::Temperature,
            StepType::FlowRate,
            StepType::Cornering,
            StepType::InputShaping,
            StepType::Vfa,
        ] {
            assert!(!has_formula(step_type));
            assert!(compute(step_type, &inputs).is_empty());
        }
    }

    #[test]
    fn test_flow_ratio_examples() {
        approx(Some(yolo_flow_ratio(1.0, 0.05)), 1.05);
        approx(Some(legacy_flow_ratio(1.0, -2.5)), 0.975);
        approx(Some(legacy_flow_ratio(0.975, 1.0)), 0.98475);
    }

    #[test]
    fn test_vfa_range() {
        let out = vfa_range(&[120, 80, 200, 80]);
        assert_eq!(out["min_avoidance_speed"], json!(80));
        assert_eq!(out["max_avoidance_speed"], json!(200));

        let empty = vfa_range(&[]);
        assert_eq!(empty["min_avoidance_speed"], Value::Null);
        assert_eq!(empty["max_avoidance_speed"], Value::Null);
    }
}

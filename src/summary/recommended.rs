use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::registry::formulas::round_half_up;
use crate::registry::{FieldKind, FieldSchema, StepRegistry, WIZARD_STEPS};
use crate::session::{CalibrationSession, StepResult, StepType};

/// One recommended setting ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedValue {
    pub key: String,
    pub label: String,
    pub unit: Option<String>,
    pub value: Value,
    /// Formatted value with its unit, e.g. `215 °C` or `MZV`.
    pub display: String,
}

/// Recommended values of one step type and where they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedStep {
    pub step_type: StepType,
    pub title: String,
    pub session_id: i64,
    pub step_id: i64,
    #[serde(with = "crate::session::timestamp")]
    pub recorded_at: DateTime<Utc>,
    pub values: Vec<RecommendedValue>,
}

/// Latest confirmed values per step type across `sessions`, in wizard order.
///
/// Sessions are searched newest first (`registered`, then id) and steps
/// within a session newest first (`recorded_at`, then id). The first step
/// of a type with non-empty selected values wins; skipped steps and steps
/// without selected values never contribute. Types whose winning step holds
/// none of the recommended keys are left out.
pub fn recommended_settings(
    registry: &StepRegistry,
    sessions: &[CalibrationSession],
) -> Vec<RecommendedStep> {
    let mut ordered: Vec<&CalibrationSession> = sessions.iter().collect();
    ordered.sort_by_key(|s| Reverse((s.registered, s.id)));

    let mut winners: HashMap<StepType, &StepResult> = HashMap::new();
    for session in ordered {
        let mut steps: Vec<&StepResult> = session.steps.iter().collect();
        steps.sort_by_key(|s| Reverse((s.recorded_at, s.id)));
        for step in steps {
            if step.is_skipped() || !step.has_selected_values() {
                continue;
            }
            winners.entry(step.step_type).or_insert(step);
        }
    }

    WIZARD_STEPS
        .iter()
        .filter_map(|step_type| {
            let step = winners.get(step_type)?;
            let selected = step.selected_values.as_ref()?;
            let values: Vec<RecommendedValue> = registry
                .schema(*step_type)
                .recommended_fields()
                .filter_map(|field| {
                    let value = selected.get(&field.key).filter(|v| !v.is_null())?;
                    Some(RecommendedValue {
                        key: field.key.clone(),
                        label: field.label.clone(),
                        unit: field.unit.clone(),
                        value: value.clone(),
                        display: display_value(field, value),
                    })
                })
                .collect();
            if values.is_empty() {
                return None;
            }
            Some(RecommendedStep {
                step_type: *step_type,
                title: registry.copy(*step_type).title.clone(),
                session_id: step.session_id,
                step_id: step.id,
                recorded_at: step.recorded_at,
                values,
            })
        })
        .collect()
}

/// Render a stored value the way its field presents it.
pub fn display_value(field: &FieldSchema, value: &Value) -> String {
    let text = match (field.kind, value) {
        (FieldKind::Select, Value::String(s)) => field.option_label(s).unwrap_or(s).to_string(),
        (FieldKind::Boolean, Value::Bool(b)) => if *b { "Yes" } else { "No" }.to_string(),
        (_, Value::Number(n)) => match n.as_f64() {
            Some(f) => format_number(f, field.precision),
            None => n.to_string(),
        },
        (_, Value::String(s)) => s.clone(),
        (_, other) => other.to_string(),
    };
    match field.unit {
        Some(ref unit) if !unit.is_empty() => format!("{} {}", text, unit),
        _ => text,
    }
}

/// Round to `precision` decimals and drop trailing zeros.
pub fn format_number(value: f64, precision: Option<u32>) -> String {
    let text = match precision {
        Some(p) => format!("{:.*}", p as usize, round_half_up(value, p)),
        None => value.to_string(),
    };
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

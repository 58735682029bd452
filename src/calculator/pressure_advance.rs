use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::formulas::PA_METHOD_PATTERN;
use crate::session::FieldValues;

/// Input key holding the pressure-advance test method.
pub const PA_METHOD_KEY: &str = "method";

/// Pressure-advance test method. Only the tower derives the value from a
/// measurement; the pattern value is read off the print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaMethod {
    #[default]
    Tower,
    Pattern,
}

impl PaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaMethod::Tower => "tower",
            PaMethod::Pattern => PA_METHOD_PATTERN,
        }
    }

    /// Method recorded in a step's inputs; tower when absent.
    pub fn from_inputs(inputs: &FieldValues) -> Self {
        match inputs.get(PA_METHOD_KEY).and_then(Value::as_str) {
            Some(PA_METHOD_PATTERN) => PaMethod::Pattern,
            _ => PaMethod::Tower,
        }
    }

    pub fn write_to(&self, inputs: &mut FieldValues) {
        inputs.insert(
            PA_METHOD_KEY.to_string(),
            Value::String(self.as_str().to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_through_inputs() {
        let mut inputs = FieldValues::new();
        assert_eq!(PaMethod::from_inputs(&inputs), PaMethod::Tower);

        PaMethod::Pattern.write_to(&mut inputs);
        assert_eq!(inputs["method"], json!("pattern"));
        assert_eq!(PaMethod::from_inputs(&inputs), PaMethod::Pattern);
    }
}

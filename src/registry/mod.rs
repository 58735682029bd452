//! Static per-step configuration: field schema, display copy, wizard order
//! and auto-compute formulas.
//!
//! The field schema and copy tables are TOML documents compiled into the
//! binary (`config/step_fields.toml`, `config/step_copy.toml`). Either can be
//! replaced from a file at runtime; a replacement must still describe all nine
//! step types.
//!
//! # Example
//!
//! ```ignore
//! use filament_calibration::registry::StepRegistry;
//! use filament_calibration::session::StepType;
//!
//! let registry = StepRegistry::builtin();
//! let schema = registry.schema(StepType::Tolerance);
//! for field in schema.inputs() {
//!     println!("{} ({:?})", field.label, field.unit);
//! }
//! ```

pub mod formulas;
pub mod order;
mod types;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use crate::session::{FieldValues, StepType};

pub use order::WIZARD_STEPS;
pub use types::*;

const DEFAULT_FIELDS: &str = include_str!("../../config/step_fields.toml");
const DEFAULT_COPY: &str = include_str!("../../config/step_copy.toml");

/// Parse a field schema table.
pub fn parse_fields(content: &str) -> Result<HashMap<StepType, StepSchema>> {
    let config: FieldsConfig = toml::from_str(content)?;
    let mut schemas = HashMap::new();

    for (name, step) in config.steps {
        let step_type: StepType = name.parse()?;
        let schema = StepSchema {
            step_type,
            fields: step.fields,
            recommended_keys: step.recommended_keys,
        };
        validate_schema(&schema)?;
        schemas.insert(step_type, schema);
    }

    for step_type in StepType::ALL {
        if !schemas.contains_key(&step_type) {
            bail!("Field schema is missing step '{}'", step_type);
        }
    }
    Ok(schemas)
}

/// Parse a step copy table.
pub fn parse_copy(content: &str) -> Result<HashMap<StepType, StepCopy>> {
    let config: CopyConfig = toml::from_str(content)?;
    let mut copy = HashMap::new();
    for (name, entry) in config {
        copy.insert(name.parse::<StepType>()?, entry);
    }
    for step_type in StepType::ALL {
        if !copy.contains_key(&step_type) {
            bail!("Step copy is missing step '{}'", step_type);
        }
    }
    Ok(copy)
}

fn validate_schema(schema: &StepSchema) -> Result<()> {
    let mut seen = HashSet::new();
    for field in &schema.fields {
        if !seen.insert(field.key.as_str()) {
            bail!("Step '{}' declares field '{}' twice", schema.step_type, field.key);
        }
        if field.kind == FieldKind::Select && field.options.is_empty() {
            bail!(
                "Select field '{}' of step '{}' has no options",
                field.key,
                schema.step_type
            );
        }
        if let (Some(min), Some(max)) = (field.min, field.max) {
            if min > max {
                bail!("Field '{}' has min {} above max {}", field.key, min, max);
            }
        }
    }
    for key in &schema.recommended_keys {
        match schema.field(key) {
            Some(f) if f.section == Section::Outputs => {}
            _ => bail!(
                "Recommended key '{}' of step '{}' is not an output field",
                key,
                schema.step_type
            ),
        }
    }
    Ok(())
}

/// Lookup table of schema and copy for every step type.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    schemas: HashMap<StepType, StepSchema>,
    copy: HashMap<StepType, StepCopy>,
}

impl StepRegistry {
    /// The tables embedded in the binary.
    ///
    /// # Panics
    /// Panics if the embedded TOML is invalid (this would be a compile-time bug).
    pub fn builtin() -> Self {
        Self {
            schemas: parse_fields(DEFAULT_FIELDS)
                .expect("embedded step_fields.toml must be a valid schema"),
            copy: parse_copy(DEFAULT_COPY).expect("embedded step_copy.toml must be valid"),
        }
    }

    /// Built-in tables, each optionally replaced from a file.
    pub fn load(fields_path: Option<&Path>, copy_path: Option<&Path>) -> Result<Self> {
        let mut registry = Self::builtin();
        if let Some(path) = fields_path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read field schema {:?}", path))?;
            registry.schemas = parse_fields(&content)?;
            info!("Loaded step field schema from {:?}", path);
        }
        if let Some(path) = copy_path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read step copy {:?}", path))?;
            registry.copy = parse_copy(&content)?;
            info!("Loaded step copy from {:?}", path);
        }
        Ok(registry)
    }

    pub fn schema(&self, step_type: StepType) -> &StepSchema {
        // Every step type is present after parse_fields.
        &self.schemas[&step_type]
    }

    pub fn copy(&self, step_type: StepType) -> &StepCopy {
        &self.copy[&step_type]
    }

    /// Outputs derivable from the inputs of a step.
    pub fn compute(&self, step_type: StepType, inputs: &FieldValues) -> FieldValues {
        formulas::compute(step_type, inputs)
    }

    /// Field of a step by key, or an error naming both.
    pub fn field(&self, step_type: StepType, key: &str) -> Result<&FieldSchema> {
        self.schema(step_type)
            .field(key)
            .ok_or_else(|| anyhow!("Step '{}' has no field '{}'", step_type, key))
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_steps() {
        let registry = StepRegistry::builtin();
        for step_type in StepType::ALL {
            let schema = registry.schema(step_type);
            assert_eq!(schema.step_type, step_type);
            assert!(
                !schema.recommended_keys.is_empty(),
                "{} should have recommended keys",
                step_type
            );
            assert!(!registry.copy(step_type).title.is_empty());
            assert!(registry
                .copy(step_type)
                .reference_url
                .starts_with("https://"));
        }
    }

    #[test]
    fn test_formula_fields_exist_in_schema() {
        let registry = StepRegistry::builtin();
        let expected = [
            (StepType::VolumetricSpeed, vec!["start_speed", "measured_height", "step_size", "max_volumetric_speed"]),
            (StepType::PressureAdvance, vec!["method", "pa_step_a", "measured_height_b", "pressure_advance"]),
            (StepType::Retraction, vec!["start_retract", "measured_height", "factor", "retraction_length"]),
            (StepType::Tolerance, vec!["test_size", "measured_size", "tolerance_offset"]),
            (StepType::FlowRate, vec!["flow_ratio"]),
            (StepType::Vfa, vec!["min_avoidance_speed", "max_avoidance_speed"]),
        ];
        for (step_type, keys) in expected {
            for key in keys {
                assert!(
                    registry.field(step_type, key).is_ok(),
                    "{} should declare {}",
                    step_type,
                    key
                );
            }
        }
    }

    #[test]
    fn test_select_fields_have_labels() {
        let registry = StepRegistry::builtin();
        let method = registry.field(StepType::PressureAdvance, "method").unwrap();
        assert_eq!(method.kind, FieldKind::Select);
        assert_eq!(method.option_label("pattern"), Some("Pattern"));
        assert_eq!(method.default, Some(serde_json::json!("tower")));
    }

    #[test]
    fn test_parse_fields_rejects_missing_step() {
        let content = r#"
            [steps.temperature]
            recommended_keys = ["temperature"]

            [[steps.temperature.fields]]
            key = "temperature"
            label = "Nozzle temperature"
            type = "number"
            section = "outputs"
        "#;
        let err = parse_fields(content).unwrap_err();
        assert!(err.to_string().contains("missing step"), "{}", err);
    }

    #[test]
    fn test_parse_fields_rejects_recommended_input() {
        let mut content = DEFAULT_FIELDS.to_string();
        content = content.replace(
            "recommended_keys = [\"tolerance_offset\"]",
            "recommended_keys = [\"test_size\"]",
        );
        let err = parse_fields(&content).unwrap_err();
        assert!(err.to_string().contains("not an output field"), "{}", err);
    }

    #[test]
    fn test_load_custom_copy_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("copy.toml");
        let content = DEFAULT_COPY.replace("title = \"Tolerance\"", "title = \"Toleranz\"");
        std::fs::write(&path, content).unwrap();

        let registry = StepRegistry::load(None, Some(&path)).unwrap();
        assert_eq!(registry.copy(StepType::Tolerance).title, "Toleranz");
        assert_eq!(registry.copy(StepType::Vfa).title, "Vertical fine artifacts");
    }
}

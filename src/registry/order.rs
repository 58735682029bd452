use crate::session::StepType;

/// Canonical wizard sequence, following the OrcaSlicer calibration guide.
pub const WIZARD_STEPS: [StepType; 9] = [
    StepType::Temperature,
    StepType::FlowRate,
    StepType::PressureAdvance,
    StepType::Retraction,
    StepType::Tolerance,
    StepType::VolumetricSpeed,
    StepType::Cornering,
    StepType::InputShaping,
    StepType::Vfa,
];

pub fn position(step_type: StepType) -> usize {
    WIZARD_STEPS
        .iter()
        .position(|t| *t == step_type)
        .unwrap_or(WIZARD_STEPS.len())
}

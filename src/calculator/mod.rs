//! Interactive helpers attached to individual steps: the flow-rate
//! calculator, the VFA artifact-speed list and the pressure-advance method
//! switch. Their state is transient and owned by the active step.

pub mod flow_rate;
pub mod pressure_advance;
pub mod vfa;

pub use flow_rate::{FlowMethod, FlowPhase, FlowRateCalculator, FLOW_RATIO_KEY};
pub use pressure_advance::PaMethod;
pub use vfa::ArtifactSpeeds;

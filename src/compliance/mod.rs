pub mod domain;
pub mod engine;
pub mod error;
pub mod gate;
pub mod instantiate;
pub mod progress;
pub mod store;
pub mod templates;
pub mod transitions;
mod unlock;

pub use domain::{
    validate_step_specs, ChecklistItemState, ComplianceStep, ComplianceTemplate, Deliverable,
    NewTemplate, StepChainRecord, StepData, StepSpec, StepStatus, StepType,
};
pub use engine::ComplianceEngine;
pub use error::ComplianceError;
pub use gate::{Actor, ActorRole, ApprovalGate};
pub use instantiate::{build_step_chain, template_digest};
pub use progress::{compute_rollup, round_percent, ProgressRollup};
pub use store::ComplianceStore;
pub use transitions::{TransitionOutcome, TransitionPolicy};

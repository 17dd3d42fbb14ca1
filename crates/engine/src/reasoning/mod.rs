//! The Observe → Reason → Act scheduler and its tick result types

mod plan;
mod r#loop;

pub use plan::{
    ActionPlan, ActionPlanSummary, LoopPhase, LoopStatus, Observation, ProposedAction, Reasoning,
    ReasoningSummary,
};
pub use r#loop::{LoopConfig, ReasoningLoop};

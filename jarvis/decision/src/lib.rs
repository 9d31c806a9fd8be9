#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Decision engine: gates on analysis confidence, maps intents to actions
//! through ordered rule tables, checks resources, and derives execution
//! parameters.

/// Action vocabulary handed to the executor.
pub mod action;
/// Decision pipeline.
pub mod engine;
/// Ordered predicate tables for action refinement, strategy and priority.
pub mod rules;

pub use action::{format_estimated_time, ActionType, DecisionAction, ExecutionStrategy};
pub use engine::{DecisionEngine, DecisionError};
pub use rules::{PriorityFactors, RuleContext};

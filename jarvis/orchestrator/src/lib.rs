#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Runtime facade for the Jarvis decision core.
//!
//! [`JarvisRuntime`] chains parser, context analyzer and decision engine
//! behind `interpret`, keeps the memory store current from executor
//! feedback, and feeds the learning engine. [`Scheduler`] runs memory
//! cleanup and learning recomputation on fixed intervals.

/// Error taxonomy.
pub mod error;
/// Runtime wiring and facade operations.
pub mod runtime;
/// Background cleanup and learning jobs.
pub mod scheduler;

pub use error::JarvisError;
pub use runtime::{Interpretation, JarvisRuntime, Outcome, RuntimeBuilder};
pub use scheduler::{Job, Scheduler, SchedulerHandle};

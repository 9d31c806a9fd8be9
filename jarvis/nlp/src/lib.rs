#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Operator command parsing: free text in, structured command out.

/// Parsed command model and situational context.
pub mod command;
/// Keyword tables compiled once into case-insensitive matchers.
pub mod lexicon;
/// The parser itself.
pub mod parser;

pub use command::{
    Constraint, ContextPriority, ContextScope, DefaultedFields, ExecutionMode, ParseError,
    ParsedCommand, SituationalContext, Timing, Urgency,
};
pub use lexicon::Lexicon;
pub use parser::CommandParser;

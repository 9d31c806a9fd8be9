#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Shared in-memory store for test lifecycle records, typed memory entries,
//! learning records, and discovered patterns.

/// Bounded rolling buffers.
pub mod bounded;
/// Record types kept by the store.
pub mod records;
/// The store itself.
pub mod store;

pub use bounded::{BoundedLog, Timestamped};
pub use records::{
    ActiveTest, FailureSeverity, FailureType, LearningRecord, LearningRecordType, MemoryEntry,
    MemoryType, Pattern, TestFailure, TestResult, TestStatus,
};
pub use store::{CleanupReport, MemoryError, MemoryStatistics, MemoryStore};

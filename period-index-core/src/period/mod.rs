//! Temporal indexing module
//!
//! This module provides a thread-safe collection of payloads keyed by
//! identifier and indexed by half-open time period, backed by an
//! augmented red-black interval tree, plus the calendar producers that
//! turn recurring windows into concrete periods.

pub mod calendar;
pub mod collection;
pub mod time;
pub mod tree;

// Re-export public types for convenience
pub use calendar::{ApplicableDays, ContinuousPeriod, FloatingPeriod};
pub use collection::{Action, PeriodCollection, PeriodError};
pub use time::{Instant, MaxEnd, Period};
pub use tree::{PeriodTree, TraversalOrder};

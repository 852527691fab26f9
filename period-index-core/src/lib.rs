//! Core functionality for temporal indexing over half-open time periods.
//!
//! The crate stores arbitrary payloads keyed by an external identifier and
//! associated with a [`period::Period`], and answers point-in-time and
//! interval-overlap queries through an augmented red-black interval tree.

pub mod period;

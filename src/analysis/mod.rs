//! Post-processing of agent results.
//!
//! Consolidation into a single report lives in [`aggregator`].

pub mod aggregator;

pub use aggregator::{consolidate, format_duration, most_affected_files, polish_summary};

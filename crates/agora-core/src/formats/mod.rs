//! # Formats
//!
//! Byte-level encodings of engine data.

pub mod persistence;

pub use persistence::{MAX_SUMMARY_SIZE, SummaryHeader, summary_from_bytes, summary_to_bytes};

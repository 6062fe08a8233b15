//! # Storage
//!
//! Disk-backed persistence for finished runs.

pub mod run_archive;

pub use run_archive::RunArchive;

//! # agora
//!
//! Command-line front end for the Agora engine: configuration, the ROI
//! directory candidate source, summary files and the run archive.

pub mod cli;
pub mod config;

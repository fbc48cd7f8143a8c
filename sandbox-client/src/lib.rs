//! # sandbox-client: headless streaming driver
//!
//! Animates a procedural height field, streams it to the processing
//! service once per tick through `sandbox-core`, and records the
//! processed image that comes back.

pub mod config;
pub mod sink;
pub mod surface;

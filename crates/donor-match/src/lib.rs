//! Donor/hospital matching and donation lifecycle engine.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

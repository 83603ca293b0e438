//! cafecoder judge orchestrator
//!
//! This crate provides the core functionality of the judge:
//! - Per-submission Docker sandboxes driven through an in-sandbox agent
//! - The command and completion protocols spoken with that agent
//! - Session-keyed routing of asynchronous completion notices
//! - Compile and test stages with worst-wins verdict aggregation
//! - Result delivery to the backend

pub mod config;
pub mod correlator;
pub mod error;
pub mod intake;
pub mod judge;
pub mod language;
pub mod sandbox;
pub mod transport;

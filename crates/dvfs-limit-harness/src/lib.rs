//! Tooling around the DVFS limit arbiter.
//!
//! This crate provides:
//! - Scenario replay against the in-memory platform
//! - Structured JSONL logging of replays and of the limiter's own records
//! - Log schema validation

#![forbid(unsafe_code)]

pub mod scenario;
pub mod structured_log;

pub use scenario::{Scenario, ScenarioError, ScenarioReport, Step, StepReport, WriteExpect};
pub use structured_log::{JsonlLogger, LogEmitter, LogEntry, LogLevel, Outcome, SharedEmitter};

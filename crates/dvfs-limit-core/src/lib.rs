//! DVFS frequency-limit arbitration.
//!
//! User space holds an optional floor and an optional ceiling on CPU
//! frequency. This crate resolves both against the hardware's discrete table
//! of operating points, settles conflicts between them (the ceiling wins),
//! and keeps two downstream consumers in step:
//! - the CPU frequency-policy layer, whose per-CPU ceiling is clamped through
//!   a registered adjust hook;
//! - a platform QoS requirement, which carries the effective floor.
//!
//! # Architecture
//!
//! - **Frequency table** (`freq_table`): ordered operating points and nearest-level lookup
//! - **Constraint store** (`constraint`): both bounds behind one lock, five-phase state
//! - **Arbitration engine** (`arbiter`): `request_min` / `request_max` and the priority rule
//! - **Policy projector** (`projector`): adjust hook and per-CPU republish
//! - **QoS channel** (`qos`): interface to the platform requirement aggregator
//! - **Attributes** (`endpoint`): text grammar of `cpufreq_{table,max_limit,min_limit}`
//! - **Lifecycle** (`limiter`): registration, teardown and the attribute surface
//! - **Configuration** (`config`) and **metrics** (`metrics`)
//! - **In-memory platform** (`sim`): policy layer and QoS channel for tooling and tests

#![deny(unsafe_code)]

pub mod arbiter;
pub mod config;
pub mod constraint;
pub mod endpoint;
pub mod error;
pub mod freq_table;
pub mod limiter;
pub mod metrics;
pub mod projector;
pub mod qos;
pub mod sim;

pub use arbiter::{ArbitrationEngine, Bound, RequestOutcome, UNLOCK};
pub use config::LimiterConfig;
pub use constraint::{ConstraintStore, LimitPhase, LimitSnapshot, Lock};
pub use endpoint::LimitAttribute;
pub use error::{ArbError, ArbResult, InvalidRequest};
pub use freq_table::{Direction, Frequency, FrequencyTable, HardwareLimits, TableEntry};
pub use limiter::DvfsLimiter;
pub use projector::{CpuId, CpuPolicy, CpufreqHost, PolicyEvent, PolicyProjector};
pub use qos::{QosChannel, QosRequest};

//! Platform QoS requirement channel.
//!
//! The platform aggregates named requirements into a single CPU frequency
//! floor. This crate owns one requirement and only ever pushes the resolved
//! floor into it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::freq_table::Frequency;

/// Value of the floor requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosRequest {
    /// No floor contributed by this requirement.
    #[default]
    Default,
    Khz(u32),
}

impl QosRequest {
    #[must_use]
    pub const fn at(freq: Frequency) -> Self {
        Self::Khz(freq.khz())
    }
}

impl fmt::Display for QosRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Khz(khz) => write!(f, "{khz} kHz"),
        }
    }
}

/// External requirement-aggregation mechanism.
///
/// Implementations must not block: pushes happen while the constraint store
/// is held exclusively.
pub trait QosChannel: Send + Sync {
    fn add_requirement(&self, name: &str, value: QosRequest);
    fn update_requirement(&self, name: &str, value: QosRequest);
    fn remove_requirement(&self, name: &str);
}

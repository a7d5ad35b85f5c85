//! Error taxonomy for limit requests.

use thiserror::Error;

use crate::freq_table::Direction;

/// Why a limit request was rejected without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("malformed value, expected a decimal integer")]
    Malformed,
    #[error("{0} is below -1")]
    BelowUnlock(i32),
    #[error("no operating point {direction} {requested} kHz")]
    Unresolvable { requested: u32, direction: Direction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArbError {
    #[error("invalid limit request: {0}")]
    InvalidRequest(#[from] InvalidRequest),
    #[error("cpufreq frequency table is not available")]
    TableUnavailable,
    #[error("{0} is read-only")]
    ReadOnly(&'static str),
}

pub type ArbResult<T> = Result<T, ArbError>;

//! Text grammar of the control-plane attributes.
//!
//! - `cpufreq_max_limit` / `cpufreq_min_limit`: write a decimal integer,
//!   `-1` to release; read back the raw requested value or `-1`, newline
//!   terminated.
//! - `cpufreq_table`: read-only; valid operating points within the policy
//!   CPU's hardware range, highest first, space separated, newline terminated.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::arbiter::{Bound, UNLOCK};
use crate::constraint::Lock;
use crate::error::{ArbError, InvalidRequest};
use crate::freq_table::{FrequencyTable, HardwareLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitAttribute {
    #[serde(rename = "cpufreq_table")]
    CpufreqTable,
    #[serde(rename = "cpufreq_max_limit")]
    CpufreqMaxLimit,
    #[serde(rename = "cpufreq_min_limit")]
    CpufreqMinLimit,
}

impl LimitAttribute {
    pub const ALL: [Self; 3] = [
        Self::CpufreqTable,
        Self::CpufreqMaxLimit,
        Self::CpufreqMinLimit,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CpufreqTable => "cpufreq_table",
            Self::CpufreqMaxLimit => "cpufreq_max_limit",
            Self::CpufreqMinLimit => "cpufreq_min_limit",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.name() == name)
    }

    /// Bound controlled by this attribute, `None` for the table.
    #[must_use]
    pub const fn bound(self) -> Option<Bound> {
        match self {
            Self::CpufreqTable => None,
            Self::CpufreqMaxLimit => Some(Bound::Max),
            Self::CpufreqMinLimit => Some(Bound::Min),
        }
    }
}

/// Parse a limit write. Surrounding whitespace (including the trailing
/// newline `echo` adds) is ignored; anything else must be a decimal `i32`.
pub fn parse_limit(buf: &str) -> Result<i32, ArbError> {
    buf.trim()
        .parse::<i32>()
        .map_err(|_| ArbError::InvalidRequest(InvalidRequest::Malformed))
}

#[must_use]
pub fn show_limit(lock: Option<Lock>) -> String {
    match lock {
        Some(lock) => format!("{}\n", lock.requested),
        None => format!("{UNLOCK}\n"),
    }
}

/// Render the table attribute. Without hardware limits nothing is in range.
#[must_use]
pub fn show_table(table: &FrequencyTable, cpuinfo: Option<HardwareLimits>) -> String {
    let mut out = String::new();
    if let Some(limits) = cpuinfo {
        for (i, freq) in table.descending_within(limits).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}", freq.khz());
        }
    }
    out.push('\n');
    out
}

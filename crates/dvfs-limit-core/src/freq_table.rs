//! Frequency table index.
//!
//! Read-only view over the hardware's ordered list of operating points.
//! Entries are stored lowest first; invalid entries are kept in place so
//! indices line up with what the platform driver reports, and are skipped by
//! every lookup.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::projector::CpuId;

/// A CPU operating frequency in kHz.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Frequency(u32);

impl Frequency {
    #[must_use]
    pub const fn from_khz(khz: u32) -> Self {
        Self(khz)
    }

    #[must_use]
    pub const fn khz(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the operating-point table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEntry {
    Valid(Frequency),
    /// Placeholder for an operating point the platform disabled.
    Invalid,
}

impl TableEntry {
    #[must_use]
    pub const fn frequency(self) -> Option<Frequency> {
        match self {
            Self::Valid(f) => Some(f),
            Self::Invalid => None,
        }
    }
}

/// Which way to round a request onto the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest entry not below the request. Used to resolve floors.
    AtOrAbove,
    /// Largest entry not above the request. Used to resolve ceilings.
    AtOrBelow,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtOrAbove => f.write_str("at or above"),
            Self::AtOrBelow => f.write_str("at or below"),
        }
    }
}

/// Errors building a [`FrequencyTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("frequency table has no valid operating points")]
    NoValidEntries,
    #[error("frequency table entry {index} does not ascend")]
    NotAscending { index: usize },
}

/// Hardware (cpuinfo) frequency range reported for a CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareLimits {
    pub min: Frequency,
    pub max: Frequency,
}

impl HardwareLimits {
    #[must_use]
    pub fn contains(self, freq: Frequency) -> bool {
        (self.min..=self.max).contains(&freq)
    }
}

/// Immutable, ascending table of operating points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<TableEntry>,
}

impl FrequencyTable {
    /// Build a table, checking that valid entries strictly ascend.
    pub fn new(entries: Vec<TableEntry>) -> Result<Self, TableError> {
        let mut last: Option<Frequency> = None;
        for (index, entry) in entries.iter().enumerate() {
            let Some(freq) = entry.frequency() else {
                continue;
            };
            if last.is_some_and(|prev| freq <= prev) {
                return Err(TableError::NotAscending { index });
            }
            last = Some(freq);
        }
        if last.is_none() {
            return Err(TableError::NoValidEntries);
        }
        Ok(Self { entries })
    }

    /// Convenience constructor from raw kHz values, `None` marking an invalid row.
    pub fn from_khz<I>(raw: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = Option<u32>>,
    {
        Self::new(
            raw.into_iter()
                .map(|khz| khz.map_or(TableEntry::Invalid, |k| TableEntry::Valid(Frequency(k))))
                .collect(),
        )
    }

    #[must_use]
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Valid operating points, lowest first.
    pub fn valid(&self) -> impl DoubleEndedIterator<Item = Frequency> + '_ {
        self.entries.iter().filter_map(|e| e.frequency())
    }

    /// Nearest valid operating point in `direction` from `freq`.
    #[must_use]
    pub fn nearest(&self, freq: Frequency, direction: Direction) -> Option<Frequency> {
        match direction {
            Direction::AtOrAbove => self.valid().find(|&f| f >= freq),
            Direction::AtOrBelow => self.valid().rev().find(|&f| f <= freq),
        }
    }

    #[must_use]
    pub fn highest_valid(&self) -> Option<Frequency> {
        self.valid().next_back()
    }

    #[must_use]
    pub fn lowest_valid(&self) -> Option<Frequency> {
        self.valid().next()
    }

    /// Valid operating points inside `limits`, highest first.
    pub fn descending_within(
        &self,
        limits: HardwareLimits,
    ) -> impl Iterator<Item = Frequency> + '_ {
        self.valid().rev().filter(move |&f| limits.contains(f))
    }
}

/// Provider of per-CPU frequency tables.
///
/// The table belongs to the platform's frequency-policy layer. It can be
/// missing while that layer is still coming up, which callers see as `None`.
pub trait TableSource: Send + Sync {
    fn frequency_table(&self, cpu: CpuId) -> Option<Arc<FrequencyTable>>;
}

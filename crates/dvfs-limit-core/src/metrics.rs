//! Atomic counters for limiter observability.
//!
//! Relaxed ordering throughout: the counters are diagnostic only.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::arbiter::Bound;

#[derive(Debug)]
pub struct LimiterMetrics {
    /// Floor requests received, including unlocks and rejected ones.
    pub min_requests: AtomicU64,
    /// Ceiling requests received, including unlocks and rejected ones.
    pub max_requests: AtomicU64,
    pub locks: AtomicU64,
    pub unlocks: AtomicU64,
    /// Unlocks of a bound that was not held.
    pub ignored_unlocks: AtomicU64,
    pub invalid_requests: AtomicU64,
    pub table_unavailable: AtomicU64,
    /// Transitions into the replaced phase.
    pub min_replacements: AtomicU64,
    pub qos_updates: AtomicU64,
    /// Per-CPU policy recomputes triggered after a ceiling change.
    pub policy_republishes: AtomicU64,
    /// Adjust notifications handled by the projector.
    pub policy_adjusts: AtomicU64,
    /// Adjust notifications that lowered a policy ceiling.
    pub policy_clamps: AtomicU64,
}

impl LimiterMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_requests: AtomicU64::new(0),
            max_requests: AtomicU64::new(0),
            locks: AtomicU64::new(0),
            unlocks: AtomicU64::new(0),
            ignored_unlocks: AtomicU64::new(0),
            invalid_requests: AtomicU64::new(0),
            table_unavailable: AtomicU64::new(0),
            min_replacements: AtomicU64::new(0),
            qos_updates: AtomicU64::new(0),
            policy_republishes: AtomicU64::new(0),
            policy_adjusts: AtomicU64::new(0),
            policy_clamps: AtomicU64::new(0),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Request counter for `bound`.
    #[must_use]
    pub fn requests(&self, bound: Bound) -> &AtomicU64 {
        match bound {
            Bound::Min => &self.min_requests,
            Bound::Max => &self.max_requests,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            min_requests: Self::get(&self.min_requests),
            max_requests: Self::get(&self.max_requests),
            locks: Self::get(&self.locks),
            unlocks: Self::get(&self.unlocks),
            ignored_unlocks: Self::get(&self.ignored_unlocks),
            invalid_requests: Self::get(&self.invalid_requests),
            table_unavailable: Self::get(&self.table_unavailable),
            min_replacements: Self::get(&self.min_replacements),
            qos_updates: Self::get(&self.qos_updates),
            policy_republishes: Self::get(&self.policy_republishes),
            policy_adjusts: Self::get(&self.policy_adjusts),
            policy_clamps: Self::get(&self.policy_clamps),
        }
    }
}

impl Default for LimiterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub min_requests: u64,
    pub max_requests: u64,
    pub locks: u64,
    pub unlocks: u64,
    pub ignored_unlocks: u64,
    pub invalid_requests: u64,
    pub table_unavailable: u64,
    pub min_replacements: u64,
    pub qos_updates: u64,
    pub policy_republishes: u64,
    pub policy_adjusts: u64,
    pub policy_clamps: u64,
}

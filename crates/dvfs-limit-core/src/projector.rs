//! Policy projector.
//!
//! Projects the resolved ceiling onto every CPU's frequency policy. The
//! platform's policy layer calls [`PolicyAdjustHook::on_policy_event`] once
//! per CPU whenever it recomputes a policy: on hotplug, on governor changes,
//! and after the arbitration engine asks for a republish.
//!
//! # Re-entrancy
//!
//! The hook may run on several CPUs at once and concurrently with a limit
//! request. It only takes the constraint store's read lock, never blocks on
//! anything else, does not allocate, and has no handle back to the
//! arbitration engine, so it cannot start a new request from inside a
//! notification.

use std::fmt;
use std::sync::Arc;

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::config::DebugMask;
use crate::constraint::ConstraintStore;
use crate::freq_table::{Frequency, HardwareLimits, TableSource};
use crate::metrics::LimiterMetrics;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Frequency policy of one CPU while it is being recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuPolicy {
    pub cpu: CpuId,
    pub min: Frequency,
    pub max: Frequency,
    pub cpuinfo: HardwareLimits,
}

impl CpuPolicy {
    /// Policy spanning the full hardware range.
    #[must_use]
    pub const fn from_hardware(cpu: CpuId, cpuinfo: HardwareLimits) -> Self {
        Self {
            cpu,
            min: cpuinfo.min,
            max: cpuinfo.max,
            cpuinfo,
        }
    }
}

/// Stages of a policy recompute, in the order the policy layer emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyEvent {
    /// Listeners may narrow the policy.
    Adjust,
    /// Listeners may resolve a policy the hardware cannot honour.
    Incompatible,
    /// The policy is final.
    Notify,
}

/// Listener registered with the policy layer.
pub trait PolicyAdjustHook: Send + Sync {
    fn on_policy_event(&self, event: PolicyEvent, policy: &mut CpuPolicy);
}

/// Registration handle returned by [`CpufreqHost::register_policy_notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifierId(pub u64);

/// The platform's CPU frequency-policy layer, as seen by this crate.
pub trait CpufreqHost: TableSource {
    /// Hardware range of `cpu`, or `None` if it has no policy.
    fn cpuinfo(&self, cpu: CpuId) -> Option<HardwareLimits>;

    fn online_cpus(&self) -> Vec<CpuId>;

    /// Recompute the policy of `cpu`, running every registered hook.
    fn update_policy(&self, cpu: CpuId);

    fn register_policy_notifier(&self, hook: Arc<dyn PolicyAdjustHook>) -> NotifierId;

    fn unregister_policy_notifier(&self, id: NotifierId);
}

pub struct PolicyProjector {
    store: Arc<ConstraintStore>,
    host: Arc<dyn CpufreqHost>,
    table_cpu: CpuId,
    metrics: Arc<LimiterMetrics>,
    debug: Arc<DebugMask>,
}

impl PolicyProjector {
    #[must_use]
    pub fn new(
        store: Arc<ConstraintStore>,
        host: Arc<dyn CpufreqHost>,
        table_cpu: CpuId,
        metrics: Arc<LimiterMetrics>,
        debug: Arc<DebugMask>,
    ) -> Self {
        Self {
            store,
            host,
            table_cpu,
            metrics,
            debug,
        }
    }

    /// Clamp `policy`'s ceiling against the stored max limit.
    ///
    /// With a ceiling held, the policy max is lowered to it (never raised).
    /// Without one, the policy max goes back to the table's highest valid
    /// operating point. A missing table skips this cycle.
    pub fn on_policy_adjust(&self, policy: &mut CpuPolicy) {
        LimiterMetrics::inc(&self.metrics.policy_adjusts);

        match self.store.max_limit() {
            Some(limit) => {
                if policy.max > limit {
                    if self.debug.enabled() {
                        debug!("{}: policy max {} clamped to {limit}", policy.cpu, policy.max);
                    }
                    policy.max = limit;
                    LimiterMetrics::inc(&self.metrics.policy_clamps);
                }
            }
            None => {
                let Some(table) = self.host.frequency_table(self.table_cpu) else {
                    error!("{}: failed to get the cpufreq table", policy.cpu);
                    LimiterMetrics::inc(&self.metrics.table_unavailable);
                    return;
                };
                if let Some(top) = table.highest_valid() {
                    policy.max = top;
                }
            }
        }
    }

    /// Ask the policy layer to recompute every online CPU.
    ///
    /// Callers must not hold the constraint store: the recompute runs
    /// [`Self::on_policy_adjust`] synchronously, which takes the read lock.
    pub fn republish(&self) {
        for cpu in self.host.online_cpus() {
            LimiterMetrics::inc(&self.metrics.policy_republishes);
            self.host.update_policy(cpu);
        }
    }
}

impl PolicyAdjustHook for PolicyProjector {
    fn on_policy_event(&self, event: PolicyEvent, policy: &mut CpuPolicy) {
        if event == PolicyEvent::Adjust {
            self.on_policy_adjust(policy);
        }
    }
}

impl fmt::Debug for PolicyProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyProjector")
            .field("table_cpu", &self.table_cpu)
            .field("max_limit", &self.store.max_limit())
            .finish_non_exhaustive()
    }
}

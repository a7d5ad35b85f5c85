//! In-memory platform: frequency-policy layer and QoS channel.
//!
//! Used by the harness to replay scenarios and by tests and benches. The
//! policy layer behaves like the real one in the ways the limiter relies on:
//! every recompute starts from the CPU's hardware range and runs the
//! registered hooks synchronously through Adjust, Incompatible and Notify.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::freq_table::{FrequencyTable, HardwareLimits, TableSource};
use crate::projector::{CpuId, CpuPolicy, CpufreqHost, NotifierId, PolicyAdjustHook, PolicyEvent};
use crate::qos::{QosChannel, QosRequest};

#[derive(Debug, Clone, Copy)]
struct SimCpu {
    online: bool,
    policy: CpuPolicy,
}

pub struct SimCpufreq {
    table: RwLock<Option<Arc<FrequencyTable>>>,
    cpus: Mutex<BTreeMap<CpuId, SimCpu>>,
    hooks: RwLock<Vec<(NotifierId, Arc<dyn PolicyAdjustHook>)>>,
    /// Held from building a policy until it is stored.
    recompute: Mutex<()>,
    next_notifier: AtomicU64,
    recomputes: AtomicU64,
}

impl SimCpufreq {
    /// Platform with no CPUs. `table` is shared by every CPU.
    #[must_use]
    pub fn new(table: Option<FrequencyTable>) -> Self {
        Self {
            table: RwLock::new(table.map(Arc::new)),
            cpus: Mutex::new(BTreeMap::new()),
            hooks: RwLock::new(Vec::new()),
            recompute: Mutex::new(()),
            next_notifier: AtomicU64::new(1),
            recomputes: AtomicU64::new(0),
        }
    }

    /// Platform with `count` online CPUs whose hardware range spans the table.
    #[must_use]
    pub fn with_cpus(table: FrequencyTable, count: u32) -> Self {
        let span = match (table.lowest_valid(), table.highest_valid()) {
            (Some(min), Some(max)) => Some(HardwareLimits { min, max }),
            _ => None,
        };
        let sim = Self::new(Some(table));
        if let Some(cpuinfo) = span {
            for id in 0..count {
                sim.add_cpu(CpuId(id), cpuinfo);
            }
        }
        sim
    }

    /// Plug in an online CPU and compute its first policy.
    pub fn add_cpu(&self, cpu: CpuId, cpuinfo: HardwareLimits) {
        self.cpus.lock().insert(
            cpu,
            SimCpu {
                online: true,
                policy: CpuPolicy::from_hardware(cpu, cpuinfo),
            },
        );
        self.update_policy(cpu);
    }

    /// Hotplug. Bringing a CPU online recomputes its policy.
    pub fn set_online(&self, cpu: CpuId, online: bool) -> bool {
        let changed = match self.cpus.lock().get_mut(&cpu) {
            Some(state) if state.online != online => {
                state.online = online;
                true
            }
            _ => false,
        };
        if changed && online {
            self.update_policy(cpu);
        }
        changed
    }

    pub fn set_table(&self, table: Option<FrequencyTable>) {
        *self.table.write() = table.map(Arc::new);
    }

    #[must_use]
    pub fn policy(&self, cpu: CpuId) -> Option<CpuPolicy> {
        self.cpus.lock().get(&cpu).map(|state| state.policy)
    }

    #[must_use]
    pub fn notifier_count(&self) -> usize {
        self.hooks.read().len()
    }

    /// Total policy recomputes run so far.
    #[must_use]
    pub fn recomputes(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }
}

impl TableSource for SimCpufreq {
    fn frequency_table(&self, _cpu: CpuId) -> Option<Arc<FrequencyTable>> {
        self.table.read().clone()
    }
}

impl CpufreqHost for SimCpufreq {
    fn cpuinfo(&self, cpu: CpuId) -> Option<HardwareLimits> {
        self.cpus.lock().get(&cpu).map(|state| state.policy.cpuinfo)
    }

    fn online_cpus(&self) -> Vec<CpuId> {
        self.cpus
            .lock()
            .iter()
            .filter(|(_, state)| state.online)
            .map(|(&cpu, _)| cpu)
            .collect()
    }

    fn update_policy(&self, cpu: CpuId) {
        // Recomputes of one policy must not interleave: a stale result stored
        // last would stick until the next ceiling change.
        let _recompute = self.recompute.lock();
        let cpuinfo = match self.cpus.lock().get(&cpu) {
            Some(state) if state.online => state.policy.cpuinfo,
            _ => return,
        };
        let hooks: Vec<Arc<dyn PolicyAdjustHook>> = self
            .hooks
            .read()
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();

        let mut policy = CpuPolicy::from_hardware(cpu, cpuinfo);
        for event in [PolicyEvent::Adjust, PolicyEvent::Incompatible, PolicyEvent::Notify] {
            for hook in &hooks {
                hook.on_policy_event(event, &mut policy);
            }
        }

        self.recomputes.fetch_add(1, Ordering::Relaxed);
        if let Some(state) = self.cpus.lock().get_mut(&cpu) {
            state.policy = policy;
        }
    }

    fn register_policy_notifier(&self, hook: Arc<dyn PolicyAdjustHook>) -> NotifierId {
        let id = NotifierId(self.next_notifier.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, hook));
        id
    }

    fn unregister_policy_notifier(&self, id: NotifierId) {
        self.hooks.write().retain(|(registered, _)| *registered != id);
    }
}

#[derive(Debug, Default)]
struct QosLog {
    current: BTreeMap<String, QosRequest>,
    /// `None` when only current values are kept.
    updates: Option<Vec<QosRequest>>,
}

/// QoS channel that remembers every update.
#[derive(Debug)]
pub struct RecordingQos {
    log: Mutex<QosLog>,
}

impl Default for RecordingQos {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingQos {
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Mutex::new(QosLog {
                current: BTreeMap::new(),
                updates: Some(Vec::new()),
            }),
        }
    }

    /// Channel that tracks current values without an update history, for
    /// long-running loops.
    #[must_use]
    pub fn current_only() -> Self {
        Self {
            log: Mutex::new(QosLog::default()),
        }
    }

    /// Value currently held by requirement `name`.
    #[must_use]
    pub fn current(&self, name: &str) -> Option<QosRequest> {
        self.log.lock().current.get(name).copied()
    }

    /// Most recent `update_requirement` value, for any name.
    #[must_use]
    pub fn last_update(&self) -> Option<QosRequest> {
        self.log.lock().updates.as_ref()?.last().copied()
    }

    #[must_use]
    pub fn updates(&self) -> Vec<QosRequest> {
        self.log.lock().updates.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn update_count(&self) -> usize {
        self.log.lock().updates.as_ref().map_or(0, Vec::len)
    }
}

impl QosChannel for RecordingQos {
    fn add_requirement(&self, name: &str, value: QosRequest) {
        self.log.lock().current.insert(name.to_string(), value);
    }

    fn update_requirement(&self, name: &str, value: QosRequest) {
        let mut log = self.log.lock();
        match log.current.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                log.current.insert(name.to_string(), value);
            }
        }
        if let Some(updates) = log.updates.as_mut() {
            updates.push(value);
        }
    }

    fn remove_requirement(&self, name: &str) {
        self.log.lock().current.remove(name);
    }
}

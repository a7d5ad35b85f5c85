//! Arbitration engine.
//!
//! Accepts floor (`min`) and ceiling (`max`) requests, resolves them against
//! the frequency table and keeps the constraint store consistent. A request
//! is `-1` (release the bound) or a non-negative frequency in kHz.
//!
//! The ceiling wins every conflict. When a held floor ends up above the held
//! ceiling, the ceiling is published on the QoS channel in place of the floor
//! until either bound moves again; releasing or raising the ceiling then
//! publishes the shadowed floor again.
//!
//! Each request validates, stores and pushes to the QoS channel under the
//! store's write lock. A ceiling change additionally republishes every online
//! CPU's policy, which happens after the lock is released because the policy
//! hook reads the store.

use std::sync::Arc;

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::config::DebugMask;
use crate::constraint::{ArbitrationState, ConstraintStore, LimitPhase, Lock};
use crate::error::{ArbError, ArbResult, InvalidRequest};
use crate::freq_table::{Direction, Frequency, TableSource};
use crate::metrics::LimiterMetrics;
use crate::projector::{CpuId, CpufreqHost, PolicyProjector};
use crate::qos::{QosChannel, QosRequest};

/// Request value that releases a bound.
pub const UNLOCK: i32 = -1;

/// Which of the two bounds a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min,
    Max,
}

impl Bound {
    /// Rounding used to resolve a request for this bound.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Min => Direction::AtOrAbove,
            Self::Max => Direction::AtOrBelow,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Successful result of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestOutcome {
    Locked {
        requested: u32,
        resolved: Frequency,
        phase: LimitPhase,
    },
    Unlocked,
    /// The bound was not held. Nothing changed.
    AlreadyUnlocked,
}

/// Parsed request value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Unlock,
    Lock(u32),
}

impl Request {
    fn from_raw(value: i32) -> Result<Self, InvalidRequest> {
        match value {
            UNLOCK => Ok(Self::Unlock),
            v => u32::try_from(v)
                .map(Self::Lock)
                .map_err(|_| InvalidRequest::BelowUnlock(v)),
        }
    }
}

/// What a request changed, decided under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    outcome: RequestOutcome,
    qos: Option<QosRequest>,
    republish: bool,
    entered_replacement: bool,
}

impl Transition {
    const IGNORED: Self = Self {
        outcome: RequestOutcome::AlreadyUnlocked,
        qos: None,
        republish: false,
        entered_replacement: false,
    };
}

pub struct ArbitrationEngine {
    store: Arc<ConstraintStore>,
    host: Arc<dyn CpufreqHost>,
    qos: Arc<dyn QosChannel>,
    projector: Arc<PolicyProjector>,
    qos_name: String,
    table_cpu: CpuId,
    metrics: Arc<LimiterMetrics>,
    debug: Arc<DebugMask>,
}

impl ArbitrationEngine {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        store: Arc<ConstraintStore>,
        host: Arc<dyn CpufreqHost>,
        qos: Arc<dyn QosChannel>,
        projector: Arc<PolicyProjector>,
        qos_name: impl Into<String>,
        table_cpu: CpuId,
        metrics: Arc<LimiterMetrics>,
        debug: Arc<DebugMask>,
    ) -> Self {
        Self {
            store,
            host,
            qos,
            projector,
            qos_name: qos_name.into(),
            table_cpu,
            metrics,
            debug,
        }
    }

    pub fn request_min(&self, value: i32) -> ArbResult<RequestOutcome> {
        self.request(Bound::Min, value)
    }

    pub fn request_max(&self, value: i32) -> ArbResult<RequestOutcome> {
        self.request(Bound::Max, value)
    }

    pub fn request(&self, bound: Bound, value: i32) -> ArbResult<RequestOutcome> {
        LimiterMetrics::inc(self.metrics.requests(bound));

        let result = self.arbitrate(bound, value);
        match &result {
            Ok(transition) if transition.republish => self.projector.republish(),
            Ok(_) => {}
            Err(err) => error!("cpufreq_{}_limit: {err}", bound.as_str()),
        }
        result.map(|transition| transition.outcome)
    }

    /// Validate, store and publish under the write lock.
    fn arbitrate(&self, bound: Bound, value: i32) -> ArbResult<Transition> {
        let request = Request::from_raw(value).inspect_err(|_| {
            LimiterMetrics::inc(&self.metrics.invalid_requests);
        })?;

        let mut state = self.store.write();
        let transition = match request {
            Request::Unlock => self.release(&mut state, bound),
            Request::Lock(requested) => {
                let resolved = self.resolve(requested, bound)?;
                self.hold(&mut state, bound, Lock { requested, resolved })
            }
        };

        if let Some(floor) = transition.qos {
            self.qos.update_requirement(&self.qos_name, floor);
            state.qos_floor = floor;
            LimiterMetrics::inc(&self.metrics.qos_updates);
        }
        debug_assert!(state.replacement_published());
        drop(state);

        if transition.entered_replacement {
            LimiterMetrics::inc(&self.metrics.min_replacements);
        }
        Ok(transition)
    }

    fn resolve(&self, requested: u32, bound: Bound) -> ArbResult<Frequency> {
        let Some(table) = self.host.frequency_table(self.table_cpu) else {
            LimiterMetrics::inc(&self.metrics.table_unavailable);
            return Err(ArbError::TableUnavailable);
        };
        let direction = bound.direction();
        let resolved = table
            .nearest(Frequency::from_khz(requested), direction)
            .ok_or_else(|| {
                LimiterMetrics::inc(&self.metrics.invalid_requests);
                InvalidRequest::Unresolvable {
                    requested,
                    direction,
                }
            })?;
        if self.debug.enabled() {
            debug!(
                "{}_lock: req_freq({requested}) matched_freq({resolved})",
                bound.as_str()
            );
        }
        Ok(resolved)
    }

    fn release(&self, state: &mut ArbitrationState, bound: Bound) -> Transition {
        let slot = match bound {
            Bound::Min => &mut state.min,
            Bound::Max => &mut state.max,
        };
        if slot.take().is_none() {
            error!("cpufreq_{}_limit: unlock request is ignored", bound.as_str());
            LimiterMetrics::inc(&self.metrics.ignored_unlocks);
            return Transition::IGNORED;
        }
        LimiterMetrics::inc(&self.metrics.unlocks);

        let qos = match bound {
            // Dropping the floor always hands the requirement back to the default.
            Bound::Min => Some(QosRequest::Default),
            // Dropping the ceiling only matters to QoS if it was standing in
            // for a shadowed floor.
            Bound::Max => {
                Some(state.effective_floor()).filter(|&floor| floor != state.qos_floor)
            }
        };
        Transition {
            outcome: RequestOutcome::Unlocked,
            qos,
            republish: bound == Bound::Max,
            entered_replacement: false,
        }
    }

    fn hold(&self, state: &mut ArbitrationState, bound: Bound, lock: Lock) -> Transition {
        let was_replaced = state.min_replaced();
        match bound {
            Bound::Min => state.min = Some(lock),
            Bound::Max => state.max = Some(lock),
        }
        LimiterMetrics::inc(&self.metrics.locks);

        let phase = state.phase();
        let replaced = phase == LimitPhase::BothReplaced;
        if replaced
            && self.debug.enabled()
            && let Some(max) = state.max
        {
            debug!("min lock forced to {} because of max lock", max.resolved);
        }

        let floor = state.effective_floor();
        let qos = match bound {
            Bound::Min => Some(floor),
            // A new ceiling leaves a compatible floor alone; it only publishes
            // when it starts, moves or ends a replacement.
            Bound::Max => Some(floor).filter(|&f| f != state.qos_floor),
        };
        Transition {
            outcome: RequestOutcome::Locked {
                requested: lock.requested,
                resolved: lock.resolved,
                phase,
            },
            qos,
            republish: bound == Bound::Max,
            entered_replacement: replaced && !was_replaced,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ConstraintStore> {
        &self.store
    }
}

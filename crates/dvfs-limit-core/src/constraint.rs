//! Constraint store.
//!
//! Both bounds live in one [`ArbitrationState`] behind one lock, so the pair
//! and the QoS floor published for it are always observed together. Whether
//! the floor is currently shadowed by the ceiling is derived from the two
//! bounds rather than stored, which keeps it from going stale on unlock.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::freq_table::Frequency;
use crate::qos::QosRequest;

/// A held floor or ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Value written by the caller, echoed back on read.
    pub requested: u32,
    /// Table entry the request resolved to.
    pub resolved: Frequency,
}

/// The five states of the (min, max) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPhase {
    Unlocked,
    MinOnly,
    MaxOnly,
    /// Both held and `min <= max`.
    BothCompatible,
    /// Both held and `min > max`; the ceiling also stands in as the floor.
    BothReplaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbitrationState {
    pub min: Option<Lock>,
    pub max: Option<Lock>,
    /// Last value pushed onto the QoS channel.
    pub qos_floor: QosRequest,
}

impl ArbitrationState {
    #[must_use]
    pub fn phase(&self) -> LimitPhase {
        match (self.min, self.max) {
            (None, None) => LimitPhase::Unlocked,
            (Some(_), None) => LimitPhase::MinOnly,
            (None, Some(_)) => LimitPhase::MaxOnly,
            (Some(min), Some(max)) if min.resolved > max.resolved => LimitPhase::BothReplaced,
            (Some(_), Some(_)) => LimitPhase::BothCompatible,
        }
    }

    #[must_use]
    pub fn min_replaced(&self) -> bool {
        self.phase() == LimitPhase::BothReplaced
    }

    /// Floor the QoS channel should carry for the current pair.
    #[must_use]
    pub fn effective_floor(&self) -> QosRequest {
        match (self.phase(), self.min, self.max) {
            (LimitPhase::BothReplaced, _, Some(max)) => QosRequest::at(max.resolved),
            (_, Some(min), _) => QosRequest::at(min.resolved),
            _ => QosRequest::Default,
        }
    }

    /// A shadowed floor must have the ceiling published in its place.
    #[must_use]
    pub fn replacement_published(&self) -> bool {
        match (self.min_replaced(), self.max) {
            (true, Some(max)) => self.qos_floor == QosRequest::at(max.resolved),
            (true, None) => false,
            (false, _) => true,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> LimitSnapshot {
        LimitSnapshot {
            min: self.min,
            max: self.max,
            phase: self.phase(),
            min_replaced: self.min_replaced(),
            qos_floor: self.qos_floor,
        }
    }
}

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSnapshot {
    pub min: Option<Lock>,
    pub max: Option<Lock>,
    pub phase: LimitPhase,
    pub min_replaced: bool,
    pub qos_floor: QosRequest,
}

/// Process-wide holder of the arbitration state.
#[derive(Debug, Default)]
pub struct ConstraintStore {
    state: RwLock<ArbitrationState>,
}

impl ConstraintStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access, used by the arbitration engine only.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ArbitrationState> {
        self.state.write()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ArbitrationState> {
        self.state.read()
    }

    /// Current ceiling, copied out so the guard is dropped before returning.
    #[must_use]
    pub fn max_limit(&self) -> Option<Frequency> {
        self.read().max.map(|lock| lock.resolved)
    }

    #[must_use]
    pub fn snapshot(&self) -> LimitSnapshot {
        self.read().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(khz: u32) -> Option<Lock> {
        Some(Lock {
            requested: khz,
            resolved: Frequency::from_khz(khz),
        })
    }

    #[test]
    fn phases_follow_the_pair() {
        let mut s = ArbitrationState::default();
        assert_eq!(s.phase(), LimitPhase::Unlocked);
        s.min = lock(300);
        assert_eq!(s.phase(), LimitPhase::MinOnly);
        s.max = lock(300);
        assert_eq!(s.phase(), LimitPhase::BothCompatible);
        s.max = lock(100);
        assert_eq!(s.phase(), LimitPhase::BothReplaced);
        assert!(s.min_replaced());
        s.min = None;
        assert_eq!(s.phase(), LimitPhase::MaxOnly);
        assert!(!s.min_replaced());
    }

    #[test]
    fn effective_floor_prefers_ceiling_on_conflict() {
        let mut s = ArbitrationState::default();
        assert_eq!(s.effective_floor(), QosRequest::Default);
        s.max = lock(400);
        assert_eq!(s.effective_floor(), QosRequest::Default);
        s.min = lock(200);
        assert_eq!(s.effective_floor(), QosRequest::Khz(200));
        s.max = lock(100);
        assert_eq!(s.effective_floor(), QosRequest::Khz(100));
    }

    #[test]
    fn replacement_published_tracks_qos_floor() {
        let mut s = ArbitrationState {
            min: lock(300),
            max: lock(100),
            qos_floor: QosRequest::Khz(300),
        };
        assert!(!s.replacement_published());
        s.qos_floor = QosRequest::Khz(100);
        assert!(s.replacement_published());
    }

    #[test]
    fn store_starts_unlocked() {
        let store = ConstraintStore::new();
        let snap = store.snapshot();
        assert_eq!(snap.phase, LimitPhase::Unlocked);
        assert_eq!(snap.qos_floor, QosRequest::Default);
        assert_eq!(store.max_limit(), None);
    }

    #[test]
    fn snapshot_serializes_for_reports() {
        let state = ArbitrationState {
            min: lock(400),
            max: lock(200),
            qos_floor: QosRequest::Khz(200),
        };
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["phase"], "both_replaced");
        assert_eq!(json["min_replaced"], true);
        assert_eq!(json["max"]["resolved"], 200);
        assert_eq!(json["qos_floor"]["khz"], 200);
    }
}

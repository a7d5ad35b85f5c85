use std::sync::Arc;

use dvfs_limit_core::projector::{CpuId, CpufreqHost};
use dvfs_limit_core::sim::{RecordingQos, SimCpufreq};
use dvfs_limit_core::{
    ArbError, Bound, DvfsLimiter, FrequencyTable, LimitPhase, LimitSnapshot, LimiterConfig,
    QosRequest, UNLOCK,
};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

/// Requests drawn from: unlock, every level, every midpoint, and both
/// out-of-range edges.
const VALUES: [i32; 13] = [
    UNLOCK, 50, 100, 150, 200, 250, 300, 350, 400, 450, 500, 550, -3,
];

const CPUS: u32 = 3;
const TOP_KHZ: u32 = 500;

fn expected_floor(snap: &LimitSnapshot) -> QosRequest {
    match (snap.min, snap.max) {
        (Some(min), Some(max)) if min.resolved > max.resolved => QosRequest::at(max.resolved),
        (Some(min), _) => QosRequest::at(min.resolved),
        (None, _) => QosRequest::Default,
    }
}

fn assert_invariants(step: usize, snap: &LimitSnapshot, qos: &RecordingQos, host: &SimCpufreq) {
    if snap.min_replaced {
        let max = snap.max.expect("replaced floor without a ceiling");
        assert_eq!(
            qos.current("power"),
            Some(QosRequest::at(max.resolved)),
            "step {step}: replaced floor not published as the ceiling"
        );
    }
    if let (Some(min), Some(max)) = (snap.min, snap.max) {
        assert_eq!(
            min.resolved > max.resolved,
            snap.min_replaced,
            "step {step}: conflicting pair not in the replaced state"
        );
        assert_eq!(
            snap.phase == LimitPhase::BothReplaced,
            snap.min_replaced,
            "step {step}"
        );
    }
    assert_eq!(qos.current("power"), Some(expected_floor(snap)), "step {step}");
    assert_eq!(snap.qos_floor, expected_floor(snap), "step {step}");

    let ceiling = snap.max.map_or(TOP_KHZ, |lock| lock.resolved.khz());
    for cpu in host.online_cpus() {
        assert_eq!(
            host.policy(cpu).unwrap().max.khz(),
            ceiling,
            "step {step}: {cpu} not clamped"
        );
    }
}

#[test]
fn deterministic_request_sequences_hold_arbitration_invariants() {
    const SEEDS: [u64; 4] = [1, 2, 3, 4];
    const STEPS: usize = 1_500;

    for seed in SEEDS {
        let table = FrequencyTable::from_khz([
            Some(100),
            Some(200),
            None,
            Some(300),
            Some(400),
            Some(500),
        ])
        .unwrap();
        let host = Arc::new(SimCpufreq::with_cpus(table, CPUS));
        let qos = Arc::new(RecordingQos::new());
        let limiter = DvfsLimiter::init(host.clone(), qos.clone(), LimiterConfig::default());
        let mut rng = XorShift64::new(seed);

        for step in 0..STEPS {
            let bound = if rng.next_u64() & 1 == 0 {
                Bound::Min
            } else {
                Bound::Max
            };
            let value = VALUES[rng.gen_range_usize(0, VALUES.len() - 1)];
            let before = limiter.snapshot();

            match limiter.request(bound, value) {
                Ok(_) => {}
                Err(ArbError::InvalidRequest(_)) => {
                    assert_eq!(limiter.snapshot(), before, "seed {seed} step {step}");
                }
                Err(err) => panic!("seed {seed} step {step}: unexpected {err}"),
            }

            // Hotplug churn: an offlined CPU must come back clamped.
            if rng.gen_range_usize(0, 15) == 0 {
                let cpu = CpuId(rng.gen_range_usize(1, CPUS as usize - 1) as u32);
                host.set_online(cpu, false);
                host.set_online(cpu, true);
            }

            assert_invariants(step, &limiter.snapshot(), &qos, &host);
        }
    }
}

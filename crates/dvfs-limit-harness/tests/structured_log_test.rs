//! Integration tests: the `log` facade bridge.
//!
//! Installs the process-wide logger, so this file holds a single test.

use std::io::Write;
use std::sync::Arc;

use dvfs_limit_core::LimiterConfig;
use dvfs_limit_harness::structured_log::validate_log_line;
use dvfs_limit_harness::{JsonlLogger, LogEmitter, Scenario, scenario};
use parking_lot::Mutex;

/// Writer whose bytes stay readable after the emitter takes ownership.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn limiter_records_share_the_replay_stream() {
    let buffer = SharedBuffer::default();
    let emitter = Arc::new(Mutex::new(LogEmitter::to_writer(buffer.clone(), "bridge")));
    JsonlLogger::new(Arc::clone(&emitter), log::LevelFilter::Debug)
        .install()
        .expect("first logger in this process");

    let json = r#"{
        "name": "bridge",
        "table_khz": [100, 200, 300],
        "debug": true,
        "steps": [
            {"op": "write", "attribute": "cpufreq_min_limit", "value": "-1", "expect": "ok"},
            {"op": "write", "attribute": "cpufreq_min_limit", "value": "250", "expect": "ok"},
            {"op": "write", "attribute": "cpufreq_max_limit", "value": "150", "expect": "ok"}
        ]
    }"#;
    let scenario = Scenario::from_json(json).unwrap();
    let report = scenario::run(&scenario, LimiterConfig::default(), Some(&emitter)).unwrap();
    assert!(report.all_passed());

    let bytes = buffer.0.lock().clone();
    let content = String::from_utf8(bytes).unwrap();
    let entries: Vec<_> = content
        .lines()
        .enumerate()
        .map(|(i, line)| validate_log_line(line, i + 1).expect("schema-valid line"))
        .collect();

    let trace_ids: Vec<_> = entries.iter().map(|e| e.trace_id.as_str()).collect();
    for (i, id) in trace_ids.iter().enumerate() {
        assert_eq!(*id, format!("dvfs::bridge::{:03}", i + 1));
    }

    let forwarded = |needle: &str| {
        entries.iter().any(|e| {
            e.event == "log" && e.message.as_deref().is_some_and(|m| m.contains(needle))
        })
    };
    assert!(forwarded("unlock request is ignored"));
    assert!(forwarded("min_lock: req_freq(250) matched_freq(300"));
    assert!(forwarded("min lock forced to"));

    let steps: Vec<_> = entries.iter().filter(|e| e.step.is_some()).collect();
    assert_eq!(steps.len(), 3);
    assert_eq!(
        steps[2].phase,
        Some(dvfs_limit_core::LimitPhase::BothReplaced)
    );
}

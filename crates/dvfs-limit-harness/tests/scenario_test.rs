//! Integration tests: scenario replay.
//!
//! Validates:
//! 1. The bundled scenarios replay cleanly.
//! 2. A failed expectation is reported per step without aborting the replay.
//! 3. Structural problems (unknown CPU) abort with an error.
//! 4. The CLI writes a JSON report and a schema-valid JSONL log.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use dvfs_limit_core::{LimitPhase, LimiterConfig, QosRequest};
use dvfs_limit_harness::structured_log::validate_log_file;
use dvfs_limit_harness::{Outcome, Scenario, ScenarioError, scenario};

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn scenario_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

#[test]
fn bundled_scenarios_pass() {
    for name in ["ceiling_overrides_floor.json", "hotplug_and_table_loss.json"] {
        let scenario = Scenario::from_file(&scenario_path(name)).expect("load scenario");
        let report = scenario::run(&scenario, LimiterConfig::default(), None).expect("replay");
        let failures: Vec<_> = report
            .steps
            .iter()
            .filter(|s| s.outcome == Outcome::Fail)
            .collect();
        assert!(failures.is_empty(), "{name}: {failures:#?}");
        assert_eq!(report.passed, scenario.steps.len());
    }
}

#[test]
fn ceiling_scenario_reports_qos_history() {
    let scenario =
        Scenario::from_file(&scenario_path("ceiling_overrides_floor.json")).expect("load");
    let report = scenario::run(&scenario, LimiterConfig::default(), None).expect("replay");
    assert_eq!(
        report.qos_updates,
        vec![
            QosRequest::Khz(300),
            QosRequest::Khz(100),
            QosRequest::Khz(300)
        ]
    );
    assert_eq!(report.final_limits.phase, LimitPhase::MinOnly);
    assert_eq!(report.metrics.min_replacements, 1);
}

#[test]
fn failed_expectation_is_reported_not_fatal() {
    let json = r#"{
        "name": "mismatch",
        "table_khz": [100, 200],
        "steps": [
            {"op": "write", "attribute": "cpufreq_min_limit", "value": "500", "expect": "ok"},
            {"op": "write", "attribute": "cpufreq_min_limit", "value": "150", "expect": "ok"},
            {"op": "check", "qos": {"khz": 100}}
        ]
    }"#;
    let scenario = Scenario::from_json(json).unwrap();
    let report = scenario::run(&scenario, LimiterConfig::default(), None).unwrap();
    let outcomes: Vec<_> = report.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(outcomes, [Outcome::Fail, Outcome::Pass, Outcome::Fail]);
    assert!(report.steps[0].detail.contains("at or above 500"));
    assert!(!report.all_passed());
}

#[test]
fn unknown_cpu_aborts_replay() {
    let json = r#"{
        "name": "bad-cpu",
        "table_khz": [100],
        "cpus": 2,
        "steps": [{"op": "offline", "cpu": 5}]
    }"#;
    let scenario = Scenario::from_json(json).unwrap();
    let err = scenario::run(&scenario, LimiterConfig::default(), None).unwrap_err();
    assert!(matches!(err, ScenarioError::UnknownCpu { step: 0, .. }));
    assert_eq!(err.to_string(), "step 0: unknown cpu5");
}

#[test]
fn cli_run_writes_report_and_valid_log() {
    let dir = unique_tmp_dir("dvfs-limit-cli-run");
    let log_path = dir.join("replay.jsonl");
    let report_path = dir.join("report.json");

    let output = Command::new(env!("CARGO_BIN_EXE_dvfs-limit-harness"))
        .arg("run")
        .arg("--scenario")
        .arg(scenario_path("ceiling_overrides_floor.json"))
        .arg("--log")
        .arg(&log_path)
        .arg("--level")
        .arg("debug")
        .arg("--output")
        .arg(&report_path)
        .env_remove("DVFS_LIMIT_QOS_NAME")
        .output()
        .expect("run harness");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).expect("read report"))
            .expect("report is JSON");
    assert_eq!(report["failed"], 0);
    assert_eq!(report["final_limits"]["phase"], "min_only");

    let (lines, errors) = validate_log_file(&log_path).expect("read log");
    assert!(errors.is_empty(), "{errors:?}");
    // start + one per step + end, plus forwarded limiter records
    assert!(lines >= 13, "only {lines} lines");
    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(content.contains(r#""event":"scenario_start""#));
    assert!(content.contains(r#""target":"dvfs_limit_core::limiter""#));
}

#[test]
fn cli_table_renders_descending_levels() {
    let output = Command::new(env!("CARGO_BIN_EXE_dvfs-limit-harness"))
        .args(["table", "--khz", "100,-,200,300,400", "--max", "350"])
        .output()
        .expect("run harness");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "300 200 100\n");
}

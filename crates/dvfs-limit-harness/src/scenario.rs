//! Scenario replay.
//!
//! A scenario is a JSON document describing a platform (frequency table and
//! CPU count) and a list of steps driven through the limiter's attribute
//! surface. Each step may carry an expectation; the report lists which held.
//!
//! ```json
//! {
//!   "name": "ceiling overrides floor",
//!   "table_khz": [100, 200, null, 300],
//!   "cpus": 2,
//!   "steps": [
//!     { "op": "write", "attribute": "cpufreq_max_limit", "value": "150", "expect": "ok" },
//!     { "op": "check", "phase": "max_only", "policy_max_khz": 100 }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use dvfs_limit_core::freq_table::TableError;
use dvfs_limit_core::metrics::MetricsSnapshot;
use dvfs_limit_core::projector::{CpuId, CpufreqHost};
use dvfs_limit_core::sim::{RecordingQos, SimCpufreq};
use dvfs_limit_core::{
    ArbError, DvfsLimiter, FrequencyTable, LimitAttribute, LimitPhase, LimitSnapshot,
    LimiterConfig, QosRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::structured_log::{LogEntry, LogLevel, Outcome, SharedEmitter};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid frequency table: {0}")]
    Table(#[from] TableError),
    #[error("scenario needs at least one CPU")]
    NoCpus,
    #[error("step {step}: unknown {cpu}")]
    UnknownCpu { step: usize, cpu: CpuId },
}

/// How a write is expected to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteExpect {
    Ok,
    InvalidRequest,
    TableUnavailable,
    ReadOnly,
}

impl WriteExpect {
    fn of(result: &Result<usize, ArbError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(ArbError::InvalidRequest(_)) => Self::InvalidRequest,
            Err(ArbError::TableUnavailable) => Self::TableUnavailable,
            Err(ArbError::ReadOnly(_)) => Self::ReadOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Write {
        attribute: LimitAttribute,
        value: String,
        #[serde(default)]
        expect: Option<WriteExpect>,
    },
    Read {
        attribute: LimitAttribute,
        /// Expected text, newline included.
        #[serde(default)]
        expect: Option<String>,
    },
    Online {
        cpu: u32,
    },
    Offline {
        cpu: u32,
    },
    Debug {
        enabled: bool,
    },
    /// Replace (or with `null`, remove) the frequency table.
    SetTable {
        table_khz: Option<Vec<Option<u32>>>,
    },
    Republish,
    Check {
        #[serde(default)]
        phase: Option<LimitPhase>,
        #[serde(default)]
        qos: Option<QosRequest>,
        /// Expected policy max on every online CPU.
        #[serde(default)]
        policy_max_khz: Option<u32>,
    },
}

impl Step {
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::Online { .. } => "online",
            Self::Offline { .. } => "offline",
            Self::Debug { .. } => "debug",
            Self::SetTable { .. } => "set_table",
            Self::Republish => "republish",
            Self::Check { .. } => "check",
        }
    }
}

fn default_cpus() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ascending operating points; `null` marks an invalid entry.
    pub table_khz: Vec<Option<u32>>,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    /// Overrides the environment's debug setting.
    #[serde(default)]
    pub debug: Option<bool>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub op: String,
    pub outcome: Outcome,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: usize,
    pub failed: usize,
    pub steps: Vec<StepReport>,
    pub final_limits: LimitSnapshot,
    pub qos_updates: Vec<QosRequest>,
    pub metrics: MetricsSnapshot,
}

impl ScenarioReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

struct Replay<'a> {
    limiter: DvfsLimiter,
    host: Arc<SimCpufreq>,
    qos: Arc<RecordingQos>,
    log: Option<&'a SharedEmitter>,
}

impl Replay<'_> {
    fn emit(&self, entry: LogEntry) -> Result<(), ScenarioError> {
        if let Some(log) = self.log {
            log.lock().emit_entry(entry)?;
        }
        Ok(())
    }

    fn known_cpu(&self, step: usize, cpu: u32) -> Result<CpuId, ScenarioError> {
        let cpu = CpuId(cpu);
        match self.host.cpuinfo(cpu) {
            Some(_) => Ok(cpu),
            None => Err(ScenarioError::UnknownCpu { step, cpu }),
        }
    }

    /// Run one step. Returns the outcome, a human-readable detail, and the
    /// attribute text for attribute steps.
    fn step(
        &self,
        index: usize,
        step: &Step,
    ) -> Result<(Outcome, String, Option<(LimitAttribute, String)>), ScenarioError> {
        let verdict = |ok: bool| if ok { Outcome::Pass } else { Outcome::Fail };
        Ok(match step {
            Step::Write {
                attribute,
                value,
                expect,
            } => {
                let result = self.limiter.store(*attribute, value);
                let got = WriteExpect::of(&result);
                let detail = match &result {
                    Ok(n) => format!("consumed {n} bytes"),
                    Err(err) => err.to_string(),
                };
                let ok = expect.is_none_or(|want| want == got);
                (verdict(ok), detail, Some((*attribute, value.clone())))
            }
            Step::Read { attribute, expect } => match self.limiter.show(*attribute) {
                Ok(text) => {
                    let ok = expect.as_ref().is_none_or(|want| *want == text);
                    let detail = format!("{text:?}");
                    (verdict(ok), detail, Some((*attribute, text)))
                }
                Err(err) => (
                    verdict(expect.is_none()),
                    err.to_string(),
                    Some((*attribute, String::new())),
                ),
            },
            Step::Online { cpu } => {
                let cpu = self.known_cpu(index, *cpu)?;
                let changed = self.host.set_online(cpu, true);
                (Outcome::Pass, format!("{cpu} online (changed: {changed})"), None)
            }
            Step::Offline { cpu } => {
                let cpu = self.known_cpu(index, *cpu)?;
                let changed = self.host.set_online(cpu, false);
                (Outcome::Pass, format!("{cpu} offline (changed: {changed})"), None)
            }
            Step::Debug { enabled } => {
                self.limiter.set_debug(*enabled);
                (Outcome::Pass, format!("debug {enabled}"), None)
            }
            Step::SetTable { table_khz } => {
                let table = table_khz
                    .as_ref()
                    .map(|raw| FrequencyTable::from_khz(raw.iter().copied()))
                    .transpose()?;
                let detail = if table.is_some() {
                    "table replaced"
                } else {
                    "table removed"
                };
                self.host.set_table(table);
                (Outcome::Pass, detail.to_string(), None)
            }
            Step::Republish => {
                self.limiter.republish();
                (Outcome::Pass, "republished".to_string(), None)
            }
            Step::Check {
                phase,
                qos,
                policy_max_khz,
            } => {
                let snap = self.limiter.snapshot();
                let mut mismatches = Vec::new();
                if let Some(want) = phase
                    && *want != snap.phase
                {
                    mismatches.push(format!("phase {:?} != {want:?}", snap.phase));
                }
                let current = self.qos.current(&self.limiter.config().qos_name);
                if let Some(want) = qos
                    && current != Some(*want)
                {
                    mismatches.push(format!("qos {current:?} != {want}"));
                }
                if let Some(want) = policy_max_khz {
                    for cpu in self.host.online_cpus() {
                        let got = self.host.policy(cpu).map(|p| p.max.khz());
                        if got != Some(*want) {
                            mismatches.push(format!("{cpu} policy max {got:?} != {want}"));
                        }
                    }
                }
                if mismatches.is_empty() {
                    (Outcome::Pass, "state matches".to_string(), None)
                } else {
                    (Outcome::Fail, mismatches.join("; "), None)
                }
            }
        })
    }
}

/// Replay `scenario` against a fresh simulated platform.
///
/// `config` supplies the QoS requirement name and policy CPU; the scenario's
/// `debug` overrides the config's when present.
pub fn run(
    scenario: &Scenario,
    mut config: LimiterConfig,
    log: Option<&SharedEmitter>,
) -> Result<ScenarioReport, ScenarioError> {
    if scenario.cpus == 0 {
        return Err(ScenarioError::NoCpus);
    }
    let table = FrequencyTable::from_khz(scenario.table_khz.iter().copied())?;
    if let Some(debug) = scenario.debug {
        config.debug = debug;
    }

    let host = Arc::new(SimCpufreq::with_cpus(table, scenario.cpus));
    let qos = Arc::new(RecordingQos::new());
    let limiter = DvfsLimiter::init(host.clone(), qos.clone(), config);
    let replay = Replay {
        limiter,
        host,
        qos,
        log,
    };

    replay.emit(
        LogEntry::new("", LogLevel::Info, "scenario_start")
            .with_message(scenario.name.clone())
            .with_details(serde_json::json!({
                "cpus": scenario.cpus,
                "table_khz": scenario.table_khz,
            })),
    )?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let (outcome, detail, attribute) = replay.step(index, step)?;

        let level = match outcome {
            Outcome::Pass => LogLevel::Info,
            Outcome::Fail => LogLevel::Warn,
        };
        let mut entry = LogEntry::new("", level, step.op())
            .with_step(index)
            .with_outcome(outcome)
            .with_limits(&replay.limiter.snapshot())
            .with_message(detail.clone());
        if let Some((attr, text)) = attribute {
            entry = entry.with_attribute(attr, text);
        }
        replay.emit(entry)?;

        steps.push(StepReport {
            index,
            op: step.op().to_string(),
            outcome,
            detail,
        });
    }

    let failed = steps.iter().filter(|s| s.outcome == Outcome::Fail).count();
    let report = ScenarioReport {
        name: scenario.name.clone(),
        passed: steps.len() - failed,
        failed,
        steps,
        final_limits: replay.limiter.snapshot(),
        qos_updates: replay.qos.updates(),
        metrics: replay.limiter.metrics(),
    };

    replay.emit(
        LogEntry::new("", LogLevel::Info, "scenario_end")
            .with_limits(&report.final_limits)
            .with_details(serde_json::json!({
                "passed": report.passed,
                "failed": report.failed,
            })),
    )?;
    if let Some(log) = log {
        log.lock().flush()?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse_by_op_tag() {
        let json = r#"{
            "name": "t",
            "table_khz": [100, null, 200],
            "steps": [
                {"op": "write", "attribute": "cpufreq_min_limit", "value": "150\n", "expect": "ok"},
                {"op": "read", "attribute": "cpufreq_table"},
                {"op": "offline", "cpu": 0},
                {"op": "set_table", "table_khz": null},
                {"op": "republish"},
                {"op": "check", "qos": {"khz": 200}}
            ]
        }"#;
        let scenario = Scenario::from_json(json).unwrap();
        assert_eq!(scenario.cpus, 1);
        assert_eq!(scenario.table_khz, vec![Some(100), None, Some(200)]);
        assert_eq!(
            scenario.steps[0],
            Step::Write {
                attribute: LimitAttribute::CpufreqMinLimit,
                value: "150\n".to_string(),
                expect: Some(WriteExpect::Ok),
            }
        );
        assert_eq!(scenario.steps[3], Step::SetTable { table_khz: None });
        assert_eq!(
            scenario.steps[5],
            Step::Check {
                phase: None,
                qos: Some(QosRequest::Khz(200)),
                policy_max_khz: None,
            }
        );
    }

    #[test]
    fn unknown_op_is_rejected() {
        let json = r#"{"name": "t", "table_khz": [100], "steps": [{"op": "reboot"}]}"#;
        assert!(matches!(
            Scenario::from_json(json),
            Err(ScenarioError::Json(_))
        ));
    }

    #[test]
    fn zero_cpus_is_rejected() {
        let scenario = Scenario {
            name: "t".to_string(),
            description: None,
            table_khz: vec![Some(100)],
            cpus: 0,
            debug: None,
            steps: Vec::new(),
        };
        assert!(matches!(
            run(&scenario, LimiterConfig::default(), None),
            Err(ScenarioError::NoCpus)
        ));
    }

    #[test]
    fn descending_table_is_rejected() {
        let scenario = Scenario {
            name: "t".to_string(),
            description: None,
            table_khz: vec![Some(200), Some(100)],
            cpus: 1,
            debug: None,
            steps: Vec::new(),
        };
        assert!(matches!(
            run(&scenario, LimiterConfig::default(), None),
            Err(ScenarioError::Table(TableError::NotAscending { index: 1 }))
        ));
    }
}

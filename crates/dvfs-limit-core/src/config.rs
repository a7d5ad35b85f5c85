//! Limiter configuration.
//!
//! Read from the environment when the subsystem is brought up:
//! - `DVFS_LIMIT_DEBUG`: initial debug mask (`1|true|on|yes` enable it).
//!   Verbose resolution and replacement traces are only logged while set.
//! - `DVFS_LIMIT_QOS_NAME`: name of the QoS requirement this subsystem owns
//!   (default `power`).
//! - `DVFS_LIMIT_POLICY_CPU`: CPU whose frequency table and hardware limits
//!   are consulted (default `0`).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::projector::CpuId;

pub const ENV_DEBUG: &str = "DVFS_LIMIT_DEBUG";
pub const ENV_QOS_NAME: &str = "DVFS_LIMIT_QOS_NAME";
pub const ENV_POLICY_CPU: &str = "DVFS_LIMIT_POLICY_CPU";

pub const DEFAULT_QOS_NAME: &str = "power";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    pub debug: bool,
    pub qos_name: String,
    pub policy_cpu: CpuId,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            debug: false,
            qos_name: DEFAULT_QOS_NAME.to_string(),
            policy_cpu: CpuId(0),
        }
    }
}

impl LimiterConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable values fall back to defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            debug: lookup(ENV_DEBUG).is_some_and(|v| parse_bool_loose(&v)),
            qos_name: lookup(ENV_QOS_NAME)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.qos_name),
            policy_cpu: lookup(ENV_POLICY_CPU)
                .and_then(|v| v.trim().parse().ok())
                .map_or(defaults.policy_cpu, CpuId),
        }
    }
}

/// Parse a boolean flag (case-insensitive). Anything unrecognised is false.
#[must_use]
pub fn parse_bool_loose(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes" | "y"
    )
}

/// Runtime-writable verbose-logging switch.
#[derive(Debug, Default)]
pub struct DebugMask(AtomicBool);

impl DebugMask {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

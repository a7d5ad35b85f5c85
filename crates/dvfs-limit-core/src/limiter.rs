//! Subsystem lifecycle and attribute surface.

use std::fmt;
use std::sync::Arc;

use log::{error, info};

use crate::arbiter::{ArbitrationEngine, Bound, RequestOutcome};
use crate::config::{DebugMask, LimiterConfig};
use crate::constraint::{ConstraintStore, LimitSnapshot};
use crate::endpoint::{self, LimitAttribute};
use crate::error::{ArbError, ArbResult};
use crate::freq_table::TableSource;
use crate::metrics::{LimiterMetrics, MetricsSnapshot};
use crate::projector::{CpufreqHost, NotifierId, PolicyProjector};
use crate::qos::{QosChannel, QosRequest};

/// The DVFS limit subsystem.
///
/// Created with both bounds released. While alive it is registered with the
/// policy layer and owns one QoS requirement; dropping it undoes both.
pub struct DvfsLimiter {
    engine: ArbitrationEngine,
    projector: Arc<PolicyProjector>,
    host: Arc<dyn CpufreqHost>,
    qos: Arc<dyn QosChannel>,
    notifier: NotifierId,
    config: LimiterConfig,
    metrics: Arc<LimiterMetrics>,
    debug: Arc<DebugMask>,
}

impl DvfsLimiter {
    pub fn init(
        host: Arc<dyn CpufreqHost>,
        qos: Arc<dyn QosChannel>,
        config: LimiterConfig,
    ) -> Self {
        let store = Arc::new(ConstraintStore::new());
        let metrics = Arc::new(LimiterMetrics::new());
        let debug = Arc::new(DebugMask::new(config.debug));

        let projector = Arc::new(PolicyProjector::new(
            Arc::clone(&store),
            Arc::clone(&host),
            config.policy_cpu,
            Arc::clone(&metrics),
            Arc::clone(&debug),
        ));
        let notifier = host.register_policy_notifier(projector.clone());
        qos.add_requirement(&config.qos_name, QosRequest::Default);

        let engine = ArbitrationEngine::new(
            store,
            Arc::clone(&host),
            Arc::clone(&qos),
            Arc::clone(&projector),
            config.qos_name.clone(),
            config.policy_cpu,
            Arc::clone(&metrics),
            Arc::clone(&debug),
        );
        info!(
            "dvfs limit: registered (qos requirement {:?}, table {})",
            config.qos_name, config.policy_cpu
        );

        Self {
            engine,
            projector,
            host,
            qos,
            notifier,
            config,
            metrics,
            debug,
        }
    }

    pub fn request_min(&self, value: i32) -> ArbResult<RequestOutcome> {
        self.engine.request_min(value)
    }

    pub fn request_max(&self, value: i32) -> ArbResult<RequestOutcome> {
        self.engine.request_max(value)
    }

    pub fn request(&self, bound: Bound, value: i32) -> ArbResult<RequestOutcome> {
        self.engine.request(bound, value)
    }

    /// Read an attribute.
    pub fn show(&self, attr: LimitAttribute) -> ArbResult<String> {
        match attr {
            LimitAttribute::CpufreqTable => {
                let Some(table) = self.host.frequency_table(self.config.policy_cpu) else {
                    error!("{}: failed to get the cpufreq table", attr.name());
                    LimiterMetrics::inc(&self.metrics.table_unavailable);
                    return Err(ArbError::TableUnavailable);
                };
                let cpuinfo = self.host.cpuinfo(self.config.policy_cpu);
                Ok(endpoint::show_table(&table, cpuinfo))
            }
            LimitAttribute::CpufreqMaxLimit => Ok(endpoint::show_limit(self.snapshot().max)),
            LimitAttribute::CpufreqMinLimit => Ok(endpoint::show_limit(self.snapshot().min)),
        }
    }

    /// Write an attribute. Returns the number of bytes consumed.
    pub fn store(&self, attr: LimitAttribute, buf: &str) -> ArbResult<usize> {
        let Some(bound) = attr.bound() else {
            error!("{} is read-only", attr.name());
            return Err(ArbError::ReadOnly(attr.name()));
        };
        let value = endpoint::parse_limit(buf).inspect_err(|_| {
            error!("{}: invalid cpufreq format", attr.name());
            LimiterMetrics::inc(self.metrics.requests(bound));
            LimiterMetrics::inc(&self.metrics.invalid_requests);
        })?;
        self.engine.request(bound, value)?;
        Ok(buf.len())
    }

    /// Recompute every online CPU's policy against the current limits.
    pub fn republish(&self) {
        self.projector.republish();
    }

    #[must_use]
    pub fn snapshot(&self) -> LimitSnapshot {
        self.engine.store().snapshot()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    #[must_use]
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug.enabled()
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.set(enabled);
    }

    #[must_use]
    pub fn projector(&self) -> &Arc<PolicyProjector> {
        &self.projector
    }
}

impl Drop for DvfsLimiter {
    fn drop(&mut self) {
        self.host.unregister_policy_notifier(self.notifier);
        self.qos.remove_requirement(&self.config.qos_name);
    }
}

impl fmt::Debug for DvfsLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DvfsLimiter")
            .field("config", &self.config)
            .field("notifier", &self.notifier)
            .field("limits", &self.snapshot())
            .finish_non_exhaustive()
    }
}

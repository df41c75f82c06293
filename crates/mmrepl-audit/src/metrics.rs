//! Prometheus counters for the conflict sink
//!
//! Counts every logged conflict by type and resolution, and every failed
//! log write by destination.

use mmrepl_core::domain::{ConflictResolution, ConflictType};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Registry holding the conflict counters.
pub struct ConflictMetrics {
    registry: Registry,
    /// Counter: conflicts by (conflict_type, resolution)
    pub conflicts_total: IntCounterVec,
    /// Counter: failed conflict log writes by destination (table, server_log)
    pub log_failures_total: IntCounterVec,
}

impl ConflictMetrics {
    /// Creates a new `ConflictMetrics` with all counters registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("mmrepl".to_string()), None)?;

        let conflicts_total = IntCounterVec::new(
            Opts::new("conflicts_total", "Total conflicts by type and resolution"),
            &["conflict_type", "resolution"],
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let log_failures_total = IntCounterVec::new(
            Opts::new(
                "conflict_log_failures_total",
                "Failed conflict log writes by destination",
            ),
            &["destination"],
        )?;
        registry.register(Box::new(log_failures_total.clone()))?;

        Ok(Self {
            registry,
            conflicts_total,
            log_failures_total,
        })
    }

    /// Record a logged conflict.
    pub fn record_conflict(&self, conflict_type: ConflictType, resolution: ConflictResolution) {
        self.conflicts_total
            .with_label_values(&[conflict_type.as_str(), resolution.as_str()])
            .inc();
    }

    /// Record a failed write to a log destination.
    pub fn record_log_failure(&self, destination: &str) {
        self.log_failures_total
            .with_label_values(&[destination])
            .inc();
    }

    /// Current count for one (conflict_type, resolution) pair.
    pub fn conflicts(&self, conflict_type: ConflictType, resolution: ConflictResolution) -> u64 {
        self.conflicts_total
            .with_label_values(&[conflict_type.as_str(), resolution.as_str()])
            .get()
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

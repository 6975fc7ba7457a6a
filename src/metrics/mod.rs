use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;

/// Running counters for command execution and event delivery.
#[derive(Debug, Default, Clone)]
pub struct EngineMetrics {
    executed: u64,
    deferred: u64,
    drains: u64,
    drain_failures: u64,
    discarded: u64,
    listeners_fired: u64,
    removals_fired: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_executed(&mut self) {
        self.executed = self.executed.saturating_add(1);
    }

    pub fn record_deferred(&mut self) {
        self.deferred = self.deferred.saturating_add(1);
    }

    pub fn record_drain(&mut self, failures: usize) {
        self.drains = self.drains.saturating_add(1);
        self.drain_failures = self.drain_failures.saturating_add(failures as u64);
    }

    pub fn record_discarded(&mut self, count: usize) {
        self.discarded = self.discarded.saturating_add(count as u64);
    }

    pub fn record_fan_out(&mut self, listeners: usize, removals: usize) {
        self.listeners_fired = self.listeners_fired.saturating_add(listeners as u64);
        self.removals_fired = self.removals_fired.saturating_add(removals as u64);
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            executed: self.executed,
            deferred: self.deferred,
            drains: self.drains,
            drain_failures: self.drain_failures,
            discarded: self.discarded,
            listeners_fired: self.listeners_fired,
            removals_fired: self.removals_fired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub executed: u64,
    pub deferred: u64,
    pub drains: u64,
    pub drain_failures: u64,
    pub discarded: u64,
    pub listeners_fired: u64,
    pub removals_fired: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "engine_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("executed".to_string(), json!(self.executed));
        map.insert("deferred".to_string(), json!(self.deferred));
        map.insert("drains".to_string(), json!(self.drains));
        map.insert("drain_failures".to_string(), json!(self.drain_failures));
        map.insert("discarded".to_string(), json!(self.discarded));
        map.insert("listeners_fired".to_string(), json!(self.listeners_fired));
        map.insert("removals_fired".to_string(), json!(self.removals_fired));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let mut metrics = EngineMetrics::new();
        metrics.record_deferred();
        metrics.record_deferred();
        metrics.record_executed();
        metrics.record_drain(1);
        metrics.record_fan_out(4, 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.deferred, 2);
        assert_eq!(snapshot.executed, 1);
        assert_eq!(snapshot.drains, 1);
        assert_eq!(snapshot.drain_failures, 1);
        assert_eq!(snapshot.listeners_fired, 4);
        assert_eq!(snapshot.removals_fired, 2);

        let event = snapshot.to_log_event("map_relay::engine.metrics");
        assert_eq!(event.message, "engine_metrics");
        assert_eq!(event.field("deferred"), Some(&json!(2)));
    }
}

//! Engine lifecycle audit hooks.
//!
//! Records carry a stage plus structured details so callers can buffer or
//! inspect how maps came up and how the deferred queue was processed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde_json::Value;

/// Lifecycle checkpoints emitted by `MapEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAuditStage {
    /// A map id was reserved.
    MapRequested,
    /// The widget factory produced a widget for a reserved map.
    MapCreated,
    /// The host reported one map ready.
    MapReady,
    /// Every created map is ready.
    EngineReady,
    /// A command was queued behind the readiness gate.
    CommandDeferred,
    CommandExecuted,
    /// A pass over the work queue finished.
    DrainCompleted,
    /// Queued commands were dropped because the engine was locked.
    QueueDiscarded,
}

#[derive(Debug, Clone)]
pub struct EngineAuditEvent {
    pub timestamp: SystemTime,
    pub stage: EngineAuditStage,
    pub details: Vec<(String, Value)>,
}

impl EngineAuditEvent {
    fn new(stage: EngineAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

pub struct EngineAuditEventBuilder {
    event: EngineAuditEvent,
}

impl EngineAuditEventBuilder {
    pub fn new(stage: EngineAuditStage) -> Self {
        Self {
            event: EngineAuditEvent::new(stage),
        }
    }

    pub fn detail(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> EngineAuditEvent {
        self.event
    }
}

pub trait EngineAudit: Send + Sync {
    fn record(&self, event: EngineAuditEvent);
}

/// Default sink used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullEngineAudit;

impl EngineAudit for NullEngineAudit {
    fn record(&self, _event: EngineAuditEvent) {}
}

/// Keeps every record in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferedEngineAudit {
    events: Arc<Mutex<Vec<EngineAuditEvent>>>,
}

impl BufferedEngineAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stages(&self) -> Vec<EngineAuditStage> {
        self.events().into_iter().map(|event| event.stage).collect()
    }
}

impl EngineAudit for BufferedEngineAudit {
    fn record(&self, event: EngineAuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_keeps_detail_order() {
        let mut builder = EngineAuditEventBuilder::new(EngineAuditStage::DrainCompleted);
        builder.detail("executed", json!(3)).detail("failed", json!(1));
        let event = builder.finish();

        assert_eq!(event.stage, EngineAuditStage::DrainCompleted);
        assert_eq!(event.details[0].0, "executed");
        assert_eq!(event.detail("failed"), Some(&json!(1)));
        assert_eq!(event.detail("missing"), None);
    }

    #[test]
    fn buffered_audit_shares_records_between_clones() {
        let audit = BufferedEngineAudit::new();
        let handle = audit.clone();
        handle.record(EngineAuditEventBuilder::new(EngineAuditStage::MapReady).finish());

        assert_eq!(audit.stages(), vec![EngineAuditStage::MapReady]);
    }
}

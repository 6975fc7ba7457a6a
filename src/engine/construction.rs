use crate::error::{MapError, Result};
use crate::widget::WidgetSpec;

use super::MapId;

/// Tracks map creation requests and the global readiness gate.
///
/// The engine is ready exactly when every created map has signalled
/// readiness. A map whose widget could not be built is abandoned and stops
/// counting towards the gate, but its id stays reserved.
#[derive(Debug, Default)]
pub struct ConstructionQueue {
    waiting: Vec<(MapId, WidgetSpec)>,
    next_id: usize,
    map_count: usize,
    ready_count: usize,
}

impl ConstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, spec: WidgetSpec) -> MapId {
        let id = MapId(self.next_id);
        self.next_id += 1;
        self.map_count += 1;
        self.waiting.push((id, spec));
        id
    }

    /// Most recent request first.
    pub fn pop(&mut self) -> Option<(MapId, WidgetSpec)> {
        self.waiting.pop()
    }

    pub fn is_reserved(&self, id: MapId) -> bool {
        id.0 < self.next_id
    }

    /// Count one readiness signal. Returns `true` when this signal completes
    /// the gate.
    pub fn mark_ready(&mut self) -> Result<bool> {
        if self.ready_count >= self.map_count {
            return Err(MapError::UnexpectedReady);
        }
        self.ready_count += 1;
        Ok(self.is_ready())
    }

    /// Stop waiting on a map whose widget was never created. Returns `true`
    /// when that leaves the gate complete.
    pub fn abandon(&mut self) -> bool {
        self.map_count = self.map_count.saturating_sub(1);
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.ready_count == self.map_count
    }

    pub fn map_count(&self) -> usize {
        self.map_count
    }

    pub fn ready_count(&self) -> usize {
        self.ready_count
    }

    pub fn pending(&self) -> usize {
        self.map_count - self.ready_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_opens_when_every_map_reports() {
        let mut queue = ConstructionQueue::new();
        assert!(queue.is_ready());

        let first = queue.reserve(WidgetSpec::default());
        let second = queue.reserve(WidgetSpec::default());
        assert_eq!((first, second), (MapId(0), MapId(1)));
        assert!(!queue.is_ready());
        assert_eq!(queue.pending(), 2);

        assert!(!queue.mark_ready().unwrap());
        assert!(queue.mark_ready().unwrap());
        assert_eq!(queue.mark_ready(), Err(MapError::UnexpectedReady));
    }

    #[test]
    fn creation_pops_latest_request_first() {
        let mut queue = ConstructionQueue::new();
        queue.reserve(WidgetSpec::default());
        queue.reserve(WidgetSpec::default());

        assert_eq!(queue.pop().map(|(id, _)| id), Some(MapId(1)));
        assert_eq!(queue.pop().map(|(id, _)| id), Some(MapId(0)));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn abandoned_map_keeps_its_id_reserved() {
        let mut queue = ConstructionQueue::new();
        let first = queue.reserve(WidgetSpec::default());
        queue.reserve(WidgetSpec::default());
        queue.mark_ready().unwrap();

        assert!(queue.abandon());
        assert!(queue.is_reserved(first));
        assert!(queue.is_reserved(MapId(1)));
        assert!(!queue.is_reserved(MapId(2)));
        assert_eq!(queue.map_count(), 1);
    }
}

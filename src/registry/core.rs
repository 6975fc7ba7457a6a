use uuid::Uuid;

use crate::overlay::{MAP_SUBJECT, Overlay, OverlayId, OverlayKind};
use crate::widget::MapWidget;

/// Where an existing overlay currently resides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residence {
    Visible(OverlayKind),
    Hidden(OverlayKind),
}

impl Residence {
    pub fn kind(self) -> OverlayKind {
        match self {
            Self::Visible(kind) | Self::Hidden(kind) => kind,
        }
    }

    pub fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden(_))
    }
}

/// Generate an opaque identifier. Callers retry on collision.
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Per-map overlay bookkeeping.
///
/// Visible overlays are owned by the widget; hidden overlays are parked here,
/// partitioned by kind, until they are shown again or deleted.
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    hidden: [Vec<Overlay>; 3],
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn residence(&self, widget: &dyn MapWidget, id: &str) -> Option<Residence> {
        if let Some(kind) = widget.overlay_kind(id) {
            return Some(Residence::Visible(kind));
        }
        self.hidden
            .iter()
            .flatten()
            .find(|overlay| overlay.id == id)
            .map(|overlay| Residence::Hidden(overlay.kind))
    }

    pub fn contains(&self, widget: &dyn MapWidget, id: &str) -> bool {
        self.residence(widget, id).is_some()
    }

    pub fn fetch(&self, widget: &dyn MapWidget, id: &str) -> Option<Overlay> {
        widget.overlay(id).or_else(|| {
            self.hidden
                .iter()
                .flatten()
                .find(|overlay| overlay.id == id)
                .cloned()
        })
    }

    /// Visible ids first, then hidden ones of the same kind.
    pub fn ids_by_kind(&self, widget: &dyn MapWidget, kind: OverlayKind) -> Vec<OverlayId> {
        let mut ids = widget.overlay_ids_by_kind(kind);
        ids.extend(self.hidden[kind.index()].iter().map(|o| o.id.clone()));
        ids
    }

    pub fn all_ids(&self, widget: &dyn MapWidget) -> Vec<OverlayId> {
        OverlayKind::ALL
            .into_iter()
            .flat_map(|kind| self.ids_by_kind(widget, kind))
            .collect()
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.iter().map(Vec::len).sum()
    }

    /// Move a visible overlay into its hidden partition. `false` if it was not visible.
    pub fn hide(&mut self, widget: &mut dyn MapWidget, id: &str) -> bool {
        match widget.remove_overlay(id) {
            Some(overlay) => {
                self.hidden[overlay.kind.index()].push(overlay);
                true
            }
            None => false,
        }
    }

    /// Return a hidden overlay to the widget. `false` if it was not hidden.
    pub fn show(&mut self, widget: &mut dyn MapWidget, id: &str) -> bool {
        match self.take_hidden(id) {
            Some(overlay) => {
                widget.add_overlay(overlay, true);
                true
            }
            None => false,
        }
    }

    pub fn hide_kind(&mut self, widget: &mut dyn MapWidget, kind: OverlayKind) -> Vec<OverlayId> {
        widget
            .overlay_ids_by_kind(kind)
            .into_iter()
            .filter(|id| self.hide(widget, id))
            .collect()
    }

    pub fn show_kind(&mut self, widget: &mut dyn MapWidget, kind: OverlayKind) -> Vec<OverlayId> {
        let parked = std::mem::take(&mut self.hidden[kind.index()]);
        parked
            .into_iter()
            .map(|overlay| {
                let id = overlay.id.clone();
                widget.add_overlay(overlay, true);
                id
            })
            .collect()
    }

    /// Remove an overlay from wherever it resides.
    pub fn remove(&mut self, widget: &mut dyn MapWidget, id: &str) -> Option<Overlay> {
        widget.remove_overlay(id).or_else(|| self.take_hidden(id))
    }

    /// Random id unused by any overlay of this map and distinct from the map subject.
    pub fn allocate_id(&self, widget: &dyn MapWidget) -> OverlayId {
        loop {
            let candidate = random_id();
            if candidate != MAP_SUBJECT && !self.contains(widget, &candidate) {
                return candidate;
            }
        }
    }

    fn take_hidden(&mut self, id: &str) -> Option<Overlay> {
        self.hidden.iter_mut().find_map(|partition| {
            partition
                .iter()
                .position(|overlay| overlay.id == id)
                .map(|idx| partition.remove(idx))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LatLng;
    use crate::overlay::{OverlayOptions, Shape};
    use crate::widget::{MemoryBackend, WidgetFactory, WidgetSpec};

    fn widget() -> Box<dyn MapWidget> {
        MemoryBackend::new()
            .factory()
            .create(&WidgetSpec::default())
            .unwrap()
    }

    fn point(id: &str) -> Overlay {
        Overlay {
            id: id.to_string(),
            kind: OverlayKind::Point,
            shape: Shape::Point(LatLng::new(1.0, 2.0)),
            options: OverlayOptions::default(),
        }
    }

    fn line(id: &str) -> Overlay {
        Overlay {
            id: id.to_string(),
            kind: OverlayKind::Polyline,
            shape: Shape::Path(vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)]),
            options: OverlayOptions::default(),
        }
    }

    #[test]
    fn hide_and_show_move_between_widget_and_partition() {
        let mut widget = widget();
        let mut registry = OverlayRegistry::new();
        widget.add_overlay(point("a"), true);

        assert!(registry.hide(widget.as_mut(), "a"));
        assert!(!registry.hide(widget.as_mut(), "a"));
        assert_eq!(
            registry.residence(widget.as_ref(), "a"),
            Some(Residence::Hidden(OverlayKind::Point))
        );
        assert_eq!(registry.hidden_count(), 1);

        assert!(registry.show(widget.as_mut(), "a"));
        assert!(!registry.show(widget.as_mut(), "a"));
        assert_eq!(
            registry.residence(widget.as_ref(), "a"),
            Some(Residence::Visible(OverlayKind::Point))
        );
    }

    #[test]
    fn ids_by_kind_concatenates_visible_and_hidden() {
        let mut widget = widget();
        let mut registry = OverlayRegistry::new();
        widget.add_overlay(point("a"), true);
        widget.add_overlay(point("b"), true);
        widget.add_overlay(line("l"), true);
        registry.hide(widget.as_mut(), "a");

        assert_eq!(
            registry.ids_by_kind(widget.as_ref(), OverlayKind::Point),
            vec!["b".to_string(), "a".to_string()]
        );
        assert_eq!(registry.all_ids(widget.as_ref()).len(), 3);
    }

    #[test]
    fn hide_kind_leaves_other_kinds_alone() {
        let mut widget = widget();
        let mut registry = OverlayRegistry::new();
        widget.add_overlay(point("a"), true);
        widget.add_overlay(line("l"), true);

        let hidden = registry.hide_kind(widget.as_mut(), OverlayKind::Point);
        assert_eq!(hidden, vec!["a".to_string()]);
        assert!(widget.overlay("l").is_some());

        let shown = registry.show_kind(widget.as_mut(), OverlayKind::Point);
        assert_eq!(shown, vec!["a".to_string()]);
        assert_eq!(registry.hidden_count(), 0);
    }

    #[test]
    fn remove_reaches_hidden_overlays() {
        let mut widget = widget();
        let mut registry = OverlayRegistry::new();
        widget.add_overlay(point("a"), true);
        registry.hide(widget.as_mut(), "a");

        assert!(registry.remove(widget.as_mut(), "a").is_some());
        assert!(!registry.contains(widget.as_ref(), "a"));
        assert!(registry.remove(widget.as_mut(), "a").is_none());
    }

    #[test]
    fn allocated_ids_are_fresh() {
        let widget = widget();
        let registry = OverlayRegistry::new();
        let first = registry.allocate_id(widget.as_ref());
        let second = registry.allocate_id(widget.as_ref());
        assert_ne!(first, second);
        assert_ne!(first, MAP_SUBJECT);
    }
}

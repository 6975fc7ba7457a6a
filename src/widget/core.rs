use crate::error::Result;
use crate::events::{NativeCallback, NativeEvent};
use crate::geometry::{Bounds, LatLng, PixelPoint, Size};
use crate::overlay::{MapType, Overlay, OverlayId, OverlayKind};

/// Resolved creation parameters for one widget instance.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetSpec {
    pub container: String,
    pub center: LatLng,
    pub zoom: u8,
    pub map_type: MapType,
}

impl Default for WidgetSpec {
    fn default() -> Self {
        Self {
            container: "map".to_string(),
            center: LatLng::new(30.0, 120.0),
            zoom: 5,
            map_type: MapType::Road,
        }
    }
}

/// Target of a native event subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Map,
    Overlay(OverlayId),
}

/// Surface the engine drives on the underlying map-rendering widget.
///
/// The widget owns the visible overlays; hidden ones are kept by the engine.
pub trait MapWidget: Send {
    fn set_center(&mut self, center: LatLng, zoom: u8);
    fn set_zoom(&mut self, zoom: u8);
    fn set_map_type(&mut self, map_type: MapType);
    fn center(&self) -> LatLng;
    fn zoom(&self) -> u8;
    fn map_type(&self) -> MapType;
    fn size(&self) -> Size;
    fn bounds(&self) -> Bounds;
    fn pan_by(&mut self, east: i32, south: i32);
    fn lat_lng_to_point(&self, position: LatLng) -> PixelPoint;
    fn point_to_lat_lng(&self, point: PixelPoint) -> LatLng;

    fn add_overlay(&mut self, overlay: Overlay, refresh: bool);
    fn remove_overlay(&mut self, id: &str) -> Option<Overlay>;
    fn overlay(&self, id: &str) -> Option<Overlay>;
    fn overlay_ids_by_kind(&self, kind: OverlayKind) -> Vec<OverlayId>;

    fn overlay_kind(&self, id: &str) -> Option<OverlayKind> {
        self.overlay(id).map(|overlay| overlay.kind)
    }

    fn locate_overlay(&mut self, overlay: &Overlay, zoom: Option<u8>);
    fn locate_overlays(&mut self, overlays: &[Overlay], zoom: Option<u8>);

    /// Subscriptions are permanent; the engine silences them through tombstones.
    fn add_event_listener(&mut self, target: EventTarget, event: NativeEvent, callback: NativeCallback);
}

/// Builds widgets for the construction queue. Readiness is reported
/// separately through `MapEngine::map_ready`.
pub trait WidgetFactory: Send {
    fn create(&mut self, spec: &WidgetSpec) -> Result<Box<dyn MapWidget>>;
}

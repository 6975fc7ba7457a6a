use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{MapError, Result};
use crate::events::{NativeCallback, NativeEvent};
use crate::geometry::{Bounds, LatLng, PixelPoint, Size};
use crate::overlay::{MapType, Overlay, OverlayId, OverlayKind};

use super::core::{EventTarget, MapWidget, WidgetFactory, WidgetSpec};

const TILE_SIZE: f64 = 256.0;

/// Side effects recorded by [`MemoryWidget`] for later inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetCall {
    SetCenter(LatLng, u8),
    SetZoom(u8),
    SetMapType(MapType),
    PanBy(i32, i32),
    Locate(OverlayId, Option<u8>),
    LocateMany(Vec<OverlayId>, Option<u8>),
}

struct MapState {
    container: String,
    center: LatLng,
    zoom: u8,
    map_type: MapType,
    size: Size,
    overlays: Vec<Overlay>,
    subscriptions: Vec<(EventTarget, NativeEvent, NativeCallback)>,
    calls: Vec<WidgetCall>,
}

impl MapState {
    fn new(spec: &WidgetSpec) -> Self {
        Self {
            container: spec.container.clone(),
            center: spec.center,
            zoom: spec.zoom,
            map_type: spec.map_type,
            size: Size::new(800, 600),
            overlays: Vec::new(),
            subscriptions: Vec::new(),
            calls: Vec::new(),
        }
    }

    fn pixels_per_degree(&self) -> f64 {
        TILE_SIZE * 2f64.powi(i32::from(self.zoom)) / 360.0
    }
}

/// Headless widget host. Clones share the same set of created widgets.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    maps: Arc<Mutex<Vec<Arc<Mutex<MapState>>>>>,
    fail_next: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> MemoryFactory {
        MemoryFactory {
            backend: self.clone(),
        }
    }

    /// Make the next `create` call fail with a widget error.
    pub fn fail_next_creation(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn widget_count(&self) -> usize {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Widgets are numbered in creation order.
    pub fn widget(&self, index: usize) -> Option<MemoryWidget> {
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|state| MemoryWidget {
                state: Arc::clone(state),
            })
    }

    fn spawn(&self, spec: &WidgetSpec) -> Result<MemoryWidget> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MapError::Widget(format!(
                "container `{}` could not be initialised",
                spec.container
            )));
        }
        let state = Arc::new(Mutex::new(MapState::new(spec)));
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&state));
        Ok(MemoryWidget { state })
    }
}

pub struct MemoryFactory {
    backend: MemoryBackend,
}

impl WidgetFactory for MemoryFactory {
    fn create(&mut self, spec: &WidgetSpec) -> Result<Box<dyn MapWidget>> {
        Ok(Box::new(self.backend.spawn(spec)?))
    }
}

/// In-memory map with a linear projection around its center.
#[derive(Clone)]
pub struct MemoryWidget {
    state: Arc<Mutex<MapState>>,
}

impl MemoryWidget {
    fn lock(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn container(&self) -> String {
        self.lock().container.clone()
    }

    pub fn overlay_count(&self) -> usize {
        self.lock().overlays.len()
    }

    pub fn calls(&self) -> Vec<WidgetCall> {
        self.lock().calls.clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn set_size(&self, size: Size) {
        self.lock().size = size;
    }

    /// Deliver a native event the way the rendering widget would. Overlay
    /// targets only receive events while they are on the map. Returns the
    /// number of subscriptions invoked.
    pub fn emit(&self, target: &EventTarget, event: NativeEvent, at: LatLng) -> usize {
        let callbacks: Vec<NativeCallback> = {
            let state = self.lock();
            let present = match target {
                EventTarget::Map => true,
                EventTarget::Overlay(id) => state.overlays.iter().any(|o| &o.id == id),
            };
            if !present {
                return 0;
            }
            state
                .subscriptions
                .iter()
                .filter(|(t, e, _)| t == target && *e == event)
                .map(|(_, _, callback)| Arc::clone(callback))
                .collect()
        };
        for callback in &callbacks {
            callback(at);
        }
        callbacks.len()
    }
}

impl MapWidget for MemoryWidget {
    fn set_center(&mut self, center: LatLng, zoom: u8) {
        let mut state = self.lock();
        state.center = center;
        state.zoom = zoom;
        state.calls.push(WidgetCall::SetCenter(center, zoom));
    }

    fn set_zoom(&mut self, zoom: u8) {
        let mut state = self.lock();
        state.zoom = zoom;
        state.calls.push(WidgetCall::SetZoom(zoom));
    }

    fn set_map_type(&mut self, map_type: MapType) {
        let mut state = self.lock();
        state.map_type = map_type;
        state.calls.push(WidgetCall::SetMapType(map_type));
    }

    fn center(&self) -> LatLng {
        self.lock().center
    }

    fn zoom(&self) -> u8 {
        self.lock().zoom
    }

    fn map_type(&self) -> MapType {
        self.lock().map_type
    }

    fn size(&self) -> Size {
        self.lock().size
    }

    fn bounds(&self) -> Bounds {
        let south_west = self.point_to_lat_lng(PixelPoint::new(0.0, f64::from(self.size().height)));
        let north_east = self.point_to_lat_lng(PixelPoint::new(f64::from(self.size().width), 0.0));
        Bounds::new(south_west, north_east)
    }

    fn pan_by(&mut self, east: i32, south: i32) {
        let mut state = self.lock();
        let ppd = state.pixels_per_degree();
        state.center.lng += f64::from(east) / ppd;
        state.center.lat -= f64::from(south) / ppd;
        state.calls.push(WidgetCall::PanBy(east, south));
    }

    fn lat_lng_to_point(&self, position: LatLng) -> PixelPoint {
        let state = self.lock();
        let ppd = state.pixels_per_degree();
        let x = f64::from(state.size.width) / 2.0 + (position.lng - state.center.lng) * ppd;
        let y = f64::from(state.size.height) / 2.0 - (position.lat - state.center.lat) * ppd;
        PixelPoint::new(x, y)
    }

    fn point_to_lat_lng(&self, point: PixelPoint) -> LatLng {
        let state = self.lock();
        let ppd = state.pixels_per_degree();
        let lng = state.center.lng + (point.x - f64::from(state.size.width) / 2.0) / ppd;
        let lat = state.center.lat - (point.y - f64::from(state.size.height) / 2.0) / ppd;
        LatLng::new(lat, lng)
    }

    fn add_overlay(&mut self, overlay: Overlay, _refresh: bool) {
        let mut state = self.lock();
        state.overlays.retain(|existing| existing.id != overlay.id);
        state.overlays.push(overlay);
    }

    fn remove_overlay(&mut self, id: &str) -> Option<Overlay> {
        let mut state = self.lock();
        let idx = state.overlays.iter().position(|overlay| overlay.id == id)?;
        Some(state.overlays.remove(idx))
    }

    fn overlay(&self, id: &str) -> Option<Overlay> {
        self.lock()
            .overlays
            .iter()
            .find(|overlay| overlay.id == id)
            .cloned()
    }

    fn overlay_kind(&self, id: &str) -> Option<OverlayKind> {
        self.lock()
            .overlays
            .iter()
            .find(|overlay| overlay.id == id)
            .map(|overlay| overlay.kind)
    }

    fn overlay_ids_by_kind(&self, kind: OverlayKind) -> Vec<OverlayId> {
        self.lock()
            .overlays
            .iter()
            .filter(|overlay| overlay.kind == kind)
            .map(|overlay| overlay.id.clone())
            .collect()
    }

    fn locate_overlay(&mut self, overlay: &Overlay, zoom: Option<u8>) {
        self.lock()
            .calls
            .push(WidgetCall::Locate(overlay.id.clone(), zoom));
    }

    fn locate_overlays(&mut self, overlays: &[Overlay], zoom: Option<u8>) {
        let ids = overlays.iter().map(|overlay| overlay.id.clone()).collect();
        self.lock().calls.push(WidgetCall::LocateMany(ids, zoom));
    }

    fn add_event_listener(&mut self, target: EventTarget, event: NativeEvent, callback: NativeCallback) {
        self.lock().subscriptions.push((target, event, callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_round_trips_through_pixels() {
        let backend = MemoryBackend::new();
        let widget = backend.spawn(&WidgetSpec::default()).unwrap();
        let position = LatLng::new(31.0, 121.5);

        let pixel = widget.lat_lng_to_point(position);
        let back = widget.point_to_lat_lng(pixel);

        assert!((back.lat - position.lat).abs() < 1e-9);
        assert!((back.lng - position.lng).abs() < 1e-9);
        let center = widget.lat_lng_to_point(widget.center());
        assert_eq!(center, PixelPoint::new(400.0, 300.0));
    }

    #[test]
    fn emit_skips_overlays_that_are_off_the_map() {
        let backend = MemoryBackend::new();
        let mut widget = backend.spawn(&WidgetSpec::default()).unwrap();
        let target = EventTarget::Overlay("p".to_string());
        widget.add_event_listener(target.clone(), NativeEvent::Click, Arc::new(|_: LatLng| {}));

        assert_eq!(widget.emit(&target, NativeEvent::Click, LatLng::new(0.0, 0.0)), 0);
        assert_eq!(widget.emit(&EventTarget::Map, NativeEvent::Click, LatLng::new(0.0, 0.0)), 0);
    }

    #[test]
    fn failed_creation_is_reported_once() {
        let backend = MemoryBackend::new();
        let mut factory = backend.factory();
        backend.fail_next_creation();

        assert!(matches!(
            factory.create(&WidgetSpec::default()),
            Err(MapError::Widget(_))
        ));
        assert!(factory.create(&WidgetSpec::default()).is_ok());
        assert_eq!(backend.widget_count(), 1);
    }
}

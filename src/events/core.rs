use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::geometry::LatLng;

/// Payload delivered to every listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEvent {
    pub lat: f64,
    pub lng: f64,
    /// Overlay id, group id or the map subject id.
    pub id: String,
}

impl MapEvent {
    pub fn new(position: LatLng, id: impl Into<String>) -> Self {
        Self {
            lat: position.lat,
            lng: position.lng,
            id: id.into(),
        }
    }
}

pub type Listener = Arc<dyn Fn(&MapEvent) + Send + Sync>;

/// Callback wired into the widget's own event system.
pub type NativeCallback = Arc<dyn Fn(LatLng) + Send + Sync>;

/// Event kinds the widget itself can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeEvent {
    MoveEnd,
    ZoomChanged,
    MapTypeChanged,
    Click,
    DoubleClick,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseOver,
    MouseOut,
}

impl NativeEvent {
    /// View changes are only meaningful on the map subject.
    pub fn is_view_change(self) -> bool {
        matches!(
            self,
            Self::MoveEnd | Self::ZoomChanged | Self::MapTypeChanged
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Hide,
    Show,
    Remove,
    Change,
    Zoom,
    ChangeMapType,
    Click,
    DoubleClick,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseOver,
    MouseOut,
    /// Unrecognised names are stored and fanned out but never delivered natively.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "onadd",
            Self::Hide => "onhide",
            Self::Show => "onshow",
            Self::Remove => "onremove",
            Self::Change => "onchange",
            Self::Zoom => "onzoom",
            Self::ChangeMapType => "onchangemaptype",
            Self::Click => "onclick",
            Self::DoubleClick => "ondoubleclick",
            Self::MouseDown => "onmousedown",
            Self::MouseUp => "onmouseup",
            Self::MouseMove => "onmousemove",
            Self::MouseOver => "onmouseover",
            Self::MouseOut => "onmouseout",
            Self::Other(name) => name,
        }
    }

    pub fn native(&self) -> Option<NativeEvent> {
        match self {
            Self::Change => Some(NativeEvent::MoveEnd),
            Self::Zoom => Some(NativeEvent::ZoomChanged),
            Self::ChangeMapType => Some(NativeEvent::MapTypeChanged),
            Self::Click => Some(NativeEvent::Click),
            Self::DoubleClick => Some(NativeEvent::DoubleClick),
            Self::MouseDown => Some(NativeEvent::MouseDown),
            Self::MouseUp => Some(NativeEvent::MouseUp),
            Self::MouseMove => Some(NativeEvent::MouseMove),
            Self::MouseOver => Some(NativeEvent::MouseOver),
            Self::MouseOut => Some(NativeEvent::MouseOut),
            _ => None,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "onadd" => Self::Add,
            "onhide" => Self::Hide,
            "onshow" => Self::Show,
            "onremove" => Self::Remove,
            "onchange" => Self::Change,
            "onzoom" => Self::Zoom,
            "onchangemaptype" => Self::ChangeMapType,
            "onclick" => Self::Click,
            "ondoubleclick" => Self::DoubleClick,
            "onmousedown" => Self::MouseDown,
            "onmouseup" => Self::MouseUp,
            "onmousemove" => Self::MouseMove,
            "onmouseover" => Self::MouseOver,
            "onmouseout" => Self::MouseOut,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered callback plus its tombstone flag.
///
/// Clones share the flag, so a trampoline handed to the widget goes quiet the
/// moment its registration is removed.
#[derive(Clone)]
pub struct ListenerHandle {
    callback: Listener,
    active: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl ListenerHandle {
    pub fn new(callback: Listener) -> Self {
        Self {
            callback,
            active: Arc::new(AtomicBool::new(true)),
            parent: None,
        }
    }

    /// A handle sharing this callback with a flag of its own. It goes quiet
    /// when either flag is tombstoned.
    pub fn bind(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            active: Arc::new(AtomicBool::new(true)),
            parent: Some(Arc::clone(&self.active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self
                .parent
                .as_ref()
                .is_none_or(|parent| parent.load(Ordering::Acquire))
    }

    pub fn tombstone(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Invoke the callback unless the handle has been tombstoned.
    pub fn fire(&self, event: &MapEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        (self.callback)(event);
        true
    }

    /// Invoke the callback regardless of the tombstone.
    pub(crate) fn fire_unchecked(&self, event: &MapEvent) {
        (self.callback)(event);
    }

    /// Widget-level adapter reporting `subject` as the event id.
    pub fn trampoline(&self, subject: impl Into<String>) -> NativeCallback {
        let handle = self.clone();
        let subject = subject.into();
        Arc::new(move |position: LatLng| {
            handle.fire(&MapEvent::new(position.normalized(), subject.clone()));
        })
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Ordered handle lists keyed by `(subject, kind)` for one map.
#[derive(Debug, Default)]
pub struct ListenerTable {
    entries: HashMap<String, HashMap<EventKind, Vec<ListenerHandle>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subject: &str, kind: EventKind, handle: ListenerHandle) {
        self.entries
            .entry(subject.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .push(handle);
    }

    pub fn handles(&self, subject: &str, kind: &EventKind) -> &[ListenerHandle] {
        self.entries
            .get(subject)
            .and_then(|kinds| kinds.get(kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tombstone and drop every handle under the key. Returns how many were removed.
    pub fn clear(&mut self, subject: &str, kind: &EventKind) -> usize {
        let Some(kinds) = self.entries.get_mut(subject) else {
            return 0;
        };
        let removed = kinds.remove(kind).unwrap_or_default();
        for handle in &removed {
            handle.tombstone();
        }
        removed.len()
    }

    /// Tombstone and drop every handle of a subject, returning them by kind.
    pub fn drop_subject(&mut self, subject: &str) -> HashMap<EventKind, Vec<ListenerHandle>> {
        let removed = self.entries.remove(subject).unwrap_or_default();
        for handle in removed.values().flatten() {
            handle.tombstone();
        }
        removed
    }

    pub fn count(&self, subject: &str, kind: &EventKind) -> usize {
        self.handles(subject, kind).len()
    }
}

/// `kind -> callback` pairs supplied to the registration commands.
#[derive(Clone, Default)]
pub struct EventHandlers {
    entries: Vec<(EventKind, Listener)>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, kind: impl Into<EventKind>, callback: F) -> Self
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.entries.push((kind.into(), Arc::new(callback)));
        self
    }

    pub fn on_listener(mut self, kind: impl Into<EventKind>, listener: Listener) -> Self {
        self.entries.push((kind.into(), listener));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventKind, &Listener)> {
        self.entries.iter().map(|(kind, listener)| (kind, listener))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(kind, _)| kind.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_handle(counter: &Arc<AtomicUsize>) -> ListenerHandle {
        let counter = Arc::clone(counter);
        ListenerHandle::new(Arc::new(move |_event: &MapEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn names_round_trip_through_kinds() {
        for name in ["onadd", "onhide", "onchangemaptype", "onmouseout"] {
            assert_eq!(EventKind::from(name).as_str(), name);
        }
        assert_eq!(
            EventKind::from("onhover"),
            EventKind::Other("onhover".to_string())
        );
        assert_eq!(EventKind::from("onhover").native(), None);
        assert_eq!(EventKind::Remove.native(), None);
        assert_eq!(EventKind::Zoom.native(), Some(NativeEvent::ZoomChanged));
    }

    #[test]
    fn tombstoned_trampoline_goes_quiet() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = counting_handle(&counter);
        let trampoline = handle.trampoline("p1");

        trampoline(LatLng::new(1.0, -10.0));
        handle.tombstone();
        trampoline(LatLng::new(1.0, -10.0));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trampoline_reports_subject_and_normalized_lng() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = ListenerHandle::new(Arc::new(move |event: &MapEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        handle.trampoline("g1")(LatLng::new(5.0, -90.0));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].id, "g1");
        assert_eq!(seen[0].lng, 270.0);
    }

    #[test]
    fn bound_handle_answers_to_both_flags() {
        let counter = Arc::new(AtomicUsize::new(0));
        let group = counting_handle(&counter);
        let first = group.bind();
        let second = group.bind();

        first.tombstone();
        assert!(!first.fire(&MapEvent::new(LatLng::new(0.0, 0.0), "g")));
        assert!(second.fire(&MapEvent::new(LatLng::new(0.0, 0.0), "g")));
        assert!(group.is_active());

        group.tombstone();
        assert!(!second.is_active());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_tombstones_only_the_requested_key() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = ListenerTable::new();
        let hide = counting_handle(&counter);
        let show = counting_handle(&counter);
        table.push("o", EventKind::Hide, hide.clone());
        table.push("o", EventKind::Show, show.clone());

        assert_eq!(table.clear("o", &EventKind::Hide), 1);
        assert!(!hide.is_active());
        assert!(show.is_active());
        assert_eq!(table.count("o", &EventKind::Hide), 0);
        assert_eq!(table.count("o", &EventKind::Show), 1);
        assert_eq!(table.clear("missing", &EventKind::Hide), 0);
    }

    #[test]
    fn drop_subject_returns_handles_by_kind() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = ListenerTable::new();
        table.push("o", EventKind::Remove, counting_handle(&counter));
        table.push("o", EventKind::Click, counting_handle(&counter));

        let removed = table.drop_subject("o");
        assert_eq!(removed.len(), 2);
        assert!(removed.values().flatten().all(|h| !h.is_active()));
        assert!(table.handles("o", &EventKind::Remove).is_empty());
    }
}

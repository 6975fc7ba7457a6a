use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MapError, Result};
use crate::events::{EventHandlers, EventKind, EventPool};
use crate::geometry::{Bounds, LatLng, PixelPoint, Size};
use crate::overlay::{GroupId, MapType, OverlayId, OverlayKind};
use crate::style::{Fill, Label, Stroke};

use super::MapEngine;
use super::dispatch::{ResultToken, SlotState};

macro_rules! operations {
    ($($variant:ident = $index:literal => $name:literal,)*) => {
        /// The public command surface, addressable by stable index or name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum Operation {
            $($variant,)*
        }

        impl Operation {
            /// Every operation, ordered by index.
            pub const ALL: &'static [Operation] = &[$(Operation::$variant,)*];

            pub const fn index(self) -> usize {
                match self {
                    $(Self::$variant => $index,)*
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

operations! {
    SetCenter = 0 => "setCenter",
    SetZoom = 1 => "setZoom",
    SetMapType = 2 => "setMapType",
    GetCenter = 3 => "getCenter",
    GetZoom = 4 => "getZoom",
    GetMapType = 5 => "getMapType",
    GetSize = 6 => "getSize",
    GetBounds = 7 => "getBounds",
    Translate = 8 => "translate",
    FromLatLngToPoint = 9 => "fromLatLngToPoint",
    FromPointToLatLng = 10 => "fromPointToLatLng",
    AddPoint = 11 => "addPoint",
    AddPolyline = 12 => "addPolyline",
    AddPolygon = 13 => "addPolygon",
    GetType = 14 => "getType",
    GetByType = 15 => "getByType",
    Locate = 16 => "locate",
    Remove = 17 => "remove",
    RemoveByType = 18 => "removeByType",
    RemoveAll = 19 => "removeAll",
    Hide = 20 => "hide",
    HideByType = 21 => "hideByType",
    HideAll = 22 => "hideAll",
    Show = 23 => "show",
    ShowByType = 24 => "showByType",
    ShowAll = 25 => "showAll",
    IsHidden = 26 => "isHidden",
    AddMapEvent = 27 => "addMapEvent",
    AddOverlayEvent = 28 => "addOverlayEvent",
    AddOverlayEventByType = 29 => "addOverlayEventByType",
    AddOverlayEventToAll = 30 => "addOverlayEventToAll",
    RemoveMapEvent = 31 => "removeMapEvent",
    RemoveOverlayEvent = 32 => "removeOverlayEvent",
    RemoveOverlayEventByType = 33 => "removeOverlayEventByType",
    RemoveAllOverlayEvent = 34 => "removeAllOverlayEvent",
    Group = 35 => "group",
    Ungroup = 36 => "ungroup",
    GetGroup = 37 => "getGroup",
    RemoveGroup = 38 => "removeGroup",
    HideGroup = 39 => "hideGroup",
    ShowGroup = 40 => "showGroup",
    LocateGroup = 41 => "locateGroup",
    AddGroupEvent = 42 => "addGroupEvent",
    RemoveGroupEvent = 43 => "removeGroupEvent",
    Run = 44 => "run",
}

impl Operation {
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Subjects notified after the operation runs.
    pub fn event_pool(self) -> EventPool {
        match self {
            Self::AddPoint | Self::AddPolyline | Self::AddPolygon => EventPool::MapOnly,
            Self::Hide
            | Self::HideByType
            | Self::HideAll
            | Self::HideGroup
            | Self::Show
            | Self::ShowByType
            | Self::ShowAll
            | Self::ShowGroup => EventPool::Changed,
            _ => EventPool::None,
        }
    }

    pub fn trigger(self) -> Option<EventKind> {
        match self {
            Self::AddPoint | Self::AddPolyline | Self::AddPolygon => Some(EventKind::Add),
            Self::Hide | Self::HideByType | Self::HideAll | Self::HideGroup => {
                Some(EventKind::Hide)
            }
            Self::Show | Self::ShowByType | Self::ShowAll | Self::ShowGroup => {
                Some(EventKind::Show)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = MapError;

    fn from_str(name: &str) -> Result<Self> {
        Self::from_name(name).ok_or_else(|| MapError::UnknownOperation(name.to_string()))
    }
}

/// Value produced by one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Unit,
    Bool(bool),
    Count(usize),
    Id(String),
    Ids(Vec<String>),
    Zoom(u8),
    MapType(MapType),
    Kind(OverlayKind),
    Position(LatLng),
    Pixel(PixelPoint),
    Size(Size),
    Bounds(Bounds),
}

impl Outcome {
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_ids(&self) -> Option<&[String]> {
        match self {
            Self::Ids(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }
}

/// Types a command argument can be extracted as from an earlier outcome.
pub trait FromOutcome: Sized {
    const EXPECTED: &'static str;

    fn from_outcome(outcome: Outcome) -> Option<Self>;
}

macro_rules! from_outcome {
    ($ty:ty, $expected:literal, $variant:ident) => {
        impl FromOutcome for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_outcome(outcome: Outcome) -> Option<Self> {
                match outcome {
                    Outcome::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Arg<$ty> {
            fn from(value: $ty) -> Self {
                Arg::Value(value)
            }
        }
    };
}

from_outcome!(String, "id", Id);
from_outcome!(Vec<String>, "id list", Ids);
from_outcome!(bool, "bool", Bool);
from_outcome!(usize, "count", Count);
from_outcome!(u8, "zoom", Zoom);
from_outcome!(MapType, "map type", MapType);
from_outcome!(OverlayKind, "overlay kind", Kind);
from_outcome!(LatLng, "position", Position);
from_outcome!(PixelPoint, "pixel", Pixel);

/// A command argument: a literal, or the result of an earlier queued command.
#[derive(Debug, Clone)]
pub enum Arg<T> {
    Value(T),
    Token(ResultToken),
}

impl<T: FromOutcome> Arg<T> {
    pub fn resolve(self) -> Result<T> {
        let token = match self {
            Self::Value(value) => return Ok(value),
            Self::Token(token) => token,
        };
        let position = token.position();
        match token.state() {
            SlotState::Pending => Err(MapError::UnresolvedToken { position }),
            SlotState::Failed(error) => Err(MapError::DependencyFailed {
                position,
                source: Box::new(error),
            }),
            SlotState::Resolved(outcome) => {
                T::from_outcome(outcome).ok_or(MapError::TokenMismatch {
                    position,
                    expected: T::EXPECTED,
                })
            }
        }
    }
}

impl<T> From<ResultToken> for Arg<T> {
    fn from(token: ResultToken) -> Self {
        Arg::Token(token)
    }
}

impl<T> From<&ResultToken> for Arg<T> {
    fn from(token: &ResultToken) -> Self {
        Arg::Token(token.clone())
    }
}

impl From<&str> for Arg<String> {
    fn from(value: &str) -> Self {
        Arg::Value(value.to_string())
    }
}

/// Arguments of `addPoint`. Omitted options fall back to the engine defaults.
#[derive(Debug, Clone)]
pub struct PointSpec {
    pub id: Option<OverlayId>,
    pub position: Arg<LatLng>,
    pub label: Option<Label>,
    pub image_url: Option<String>,
    pub zoom_levels: Option<(u8, u8)>,
    pub z_index: Option<i32>,
    pub image_offset: Option<(i32, i32)>,
    pub editable: Option<bool>,
}

impl PointSpec {
    pub fn new(position: impl Into<Arg<LatLng>>) -> Self {
        Self {
            id: None,
            position: position.into(),
            label: None,
            image_url: None,
            zoom_levels: None,
            z_index: None,
            image_offset: None,
            editable: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<OverlayId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_zoom_levels(mut self, min: u8, max: u8) -> Self {
        self.zoom_levels = Some((min, max));
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn with_image_offset(mut self, x: i32, y: i32) -> Self {
        self.image_offset = Some((x, y));
        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = Some(editable);
        self
    }
}

/// Arguments of `addPolyline`.
#[derive(Debug, Clone)]
pub struct PolylineSpec {
    pub id: Option<OverlayId>,
    pub path: Vec<LatLng>,
    pub stroke: Option<Stroke>,
    pub label: Option<Label>,
    pub zoom_levels: Option<(u8, u8)>,
    pub z_index: Option<i32>,
    pub editable: Option<bool>,
}

impl PolylineSpec {
    pub fn new(path: Vec<LatLng>) -> Self {
        Self {
            id: None,
            path,
            stroke: None,
            label: None,
            zoom_levels: None,
            z_index: None,
            editable: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<OverlayId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_stroke(mut self, stroke: Stroke) -> Self {
        self.stroke = Some(stroke);
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_zoom_levels(mut self, min: u8, max: u8) -> Self {
        self.zoom_levels = Some((min, max));
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = Some(editable);
        self
    }
}

/// Arguments of `addPolygon`.
#[derive(Debug, Clone)]
pub struct PolygonSpec {
    pub id: Option<OverlayId>,
    pub path: Vec<LatLng>,
    pub stroke: Option<Stroke>,
    pub fill: Option<Fill>,
    pub label: Option<Label>,
    pub zoom_levels: Option<(u8, u8)>,
    pub z_index: Option<i32>,
    pub editable: Option<bool>,
}

impl PolygonSpec {
    pub fn new(path: Vec<LatLng>) -> Self {
        Self {
            id: None,
            path,
            stroke: None,
            fill: None,
            label: None,
            zoom_levels: None,
            z_index: None,
            editable: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<OverlayId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_stroke(mut self, stroke: Stroke) -> Self {
        self.stroke = Some(stroke);
        self
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_zoom_levels(mut self, min: u8, max: u8) -> Self {
        self.zoom_levels = Some((min, max));
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = Some(editable);
        self
    }
}

/// Body of a `run` command. Commands it submits execute as one atomic run.
pub type RunFn = Box<dyn FnOnce(&mut MapEngine) -> Result<Outcome> + Send>;

/// One invocation of an [`Operation`] with its arguments.
pub enum Command {
    SetCenter {
        center: Arg<LatLng>,
        zoom: Option<Arg<u8>>,
    },
    SetZoom(Arg<u8>),
    SetMapType(Arg<MapType>),
    GetCenter,
    GetZoom,
    GetMapType,
    GetSize,
    GetBounds,
    Translate {
        east: i32,
        south: i32,
    },
    FromLatLngToPoint(Arg<LatLng>),
    FromPointToLatLng(Arg<PixelPoint>),
    AddPoint(PointSpec),
    AddPolyline(PolylineSpec),
    AddPolygon(PolygonSpec),
    GetType(Arg<OverlayId>),
    GetByType(Arg<OverlayKind>),
    Locate {
        id: Arg<OverlayId>,
        zoom: Option<u8>,
    },
    Remove(Arg<OverlayId>),
    RemoveByType(Arg<OverlayKind>),
    RemoveAll,
    Hide(Arg<OverlayId>),
    HideByType(Arg<OverlayKind>),
    HideAll,
    Show(Arg<OverlayId>),
    ShowByType(Arg<OverlayKind>),
    ShowAll,
    IsHidden(Arg<OverlayId>),
    AddMapEvent(EventHandlers),
    AddOverlayEvent {
        id: Arg<OverlayId>,
        handlers: EventHandlers,
    },
    AddOverlayEventByType {
        kind: Arg<OverlayKind>,
        handlers: EventHandlers,
    },
    AddOverlayEventToAll(EventHandlers),
    RemoveMapEvent(EventKind),
    RemoveOverlayEvent {
        id: Arg<OverlayId>,
        event: EventKind,
    },
    RemoveOverlayEventByType {
        kind: Arg<OverlayKind>,
        event: EventKind,
    },
    RemoveAllOverlayEvent(EventKind),
    Group {
        id: Option<GroupId>,
        members: Vec<Arg<OverlayId>>,
    },
    Ungroup(Arg<GroupId>),
    GetGroup(Arg<GroupId>),
    RemoveGroup(Arg<GroupId>),
    HideGroup(Arg<GroupId>),
    ShowGroup(Arg<GroupId>),
    LocateGroup {
        id: Arg<GroupId>,
        zoom: Option<u8>,
    },
    AddGroupEvent {
        id: Arg<GroupId>,
        handlers: EventHandlers,
    },
    RemoveGroupEvent {
        id: Arg<GroupId>,
        event: EventKind,
    },
    Run(RunFn),
}

impl Command {
    pub fn operation(&self) -> Operation {
        match self {
            Self::SetCenter { .. } => Operation::SetCenter,
            Self::SetZoom(_) => Operation::SetZoom,
            Self::SetMapType(_) => Operation::SetMapType,
            Self::GetCenter => Operation::GetCenter,
            Self::GetZoom => Operation::GetZoom,
            Self::GetMapType => Operation::GetMapType,
            Self::GetSize => Operation::GetSize,
            Self::GetBounds => Operation::GetBounds,
            Self::Translate { .. } => Operation::Translate,
            Self::FromLatLngToPoint(_) => Operation::FromLatLngToPoint,
            Self::FromPointToLatLng(_) => Operation::FromPointToLatLng,
            Self::AddPoint(_) => Operation::AddPoint,
            Self::AddPolyline(_) => Operation::AddPolyline,
            Self::AddPolygon(_) => Operation::AddPolygon,
            Self::GetType(_) => Operation::GetType,
            Self::GetByType(_) => Operation::GetByType,
            Self::Locate { .. } => Operation::Locate,
            Self::Remove(_) => Operation::Remove,
            Self::RemoveByType(_) => Operation::RemoveByType,
            Self::RemoveAll => Operation::RemoveAll,
            Self::Hide(_) => Operation::Hide,
            Self::HideByType(_) => Operation::HideByType,
            Self::HideAll => Operation::HideAll,
            Self::Show(_) => Operation::Show,
            Self::ShowByType(_) => Operation::ShowByType,
            Self::ShowAll => Operation::ShowAll,
            Self::IsHidden(_) => Operation::IsHidden,
            Self::AddMapEvent(_) => Operation::AddMapEvent,
            Self::AddOverlayEvent { .. } => Operation::AddOverlayEvent,
            Self::AddOverlayEventByType { .. } => Operation::AddOverlayEventByType,
            Self::AddOverlayEventToAll(_) => Operation::AddOverlayEventToAll,
            Self::RemoveMapEvent(_) => Operation::RemoveMapEvent,
            Self::RemoveOverlayEvent { .. } => Operation::RemoveOverlayEvent,
            Self::RemoveOverlayEventByType { .. } => Operation::RemoveOverlayEventByType,
            Self::RemoveAllOverlayEvent(_) => Operation::RemoveAllOverlayEvent,
            Self::Group { .. } => Operation::Group,
            Self::Ungroup(_) => Operation::Ungroup,
            Self::GetGroup(_) => Operation::GetGroup,
            Self::RemoveGroup(_) => Operation::RemoveGroup,
            Self::HideGroup(_) => Operation::HideGroup,
            Self::ShowGroup(_) => Operation::ShowGroup,
            Self::LocateGroup { .. } => Operation::LocateGroup,
            Self::AddGroupEvent { .. } => Operation::AddGroupEvent,
            Self::RemoveGroupEvent { .. } => Operation::RemoveGroupEvent,
            Self::Run(_) => Operation::Run,
        }
    }

    pub fn set_center(center: impl Into<Arg<LatLng>>, zoom: Option<u8>) -> Self {
        Self::SetCenter {
            center: center.into(),
            zoom: zoom.map(Arg::Value),
        }
    }

    pub fn add_point(spec: PointSpec) -> Self {
        Self::AddPoint(spec)
    }

    pub fn get_type(id: impl Into<Arg<OverlayId>>) -> Self {
        Self::GetType(id.into())
    }

    pub fn get_by_type(kind: OverlayKind) -> Self {
        Self::GetByType(Arg::Value(kind))
    }

    pub fn remove(id: impl Into<Arg<OverlayId>>) -> Self {
        Self::Remove(id.into())
    }

    pub fn hide(id: impl Into<Arg<OverlayId>>) -> Self {
        Self::Hide(id.into())
    }

    pub fn show(id: impl Into<Arg<OverlayId>>) -> Self {
        Self::Show(id.into())
    }

    pub fn is_hidden(id: impl Into<Arg<OverlayId>>) -> Self {
        Self::IsHidden(id.into())
    }

    pub fn add_overlay_event(id: impl Into<Arg<OverlayId>>, handlers: EventHandlers) -> Self {
        Self::AddOverlayEvent {
            id: id.into(),
            handlers,
        }
    }

    pub fn group<I, A>(id: Option<&str>, members: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg<OverlayId>>,
    {
        Self::Group {
            id: id.map(str::to_string),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get_group(id: impl Into<Arg<GroupId>>) -> Self {
        Self::GetGroup(id.into())
    }

    pub fn remove_group(id: impl Into<Arg<GroupId>>) -> Self {
        Self::RemoveGroup(id.into())
    }

    pub fn add_group_event(id: impl Into<Arg<GroupId>>, handlers: EventHandlers) -> Self {
        Self::AddGroupEvent {
            id: id.into(),
            handlers,
        }
    }

    pub fn run<F>(body: F) -> Self
    where
        F: FnOnce(&mut MapEngine) -> Result<Outcome> + Send + 'static,
    {
        Self::Run(Box::new(body))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.operation().name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_table_order() {
        assert_eq!(Operation::ALL.len(), 45);
        for (position, operation) in Operation::ALL.iter().enumerate() {
            assert_eq!(operation.index(), position);
            assert_eq!(Operation::from_index(position), Some(*operation));
        }
        assert_eq!(Operation::from_index(45), None);
    }

    #[test]
    fn names_parse_back_to_operations() {
        assert_eq!("addPolygon".parse::<Operation>(), Ok(Operation::AddPolygon));
        assert_eq!(Operation::RemoveAllOverlayEvent.to_string(), "removeAllOverlayEvent");
        assert_eq!(
            "explode".parse::<Operation>(),
            Err(MapError::UnknownOperation("explode".to_string()))
        );
    }

    #[test]
    fn pools_and_triggers_match_the_table() {
        assert_eq!(Operation::AddPoint.event_pool(), EventPool::MapOnly);
        assert_eq!(Operation::AddPoint.trigger(), Some(EventKind::Add));
        assert_eq!(Operation::HideGroup.event_pool(), EventPool::Changed);
        assert_eq!(Operation::ShowAll.trigger(), Some(EventKind::Show));
        assert_eq!(Operation::Remove.event_pool(), EventPool::None);
        assert_eq!(Operation::Remove.trigger(), None);
        let notifying = Operation::ALL
            .iter()
            .filter(|operation| operation.trigger().is_some())
            .count();
        assert_eq!(notifying, 11);
    }

    #[test]
    fn value_args_resolve_immediately() {
        let arg: Arg<OverlayId> = "p1".into();
        assert_eq!(arg.resolve(), Ok("p1".to_string()));
        let zoom: Arg<u8> = 7u8.into();
        assert_eq!(zoom.resolve(), Ok(7));
    }

    #[test]
    fn command_reports_its_operation() {
        let command = Command::group(Some("g"), ["a", "b"]);
        assert_eq!(command.operation(), Operation::Group);
        assert_eq!(format!("{command:?}"), "Command(\"group\")");
        assert_eq!(Command::run(|_| Ok(Outcome::Unit)).operation(), Operation::Run);
    }
}

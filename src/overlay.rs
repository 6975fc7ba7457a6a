use serde::Serialize;

use crate::geometry::LatLng;
use crate::style::{Fill, Label, Stroke};

pub type OverlayId = String;
pub type GroupId = String;

/// Reserved subject id for listeners attached to the map itself.
pub const MAP_SUBJECT: &str = "__map__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Point,
    Polyline,
    Polygon,
}

impl OverlayKind {
    /// Fixed iteration order used by the bulk commands.
    pub const ALL: [OverlayKind; 3] = [Self::Point, Self::Polyline, Self::Polygon];

    pub const fn index(self) -> usize {
        match self {
            Self::Point => 0,
            Self::Polyline => 1,
            Self::Polygon => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Polyline => "polyline",
            Self::Polygon => "polygon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapType {
    /// Nautical chart tiles.
    Chart,
    #[default]
    Road,
    Satellite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Shape {
    Point(LatLng),
    Path(Vec<LatLng>),
}

/// Fully resolved option record handed to the widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayOptions {
    pub zoom_levels: (u8, u8),
    pub z_index: i32,
    pub editable: bool,
    pub label: Option<Label>,
    pub stroke: Option<Stroke>,
    pub fill: Option<Fill>,
    pub image_url: Option<String>,
    pub image_offset: (i32, i32),
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            zoom_levels: (1, 18),
            z_index: 3,
            editable: false,
            label: None,
            stroke: None,
            fill: None,
            image_url: None,
            image_offset: (0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub id: OverlayId,
    pub kind: OverlayKind,
    pub shape: Shape,
    pub options: OverlayOptions,
}

//! Deferred command execution and event aggregation for a map widget.
//!
//! Commands issued before a map is ready are queued and replayed in order
//! once every map reports ready; results of queued commands are handed out
//! as tokens that later commands may consume. After each command the engine
//! notifies listeners on the affected overlays, their groups and the map.

pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod logging;
pub mod metrics;
pub mod overlay;
pub mod registry;
pub mod style;
pub mod widget;

pub use engine::{
    Arg, BufferedEngineAudit, Command, DrainFailure, DrainPolicy, DrainReport, EngineAudit,
    EngineAuditEvent, EngineAuditEventBuilder, EngineAuditStage, EngineConfig, FromOutcome,
    MapDefaults, MapEngine, MapId, MapOptions, NullEngineAudit, Operation, Outcome, PointSpec,
    PolygonSpec, PolylineSpec, ReadyHook, ResultToken, SlotState, Submission,
};
pub use error::{MapError, Result};
pub use events::{EventHandlers, EventKind, Listener, MapEvent, NativeEvent};
pub use geometry::{Bounds, LatLng, PixelPoint, Size, WORLD_PIXEL_WIDTH};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult, MemorySink};
pub use metrics::{EngineMetrics, MetricSnapshot};
pub use overlay::{GroupId, MAP_SUBJECT, MapType, Overlay, OverlayId, OverlayKind, Shape};
pub use style::{Fill, Font, Label, Stroke, StyleDefaults};
pub use widget::{EventTarget, MapWidget, MemoryBackend, MemoryWidget, WidgetFactory, WidgetSpec};

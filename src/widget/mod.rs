//! Widget module orchestrator.
//!
//! `core` defines the surface the engine needs from a map-rendering widget;
//! `memory` is a headless implementation used by tests, benches and demos.

mod core;
mod memory;

pub use self::core::{EventTarget, MapWidget, WidgetFactory, WidgetSpec};
pub use memory::{MemoryBackend, MemoryFactory, MemoryWidget, WidgetCall};

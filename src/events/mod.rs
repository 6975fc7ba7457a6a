//! Event module orchestrator.
//!
//! Listener bookkeeping lives in `core`; the per-command fan-out pass lives in
//! `aggregate`.

mod aggregate;
mod core;

pub use aggregate::{Aggregator, EventPool, FanOut, FanOutContext, RemovalStaging};
pub use self::core::{
    EventHandlers, EventKind, Listener, ListenerHandle, ListenerTable, MapEvent, NativeCallback,
    NativeEvent,
};

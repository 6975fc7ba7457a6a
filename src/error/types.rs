use thiserror::Error;

use crate::engine::MapId;

/// Unified result type for the map relay crate.
pub type Result<T> = std::result::Result<T, MapError>;

/// Errors surfaced by the command engine.
///
/// The two domain failures are `IdAlreadyExists` and `IdNotFound`; the rest
/// describe the deferred-execution machinery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("id `{0}` already exists")]
    IdAlreadyExists(String),
    #[error("id `{0}` does not exist")]
    IdNotFound(String),
    #[error("map {0} does not exist")]
    MapNotFound(MapId),
    #[error("result token #{position} has not been resolved yet")]
    UnresolvedToken { position: usize },
    #[error("result token #{position} does not hold a {expected} value")]
    TokenMismatch {
        position: usize,
        expected: &'static str,
    },
    #[error("result does not hold a {expected} value")]
    UnexpectedOutcome { expected: &'static str },
    #[error("queued command #{position} failed")]
    DependencyFailed {
        position: usize,
        #[source]
        source: Box<MapError>,
    },
    #[error("queued command discarded while the engine was locked")]
    Discarded,
    #[error("queued command skipped after an earlier failure aborted the drain")]
    Aborted,
    #[error("readiness signalled with no map pending")]
    UnexpectedReady,
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("widget backend error: {0}")]
    Widget(String),
}

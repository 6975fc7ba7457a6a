//! Registry module orchestrator.
//!
//! `core` tracks where each overlay currently lives (on the widget or in a
//! hidden partition); `groups` keeps group membership and its reverse index.

mod core;
mod groups;

pub use self::core::{OverlayRegistry, Residence, random_id};
pub use groups::{Group, GroupRegistry};

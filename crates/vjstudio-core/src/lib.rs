//! VJ Studio Core - Foundation types for the timeline
//!
//! This crate provides the types shared by every timeline subsystem:
//! - Error taxonomy (layout violations, media, storage, collaborators)
//! - Timeline configuration loaded from JSON
//! - Typed broadcast events and inbound messages
//! - The publish/subscribe `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use config::{SceneEndPolicy, SnapSettings, TimelineConfig};
pub use error::{LayoutViolation, Result, VjError};
pub use events::{
    EventBus, InboundMessage, ModulationTarget, ParamModulation, Tick, TimelineEvent,
    TransportCommand,
};

/// Tolerance used for boundary comparisons on the timeline, in seconds.
///
/// Adjacent clips (`a.end == b.start`) must never be reported as overlapping
/// after a round trip through `f64` arithmetic.
pub const TIME_EPSILON: f64 = 1e-6;

//! VJ Studio Timeline - multi-track clip layout and editing
//!
//! Implements the editable side of the timeline:
//! - Tracks holding non-overlapping clips
//! - Layout rules for placement, clamping, snapping and swaps
//! - Edit commands committed atomically through the track store
//! - Per-scene persistence
//! - Pointer-driven drag, resize and drop handling

pub mod clip;
pub mod drag;
pub mod drop;
pub mod edit;
pub mod layout;
pub mod selection;
pub mod serialization;
pub mod store;
pub mod track;

pub use clip::{AssetRef, Clip, MediaKind, ParamValue, MIN_CLIP_DURATION};
pub use drag::{
    DragController, DragPhase, DragPreview, EditProposal, PreviewClip, ResizeSide,
    TimelineViewport,
};
pub use drop::{AssetPayload, DropPayload, ProbeRequest};
pub use edit::{ClipMove, EditCommand, EditOutcome};
pub use selection::Selection;
pub use serialization::{BackgroundWriter, JsonFileStorage, MemoryStorage, TrackStorage};
pub use store::TrackStore;
pub use track::Track;

//! VJ Studio Playback - the timeline clock and everything it drives
//!
//! Architecture:
//! - `PlaybackScheduler`: frame-driven clock, single writer of `PlaybackState`
//! - `MediaSyncEngine`: keeps media elements aligned with the playhead
//! - `SceneEndMachine`: stop, loop or switch scenes when a run ends
//! - `ProbeWorker`: measures dropped audio durations off-thread
//! - `PlaybackSession`: owns the above plus the track store and runs one frame at a time

pub mod probe;
pub mod scene_end;
pub mod scheduler;
pub mod session;
pub mod sync;

pub use probe::{DurationProbe, ProbeWorker};
pub use scene_end::{SceneEndAction, SceneEndMachine, SceneList, SceneNavigator};
pub use scheduler::{
    FrameAdvance, LoopHandle, PlaybackScheduler, PlaybackSnapshot, PlaybackState, StopOutcome,
};
pub use session::PlaybackSession;
pub use sync::{AssetResolver, MediaBackend, MediaElement, MediaSyncEngine, PathResolver, SilentBackend};

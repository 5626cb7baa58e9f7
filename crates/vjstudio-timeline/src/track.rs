//! Track types for the timeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vjstudio_core::LayoutViolation;

use crate::clip::{Clip, MediaKind};
use crate::layout;

/// An ordered lane of non-overlapping clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub id: Uuid,
    /// Track name
    pub name: String,
    /// Track kind
    pub kind: MediaKind,
    /// Clips on this track, kept sorted by start time
    pub clips: Vec<Clip>,
    /// Is track muted
    #[serde(default)]
    pub muted: bool,
    /// Is track locked (prevent edits)
    #[serde(default)]
    pub locked: bool,
}

impl Track {
    /// Create a new empty track.
    pub fn new(name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            clips: Vec::new(),
            muted: false,
            locked: false,
        }
    }

    pub fn new_video(name: impl Into<String>) -> Self {
        Self::new(name, MediaKind::Video)
    }

    pub fn new_effect(name: impl Into<String>) -> Self {
        Self::new(name, MediaKind::Effect)
    }

    pub fn new_audio(name: impl Into<String>) -> Self {
        Self::new(name, MediaKind::Audio)
    }

    /// Whether a clip of `kind` may live on this track.
    ///
    /// Audio tracks take audio only; video and effect tracks take either
    /// video or effect clips.
    pub fn accepts(&self, kind: MediaKind) -> bool {
        match self.kind {
            MediaKind::Audio => kind == MediaKind::Audio,
            MediaKind::Video | MediaKind::Effect => kind != MediaKind::Audio,
        }
    }

    /// End of the last clip, or zero for an empty track.
    pub fn end_time(&self) -> f64 {
        self.clips
            .iter()
            .map(Clip::end_time)
            .fold(0.0, f64::max)
    }

    /// Earliest clip start, if any.
    pub fn first_start(&self) -> Option<f64> {
        self.clips
            .iter()
            .map(|c| c.start_time)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn find_clip(&self, id: Uuid) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn find_clip_mut(&mut self, id: Uuid) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    /// Remove a clip by id. Returns the removed clip.
    pub fn remove_clip(&mut self, id: Uuid) -> Option<Clip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    /// Add a clip, keeping the list sorted by start time.
    pub fn insert_clip(&mut self, clip: Clip) {
        let index = self
            .clips
            .partition_point(|c| c.start_time <= clip.start_time);
        self.clips.insert(index, clip);
    }

    /// Restore start-time order after in-place position edits.
    pub fn sort_clips(&mut self) {
        self.clips.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    /// Clips active at `time`.
    pub fn clips_at(&self, time: f64) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.contains(time))
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Check the per-track layout invariants: positive durations,
    /// non-negative starts, kind compatibility, and no overlap.
    pub fn validate(&self) -> std::result::Result<(), LayoutViolation> {
        for clip in &self.clips {
            if clip.duration.is_nan() || clip.duration <= 0.0 {
                return Err(LayoutViolation::NonPositiveDuration {
                    clip: clip.id,
                    duration: clip.duration,
                });
            }
            if clip.start_time < 0.0 || clip.start_time.is_nan() {
                return Err(LayoutViolation::NegativeStart {
                    clip: clip.id,
                    start: clip.start_time,
                });
            }
            if !self.accepts(clip.kind) {
                return Err(LayoutViolation::KindMismatch {
                    track: self.id,
                    clip_kind: clip.kind.to_string(),
                });
            }
        }

        if let Some((earlier, later)) = layout::clips_overlap_any(&self.clips) {
            return Err(LayoutViolation::Overlap {
                track: self.id,
                clip: later.id,
                other: earlier.id,
            });
        }
        Ok(())
    }
}

/// The track set every scene starts from: two video tracks, one effect
/// track, one audio track.
pub fn default_tracks() -> Vec<Track> {
    vec![
        Track::new_video("Video 1"),
        Track::new_video("Video 2"),
        Track::new_effect("Effects"),
        Track::new_audio("Audio"),
    ]
}

/// Repair a loaded track list: empty lists get the default set, lists
/// without an audio track get one appended. Returns true if anything changed.
pub fn ensure_default_tracks(tracks: &mut Vec<Track>) -> bool {
    if tracks.is_empty() {
        *tracks = default_tracks();
        return true;
    }
    if !tracks.iter().any(|t| t.kind == MediaKind::Audio) {
        tracks.push(Track::new_audio("Audio"));
        return true;
    }
    false
}

/// Timeline duration: `max(1, latest clip end)`.
pub fn timeline_duration(tracks: &[Track]) -> f64 {
    tracks.iter().map(Track::end_time).fold(1.0, f64::max)
}

/// Earliest clip start over every track, or zero.
pub fn earliest_start(tracks: &[Track]) -> f64 {
    tracks
        .iter()
        .filter_map(Track::first_start)
        .min_by(|a, b| a.total_cmp(b))
        .unwrap_or(0.0)
}

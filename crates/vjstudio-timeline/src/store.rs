//! The clip/track store: authoritative track list of the active scene.
//!
//! All mutations go through [`TrackStore::update_tracks`]. A transform runs
//! against a working copy; the copy replaces the live tracks only if every
//! layout invariant still holds afterwards.

use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vjstudio_core::{Result, VjError};

use crate::clip::Clip;
use crate::edit::{locate_clip, EditCommand, EditOutcome};
use crate::serialization::{storage_key, tracks_from_json, tracks_to_json, TrackStorage};
use crate::track::{default_tracks, earliest_start, timeline_duration, Track};

/// Owns the tracks of the scene being edited and persists them per scene.
pub struct TrackStore {
    storage: Box<dyn TrackStorage>,
    scene_id: Option<String>,
    tracks: Vec<Track>,
    duration: f64,
    /// Bumped on every successful commit.
    revision: u64,
    /// Committed changes not yet handed to storage.
    dirty: bool,
    /// Persist on [`flush`](Self::flush) only, instead of on every commit.
    deferred: bool,
}

impl TrackStore {
    /// Create a store holding the default track set and no scene.
    pub fn new(storage: impl TrackStorage + 'static) -> Self {
        let tracks = default_tracks();
        let duration = timeline_duration(&tracks);
        Self {
            storage: Box::new(storage),
            scene_id: None,
            tracks,
            duration,
            revision: 0,
            dirty: false,
            deferred: false,
        }
    }

    /// With deferred persistence, commits only mark the scene dirty and the
    /// owner calls [`flush`](Self::flush), e.g. once per frame. Turning it
    /// off flushes.
    pub fn set_deferred_persistence(&mut self, deferred: bool) {
        self.deferred = deferred;
        if !deferred {
            self.flush();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the scene if anything changed since the last write.
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist();
        }
    }

    /// Switch to a scene: load its persisted tracks, or the default set.
    ///
    /// Unreadable or corrupt data is logged and replaced by the defaults.
    /// Repaired data is written back. Pending changes of the previous scene
    /// are flushed first.
    pub fn load_scene(&mut self, scene_id: &str) -> &[Track] {
        self.flush();
        let key = storage_key(scene_id);
        let (tracks, dirty) = match self.storage.read(&key) {
            Ok(Some(bytes)) => match tracks_from_json(&bytes) {
                Ok((tracks, repaired)) => (tracks, repaired),
                Err(e) => {
                    warn!("Discarding persisted tracks for scene {}: {}", scene_id, e);
                    (default_tracks(), false)
                }
            },
            Ok(None) => (default_tracks(), false),
            Err(e) => {
                warn!("Failed to read tracks for scene {}: {}", scene_id, e);
                (default_tracks(), false)
            }
        };

        let (tracks, dirty) = match validate_tracks(&tracks) {
            Ok(()) => (tracks, dirty),
            Err(e) => {
                warn!("Persisted tracks for scene {} are unusable: {}", scene_id, e);
                (default_tracks(), true)
            }
        };

        self.scene_id = Some(scene_id.to_string());
        self.tracks = tracks;
        self.duration = timeline_duration(&self.tracks);
        self.revision += 1;
        info!(
            "Loaded scene {} ({} tracks, {} clips, {:.2}s)",
            scene_id,
            self.tracks.len(),
            self.clip_count(),
            self.duration
        );
        self.dirty = dirty;
        if dirty {
            debug!("Persisting repaired tracks for scene {}", scene_id);
            self.flush();
        }
        &self.tracks
    }

    pub fn scene_id(&self) -> Option<&str> {
        self.scene_id.as_deref()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// A clip and the track holding it.
    pub fn find_clip(&self, clip_id: Uuid) -> Option<(&Track, &Clip)> {
        let (t, c) = locate_clip(&self.tracks, clip_id)?;
        let track = &self.tracks[t];
        Some((track, &track.clips[c]))
    }

    /// Derived timeline duration: `max(1, latest clip end)`.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Earliest clip start, where a finished run restarts from.
    pub fn earliest_start(&self) -> f64 {
        earliest_start(&self.tracks)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(Track::clip_count).sum()
    }

    /// The single mutation entry point.
    ///
    /// `f` runs against a copy of the tracks. If it fails, or leaves the
    /// copy in a state that breaks a layout invariant, the store is left
    /// exactly as it was and the error is returned. Otherwise the copy is
    /// committed, the duration recomputed, and the scene persisted (or
    /// marked dirty under deferred persistence).
    pub fn update_tracks<T>(
        &mut self,
        f: impl FnOnce(&mut Vec<Track>) -> Result<T>,
    ) -> Result<T> {
        let mut working = self.tracks.clone();
        let value = f(&mut working)?;
        validate_tracks(&working)?;

        self.tracks = working;
        self.duration = timeline_duration(&self.tracks);
        self.revision += 1;
        self.dirty = true;
        if !self.deferred {
            self.persist();
        }
        Ok(value)
    }

    /// By-value form of [`update_tracks`](Self::update_tracks).
    pub fn replace_tracks(&mut self, tracks: Vec<Track>) -> Result<()> {
        self.update_tracks(move |current| {
            *current = tracks;
            for track in current.iter_mut() {
                track.sort_clips();
            }
            Ok(())
        })
    }

    /// Apply an edit command atomically.
    pub fn apply(&mut self, command: &EditCommand) -> Result<EditOutcome> {
        let label = command.label();
        match self.update_tracks(|tracks| command.apply(tracks)) {
            Ok(outcome) => {
                debug!(
                    "Applied {}: {} created, {} touched, {} removed",
                    label,
                    outcome.created.len(),
                    outcome.touched.len(),
                    outcome.removed.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                debug!("Rejected {}: {}", label, e);
                Err(e)
            }
        }
    }

    /// In-memory state stays authoritative when the write fails.
    fn persist(&mut self) {
        self.dirty = false;
        let Some(scene_id) = &self.scene_id else {
            return;
        };
        let result = tracks_to_json(&self.tracks)
            .and_then(|bytes| self.storage.write(&storage_key(scene_id), &bytes));
        if let Err(e) = result {
            warn!("Failed to persist tracks for scene {}: {}", scene_id, e);
        }
    }
}

/// Check every invariant the committed track list must satisfy.
pub fn validate_tracks(tracks: &[Track]) -> Result<()> {
    let mut seen = HashSet::new();
    for track in tracks {
        track.validate()?;
        for clip in &track.clips {
            if !seen.insert(clip.id) {
                return Err(VjError::InvalidParameter(format!(
                    "duplicate clip id {}",
                    clip.id
                )));
            }
        }
    }
    Ok(())
}

//! Edit commands.
//!
//! Uses the Command pattern: every mutation of the track list is an
//! `EditCommand`, applied by the store to a working copy that is validated
//! before it replaces the live tracks.

use uuid::Uuid;
use vjstudio_core::{LayoutViolation, Result, VjError, TIME_EPSILON};

use crate::clip::{Clip, MediaKind, MIN_CLIP_DURATION};
use crate::layout;
use crate::track::Track;

// ── Commands ────────────────────────────────────────────────────

/// One clip's destination inside a `MoveClips` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipMove {
    pub clip_id: Uuid,
    pub from_track: Uuid,
    pub to_track: Uuid,
    pub start: f64,
}

/// A mutation of the track list.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// Insert a fully placed clip.
    InsertClip { track_id: Uuid, clip: Clip },
    /// Reposition clips, possibly across tracks. All moves land together,
    /// which is what makes swaps and group drags atomic.
    MoveClips { moves: Vec<ClipMove> },
    /// Result of a trim.
    ResizeClip {
        track_id: Uuid,
        clip_id: Uuid,
        start: f64,
        duration: f64,
        source_in: f64,
    },
    /// Split a clip at an absolute timeline time.
    SplitClip { track_id: Uuid, clip_id: Uuid, at: f64 },
    /// Copy a clip into the first free slot after it.
    DuplicateClip { track_id: Uuid, clip_id: Uuid },
    /// Delete clips from whichever track holds them.
    RemoveClips { clip_ids: Vec<Uuid> },
    SetParam {
        clip_id: Uuid,
        name: String,
        value: f64,
    },
    SetOpacity { clip_id: Uuid, value: f64 },
    /// Correct a clip's duration once its media's natural length is known.
    SetClipDuration { clip_id: Uuid, duration: f64 },
    AddTrack { kind: MediaKind, name: String },
    RemoveTrack { track_id: Uuid },
    /// Remove every clip from every unlocked track.
    ClearTimeline,
    /// A batch of commands applied atomically.
    Batch(Vec<EditCommand>),
}

/// What an applied command changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    /// Clips that now exist and did not before.
    pub created: Vec<Uuid>,
    /// Existing clips whose placement or content changed.
    pub touched: Vec<Uuid>,
    /// Clips that no longer exist.
    pub removed: Vec<Uuid>,
    pub added_tracks: Vec<Uuid>,
}

impl EditOutcome {
    fn merge(&mut self, other: EditOutcome) {
        self.created.extend(other.created);
        self.touched.extend(other.touched);
        self.removed.extend(other.removed);
        self.added_tracks.extend(other.added_tracks);
    }

    /// Clips that were created or changed, in that order.
    pub fn affected(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.created.iter().chain(self.touched.iter()).copied()
    }
}

impl EditCommand {
    /// Short name for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InsertClip { .. } => "insert_clip",
            Self::MoveClips { .. } => "move_clips",
            Self::ResizeClip { .. } => "resize_clip",
            Self::SplitClip { .. } => "split_clip",
            Self::DuplicateClip { .. } => "duplicate_clip",
            Self::RemoveClips { .. } => "remove_clips",
            Self::SetParam { .. } => "set_param",
            Self::SetOpacity { .. } => "set_opacity",
            Self::SetClipDuration { .. } => "set_clip_duration",
            Self::AddTrack { .. } => "add_track",
            Self::RemoveTrack { .. } => "remove_track",
            Self::ClearTimeline => "clear_timeline",
            Self::Batch(_) => "batch",
        }
    }

    /// Apply this command to a track list, mutating it in place.
    ///
    /// Kind, lock and bounds rules are checked here. Overlap is left to the
    /// store's validation pass, which sees the final state of a batch.
    pub fn apply(&self, tracks: &mut Vec<Track>) -> Result<EditOutcome> {
        let mut outcome = EditOutcome::default();
        match self {
            Self::InsertClip { track_id, clip } => {
                let track = editable_track(tracks, *track_id)?;
                ensure_accepts(track, clip.kind)?;
                track.insert_clip(clip.clone());
                outcome.created.push(clip.id);
            }
            Self::MoveClips { moves } => {
                let mut lifted = Vec::with_capacity(moves.len());
                for mv in moves {
                    let clip = editable_track(tracks, mv.from_track)?
                        .remove_clip(mv.clip_id)
                        .ok_or_else(|| clip_not_found(mv.clip_id))?;
                    lifted.push((mv, clip));
                }
                for (mv, mut clip) in lifted {
                    let dest = editable_track(tracks, mv.to_track)?;
                    ensure_accepts(dest, clip.kind)?;
                    clip.start_time = mv.start;
                    dest.insert_clip(clip);
                    outcome.touched.push(mv.clip_id);
                }
            }
            Self::ResizeClip {
                track_id,
                clip_id,
                start,
                duration,
                source_in,
            } => {
                let track = editable_track(tracks, *track_id)?;
                let clip = track
                    .find_clip_mut(*clip_id)
                    .ok_or_else(|| clip_not_found(*clip_id))?;
                clip.start_time = *start;
                clip.duration = *duration;
                clip.source_in = source_in.max(0.0);
                track.sort_clips();
                outcome.touched.push(*clip_id);
            }
            Self::SplitClip {
                track_id,
                clip_id,
                at,
            } => {
                let track = editable_track(tracks, *track_id)?;
                let clip = track
                    .find_clip_mut(*clip_id)
                    .ok_or_else(|| clip_not_found(*clip_id))?;
                if *at < clip.start_time + MIN_CLIP_DURATION
                    || *at > clip.end_time() - MIN_CLIP_DURATION
                {
                    return Err(LayoutViolation::OutOfBounds {
                        clip: *clip_id,
                        time: *at,
                    }
                    .into());
                }
                let offset = *at - clip.start_time;
                let mut right = clip.fork();
                right.name = format!("{} (split)", clip.name);
                right.start_time = *at;
                right.duration = clip.end_time() - *at;
                right.source_in = clip.source_in + offset;
                clip.duration = offset;

                outcome.touched.push(*clip_id);
                outcome.created.push(right.id);
                track.insert_clip(right);
            }
            Self::DuplicateClip { track_id, clip_id } => {
                let track = editable_track(tracks, *track_id)?;
                let original = track
                    .find_clip(*clip_id)
                    .ok_or_else(|| clip_not_found(*clip_id))?;
                let mut copy = original.fork();
                copy.start_time = layout::find_first_available_start(
                    &track.clips,
                    original.end_time(),
                    original.duration,
                );
                outcome.created.push(copy.id);
                track.insert_clip(copy);
            }
            Self::RemoveClips { clip_ids } => {
                for clip_id in clip_ids {
                    let (t, _) = locate_clip(tracks, *clip_id)
                        .ok_or_else(|| clip_not_found(*clip_id))?;
                    let track = &mut tracks[t];
                    if track.locked {
                        return Err(LayoutViolation::TrackLocked(track.id).into());
                    }
                    track.remove_clip(*clip_id);
                    outcome.removed.push(*clip_id);
                }
            }
            Self::SetParam {
                clip_id,
                name,
                value,
            } => {
                clip_mut(tracks, *clip_id)?.set_param(name.clone(), *value);
                outcome.touched.push(*clip_id);
            }
            Self::SetOpacity { clip_id, value } => {
                clip_mut(tracks, *clip_id)?.opacity = value.clamp(0.0, 1.0);
                outcome.touched.push(*clip_id);
            }
            Self::SetClipDuration { clip_id, duration } => {
                let (t, _) =
                    locate_clip(tracks, *clip_id).ok_or_else(|| clip_not_found(*clip_id))?;
                let track = &mut tracks[t];
                let clip = track
                    .find_clip(*clip_id)
                    .ok_or_else(|| clip_not_found(*clip_id))?;
                let room = track
                    .clips
                    .iter()
                    .filter(|c| c.id != *clip_id && c.start_time >= clip.end_time() - TIME_EPSILON)
                    .map(|c| c.start_time - clip.start_time)
                    .fold(f64::INFINITY, f64::min);
                let fitted = duration.min(room);
                if fitted.is_nan() || fitted < MIN_CLIP_DURATION {
                    return Err(VjError::InvalidParameter(format!(
                        "duration {} leaves no room for clip {}",
                        duration, clip_id
                    )));
                }
                if let Some(clip) = track.find_clip_mut(*clip_id) {
                    clip.duration = fitted;
                }
                outcome.touched.push(*clip_id);
            }
            Self::AddTrack { kind, name } => {
                let track = Track::new(name.clone(), *kind);
                outcome.added_tracks.push(track.id);
                tracks.push(track);
            }
            Self::RemoveTrack { track_id } => {
                let index = tracks
                    .iter()
                    .position(|t| t.id == *track_id)
                    .ok_or_else(|| VjError::NotFound(format!("track {}", track_id)))?;
                let track = &tracks[index];
                if track.locked {
                    return Err(LayoutViolation::TrackLocked(track.id).into());
                }
                let audio_tracks = tracks.iter().filter(|t| t.kind == MediaKind::Audio).count();
                if track.kind == MediaKind::Audio && audio_tracks == 1 {
                    return Err(VjError::InvalidParameter(
                        "cannot remove the last audio track".into(),
                    ));
                }
                let removed = tracks.remove(index);
                outcome.removed.extend(removed.clips.iter().map(|c| c.id));
            }
            Self::ClearTimeline => {
                for track in tracks.iter_mut().filter(|t| !t.locked) {
                    outcome.removed.extend(track.clips.drain(..).map(|c| c.id));
                }
            }
            Self::Batch(commands) => {
                for cmd in commands {
                    outcome.merge(cmd.apply(tracks)?);
                }
            }
        }
        Ok(outcome)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn clip_not_found(id: Uuid) -> VjError {
    VjError::NotFound(format!("clip {}", id))
}

/// Find an unlocked track by id.
fn editable_track(tracks: &mut [Track], track_id: Uuid) -> Result<&mut Track> {
    let track = tracks
        .iter_mut()
        .find(|t| t.id == track_id)
        .ok_or_else(|| VjError::NotFound(format!("track {}", track_id)))?;
    if track.locked {
        return Err(LayoutViolation::TrackLocked(track_id).into());
    }
    Ok(track)
}

fn ensure_accepts(track: &Track, kind: MediaKind) -> Result<()> {
    if track.accepts(kind) {
        Ok(())
    } else {
        Err(LayoutViolation::KindMismatch {
            track: track.id,
            clip_kind: kind.to_string(),
        }
        .into())
    }
}

/// `(track index, clip index)` of a clip anywhere in the list.
pub fn locate_clip(tracks: &[Track], clip_id: Uuid) -> Option<(usize, usize)> {
    tracks.iter().enumerate().find_map(|(t, track)| {
        track
            .clips
            .iter()
            .position(|c| c.id == clip_id)
            .map(|c| (t, c))
    })
}

fn clip_mut(tracks: &mut [Track], clip_id: Uuid) -> Result<&mut Clip> {
    let (t, c) = locate_clip(tracks, clip_id).ok_or_else(|| clip_not_found(clip_id))?;
    Ok(&mut tracks[t].clips[c])
}

// ── Tests ───────────────────────────────────────────────────────

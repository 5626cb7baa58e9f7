//! Clip selection state.

use uuid::Uuid;

use crate::track::Track;

/// Selected clips, in selection order, plus the primary clip.
///
/// The primary clip is the one most recently pressed; parameter panels
/// follow it, and group drags anchor to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    clips: Vec<Uuid>,
    /// `(track id, clip id)` of the primary clip.
    primary: Option<(Uuid, Uuid)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a single clip, replacing the current selection.
    pub fn select(&mut self, track_id: Uuid, clip_id: Uuid) {
        self.clips.clear();
        self.clips.push(clip_id);
        self.primary = Some((track_id, clip_id));
    }

    /// Add a clip to the selection, or remove it if already selected.
    pub fn toggle(&mut self, track_id: Uuid, clip_id: Uuid) {
        if let Some(index) = self.clips.iter().position(|id| *id == clip_id) {
            self.clips.remove(index);
            if self.primary_clip() == Some(clip_id) {
                self.primary = None;
            }
        } else {
            self.clips.push(clip_id);
            self.primary = Some((track_id, clip_id));
        }
    }

    /// Make `clip_id` primary without changing which clips are selected.
    /// A clip that is not selected yet is added.
    pub fn focus(&mut self, track_id: Uuid, clip_id: Uuid) {
        if !self.contains(clip_id) {
            self.clips.push(clip_id);
        }
        self.primary = Some((track_id, clip_id));
    }

    pub fn clear(&mut self) {
        self.clips.clear();
        self.primary = None;
    }

    pub fn contains(&self, clip_id: Uuid) -> bool {
        self.clips.contains(&clip_id)
    }

    pub fn clip_ids(&self) -> &[Uuid] {
        &self.clips
    }

    pub fn primary(&self) -> Option<(Uuid, Uuid)> {
        self.primary
    }

    pub fn primary_clip(&self) -> Option<Uuid> {
        self.primary.map(|(_, clip)| clip)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// More than one clip is selected.
    pub fn is_multi(&self) -> bool {
        self.clips.len() > 1
    }

    /// Drop removed clips from the selection.
    pub fn prune(&mut self, removed: &[Uuid]) {
        self.clips.retain(|id| !removed.contains(id));
        if matches!(self.primary, Some((_, clip)) if removed.contains(&clip)) {
            self.primary = None;
        }
    }

    /// Drop clips that no longer exist and re-point the primary clip at the
    /// track now holding it.
    pub fn sync_with(&mut self, tracks: &[Track]) {
        self.clips
            .retain(|id| tracks.iter().any(|t| t.find_clip(*id).is_some()));
        self.primary = self.primary.and_then(|(_, clip)| {
            tracks
                .iter()
                .find(|t| t.find_clip(clip).is_some())
                .map(|t| (t.id, clip))
        });
    }
}

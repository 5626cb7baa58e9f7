//! Drag/resize controller.
//!
//! A pointer-driven state machine over the timeline surface. While a gesture
//! is in progress it only produces previews; on release it proposes an
//! [`EditCommand`] for the caller to commit through the store. The
//! controller never writes tracks itself.

use smallvec::SmallVec;
use tracing::debug;
use uuid::Uuid;
use vjstudio_core::{LayoutViolation, Result, SnapSettings, TimelineConfig, VjError, TIME_EPSILON};

use crate::clip::{Clip, MediaKind};
use crate::drop::{AssetPayload, DropPayload, ProbeRequest};
use crate::edit::{ClipMove, EditCommand};
use crate::layout;
use crate::selection::Selection;
use crate::track::Track;

/// Maps pointer X coordinates to timeline seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineViewport {
    pub pixels_per_second: f64,
    /// Horizontal scroll offset in pixels.
    pub scroll_px: f64,
}

impl TimelineViewport {
    pub fn new(pixels_per_second: f64) -> Self {
        Self {
            pixels_per_second,
            scroll_px: 0.0,
        }
    }

    /// Timeline time under a pointer X, never negative.
    pub fn time_at(&self, x_px: f64) -> f64 {
        ((x_px + self.scroll_px) / self.pixels_per_second).max(0.0)
    }

    pub fn x_for(&self, time: f64) -> f64 {
        time * self.pixels_per_second - self.scroll_px
    }
}

/// Which edge of a clip a resize drags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeSide {
    Left,
    Right,
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging,
    Resizing(ResizeSide),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewClip {
    pub clip_id: Uuid,
    pub start: f64,
    pub duration: f64,
}

/// Where the dragged clips would land if released now. Visual only.
#[derive(Debug, Clone, PartialEq)]
pub struct DragPreview {
    pub track_id: Uuid,
    pub clips: Vec<PreviewClip>,
    pub snapped: bool,
    /// False when releasing here would be rejected.
    pub valid: bool,
}

/// An edit for the caller to commit, plus its follow-up work.
#[derive(Debug, Clone, PartialEq)]
pub struct EditProposal {
    pub command: EditCommand,
    /// `(track, clip)` to make primary once committed.
    pub focus: Option<(Uuid, Uuid)>,
    /// Duration measurement to start once committed.
    pub probe: Option<ProbeRequest>,
}

impl EditProposal {
    fn new(command: EditCommand, focus: (Uuid, Uuid)) -> Self {
        Self {
            command,
            focus: Some(focus),
            probe: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Member {
    clip_id: Uuid,
    start: f64,
    duration: f64,
}

#[derive(Debug)]
struct DragSession {
    source_track: Uuid,
    anchor: Member,
    kind: MediaKind,
    /// Pointer time minus anchor start at press.
    grab_offset: f64,
    /// Other clips moving with the anchor.
    group: SmallVec<[Member; 4]>,
    preview: Option<DragPreview>,
}

impl DragSession {
    fn ids(&self) -> SmallVec<[Uuid; 4]> {
        std::iter::once(self.anchor.clip_id)
            .chain(self.group.iter().map(|m| m.clip_id))
            .collect()
    }

    /// Start of a dragged clip when the gesture began.
    fn origin_of(&self, clip_id: Uuid) -> Option<f64> {
        std::iter::once(&self.anchor)
            .chain(self.group.iter())
            .find(|m| m.clip_id == clip_id)
            .map(|m| m.start)
    }
}

#[derive(Debug)]
struct ResizeSession {
    track_id: Uuid,
    clip_id: Uuid,
    side: ResizeSide,
    start: f64,
    duration: f64,
    source_in: f64,
    preview: Option<DragPreview>,
}

#[derive(Debug)]
enum DragState {
    Idle,
    Dragging(DragSession),
    Resizing(ResizeSession),
}

/// Resolved landing spot of a drag.
struct Placement {
    track_id: Uuid,
    moves: SmallVec<[Member; 4]>,
    snapped: bool,
}

/// Pointer-driven move and resize of clips.
pub struct DragController {
    viewport: TimelineViewport,
    snap: SnapSettings,
    min_duration: f64,
    default_clip_duration: f64,
    state: DragState,
}

impl DragController {
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            viewport: TimelineViewport::new(config.pixels_per_second),
            snap: config.snap.clone(),
            min_duration: config.min_clip_duration,
            default_clip_duration: config.default_clip_duration,
            state: DragState::Idle,
        }
    }

    pub fn viewport(&self) -> TimelineViewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: TimelineViewport) {
        self.viewport = viewport;
    }

    pub fn set_snap(&mut self, snap: SnapSettings) {
        self.snap = snap;
    }

    pub fn phase(&self) -> DragPhase {
        match &self.state {
            DragState::Idle => DragPhase::Idle,
            DragState::Dragging(_) => DragPhase::Dragging,
            DragState::Resizing(session) => DragPhase::Resizing(session.side),
        }
    }

    pub fn preview(&self) -> Option<&DragPreview> {
        match &self.state {
            DragState::Idle => None,
            DragState::Dragging(session) => session.preview.as_ref(),
            DragState::Resizing(session) => session.preview.as_ref(),
        }
    }

    // ── Pointer gestures ────────────────────────────────────────

    /// Press on a clip body.
    ///
    /// With `additive` the clip is toggled in the selection, and nothing is
    /// dragged if that deselected it. Pressing a clip that is part of a
    /// multi-selection drags the selected clips of that track together.
    pub fn pointer_down(
        &mut self,
        tracks: &[Track],
        selection: &mut Selection,
        track_id: Uuid,
        clip_id: Uuid,
        x: f64,
        additive: bool,
    ) -> Result<()> {
        let track = find_track(tracks, track_id)?;
        let clip = find_clip(track, clip_id)?;

        if additive {
            selection.toggle(track_id, clip_id);
            if !selection.contains(clip_id) {
                self.state = DragState::Idle;
                return Ok(());
            }
        } else if selection.is_multi() && selection.contains(clip_id) {
            selection.focus(track_id, clip_id);
        } else {
            selection.select(track_id, clip_id);
        }

        let others: SmallVec<[Uuid; 4]> = selection
            .clip_ids()
            .iter()
            .copied()
            .filter(|id| *id != clip_id)
            .collect();
        let grab = self.viewport.time_at(x) - clip.start_time;
        self.begin_drag(track, clip, &others, grab);
        Ok(())
    }

    /// Press on a clip's edge handle.
    pub fn pointer_down_edge(
        &mut self,
        tracks: &[Track],
        selection: &mut Selection,
        track_id: Uuid,
        clip_id: Uuid,
        side: ResizeSide,
    ) -> Result<()> {
        let track = find_track(tracks, track_id)?;
        let clip = find_clip(track, clip_id)?;
        selection.select(track_id, clip_id);
        self.begin_resize(track, clip, side);
        Ok(())
    }

    /// Pointer moved. `target_track` is the track under the pointer, if any.
    /// Returns the updated preview.
    pub fn pointer_move(
        &mut self,
        tracks: &[Track],
        x: f64,
        target_track: Option<Uuid>,
        modifier: bool,
    ) -> Option<&DragPreview> {
        let time = self.viewport.time_at(x);
        let mut state = std::mem::replace(&mut self.state, DragState::Idle);
        match &mut state {
            DragState::Idle => {}
            DragState::Dragging(session) => {
                let planned = self.plan_drag(tracks, session, time, target_track, modifier);
                session.preview = Some(match planned {
                    Ok(placement) => placement.preview(),
                    Err(_) => self.raw_preview(session, time, target_track),
                });
            }
            DragState::Resizing(session) => {
                let (track_id, clip_id) = (session.track_id, session.clip_id);
                let planned = self.plan_resize(tracks, session, time, modifier);
                session.preview = planned.ok().map(|(start, duration, _, snapped)| DragPreview {
                    track_id,
                    clips: vec![PreviewClip {
                        clip_id,
                        start,
                        duration,
                    }],
                    snapped,
                    valid: true,
                });
            }
        }
        self.state = state;
        self.preview()
    }

    /// Pointer released: end the gesture and propose its edit.
    ///
    /// `Ok(None)` means nothing changed. A rejected placement comes back as
    /// an error; either way the controller returns to idle.
    pub fn pointer_up(
        &mut self,
        tracks: &[Track],
        x: f64,
        target_track: Option<Uuid>,
        modifier: bool,
    ) -> Result<Option<EditProposal>> {
        let time = self.viewport.time_at(x);
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Idle => Ok(None),
            DragState::Dragging(session) => {
                self.finish_drag(tracks, &session, time, target_track, modifier)
            }
            DragState::Resizing(session) => self.finish_resize(tracks, &session, time, modifier),
        }
    }

    /// Pointer left the surface without a release. Discards the gesture;
    /// returns whether one was in progress.
    pub fn cancel(&mut self) -> bool {
        let active = !matches!(self.state, DragState::Idle);
        if active {
            debug!("Drag canceled");
        }
        self.state = DragState::Idle;
        active
    }

    // ── Drops ───────────────────────────────────────────────────

    /// Place an asset from a browser panel at pointer X on a track.
    pub fn drop_asset(
        &self,
        tracks: &[Track],
        track_id: Uuid,
        kind: MediaKind,
        asset: &AssetPayload,
        x: f64,
    ) -> Result<EditProposal> {
        let track = find_track(tracks, track_id)?;
        ensure_droppable(track, kind)?;

        let asset_ref = asset.asset_ref(kind);
        let duration = asset_ref.duration.unwrap_or(self.default_clip_duration);
        let start =
            layout::find_first_available_start(&track.clips, self.viewport.time_at(x), duration);
        let probe = match (&asset_ref.path, kind) {
            (Some(path), MediaKind::Audio) => Some(path.clone()),
            _ => None,
        };

        let clip = Clip::new(asset.display_name(), asset_ref, start, duration);
        debug!(
            "Dropping {} '{}' at {:.3}s on track {}",
            kind, clip.name, start, track.name
        );
        let clip_id = clip.id;
        Ok(EditProposal {
            command: EditCommand::InsertClip { track_id, clip },
            focus: Some((track_id, clip_id)),
            probe: probe.map(|path| ProbeRequest { clip_id, path }),
        })
    }

    /// Handle any drop payload landing on `track_id` at pointer X.
    ///
    /// Timeline payloads follow the same rules as pointer gestures, with the
    /// dragged clip's start placed under the pointer.
    pub fn drop_payload(
        &mut self,
        tracks: &[Track],
        selection: &mut Selection,
        payload: &DropPayload,
        track_id: Uuid,
        x: f64,
        modifier: bool,
    ) -> Result<Option<EditProposal>> {
        if let Some((kind, asset)) = payload.asset() {
            return self.drop_asset(tracks, track_id, kind, asset, x).map(Some);
        }

        match payload {
            DropPayload::TimelineClip {
                clip_id,
                source_track_id,
            } => {
                let track = find_track(tracks, *source_track_id)?;
                let clip = find_clip(track, *clip_id)?;
                selection.select(track.id, clip.id);
                self.begin_drag(track, clip, &[], 0.0);
            }
            DropPayload::TimelineClipMultiple {
                clip_ids,
                source_track_id,
                anchor_clip_id,
            } => {
                let anchor_id = anchor_clip_id
                    .or_else(|| clip_ids.first().copied())
                    .ok_or_else(|| VjError::InvalidParameter("empty clip group".into()))?;
                let track = find_track(tracks, *source_track_id)?;
                let anchor = find_clip(track, anchor_id)?;
                let others: SmallVec<[Uuid; 4]> = clip_ids
                    .iter()
                    .copied()
                    .filter(|id| *id != anchor_id)
                    .collect();
                selection.clear();
                for id in &others {
                    selection.focus(track.id, *id);
                }
                selection.focus(track.id, anchor_id);
                self.begin_drag(track, anchor, &others, 0.0);
            }
            DropPayload::TrimLeft {
                clip_id,
                source_track_id,
            }
            | DropPayload::TrimRight {
                clip_id,
                source_track_id,
            } => {
                let side = if matches!(payload, DropPayload::TrimLeft { .. }) {
                    ResizeSide::Left
                } else {
                    ResizeSide::Right
                };
                let track = find_track(tracks, *source_track_id)?;
                let clip = find_clip(track, *clip_id)?;
                selection.select(track.id, clip.id);
                self.begin_resize(track, clip, side);
            }
            _ => return Ok(None),
        }
        self.pointer_up(tracks, x, Some(track_id), modifier)
    }

    // ── Planning ────────────────────────────────────────────────

    fn begin_drag(&mut self, track: &Track, anchor: &Clip, others: &[Uuid], grab_offset: f64) {
        let group: SmallVec<[Member; 4]> = others
            .iter()
            .filter_map(|id| track.find_clip(*id))
            .map(member_of)
            .collect();
        if group.len() < others.len() {
            debug!(
                "Drag of clip {} leaves out {} selected clip(s) not on {}",
                anchor.id,
                others.len() - group.len(),
                track.name
            );
        }
        debug!(
            "Drag start: clip {} on {} ({} grouped)",
            anchor.id,
            track.name,
            group.len()
        );
        self.state = DragState::Dragging(DragSession {
            source_track: track.id,
            anchor: member_of(anchor),
            kind: anchor.kind,
            grab_offset,
            group,
            preview: None,
        });
    }

    fn begin_resize(&mut self, track: &Track, clip: &Clip, side: ResizeSide) {
        debug!("Resize start: clip {} {:?} edge", clip.id, side);
        self.state = DragState::Resizing(ResizeSession {
            track_id: track.id,
            clip_id: clip.id,
            side,
            start: clip.start_time,
            duration: clip.duration,
            source_in: clip.source_in,
            preview: None,
        });
    }

    fn snap_threshold(&self, modifier: bool) -> Option<f64> {
        self.snap
            .is_active(modifier)
            .then(|| self.snap.threshold_seconds(self.viewport.pixels_per_second))
    }

    fn plan_drag(
        &self,
        tracks: &[Track],
        session: &DragSession,
        pointer_time: f64,
        target_track: Option<Uuid>,
        modifier: bool,
    ) -> Result<Placement> {
        if !session.group.is_empty() {
            // Groups stay on their source track.
            return self.plan_group(tracks, session, pointer_time, modifier);
        }

        let source = find_track(tracks, session.source_track)?;
        if source.locked {
            return Err(LayoutViolation::TrackLocked(source.id).into());
        }
        let anchor = session.anchor;
        let dest = find_track(tracks, target_track.unwrap_or(session.source_track))?;
        let cross_track = dest.id != session.source_track;
        if cross_track {
            ensure_droppable(dest, session.kind)?;
        }

        let raw = (pointer_time - session.grab_offset).max(0.0);
        let mut candidate = raw;
        if let Some(threshold) = self.snap_threshold(modifier) {
            let targets = layout::build_snap_candidates(
                &dest.clips,
                self.snap.second_grid,
                &[anchor.clip_id],
            );
            candidate = layout::snap_span(raw, anchor.duration, &targets, threshold);
        }
        let snapped = (candidate - raw).abs() > TIME_EPSILON;

        let mut moves = SmallVec::new();
        if cross_track {
            let start = candidate.max(layout::track_end(&dest.clips, &[]));
            moves.push(Member { start, ..anchor });
            return Ok(Placement {
                track_id: dest.id,
                moves,
                snapped,
            });
        }

        let hovered = dest
            .clips
            .iter()
            .find(|c| c.id != anchor.clip_id && c.contains(pointer_time));
        if let Some(target) = hovered {
            if let Some((a_start, b_start)) =
                layout::try_swap(&dest.clips, anchor.clip_id, target.id)
            {
                moves.push(Member {
                    start: a_start,
                    ..anchor
                });
                moves.push(Member {
                    start: b_start,
                    ..member_of(target)
                });
                return Ok(Placement {
                    track_id: dest.id,
                    moves,
                    snapped: false,
                });
            }
        }

        let start = layout::clamp_start_to_neighbors(
            &dest.clips,
            candidate,
            anchor.duration,
            Some(anchor.clip_id),
        );
        moves.push(Member { start, ..anchor });
        Ok(Placement {
            track_id: dest.id,
            moves,
            snapped,
        })
    }

    fn plan_group(
        &self,
        tracks: &[Track],
        session: &DragSession,
        pointer_time: f64,
        modifier: bool,
    ) -> Result<Placement> {
        let track = find_track(tracks, session.source_track)?;
        if track.locked {
            return Err(LayoutViolation::TrackLocked(track.id).into());
        }
        let ids = session.ids();
        let anchor = session.anchor;

        let raw = (pointer_time - session.grab_offset).max(0.0);
        let mut candidate = raw;
        if let Some(threshold) = self.snap_threshold(modifier) {
            let targets = layout::build_snap_candidates(&track.clips, self.snap.second_grid, &ids);
            candidate = layout::snap_span(raw, anchor.duration, &targets, threshold);
        }
        let snapped = (candidate - raw).abs() > TIME_EPSILON;

        let earliest = session
            .group
            .iter()
            .map(|m| m.start)
            .fold(anchor.start, f64::min);
        let delta = (candidate - anchor.start).max(-earliest);

        let mut moves = SmallVec::new();
        for member in std::iter::once(&anchor).chain(session.group.iter()) {
            let start = member.start + delta;
            if let Some(other) = layout::find_overlap(&track.clips, start, member.duration, &ids) {
                return Err(LayoutViolation::Overlap {
                    track: track.id,
                    clip: member.clip_id,
                    other: other.id,
                }
                .into());
            }
            moves.push(Member { start, ..*member });
        }
        Ok(Placement {
            track_id: track.id,
            moves,
            snapped,
        })
    }

    /// `(start, duration, source_in, snapped)` for a resize released at
    /// `pointer_time`.
    fn plan_resize(
        &self,
        tracks: &[Track],
        session: &ResizeSession,
        pointer_time: f64,
        modifier: bool,
    ) -> Result<(f64, f64, f64, bool)> {
        let track = find_track(tracks, session.track_id)?;
        if track.locked {
            return Err(LayoutViolation::TrackLocked(track.id).into());
        }
        let mut edge = pointer_time;
        if let Some(threshold) = self.snap_threshold(modifier) {
            let targets = layout::build_snap_candidates(
                &track.clips,
                self.snap.second_grid,
                &[session.clip_id],
            );
            edge = layout::snap_with_threshold(pointer_time, &targets, threshold);
        }
        let snapped = (edge - pointer_time).abs() > TIME_EPSILON;
        let others = track.clips.iter().filter(|c| c.id != session.clip_id);

        match session.side {
            ResizeSide::Right => {
                let next_start = others
                    .filter(|c| c.start_time > session.start + TIME_EPSILON)
                    .map(|c| c.start_time)
                    .fold(f64::INFINITY, f64::min);
                let duration = (edge - session.start)
                    .max(self.min_duration)
                    .min(next_start - session.start);
                Ok((session.start, duration, session.source_in, snapped))
            }
            ResizeSide::Left => {
                let end = session.start + session.duration;
                let prev_end = others
                    .filter(|c| c.end_time() <= session.start + TIME_EPSILON)
                    .map(Clip::end_time)
                    .fold(0.0, f64::max);
                let start = edge.min(end - self.min_duration).max(prev_end);
                let source_in = (session.source_in + start - session.start).max(0.0);
                Ok((start, end - start, source_in, snapped))
            }
        }
    }

    fn finish_drag(
        &self,
        tracks: &[Track],
        session: &DragSession,
        time: f64,
        target_track: Option<Uuid>,
        modifier: bool,
    ) -> Result<Option<EditProposal>> {
        let placement = self.plan_drag(tracks, session, time, target_track, modifier)?;
        // A swap partner has no origin in the session, so a swap is never
        // "unchanged".
        let unchanged = placement.track_id == session.source_track
            && placement.moves.iter().all(|m| {
                matches!(session.origin_of(m.clip_id), Some(start) if (start - m.start).abs() < TIME_EPSILON)
            });
        if unchanged {
            return Ok(None);
        }

        let moves = placement
            .moves
            .iter()
            .map(|m| ClipMove {
                clip_id: m.clip_id,
                from_track: session.source_track,
                to_track: placement.track_id,
                start: m.start,
            })
            .collect();
        Ok(Some(EditProposal::new(
            EditCommand::MoveClips { moves },
            (placement.track_id, session.anchor.clip_id),
        )))
    }

    fn finish_resize(
        &self,
        tracks: &[Track],
        session: &ResizeSession,
        time: f64,
        modifier: bool,
    ) -> Result<Option<EditProposal>> {
        let (start, duration, source_in, _) = self.plan_resize(tracks, session, time, modifier)?;
        if (start - session.start).abs() < TIME_EPSILON
            && (duration - session.duration).abs() < TIME_EPSILON
        {
            return Ok(None);
        }
        Ok(Some(EditProposal::new(
            EditCommand::ResizeClip {
                track_id: session.track_id,
                clip_id: session.clip_id,
                start,
                duration,
                source_in,
            },
            (session.track_id, session.clip_id),
        )))
    }

    /// Preview of the unresolved candidate, flagged invalid.
    fn raw_preview(&self, session: &DragSession, time: f64, target: Option<Uuid>) -> DragPreview {
        let delta = (time - session.grab_offset).max(0.0) - session.anchor.start;
        DragPreview {
            track_id: target.unwrap_or(session.source_track),
            clips: std::iter::once(&session.anchor)
                .chain(session.group.iter())
                .map(|m| PreviewClip {
                    clip_id: m.clip_id,
                    start: (m.start + delta).max(0.0),
                    duration: m.duration,
                })
                .collect(),
            snapped: false,
            valid: false,
        }
    }
}

impl Placement {
    fn preview(&self) -> DragPreview {
        DragPreview {
            track_id: self.track_id,
            clips: self
                .moves
                .iter()
                .map(|m| PreviewClip {
                    clip_id: m.clip_id,
                    start: m.start,
                    duration: m.duration,
                })
                .collect(),
            snapped: self.snapped,
            valid: true,
        }
    }
}

fn member_of(clip: &Clip) -> Member {
    Member {
        clip_id: clip.id,
        start: clip.start_time,
        duration: clip.duration,
    }
}

fn find_track(tracks: &[Track], track_id: Uuid) -> Result<&Track> {
    tracks
        .iter()
        .find(|t| t.id == track_id)
        .ok_or_else(|| VjError::NotFound(format!("track {}", track_id)))
}

fn find_clip(track: &Track, clip_id: Uuid) -> Result<&Clip> {
    track
        .find_clip(clip_id)
        .ok_or_else(|| VjError::NotFound(format!("clip {}", clip_id)))
}

fn ensure_droppable(track: &Track, kind: MediaKind) -> Result<()> {
    if track.locked {
        return Err(LayoutViolation::TrackLocked(track.id).into());
    }
    if !track.accepts(kind) {
        return Err(LayoutViolation::KindMismatch {
            track: track.id,
            clip_kind: kind.to_string(),
        }
        .into());
    }
    Ok(())
}

//! Layout engine: pure placement, clamping and snapping rules for clips on a
//! track.
//!
//! Nothing in here mutates a track. Callers feed the results into edit
//! commands, and the store re-validates before committing.

use uuid::Uuid;
use vjstudio_core::TIME_EPSILON;

use crate::clip::Clip;

/// Whether `[a_start, a_start + a_dur)` and `[b_start, b_start + b_dur)`
/// intersect. Touching intervals do not overlap.
pub fn overlaps(a_start: f64, a_dur: f64, b_start: f64, b_dur: f64) -> bool {
    a_start < b_start + b_dur - TIME_EPSILON && b_start < a_start + a_dur - TIME_EPSILON
}

/// First clip (ignoring `exclude`) that overlaps the given interval.
pub fn find_overlap<'a>(
    clips: &'a [Clip],
    start: f64,
    duration: f64,
    exclude: &[Uuid],
) -> Option<&'a Clip> {
    clips.iter().find(|c| {
        !exclude.contains(&c.id) && overlaps(start, duration, c.start_time, c.duration)
    })
}

/// First overlapping pair in a clip list, in start order.
pub fn clips_overlap_any(clips: &[Clip]) -> Option<(&Clip, &Clip)> {
    let mut ordered: Vec<&Clip> = clips.iter().collect();
    ordered.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    ordered
        .windows(2)
        .find(|pair| {
            let (a, b) = (pair[0], pair[1]);
            overlaps(a.start_time, a.duration, b.start_time, b.duration)
        })
        .map(|pair| (pair[0], pair[1]))
}

/// `(start, end)` of every clip not excluded, sorted by start.
fn occupied(clips: &[Clip], exclude: &[Uuid]) -> Vec<(f64, f64)> {
    let mut spans: Vec<(f64, f64)> = clips
        .iter()
        .filter(|c| !exclude.contains(&c.id))
        .map(|c| (c.start_time, c.end_time()))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    spans
}

/// End of the last clip on the track (ignoring `exclude`), or zero.
pub fn track_end(clips: &[Clip], exclude: &[Uuid]) -> f64 {
    clips
        .iter()
        .filter(|c| !exclude.contains(&c.id))
        .map(Clip::end_time)
        .fold(0.0, f64::max)
}

/// The legal start nearest `candidate` for a clip of `duration`.
///
/// Legal positions are: before the first clip, inside any gap wide enough,
/// or after the last clip. The region after the last clip is unbounded, so a
/// position always exists. Ties resolve to the earlier position.
pub fn clamp_start_to_neighbors(
    clips: &[Clip],
    candidate: f64,
    duration: f64,
    exclude: Option<Uuid>,
) -> f64 {
    let exclude: Vec<Uuid> = exclude.into_iter().collect();
    let candidate = candidate.max(0.0);
    let mut best: Option<(f64, f64)> = None;
    let mut consider = |pos: f64| {
        let distance = (pos - candidate).abs();
        match best {
            Some((_, d)) if d <= distance + TIME_EPSILON => {}
            _ => best = Some((pos, distance)),
        }
    };

    let mut gap_start = 0.0_f64;
    for (start, end) in occupied(clips, &exclude) {
        if start - gap_start + TIME_EPSILON >= duration {
            consider(candidate.min(start - duration).max(gap_start));
        }
        gap_start = gap_start.max(end);
    }
    consider(candidate.max(gap_start));

    best.map(|(pos, _)| pos).unwrap_or(gap_start)
}

/// First start at or after `desired` where a clip of `duration` fits.
///
/// Never returns a start earlier than requested; spills past the last clip
/// when no gap is wide enough.
pub fn find_first_available_start(clips: &[Clip], desired: f64, duration: f64) -> f64 {
    let mut pos = desired.max(0.0);
    for (start, end) in occupied(clips, &[]) {
        if end <= pos + TIME_EPSILON {
            continue;
        }
        if pos + duration <= start + TIME_EPSILON {
            return pos;
        }
        pos = pos.max(end);
    }
    pos
}

/// Snap targets for a drag or resize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapCandidates {
    /// Clip boundaries, sorted and de-duplicated.
    points: Vec<f64>,
    /// Whole-second ticks are also targets.
    second_grid: bool,
}

impl SnapCandidates {
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn has_second_grid(&self) -> bool {
        self.second_grid
    }

    /// Nearest target to `time`, with its distance.
    pub fn nearest(&self, time: f64) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        let mut offer = |target: f64| {
            let distance = (target - time).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((target, distance));
            }
        };

        let idx = self.points.partition_point(|&p| p < time);
        if idx < self.points.len() {
            offer(self.points[idx]);
        }
        if idx > 0 {
            offer(self.points[idx - 1]);
        }
        if self.second_grid {
            offer(time.round().max(0.0));
        }
        best
    }
}

/// Collect snap targets: start and end of every clip not in `exclude`, plus
/// whole seconds when `include_second_grid` is set.
pub fn build_snap_candidates<'a>(
    clips: impl IntoIterator<Item = &'a Clip>,
    include_second_grid: bool,
    exclude: &[Uuid],
) -> SnapCandidates {
    let mut points: Vec<f64> = clips
        .into_iter()
        .filter(|c| !exclude.contains(&c.id))
        .flat_map(|c| [c.start_time, c.end_time()])
        .collect();
    points.sort_by(|a, b| a.total_cmp(b));
    points.dedup_by(|a, b| (*a - *b).abs() < TIME_EPSILON);
    SnapCandidates {
        points,
        second_grid: include_second_grid,
    }
}

/// Nearest candidate if it lies within `threshold` seconds, else `time`.
pub fn snap_with_threshold(time: f64, candidates: &SnapCandidates, threshold: f64) -> f64 {
    match candidates.nearest(time) {
        Some((target, distance)) if distance <= threshold => target,
        _ => time,
    }
}

/// Snap a moving span by whichever edge lands closer to a target.
/// Returns the adjusted start.
pub fn snap_span(start: f64, duration: f64, candidates: &SnapCandidates, threshold: f64) -> f64 {
    let by_start = snap_with_threshold(start, candidates, threshold) - start;
    let end = start + duration;
    let by_end = snap_with_threshold(end, candidates, threshold) - end;

    let shift = match (by_start != 0.0, by_end != 0.0) {
        (true, true) if by_end.abs() < by_start.abs() => by_end,
        (true, _) => by_start,
        (false, true) => by_end,
        (false, false) => 0.0,
    };
    (start + shift).max(0.0)
}

/// New starts `(dragged, target)` if the two clips can trade places.
///
/// Each clip takes the other's former start. The exchange is legal only if
/// neither lands on a third clip and the two do not collide with each other.
pub fn try_swap(clips: &[Clip], dragged: Uuid, target: Uuid) -> Option<(f64, f64)> {
    if dragged == target {
        return None;
    }
    let a = clips.iter().find(|c| c.id == dragged)?;
    let b = clips.iter().find(|c| c.id == target)?;

    let a_start = b.start_time;
    let b_start = a.start_time;
    let pair = [a.id, b.id];

    if find_overlap(clips, a_start, a.duration, &pair).is_some()
        || find_overlap(clips, b_start, b.duration, &pair).is_some()
        || overlaps(a_start, a.duration, b_start, b.duration)
    {
        return None;
    }
    Some((a_start, b_start))
}

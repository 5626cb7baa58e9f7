//! Layout invariants under random editing.
//!
//! Random sequences of drags, edge resizes, drops and splits run through a
//! real session; after every step the committed tracks must still be valid
//! and the derived duration must match them.

use proptest::prelude::*;
use uuid::Uuid;
use vjstudio_core::{TimelineConfig, TIME_EPSILON};
use vjstudio_playback::{MediaSyncEngine, PathResolver, PlaybackSession, SceneList, SilentBackend};
use vjstudio_timeline::store::validate_tracks;
use vjstudio_timeline::{EditCommand, MemoryStorage, ResizeSide};

#[derive(Debug, Clone)]
enum Step {
    Drag {
        clip: usize,
        x: f64,
        track: usize,
        additive: bool,
        snap: bool,
    },
    Resize {
        clip: usize,
        left: bool,
        x: f64,
        snap: bool,
    },
    Drop {
        kind: usize,
        track: usize,
        x: f64,
        duration: f64,
    },
    Split {
        clip: usize,
        at: f64,
    },
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (any::<usize>(), 0.0f64..3000.0, 0usize..4, any::<bool>(), any::<bool>()).prop_map(
            |(clip, x, track, additive, snap)| Step::Drag {
                clip,
                x,
                track,
                additive,
                snap,
            }
        ),
        (any::<usize>(), any::<bool>(), 0.0f64..3000.0, any::<bool>())
            .prop_map(|(clip, left, x, snap)| Step::Resize { clip, left, x, snap }),
        (0usize..3, 0usize..4, 0.0f64..3000.0, 0.1f64..6.0).prop_map(
            |(kind, track, x, duration)| Step::Drop {
                kind,
                track,
                x,
                duration,
            }
        ),
        (any::<usize>(), 0.0f64..1.0).prop_map(|(clip, at)| Step::Split { clip, at }),
    ]
}

fn session() -> PlaybackSession {
    let sync = MediaSyncEngine::new(SilentBackend, PathResolver, 0.1);
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        MemoryStorage::new(),
        sync,
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    session
}

/// `(track id, clip id, start, duration)` of the `n`-th clip, wrapping.
fn nth_clip(session: &PlaybackSession, n: usize) -> Option<(Uuid, Uuid, f64, f64)> {
    let clips: Vec<_> = session
        .store()
        .tracks()
        .iter()
        .flat_map(|t| {
            t.clips
                .iter()
                .map(move |c| (t.id, c.id, c.start_time, c.duration))
        })
        .collect();
    if clips.is_empty() {
        None
    } else {
        Some(clips[n % clips.len()])
    }
}

/// Rejections are expected; only the committed state is checked.
fn run(session: &mut PlaybackSession, step: &Step) {
    let pps = session.config().pixels_per_second;
    match *step {
        Step::Drag {
            clip,
            x,
            track,
            additive,
            snap,
        } => {
            let Some((track_id, clip_id, start, _)) = nth_clip(session, clip) else {
                return;
            };
            let target = session.store().tracks()[track].id;
            if session
                .pointer_down(track_id, clip_id, start * pps, additive)
                .is_ok()
            {
                session.pointer_move(x, Some(target), snap);
                let _ = session.pointer_up(x, Some(target), snap);
            }
        }
        Step::Resize {
            clip,
            left,
            x,
            snap,
        } => {
            let Some((track_id, clip_id, _, _)) = nth_clip(session, clip) else {
                return;
            };
            let side = if left {
                ResizeSide::Left
            } else {
                ResizeSide::Right
            };
            if session.pointer_down_edge(track_id, clip_id, side).is_ok() {
                session.pointer_move(x, None, snap);
                let _ = session.pointer_up(x, None, snap);
            }
        }
        Step::Drop {
            kind,
            track,
            x,
            duration,
        } => {
            let kind = ["video", "effect", "audio"][kind];
            let json = format!(
                r#"{{"type":"{}","id":"asset-{}","duration":{}}}"#,
                kind, kind, duration
            );
            let track_id = session.store().tracks()[track].id;
            let _ = session.drop_json(&json, track_id, x, false);
        }
        Step::Split { clip, at } => {
            let Some((track_id, clip_id, start, duration)) = nth_clip(session, clip) else {
                return;
            };
            let _ = session.apply_edit(&EditCommand::SplitClip {
                track_id,
                clip_id,
                at: start + at * duration,
            });
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_edits_keep_layout_valid(steps in prop::collection::vec(arb_step(), 1..40)) {
        let mut session = session();
        for step in &steps {
            run(&mut session, step);

            let tracks = session.store().tracks();
            prop_assert!(validate_tracks(tracks).is_ok(), "after {:?}", step);
            let latest_end = tracks
                .iter()
                .flat_map(|t| t.clips.iter())
                .map(|c| c.end_time())
                .fold(1.0, f64::max);
            prop_assert!((session.store().duration() - latest_end).abs() < TIME_EPSILON);
            prop_assert!((session.playback().duration() - latest_end).abs() < TIME_EPSILON);
            for track in tracks {
                for clip in &track.clips {
                    prop_assert!(clip.duration + TIME_EPSILON >= 0.1, "{:?}", clip);
                }
            }
        }
    }
}

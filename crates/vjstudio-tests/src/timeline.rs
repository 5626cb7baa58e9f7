//! Integration tests for the timeline subsystem.
//!
//! Exercises layout, editing and persistence through the session and the
//! track store together.

use std::sync::Arc;
use uuid::Uuid;
use vjstudio_core::TimelineConfig;
use vjstudio_playback::{MediaSyncEngine, PathResolver, PlaybackSession, SceneList, SilentBackend};
use vjstudio_timeline::layout::find_first_available_start;
use vjstudio_timeline::{
    AssetRef, Clip, EditCommand, JsonFileStorage, MediaKind, MemoryStorage, TrackStore,
};

// ── Helpers ────────────────────────────────────────────────────

fn video(name: &str, start: f64, duration: f64) -> Clip {
    Clip::new(
        name,
        AssetRef::new(name, MediaKind::Video).with_path(format!("/media/{}.mp4", name)),
        start,
        duration,
    )
}

fn session_with(storage: Arc<MemoryStorage>) -> PlaybackSession {
    let sync = MediaSyncEngine::new(SilentBackend, PathResolver, 0.1);
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        storage,
        sync,
        SceneList::new(vec!["scene-a".into()]),
    );
    session.open_current_scene().unwrap();
    session
}

/// Insert clips on the first video track; returns the track id and clip ids.
fn populate(session: &mut PlaybackSession, clips: Vec<Clip>) -> (Uuid, Vec<Uuid>) {
    let track_id = session.store().tracks()[0].id;
    let ids = clips.iter().map(|c| c.id).collect();
    for clip in clips {
        session
            .apply_edit(&EditCommand::InsertClip { track_id, clip })
            .unwrap();
    }
    (track_id, ids)
}

fn start_of(session: &PlaybackSession, clip_id: Uuid) -> f64 {
    session.store().find_clip(clip_id).unwrap().1.start_time
}

// ── Placement ──────────────────────────────────────────────────

#[test]
fn first_available_start_skips_narrow_gap() {
    let clips = vec![video("a", 0.0, 5.0), video("b", 8.0, 3.0)];
    assert_eq!(find_first_available_start(&clips, 3.0, 4.0), 11.0);
    assert_eq!(find_first_available_start(&clips, 3.0, 3.0), 5.0);
}

#[test]
fn dropped_asset_lands_after_narrow_gap() {
    let mut session = session_with(Arc::new(MemoryStorage::new()));
    let (track_id, _) = populate(
        &mut session,
        vec![video("a", 0.0, 5.0), video("b", 8.0, 3.0)],
    );

    let json = r#"{"type":"video","id":"sunset","name":"Sunset","path":"/media/sunset.mp4","duration":4}"#;
    let outcome = session.drop_json(json, track_id, 300.0, false).unwrap().unwrap();
    let new_id = outcome.created[0];
    assert_eq!(start_of(&session, new_id), 11.0);
    assert_eq!(session.store().duration(), 15.0);
    assert_eq!(session.selection().primary_clip(), Some(new_id));
}

// ── Drag gestures ──────────────────────────────────────────────

#[test]
fn drag_onto_clip_swaps_atomically() {
    let mut session = session_with(Arc::new(MemoryStorage::new()));
    let (track_id, ids) = populate(
        &mut session,
        vec![video("a", 2.0, 2.0), video("b", 6.0, 2.0)],
    );
    let revision = session.store().revision();

    session.pointer_down(track_id, ids[0], 250.0, false).unwrap();
    session.pointer_move(650.0, Some(track_id), false);
    session.pointer_up(650.0, Some(track_id), false).unwrap().unwrap();

    assert_eq!(start_of(&session, ids[0]), 6.0);
    assert_eq!(start_of(&session, ids[1]), 2.0);
    assert_eq!(session.store().revision(), revision + 1);
}

#[test]
fn group_drag_moves_selection_together() {
    let mut session = session_with(Arc::new(MemoryStorage::new()));
    let (track_id, ids) = populate(
        &mut session,
        vec![video("anchor", 1.0, 1.0), video("other", 5.0, 1.0)],
    );

    session.pointer_down(track_id, ids[1], 550.0, false).unwrap();
    session.pointer_leave();
    session.pointer_down(track_id, ids[0], 150.0, true).unwrap();
    assert!(session.selection().is_multi());
    let revision = session.store().revision();

    session.pointer_up(450.0, Some(track_id), false).unwrap().unwrap();

    assert_eq!(start_of(&session, ids[0]), 4.0);
    assert_eq!(start_of(&session, ids[1]), 8.0);
    assert_eq!(session.store().revision(), revision + 1);
}

#[test]
fn kind_mismatch_leaves_store_untouched() {
    let mut session = session_with(Arc::new(MemoryStorage::new()));
    let (track_id, ids) = populate(&mut session, vec![video("a", 0.0, 2.0)]);
    let audio_track = session.store().tracks()[3].id;
    let revision = session.store().revision();

    session.pointer_down(track_id, ids[0], 50.0, false).unwrap();
    let err = session.pointer_up(300.0, Some(audio_track), false).unwrap_err();
    assert!(err.is_layout_violation());
    assert_eq!(session.store().revision(), revision);
    assert_eq!(session.store().find_clip(ids[0]).unwrap().0.id, track_id);

    let json = r#"{"type":"effect","id":"kaleido"}"#;
    assert!(session.drop_json(json, audio_track, 0.0, false).is_err());
    assert_eq!(session.store().revision(), revision);
}

#[test]
fn locked_track_rejects_layout_but_takes_modulation() {
    let mut session = session_with(Arc::new(MemoryStorage::new()));
    let (track_id, ids) = populate(&mut session, vec![video("a", 0.0, 2.0)]);

    let mut tracks = session.store().tracks().to_vec();
    tracks[0].locked = true;
    let mut store = TrackStore::new(MemoryStorage::new());
    store.load_scene("locked");
    store.replace_tracks(tracks).unwrap();

    let split = store.apply(&EditCommand::SplitClip {
        track_id,
        clip_id: ids[0],
        at: 1.0,
    });
    assert!(split.unwrap_err().is_layout_violation());
    store
        .apply(&EditCommand::SetOpacity {
            clip_id: ids[0],
            value: 0.5,
        })
        .unwrap();
    assert_eq!(store.find_clip(ids[0]).unwrap().1.opacity, 0.5);
}

// ── Store and persistence ──────────────────────────────────────

#[test]
fn deleting_last_clip_shrinks_duration() {
    let mut session = session_with(Arc::new(MemoryStorage::new()));
    let (_, ids) = populate(
        &mut session,
        vec![video("a", 0.0, 3.0), video("b", 4.0, 6.0)],
    );
    session.seek(9.0);
    assert_eq!(session.playback().duration(), 10.0);

    session
        .apply_edit(&EditCommand::RemoveClips {
            clip_ids: vec![ids[1]],
        })
        .unwrap();
    assert_eq!(session.playback().duration(), 3.0);
    assert_eq!(session.playback().current_time(), 3.0);
}

#[test]
fn edits_persist_per_scene() {
    let dir = tempfile::tempdir().unwrap();
    let clip_id = {
        let mut store = TrackStore::new(JsonFileStorage::new(dir.path()));
        store.load_scene("intro");
        let track_id = store.tracks()[1].id;
        let clip = video("loop", 2.0, 3.0);
        let clip_id = clip.id;
        store
            .apply(&EditCommand::InsertClip { track_id, clip })
            .unwrap();
        store
            .apply(&EditCommand::SetParam {
                clip_id,
                name: "speed".into(),
                value: 1.5,
            })
            .unwrap();
        clip_id
    };

    let mut store = TrackStore::new(JsonFileStorage::new(dir.path()));
    store.load_scene("intro");
    let (track, clip) = store.find_clip(clip_id).unwrap();
    assert_eq!(track.name, "Video 2");
    assert_eq!(clip.start_time, 2.0);
    assert_eq!(clip.param("speed"), Some(1.5));
    assert_eq!(store.duration(), 5.0);

    store.load_scene("outro");
    assert_eq!(store.clip_count(), 0);
    assert_eq!(store.tracks().len(), 4);
}

#[test]
fn corrupt_scene_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("timeline-tracks-broken.json"), b"{ not json").unwrap();

    let mut store = TrackStore::new(JsonFileStorage::new(dir.path()));
    let tracks = store.load_scene("broken");
    assert_eq!(tracks.len(), 4);
    assert_eq!(store.duration(), 1.0);
}

#[test]
fn split_then_duplicate_keeps_track_valid() {
    let storage = Arc::new(MemoryStorage::new());
    let mut session = session_with(storage);
    let (track_id, ids) = populate(&mut session, vec![video("a", 0.0, 4.0)]);

    let split = session
        .apply_edit(&EditCommand::SplitClip {
            track_id,
            clip_id: ids[0],
            at: 1.5,
        })
        .unwrap();
    let right = split.created[0];
    assert_eq!(start_of(&session, right), 1.5);

    let dup = session
        .apply_edit(&EditCommand::DuplicateClip {
            track_id,
            clip_id: right,
        })
        .unwrap();
    assert_eq!(start_of(&session, dup.created[0]), 4.0);
    assert_eq!(session.store().clip_count(), 3);
    assert_eq!(session.store().duration(), 6.5);
}

//! Integration tests for playback: the frame loop, scene ends and media
//! sync running against a real track store.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use vjstudio_core::{
    InboundMessage, ParamModulation, Result, SceneEndPolicy, TimelineConfig, TimelineEvent,
    TransportCommand, VjError,
};
use vjstudio_playback::{
    MediaBackend, MediaElement, MediaSyncEngine, PathResolver, PlaybackSession, SceneList,
    SceneNavigator, SilentBackend, StopOutcome,
};
use vjstudio_timeline::{
    AssetRef, Clip, EditCommand, MediaKind, MemoryStorage, TrackStorage, TrackStore,
};

// ── Helpers ────────────────────────────────────────────────────

type MediaLog = Arc<Mutex<Vec<String>>>;

struct RecordingElement {
    url: String,
    log: MediaLog,
    paused: bool,
    position: f64,
}

impl MediaElement for RecordingElement {
    fn play(&mut self) -> Result<()> {
        self.paused = false;
        self.log.lock().push(format!("play {}", self.url));
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        self.log.lock().push(format!("pause {}", self.url));
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, position: f64) {
        self.position = position;
        self.log.lock().push(format!("seek {} {:.2}", self.url, position));
    }
}

struct RecordingBackend(MediaLog);

impl MediaBackend for RecordingBackend {
    fn create(&mut self, _clip: &Clip, url: &str) -> Result<Box<dyn MediaElement>> {
        self.0.lock().push(format!("create {}", url));
        Ok(Box::new(RecordingElement {
            url: url.to_string(),
            log: self.0.clone(),
            paused: true,
            position: 0.0,
        }))
    }
}

struct OfflineNavigator;

impl SceneNavigator for OfflineNavigator {
    fn current_scene_id(&self) -> Option<String> {
        Some("solo".into())
    }
    fn play_next_scene(&mut self) -> Result<String> {
        Err(VjError::Collaborator("scene service offline".into()))
    }
    fn play_random_scene(&mut self) -> Result<String> {
        Err(VjError::Collaborator("scene service offline".into()))
    }
}

fn config(policy: SceneEndPolicy) -> TimelineConfig {
    TimelineConfig {
        end_policy: policy,
        ..TimelineConfig::default()
    }
}

fn effect(start: f64, duration: f64) -> Clip {
    Clip::new("strobe", AssetRef::new("strobe", MediaKind::Effect), start, duration)
}

fn silent_sync() -> MediaSyncEngine {
    MediaSyncEngine::new(SilentBackend, PathResolver, 0.1)
}

fn insert(session: &mut PlaybackSession, track: usize, clip: Clip) -> Uuid {
    let track_id = session.store().tracks()[track].id;
    let id = clip.id;
    session
        .apply_edit(&EditCommand::InsertClip { track_id, clip })
        .unwrap();
    id
}

fn drain(events: &crossbeam_channel::Receiver<TimelineEvent>) -> Vec<TimelineEvent> {
    events
        .try_iter()
        .filter(|e| !matches!(e, TimelineEvent::Tick(_)))
        .collect()
}

#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorage,
    writes: Mutex<usize>,
}

impl TrackStorage for CountingStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        *self.writes.lock() += 1;
        self.inner.write(key, data)
    }
}

// ── Transport ──────────────────────────────────────────────────

#[test]
fn play_twice_runs_one_loop() {
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        MemoryStorage::new(),
        silent_sync(),
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(0.0, 10.0));
    let events = session.bus().subscribe();

    let start = Instant::now();
    assert!(session.play(start));
    assert!(!session.play(start + Duration::from_millis(10)));
    let tick = session.frame(start + Duration::from_secs(1)).unwrap();
    assert!((tick.time - 1.0).abs() < 1e-9);
    assert_eq!(drain(&events), vec![TimelineEvent::Play]);
}

#[test]
fn double_stop_rewinds() {
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        MemoryStorage::new(),
        silent_sync(),
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(0.0, 10.0));

    let start = Instant::now();
    session.play(start);
    session.frame(start + Duration::from_secs(3));
    let halted_at = start + Duration::from_secs(3);
    assert_eq!(session.stop(halted_at), StopOutcome::Halted);
    assert_eq!(session.playback().current_time(), 3.0);
    assert_eq!(
        session.stop(halted_at + Duration::from_millis(200)),
        StopOutcome::Rewound
    );
    assert_eq!(session.playback().current_time(), 0.0);
}

#[test]
fn transport_commands_arrive_through_inbox() {
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        MemoryStorage::new(),
        silent_sync(),
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(0.0, 8.0));
    let inbox = session.inbox();

    inbox
        .send(InboundMessage::Command(
            TransportCommand::from_json(r#"{"type":"seekToTime","value":2.5}"#).unwrap(),
        ))
        .unwrap();
    inbox
        .send(InboundMessage::Command(TransportCommand::PlayPause))
        .unwrap();
    let now = Instant::now();
    session.frame(now);
    assert!(session.playback().is_playing());
    assert_eq!(session.playback().current_time(), 2.5);
}

// ── Scene end ──────────────────────────────────────────────────

#[test]
fn loop_policy_restarts_after_settle() {
    let mut session = PlaybackSession::new(
        config(SceneEndPolicy::Loop),
        MemoryStorage::new(),
        silent_sync(),
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(0.0, 10.0));
    assert_eq!(session.playback().duration(), 10.0);
    let events = session.bus().subscribe();

    let start = Instant::now();
    session.play(start);
    let end = start + Duration::from_secs(10);
    let tick = session.frame(end).unwrap();
    assert_eq!(tick.time, 0.0);
    assert!(!session.playback().is_playing());
    assert!(session.has_pending_play());
    assert_eq!(
        drain(&events),
        vec![TimelineEvent::Play, TimelineEvent::StopAll]
    );

    assert!(session.frame(end + Duration::from_millis(50)).is_none());
    assert!(!session.playback().is_playing());

    session.frame(end + Duration::from_millis(100));
    assert!(session.playback().is_playing());
    assert_eq!(session.playback().current_time(), 0.0);
    assert_eq!(drain(&events), vec![TimelineEvent::Play]);
}

#[test]
fn stop_policy_parks_at_earliest_clip() {
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        MemoryStorage::new(),
        silent_sync(),
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(1.5, 2.5));

    let start = Instant::now();
    session.play(start);
    session.frame(start + Duration::from_secs(5));
    assert!(!session.playback().is_playing());
    assert!(!session.has_pending_play());
    assert_eq!(session.playback().current_time(), 1.5);
}

#[test]
fn play_next_switches_scene() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let mut store = TrackStore::new(storage.clone());
        store.load_scene("b");
        let track_id = store.tracks()[2].id;
        store
            .apply(&EditCommand::InsertClip {
                track_id,
                clip: effect(0.0, 3.0),
            })
            .unwrap();
    }

    let mut session = PlaybackSession::new(
        config(SceneEndPolicy::PlayNext),
        storage,
        silent_sync(),
        SceneList::new(vec!["a".into(), "b".into()]),
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(0.0, 2.0));
    let events = session.bus().subscribe();

    let start = Instant::now();
    session.play(start);
    let end = start + Duration::from_secs(2);
    session.frame(end);
    assert_eq!(session.store().scene_id(), Some("b"));
    assert_eq!(session.playback().duration(), 3.0);
    assert_eq!(
        drain(&events),
        vec![
            TimelineEvent::Play,
            TimelineEvent::StopAll,
            TimelineEvent::SceneChanged {
                scene_id: "b".into()
            },
        ]
    );

    session.frame(end + Duration::from_millis(100));
    assert!(session.playback().is_playing());
}

#[test]
fn navigator_failure_reports_status() {
    let mut session = PlaybackSession::new(
        config(SceneEndPolicy::Random),
        MemoryStorage::new(),
        silent_sync(),
        OfflineNavigator,
    );
    session.open_current_scene().unwrap();
    insert(&mut session, 2, effect(0.0, 1.0));
    let events = session.bus().subscribe();

    let start = Instant::now();
    session.play(start);
    session.frame(start + Duration::from_secs(2));
    assert!(!session.has_pending_play());
    let events = drain(&events);
    assert_eq!(events[1], TimelineEvent::Stop);
    assert!(matches!(
        &events[2],
        TimelineEvent::Status { message } if message.contains("offline")
    ));
}

// ── Media sync ─────────────────────────────────────────────────

#[test]
fn audio_clip_follows_playhead() {
    let log: MediaLog = Arc::default();
    let sync = MediaSyncEngine::new(RecordingBackend(log.clone()), PathResolver, 0.1);
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        MemoryStorage::new(),
        sync,
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    let clip = Clip::new(
        "beat",
        AssetRef::new("beat", MediaKind::Audio).with_path("/audio/beat.wav"),
        1.0,
        3.0,
    );
    let clip_id = insert(&mut session, 3, clip);

    let start = Instant::now();
    session.play(start);
    session.frame(start + Duration::from_millis(500));
    assert!(!session.sync().is_mounted(clip_id));

    session.frame(start + Duration::from_millis(1500));
    assert!(session.sync().is_mounted(clip_id));
    session.stop(start + Duration::from_millis(1600));

    assert_eq!(
        *log.lock(),
        vec![
            "create /audio/beat.wav".to_string(),
            "seek /audio/beat.wav 0.50".to_string(),
            "play /audio/beat.wav".to_string(),
            "pause /audio/beat.wav".to_string(),
        ]
    );
}

// ── Persistence ────────────────────────────────────────────────

#[test]
fn modulation_persists_at_most_once_per_frame() {
    let storage = Arc::new(CountingStorage::default());
    let mut session = PlaybackSession::new(
        TimelineConfig::default(),
        storage.clone(),
        silent_sync(),
        SceneList::new(vec!["main".into()]),
    );
    session.open_current_scene().unwrap();
    let clip_id = insert(&mut session, 2, effect(0.0, 30.0));
    let inbox = session.inbox();

    let start = Instant::now();
    session.play(start);
    session.frame(start);
    let before = *storage.writes.lock();
    for frame in 1..=60u32 {
        for n in 0..4 {
            let value = f64::from(frame * 4 + n) / 1000.0;
            inbox
                .send(InboundMessage::Modulate(ParamModulation::param(
                    clip_id, "hue", value,
                )))
                .unwrap();
        }
        session.frame(start + Duration::from_millis(u64::from(frame) * 16));
    }
    let writes = *storage.writes.lock() - before;
    assert!(writes <= 60, "{} writes in 60 frames", writes);

    inbox
        .send(InboundMessage::Modulate(ParamModulation::opacity(clip_id, 0.5)))
        .unwrap();
    session.frame(start + Duration::from_secs(2));
    session.shutdown();

    let mut reopened = TrackStore::new(storage);
    reopened.load_scene("main");
    let clip = reopened.find_clip(clip_id).unwrap().1;
    assert_eq!(clip.opacity, 0.5);
    assert_eq!(clip.param("hue"), Some(0.243));
}

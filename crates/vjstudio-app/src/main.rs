//! VJ Studio - headless timeline runner
//!
//! Loads a scene, drives the playback session at display rate and reads
//! transport commands (`{"type": "playPause"}` and friends) from stdin, one
//! JSON object per line. Timeline events other than ticks are written to
//! stdout as JSON lines.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;
use vjstudio_core::{InboundMessage, TimelineConfig, TimelineEvent, TransportCommand};
use vjstudio_playback::{MediaSyncEngine, PathResolver, PlaybackSession, SceneList, SilentBackend};
use vjstudio_timeline::{BackgroundWriter, JsonFileStorage, MediaKind};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    info!("VJ Studio starting...");

    let config = load_config()?;
    let scenes = scene_ids();
    let storage_dir = config.resolved_storage_dir();
    info!(
        "Timelines stored in {:?}, scenes: {}",
        storage_dir,
        scenes.join(", ")
    );

    let sync = MediaSyncEngine::new(SilentBackend, PathResolver, config.drift_tolerance)
        .with_kinds(&[MediaKind::Audio, MediaKind::Video]);
    let storage = BackgroundWriter::spawn(JsonFileStorage::new(storage_dir))?;
    let mut session = PlaybackSession::new(
        config,
        storage,
        sync,
        SceneList::new(scenes),
    );
    session.open_current_scene()?;

    let events = session.bus().subscribe();
    spawn_stdin_reader(session.inbox());

    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                session.frame(Instant::now());
                for event in events.try_iter() {
                    emit(&event);
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Dropping the session joins the storage writer.
    session.shutdown();
    drop(session);
    Ok(())
}

/// Config from the first argument or `VJ_STUDIO_CONFIG`, else defaults.
fn load_config() -> Result<TimelineConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VJ_STUDIO_CONFIG").ok())
        .map(PathBuf::from);
    match path {
        Some(path) => TimelineConfig::load(&path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(TimelineConfig::default()),
    }
}

/// Comma-separated `VJ_STUDIO_SCENES`, defaulting to a single scene.
fn scene_ids() -> Vec<String> {
    let scenes: Vec<String> = std::env::var("VJ_STUDIO_SCENES")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if scenes.is_empty() {
        vec!["default".to_string()]
    } else {
        scenes
    }
}

fn spawn_stdin_reader(inbox: crossbeam_channel::Sender<InboundMessage>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match TransportCommand::from_json(&line) {
                Ok(command) => {
                    if inbox.send(InboundMessage::Command(command)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    });
}

fn emit(event: &TimelineEvent) {
    if let TimelineEvent::Tick(tick) = event {
        trace!("Tick {:.3}/{:.3}", tick.time, tick.duration);
        return;
    }
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to encode event: {}", e),
    }
}

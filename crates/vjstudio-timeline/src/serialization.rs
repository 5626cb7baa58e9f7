//! Persisted timeline state.
//!
//! Each scene's tracks are stored as a JSON array of track objects under the
//! key `timeline-tracks-<sceneId>`. Backends only move bytes; encoding and
//! legacy repair live here.

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use vjstudio_core::{Result, VjError, TIME_EPSILON};

use crate::clip::Clip;
use crate::layout;
use crate::track::{ensure_default_tracks, Track};

/// Storage key for a scene's tracks.
pub fn storage_key(scene_id: &str) -> String {
    format!("timeline-tracks-{}", scene_id)
}

/// Serialize tracks to JSON bytes.
pub fn tracks_to_json(tracks: &[Track]) -> Result<Vec<u8>> {
    serde_json::to_vec(tracks)
        .map_err(|e| VjError::Serialization(format!("Failed to serialize tracks: {}", e)))
}

/// Deserialize tracks from JSON bytes, repairing legacy data.
///
/// Older saves may lack an audio track; one is appended. Saved layouts that
/// break the track invariants are repaired as well, see [`repair_layout`].
/// Returns the tracks and whether a repair happened.
pub fn tracks_from_json(data: &[u8]) -> Result<(Vec<Track>, bool)> {
    let raw: serde_json::Value = serde_json::from_slice(data)
        .map_err(|e| VjError::Serialization(format!("Invalid JSON: {}", e)))?;
    if !raw.is_array() {
        return Err(VjError::Serialization(
            "Persisted timeline must be an array of tracks".into(),
        ));
    }
    let mut tracks: Vec<Track> = serde_json::from_value(raw)
        .map_err(|e| VjError::Serialization(format!("Failed to parse tracks: {}", e)))?;
    for track in &mut tracks {
        track.sort_clips();
    }
    let relaid = repair_layout(&mut tracks);
    let repaired = ensure_default_tracks(&mut tracks);
    Ok((tracks, relaid || repaired))
}

/// Bring loaded tracks back within the layout invariants.
///
/// Clips with unusable timing, a kind the track does not accept, or an id
/// already seen are dropped. A negative start becomes zero, and a clip that
/// overlaps an earlier one moves to the first free slot after its saved
/// start. Returns true if anything changed.
pub fn repair_layout(tracks: &mut [Track]) -> bool {
    let mut seen = HashSet::new();
    let mut changed = false;
    for track in tracks.iter_mut() {
        let loaded = std::mem::take(&mut track.clips);
        let mut kept: Vec<Clip> = Vec::with_capacity(loaded.len());
        for mut clip in loaded {
            let timing_ok = clip.start_time.is_finite()
                && clip.duration.is_finite()
                && clip.duration > 0.0;
            if !timing_ok || !track.accepts(clip.kind) || !seen.insert(clip.id) {
                warn!(
                    "Dropping unplaceable clip {} ({}) from track {}",
                    clip.id, clip.kind, track.name
                );
                changed = true;
                continue;
            }
            let start = layout::find_first_available_start(&kept, clip.start_time, clip.duration);
            if (start - clip.start_time).abs() > TIME_EPSILON {
                warn!(
                    "Moving clip {} on track {} from {:.3}s to {:.3}s",
                    clip.id, track.name, clip.start_time, start
                );
                clip.start_time = start;
                changed = true;
            }
            kept.push(clip);
        }
        track.clips = kept;
        track.sort_clips();
    }
    changed
}

/// Key/value backend for persisted timelines.
pub trait TrackStorage: Send {
    /// Read a value. `Ok(None)` means nothing was stored under the key.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn write(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// One `<key>.json` file per scene inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `key`. Keys become plain file names inside the directory,
    /// so anything that could name another location is refused.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let plain = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !plain {
            return Err(VjError::Storage(format!("Invalid storage key {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

fn storage_error(action: &str, path: &Path, e: std::io::Error) -> VjError {
    VjError::Storage(format!("Failed to {} {}: {}", action, path.display(), e))
}

impl TrackStorage for JsonFileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, e)),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| storage_error("create", &self.dir, e))?;
        // Readers never observe a partially written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| storage_error("write", &tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| storage_error("replace", &path, e))?;
        Ok(())
    }
}

/// In-process storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TrackStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

impl<T: TrackStorage + Sync> TrackStorage for std::sync::Arc<T> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        (**self).write(key, data)
    }
}

type PendingWrites = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Write-behind wrapper around another storage.
///
/// `write` records the bytes and returns; a worker thread hands them to the
/// wrapped storage. Several writes to one key before the worker gets to it
/// collapse into the latest. Reads see pending writes.
pub struct BackgroundWriter {
    inner: Arc<dyn TrackStorage + Sync>,
    pending: PendingWrites,
    keys: Option<Sender<String>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackgroundWriter {
    pub fn spawn(inner: impl TrackStorage + Sync + 'static) -> Result<Self> {
        let inner: Arc<dyn TrackStorage + Sync> = Arc::new(inner);
        let pending = PendingWrites::default();
        let (tx, rx) = unbounded::<String>();
        let worker_inner = inner.clone();
        let worker_pending = pending.clone();
        let handle = thread::Builder::new()
            .name("track-writer".into())
            .spawn(move || {
                for key in rx {
                    let Some(data) = worker_pending.lock().get(&key).cloned() else {
                        continue;
                    };
                    if let Err(e) = worker_inner.write(&key, &data) {
                        warn!("Background write of {} failed: {}", key, e);
                    }
                    let mut pending = worker_pending.lock();
                    if pending.get(&key) == Some(&data) {
                        pending.remove(&key);
                    }
                }
                debug!("Track writer drained");
            })
            .map_err(|e| VjError::Storage(format!("Failed to start track writer: {}", e)))?;
        Ok(Self {
            inner,
            pending,
            keys: Some(tx),
            handle: Some(handle),
        })
    }

    /// Keys written but not yet handed to the wrapped storage.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Finish every pending write and stop the worker. Later writes go
    /// straight to the wrapped storage.
    pub fn shutdown(&mut self) {
        self.keys = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Track writer thread panicked");
            }
        }
    }
}

impl TrackStorage for BackgroundWriter {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.pending.lock().get(key) {
            return Ok(Some(data.clone()));
        }
        self.inner.read(key)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let Some(keys) = &self.keys else {
            return self.inner.write(key, data);
        };
        self.pending.lock().insert(key.to_string(), data.to_vec());
        keys.send(key.to_string())
            .map_err(|_| VjError::Storage("track writer stopped".into()))
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Audio/video sync engine.
//!
//! Keeps one media element per active clip in lockstep with the playhead.
//! Elements are created lazily through a [`MediaBackend`], reseeked when
//! they drift, and paused when their clip goes inactive.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;
use vjstudio_core::Result;
use vjstudio_timeline::{AssetRef, Clip, MediaKind, Track};

/// A playable media handle owned by the sync engine.
pub trait MediaElement: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    /// Playback position within the source media, in seconds.
    fn position(&self) -> f64;
    fn seek(&mut self, position: f64);
    /// Release underlying resources. The element is not used afterwards.
    fn detach(&mut self) {}
}

/// Creates media elements.
pub trait MediaBackend: Send {
    fn create(&mut self, clip: &Clip, url: &str) -> Result<Box<dyn MediaElement>>;
}

/// Turns an asset reference into something a backend can open.
pub trait AssetResolver: Send {
    fn resolve(&self, asset: &AssetRef) -> Option<String>;
}

/// Resolves an asset to its own path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl AssetResolver for PathResolver {
    fn resolve(&self, asset: &AssetRef) -> Option<String> {
        asset.path.clone()
    }
}

/// Backend for running without media output. Its elements keep time from
/// the wall clock but produce nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentBackend;

impl MediaBackend for SilentBackend {
    fn create(&mut self, _clip: &Clip, _url: &str) -> Result<Box<dyn MediaElement>> {
        Ok(Box::new(SilentElement::default()))
    }
}

#[derive(Debug, Default)]
struct SilentElement {
    /// Position when last paused or seeked.
    anchor: f64,
    /// Set while playing.
    started: Option<Instant>,
}

impl MediaElement for SilentElement {
    fn play(&mut self) -> Result<()> {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.anchor = self.position();
        self.started = None;
    }

    fn is_paused(&self) -> bool {
        self.started.is_none()
    }

    fn position(&self) -> f64 {
        self.anchor + self.started.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    fn seek(&mut self, position: f64) {
        self.anchor = position;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

struct Mounted {
    element: Box<dyn MediaElement>,
}

pub struct MediaSyncEngine {
    backend: Box<dyn MediaBackend>,
    resolver: Box<dyn AssetResolver>,
    synced_kinds: Vec<MediaKind>,
    drift_tolerance: f64,
    mounted: HashMap<Uuid, Mounted>,
}

impl MediaSyncEngine {
    /// Syncs audio clips only; see [`with_kinds`](Self::with_kinds).
    pub fn new(
        backend: impl MediaBackend + 'static,
        resolver: impl AssetResolver + 'static,
        drift_tolerance: f64,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            resolver: Box::new(resolver),
            synced_kinds: vec![MediaKind::Audio],
            drift_tolerance,
            mounted: HashMap::new(),
        }
    }

    /// Choose which clip kinds get media elements.
    pub fn with_kinds(mut self, kinds: &[MediaKind]) -> Self {
        self.synced_kinds = kinds.to_vec();
        self
    }

    pub fn is_mounted(&self, clip_id: Uuid) -> bool {
        self.mounted.contains_key(&clip_id)
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }

    /// Reconcile media elements with the playhead.
    pub fn on_tick(&mut self, tracks: &[Track], time: f64, is_playing: bool) {
        self.release_missing(tracks);

        let active: Vec<&Clip> = tracks
            .iter()
            .filter(|t| !t.muted)
            .flat_map(|t| t.clips.iter())
            .filter(|c| self.synced_kinds.contains(&c.kind) && c.contains(time))
            .collect();

        for clip in &active {
            if !self.mounted.contains_key(&clip.id) {
                self.mount(clip);
            }
            let Some(mounted) = self.mounted.get_mut(&clip.id) else {
                continue;
            };
            let element = &mut mounted.element;
            let relative = clip.source_time_at(time);
            if (element.position() - relative).abs() > self.drift_tolerance {
                trace!(clip = %clip.id, from = element.position(), to = relative, "Reseek");
                element.seek(relative);
            }
            if is_playing {
                if element.is_paused() {
                    if let Err(e) = element.play() {
                        debug!("Media play failed for clip {}: {}", clip.id, e);
                    }
                }
            } else if !element.is_paused() {
                element.pause();
            }
        }

        for (id, mounted) in self.mounted.iter_mut() {
            if !active.iter().any(|c| c.id == *id) && !mounted.element.is_paused() {
                mounted.element.pause();
            }
        }
    }

    /// Pause every element.
    pub fn stop_all(&mut self) {
        for mounted in self.mounted.values_mut() {
            if !mounted.element.is_paused() {
                mounted.element.pause();
            }
        }
    }

    /// Pause and detach everything.
    pub fn shutdown(&mut self) {
        for (_, mut mounted) in self.mounted.drain() {
            mounted.element.pause();
            mounted.element.detach();
        }
        debug!("Sync engine shut down");
    }

    fn mount(&mut self, clip: &Clip) {
        let Some(url) = self.resolver.resolve(&clip.asset_ref) else {
            trace!("No playable source for clip {}", clip.id);
            return;
        };
        match self.backend.create(clip, &url) {
            Ok(element) => {
                debug!("Mounted media for clip {} ({})", clip.id, url);
                self.mounted.insert(clip.id, Mounted { element });
            }
            Err(e) => debug!("Failed to create media for clip {}: {}", clip.id, e),
        }
    }

    fn release_missing(&mut self, tracks: &[Track]) {
        let stale: Vec<Uuid> = self
            .mounted
            .keys()
            .filter(|id| !tracks.iter().any(|t| t.find_clip(**id).is_some()))
            .copied()
            .collect();
        for id in stale {
            if let Some(mut mounted) = self.mounted.remove(&id) {
                mounted.element.pause();
                mounted.element.detach();
                debug!("Released media for removed clip {}", id);
            }
        }
    }
}

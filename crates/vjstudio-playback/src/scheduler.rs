//! Playback scheduler: the timeline clock.
//!
//! Frame-driven. The caller passes the wall-clock `Instant` of each frame;
//! the scheduler advances the playhead by the elapsed time since the last
//! one. It is the only writer of [`PlaybackState`].

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use vjstudio_core::{Tick, TIME_EPSILON};

/// Point-in-time copy of the playback state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: 1.0,
        }
    }
}

/// Shared, read-only view of playback for consumers on any thread.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    inner: Arc<RwLock<PlaybackSnapshot>>,
}

impl PlaybackState {
    pub fn snapshot(&self) -> PlaybackSnapshot {
        *self.inner.read()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.read().is_playing
    }

    pub fn current_time(&self) -> f64 {
        self.inner.read().current_time
    }

    pub fn duration(&self) -> f64 {
        self.inner.read().duration
    }

    fn update(&self, f: impl FnOnce(&mut PlaybackSnapshot)) {
        f(&mut self.inner.write());
    }
}

/// Identifies one run of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopHandle(u64);

/// What a stop request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Playback was running and halted in place.
    Halted,
    /// Stopped again within the rewind window: playhead back to zero.
    Rewound,
    /// Already stopped; a second stop soon after will rewind.
    Armed,
}

/// Result of advancing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAdvance {
    pub tick: Tick,
    /// The playhead reached the end during this frame. Playback has
    /// stopped and the playhead was reset.
    pub reached_end: bool,
}

pub struct PlaybackScheduler {
    state: PlaybackState,
    active_loop: Option<LoopHandle>,
    next_loop_id: u64,
    last_frame: Option<Instant>,
    rewind_window: Duration,
    rewind_armed_at: Option<Instant>,
}

impl PlaybackScheduler {
    pub fn new(rewind_window: Duration) -> Self {
        Self {
            state: PlaybackState::default(),
            active_loop: None,
            next_loop_id: 1,
            last_frame: None,
            rewind_window,
            rewind_armed_at: None,
        }
    }

    /// Handle for consumers. All clones observe the same state.
    pub fn state(&self) -> PlaybackState {
        self.state.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.active_loop.is_some()
    }

    pub fn current_time(&self) -> f64 {
        self.state.current_time()
    }

    pub fn duration(&self) -> f64 {
        self.state.duration()
    }

    pub fn loop_handle(&self) -> Option<LoopHandle> {
        self.active_loop
    }

    pub fn tick(&self) -> Tick {
        let snapshot = self.state.snapshot();
        Tick {
            time: snapshot.current_time,
            duration: snapshot.duration,
        }
    }

    /// Track a new timeline duration, pulling the playhead back inside it.
    pub fn set_duration(&mut self, duration: f64) {
        self.state.update(|s| {
            s.duration = duration;
            s.current_time = s.current_time.clamp(0.0, duration);
        });
    }

    /// Move the playhead without touching the run state.
    pub fn set_time(&mut self, time: f64) {
        self.state.update(|s| s.current_time = time.clamp(0.0, s.duration));
    }

    /// Start the frame loop. Returns false if a loop is already running.
    ///
    /// A playhead at or past the end restarts from `restart_from`.
    pub fn play(&mut self, now: Instant, restart_from: f64) -> bool {
        if self.active_loop.is_some() {
            debug!("Play ignored: loop already active");
            return false;
        }
        let handle = LoopHandle(self.next_loop_id);
        self.next_loop_id += 1;
        self.active_loop = Some(handle);
        self.last_frame = Some(now);
        self.rewind_armed_at = None;

        self.state.update(|s| {
            if s.current_time >= s.duration - TIME_EPSILON {
                s.current_time = restart_from.clamp(0.0, s.duration);
            }
            s.is_playing = true;
        });
        info!(
            "Playback started at {:.3}s (loop {})",
            self.current_time(),
            handle.0
        );
        true
    }

    /// Advance by the wall-clock time since the previous frame.
    ///
    /// Returns `None` while stopped. When the playhead reaches the end the
    /// loop is stopped, the playhead reset to `restart_from`, and
    /// `reached_end` set; this happens once per run.
    pub fn frame(&mut self, now: Instant, restart_from: f64) -> Option<FrameAdvance> {
        self.active_loop?;
        let elapsed = self
            .last_frame
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f64());
        self.last_frame = Some(now);

        let mut reached_end = false;
        self.state.update(|s| {
            s.current_time += elapsed;
            if s.current_time >= s.duration {
                reached_end = true;
                s.current_time = restart_from.clamp(0.0, s.duration);
                s.is_playing = false;
            }
        });
        if reached_end {
            info!("Reached end of timeline at {:.3}s", self.duration());
            self.active_loop = None;
            self.last_frame = None;
        }
        Some(FrameAdvance {
            tick: self.tick(),
            reached_end,
        })
    }

    /// Stop button semantics; see [`StopOutcome`].
    pub fn stop(&mut self, now: Instant) -> StopOutcome {
        if self.active_loop.is_some() {
            self.halt();
            self.rewind_armed_at = Some(now);
            info!("Playback stopped at {:.3}s", self.current_time());
            return StopOutcome::Halted;
        }
        let within_window = self
            .rewind_armed_at
            .is_some_and(|armed| now.saturating_duration_since(armed) <= self.rewind_window);
        if within_window {
            self.rewind_armed_at = None;
            self.set_time(0.0);
            debug!("Rewound to start");
            StopOutcome::Rewound
        } else {
            self.rewind_armed_at = Some(now);
            StopOutcome::Armed
        }
    }

    /// Jump to `time`, clamped to the timeline. Halts playback.
    pub fn seek(&mut self, time: f64) -> Tick {
        if self.active_loop.is_some() {
            self.halt();
        }
        self.set_time(time);
        debug!("Seek to {:.3}s", self.current_time());
        self.tick()
    }

    /// Drop the active loop for good.
    pub fn shutdown(&mut self) {
        self.halt();
        self.rewind_armed_at = None;
    }

    fn halt(&mut self) {
        self.active_loop = None;
        self.last_frame = None;
        self.state.update(|s| s.is_playing = false);
    }
}

//! Timeline configuration.
//!
//! Every field is defaulted so a partial (or empty) JSON document is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VjError};

/// What happens when playback reaches the end of the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneEndPolicy {
    /// Stay stopped with the playhead reset.
    #[default]
    Stop,
    /// Restart the same scene from zero.
    Loop,
    /// Advance to the next scene and play it.
    PlayNext,
    /// Jump to a random other scene and play it.
    Random,
}

/// Magnet/snap settings for drag and resize interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapSettings {
    /// Magnet toggle. When off, snapping only happens while the modifier is held.
    pub magnet: bool,
    /// Snap distance in pixels (divided by pixels-per-second).
    pub threshold_px: f64,
    /// Include whole-second ticks as snap targets.
    pub second_grid: bool,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            magnet: false,
            threshold_px: 8.0,
            second_grid: true,
        }
    }
}

impl SnapSettings {
    /// Snapping is opt-in: magnet mode or a held modifier key.
    pub fn is_active(&self, modifier_held: bool) -> bool {
        self.magnet || modifier_held
    }

    /// Translate the pixel threshold into seconds at the given zoom.
    pub fn threshold_seconds(&self, pixels_per_second: f64) -> f64 {
        if pixels_per_second <= 0.0 {
            return 0.0;
        }
        self.threshold_px / pixels_per_second
    }
}

/// Configuration for the timeline core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub end_policy: SceneEndPolicy,
    pub snap: SnapSettings,
    /// Window in which a second stop rewinds to the start.
    pub rewind_window_ms: u64,
    /// Delay before a scene-end policy re-enters play.
    pub settle_delay_ms: u64,
    /// Maximum media-element drift before a reseek, in seconds.
    pub drift_tolerance: f64,
    /// Smallest duration a resize may produce, in seconds.
    pub min_clip_duration: f64,
    /// Step used by the step-forward/backward transport commands.
    pub step_seconds: f64,
    /// Duration given to dropped assets that carry none.
    pub default_clip_duration: f64,
    /// Initial zoom level.
    pub pixels_per_second: f64,
    /// Directory for persisted timelines. `None` uses the platform data dir.
    pub storage_dir: Option<PathBuf>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            end_policy: SceneEndPolicy::Stop,
            snap: SnapSettings::default(),
            rewind_window_ms: 500,
            settle_delay_ms: 100,
            drift_tolerance: 0.1,
            min_clip_duration: 0.1,
            step_seconds: 1.0 / 30.0,
            default_clip_duration: 5.0,
            pixels_per_second: 100.0,
            storage_dir: None,
        }
    }
}

impl TimelineConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)
            .map_err(|e| VjError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Reject values that would break the scheduler or layout rules.
    pub fn validate(&self) -> Result<()> {
        if !is_positive(self.min_clip_duration) {
            return Err(VjError::Config(format!(
                "min_clip_duration must be positive, got {}",
                self.min_clip_duration
            )));
        }
        if !is_positive(self.default_clip_duration)
            || self.default_clip_duration < self.min_clip_duration
        {
            return Err(VjError::Config(format!(
                "default_clip_duration {} is below min_clip_duration {}",
                self.default_clip_duration, self.min_clip_duration
            )));
        }
        if !is_positive(self.pixels_per_second) {
            return Err(VjError::Config(format!(
                "pixels_per_second must be positive, got {}",
                self.pixels_per_second
            )));
        }
        if self.drift_tolerance < 0.0 || !is_positive(self.step_seconds) {
            return Err(VjError::Config(
                "drift_tolerance must be >= 0 and step_seconds > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn rewind_window(&self) -> Duration {
        Duration::from_millis(self.rewind_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Directory for persisted timelines, falling back to the platform data dir.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vj-studio")
                .join("timelines")
        })
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

//! Clip types for the timeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Shortest clip a trim or split may produce, in seconds.
pub const MIN_CLIP_DURATION: f64 = 0.1;

/// Kind of media a clip (or track) carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Effect,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Effect => "effect",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal projection of a media or effect asset.
///
/// Deliberately limited to id, kind, path and duration: anything else a
/// browser payload carries is dropped on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl AssetRef {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            path: None,
            duration: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// A clip parameter value, stored as `{ "value": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    pub value: serde_json::Value,
}

impl ParamValue {
    pub fn number(value: f64) -> Self {
        Self {
            value: serde_json::Value::from(value),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }
}

fn default_opacity() -> f64 {
    1.0
}

fn is_default_opacity(value: &f64) -> bool {
    (*value - 1.0).abs() < f64::EPSILON
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

/// A timed placement of one asset on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// Unique clip ID
    pub id: Uuid,
    /// Timeline position in seconds
    pub start_time: f64,
    /// Duration on timeline in seconds
    pub duration: f64,
    pub kind: MediaKind,
    /// Clip name (displayed in UI)
    pub name: String,
    pub asset_ref: AssetRef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
    /// Offset into the source media at clip start
    #[serde(default, skip_serializing_if = "is_zero")]
    pub source_in: f64,
    #[serde(default = "default_opacity", skip_serializing_if = "is_default_opacity")]
    pub opacity: f64,
}

impl Clip {
    /// Create a new clip for an asset. The asset kind becomes the clip kind.
    pub fn new(name: impl Into<String>, asset_ref: AssetRef, start_time: f64, duration: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            duration,
            kind: asset_ref.kind,
            name: name.into(),
            asset_ref,
            params: BTreeMap::new(),
            source_in: 0.0,
            opacity: 1.0,
        }
    }

    /// Timeline end (exclusive).
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Whether the clip is active at `time` (`start <= time < end`).
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Position inside the source media for a timeline time.
    pub fn source_time_at(&self, time: f64) -> f64 {
        time - self.start_time + self.source_in
    }

    /// Set a numeric parameter.
    pub fn set_param(&mut self, name: impl Into<String>, value: f64) {
        self.params.insert(name.into(), ParamValue::number(value));
    }

    /// Read a numeric parameter.
    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(ParamValue::as_f64)
    }

    /// Copy with a fresh id, used by duplicate and split.
    pub fn fork(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_bounds() {
        let clip = Clip::new("a", AssetRef::new("a", MediaKind::Video), 2.0, 3.0);
        assert_eq!(clip.end_time(), 5.0);
        assert!(clip.contains(2.0));
        assert!(clip.contains(4.99));
        assert!(!clip.contains(5.0));
        assert!(!clip.contains(1.99));
    }

    #[test]
    fn test_source_time_accounts_for_source_in() {
        let mut clip = Clip::new("a", AssetRef::new("a", MediaKind::Audio), 10.0, 3.0);
        clip.source_in = 1.5;
        assert!((clip.source_time_at(11.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_asset_ref_drops_extra_payload() {
        let json = r#"{
            "id": "sunset",
            "kind": "video",
            "path": "/media/sunset.mp4",
            "duration": 12.5,
            "thumbnail": "data:image/png;base64,AAAA",
            "code": "void main() {}"
        }"#;
        let asset: AssetRef = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&asset).unwrap();
        assert_eq!(back.as_object().unwrap().len(), 4);
        assert_eq!(asset.duration, Some(12.5));
    }

    #[test]
    fn test_legacy_clip_defaults() {
        let json = r#"{
            "id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
            "startTime": 1.0,
            "duration": 2.0,
            "kind": "effect",
            "name": "Tunnel",
            "assetRef": { "id": "tunnel", "kind": "effect" }
        }"#;
        let clip: Clip = serde_json::from_str(json).unwrap();
        assert_eq!(clip.opacity, 1.0);
        assert_eq!(clip.source_in, 0.0);
        assert!(clip.params.is_empty());
    }

    #[test]
    fn test_params() {
        let mut clip = Clip::new("fx", AssetRef::new("fx", MediaKind::Effect), 0.0, 1.0);
        clip.set_param("speed", 0.75);
        assert_eq!(clip.param("speed"), Some(0.75));
        assert_eq!(clip.param("missing"), None);
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["params"]["speed"]["value"], 0.75);
    }
}

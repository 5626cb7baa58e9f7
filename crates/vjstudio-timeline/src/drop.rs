//! Drag-and-drop payloads.
//!
//! Payloads arrive as `application/json` objects tagged by `type`: either an
//! asset from a browser panel or a reference to clips already on the
//! timeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vjstudio_core::{Result, VjError};

use crate::clip::{AssetRef, MediaKind};

/// An asset dragged in from a media or effect browser.
///
/// Browsers attach much more (thumbnails, shader code); only these fields
/// are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl AssetPayload {
    /// Project the payload onto an asset reference of `kind`.
    pub fn asset_ref(&self, kind: MediaKind) -> AssetRef {
        AssetRef {
            id: self.id.clone(),
            kind,
            path: self.path.clone().or_else(|| self.file_path.clone()),
            duration: self.duration.filter(|d| d.is_finite() && *d > 0.0),
        }
    }

    /// Display name, falling back to the asset id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A drop payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DropPayload {
    #[serde(rename = "effect")]
    Effect(AssetPayload),
    #[serde(rename = "video")]
    Video(AssetPayload),
    #[serde(rename = "audio")]
    Audio(AssetPayload),
    #[serde(rename = "timeline-clip", rename_all = "camelCase")]
    TimelineClip { clip_id: Uuid, source_track_id: Uuid },
    #[serde(rename = "timeline-clip-multiple", rename_all = "camelCase")]
    TimelineClipMultiple {
        clip_ids: Vec<Uuid>,
        source_track_id: Uuid,
        #[serde(default)]
        anchor_clip_id: Option<Uuid>,
    },
    #[serde(rename = "timeline-clip-trim-left", rename_all = "camelCase")]
    TrimLeft { clip_id: Uuid, source_track_id: Uuid },
    #[serde(rename = "timeline-clip-trim-right", rename_all = "camelCase")]
    TrimRight { clip_id: Uuid, source_track_id: Uuid },
}

impl DropPayload {
    /// Parse an `application/json` drop payload.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VjError::Serialization(format!("Invalid drop payload: {}", e)))
    }

    /// The asset and its kind, for browser drops.
    pub fn asset(&self) -> Option<(MediaKind, &AssetPayload)> {
        match self {
            Self::Effect(asset) => Some((MediaKind::Effect, asset)),
            Self::Video(asset) => Some((MediaKind::Video, asset)),
            Self::Audio(asset) => Some((MediaKind::Audio, asset)),
            _ => None,
        }
    }
}

/// Request to measure the natural duration of a clip's media.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub clip_id: Uuid,
    pub path: String,
}

//! Typed publish/subscribe channel between the timeline core and its
//! collaborators.
//!
//! Outbound traffic (`TimelineEvent`) fans out to every subscriber in
//! subscription order. Inbound traffic (`InboundMessage`) is queued by the
//! collaborators and drained by the session at the start of each frame.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Result, VjError};

/// One frame's broadcast of the playback position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: f64,
    pub duration: f64,
}

/// Events produced by the timeline core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimelineEvent {
    /// Per frame while playing, and on every seek.
    Tick(Tick),
    Play,
    Stop,
    /// Halt every media engine (video, audio, generative).
    StopAll,
    SceneChanged { scene_id: String },
    /// Human-readable status, used for downgraded collaborator failures.
    Status { message: String },
}

/// Transport commands sent by an external transport UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TransportCommand {
    PlayPause,
    Stop,
    SeekToTime(f64),
    StepForward,
    StepBackward,
    GoToStart,
    GoToEnd,
    ClearTimeline,
}

impl TransportCommand {
    /// Parse the `{type, value}` wire form.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| VjError::Serialization(format!("Invalid transport command: {}", e)))
    }
}

/// What a modulation writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModulationTarget {
    Param(String),
    Opacity,
}

/// Single-parameter modulation, in its `{clipId, paramName|isOpacity, value}`
/// wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamModulation {
    pub clip_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_name: Option<String>,
    #[serde(default)]
    pub is_opacity: bool,
    pub value: f64,
}

impl ParamModulation {
    pub fn param(clip_id: Uuid, name: impl Into<String>, value: f64) -> Self {
        Self {
            clip_id,
            param_name: Some(name.into()),
            is_opacity: false,
            value,
        }
    }

    pub fn opacity(clip_id: Uuid, value: f64) -> Self {
        Self {
            clip_id,
            param_name: None,
            is_opacity: true,
            value,
        }
    }

    /// `None` when the message names neither a parameter nor opacity.
    pub fn target(&self) -> Option<ModulationTarget> {
        if self.is_opacity {
            Some(ModulationTarget::Opacity)
        } else {
            self.param_name.clone().map(ModulationTarget::Param)
        }
    }
}

/// Messages collaborators send into the core.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Modulate(ParamModulation),
    ModulateBatch {
        clip_id: Uuid,
        params: BTreeMap<String, f64>,
    },
    Command(TransportCommand),
    /// Natural duration of a clip's media, reported by the duration probe.
    DurationProbed { clip_id: Uuid, duration: f64 },
}

/// Fan-out broadcast channel for `TimelineEvent`s.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<TimelineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Delivery order follows registration order.
    pub fn subscribe(&self) -> Receiver<TimelineEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber. Subscribers whose receiver
    /// was dropped are pruned. Returns the number of deliveries.
    pub fn publish(&self, event: TimelineEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::trace!(?event, receivers = subscribers.len(), "Event published");
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        let tick = Tick {
            time: 1.5,
            duration: 10.0,
        };
        assert_eq!(bus.publish(TimelineEvent::Tick(tick)), 2);
        assert_eq!(a.try_recv().unwrap(), TimelineEvent::Tick(tick));
        assert_eq!(b.try_recv().unwrap(), TimelineEvent::Tick(tick));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.publish(TimelineEvent::StopAll), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().unwrap(), TimelineEvent::StopAll);
    }

    #[test]
    fn test_transport_command_wire_format() {
        let cmd = TransportCommand::from_json(r#"{"type": "seekToTime", "value": 4.5}"#).unwrap();
        assert_eq!(cmd, TransportCommand::SeekToTime(4.5));
        let cmd = TransportCommand::from_json(r#"{"type": "playPause"}"#).unwrap();
        assert_eq!(cmd, TransportCommand::PlayPause);
        assert!(TransportCommand::from_json(r#"{"type": "rewindTape"}"#).is_err());
    }

    #[test]
    fn test_modulation_target() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"clipId": "{}", "paramName": "speed", "value": 0.5}}"#, id);
        let msg: ParamModulation = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.target(), Some(ModulationTarget::Param("speed".into())));

        let json = format!(r#"{{"clipId": "{}", "isOpacity": true, "value": 0.2}}"#, id);
        let msg: ParamModulation = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.target(), Some(ModulationTarget::Opacity));

        let json = format!(r#"{{"clipId": "{}", "value": 0.2}}"#, id);
        let msg: ParamModulation = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.target(), None);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(TimelineEvent::Tick(Tick {
            time: 2.0,
            duration: 8.0,
        }))
        .unwrap();
        assert_eq!(json["type"], "tick");
        assert_eq!(json["time"], 2.0);
    }
}

//! Event system for host application delivery.
//!
//! This module provides:
//! - [`EventEmitter`] trait the adapter emits through
//! - [`BroadcastEventBridge`] for fan-out to any number of host subscribers
//! - [`CastSessionState`], the host-facing rendition of a snapshot

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::types::{
    ConnectionState, Device, MediaDescriptor, PlaybackState, SessionSnapshot,
};

/// Events delivered to the host application.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum HostEvent {
    /// Connection and playback state changes.
    Session(SessionEvent),

    /// Device list changes.
    Devices(DeviceEvent),
}

/// Session state events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session state changed.
    StateChanged {
        state: CastSessionState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Device discovery events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DeviceEvent {
    /// The aggregated device list changed.
    ListChanged {
        devices: Vec<Device>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<SessionEvent> for HostEvent {
    fn from(event: SessionEvent) -> Self {
        HostEvent::Session(event)
    }
}

impl From<DeviceEvent> for HostEvent {
    fn from(event: DeviceEvent) -> Self {
        HostEvent::Devices(event)
    }
}

/// Session state as the host sees it.
///
/// Unlike [`SessionSnapshot`] it carries the loaded media, and zero
/// positions are omitted rather than sent as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastSessionState {
    pub connection_state: ConnectionState,
    pub playback_state: PlaybackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_media: Option<MediaDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CastSessionState {
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot, media: Option<&MediaDescriptor>) -> Self {
        let non_zero = |value: i64| (value > 0).then_some(value);
        Self {
            connection_state: snapshot.connection_state,
            playback_state: snapshot.playback_state,
            connected_device: snapshot.connected_device.clone(),
            active_provider_id: snapshot.active_provider_id.clone(),
            current_media: media.cloned(),
            position_ms: non_zero(snapshot.position_ms),
            duration_ms: non_zero(snapshot.duration_ms),
            error_message: snapshot.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    #[test]
    fn zero_positions_are_omitted() {
        let snapshot = SessionSnapshot::for_provider("google_cast", ConnectionState::Connected)
            .with_device(Some(Device::new(
                "tv",
                "TV",
                ProviderKind::Chromecast,
                None,
            )));
        let state = CastSessionState::from_snapshot(&snapshot, None);

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("positionMs").is_none());
        assert!(json.get("durationMs").is_none());
        assert!(json.get("currentMedia").is_none());
        assert_eq!(json["connectedDevice"]["providerKind"], "chromecast");
    }

    #[test]
    fn media_and_progress_are_carried() {
        let snapshot = SessionSnapshot::for_provider("airplay", ConnectionState::Connected)
            .with_playback(PlaybackState::Playing)
            .with_progress(5000, 120_000);
        let media = MediaDescriptor::new("https://example.com/a.mp4", "A");
        let state = CastSessionState::from_snapshot(&snapshot, Some(&media));

        assert_eq!(state.position_ms, Some(5000));
        assert_eq!(state.duration_ms, Some(120_000));
        assert_eq!(state.current_media, Some(media));
    }

    #[test]
    fn host_event_is_tagged() {
        let event: HostEvent = DeviceEvent::ListChanged {
            devices: vec![],
            timestamp: 42,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "devices");
        assert_eq!(json["type"], "listChanged");
        assert_eq!(json["timestamp"], 42);
    }
}

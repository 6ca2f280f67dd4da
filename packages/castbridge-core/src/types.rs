//! Value types shared by providers, the coordinator and the host adapter.
//!
//! Everything here is an immutable value: devices are re-created on every
//! discovery refresh and snapshots are compared by value for deduplication.

use serde::{Deserialize, Serialize};

/// Casting technology that produced a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    /// Google Cast receivers (Chromecast, Cast-enabled TVs and speakers).
    Chromecast,
    /// AirPlay routes exposed by the operating system.
    AirPlay,
}

/// A discoverable receiver.
///
/// `id` is provider-namespaced and stable for the lifetime of a discovery
/// session. Devices are never mutated; a refresh produces new values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub provider_kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider_kind: ProviderKind,
        model_name: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider_kind,
            model_name,
        }
    }
}

/// Kind of content described by a [`MediaDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

/// Content to load on a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub content_url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// MIME type of the content (e.g. `video/mp4`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl MediaDescriptor {
    /// Creates a video descriptor with only the required fields set.
    pub fn new(content_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            content_url: content_url.into(),
            title: title.into(),
            subtitle: None,
            content_type: None,
            media_kind: MediaKind::Video,
            duration_ms: None,
            image_url: None,
        }
    }
}

/// Connection state of the casting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Playback state of the loaded media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

/// Canonical connection + playback state.
///
/// Providers build a fresh snapshot for every report, so an error message is
/// never carried over into the next transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    pub playback_state: PlaybackState,
    pub connected_device: Option<Device>,
    pub active_provider_id: Option<String>,
    pub position_ms: i64,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot for a provider with the given connection state; everything
    /// else is at its default.
    #[must_use]
    pub fn for_provider(provider_id: &str, connection_state: ConnectionState) -> Self {
        Self {
            connection_state,
            active_provider_id: Some(provider_id.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_playback(mut self, playback_state: PlaybackState) -> Self {
        self.playback_state = playback_state;
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: Option<Device>) -> Self {
        self.connected_device = device;
        self
    }

    /// Sets position and duration, clamping negative backend sentinels to 0.
    #[must_use]
    pub fn with_progress(mut self, position_ms: i64, duration_ms: i64) -> Self {
        self.position_ms = position_ms.max(0);
        self.duration_ms = duration_ms.max(0);
        self
    }

    /// Marks the snapshot as failed with `message`, keeping the connection
    /// state and device.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.playback_state = PlaybackState::Error;
        self.error_message = Some(message.into());
        self
    }

    /// Re-establishes the snapshot invariants.
    ///
    /// Positions are never negative and a disconnected session never names an
    /// active provider.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.position_ms = self.position_ms.max(0);
        self.duration_ms = self.duration_ms.max(0);
        if self.connection_state == ConnectionState::Disconnected {
            self.active_provider_id = None;
        }
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_disconnected_idle() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(snapshot.playback_state, PlaybackState::Idle);
        assert!(snapshot.active_provider_id.is_none());
        assert_eq!(snapshot.position_ms, 0);
    }

    #[test]
    fn progress_is_clamped() {
        let snapshot = SessionSnapshot::for_provider("a", ConnectionState::Connected)
            .with_progress(-1, -1000);
        assert_eq!(snapshot.position_ms, 0);
        assert_eq!(snapshot.duration_ms, 0);
    }

    #[test]
    fn normalized_drops_provider_when_disconnected() {
        let mut snapshot = SessionSnapshot::for_provider("a", ConnectionState::Disconnected);
        snapshot.position_ms = -5;
        let snapshot = snapshot.normalized();
        assert!(snapshot.active_provider_id.is_none());
        assert_eq!(snapshot.position_ms, 0);
    }

    #[test]
    fn with_error_keeps_connection() {
        let snapshot = SessionSnapshot::for_provider("a", ConnectionState::Connected)
            .with_error("boom");
        assert!(snapshot.is_connected());
        assert_eq!(snapshot.playback_state, PlaybackState::Error);
        assert_eq!(snapshot.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = SessionSnapshot::for_provider("google_cast", ConnectionState::Connected)
            .with_playback(PlaybackState::Playing)
            .with_progress(5000, 120_000);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["connectionState"], "connected");
        assert_eq!(json["playbackState"], "playing");
        assert_eq!(json["activeProviderId"], "google_cast");
        assert_eq!(json["positionMs"], 5000);
    }

    #[test]
    fn media_descriptor_deserializes_with_defaults() {
        let media: MediaDescriptor = serde_json::from_str(
            r#"{"contentUrl":"https://example.com/a.mp3","title":"A","mediaKind":"audio"}"#,
        )
        .unwrap();
        assert_eq!(media.media_kind, MediaKind::Audio);
        assert!(media.subtitle.is_none());
        assert!(media.duration_ms.is_none());
    }
}

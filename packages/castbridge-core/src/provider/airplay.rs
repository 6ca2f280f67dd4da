//! AirPlay provider (poll-based).
//!
//! The system exposes AirPlay as an audio route plus a local player with
//! external playback enabled. Route changes and player observations are
//! pushed, but playback progress is not, so a [`PositionTicker`] polls the
//! player while it is playing.
//!
//! Receivers cannot be enumerated or selected programmatically: discovery
//! only learns whether more than one route exists, and connecting shows the
//! system route picker.

use std::sync::Arc;

use url::Url;

use crate::dispatch::BackendEventSink;
use crate::ticker::PositionTicker;
use crate::types::{
    ConnectionState, Device, MediaDescriptor, PlaybackState, ProviderKind, SessionSnapshot,
};

use super::{
    clamp_volume, seconds_to_ms, BackendEvent, BackendResult, CastConnection, CastDiscovery,
    CastPlayback, CastProvider, ProviderObserver, StateReporter, AIRPLAY,
};

/// Id of the synthetic device advertised while AirPlay routes are available.
pub const AIRPLAY_AVAILABLE_DEVICE_ID: &str = "airplay_available";

/// Why the audio route changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeReason {
    NewDeviceAvailable,
    OldDeviceUnavailable,
    CategoryChange,
    Override,
    Other,
}

/// Status of the local player item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Unknown,
    ReadyToPlay,
    Failed,
}

/// Native AirPlay callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AirPlayEvent {
    RouteChanged { reason: RouteChangeReason },
    PlayerStatusChanged(PlayerStatus),
    ExternalPlaybackChanged { active: bool },
}

/// Seam to the platform route detector, audio session and player.
///
/// Player observations for a prepared player are posted through the sink
/// handed to [`add_listener`](AirPlayBackend::add_listener).
pub trait AirPlayBackend: Send + Sync {
    fn add_listener(&self, sink: BackendEventSink);
    fn remove_listener(&self);

    fn set_route_detection_enabled(&self, enabled: bool);
    fn multiple_routes_detected(&self) -> bool;
    /// Name of the AirPlay output of the current audio route, if any.
    fn connected_route_name(&self) -> Option<String>;
    fn show_route_picker(&self) -> BackendResult<()>;

    /// Replaces the current player with one for `url`, external playback
    /// enabled.
    fn prepare_player(&self, url: &Url) -> BackendResult<()>;
    fn has_player(&self) -> bool;
    fn disable_external_playback(&self);
    /// Pauses and releases the player and its observations.
    fn teardown_player(&self);

    fn play(&self);
    fn pause(&self);
    fn seek(&self, position_ms: i64);
    fn set_volume(&self, volume: f32);
    fn set_muted(&self, muted: bool);

    fn is_playing(&self) -> bool;
    /// Player time in seconds; `None` without a player.
    fn current_time_secs(&self) -> Option<f64>;
    /// Item duration in seconds; may be NaN while unknown.
    fn item_duration_secs(&self) -> Option<f64>;
    fn player_error(&self) -> Option<String>;
}

/// Stable device id for a route name (64-bit FNV-1a).
fn route_device_id(route_name: &str) -> String {
    let hash = route_name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        });
    format!("airplay_{hash:016x}")
}

/// Provider over the system AirPlay route and local player.
pub struct AirPlayProvider {
    backend: Arc<dyn AirPlayBackend>,
    ticker: PositionTicker,
    reporter: StateReporter,
    current_media: Option<MediaDescriptor>,
    connected: bool,
    discovering: bool,
    disposed: bool,
}

impl AirPlayProvider {
    /// Creates the provider and registers its backend listener.
    pub fn new(
        backend: Arc<dyn AirPlayBackend>,
        sink: BackendEventSink,
        ticker: PositionTicker,
    ) -> Self {
        let tick_sink = sink.clone();
        ticker.set_tick_handler(move || tick_sink.post(BackendEvent::PositionTick));
        backend.add_listener(sink);
        log::info!("[AirPlayProvider] Initialized");

        Self {
            backend,
            ticker,
            reporter: StateReporter::new(AIRPLAY),
            current_media: None,
            connected: false,
            discovering: false,
            disposed: false,
        }
    }

    pub fn current_media(&self) -> Option<&MediaDescriptor> {
        self.current_media.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn position_ms(&self) -> i64 {
        self.backend
            .current_time_secs()
            .map(seconds_to_ms)
            .unwrap_or(0)
    }

    fn duration_ms(&self) -> i64 {
        self.backend
            .item_duration_secs()
            .map(seconds_to_ms)
            .unwrap_or(0)
    }

    fn current_snapshot(&self) -> SessionSnapshot {
        let connection_state = if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let position_ms = self.position_ms();
        let playback_state = if self.backend.is_playing() {
            PlaybackState::Playing
        } else if position_ms > 0 {
            PlaybackState::Paused
        } else {
            PlaybackState::Idle
        };
        let device = self.backend.connected_route_name().map(|name| {
            Device::new(
                route_device_id(&name),
                name,
                ProviderKind::AirPlay,
                Some("AirPlay".to_string()),
            )
        });

        self.reporter
            .snapshot(connection_state)
            .with_playback(playback_state)
            .with_device(device)
            .with_progress(position_ms, self.duration_ms())
    }

    fn report_current_state(&mut self) {
        let state = self.current_snapshot();
        self.reporter.report(state);
        self.ticker
            .update_for_playback_state(self.backend.is_playing());
    }

    fn report_error(&mut self, message: impl Into<String>) {
        self.current_media = None;
        self.reporter.report_error(message);
    }

    fn notify_devices_changed(&self) {
        let devices = self.discovered_devices();
        log::debug!(
            "[AirPlayProvider] Discovered {} AirPlay device(s)",
            devices.len()
        );
        self.reporter.report_devices(devices);
    }

    fn cleanup(&mut self) {
        self.ticker.stop();
        self.backend.teardown_player();
    }

    fn handle_airplay_event(&mut self, event: AirPlayEvent) {
        match event {
            AirPlayEvent::RouteChanged { reason } => {
                match reason {
                    RouteChangeReason::NewDeviceAvailable => {
                        log::info!("[AirPlayProvider] New AirPlay device available");
                    }
                    RouteChangeReason::OldDeviceUnavailable => {
                        log::info!("[AirPlayProvider] AirPlay device disconnected");
                    }
                    other => log::debug!("[AirPlayProvider] Route changed: {:?}", other),
                }
                self.connected = reason != RouteChangeReason::OldDeviceUnavailable
                    && self.backend.connected_route_name().is_some();
                self.report_current_state();
            }
            AirPlayEvent::ExternalPlaybackChanged { active } => {
                log::info!("[AirPlayProvider] External playback active: {}", active);
                self.connected = active;
                self.report_current_state();
            }
            AirPlayEvent::PlayerStatusChanged(PlayerStatus::ReadyToPlay) => {
                log::debug!("[AirPlayProvider] Player ready to play");
                self.report_current_state();
            }
            AirPlayEvent::PlayerStatusChanged(PlayerStatus::Failed) => {
                let message = self
                    .backend
                    .player_error()
                    .unwrap_or_else(|| "Unknown playback error".to_string());
                log::warn!("[AirPlayProvider] Player failed: {}", message);
                self.ticker.stop();
                self.report_error(message);
            }
            AirPlayEvent::PlayerStatusChanged(PlayerStatus::Unknown) => {
                log::debug!("[AirPlayProvider] Player status unknown");
            }
        }
    }
}

impl CastDiscovery for AirPlayProvider {
    fn start_discovery(&mut self) {
        if self.disposed {
            return;
        }
        if self.discovering {
            log::debug!("[AirPlayProvider] Route detection already running");
        } else {
            log::info!("[AirPlayProvider] Starting route detection");
            self.backend.set_route_detection_enabled(true);
            self.discovering = true;
        }
        self.notify_devices_changed();
    }

    fn stop_discovery(&mut self) {
        if !self.discovering {
            return;
        }
        log::info!("[AirPlayProvider] Stopping route detection");
        self.backend.set_route_detection_enabled(false);
        self.discovering = false;
    }

    fn discovered_devices(&self) -> Vec<Device> {
        if !self.backend.multiple_routes_detected() {
            return Vec::new();
        }
        vec![Device::new(
            AIRPLAY_AVAILABLE_DEVICE_ID,
            "AirPlay",
            ProviderKind::AirPlay,
            Some("Tap to select device".to_string()),
        )]
    }
}

impl CastConnection for AirPlayProvider {
    fn connect(&mut self, device_id: &str) {
        if !self
            .discovered_devices()
            .iter()
            .any(|device| device.id == device_id)
        {
            log::warn!("[AirPlayProvider] Device not found: {}", device_id);
            self.report_error(format!("Device not found: {device_id}"));
            return;
        }

        log::info!("[AirPlayProvider] AirPlay selected, showing picker");
        self.show_picker();
    }

    fn disconnect(&mut self) {
        log::info!("[AirPlayProvider] Disconnecting");
        self.backend.disable_external_playback();
        self.cleanup();
        self.connected = false;
        self.current_media = None;
        self.reporter.report_reset();
    }
}

impl CastPlayback for AirPlayProvider {
    fn load_media(&mut self, media: &MediaDescriptor, autoplay: bool, position_ms: i64) {
        if !self.connected {
            log::warn!("[AirPlayProvider] Cannot load media: no AirPlay route");
            self.report_error("No active AirPlay route");
            return;
        }

        let url = match Url::parse(&media.content_url) {
            Ok(url) => url,
            Err(e) => {
                log::warn!(
                    "[AirPlayProvider] Invalid media URL {}: {}",
                    media.content_url,
                    e
                );
                self.report_error(format!("Invalid media URL: {}", media.content_url));
                return;
            }
        };

        log::info!("[AirPlayProvider] Loading media: {}", media.title);
        if let Err(e) = self.backend.prepare_player(&url) {
            log::warn!("[AirPlayProvider] Failed to prepare player: {}", e);
            self.report_error(e.to_string());
            return;
        }
        self.current_media = Some(media.clone());

        if position_ms > 0 {
            self.backend.seek(position_ms);
        }
        if autoplay {
            self.backend.play();
        }

        self.report_current_state();
    }

    fn play(&mut self) {
        if !self.backend.has_player() {
            log::debug!("[AirPlayProvider] No player, dropping play");
            return;
        }
        self.backend.play();
        self.report_current_state();
    }

    fn pause(&mut self) {
        if !self.backend.has_player() {
            log::debug!("[AirPlayProvider] No player, dropping pause");
            return;
        }
        self.backend.pause();
        self.report_current_state();
    }

    fn seek(&mut self, position_ms: i64) {
        if self.backend.has_player() {
            log::debug!("[AirPlayProvider] Seek to {}ms", position_ms);
            self.backend.seek(position_ms.max(0));
        }
    }

    /// Tears down the player but keeps the route; the session stays
    /// connected and idle.
    fn stop(&mut self) {
        log::info!("[AirPlayProvider] Stop");
        self.cleanup();
        self.current_media = None;
        let state = self
            .current_snapshot()
            .with_playback(PlaybackState::Idle)
            .with_progress(0, 0);
        self.reporter.report(state);
    }

    fn set_volume(&mut self, volume: f64) {
        if self.backend.has_player() {
            self.backend.set_volume(clamp_volume(volume) as f32);
        }
    }

    fn set_muted(&mut self, muted: bool) {
        if self.backend.has_player() {
            self.backend.set_muted(muted);
        }
    }
}

impl CastProvider for AirPlayProvider {
    fn identifier(&self) -> &str {
        AIRPLAY
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AirPlay
    }

    fn set_observer(&mut self, observer: Option<Arc<dyn ProviderObserver>>) {
        self.reporter.set_observer(observer);
    }

    fn handle_backend_event(&mut self, event: BackendEvent) {
        if self.disposed {
            return;
        }
        match event {
            BackendEvent::AirPlay(event) => self.handle_airplay_event(event),
            BackendEvent::PositionTick => {
                if self.backend.has_player() {
                    self.report_current_state();
                } else {
                    self.ticker.stop();
                }
            }
            BackendEvent::GoogleCast(event) => {
                log::warn!("[AirPlayProvider] Ignoring foreign event: {:?}", event);
            }
        }
    }

    fn show_picker(&mut self) {
        match self.backend.show_route_picker() {
            Ok(()) => log::info!("[AirPlayProvider] AirPlay picker shown"),
            Err(e) => {
                log::warn!("[AirPlayProvider] Failed to show AirPlay picker: {}", e);
                self.report_error(e.to_string());
            }
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        log::info!("[AirPlayProvider] Disposing");
        self.stop_discovery();
        self.cleanup();
        self.backend.remove_listener();
        self.reporter.set_observer(None);
        self.disposed = true;
    }
}

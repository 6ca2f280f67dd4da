//! Google Cast provider (push-based).
//!
//! The Cast SDK pushes everything: route changes, session lifecycle and media
//! status all arrive as callbacks. The host glue forwards them as
//! [`GoogleCastEvent`]s through the provider's `BackendEventSink`; this module
//! turns them into canonical snapshots.
//!
//! Session lifecycle handled here:
//!
//! ```text
//! Starting ─► Started ─────────────► Ending ─► Ended
//!    │                   ▲  Suspended (still connected)
//!    └► StartFailed      │
//!             Resuming ─► Resumed / ResumeFailed
//! ```

use std::sync::Arc;

use crate::dispatch::BackendEventSink;
use crate::ticker::PositionTicker;
use crate::types::{
    ConnectionState, Device, MediaDescriptor, MediaKind, PlaybackState, ProviderKind,
};

use super::{
    clamp_volume, BackendEvent, BackendResult, CastConnection, CastDiscovery, CastPlayback,
    CastProvider, ProviderObserver, StateReporter, GOOGLE_CAST,
};

/// Content type sent when the descriptor does not specify one.
const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// A media route as reported by the platform media router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastRoute {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// The local (phone speaker / screen) route.
    pub is_default: bool,
    pub is_enabled: bool,
    /// Whether the route matches the Cast application selector.
    pub matches_selector: bool,
}

impl CastRoute {
    fn is_castable(&self) -> bool {
        self.matches_selector && !self.is_default && self.is_enabled
    }

    fn to_device(&self) -> Device {
        Device::new(
            self.id.clone(),
            self.name.clone(),
            ProviderKind::Chromecast,
            self.description.clone(),
        )
    }
}

/// Receiver identity attached to a live Cast session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastDeviceInfo {
    pub device_id: String,
    pub friendly_name: String,
    pub model_name: Option<String>,
}

/// The SDK's current Cast session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastSessionInfo {
    pub session_id: String,
    pub device: Option<CastDeviceInfo>,
}

impl CastSessionInfo {
    fn to_device(&self) -> Option<Device> {
        self.device.as_ref().map(|device| {
            Device::new(
                device.device_id.clone(),
                device.friendly_name.clone(),
                ProviderKind::Chromecast,
                device.model_name.clone(),
            )
        })
    }
}

/// Remote player state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unknown,
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Why the remote player went idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    Finished,
    Cancelled,
    Interrupted,
    Error,
}

/// Snapshot of the remote media client's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStatus {
    pub player_state: PlayerState,
    pub idle_reason: Option<IdleReason>,
}

impl MediaStatus {
    /// Maps the Cast player state and idle reason onto [`PlaybackState`].
    pub fn playback_state(&self) -> PlaybackState {
        match self.player_state {
            PlayerState::Idle => match self.idle_reason {
                Some(IdleReason::Finished) => PlaybackState::Ended,
                Some(IdleReason::Error) => PlaybackState::Error,
                _ => PlaybackState::Idle,
            },
            PlayerState::Buffering => PlaybackState::Loading,
            PlayerState::Playing => PlaybackState::Playing,
            PlayerState::Paused => PlaybackState::Paused,
            PlayerState::Unknown => PlaybackState::Idle,
        }
    }
}

/// Cast stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Buffered,
    Live,
}

/// Cast metadata template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataType {
    Movie,
    MusicTrack,
}

/// A fully-resolved load request for the remote media client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub content_url: String,
    pub stream_type: StreamType,
    pub content_type: String,
    pub metadata_type: MetadataType,
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: Option<String>,
    pub stream_duration_ms: Option<i64>,
    pub autoplay: bool,
    pub current_time_ms: i64,
}

impl LoadRequest {
    pub fn new(media: &MediaDescriptor, autoplay: bool, position_ms: i64) -> Self {
        let metadata_type = match media.media_kind {
            MediaKind::Video => MetadataType::Movie,
            MediaKind::Audio => MetadataType::MusicTrack,
        };
        Self {
            content_url: media.content_url.clone(),
            stream_type: StreamType::Buffered,
            content_type: media
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            metadata_type,
            title: media.title.clone(),
            subtitle: media.subtitle.clone(),
            image_url: media.image_url.clone(),
            stream_duration_ms: media.duration_ms,
            autoplay,
            current_time_ms: position_ms.max(0),
        }
    }
}

/// Native Cast SDK callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleCastEvent {
    RouteAdded { name: String },
    RouteRemoved { name: String },
    RouteChanged { name: String },
    SessionStarting,
    SessionStarted { session_id: String },
    SessionStartFailed { error: i32 },
    SessionEnding,
    SessionEnded { error: i32 },
    SessionResuming { session_id: String },
    SessionResumed { was_suspended: bool },
    SessionResumeFailed { error: i32 },
    SessionSuspended { reason: i32 },
    MediaStatusUpdated,
}

/// Seam to the Google Cast SDK (media router, session manager and remote
/// media client).
///
/// Implementations may call back from any thread; callbacks must go through
/// the sink handed to the `add_*`/`attach_*` methods.
pub trait GoogleCastBackend: Send + Sync {
    /// Registers the route callback with active scanning.
    fn add_route_listener(&self, sink: BackendEventSink);
    fn remove_route_listener(&self);

    fn add_session_listener(&self, sink: BackendEventSink);
    fn remove_session_listener(&self);

    /// Attaches the remote media client status callback of the current session.
    fn attach_media_listener(&self, sink: BackendEventSink);
    fn detach_media_listener(&self);

    /// All routes currently known to the media router.
    fn routes(&self) -> Vec<CastRoute>;
    fn select_route(&self, route_id: &str) -> BackendResult<()>;

    fn current_session(&self) -> Option<CastSessionInfo>;
    fn end_current_session(&self, stop_casting: bool);

    /// Whether the current session exposes a remote media client.
    fn has_media_client(&self) -> bool;
    fn media_status(&self) -> Option<MediaStatus>;
    /// May be negative while the receiver is transitioning.
    fn approximate_stream_position(&self) -> i64;
    /// May be negative for unknown durations.
    fn stream_duration(&self) -> i64;

    fn load(&self, request: &LoadRequest) -> BackendResult<()>;
    fn play(&self) -> BackendResult<()>;
    fn pause(&self) -> BackendResult<()>;
    fn seek(&self, position_ms: i64) -> BackendResult<()>;
    fn stop(&self) -> BackendResult<()>;
    fn set_stream_volume(&self, volume: f64) -> BackendResult<()>;
    fn set_stream_mute(&self, muted: bool) -> BackendResult<()>;
}

/// Provider over the Google Cast SDK.
pub struct GoogleCastProvider {
    backend: Arc<dyn GoogleCastBackend>,
    sink: BackendEventSink,
    ticker: PositionTicker,
    reporter: StateReporter,
    current_media: Option<MediaDescriptor>,
    discovering: bool,
    session_listener_registered: bool,
    media_listener_attached: bool,
    disposed: bool,
}

impl GoogleCastProvider {
    pub fn new(
        backend: Arc<dyn GoogleCastBackend>,
        sink: BackendEventSink,
        ticker: PositionTicker,
    ) -> Self {
        let tick_sink = sink.clone();
        ticker.set_tick_handler(move || tick_sink.post(BackendEvent::PositionTick));

        Self {
            backend,
            sink,
            ticker,
            reporter: StateReporter::new(GOOGLE_CAST),
            current_media: None,
            discovering: false,
            session_listener_registered: false,
            media_listener_attached: false,
            disposed: false,
        }
    }

    /// Media most recently loaded through this provider, if still current.
    pub fn current_media(&self) -> Option<&MediaDescriptor> {
        self.current_media.as_ref()
    }

    fn current_device(&self) -> Option<Device> {
        self.backend
            .current_session()
            .and_then(|session| session.to_device())
    }

    fn notify_devices_changed(&self) {
        self.reporter.report_devices(self.discovered_devices());
    }

    fn attach_media_listener(&mut self) {
        if !self.media_listener_attached {
            self.backend.attach_media_listener(self.sink.clone());
            self.media_listener_attached = true;
        }
    }

    fn detach_media_listener(&mut self) {
        if self.media_listener_attached {
            self.backend.detach_media_listener();
            self.media_listener_attached = false;
        }
    }

    fn report_connected(&mut self) {
        let state = self
            .reporter
            .snapshot(ConnectionState::Connected)
            .with_device(self.current_device());
        self.reporter.report(state);
    }

    fn report_failure(&mut self, message: String) {
        self.current_media = None;
        let state = self
            .reporter
            .snapshot(ConnectionState::Disconnected)
            .with_error(message);
        self.reporter.report(state);
    }

    fn report_error(&mut self, message: impl Into<String>) {
        self.current_media = None;
        self.reporter.report_error(message);
    }

    /// Reads the remote media client and reports it as a connected snapshot.
    fn report_media_status(&mut self) {
        let Some(status) = self.backend.media_status() else {
            return;
        };

        let playback_state = status.playback_state();
        let position_ms = self.backend.approximate_stream_position();
        let duration_ms = self.backend.stream_duration();
        log::debug!(
            "[GoogleCastProvider] Playback status: {:?}, position={}ms",
            playback_state,
            position_ms
        );

        if playback_state == PlaybackState::Error {
            self.current_media = None;
        }

        let state = self
            .reporter
            .snapshot(ConnectionState::Connected)
            .with_playback(playback_state)
            .with_device(self.current_device())
            .with_progress(position_ms, duration_ms);
        self.reporter.report(state);

        self.ticker
            .update_for_playback_state(playback_state == PlaybackState::Playing);
    }

    fn handle_cast_event(&mut self, event: GoogleCastEvent) {
        match event {
            GoogleCastEvent::RouteAdded { name } => {
                log::debug!("[GoogleCastProvider] Route added: {}", name);
                self.notify_devices_changed();
            }
            GoogleCastEvent::RouteRemoved { name } => {
                log::debug!("[GoogleCastProvider] Route removed: {}", name);
                self.notify_devices_changed();
            }
            GoogleCastEvent::RouteChanged { name } => {
                log::debug!("[GoogleCastProvider] Route changed: {}", name);
                self.notify_devices_changed();
            }
            GoogleCastEvent::SessionStarting => {
                log::info!("[GoogleCastProvider] Session starting");
                let state = self.reporter.snapshot(ConnectionState::Connecting);
                self.reporter.report(state);
            }
            GoogleCastEvent::SessionStarted { session_id } => {
                log::info!("[GoogleCastProvider] Session started: {}", session_id);
                self.attach_media_listener();
                self.report_connected();
            }
            GoogleCastEvent::SessionStartFailed { error } => {
                log::warn!("[GoogleCastProvider] Session start failed: error={}", error);
                self.report_failure(format!("Failed to connect (error: {error})"));
            }
            GoogleCastEvent::SessionEnding => {
                log::info!("[GoogleCastProvider] Session ending");
                self.detach_media_listener();
            }
            GoogleCastEvent::SessionEnded { error } => {
                log::info!("[GoogleCastProvider] Session ended: error={}", error);
                self.detach_media_listener();
                self.current_media = None;
                self.ticker.stop();
                self.reporter.report_reset();
            }
            GoogleCastEvent::SessionResuming { session_id } => {
                log::info!("[GoogleCastProvider] Session resuming: {}", session_id);
                let state = self.reporter.snapshot(ConnectionState::Connecting);
                self.reporter.report(state);
            }
            GoogleCastEvent::SessionResumed { was_suspended } => {
                log::info!(
                    "[GoogleCastProvider] Session resumed (was_suspended={})",
                    was_suspended
                );
                self.attach_media_listener();
                self.report_connected();
            }
            GoogleCastEvent::SessionResumeFailed { error } => {
                log::warn!("[GoogleCastProvider] Session resume failed: error={}", error);
                self.report_failure(format!("Failed to resume session (error: {error})"));
            }
            GoogleCastEvent::SessionSuspended { reason } => {
                log::info!("[GoogleCastProvider] Session suspended: reason={}", reason);
            }
            GoogleCastEvent::MediaStatusUpdated => {
                if self.media_listener_attached {
                    self.report_media_status();
                }
            }
        }
    }

    /// Runs `command` against the remote media client, dropping it when there
    /// is no session.
    fn with_media_client(
        &self,
        operation: &str,
        command: impl FnOnce(&dyn GoogleCastBackend) -> BackendResult<()>,
    ) -> bool {
        if !self.backend.has_media_client() {
            log::debug!(
                "[GoogleCastProvider] No active session, dropping {}",
                operation
            );
            return false;
        }
        if let Err(e) = command(self.backend.as_ref()) {
            log::warn!("[GoogleCastProvider] {} failed: {}", operation, e);
        }
        true
    }
}

impl CastDiscovery for GoogleCastProvider {
    fn start_discovery(&mut self) {
        if self.disposed {
            return;
        }
        if self.discovering {
            log::debug!("[GoogleCastProvider] Discovery already running");
        } else {
            log::info!("[GoogleCastProvider] Starting discovery");
            self.backend.add_route_listener(self.sink.clone());
            if !self.session_listener_registered {
                self.backend.add_session_listener(self.sink.clone());
                self.session_listener_registered = true;
            }
            self.discovering = true;
        }
        self.notify_devices_changed();
    }

    fn stop_discovery(&mut self) {
        if !self.discovering {
            return;
        }
        log::info!("[GoogleCastProvider] Stopping discovery");
        self.backend.remove_route_listener();
        self.discovering = false;
    }

    fn discovered_devices(&self) -> Vec<Device> {
        self.backend
            .routes()
            .iter()
            .filter(|route| route.is_castable())
            .map(CastRoute::to_device)
            .collect()
    }
}

impl CastConnection for GoogleCastProvider {
    fn connect(&mut self, device_id: &str) {
        let Some(route) = self
            .backend
            .routes()
            .into_iter()
            .find(|route| route.id == device_id)
        else {
            log::warn!("[GoogleCastProvider] Device not found: {}", device_id);
            self.report_error(format!("Device not found: {device_id}"));
            return;
        };

        log::info!("[GoogleCastProvider] Connecting to: {}", route.name);
        if let Err(e) = self.backend.select_route(&route.id) {
            log::warn!("[GoogleCastProvider] Route selection failed: {}", e);
            self.report_failure(e.to_string());
        }
    }

    fn disconnect(&mut self) {
        if self.backend.current_session().is_none() {
            log::debug!("[GoogleCastProvider] No active session to disconnect");
            return;
        }
        log::info!("[GoogleCastProvider] Disconnecting");
        self.ticker.stop();
        self.backend.end_current_session(true);
    }
}

impl CastPlayback for GoogleCastProvider {
    fn load_media(&mut self, media: &MediaDescriptor, autoplay: bool, position_ms: i64) {
        if !self.backend.has_media_client() {
            log::warn!("[GoogleCastProvider] Cannot load media: no active session");
            self.report_error("No active Chromecast session");
            return;
        }

        log::info!("[GoogleCastProvider] Loading media: {}", media.title);
        self.current_media = Some(media.clone());
        let request = LoadRequest::new(media, autoplay, position_ms);
        if let Err(e) = self.backend.load(&request) {
            log::warn!("[GoogleCastProvider] Load failed: {}", e);
            self.report_error(e.to_string());
        }
    }

    fn play(&mut self) {
        self.with_media_client("play", |backend| backend.play());
    }

    fn pause(&mut self) {
        self.with_media_client("pause", |backend| backend.pause());
    }

    fn seek(&mut self, position_ms: i64) {
        let position_ms = position_ms.max(0);
        self.with_media_client("seek", |backend| backend.seek(position_ms));
    }

    fn stop(&mut self) {
        self.with_media_client("stop", |backend| backend.stop());
        self.current_media = None;
    }

    fn set_volume(&mut self, volume: f64) {
        let volume = clamp_volume(volume);
        self.with_media_client("set_volume", |backend| backend.set_stream_volume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.with_media_client("set_muted", |backend| backend.set_stream_mute(muted));
    }
}

impl CastProvider for GoogleCastProvider {
    fn identifier(&self) -> &str {
        GOOGLE_CAST
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Chromecast
    }

    fn set_observer(&mut self, observer: Option<Arc<dyn ProviderObserver>>) {
        self.reporter.set_observer(observer);
    }

    fn handle_backend_event(&mut self, event: BackendEvent) {
        if self.disposed {
            return;
        }
        match event {
            BackendEvent::GoogleCast(event) => self.handle_cast_event(event),
            BackendEvent::PositionTick => {
                if self.media_listener_attached {
                    self.report_media_status();
                } else {
                    self.ticker.stop();
                }
            }
            BackendEvent::AirPlay(event) => {
                log::warn!("[GoogleCastProvider] Ignoring foreign event: {:?}", event);
            }
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        log::info!("[GoogleCastProvider] Disposing");
        self.ticker.stop();
        self.stop_discovery();
        if self.session_listener_registered {
            self.backend.remove_session_listener();
            self.session_listener_registered = false;
        }
        self.detach_media_listener();
        self.reporter.set_observer(None);
        self.disposed = true;
    }
}

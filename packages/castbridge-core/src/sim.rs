//! In-process simulated backends.
//!
//! [`SimulatedGoogleCast`] and [`SimulatedAirPlay`] behave like the vendor
//! SDKs from the provider's point of view: they answer queries, post the
//! same callback sequences through the registered sinks and advance playback
//! position with wall-clock time. The simulator binary and the end-to-end
//! tests run on them.

use std::time::Instant;

use parking_lot::Mutex;
use url::Url;
use uuid::Uuid;

use crate::dispatch::BackendEventSink;
use crate::provider::{
    AirPlayBackend, AirPlayEvent, BackendError, BackendResult, CastDeviceInfo, CastRoute,
    CastSessionInfo, GoogleCastBackend, GoogleCastEvent, IdleReason, LoadRequest, MediaStatus,
    PlayerState, PlayerStatus, RouteChangeReason,
};

/// Duration reported for AirPlay items, which carry no duration hint.
const AIRPLAY_ITEM_DURATION_MS: i64 = 600_000;

/// Duration assumed for Cast loads without a duration hint.
const DEFAULT_CAST_DURATION_MS: i64 = 300_000;

/// Error code the Cast SDK reports for an unreachable receiver.
const CAST_ERROR_NETWORK: i32 = 2005;

/// Play head that advances with wall-clock time while playing.
#[derive(Debug, Clone)]
struct SimPlayhead {
    playing: bool,
    anchor_ms: i64,
    anchor_at: Instant,
    duration_ms: i64,
}

impl SimPlayhead {
    fn new(start_ms: i64, duration_ms: i64) -> Self {
        Self {
            playing: false,
            anchor_ms: start_ms.clamp(0, duration_ms),
            anchor_at: Instant::now(),
            duration_ms,
        }
    }

    fn position_ms(&self) -> i64 {
        if self.playing {
            let elapsed = self.anchor_at.elapsed().as_millis() as i64;
            (self.anchor_ms + elapsed).min(self.duration_ms)
        } else {
            self.anchor_ms
        }
    }

    fn finished(&self) -> bool {
        self.position_ms() >= self.duration_ms
    }

    fn play(&mut self) {
        if !self.playing {
            self.anchor_at = Instant::now();
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        self.anchor_ms = self.position_ms();
        self.playing = false;
    }

    fn seek(&mut self, position_ms: i64) {
        self.anchor_ms = position_ms.clamp(0, self.duration_ms);
        self.anchor_at = Instant::now();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Google Cast
// ─────────────────────────────────────────────────────────────────────────────

/// A simulated Cast receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReceiver {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    /// Unreachable receivers fail session start.
    pub reachable: bool,
}

impl SimReceiver {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: Some("Chromecast".to_string()),
            reachable: true,
        }
    }

    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }
}

#[derive(Default)]
struct CastInner {
    route_sink: Option<BackendEventSink>,
    session_sink: Option<BackendEventSink>,
    media_sink: Option<BackendEventSink>,
    session: Option<CastSessionInfo>,
    playhead: Option<SimPlayhead>,
    idle_reason: Option<IdleReason>,
    volume: f64,
    muted: bool,
}

impl CastInner {
    fn post_session(&self, event: GoogleCastEvent) {
        if let Some(sink) = &self.session_sink {
            sink.post(event);
        }
    }

    fn post_media_status(&self) {
        if let Some(sink) = &self.media_sink {
            sink.post(GoogleCastEvent::MediaStatusUpdated);
        }
    }
}

/// Simulated Google Cast SDK with a fixed set of receivers.
pub struct SimulatedGoogleCast {
    receivers: Vec<SimReceiver>,
    inner: Mutex<CastInner>,
}

impl SimulatedGoogleCast {
    pub fn new(receivers: Vec<SimReceiver>) -> Self {
        Self {
            receivers,
            inner: Mutex::new(CastInner {
                volume: 1.0,
                ..CastInner::default()
            }),
        }
    }

    pub fn volume(&self) -> f64 {
        self.inner.lock().volume
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    fn with_player(&self, mutate: impl FnOnce(&mut SimPlayhead)) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        let Some(playhead) = inner.playhead.as_mut() else {
            return Err(BackendError::Unavailable("no media loaded".to_string()));
        };
        mutate(playhead);
        inner.post_media_status();
        Ok(())
    }
}

impl GoogleCastBackend for SimulatedGoogleCast {
    fn add_route_listener(&self, sink: BackendEventSink) {
        for receiver in &self.receivers {
            sink.post(GoogleCastEvent::RouteAdded {
                name: receiver.name.clone(),
            });
        }
        self.inner.lock().route_sink = Some(sink);
    }

    fn remove_route_listener(&self) {
        self.inner.lock().route_sink = None;
    }

    fn add_session_listener(&self, sink: BackendEventSink) {
        self.inner.lock().session_sink = Some(sink);
    }

    fn remove_session_listener(&self) {
        self.inner.lock().session_sink = None;
    }

    fn attach_media_listener(&self, sink: BackendEventSink) {
        self.inner.lock().media_sink = Some(sink);
    }

    fn detach_media_listener(&self) {
        self.inner.lock().media_sink = None;
    }

    fn routes(&self) -> Vec<CastRoute> {
        let mut routes = vec![CastRoute {
            id: "default".to_string(),
            name: "This device".to_string(),
            description: None,
            is_default: true,
            is_enabled: true,
            matches_selector: false,
        }];
        routes.extend(self.receivers.iter().map(|receiver| CastRoute {
            id: receiver.id.clone(),
            name: receiver.name.clone(),
            description: receiver.model.clone(),
            is_default: false,
            is_enabled: true,
            matches_selector: true,
        }));
        routes
    }

    fn select_route(&self, route_id: &str) -> BackendResult<()> {
        let receiver = self
            .receivers
            .iter()
            .find(|r| r.id == route_id)
            .ok_or_else(|| BackendError::InvalidRequest(format!("unknown route {route_id}")))?;

        let mut inner = self.inner.lock();
        inner.post_session(GoogleCastEvent::SessionStarting);
        if !receiver.reachable {
            inner.post_session(GoogleCastEvent::SessionStartFailed {
                error: CAST_ERROR_NETWORK,
            });
            return Ok(());
        }

        let session_id = Uuid::new_v4().to_string();
        inner.session = Some(CastSessionInfo {
            session_id: session_id.clone(),
            device: Some(CastDeviceInfo {
                device_id: receiver.id.clone(),
                friendly_name: receiver.name.clone(),
                model_name: receiver.model.clone(),
            }),
        });
        inner.post_session(GoogleCastEvent::SessionStarted { session_id });
        Ok(())
    }

    fn current_session(&self) -> Option<CastSessionInfo> {
        self.inner.lock().session.clone()
    }

    fn end_current_session(&self, _stop_casting: bool) {
        let mut inner = self.inner.lock();
        if inner.session.is_none() {
            return;
        }
        inner.post_session(GoogleCastEvent::SessionEnding);
        inner.session = None;
        inner.playhead = None;
        inner.idle_reason = None;
        inner.post_session(GoogleCastEvent::SessionEnded { error: 0 });
    }

    fn has_media_client(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    fn media_status(&self) -> Option<MediaStatus> {
        let inner = self.inner.lock();
        inner.session.as_ref()?;
        let status = |player_state, idle_reason| MediaStatus {
            player_state,
            idle_reason,
        };
        Some(match &inner.playhead {
            None => status(PlayerState::Idle, inner.idle_reason),
            Some(p) if p.finished() => status(PlayerState::Idle, Some(IdleReason::Finished)),
            Some(p) if p.playing => status(PlayerState::Playing, None),
            Some(_) => status(PlayerState::Paused, None),
        })
    }

    fn approximate_stream_position(&self) -> i64 {
        self.inner
            .lock()
            .playhead
            .as_ref()
            .map_or(0, SimPlayhead::position_ms)
    }

    fn stream_duration(&self) -> i64 {
        self.inner
            .lock()
            .playhead
            .as_ref()
            .map_or(-1, |p| p.duration_ms)
    }

    fn load(&self, request: &LoadRequest) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        if inner.session.is_none() {
            return Err(BackendError::Unavailable("no session".to_string()));
        }
        if !request.content_url.starts_with("http") {
            return Err(BackendError::Rejected(format!(
                "Receiver cannot load {}",
                request.content_url
            )));
        }

        let duration_ms = request
            .stream_duration_ms
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_CAST_DURATION_MS);
        let mut playhead = SimPlayhead::new(request.current_time_ms, duration_ms);
        if request.autoplay {
            playhead.play();
        }
        inner.playhead = Some(playhead);
        inner.idle_reason = None;
        inner.post_media_status();
        Ok(())
    }

    fn play(&self) -> BackendResult<()> {
        self.with_player(SimPlayhead::play)
    }

    fn pause(&self) -> BackendResult<()> {
        self.with_player(SimPlayhead::pause)
    }

    fn seek(&self, position_ms: i64) -> BackendResult<()> {
        self.with_player(|p| p.seek(position_ms))
    }

    fn stop(&self) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.playhead = None;
        inner.idle_reason = Some(IdleReason::Cancelled);
        inner.post_media_status();
        Ok(())
    }

    fn set_stream_volume(&self, volume: f64) -> BackendResult<()> {
        self.inner.lock().volume = volume;
        Ok(())
    }

    fn set_stream_mute(&self, muted: bool) -> BackendResult<()> {
        self.inner.lock().muted = muted;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AirPlay
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct AirPlayInner {
    sink: Option<BackendEventSink>,
    detection_enabled: bool,
    connected_route: Option<String>,
    player_prepared: bool,
    playhead: Option<SimPlayhead>,
    player_error: Option<String>,
    volume: f32,
    muted: bool,
}

impl AirPlayInner {
    fn post(&self, event: AirPlayEvent) {
        if let Some(sink) = &self.sink {
            sink.post(event);
        }
    }
}

/// Simulated AirPlay route detector, route picker and player.
///
/// The picker always selects the first configured route.
pub struct SimulatedAirPlay {
    routes: Vec<String>,
    inner: Mutex<AirPlayInner>,
}

impl SimulatedAirPlay {
    pub fn new(routes: Vec<String>) -> Self {
        Self {
            routes,
            inner: Mutex::new(AirPlayInner {
                volume: 1.0,
                ..AirPlayInner::default()
            }),
        }
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    /// Simulates the receiver going away.
    pub fn drop_route(&self) {
        let mut inner = self.inner.lock();
        inner.connected_route = None;
        inner.post(AirPlayEvent::RouteChanged {
            reason: RouteChangeReason::OldDeviceUnavailable,
        });
    }
}

impl AirPlayBackend for SimulatedAirPlay {
    fn add_listener(&self, sink: BackendEventSink) {
        self.inner.lock().sink = Some(sink);
    }

    fn remove_listener(&self) {
        self.inner.lock().sink = None;
    }

    fn set_route_detection_enabled(&self, enabled: bool) {
        self.inner.lock().detection_enabled = enabled;
    }

    fn multiple_routes_detected(&self) -> bool {
        self.inner.lock().detection_enabled && !self.routes.is_empty()
    }

    fn connected_route_name(&self) -> Option<String> {
        self.inner.lock().connected_route.clone()
    }

    fn show_route_picker(&self) -> BackendResult<()> {
        let Some(route) = self.routes.first() else {
            return Err(BackendError::Unavailable(
                "No AirPlay routes available".to_string(),
            ));
        };
        let mut inner = self.inner.lock();
        inner.connected_route = Some(route.clone());
        inner.post(AirPlayEvent::RouteChanged {
            reason: RouteChangeReason::NewDeviceAvailable,
        });
        Ok(())
    }

    fn prepare_player(&self, url: &Url) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.player_prepared = true;
        if !matches!(url.scheme(), "http" | "https") {
            inner.playhead = None;
            inner.player_error = Some(format!("Cannot open {url}"));
            inner.post(AirPlayEvent::PlayerStatusChanged(PlayerStatus::Failed));
            return Ok(());
        }

        inner.playhead = Some(SimPlayhead::new(0, AIRPLAY_ITEM_DURATION_MS));
        inner.player_error = None;
        inner.post(AirPlayEvent::PlayerStatusChanged(PlayerStatus::ReadyToPlay));
        if inner.connected_route.is_some() {
            inner.post(AirPlayEvent::ExternalPlaybackChanged { active: true });
        }
        Ok(())
    }

    fn has_player(&self) -> bool {
        self.inner.lock().player_prepared
    }

    fn disable_external_playback(&self) {
        self.inner.lock().connected_route = None;
    }

    fn teardown_player(&self) {
        let mut inner = self.inner.lock();
        inner.player_prepared = false;
        inner.playhead = None;
        inner.player_error = None;
    }

    fn play(&self) {
        if let Some(p) = self.inner.lock().playhead.as_mut() {
            p.play();
        }
    }

    fn pause(&self) {
        if let Some(p) = self.inner.lock().playhead.as_mut() {
            p.pause();
        }
    }

    fn seek(&self, position_ms: i64) {
        if let Some(p) = self.inner.lock().playhead.as_mut() {
            p.seek(position_ms);
        }
    }

    fn set_volume(&self, volume: f32) {
        self.inner.lock().volume = volume;
    }

    fn set_muted(&self, muted: bool) {
        self.inner.lock().muted = muted;
    }

    fn is_playing(&self) -> bool {
        self.inner
            .lock()
            .playhead
            .as_ref()
            .is_some_and(|p| p.playing && !p.finished())
    }

    fn current_time_secs(&self) -> Option<f64> {
        self.inner
            .lock()
            .playhead
            .as_ref()
            .map(|p| p.position_ms() as f64 / 1000.0)
    }

    fn item_duration_secs(&self) -> Option<f64> {
        self.inner
            .lock()
            .playhead
            .as_ref()
            .map(|p| p.duration_ms as f64 / 1000.0)
    }

    fn player_error(&self) -> Option<String> {
        self.inner.lock().player_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SessionCoordinator;
    use crate::provider::{AirPlayProvider, GoogleCastProvider, AIRPLAY, GOOGLE_CAST};
    use crate::ticker::PositionTicker;
    use crate::types::{ConnectionState, MediaDescriptor, PlaybackState, SessionSnapshot};
    use std::sync::Arc;

    type Emitted = Arc<Mutex<Vec<SessionSnapshot>>>;

    fn coordinator_with(
        cast: Arc<SimulatedGoogleCast>,
        airplay: Arc<SimulatedAirPlay>,
    ) -> (SessionCoordinator, Emitted) {
        let mut coordinator = SessionCoordinator::new();
        let cast_sink = coordinator.dispatcher().backend_sink(GOOGLE_CAST);
        let airplay_sink = coordinator.dispatcher().backend_sink(AIRPLAY);
        coordinator.register_provider(Box::new(GoogleCastProvider::new(
            cast,
            cast_sink,
            PositionTicker::inert(),
        )));
        coordinator.register_provider(Box::new(AirPlayProvider::new(
            airplay,
            airplay_sink,
            PositionTicker::inert(),
        )));

        let emitted: Emitted = Arc::default();
        let sink = Arc::clone(&emitted);
        coordinator.set_state_observer(Some(Box::new(
            move |state: &SessionSnapshot, _media: Option<&MediaDescriptor>| {
                sink.lock().push(state.clone());
            },
        )));
        (coordinator, emitted)
    }

    fn last(emitted: &Emitted) -> SessionSnapshot {
        emitted.lock().last().cloned().unwrap_or_default()
    }

    #[test]
    fn cast_session_end_to_end() {
        let cast = Arc::new(SimulatedGoogleCast::new(vec![SimReceiver::new(
            "cast_living",
            "Living Room",
        )]));
        let airplay = Arc::new(SimulatedAirPlay::new(vec![]));
        let (mut coordinator, emitted) = coordinator_with(cast.clone(), airplay);

        coordinator.start_discovery();
        coordinator.pump();
        let ids: Vec<_> = coordinator
            .discovered_devices()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["cast_living"]);

        coordinator.connect("cast_living");
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.connection_state, ConnectionState::Connected);
        assert_eq!(state.active_provider_id.as_deref(), Some(GOOGLE_CAST));
        assert_eq!(
            state.connected_device.map(|d| d.name),
            Some("Living Room".to_string())
        );

        let mut media = MediaDescriptor::new("https://example.com/movie.mp4", "Movie");
        media.duration_ms = Some(90_000);
        coordinator.load_media(media, true, 0);
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.playback_state, PlaybackState::Playing);
        assert_eq!(state.duration_ms, 90_000);
        assert!(coordinator.current_media().is_some());

        coordinator.set_volume(0.25);
        assert_eq!(cast.volume(), 0.25);

        coordinator.pause();
        coordinator.pump();
        assert_eq!(last(&emitted).playback_state, PlaybackState::Paused);

        coordinator.disconnect();
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state, SessionSnapshot::default());
        assert!(coordinator.active_provider_id().is_none());
    }

    #[test]
    fn unreachable_receiver_reports_start_failure() {
        let cast = Arc::new(SimulatedGoogleCast::new(vec![
            SimReceiver::new("cast_attic", "Attic").unreachable(),
        ]));
        let airplay = Arc::new(SimulatedAirPlay::new(vec![]));
        let (mut coordinator, emitted) = coordinator_with(cast, airplay);

        coordinator.start_discovery();
        coordinator.connect("cast_attic");
        coordinator.pump();

        let state = last(&emitted);
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert_eq!(
            state.error_message.as_deref(),
            Some("Failed to connect (error: 2005)")
        );
        assert!(coordinator.active_provider_id().is_none());
    }

    #[test]
    fn airplay_session_end_to_end() {
        let cast = Arc::new(SimulatedGoogleCast::new(vec![]));
        let airplay = Arc::new(SimulatedAirPlay::new(vec!["Bedroom TV".to_string()]));
        let (mut coordinator, emitted) = coordinator_with(cast, airplay.clone());

        coordinator.start_discovery();
        coordinator.pump();
        assert_eq!(
            coordinator.discovered_devices()[0].id,
            crate::provider::AIRPLAY_AVAILABLE_DEVICE_ID
        );

        coordinator.connect(crate::provider::AIRPLAY_AVAILABLE_DEVICE_ID);
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.connection_state, ConnectionState::Connected);
        assert_eq!(
            state.connected_device.map(|d| d.name),
            Some("Bedroom TV".to_string())
        );

        coordinator.load_media(
            MediaDescriptor::new("https://example.com/clip.mp4", "Clip"),
            true,
            0,
        );
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.playback_state, PlaybackState::Playing);
        assert_eq!(state.duration_ms, AIRPLAY_ITEM_DURATION_MS);

        coordinator.set_volume(2.0);
        assert_eq!(airplay.volume(), 1.0);

        airplay.drop_route();
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert!(state.active_provider_id.is_none());
        assert!(coordinator.active_provider_id().is_none());
    }

    #[test]
    fn airplay_stop_keeps_route_for_next_load() {
        let cast = Arc::new(SimulatedGoogleCast::new(vec![]));
        let airplay = Arc::new(SimulatedAirPlay::new(vec!["Study".to_string()]));
        let (mut coordinator, emitted) = coordinator_with(cast, airplay);

        coordinator.start_discovery();
        coordinator.connect(crate::provider::AIRPLAY_AVAILABLE_DEVICE_ID);
        coordinator.pump();
        coordinator.load_media(
            MediaDescriptor::new("https://example.com/one.mp4", "One"),
            true,
            0,
        );
        coordinator.pump();

        coordinator.stop();
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.connection_state, ConnectionState::Connected);
        assert_eq!(state.playback_state, PlaybackState::Idle);
        assert_eq!(coordinator.active_provider_id(), Some(AIRPLAY));
        assert!(coordinator.current_media().is_none());

        let next = MediaDescriptor::new("https://example.com/two.mp4", "Two");
        coordinator.load_media(next.clone(), true, 0);
        coordinator.pump();
        let state = last(&emitted);
        assert_eq!(state.playback_state, PlaybackState::Playing);
        assert_eq!(state.active_provider_id.as_deref(), Some(AIRPLAY));
        assert_eq!(coordinator.current_media(), Some(&next));
    }

    #[test]
    fn airplay_player_failure_surfaces_error() {
        let cast = Arc::new(SimulatedGoogleCast::new(vec![]));
        let airplay = Arc::new(SimulatedAirPlay::new(vec!["Den".to_string()]));
        let (mut coordinator, emitted) = coordinator_with(cast, airplay);

        coordinator.start_discovery();
        coordinator.connect(crate::provider::AIRPLAY_AVAILABLE_DEVICE_ID);
        coordinator.pump();
        coordinator.load_media(MediaDescriptor::new("ftp://example.com/a.mp4", "A"), true, 0);
        coordinator.pump();

        let state = last(&emitted);
        assert_eq!(state.playback_state, PlaybackState::Error);
        assert_eq!(
            state.error_message.as_deref(),
            Some("Cannot open ftp://example.com/a.mp4")
        );
    }

    #[test]
    fn playhead_clamps_seek() {
        let mut playhead = SimPlayhead::new(0, 1000);
        playhead.seek(5000);
        assert_eq!(playhead.position_ms(), 1000);
        assert!(playhead.finished());
        playhead.seek(-10);
        assert_eq!(playhead.position_ms(), 0);
    }
}

//! Provider contract shared by all casting backends.
//!
//! A provider adapts one casting technology to the canonical model: it owns
//! that backend's device list and raw session state, translates native
//! callbacks into [`SessionSnapshot`]s, and reports them to a single
//! [`ProviderObserver`].
//!
//! The contract is split into capability traits the same way the backend
//! SDKs split them, then combined into [`CastProvider`], which is what the
//! coordinator stores in its registry.
//!
//! Providers never return errors to their callers. Every failure, including
//! vendor SDK errors, becomes an `Error` snapshot.

pub mod airplay;
pub mod google_cast;

use std::sync::Arc;

use thiserror::Error;

use crate::types::{ConnectionState, Device, MediaDescriptor, ProviderKind, SessionSnapshot};

pub use airplay::{
    AirPlayBackend, AirPlayEvent, AirPlayProvider, PlayerStatus, RouteChangeReason,
    AIRPLAY_AVAILABLE_DEVICE_ID,
};
pub use google_cast::{
    CastDeviceInfo, CastRoute, CastSessionInfo, GoogleCastBackend, GoogleCastEvent,
    GoogleCastProvider, IdleReason, LoadRequest, MediaStatus, MetadataType, PlayerState,
    StreamType,
};

/// Registry identifier of the Google Cast provider.
pub const GOOGLE_CAST: &str = "google_cast";
/// Registry identifier of the AirPlay provider.
pub const AIRPLAY: &str = "airplay";

/// Failures reported by vendor backend SDKs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend has no session/player able to execute the request.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request.
    #[error("{0}")]
    Rejected(String),

    /// The request was malformed for this backend.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for backend SDK calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// A raw callback from a backend SDK (or a position tick), delivered on the
/// coordinator context to the owning provider.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    GoogleCast(GoogleCastEvent),
    AirPlay(AirPlayEvent),
    /// The provider's position ticker fired.
    PositionTick,
}

impl From<GoogleCastEvent> for BackendEvent {
    fn from(event: GoogleCastEvent) -> Self {
        Self::GoogleCast(event)
    }
}

impl From<AirPlayEvent> for BackendEvent {
    fn from(event: AirPlayEvent) -> Self {
        Self::AirPlay(event)
    }
}

/// Consumer of a provider's reports. The coordinator installs its queue here.
pub trait ProviderObserver: Send + Sync {
    fn on_provider_state_changed(&self, provider_id: &str, state: SessionSnapshot);

    fn on_provider_devices_changed(&self, provider_id: &str, devices: Vec<Device>);
}

/// Device discovery capability.
pub trait CastDiscovery {
    /// Begins scanning. Calling it while already scanning does not restart
    /// the scan but still reports the current devices.
    fn start_discovery(&mut self);

    fn stop_discovery(&mut self);

    /// Currently known devices of this provider only.
    fn discovered_devices(&self) -> Vec<Device>;
}

/// Connection capability.
pub trait CastConnection {
    /// Starts connecting. The outcome is reported asynchronously; an unknown
    /// id is reported as an `Error` snapshot with the connection unchanged.
    fn connect(&mut self, device_id: &str);

    /// Tears down the current connection, if any.
    fn disconnect(&mut self);
}

/// Playback capability.
///
/// Commands issued without a connection are dropped, not queued.
pub trait CastPlayback {
    fn load_media(&mut self, media: &MediaDescriptor, autoplay: bool, position_ms: i64);

    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position_ms: i64);

    fn stop(&mut self);

    /// `volume` is clamped to `[0, 1]`.
    fn set_volume(&mut self, volume: f64);

    fn set_muted(&mut self, muted: bool);
}

/// Full provider contract stored in the coordinator registry.
pub trait CastProvider: CastDiscovery + CastConnection + CastPlayback + Send {
    /// Registry key; constant for the lifetime of the provider.
    fn identifier(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Installs or clears the single observer. Replacing it redirects all
    /// future reports immediately.
    fn set_observer(&mut self, observer: Option<Arc<dyn ProviderObserver>>);

    /// Handles a callback previously posted through this provider's
    /// `BackendEventSink`.
    fn handle_backend_event(&mut self, event: BackendEvent);

    /// Shows the system route picker, for backends that select receivers
    /// through one.
    fn show_picker(&mut self) {
        log::debug!("[{}] No route picker for this provider", self.identifier());
    }

    /// Stops discovery and ticking, unregisters backend listeners and clears
    /// the observer. Safe to call more than once.
    fn dispose(&mut self);
}

/// Clamps a volume level to `[0, 1]`; NaN becomes 0.
pub(crate) fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Converts backend seconds to milliseconds, mapping non-finite and negative
/// values to 0.
pub(crate) fn seconds_to_ms(seconds: f64) -> i64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0) as i64
    } else {
        0
    }
}

/// Observer slot plus the last reported connection, shared by providers.
///
/// Remembering the last connection state and device lets failures such as
/// "device not found" be reported without changing the connection.
pub(crate) struct StateReporter {
    provider_id: &'static str,
    observer: Option<Arc<dyn ProviderObserver>>,
    last_connection: ConnectionState,
    last_device: Option<Device>,
}

impl StateReporter {
    pub fn new(provider_id: &'static str) -> Self {
        Self {
            provider_id,
            observer: None,
            last_connection: ConnectionState::Disconnected,
            last_device: None,
        }
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn ProviderObserver>>) {
        self.observer = observer;
    }

    /// A snapshot pre-filled with this provider's id.
    pub fn snapshot(&self, connection_state: ConnectionState) -> SessionSnapshot {
        SessionSnapshot::for_provider(self.provider_id, connection_state)
    }

    pub fn report(&mut self, state: SessionSnapshot) {
        self.last_connection = state.connection_state;
        self.last_device = state.connected_device.clone();
        log::debug!("[{}] State changed: {:?}", self.provider_id, state);
        if let Some(observer) = &self.observer {
            observer.on_provider_state_changed(self.provider_id, state);
        }
    }

    /// Reports the reset state (disconnected, idle, no device).
    pub fn report_reset(&mut self) {
        let state = self.snapshot(ConnectionState::Disconnected);
        self.report(state);
    }

    /// Reports an error while keeping the last connection state and device.
    pub fn report_error(&mut self, message: impl Into<String>) {
        let state = self
            .snapshot(self.last_connection)
            .with_device(self.last_device.clone())
            .with_error(message);
        self.report(state);
    }

    pub fn report_devices(&self, devices: Vec<Device>) {
        if let Some(observer) = &self.observer {
            observer.on_provider_devices_changed(self.provider_id, devices);
        }
    }
}

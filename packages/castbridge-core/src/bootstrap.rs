//! Session bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where providers,
//! the coordinator, the host event bridge and the session actor are created
//! and wired together.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::adapter::CastBridge;
use crate::config::Config;
use crate::coordinator::SessionCoordinator;
use crate::error::{CastError, CastResult};
use crate::events::{BroadcastEventBridge, HostEvent};
use crate::provider::{
    AirPlayBackend, AirPlayProvider, GoogleCastBackend, GoogleCastProvider, AIRPLAY, GOOGLE_CAST,
};
use crate::runtime::TokioSpawner;
use crate::session::CastSessionHandle;
use crate::ticker::PositionTicker;

/// Vendor SDK bindings supplied by the host.
#[derive(Default, Clone)]
pub struct Backends {
    pub google_cast: Option<Arc<dyn GoogleCastBackend>>,
    pub airplay: Option<Arc<dyn AirPlayBackend>>,
}

/// Container for the bootstrapped session.
#[derive(Clone)]
pub struct BootstrappedSession {
    /// Inbound command surface.
    pub session: CastSessionHandle,
    /// Outbound host events. Subscribe, or set an external emitter.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Identifiers of the registered providers, in registry order.
    pub providers: Vec<String>,
    /// Task spawner the session runs on.
    pub spawner: TokioSpawner,
}

impl BootstrappedSession {
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.event_bridge.subscribe()
    }
}

/// Builds and starts a session from `config`.
///
/// Every enabled provider must have a backend in `backends`.
///
/// # Errors
///
/// Returns [`CastError::Configuration`] for invalid configuration and
/// [`CastError::ProviderNotFound`] when an enabled provider has no backend.
pub fn bootstrap_session(
    config: &Config,
    backends: Backends,
    spawner: TokioSpawner,
) -> CastResult<BootstrappedSession> {
    config.validate()?;

    let mut coordinator = SessionCoordinator::new()
        .with_spawner(spawner.clone())
        .with_connect_timeout(config.connect_timeout());

    if config.google_cast_enabled {
        let backend = backends
            .google_cast
            .ok_or_else(|| CastError::ProviderNotFound(GOOGLE_CAST.to_string()))?;
        let sink = coordinator.dispatcher().backend_sink(GOOGLE_CAST);
        let ticker = PositionTicker::new(config.position_interval(), spawner.clone());
        coordinator.register_provider(Box::new(GoogleCastProvider::new(backend, sink, ticker)));
    }

    if config.airplay_enabled {
        let backend = backends
            .airplay
            .ok_or_else(|| CastError::ProviderNotFound(AIRPLAY.to_string()))?;
        let sink = coordinator.dispatcher().backend_sink(AIRPLAY);
        let ticker = PositionTicker::new(config.position_interval(), spawner.clone());
        coordinator.register_provider(Box::new(AirPlayProvider::new(backend, sink, ticker)));
    }

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    CastBridge::new(event_bridge.clone()).attach(&mut coordinator);

    let providers: Vec<String> = coordinator
        .provider_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    log::info!("[Bootstrap] Starting cast session with providers {:?}", providers);

    let session = CastSessionHandle::spawn(coordinator, &spawner);

    Ok(BootstrappedSession {
        session,
        event_bridge,
        providers,
        spawner,
    })
}

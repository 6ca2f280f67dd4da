//! Session coordinator.
//!
//! Responsibilities:
//! - Owning the provider registry and the single active provider
//! - Aggregating discovered devices across providers
//! - Resolving and arbitrating connection requests
//! - Forwarding playback commands to the active provider only
//! - Normalizing and deduplicating outgoing state
//!
//! The coordinator is the only consumer of its [`Inbox`]. Provider reports,
//! backend callbacks and ticker ticks are queued envelopes, so every method
//! here runs on one logical context and nothing needs a lock.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dispatch::{Command, Dispatcher, Envelope, Inbox};
use crate::provider::{BackendEvent, CastProvider, ProviderObserver, AIRPLAY};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::types::{ConnectionState, Device, MediaDescriptor, SessionSnapshot};

/// Outward state observer. Receives every distinct snapshot together with
/// the media the coordinator currently holds.
pub type StateObserver = Box<dyn Fn(&SessionSnapshot, Option<&MediaDescriptor>) + Send>;

/// Outward device observer. Receives the aggregated device list.
pub type DevicesObserver = Box<dyn Fn(&[Device]) + Send>;

/// A dispatched connect still waiting for its outcome.
struct PendingConnect {
    attempt: u64,
    device_id: String,
    timer: CancellationToken,
}

/// Owns every provider and arbitrates which one drives the session.
pub struct SessionCoordinator {
    dispatcher: Dispatcher,
    inbox: Inbox,
    spawner: Option<TokioSpawner>,
    connect_timeout: Option<Duration>,
    providers: Vec<Box<dyn CastProvider>>,
    active_provider_id: Option<String>,
    current_state: SessionSnapshot,
    current_media: Option<MediaDescriptor>,
    /// Media handed to the state observer with the last emission.
    emitted_media: Option<MediaDescriptor>,
    state_observer: Option<StateObserver>,
    devices_observer: Option<DevicesObserver>,
    pending_connect: Option<PendingConnect>,
    connect_attempts: u64,
    disposed: bool,
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCoordinator {
    /// Creates a coordinator with its own queue and no providers.
    #[must_use]
    pub fn new() -> Self {
        let (dispatcher, inbox) = Dispatcher::channel();
        Self {
            dispatcher,
            inbox,
            spawner: None,
            connect_timeout: None,
            providers: Vec::new(),
            active_provider_id: None,
            current_state: SessionSnapshot::default(),
            current_media: None,
            emitted_media: None,
            state_observer: None,
            devices_observer: None,
            pending_connect: None,
            connect_attempts: 0,
            disposed: false,
        }
    }

    /// Attaches the spawner used for connect-timeout timers.
    #[must_use]
    pub fn with_spawner(mut self, spawner: TokioSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Gives up on a connect that has not resolved after `timeout`.
    /// `None` waits indefinitely. Requires a spawner to take effect.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sending half of this coordinator's queue. Providers get their
    /// backend sinks from here.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Adds `provider` to the registry, replacing any provider with the same
    /// identifier, and routes its reports into the queue.
    pub fn register_provider(&mut self, mut provider: Box<dyn CastProvider>) {
        let observer: Arc<dyn ProviderObserver> = Arc::new(self.dispatcher.clone());
        provider.set_observer(Some(observer));

        let id = provider.identifier().to_string();
        if let Some(slot) = self.providers.iter_mut().find(|p| p.identifier() == id) {
            log::info!("[SessionCoordinator] Replacing provider: {}", id);
            slot.set_observer(None);
            *slot = provider;
        } else {
            log::info!("[SessionCoordinator] Registered provider: {}", id);
            self.providers.push(provider);
        }
    }

    pub fn set_state_observer(&mut self, observer: Option<StateObserver>) {
        self.state_observer = observer;
    }

    pub fn set_devices_observer(&mut self, observer: Option<DevicesObserver>) {
        self.devices_observer = observer;
    }

    pub fn current_state(&self) -> &SessionSnapshot {
        &self.current_state
    }

    pub fn current_media(&self) -> Option<&MediaDescriptor> {
        self.current_media.as_ref()
    }

    pub fn active_provider_id(&self) -> Option<&str> {
        self.active_provider_id.as_deref()
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.identifier()).collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────────

    pub fn start_discovery(&mut self) {
        log::info!(
            "[SessionCoordinator] Starting discovery on {} provider(s)",
            self.providers.len()
        );
        for provider in &mut self.providers {
            provider.start_discovery();
        }
    }

    pub fn stop_discovery(&mut self) {
        log::info!("[SessionCoordinator] Stopping discovery");
        for provider in &mut self.providers {
            provider.stop_discovery();
        }
    }

    /// Every provider's devices, concatenated in registry order.
    pub fn discovered_devices(&self) -> Vec<Device> {
        self.providers
            .iter()
            .flat_map(|p| p.discovered_devices())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Connects to `device_id` through the provider that lists it.
    ///
    /// When two providers list the same id the first one in registry order
    /// wins.
    pub fn connect(&mut self, device_id: &str) {
        let Some(index) = self.find_provider_for_device(device_id) else {
            log::warn!("[SessionCoordinator] Device not found: {}", device_id);
            let mut state = self.current_state.clone();
            state.connection_state = ConnectionState::Disconnected;
            self.update_state(state.with_error(format!("Device not found: {device_id}")));
            return;
        };

        let target_id = self.providers[index].identifier().to_string();
        if let Some(active_id) = self.active_provider_id.clone() {
            if active_id != target_id {
                log::info!(
                    "[SessionCoordinator] Switching provider: {} -> {}",
                    active_id,
                    target_id
                );
                if let Some(active) = self.provider_mut(&active_id) {
                    active.disconnect();
                }
                self.current_media = None;
            }
        }

        log::info!(
            "[SessionCoordinator] Connecting to {} via {}",
            device_id,
            target_id
        );
        self.active_provider_id = Some(target_id);
        self.arm_connect_timeout(device_id);
        self.providers[index].connect(device_id);
    }

    /// Disconnects the active provider and resets state immediately, without
    /// waiting for the provider's confirmation.
    pub fn disconnect(&mut self) {
        self.clear_pending_connect();
        if let Some(active_id) = self.active_provider_id.take() {
            log::info!("[SessionCoordinator] Disconnecting from {}", active_id);
            if let Some(active) = self.provider_mut(&active_id) {
                active.disconnect();
            }
        } else {
            log::debug!("[SessionCoordinator] Disconnect with no active provider");
        }
        self.current_media = None;
        self.update_state(SessionSnapshot::default());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────────────────

    pub fn load_media(&mut self, media: MediaDescriptor, autoplay: bool, position_ms: i64) {
        let Some(active) = self.active_provider_mut("load_media") else {
            return;
        };
        active.load_media(&media, autoplay, position_ms);
        self.current_media = Some(media);
    }

    pub fn play(&mut self) {
        if let Some(active) = self.active_provider_mut("play") {
            active.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(active) = self.active_provider_mut("pause") {
            active.pause();
        }
    }

    pub fn seek(&mut self, position_ms: i64) {
        if let Some(active) = self.active_provider_mut("seek") {
            active.seek(position_ms);
        }
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active_provider_mut("stop") {
            active.stop();
            self.current_media = None;
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        if let Some(active) = self.active_provider_mut("set_volume") {
            active.set_volume(volume);
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        if let Some(active) = self.active_provider_mut("set_muted") {
            active.set_muted(muted);
        }
    }

    /// Shows the AirPlay route picker if an AirPlay provider is registered.
    pub fn show_airplay_picker(&mut self) {
        match self.provider_mut(AIRPLAY) {
            Some(provider) => provider.show_picker(),
            None => log::debug!("[SessionCoordinator] No AirPlay provider registered"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provider reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies the arbitration rules to a provider state report.
    pub fn on_provider_state_changed(&mut self, provider_id: &str, mut state: SessionSnapshot) {
        match self.active_provider_id.as_deref() {
            Some(active) if active != provider_id => {
                log::debug!(
                    "[SessionCoordinator] Ignoring state from inactive provider {} (active: {})",
                    provider_id,
                    active
                );
                return;
            }
            None if state.connection_state == ConnectionState::Connected => {
                log::info!(
                    "[SessionCoordinator] Adopting {} as active provider",
                    provider_id
                );
                self.active_provider_id = Some(provider_id.to_string());
            }
            _ => {}
        }

        match state.connection_state {
            ConnectionState::Connected => self.clear_pending_connect(),
            ConnectionState::Disconnected => {
                if self.active_provider_id.as_deref() == Some(provider_id) {
                    log::info!(
                        "[SessionCoordinator] Active provider {} disconnected",
                        provider_id
                    );
                    self.active_provider_id = None;
                    self.clear_pending_connect();
                }
                self.current_media = None;
                state.active_provider_id = None;
            }
            ConnectionState::Connecting => {}
        }

        self.update_state(state);
    }

    /// Applies the arbitration rules to a provider device report and emits
    /// the aggregated device list.
    pub fn on_provider_devices_changed(&mut self, provider_id: &str, devices: Vec<Device>) {
        if let Some(active) = self.active_provider_id.as_deref() {
            if active != provider_id {
                log::debug!(
                    "[SessionCoordinator] Ignoring devices from inactive provider {}",
                    provider_id
                );
                return;
            }
        }

        log::debug!(
            "[SessionCoordinator] {} reported {} device(s)",
            provider_id,
            devices.len()
        );
        if let Some(observer) = &self.devices_observer {
            observer(&self.discovered_devices());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Handles one queued envelope.
    pub(crate) fn process(&mut self, envelope: Envelope) {
        if self.disposed {
            if let Envelope::Command(Command::Dispose(Some(ack))) = envelope {
                let _ = ack.send(());
            }
            return;
        }

        match envelope {
            Envelope::Command(command) => self.execute(command),
            Envelope::ProviderState { provider_id, state } => {
                self.on_provider_state_changed(&provider_id, state);
            }
            Envelope::ProviderDevices {
                provider_id,
                devices,
            } => self.on_provider_devices_changed(&provider_id, devices),
            Envelope::Backend { provider_id, event } => {
                self.route_backend_event(&provider_id, event);
            }
            Envelope::ConnectTimeout { attempt } => self.on_connect_timeout(attempt),
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::StartDiscovery => self.start_discovery(),
            Command::StopDiscovery => self.stop_discovery(),
            Command::DiscoveredDevices(reply) => {
                let _ = reply.send(self.discovered_devices());
            }
            Command::CurrentState(reply) => {
                let _ = reply.send(self.current_state.clone());
            }
            Command::Connect(device_id) => self.connect(&device_id),
            Command::Disconnect => self.disconnect(),
            Command::LoadMedia {
                media,
                autoplay,
                position_ms,
            } => self.load_media(media, autoplay, position_ms),
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Seek(position_ms) => self.seek(position_ms),
            Command::Stop => self.stop(),
            Command::SetVolume(volume) => self.set_volume(volume),
            Command::SetMuted(muted) => self.set_muted(muted),
            Command::ShowAirPlayPicker => self.show_airplay_picker(),
            Command::Dispose(ack) => {
                self.dispose();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    /// Drains every envelope currently queued, including the ones queued
    /// while draining. Returns how many were processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(envelope) = self.inbox.try_next() {
            self.process(envelope);
            processed += 1;
        }
        processed
    }

    /// Processes envelopes until the coordinator is disposed.
    pub async fn run(mut self) {
        log::debug!("[SessionCoordinator] Event loop started");
        while let Some(envelope) = self.inbox.next().await {
            self.process(envelope);
            if self.disposed {
                break;
            }
        }
        log::debug!("[SessionCoordinator] Event loop stopped");
    }

    /// Disposes every provider and clears all state. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        log::info!("[SessionCoordinator] Disposing");
        self.clear_pending_connect();
        for provider in &mut self.providers {
            provider.dispose();
        }
        self.providers.clear();
        self.active_provider_id = None;
        self.current_media = None;
        self.emitted_media = None;
        self.state_observer = None;
        self.devices_observer = None;
        self.disposed = true;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn find_provider_for_device(&self, device_id: &str) -> Option<usize> {
        self.providers.iter().position(|provider| {
            provider
                .discovered_devices()
                .iter()
                .any(|device| device.id == device_id)
        })
    }

    fn provider_mut(&mut self, id: &str) -> Option<&mut Box<dyn CastProvider>> {
        self.providers.iter_mut().find(|p| p.identifier() == id)
    }

    fn active_provider_mut(&mut self, operation: &str) -> Option<&mut Box<dyn CastProvider>> {
        let Some(active_id) = self.active_provider_id.clone() else {
            log::debug!(
                "[SessionCoordinator] No active provider, dropping {}",
                operation
            );
            return None;
        };
        self.provider_mut(&active_id)
    }

    fn route_backend_event(&mut self, provider_id: &str, event: BackendEvent) {
        match self.provider_mut(provider_id) {
            Some(provider) => provider.handle_backend_event(event),
            None => log::debug!(
                "[SessionCoordinator] Dropping event for unregistered provider {}",
                provider_id
            ),
        }
    }

    /// Normalizes `state` and emits it if it or the held media differs from
    /// the last emission.
    fn update_state(&mut self, state: SessionSnapshot) {
        let state = state.normalized();
        if state == self.current_state && self.current_media == self.emitted_media {
            return;
        }
        self.current_state = state;
        self.emitted_media = self.current_media.clone();
        if let Some(observer) = &self.state_observer {
            observer(&self.current_state, self.current_media.as_ref());
        }
    }

    fn arm_connect_timeout(&mut self, device_id: &str) {
        self.clear_pending_connect();
        self.connect_attempts += 1;
        let attempt = self.connect_attempts;

        let (Some(timeout), Some(spawner)) = (self.connect_timeout, &self.spawner) else {
            return;
        };

        let dispatcher = self.dispatcher.clone();
        let timer = spawner.spawn_cancellable(async move {
            tokio::time::sleep(timeout).await;
            dispatcher.post(Envelope::ConnectTimeout { attempt });
        });

        self.pending_connect = Some(PendingConnect {
            attempt,
            device_id: device_id.to_string(),
            timer,
        });
    }

    fn clear_pending_connect(&mut self) {
        if let Some(pending) = self.pending_connect.take() {
            pending.timer.cancel();
        }
    }

    fn on_connect_timeout(&mut self, attempt: u64) {
        if self.pending_connect.as_ref().map(|p| p.attempt) != Some(attempt) {
            log::trace!("[SessionCoordinator] Stale connect timeout #{}", attempt);
            return;
        }
        let Some(pending) = self.pending_connect.take() else {
            return;
        };

        log::warn!(
            "[SessionCoordinator] Connection to {} timed out",
            pending.device_id
        );
        if let Some(active_id) = self.active_provider_id.take() {
            if let Some(active) = self.provider_mut(&active_id) {
                active.disconnect();
            }
        }
        self.current_media = None;
        self.update_state(
            SessionSnapshot::default()
                .with_error(format!("Connection timed out: {}", pending.device_id)),
        );
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.clear_pending_connect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CastConnection, CastDiscovery, CastPlayback};
    use crate::types::{PlaybackState, ProviderKind};
    use parking_lot::Mutex;

    /// Records what the coordinator asked a provider to do.
    #[derive(Default)]
    struct Calls {
        start_discovery: Mutex<usize>,
        connects: Mutex<Vec<String>>,
        disconnects: Mutex<usize>,
        loads: Mutex<Vec<String>>,
        plays: Mutex<usize>,
        pickers: Mutex<usize>,
        disposes: Mutex<usize>,
        observer_set: Mutex<bool>,
    }

    struct MockProvider {
        id: &'static str,
        devices: Vec<Device>,
        calls: Arc<Calls>,
        observer: Option<Arc<dyn ProviderObserver>>,
    }

    impl MockProvider {
        fn new(id: &'static str, device_ids: &[&str]) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let devices = device_ids
                .iter()
                .map(|d| Device::new(*d, d.to_uppercase(), ProviderKind::Chromecast, None))
                .collect();
            (
                Self {
                    id,
                    devices,
                    calls: Arc::clone(&calls),
                    observer: None,
                },
                calls,
            )
        }
    }

    impl CastDiscovery for MockProvider {
        fn start_discovery(&mut self) {
            *self.calls.start_discovery.lock() += 1;
            if let Some(observer) = &self.observer {
                observer.on_provider_devices_changed(self.id, self.devices.clone());
            }
        }
        fn stop_discovery(&mut self) {}
        fn discovered_devices(&self) -> Vec<Device> {
            self.devices.clone()
        }
    }

    impl CastConnection for MockProvider {
        fn connect(&mut self, device_id: &str) {
            self.calls.connects.lock().push(device_id.to_string());
        }
        fn disconnect(&mut self) {
            *self.calls.disconnects.lock() += 1;
        }
    }

    impl CastPlayback for MockProvider {
        fn load_media(&mut self, media: &MediaDescriptor, _autoplay: bool, _position_ms: i64) {
            self.calls.loads.lock().push(media.title.clone());
        }
        fn play(&mut self) {
            *self.calls.plays.lock() += 1;
        }
        fn pause(&mut self) {}
        fn seek(&mut self, _position_ms: i64) {}
        fn stop(&mut self) {}
        fn set_volume(&mut self, _volume: f64) {}
        fn set_muted(&mut self, _muted: bool) {}
    }

    impl CastProvider for MockProvider {
        fn identifier(&self) -> &str {
            self.id
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Chromecast
        }
        fn set_observer(&mut self, observer: Option<Arc<dyn ProviderObserver>>) {
            *self.calls.observer_set.lock() = observer.is_some();
            self.observer = observer;
        }
        fn handle_backend_event(&mut self, _event: BackendEvent) {}
        fn show_picker(&mut self) {
            *self.calls.pickers.lock() += 1;
        }
        fn dispose(&mut self) {
            *self.calls.disposes.lock() += 1;
        }
    }

    type Emitted = Arc<Mutex<Vec<(SessionSnapshot, Option<MediaDescriptor>)>>>;

    fn observed(coordinator: &mut SessionCoordinator) -> Emitted {
        let emitted: Emitted = Arc::default();
        let sink = Arc::clone(&emitted);
        coordinator.set_state_observer(Some(Box::new(
            move |state: &SessionSnapshot, media: Option<&MediaDescriptor>| {
                sink.lock().push((state.clone(), media.cloned()));
            },
        )));
        emitted
    }

    fn report(coordinator: &SessionCoordinator, provider_id: &str, state: SessionSnapshot) {
        coordinator
            .dispatcher()
            .on_provider_state_changed(provider_id, state);
    }

    fn two_providers() -> (SessionCoordinator, Arc<Calls>, Arc<Calls>, Emitted) {
        let mut coordinator = SessionCoordinator::new();
        let (a, a_calls) = MockProvider::new("a", &["a_1"]);
        let (b, b_calls) = MockProvider::new("b", &["b_2"]);
        coordinator.register_provider(Box::new(a));
        coordinator.register_provider(Box::new(b));
        let emitted = observed(&mut coordinator);
        (coordinator, a_calls, b_calls, emitted)
    }

    #[test]
    fn register_sets_observer_and_replacement_clears_old_one() {
        let mut coordinator = SessionCoordinator::new();
        let (first, first_calls) = MockProvider::new("a", &["a_1"]);
        let (second, second_calls) = MockProvider::new("a", &["a_9"]);

        coordinator.register_provider(Box::new(first));
        assert!(*first_calls.observer_set.lock());

        coordinator.register_provider(Box::new(second));
        assert!(!*first_calls.observer_set.lock());
        assert!(*second_calls.observer_set.lock());
        assert_eq!(coordinator.provider_ids(), vec!["a"]);
        assert_eq!(coordinator.discovered_devices()[0].id, "a_9");
    }

    #[test]
    fn discovered_devices_in_registry_order() {
        let (coordinator, _, _, _) = two_providers();
        let ids: Vec<_> = coordinator
            .discovered_devices()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a_1", "b_2"]);
    }

    #[test]
    fn start_discovery_twice_yields_same_devices() {
        let (mut coordinator, a_calls, _, _) = two_providers();
        let devices: Arc<Mutex<Vec<Vec<Device>>>> = Arc::default();
        let sink = Arc::clone(&devices);
        coordinator.set_devices_observer(Some(Box::new(move |list: &[Device]| {
            sink.lock().push(list.to_vec());
        })));

        coordinator.start_discovery();
        coordinator.pump();
        let once = coordinator.discovered_devices();
        coordinator.start_discovery();
        coordinator.pump();

        assert_eq!(coordinator.discovered_devices(), once);
        assert_eq!(*a_calls.start_discovery.lock(), 2);
        let reports = devices.lock();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|list| list.len() == 2));
    }

    #[test]
    fn connect_unknown_device_emits_single_error_and_contacts_nobody() {
        let (mut coordinator, a_calls, b_calls, emitted) = two_providers();

        coordinator.connect("zz_9");
        coordinator.pump();

        let emitted = emitted.lock();
        assert_eq!(emitted.len(), 1);
        let state = &emitted[0].0;
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert_eq!(state.playback_state, PlaybackState::Error);
        assert_eq!(state.error_message.as_deref(), Some("Device not found: zz_9"));
        assert!(state.active_provider_id.is_none());
        assert!(a_calls.connects.lock().is_empty());
        assert!(b_calls.connects.lock().is_empty());
    }

    #[test]
    fn supersession_disconnects_previous_provider() {
        let (mut coordinator, a_calls, b_calls, _) = two_providers();

        coordinator.connect("a_1");
        assert_eq!(coordinator.active_provider_id(), Some("a"));
        assert_eq!(a_calls.connects.lock().as_slice(), ["a_1".to_string()]);
        assert!(b_calls.connects.lock().is_empty());

        coordinator.connect("b_2");
        assert_eq!(*a_calls.disconnects.lock(), 1);
        assert_eq!(coordinator.active_provider_id(), Some("b"));
        assert_eq!(b_calls.connects.lock().as_slice(), ["b_2".to_string()]);
        assert_eq!(a_calls.connects.lock().len(), 1);
    }

    #[test]
    fn inactive_provider_reports_never_reach_observer() {
        let (mut coordinator, _, _, emitted) = two_providers();
        coordinator.connect("a_1");
        coordinator.pump();

        for connection in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ] {
            report(&coordinator, "b", SessionSnapshot::for_provider("b", connection));
        }
        coordinator.pump();

        assert!(emitted.lock().is_empty());
        assert_eq!(coordinator.active_provider_id(), Some("a"));
    }

    #[test]
    fn identical_snapshots_are_emitted_once() {
        let (mut coordinator, _, _, emitted) = two_providers();
        coordinator.connect("a_1");

        let state = SessionSnapshot::for_provider("a", ConnectionState::Connected)
            .with_playback(PlaybackState::Playing)
            .with_progress(5000, 120_000);
        report(&coordinator, "a", state.clone());
        report(&coordinator, "a", state);
        coordinator.pump();

        assert_eq!(emitted.lock().len(), 1);
    }

    #[test]
    fn active_provider_disconnect_clears_provider_id() {
        let (mut coordinator, _, _, emitted) = two_providers();
        coordinator.connect("a_1");

        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Connected)
                .with_playback(PlaybackState::Playing)
                .with_progress(5000, 120_000),
        );
        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Disconnected),
        );
        coordinator.pump();

        let emitted = emitted.lock();
        let (last, _) = emitted.last().unwrap();
        assert_eq!(last.connection_state, ConnectionState::Disconnected);
        assert!(last.active_provider_id.is_none());
        assert!(coordinator.active_provider_id().is_none());
    }

    #[test]
    fn connected_report_without_active_provider_is_adopted() {
        let (mut coordinator, _, _, emitted) = two_providers();

        report(
            &coordinator,
            "b",
            SessionSnapshot::for_provider("b", ConnectionState::Connected),
        );
        coordinator.pump();

        assert_eq!(coordinator.active_provider_id(), Some("b"));
        assert_eq!(
            emitted.lock()[0].0.active_provider_id.as_deref(),
            Some("b")
        );
    }

    #[test]
    fn disconnect_resets_immediately() {
        let (mut coordinator, a_calls, _, emitted) = two_providers();
        coordinator.connect("a_1");
        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Connected),
        );
        coordinator.pump();

        coordinator.disconnect();

        assert_eq!(*a_calls.disconnects.lock(), 1);
        assert_eq!(
            coordinator.current_state().connection_state,
            ConnectionState::Disconnected
        );
        assert!(coordinator.current_state().active_provider_id.is_none());
        assert!(coordinator.active_provider_id().is_none());
        assert_eq!(emitted.lock().last().unwrap().0, SessionSnapshot::default());

        // The provider's own late confirmation changes nothing.
        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Disconnected),
        );
        coordinator.pump();
        assert_eq!(emitted.lock().len(), 2);
    }

    #[test]
    fn playback_without_active_provider_is_noop() {
        let (mut coordinator, a_calls, _, emitted) = two_providers();

        coordinator.load_media(MediaDescriptor::new("https://x/a.mp4", "A"), true, 0);
        coordinator.play();
        coordinator.pump();

        assert!(a_calls.loads.lock().is_empty());
        assert_eq!(*a_calls.plays.lock(), 0);
        assert!(emitted.lock().is_empty());
        assert!(coordinator.current_media().is_none());
    }

    #[test]
    fn media_travels_with_emitted_state() {
        let (mut coordinator, a_calls, _, emitted) = two_providers();
        coordinator.connect("a_1");
        let media = MediaDescriptor::new("https://x/a.mp4", "A");

        coordinator.load_media(media.clone(), true, 0);
        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Connected)
                .with_playback(PlaybackState::Loading),
        );
        coordinator.pump();

        assert_eq!(a_calls.loads.lock().as_slice(), ["A".to_string()]);
        assert_eq!(emitted.lock().last().unwrap().1, Some(media));

        coordinator.stop();
        assert!(coordinator.current_media().is_none());
    }

    #[test]
    fn new_media_is_emitted_even_when_snapshot_is_unchanged() {
        let (mut coordinator, _, _, emitted) = two_providers();
        coordinator.connect("a_1");
        let playing = SessionSnapshot::for_provider("a", ConnectionState::Connected)
            .with_playback(PlaybackState::Playing)
            .with_progress(5000, 120_000);
        report(&coordinator, "a", playing.clone());
        coordinator.pump();
        assert_eq!(emitted.lock().len(), 1);

        let media = MediaDescriptor::new("https://x/b.mp4", "B");
        coordinator.load_media(media.clone(), true, 5000);
        report(&coordinator, "a", playing.clone());
        coordinator.pump();

        {
            let emitted = emitted.lock();
            assert_eq!(emitted.len(), 2);
            assert_eq!(emitted[1].0, playing);
            assert_eq!(emitted[1].1, Some(media));
        }

        report(&coordinator, "a", playing);
        coordinator.pump();
        assert_eq!(emitted.lock().len(), 2);
    }

    #[test]
    fn device_reports_from_inactive_provider_are_dropped() {
        let (mut coordinator, _, _, _) = two_providers();
        let devices: Arc<Mutex<Vec<Vec<Device>>>> = Arc::default();
        let sink = Arc::clone(&devices);
        coordinator.set_devices_observer(Some(Box::new(move |list: &[Device]| {
            sink.lock().push(list.to_vec());
        })));
        coordinator.connect("a_1");

        coordinator
            .dispatcher()
            .on_provider_devices_changed("b", Vec::new());
        coordinator.pump();
        assert!(devices.lock().is_empty());

        coordinator
            .dispatcher()
            .on_provider_devices_changed("a", Vec::new());
        coordinator.pump();
        let reports = devices.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].len(), 2);
    }

    #[test]
    fn show_airplay_picker_requires_airplay_provider() {
        let mut coordinator = SessionCoordinator::new();
        let (cast, cast_calls) = MockProvider::new("google_cast", &[]);
        coordinator.register_provider(Box::new(cast));
        coordinator.show_airplay_picker();
        assert_eq!(*cast_calls.pickers.lock(), 0);

        let (airplay, airplay_calls) = MockProvider::new(AIRPLAY, &[]);
        coordinator.register_provider(Box::new(airplay));
        coordinator.show_airplay_picker();
        assert_eq!(*airplay_calls.pickers.lock(), 1);
    }

    #[test]
    fn dispose_is_idempotent() {
        let (mut coordinator, a_calls, b_calls, emitted) = two_providers();
        coordinator.connect("a_1");

        coordinator.dispose();
        coordinator.dispose();

        assert_eq!(*a_calls.disposes.lock(), 1);
        assert_eq!(*b_calls.disposes.lock(), 1);
        assert!(coordinator.provider_ids().is_empty());
        assert!(coordinator.active_provider_id().is_none());

        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Connected),
        );
        coordinator.pump();
        assert!(emitted.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_gives_up_on_pending_attempt() {
        let mut coordinator = SessionCoordinator::new()
            .with_spawner(TokioSpawner::current())
            .with_connect_timeout(Some(Duration::from_secs(5)));
        let (a, a_calls) = MockProvider::new("a", &["a_1"]);
        coordinator.register_provider(Box::new(a));
        let emitted = observed(&mut coordinator);

        coordinator.connect("a_1");
        tokio::time::sleep(Duration::from_secs(6)).await;
        coordinator.pump();

        assert_eq!(*a_calls.disconnects.lock(), 1);
        assert!(coordinator.active_provider_id().is_none());
        let emitted = emitted.lock();
        let (last, _) = emitted.last().unwrap();
        assert_eq!(last.playback_state, PlaybackState::Error);
        assert_eq!(
            last.error_message.as_deref(),
            Some("Connection timed out: a_1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_cancelled_by_connected_report() {
        let mut coordinator = SessionCoordinator::new()
            .with_spawner(TokioSpawner::current())
            .with_connect_timeout(Some(Duration::from_secs(5)));
        let (a, a_calls) = MockProvider::new("a", &["a_1"]);
        coordinator.register_provider(Box::new(a));

        coordinator.connect("a_1");
        report(
            &coordinator,
            "a",
            SessionSnapshot::for_provider("a", ConnectionState::Connected),
        );
        coordinator.pump();
        tokio::time::sleep(Duration::from_secs(6)).await;
        coordinator.pump();

        assert_eq!(*a_calls.disconnects.lock(), 0);
        assert_eq!(coordinator.active_provider_id(), Some("a"));
        assert!(coordinator.current_state().is_connected());
    }
}

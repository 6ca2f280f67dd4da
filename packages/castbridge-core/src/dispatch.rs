//! The single-consumer event queue that serialises all session activity.
//!
//! Application commands, provider reports, raw backend callbacks and ticker
//! ticks are all [`Envelope`]s on one unbounded channel. Exactly one consumer
//! (the [`SessionCoordinator`](crate::coordinator::SessionCoordinator)) drains
//! it, so coordinator and provider state is only ever touched from that one
//! logical context. Backend SDK glue running on foreign threads posts through
//! a [`BackendEventSink`], which is the mandatory hop onto that context.

use tokio::sync::{mpsc, oneshot};

use crate::provider::{BackendEvent, ProviderObserver};
use crate::types::{Device, MediaDescriptor, SessionSnapshot};

/// Inbound application command, executed on the coordinator context.
#[derive(Debug)]
pub(crate) enum Command {
    StartDiscovery,
    StopDiscovery,
    DiscoveredDevices(oneshot::Sender<Vec<Device>>),
    CurrentState(oneshot::Sender<SessionSnapshot>),
    Connect(String),
    Disconnect,
    LoadMedia {
        media: MediaDescriptor,
        autoplay: bool,
        position_ms: i64,
    },
    Play,
    Pause,
    Seek(i64),
    Stop,
    SetVolume(f64),
    SetMuted(bool),
    ShowAirPlayPicker,
    Dispose(Option<oneshot::Sender<()>>),
}

/// One message in the coordinator queue.
#[derive(Debug)]
pub(crate) enum Envelope {
    Command(Command),
    ProviderState {
        provider_id: String,
        state: SessionSnapshot,
    },
    ProviderDevices {
        provider_id: String,
        devices: Vec<Device>,
    },
    Backend {
        provider_id: String,
        event: BackendEvent,
    },
    ConnectTimeout {
        attempt: u64,
    },
}

/// Receiving half of the coordinator queue.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Inbox {
    pub(crate) fn try_next(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    pub(crate) async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Sending half of the coordinator queue.
///
/// Cheap to clone and safe to use from any thread. It is the observer the
/// coordinator installs on every registered provider.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Dispatcher {
    /// Creates a new queue and returns both ends.
    #[must_use]
    pub fn channel() -> (Self, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Inbox { rx })
    }

    /// Returns a sink that tags posted backend events with `provider_id`.
    #[must_use]
    pub fn backend_sink(&self, provider_id: impl Into<String>) -> BackendEventSink {
        BackendEventSink {
            provider_id: provider_id.into(),
            dispatcher: self.clone(),
        }
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn post(&self, envelope: Envelope) -> bool {
        if let Err(e) = self.tx.send(envelope) {
            log::trace!("[Dispatcher] Queue closed, dropping {:?}", e.0);
            return false;
        }
        true
    }

    pub(crate) fn command(&self, command: Command) -> bool {
        self.post(Envelope::Command(command))
    }
}

impl ProviderObserver for Dispatcher {
    fn on_provider_state_changed(&self, provider_id: &str, state: SessionSnapshot) {
        self.post(Envelope::ProviderState {
            provider_id: provider_id.to_string(),
            state,
        });
    }

    fn on_provider_devices_changed(&self, provider_id: &str, devices: Vec<Device>) {
        self.post(Envelope::ProviderDevices {
            provider_id: provider_id.to_string(),
            devices,
        });
    }
}

/// Thread-safe handle backend glue uses to deliver native callbacks.
///
/// Every event is redispatched onto the coordinator context and routed to
/// the provider that owns this sink.
#[derive(Clone)]
pub struct BackendEventSink {
    provider_id: String,
    dispatcher: Dispatcher,
}

impl BackendEventSink {
    /// Posts a backend event for later processing on the coordinator context.
    pub fn post(&self, event: impl Into<BackendEvent>) {
        self.dispatcher.post(Envelope::Backend {
            provider_id: self.provider_id.clone(),
            event: event.into(),
        });
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

impl std::fmt::Debug for BackendEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendEventSink")
            .field("provider_id", &self.provider_id)
            .finish()
    }
}

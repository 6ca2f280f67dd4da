//! Castbridge Core - unified cast session coordination.
//!
//! This crate gives a host application one session model over several casting
//! technologies (Google Cast receivers and AirPlay routes). Each technology
//! is adapted by a provider; a single coordinator decides which provider is
//! active, forwards commands to it and emits deduplicated state.
//!
//! # Architecture
//!
//! - [`types`]: Devices, media descriptors and session snapshots
//! - [`provider`]: The provider contract and the Google Cast and AirPlay providers
//! - [`ticker`]: Position polling for backends without progress callbacks
//! - [`coordinator`]: Provider registry, arbitration and state emission
//! - [`dispatch`]: The single-consumer queue every callback goes through
//! - [`session`]: The coordinator actor and its command handle
//! - [`adapter`] and [`events`]: Delivery of state to the host
//! - [`bootstrap`]: Composition root
//! - [`sim`]: Simulated backends
//!
//! # Abstraction Traits
//!
//! - [`GoogleCastBackend`](provider::GoogleCastBackend) and
//!   [`AirPlayBackend`](provider::AirPlayBackend): vendor SDK seams
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Delivering host events

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod provider;
pub mod runtime;
pub mod session;
pub mod sim;
pub mod ticker;
pub mod types;
pub mod utils;

// Re-export commonly used types at the crate root
pub use adapter::CastBridge;
pub use bootstrap::{bootstrap_session, Backends, BootstrappedSession};
pub use config::Config;
pub use coordinator::{DevicesObserver, SessionCoordinator, StateObserver};
pub use dispatch::{BackendEventSink, Dispatcher};
pub use error::{CastError, CastResult, ErrorCode};
pub use events::{
    BroadcastEventBridge, CastSessionState, DeviceEvent, EventEmitter, HostEvent,
    LoggingEventEmitter, NoopEventEmitter, SessionEvent,
};
pub use provider::{
    BackendError, BackendEvent, BackendResult, CastConnection, CastDiscovery, CastPlayback,
    CastProvider, ProviderObserver, AIRPLAY, GOOGLE_CAST,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::CastSessionHandle;
pub use ticker::{PositionTicker, DEFAULT_POSITION_INTERVAL};
pub use types::{
    ConnectionState, Device, MediaDescriptor, MediaKind, PlaybackState, ProviderKind,
    SessionSnapshot,
};
pub use utils::now_millis;

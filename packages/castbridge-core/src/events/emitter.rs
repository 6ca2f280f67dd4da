//! Event emitter abstraction for decoupling the session from the host
//! transport.

use super::{DeviceEvent, SessionEvent};

/// Trait for emitting host events without knowledge of transport.
///
/// The adapter emits through this trait; the host decides how events reach
/// its UI (platform channel, broadcast subscribers, stdout, ...).
pub trait EventEmitter: Send + Sync {
    /// Emits a session state event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a device list event.
    fn emit_devices(&self, event: DeviceEvent);
}

/// No-op emitter for headless use or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_devices(&self, _event: DeviceEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_devices(&self, event: DeviceEvent) {
        tracing::debug!(?event, "devices_event");
    }
}

//! Coordinator-to-host adapter.
//!
//! Installs the coordinator's outward observers and relays what they see as
//! [`HostEvent`](crate::events::HostEvent)s through an [`EventEmitter`].
//! Order is preserved: observers run on the coordinator context and emit
//! synchronously.

use std::sync::Arc;

use crate::coordinator::SessionCoordinator;
use crate::events::{CastSessionState, DeviceEvent, EventEmitter, SessionEvent};
use crate::types::{Device, MediaDescriptor, SessionSnapshot};
use crate::utils::now_millis;

/// Relays coordinator output to the host.
#[derive(Clone)]
pub struct CastBridge {
    emitter: Arc<dyn EventEmitter>,
}

impl CastBridge {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self { emitter }
    }

    /// Installs this bridge as both of the coordinator's outward observers.
    pub fn attach(&self, coordinator: &mut SessionCoordinator) {
        let bridge = self.clone();
        coordinator.set_state_observer(Some(Box::new(
            move |state: &SessionSnapshot, media: Option<&MediaDescriptor>| {
                bridge.on_state_changed(state, media);
            },
        )));

        let bridge = self.clone();
        coordinator.set_devices_observer(Some(Box::new(move |devices: &[Device]| {
            bridge.on_devices_changed(devices);
        })));
    }

    pub fn on_state_changed(&self, state: &SessionSnapshot, media: Option<&MediaDescriptor>) {
        self.emitter.emit_session(SessionEvent::StateChanged {
            state: CastSessionState::from_snapshot(state, media),
            timestamp: now_millis(),
        });
    }

    pub fn on_devices_changed(&self, devices: &[Device]) {
        self.emitter.emit_devices(DeviceEvent::ListChanged {
            devices: devices.to_vec(),
            timestamp: now_millis(),
        });
    }
}

//! Session actor and its handle.
//!
//! [`CastSessionHandle::spawn`] moves a [`SessionCoordinator`] onto its own
//! task. The handle is the inbound surface for the host: commands are queued
//! in order and queries are answered over oneshot channels.

use tokio::sync::oneshot;

use crate::coordinator::SessionCoordinator;
use crate::dispatch::{Command, Dispatcher};
use crate::error::{CastError, CastResult};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::types::{Device, MediaDescriptor, SessionSnapshot};

/// Cheap, cloneable handle to a running session.
///
/// Every method except [`dispose`](Self::dispose) fails with
/// [`CastError::SessionClosed`] once the session has been disposed.
#[derive(Clone)]
pub struct CastSessionHandle {
    dispatcher: Dispatcher,
}

impl CastSessionHandle {
    /// Spawns the coordinator's event loop and returns a handle to it.
    pub fn spawn(coordinator: SessionCoordinator, spawner: &TokioSpawner) -> Self {
        let dispatcher = coordinator.dispatcher().clone();
        spawner.spawn(coordinator.run());
        Self { dispatcher }
    }

    fn send(&self, command: Command) -> CastResult<()> {
        if self.dispatcher.command(command) {
            Ok(())
        } else {
            Err(CastError::SessionClosed)
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> CastResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| CastError::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    pub fn start_discovery(&self) -> CastResult<()> {
        self.send(Command::StartDiscovery)
    }

    pub fn stop_discovery(&self) -> CastResult<()> {
        self.send(Command::StopDiscovery)
    }

    pub async fn discovered_devices(&self) -> CastResult<Vec<Device>> {
        self.request(Command::DiscoveredDevices).await
    }

    pub async fn current_state(&self) -> CastResult<SessionSnapshot> {
        self.request(Command::CurrentState).await
    }

    pub fn connect(&self, device_id: impl Into<String>) -> CastResult<()> {
        self.send(Command::Connect(device_id.into()))
    }

    pub fn disconnect(&self) -> CastResult<()> {
        self.send(Command::Disconnect)
    }

    pub fn load_media(
        &self,
        media: MediaDescriptor,
        autoplay: bool,
        position_ms: i64,
    ) -> CastResult<()> {
        self.send(Command::LoadMedia {
            media,
            autoplay,
            position_ms,
        })
    }

    pub fn play(&self) -> CastResult<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> CastResult<()> {
        self.send(Command::Pause)
    }

    pub fn seek(&self, position_ms: i64) -> CastResult<()> {
        self.send(Command::Seek(position_ms))
    }

    pub fn stop(&self) -> CastResult<()> {
        self.send(Command::Stop)
    }

    pub fn set_volume(&self, volume: f64) -> CastResult<()> {
        self.send(Command::SetVolume(volume))
    }

    pub fn set_muted(&self, muted: bool) -> CastResult<()> {
        self.send(Command::SetMuted(muted))
    }

    pub fn show_airplay_picker(&self) -> CastResult<()> {
        self.send(Command::ShowAirPlayPicker)
    }

    /// Disposes the session and waits until every provider has been torn
    /// down. Succeeds on an already closed session.
    pub async fn dispose(&self) -> CastResult<()> {
        match self.request(|ack| Command::Dispose(Some(ack))).await {
            Err(CastError::SessionClosed) => {
                log::debug!("[CastSession] Dispose on closed session");
                Ok(())
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionState;

    #[tokio::test]
    async fn queries_are_answered_by_the_actor() {
        let handle = CastSessionHandle::spawn(SessionCoordinator::new(), &TokioSpawner::current());

        handle.start_discovery().unwrap();
        assert!(handle.discovered_devices().await.unwrap().is_empty());
        let state = handle.current_state().await.unwrap();
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn commands_fail_after_dispose() {
        let handle = CastSessionHandle::spawn(SessionCoordinator::new(), &TokioSpawner::current());

        handle.dispose().await.unwrap();

        assert!(matches!(
            handle.current_state().await,
            Err(CastError::SessionClosed)
        ));
        tokio::task::yield_now().await;
        assert!(handle.is_closed());
        assert!(matches!(handle.play(), Err(CastError::SessionClosed)));
        assert!(handle.dispose().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_handles_may_both_dispose() {
        let handle = CastSessionHandle::spawn(SessionCoordinator::new(), &TokioSpawner::current());
        let other = handle.clone();

        let (first, second) = tokio::join!(handle.dispose(), other.dispose());

        assert!(first.is_ok());
        assert!(second.is_ok());
    }
}

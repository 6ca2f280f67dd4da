//! Background task spawning.
//!
//! The coordinator never awaits; the asynchronous pieces of a session are the
//! actor loop, position ticker intervals and connect-timeout timers. All of
//! them go through [`TaskSpawner`] so a host can put them on its own runtime.

use std::future::Future;

use tokio_util::sync::CancellationToken;

pub trait TaskSpawner: Send + Sync {
    /// Spawns a detached background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Spawns `future` and returns a token that aborts it at its next await
    /// point. Tickers and timers are stopped this way rather than joined.
    fn spawn_cancellable<F>(&self, future: F) -> CancellationToken
    where
        F: Future<Output = ()> + Send + 'static,
        Self: Sized,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        self.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = future => {}
            }
        });
        token
    }
}

/// Spawner backed by a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the handle of the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

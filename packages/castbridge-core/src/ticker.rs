//! Repeating position poll timer.
//!
//! Providers whose backend has no push notification for playback progress
//! start a [`PositionTicker`] while media is playing. The tick handler is
//! expected to post a `PositionTick` into the coordinator queue rather than
//! touch provider state itself.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::runtime::{TaskSpawner, TokioSpawner};

/// Default interval between position ticks.
pub const DEFAULT_POSITION_INTERVAL: Duration = Duration::from_millis(500);

/// Callback invoked on every tick.
pub type TickHandler = Arc<dyn Fn() + Send + Sync>;

/// Start/stop interval notifier.
///
/// `start` and `stop` are idempotent. Without a spawner the ticker never
/// fires, which is what unit tests of providers rely on.
pub struct PositionTicker {
    interval: Duration,
    spawner: Option<TokioSpawner>,
    handler: Arc<RwLock<Option<TickHandler>>>,
    running: Option<CancellationToken>,
}

impl PositionTicker {
    #[must_use]
    pub fn new(interval: Duration, spawner: TokioSpawner) -> Self {
        Self {
            interval,
            spawner: Some(spawner),
            handler: Arc::new(RwLock::new(None)),
            running: None,
        }
    }

    /// A ticker that tracks start/stop but never schedules anything.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            interval: DEFAULT_POSITION_INTERVAL,
            spawner: None,
            handler: Arc::new(RwLock::new(None)),
            running: None,
        }
    }

    /// Replaces the tick handler. Takes effect from the next tick, even if
    /// the ticker is already running.
    pub fn set_tick_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts ticking every interval. No-op if already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let token = match &self.spawner {
            Some(spawner) => {
                let handler = Arc::clone(&self.handler);
                let period = self.interval;
                spawner.spawn_cancellable(async move {
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        interval.tick().await;
                        let current = handler.read().clone();
                        if let Some(tick) = current {
                            tick();
                        }
                    }
                })
            }
            None => CancellationToken::new(),
        };
        self.running = Some(token);
    }

    /// Cancels the pending schedule. No-op if not running.
    pub fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }

    pub fn update_for_playback_state(&mut self, is_playing: bool) {
        if is_playing {
            self.start();
        } else {
            self.stop();
        }
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

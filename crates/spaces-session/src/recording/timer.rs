use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A once-per-tick countdown running on its own task.
///
/// `on_tick` receives the remaining count after each decrement. When the
/// count reaches zero the task runs `on_expire` to completion. Cancelling
/// stops the ticks but never interrupts a running `on_expire`.
pub struct CountdownTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn spawn<T, E>(remaining: u32, tick: Duration, on_tick: T, on_expire: E) -> Self
    where
        T: Fn(u32) + Send + 'static,
        E: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut left = remaining;
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while left > 0 {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(left, "Countdown cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        left -= 1;
                        on_tick(left);
                    }
                }
            }
            debug!("Countdown expired");
            on_expire.await;
        });
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

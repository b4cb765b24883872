use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::MissedTickBehavior;

/// Waits for a child process while running a checkpoint at a fixed interval.
pub struct Supervisor {
    interval: Duration,
}

impl Supervisor {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run until `child` exits, calling `on_checkpoint` every interval
    /// meanwhile. The first checkpoint happens one interval after the call.
    pub async fn watch<F, Fut>(
        &self,
        child: &mut Child,
        mut on_checkpoint: F,
    ) -> io::Result<ExitStatus>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                status = child.wait() => return status,
                _ = interval.tick() => on_checkpoint().await,
            }
        }
    }
}

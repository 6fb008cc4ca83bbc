//! Fixed-interval repeating task.
//!
//! The next run is armed only once the previous one has finished, so a slow
//! job delays the schedule instead of overlapping with itself.

use std::future::Future;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RepeatingTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawns `job` to run every `every`, first run one interval from now.
    pub fn spawn<F, Fut>(name: &'static str, every: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let next = OffsetDateTime::now_utc() + every;
                info!(task = name, next = %next, "scheduling next run");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(every) => {}
                }
                info!(task = name, "scheduler triggered");
                job().await;
            }
            info!(task = name, "scheduler stopped");
        });

        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops the loop; a run already in progress completes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

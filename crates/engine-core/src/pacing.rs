use std::{sync::Mutex, time::Duration};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Enforces a minimum gap between consecutive requests, independent of 429s.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits until `interval` has passed since the previous call returned.
    pub async fn wait(&self) {
        let deadline = self
            .last
            .lock()
            .ok()
            .and_then(|last| last.map(|at| at + self.interval));

        if let Some(deadline) = deadline
            && deadline > Instant::now()
        {
            debug!(
                delay_ms = (deadline - Instant::now()).as_millis() as u64,
                "Pacing next request"
            );
            sleep_until(deadline).await;
        }

        if let Ok(mut last) = self.last.lock() {
            *last = Some(Instant::now());
        }
    }
}

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces out operation starts to a fixed rate.
///
/// Callers are admitted in the order they reach the internal lock (tokio's
/// mutex is fair), each one reserving the next free start slot. Nothing is
/// dropped: excess callers simply wait, so the queue is unbounded.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_second(rate: u32) -> Self {
        Self {
            min_interval: Duration::from_secs(1) / rate.max(1),
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for a start slot, then run `operation` to completion
    pub async fn schedule<F, T>(&self, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let start_at = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };

        tokio::time::sleep_until(start_at).await;
        operation.await
    }
}

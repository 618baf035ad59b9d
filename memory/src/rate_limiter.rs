//! Token-bucket rate limiter for the embedding client (§4.3).
//!
//! One bucket per modality (text, image); callers block until a token is
//! available rather than failing, since the client's own deadline/timeout
//! wraps the whole call including the wait.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

pub struct TokenBucket {
    capacity: f64,
    tokens: Mutex<(f64, Instant)>,
    refill_per_sec: f64
}

impl TokenBucket {
    #[must_use]
    pub fn new(rate_per_sec: u32) -> Self {
        let capacity = rate_per_sec as f64;
        Self {
            capacity,
            tokens: Mutex::new((capacity, Instant::now())),
            refill_per_sec: capacity
        }
    }

    /// Blocks until a token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut guard = self.tokens.lock().unwrap_or_else(|p| p.into_inner());
                let (tokens, last) = &mut *guard;
                let elapsed = last.elapsed().as_secs_f64();
                *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
                *last = Instant::now();

                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - *tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(d) => sleep(d).await
            }
        }
    }
}

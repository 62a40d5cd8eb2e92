//! Admission control for remote calls.
//!
//! Every remote call takes a [`CallPermit`] first: one concurrency slot from
//! a semaphore and one token from a shared token bucket.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::query::{EngineResult, QueryError};

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    rate: f64, // tokens per second
    capacity: f64,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }
}

/// Token-bucket limiter shared by all tasks of a query.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// `rate` tokens per second, at most `burst` banked.
    pub fn new(rate: f64, burst: usize) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                last_update: Instant::now(),
                rate,
                capacity,
            }),
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / bucket.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Held for the duration of one remote call.
pub struct CallPermit {
    _slot: OwnedSemaphorePermit,
}

/// Concurrency and rate gate.
#[derive(Clone)]
pub struct CallGate {
    slots: Arc<Semaphore>,
    limiter: Option<Arc<RateLimiter>>,
    concurrency: usize,
}

impl CallGate {
    /// `concurrency` simultaneous calls; `rate` calls per second when set.
    pub fn new(concurrency: usize, rate: Option<(f64, usize)>) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            slots: Arc::new(Semaphore::new(concurrency)),
            limiter: rate
                .filter(|(per_second, _)| *per_second > 0.0)
                .map(|(per_second, burst)| Arc::new(RateLimiter::new(per_second, burst))),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Wait for a slot and a rate token.
    ///
    /// Fails with `Interrupted` once the gate is closed.
    pub async fn acquire(&self) -> EngineResult<CallPermit> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| QueryError::Interrupted)?;
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        Ok(CallPermit { _slot: slot })
    }

    /// Refuse all further calls. Waiters fail immediately.
    pub fn close(&self) {
        self.slots.close();
    }
}

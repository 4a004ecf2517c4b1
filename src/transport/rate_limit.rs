//! Per-host token bucket (spec §4.3), generalizing the ad hoc
//! `RateLimiter` the teacher hand-rolls per-registry
//! (`registries::crates_io::RateLimiter`) into a shared, host-keyed
//! primitive the transport applies to every source uniformly.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::observability::Clock;

struct BucketState {
    tokens: f64,
    last_refill: std::time::Instant,
}

/// One bucket per host, each independently refilling — exhausting host A
/// never delays host B (spec §8 invariant 8).
pub struct TokenBucketRegistry {
    config: RateLimitConfig,
    buckets: DashMap<String, Arc<Mutex<BucketState>>>,
    clock: Arc<dyn Clock>,
}

impl TokenBucketRegistry {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, buckets: DashMap::new(), clock }
    }

    fn bucket_for(&self, host: &str) -> Arc<Mutex<BucketState>> {
        self.buckets
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(BucketState { tokens: self.config.capacity, last_refill: self.clock.now() }))
            })
            .clone()
    }

    /// Removes one token for `host`, sleeping until one is available.
    /// Returns `Err` only if `cancelled` resolves first.
    pub async fn acquire(&self, host: &str, cancelled: impl std::future::Future<Output = ()>) -> Result<(), ()> {
        tokio::pin!(cancelled);
        let bucket = self.bucket_for(host);

        loop {
            let wait = {
                let mut state = bucket.lock().await;
                let now = self.clock.now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.config.refill_per_second).min(self.config.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.config.refill_per_second))
                }
            };

            match wait {
                None => return Ok(()),
                Some(dur) => {
                    tokio::select! {
                        _ = self.clock.sleep(dur) => continue,
                        _ = &mut cancelled => return Err(()),
                    }
                }
            }
        }
    }
}

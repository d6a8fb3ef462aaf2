//! Process-wide token bucket for outbound sends.

use quizcast_core::config::RateLimitConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shared token bucket. Every outbound call acquires one token first, so
/// concurrent group tasks contend here instead of tripping API limits.
pub struct RateLimiter {
    state: Mutex<Bucket>,
    capacity: f64,
    refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        let capacity = cfg.burst.max(1) as f64;
        let refill_per_sec = cfg.max_messages_per_minute.max(1) as f64 / 60.0;
        Self {
            state: Mutex::new(Bucket {
                tokens: capacity,
                updated: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// Take one token, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.updated).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.updated = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_pacing() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            max_messages_per_minute: 60, // one token per second
            burst: 3,
        });

        // The burst drains instantly.
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The fourth token needs a full refill interval.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn test_contention_is_serialized() {
        let limiter = std::sync::Arc::new(RateLimiter::new(&RateLimitConfig {
            max_messages_per_minute: 60,
            burst: 1,
        }));

        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // 1 burst token + 2 refills at 1/s.
        assert!(start.elapsed() >= Duration::from_millis(1990));
    }
}

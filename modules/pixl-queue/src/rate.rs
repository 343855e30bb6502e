//! Token bucket rate limiter, one per queue (§4.3).

use std::sync::Mutex;
use std::time::Instant;

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// Capacity = small constant, refill rate in tokens/second. `try_take` is
/// non-blocking; `set_rate` lets the Control API pause (`0`) or change the
/// throughput of a running queue without restarting it.
pub struct TokenBucket {
    capacity: f64,
    rate_per_sec: Mutex<f64>,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: u32, rate_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            rate_per_sec: Mutex::new(rate_per_sec),
            state: Mutex::new(State {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut State, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Take one token if available. Non-blocking.
    pub fn try_take(&self) -> bool {
        let rate = *self.rate_per_sec.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state, rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Change the refill rate of a running bucket. `r = 0` pauses it —
    /// allowed here even though the Control API rejects `r = 0` at start.
    pub fn set_rate(&self, tokens_per_sec: f64) {
        *self.rate_per_sec.lock().unwrap() = tokens_per_sec;
    }

    pub fn rate(&self) -> f64 {
        *self.rate_per_sec.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full_and_drains() {
        let bucket = TokenBucket::new(2, 0.0);
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }

    #[test]
    fn zero_rate_pauses_without_refill() {
        let bucket = TokenBucket::new(1, 0.0);
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
        bucket.set_rate(0.0);
        assert!(!bucket.try_take());
    }
}

//! Reconnection strategies
//!
//! When the transport drops, the strategy decides how long to wait before
//! the next attempt and when to give up. The bus default is exponential
//! backoff starting at 250ms, doubling to a 5s cap, with ±20% jitter.
//!
//! # Examples
//!
//! ```rust
//! use bub_client::ExponentialBackoff;
//! use std::time::Duration;
//!
//! // Bus defaults: 250ms..5s, unlimited attempts, jittered
//! let default = ExponentialBackoff::default();
//!
//! // Deterministic variant for tests
//! let fixed = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
//!     .with_max_attempts(5);
//! ```

use std::time::Duration;

/// Decides the delay before each reconnection attempt
///
/// `next_delay` is consulted once per attempt; returning `None` abandons
/// reconnection. `reset` is called after a successful connection so the
/// next disconnect starts over.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before attempt number `attempt` (0-indexed), or `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Reset accumulated state after a successful connection
    fn reset(&mut self);
}

/// Exponential backoff with optional jitter
pub struct ExponentialBackoff {
    initial: Duration,
    cap: Duration,
    max_attempts: Option<u32>,
    jitter: Option<f64>,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Backoff doubling from `initial` up to `cap`, no jitter, unlimited attempts
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap,
            max_attempts: None,
            jitter: None,
            current_attempt: 0,
        }
    }

    /// Give up after `max_attempts` attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Spread delays by ±`fraction` (e.g. 0.2 for ±20%)
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = Some(fraction.clamp(0.0, 1.0));
        self
    }
}

impl Default for ExponentialBackoff {
    /// The bus reconnect policy: 250ms initial, ×2, 5s cap, ±20% jitter
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(5)).with_jitter(0.2)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let base_ms = self.initial.as_millis() as u64;
        let doubled = base_ms.saturating_mul(2u64.saturating_pow(attempt.min(32)));
        let capped = doubled.min(self.cap.as_millis() as u64);

        let final_ms = match self.jitter {
            Some(fraction) if fraction > 0.0 => {
                use rand::Rng;
                let spread = (capped as f64 * fraction) as i64;
                let offset = rand::thread_rng().gen_range(-spread..=spread.max(1));
                (capped as i64 + offset).max(0) as u64
            }
            _ => capped,
        };

        Some(Duration::from_millis(final_ms))
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Constant delay between attempts
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Retry every `delay`
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        Some(self.delay)
    }

    fn reset(&mut self) {}
}

/// Never reconnect; the first disconnect is final
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

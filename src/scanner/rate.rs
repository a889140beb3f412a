//! Global outbound rate gate
//!
//! Every remote map request passes through one shared limiter. Waiters queue
//! on a fair mutex first, so they are let through in arrival order and no
//! request can be overtaken indefinitely.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Single shared ticker pacing outbound requests
pub struct RateGate {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    turn: Mutex<()>,
}

impl RateGate {
    /// Create a gate that lets `ticks_per_second` requests through
    ///
    /// # Errors
    ///
    /// Returns a config error if the rate is not positive and finite
    pub fn per_second(ticks_per_second: f64) -> Result<Self> {
        if !ticks_per_second.is_finite() || ticks_per_second <= 0.0 {
            return Err(Error::config(format!(
                "ticks_per_second must be positive, got {ticks_per_second}"
            )));
        }

        let period = Duration::from_secs_f64(1.0 / ticks_per_second);
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::config("ticks_per_second is too large"))?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            turn: Mutex::new(()),
        })
    }

    /// Wait for the next tick
    pub async fn wait(&self) {
        let _turn = self.turn.lock().await;
        self.limiter.until_ready().await;
    }
}

//! Send-rate ceiling for the mail transport.
//!
//! Fixed window: at most `limit` messages per `window`. A rejected caller
//! learns how long until the window rolls over.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limiter shared by every send on a transport.
#[derive(Debug)]
pub struct SendRateLimiter {
    /// Messages per window; `0` disables the limit.
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    started: Instant,
    used: u32,
}

impl SendRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// A limiter that never rejects.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::from_secs(1))
    }

    /// Takes one slot in the current window.
    ///
    /// Returns the time until the next window when the ceiling is reached.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        if self.limit == 0 {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.started);
        if elapsed >= self.window {
            state.started = now;
            state.used = 0;
        }

        if state.used >= self.limit {
            return Err(self.window.saturating_sub(now.duration_since(state.started)));
        }

        state.used += 1;
        Ok(())
    }

    /// Slots left in the current window.
    pub async fn remaining(&self) -> u32 {
        if self.limit == 0 {
            return u32::MAX;
        }
        let state = self.state.lock().await;
        if state.started.elapsed() >= self.window {
            self.limit
        } else {
            self.limit.saturating_sub(state.used)
        }
    }
}

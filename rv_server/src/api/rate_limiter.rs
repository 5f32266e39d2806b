//! Sliding-window rate limiter for device channel frames.
//!
//! A misbehaving or looping device agent can flood its persistent
//! connection; each connection gets burst and sustained limiters.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent frames
    timestamps: VecDeque<Instant>,
    /// Maximum number of frames allowed in the window
    max_frames: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(max_frames: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_frames),
            max_frames,
            window,
        }
    }

    /// Burst protection: 20 frames per second.
    pub fn burst() -> Self {
        Self::new(20, Duration::from_secs(1))
    }

    /// Sustained usage: 300 frames per minute.
    pub fn sustained() -> Self {
        Self::new(300, Duration::from_secs(60))
    }

    /// Check whether a frame should be allowed, recording it if so.
    pub fn check(&mut self) -> bool {
        let now = Instant::now();

        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.timestamps.len() >= self.max_frames {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn allows_frames_within_the_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            assert!(limiter.check(), "should allow frames within limit");
        }
        assert!(!limiter.check(), "should block the frame over the limit");
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(100));

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());

        thread::sleep(Duration::from_millis(150));
        assert!(limiter.check(), "should allow after window expires");
    }

    #[test]
    fn presets_have_expected_capacities() {
        let mut burst = RateLimiter::burst();
        for _ in 0..20 {
            assert!(burst.check());
        }
        assert!(!burst.check());
    }
}

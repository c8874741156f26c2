// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

//! Sliding window admission control.
//!
//! No more than `capacity` admissions happen in any span of `period`. Each
//! admission instant is remembered until it falls out of the trailing window.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

pub struct SlidingWindow {
    capacity: usize,
    period: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    /// A window admitting at most `capacity` (minimum of one) callers in any
    /// span of `period`.
    pub fn new(capacity: u64, period: Duration) -> Self {
        let capacity = std::cmp::max(1, capacity) as usize;

        Self {
            capacity,
            period,
            admitted: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits until an admission fits in the window and records it.
    ///
    /// Concurrent callers are admitted one at a time in the order they
    /// started waiting. Dropping the returned future before it completes
    /// leaves the window untouched.
    pub async fn acquire(&self) {
        // the lock is held across the wait so callers queue up in order
        let mut admitted = self.admitted.lock().await;

        loop {
            let now = Instant::now();
            self.evict(&mut admitted, now);

            if admitted.len() < self.capacity {
                admitted.push_back(now);
                return;
            }

            // the oldest admission is the next to leave the window
            let oldest = admitted.front().copied().unwrap_or(now);
            sleep_until(oldest + self.period).await;
        }
    }

    /// Admits immediately if the window has room, otherwise returns how long
    /// until it might.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut admitted = match self.admitted.try_lock() {
            Ok(admitted) => admitted,
            // another caller is already waiting for the next slot
            Err(_) => return Err(Duration::ZERO),
        };

        let now = Instant::now();
        self.evict(&mut admitted, now);

        if admitted.len() < self.capacity {
            admitted.push_back(now);
            return Ok(());
        }

        let oldest = admitted.front().copied().unwrap_or(now);
        Err((oldest + self.period).saturating_duration_since(now))
    }

    fn evict(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.period {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

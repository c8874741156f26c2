// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use std::time::Duration;
use tokio::time::Instant;

/// A single unit of work flowing from the generator to a dispatch worker.
///
/// A `Request` is moved through the queue and into exactly one worker at a
/// time, so it is never shared.
#[derive(Debug)]
pub struct Request {
    id: u64,
    created_at: Instant,
    retries: u32,
}

impl Request {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            retries: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_age(id: u64, age: Duration, retries: u32) -> Self {
        Self {
            id,
            created_at: Instant::now() - age,
            retries,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Time left before the request expires, `None` once it has.
    pub fn remaining(&self, ttl: Duration) -> Option<Duration> {
        ttl.checked_sub(self.created_at.elapsed())
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.remaining(ttl).is_none()
    }

    /// Prepares the request to go back on the queue: one more retry and a
    /// fresh creation time.
    pub fn requeue(&mut self) {
        self.retries += 1;
        self.created_at = Instant::now();
    }
}

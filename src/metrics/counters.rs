// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters shared by the generator and every dispatch worker.
///
/// All fields only ever increase. Readers take a [`CountersSnapshot`], which
/// may be slightly skewed across fields since each load is independent.
#[derive(Debug, Default)]
pub struct Counters {
    generated: AtomicU64,
    successful: AtomicU64,
    ignored: AtomicU64,
    total: AtomicU64,
    requeued: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    /// Requests created by the generator.
    pub generated: u64,
    /// Dispatches answered with an OK status.
    pub successful: u64,
    /// Requests dropped after exhausting their retries.
    pub ignored: u64,
    /// Dispatch attempts, whatever their outcome.
    pub total: u64,
    /// Expired requests put back on the queue.
    pub requeued: u64,
    /// Dispatches that did not end with an OK status.
    pub failed: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generated(&self) {
        self.generated.fetch_add(1, Ordering::Release);
    }

    pub fn successful(&self) {
        self.successful.fetch_add(1, Ordering::Release);
    }

    pub fn ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Release);
    }

    pub fn total(&self) {
        self.total.fetch_add(1, Ordering::Release);
    }

    pub fn requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Release);
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        // terminal outcomes are read before `generated` so a concurrent
        // reader never observes more finished requests than created ones
        let successful = self.successful.load(Ordering::Acquire);
        let ignored = self.ignored.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Acquire);
        let requeued = self.requeued.load(Ordering::Acquire);
        let generated = self.generated.load(Ordering::Acquire);

        CountersSnapshot {
            generated,
            successful,
            ignored,
            total,
            requeued,
            failed,
        }
    }
}

impl CountersSnapshot {
    /// Requests that have reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.successful + self.ignored + self.failed
    }
}

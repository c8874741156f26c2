// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;

fn headroom() -> u64 {
    10
}

fn period() -> u64 {
    1000
}

#[derive(Clone, Deserialize)]
pub struct Ratelimit {
    /// Target requests per second for each credential. Drives the generator
    /// pacing and the admission limit of each worker.
    rate: u64,
    /// Admissions allowed per period on top of `rate`.
    #[serde(default = "headroom")]
    headroom: u64,
    // milliseconds
    #[serde(default = "period")]
    period: u64,
}

impl Ratelimit {
    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn headroom(&self) -> u64 {
        self.headroom
    }

    /// Admissions each worker allows in a single period.
    pub fn capacity(&self) -> u64 {
        self.rate + self.headroom
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        nonzero(self.rate, "ratelimit.rate")?;
        nonzero(self.period, "ratelimit.period")?;
        Ok(())
    }
}

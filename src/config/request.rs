// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;

fn ttl() -> u64 {
    1000
}

fn max_retries() -> u32 {
    1
}

fn timeout() -> u64 {
    1000
}

#[derive(Clone, Deserialize)]
pub struct Request {
    /// How long a request may wait before it is requeued or dropped, in
    /// milliseconds.
    #[serde(default = "ttl")]
    ttl: u64,
    /// How many times an expired request is requeued before it is dropped.
    #[serde(default = "max_retries")]
    max_retries: u32,
    /// Deadline for a single call to the endpoint, in milliseconds.
    #[serde(default = "timeout")]
    timeout: u64,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            ttl: ttl(),
            max_retries: max_retries(),
            timeout: timeout(),
        }
    }
}

impl Request {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        nonzero(self.ttl, "request.ttl")?;
        nonzero(self.timeout, "request.timeout")?;
        Ok(())
    }
}

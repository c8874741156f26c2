// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;

fn interval() -> u64 {
    1
}

fn admin() -> String {
    "127.0.0.1:9090".into()
}

#[derive(Clone, Deserialize)]
pub struct General {
    /// The reporting interval in seconds.
    #[serde(default = "interval")]
    interval: u64,
    /// The run duration in seconds. Zero runs until the process is
    /// terminated.
    #[serde(default)]
    duration: u64,
    /// Listen address for the admin endpoint.
    #[serde(default = "admin")]
    admin: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            interval: interval(),
            duration: 0,
            admin: admin(),
        }
    }
}

impl General {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(std::cmp::max(1, self.interval))
    }

    pub fn duration(&self) -> Option<Duration> {
        NonZeroU64::new(self.duration).map(|d| Duration::from_secs(d.get()))
    }

    pub fn admin(&self) -> &str {
        &self.admin
    }
}

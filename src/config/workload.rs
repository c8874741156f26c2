// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;

#[derive(Clone, Default, Deserialize)]
pub struct Workload {
    #[serde(default)]
    // zero is treated as unlimited
    ratelimit: u64,
}

impl Workload {
    pub fn ratelimit(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.ratelimit)
    }
}

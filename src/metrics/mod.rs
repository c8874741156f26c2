// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use ahash::HashMap;
use ahash::HashMapExt;
use paste::paste;
use std::time::SystemTime;

mod counters;

pub use counters::{Counters, CountersSnapshot};

pub struct MetricsSnapshot {
    pub current: SystemTime,
    pub previous: SystemTime,
    pub counters: RegistrySnapshot,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    pub fn new() -> Self {
        let now = SystemTime::now();

        Self {
            current: now,
            previous: now,
            counters: Default::default(),
        }
    }

    pub fn update(&mut self) {
        self.previous = self.current;
        self.current = SystemTime::now();

        self.counters.update();
    }

    pub fn counter_rate(&self, name: &str) -> f64 {
        let elapsed = self
            .current
            .duration_since(self.previous)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        if elapsed == 0.0 {
            return 0.0;
        }

        self.counter_delta(name) as f64 / elapsed
    }

    pub fn counter_delta(&self, name: &str) -> u64 {
        let current = match self.counters.current.get(name) {
            Some(current) => *current,
            None => {
                return 0;
            }
        };

        let previous = self.counters.previous.get(name).copied().unwrap_or(0);

        current.wrapping_sub(previous)
    }
}

/// Point-in-time values of every counter in the `metriken` registry along
/// with the values from the previous update.
#[derive(Clone)]
pub struct RegistrySnapshot {
    pub current: HashMap<String, u64>,
    pub previous: HashMap<String, u64>,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        let mut current = HashMap::new();
        let previous = HashMap::new();

        for metric in metriken::metrics().iter() {
            let any = if let Some(any) = metric.as_any() {
                any
            } else {
                continue;
            };

            if let Some(counter) = any.downcast_ref::<metriken::Counter>() {
                current.insert(metric.name().to_string(), counter.value());
            }
        }

        Self { current, previous }
    }

    pub fn update(&mut self) {
        for metric in metriken::metrics().iter() {
            let any = if let Some(any) = metric.as_any() {
                any
            } else {
                continue;
            };

            if let Some(counter) = any.downcast_ref::<metriken::Counter>() {
                if let Some(old_value) = self
                    .current
                    .insert(metric.name().to_string(), counter.value())
                {
                    self.previous.insert(metric.name().to_string(), old_value);
                }
            }
        }
    }
}

#[macro_export]
#[rustfmt::skip]
macro_rules! counter {
    ($ident:ident, $name:tt) => {
        #[metriken::metric(
            name = $name,
            crate = metriken
        )]
        pub static $ident: metriken::Counter = metriken::Counter::new();
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _COUNTER>]: &'static str = $name;
        }
    };
    ($ident:ident, $name:tt, $description:tt) => {
        #[metriken::metric(
            name = $name,
            description = $description,
            crate = metriken
        )]
        pub static $ident: metriken::Counter = metriken::Counter::new();
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _COUNTER>]: &'static str = $name;
        }
    };
}

#[macro_export]
#[rustfmt::skip]
macro_rules! gauge {
    ($ident:ident, $name:tt) => {
        #[metriken::metric(
            name = $name,
            crate = metriken
        )]
        pub static $ident: metriken::Gauge = metriken::Gauge::new();
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _GAUGE>]: &'static str = $name;
        }
    };
    ($ident:ident, $name:tt, $description:tt) => {
        #[metriken::metric(
            name = $name,
            description = $description,
            crate = metriken
        )]
        pub static $ident: metriken::Gauge = metriken::Gauge::new();
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _GAUGE>]: &'static str = $name;
        }
    };
}

counter!(REQUEST, "request/total", "dispatch attempts sent to the endpoint");
counter!(REQUEST_REQUEUE, "request/requeue", "expired requests returned to the queue");
counter!(
    REQUEST_EXPIRED,
    "request/expired",
    "requests dropped after exhausting their retries"
);
counter!(
    REQUEST_EXPIRED_RATELIMIT,
    "request/expired/ratelimit",
    "requests dropped after expiring while waiting for admission"
);

counter!(RESPONSE_OK, "response/ok");
counter!(
    RESPONSE_REJECTED,
    "response/rejected",
    "responses with a status other than OK"
);
counter!(RESPONSE_EX, "response/exception");
counter!(RESPONSE_TIMEOUT, "response/timeout");

counter!(CONNECT, "connect/total");
counter!(CONNECT_EX, "connect/exception");

gauge!(CONNECT_CURR, "connect/curr");
gauge!(QUEUE_DEPTH, "queue/depth", "requests waiting for a worker");

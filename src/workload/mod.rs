// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use crate::config::Config;
use crate::metrics::Counters;
use crate::RUNNING;
use core::num::NonZeroU64;
use core::sync::atomic::Ordering;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro512PlusPlus;
use ratelimit::Ratelimiter;
use ringlog::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::time::sleep;

mod queue;
mod request;

pub use queue::{Queue, RequestQueue};
pub use request::Request;

pub fn launch_workload(generator: Generator) -> std::io::Result<Runtime> {
    debug!("Launching workload...");

    // the generator gets its own runtime so pacing is not disturbed by the
    // dispatch workers
    let workload_rt = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .build()?;

    // use a prng seeded from the entropy pool so that the pacing is
    // unpredictable between runs
    let rng = Xoshiro512PlusPlus::from_os_rng();

    workload_rt.spawn(generator.run(rng));

    Ok(workload_rt)
}

/// The single producer of requests.
pub struct Generator {
    next_id: u64,
    queue: RequestQueue,
    counters: Arc<Counters>,
    max_pause: Duration,
    ratelimiter: Option<Arc<Ratelimiter>>,
}

impl Generator {
    pub fn new(
        config: &Config,
        queue: RequestQueue,
        counters: Arc<Counters>,
    ) -> Result<Self, ratelimit::Error> {
        let ratelimiter = match config.workload().ratelimit() {
            Some(rate) => Some(Arc::new(ratelimiter(rate)?)),
            None => None,
        };

        Ok(Self {
            next_id: 0,
            queue,
            counters,
            max_pause: config.generator_max_sleep(),
            ratelimiter,
        })
    }

    pub fn ratelimiter(&self) -> Option<Arc<Ratelimiter>> {
        self.ratelimiter.clone()
    }

    /// Creates the next request and places it on the queue.
    pub fn generate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.counters.generated();
        self.queue.enqueue(Request::new(id));

        id
    }

    /// A pause drawn uniformly from `[0, max_pause)`.
    fn pause<R: Rng>(&self, rng: &mut R) -> Duration {
        self.max_pause.mul_f64(rng.random::<f64>())
    }

    pub async fn run<R: Rng>(mut self, mut rng: R) {
        debug!(
            "generating requests with pauses of up to {} us",
            self.max_pause.as_micros()
        );

        while RUNNING.load(Ordering::Relaxed) {
            if let Some(ref ratelimiter) = self.ratelimiter {
                if let Err(delay) = ratelimiter.try_wait() {
                    sleep(delay).await;
                    continue;
                }
            }

            self.generate();

            let pause = self.pause(&mut rng);
            sleep(pause).await;
        }
    }
}

/// Token bucket for the optional global generation cap.
fn ratelimiter(rate: NonZeroU64) -> Result<Ratelimiter, ratelimit::Error> {
    let rate = rate.get();

    // timer granularity is coarse, so high rates refill in batches
    let amount = (rate as f64 / 1_000_000.0).ceil() as u64;
    let interval = Duration::from_micros(1_000_000 / (rate / amount));
    let capacity = std::cmp::max(100, amount);

    Ratelimiter::builder(amount, interval)
        .max_tokens(capacity)
        .initial_available(0)
        .build()
}

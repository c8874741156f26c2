// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;
use crate::metrics::*;
use crate::workload::Request;
use crate::RUNNING;
use core::sync::atomic::Ordering;
use ringlog::{error, info, warn};
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Lifetime and retry limits applied to every request a worker handles.
#[derive(Clone, Copy, Debug)]
pub struct Policy {
    pub ttl: Duration,
    pub max_retries: u32,
    /// Deadline for a single call to the endpoint.
    pub timeout: Duration,
}

impl From<&Config> for Policy {
    fn from(config: &Config) -> Self {
        Self {
            ttl: config.request().ttl(),
            max_retries: config.request().max_retries(),
            timeout: config.request().timeout(),
        }
    }
}

/// Where a request was when its ttl ran out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// Found expired when taken from the queue.
    Queued,
    /// Expired while waiting for admission.
    Admission,
}

/// What became of one request handled by a worker.
#[derive(Debug)]
pub enum Outcome {
    /// Expired and put back on the queue.
    Requeued { retries: u32 },
    /// Expired with no retries left and dropped.
    Ignored(Expiry),
    /// Sent and answered with an OK status.
    Delivered,
    /// Sent and answered with some other status.
    Rejected(Response),
    /// Sent but no response was received.
    Failed(TransportError),
}

/// A consumer bound to one credential. It owns its transport session and its
/// admission window, and handles one request at a time.
pub struct Worker<T> {
    id: usize,
    credential: Arc<str>,
    transport: T,
    limiter: SlidingWindow,
    policy: Policy,
    queue: RequestQueue,
    counters: Arc<Counters>,
}

impl<T: Transport> Worker<T> {
    pub fn new(
        id: usize,
        credential: Arc<str>,
        transport: T,
        limiter: SlidingWindow,
        policy: Policy,
        queue: RequestQueue,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            id,
            credential,
            transport,
            limiter,
            policy,
            queue,
            counters,
        }
    }

    pub async fn run(mut self) {
        debug!(
            "worker {} admitting {} per {:?}",
            self.id,
            self.limiter.capacity(),
            self.limiter.period()
        );

        while RUNNING.load(Ordering::Relaxed) {
            let request = match self.queue.dequeue().await {
                Some(request) => request,
                None => {
                    error!("worker {}: queue closed", self.id);
                    break;
                }
            };

            self.process(request).await;
        }
    }

    /// Takes a request from the head of the queue to a terminal state, or
    /// back onto the queue.
    pub async fn process(&mut self, request: Request) -> Outcome {
        if request.is_expired(self.policy.ttl) {
            return self.expire(request, Expiry::Queued);
        }

        self.limiter.acquire().await;

        // the wait for admission may have outlasted the ttl, the slot is
        // spent either way
        if request.is_expired(self.policy.ttl) {
            return self.expire(request, Expiry::Admission);
        }

        self.dispatch(request).await
    }

    fn expire(&self, mut request: Request, expiry: Expiry) -> Outcome {
        if request.retries() < self.policy.max_retries {
            request.requeue();
            let retries = request.retries();

            warn!(
                "request {} expired. requeueing attempt {}",
                request.id(),
                retries
            );

            REQUEST_REQUEUE.increment();
            self.counters.requeued();
            self.queue.enqueue(request);

            return Outcome::Requeued { retries };
        }

        match expiry {
            Expiry::Queued => {
                error!(
                    "request {} failed permanently after {} retries",
                    request.id(),
                    request.retries()
                );
            }
            Expiry::Admission => {
                REQUEST_EXPIRED_RATELIMIT.increment();
                warn!(
                    "ignoring request {} in ratelimiter due to ttl",
                    request.id()
                );
            }
        }

        REQUEST_EXPIRED.increment();
        self.counters.ignored();

        Outcome::Ignored(expiry)
    }

    async fn dispatch(&mut self, request: Request) -> Outcome {
        let call = Call {
            credential: self.credential.clone(),
            nonce: timestamp_ms(),
            req_id: request.id(),
        };

        REQUEST.increment();
        self.counters.total();

        let start = Instant::now();
        let response = timeout(self.policy.timeout, self.transport.send(&call)).await;
        let latency = start.elapsed();

        match response {
            Ok(Ok(response)) if response.is_ok() => {
                RESPONSE_OK.increment();
                self.counters.successful();
                info!(
                    "worker {} request {}: status {} resp {:?} in {} ms",
                    self.id,
                    call.req_id,
                    response.code,
                    response.status,
                    latency.as_millis()
                );
                Outcome::Delivered
            }
            Ok(Ok(response)) => {
                RESPONSE_REJECTED.increment();
                self.counters.failed();
                warn!(
                    "worker {} request {}: status {} resp {:?}",
                    self.id, call.req_id, response.code, response.status
                );
                Outcome::Rejected(response)
            }
            Ok(Err(e)) => {
                RESPONSE_EX.increment();
                self.counters.failed();
                warn!("worker {} request {}: {e}", self.id, call.req_id);
                Outcome::Failed(e)
            }
            Err(_) => {
                RESPONSE_TIMEOUT.increment();
                self.counters.failed();
                warn!(
                    "worker {} request {}: no response within {} ms",
                    self.id,
                    call.req_id,
                    self.policy.timeout.as_millis()
                );
                Outcome::Failed(TransportError::Timeout)
            }
        }
    }
}

fn timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::{Behavior, ScriptedTransport, Sent};
    use crate::workload::Generator;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro512PlusPlus;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::sleep;

    const TTL: Duration = Duration::from_millis(1000);

    fn policy(max_retries: u32) -> Policy {
        Policy {
            ttl: TTL,
            max_retries,
            timeout: Duration::from_millis(1000),
        }
    }

    struct Harness {
        queue: RequestQueue,
        counters: Arc<Counters>,
        sent: Arc<Mutex<Vec<Sent>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                queue: RequestQueue::new(),
                counters: Arc::new(Counters::new()),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn worker(
            &self,
            id: usize,
            behavior: Behavior,
            capacity: u64,
            policy: Policy,
        ) -> Worker<ScriptedTransport> {
            Worker::new(
                id,
                format!("KEY{id}").into(),
                ScriptedTransport::new(id, behavior, self.sent.clone()),
                SlidingWindow::new(capacity, Duration::from_secs(1)),
                policy,
                self.queue.clone(),
                self.counters.clone(),
            )
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        /// Enqueues `count` fresh requests the way the generator would.
        fn fill(&self, count: u64) {
            for id in 0..count {
                self.counters.generated();
                self.queue.enqueue(Request::new(id));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_request_is_delivered() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Ok, 30, policy(1));

        let outcome = worker.process(Request::new(9)).await;
        assert!(matches!(outcome, Outcome::Delivered));

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].call.req_id, 9);
        assert_eq!(&*sent[0].call.credential, "KEY0");

        let counters = harness.counters.snapshot();
        assert_eq!(counters.successful, 1);
        assert_eq!(counters.total, 1);
        assert_eq!(counters.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_request_is_requeued_then_sent() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Ok, 30, policy(1));

        let stale = Request::with_age(1, Duration::from_millis(1500), 0);
        let outcome = worker.process(stale).await;
        assert!(matches!(outcome, Outcome::Requeued { retries: 1 }));
        assert!(harness.sent().is_empty());

        let requeued = harness.queue.dequeue().await.unwrap();
        assert_eq!(requeued.id(), 1);
        assert_eq!(requeued.retries(), 1);
        assert_eq!(requeued.created_at(), Instant::now());

        let outcome = worker.process(requeued).await;
        assert!(matches!(outcome, Outcome::Delivered));

        let counters = harness.counters.snapshot();
        assert_eq!(counters.requeued, 1);
        assert_eq!(counters.ignored, 0);
        assert_eq!(counters.successful, 1);
        assert_eq!(harness.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_without_retries_is_ignored() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Ok, 30, policy(0));

        let stale = Request::with_age(1, Duration::from_millis(1500), 0);
        let outcome = worker.process(stale).await;
        assert!(matches!(outcome, Outcome::Ignored(Expiry::Queued)));

        let counters = harness.counters.snapshot();
        assert_eq!(counters.ignored, 1);
        assert_eq!(counters.requeued, 0);
        assert_eq!(counters.total, 0);
        assert!(harness.queue.is_empty());
        assert!(harness.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_request_is_never_sent() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Ok, 30, policy(3));

        let stale = Request::with_age(1, TTL * 2, 3);
        let outcome = worker.process(stale).await;
        assert!(matches!(outcome, Outcome::Ignored(Expiry::Queued)));

        assert_eq!(harness.counters.snapshot().ignored, 1);
        assert!(harness.queue.is_empty());
        assert!(harness.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_while_waiting_for_admission() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Ok, 1, policy(1));

        // fill the window so the next admission waits a full second
        worker.limiter.acquire().await;

        let outcome = worker.process(Request::new(1)).await;
        assert!(matches!(outcome, Outcome::Requeued { retries: 1 }));

        // the slot taken by the expired request is not given back
        assert!(worker.limiter.try_acquire().is_err());

        let requeued = harness.queue.dequeue().await.unwrap();
        let outcome = worker.process(requeued).await;
        assert!(matches!(outcome, Outcome::Ignored(Expiry::Admission)));

        let counters = harness.counters.snapshot();
        assert_eq!(counters.requeued, 1);
        assert_eq!(counters.ignored, 1);
        assert_eq!(counters.total, 0);
        assert!(harness.queue.is_empty());
        assert!(harness.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_response_is_not_retried() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Status(429, "ERROR"), 30, policy(1));

        match worker.process(Request::new(1)).await {
            Outcome::Rejected(response) => {
                assert_eq!(response.code, 429);
                assert_eq!(response.status, "ERROR");
            }
            outcome => panic!("unexpected outcome: {outcome:?}"),
        }

        let counters = harness.counters.snapshot();
        assert_eq!(counters.successful, 0);
        assert_eq!(counters.ignored, 0);
        assert_eq!(counters.requeued, 0);
        assert_eq!(counters.failed, 1);
        assert!(harness.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_not_retried() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Error, 30, policy(1));

        let outcome = worker.process(Request::new(1)).await;
        assert!(matches!(
            outcome,
            Outcome::Failed(TransportError::Connect(_))
        ));

        let counters = harness.counters.snapshot();
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.ignored, 0);
        assert!(harness.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_hits_deadline() {
        let harness = Harness::new();
        let mut worker = harness.worker(0, Behavior::Delay(Duration::from_secs(5)), 30, policy(1));

        let start = Instant::now();
        let outcome = worker.process(Request::new(1)).await;
        assert!(matches!(outcome, Outcome::Failed(TransportError::Timeout)));
        assert_eq!(start.elapsed(), Duration::from_millis(1000));

        let counters = harness.counters.snapshot();
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.successful, 0);
        assert!(harness.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn single_worker_respects_window() {
        let harness = Harness::new();
        let long_lived = Policy {
            ttl: Duration::from_secs(60),
            ..policy(1)
        };
        let worker = harness.worker(0, Behavior::Ok, 5, long_lived);
        harness.fill(30);

        let handle = tokio::spawn(worker.run());
        sleep(Duration::from_millis(3500)).await;
        handle.abort();

        let sent: Vec<Instant> = harness.sent().iter().map(|s| s.at).collect();
        // admissions at 0s, 1s, 2s and 3s
        assert_eq!(sent.len(), 20);
        for (i, start) in sent.iter().enumerate() {
            if let Some(end) = sent.get(i + 5) {
                assert!(end.duration_since(*start) >= Duration::from_secs(1));
            }
        }

        // one more is held by the worker, waiting for admission
        assert_eq!(harness.queue.len(), 9);
        assert_eq!(harness.counters.snapshot().ignored, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn workers_share_load_under_aggregate_ceiling() {
        let harness = Harness::new();
        let long_lived = Policy {
            ttl: Duration::from_secs(60),
            ..policy(1)
        };
        let handles: Vec<_> = (0..5)
            .map(|id| tokio::spawn(harness.worker(id, Behavior::Ok, 30, long_lived).run()))
            .collect();

        harness.fill(1000);
        sleep(Duration::from_millis(2500)).await;
        for handle in &handles {
            handle.abort();
        }

        let sent = harness.sent();

        // 30 per second from each of 5 workers, in windows at 0s, 1s and 2s
        assert_eq!(sent.len(), 450);

        let mut per_worker: HashMap<usize, Vec<Instant>> = HashMap::new();
        for s in &sent {
            per_worker.entry(s.worker).or_default().push(s.at);
        }
        assert_eq!(per_worker.len(), 5);
        for times in per_worker.values() {
            for (i, start) in times.iter().enumerate() {
                if let Some(end) = times.get(i + 30) {
                    assert!(end.duration_since(*start) >= Duration::from_secs(1));
                }
            }
        }

        let mut all: Vec<Instant> = sent.iter().map(|s| s.at).collect();
        all.sort();
        for (i, start) in all.iter().enumerate() {
            if let Some(end) = all.get(i + 150) {
                assert!(end.duration_since(*start) >= Duration::from_secs(1));
            }
        }

        // each worker holds one more, the rest is still queued
        assert_eq!(harness.queue.len(), 545);
        let counters = harness.counters.snapshot();
        assert_eq!(counters.ignored, 0);
        assert_eq!(counters.successful, 450);
    }

    #[tokio::test(start_paused = true)]
    async fn counters_balance_at_quiescence() {
        let harness = Harness::new();
        let handles: Vec<_> = (0..3)
            .map(|id| {
                let behavior = if id == 2 {
                    Behavior::Status(500, "ERROR")
                } else {
                    Behavior::Delay(Duration::from_millis(100))
                };
                tokio::spawn(harness.worker(id, behavior, 2, policy(1)).run())
            })
            .collect();

        harness.fill(20);

        // well past the point where every request is sent or has expired twice
        sleep(Duration::from_secs(10)).await;

        let counters = harness.counters.snapshot();
        assert!(harness.queue.is_empty());
        assert_eq!(counters.generated, 20);
        assert_eq!(counters.generated, counters.finished());
        assert!(counters.requeued > 0);
        assert!(counters.ignored > 0);
        assert_eq!(counters.total, counters.successful + counters.failed);

        // each request reaches the endpoint at most once
        let mut dispatches: HashMap<u64, usize> = HashMap::new();
        for s in harness.sent() {
            *dispatches.entry(s.call.req_id).or_default() += 1;
        }
        assert!(dispatches.values().all(|count| *count == 1));
        assert_eq!(dispatches.len() as u64, counters.total);

        for handle in handles {
            assert!(!handle.is_finished());
            handle.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_that_never_succeeds() {
        let harness = Harness::new();
        let config = crate::config::test_config(2);
        let generator =
            Generator::new(&config, harness.queue.clone(), harness.counters.clone()).unwrap();
        let rng = Xoshiro512PlusPlus::seed_from_u64(0);

        let mut handles = vec![tokio::spawn(generator.run(rng))];
        for id in 0..2 {
            let worker = harness.worker(id, Behavior::Status(200, "ERROR"), 30, policy(1));
            handles.push(tokio::spawn(worker.run()));
        }

        sleep(Duration::from_secs(2)).await;
        let first = harness.counters.snapshot();
        sleep(Duration::from_secs(3)).await;
        let second = harness.counters.snapshot();

        assert_eq!(second.successful, 0);
        assert!(second.generated > first.generated);
        assert!(second.total > first.total);
        assert_eq!(second.failed, second.total);
        assert!(second.generated >= second.successful + second.ignored);

        for handle in handles {
            assert!(!handle.is_finished());
            handle.abort();
        }
    }
}

// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use crate::*;
use chrono::{Timelike, Utc};
use tokio::time::{timeout, Instant};

#[macro_export]
macro_rules! output {
    () => {
        let now = chrono::Utc::now();
        println!("{}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
    };
    ($($arg:tt)*) => {{
        let now = chrono::Utc::now();
        println!("{} {}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false), format_args!($($arg)*));
    }};
}

/// Per-second averages of the lifecycle counters since the start of the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Averages {
    pub successful: f64,
    pub generated: f64,
    pub ignored: f64,
}

impl Averages {
    pub fn new(counters: &CountersSnapshot, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();

        if secs == 0.0 {
            return Self {
                successful: 0.0,
                generated: 0.0,
                ignored: 0.0,
            };
        }

        Self {
            successful: counters.successful as f64 / secs,
            generated: counters.generated as f64 / secs,
            ignored: counters.ignored as f64 / secs,
        }
    }
}

/// Periodically reports progress until the run duration, if any, has passed.
/// Ending the run clears `RUNNING` for every other task.
pub async fn log(config: Config, counters: Arc<Counters>, queue: RequestQueue) {
    WAIT.fetch_add(1, Ordering::Relaxed);

    let mut window_id = 0;
    let mut snapshot = MetricsSnapshot::default();

    let begin = Instant::now();
    let interval_duration = config.general().interval();

    // get an aligned start time
    let start = Instant::now() - Duration::from_nanos(Utc::now().nanosecond() as u64)
        + interval_duration;

    let stop = config.general().duration().map(|d| begin + d);

    let mut interval = tokio::time::interval_at(start, interval_duration);

    while RUNNING.load(Ordering::Relaxed)
        && stop.map_or(true, |stop| Instant::now() + interval_duration <= stop)
    {
        // use a timeout here so we always check RUNNING at least once a second
        if timeout(Duration::from_secs(1), interval.tick())
            .await
            .is_err()
        {
            continue;
        }

        snapshot.update();
        QUEUE_DEPTH.set(queue.len() as i64);

        output!("-----");
        output!("Window: {}", window_id);

        lifecycle_stats(&counters.snapshot(), begin.elapsed(), queue.len());
        client_stats(&snapshot);

        window_id += 1;
    }

    RUNNING.store(false, Ordering::Relaxed);
    WAIT.fetch_sub(1, Ordering::Relaxed);
}

/// Outputs averages and totals of the request lifecycle since the start
fn lifecycle_stats(counters: &CountersSnapshot, elapsed: Duration, depth: usize) {
    let averages = Averages::new(counters, elapsed);

    output!(
        "Requests (/s): Successful: {:.2} Generated: {:.2} Ignored: {:.2}",
        averages.successful,
        averages.generated,
        averages.ignored,
    );
    output!(
        "Requests: Generated: {} Successful: {} Failed: {} Ignored: {} Requeued: {} Total: {}",
        counters.generated,
        counters.successful,
        counters.failed,
        counters.ignored,
        counters.requeued,
        counters.total,
    );
    output!("Queue: Depth: {}", depth);
}

/// Outputs connection and response rates for the last window
fn client_stats(snapshot: &MetricsSnapshot) {
    let connect_ex = snapshot.counter_rate(CONNECT_EX_COUNTER);
    let connect_total = snapshot.counter_rate(CONNECT_COUNTER);

    let request_total = snapshot.counter_rate(REQUEST_COUNTER);
    let request_requeue = snapshot.counter_rate(REQUEST_REQUEUE_COUNTER);
    let request_expired = snapshot.counter_rate(REQUEST_EXPIRED_COUNTER);

    let response_ok = snapshot.counter_rate(RESPONSE_OK_COUNTER);
    let response_rejected = snapshot.counter_rate(RESPONSE_REJECTED_COUNTER);
    let response_ex = snapshot.counter_rate(RESPONSE_EX_COUNTER);
    let response_timeout = snapshot.counter_rate(RESPONSE_TIMEOUT_COUNTER);

    output!(
        "Client Connection: Open: {} Rates (/s): Attempt: {:.2} Errors: {:.2}",
        CONNECT_CURR.value(),
        connect_total,
        connect_ex,
    );
    output!(
        "Client Request Rate (/s): Sent: {:.2} Requeued: {:.2} Expired: {:.2}",
        request_total,
        request_requeue,
        request_expired,
    );

    let response_total = response_ok + response_rejected + response_ex + response_timeout;

    output!(
        "Client Response: Success: {:.2} % Timeout: {:.2} %",
        percent(response_ok, response_total),
        percent(response_timeout, response_total),
    );
    output!(
        "Client Response Rate (/s): Ok: {:.2} Rejected: {:.2} Error: {:.2} Timeout: {:.2}",
        response_ok,
        response_rejected,
        response_ex,
        response_timeout,
    );
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        100.0 * part / whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_since_start() {
        let counters = CountersSnapshot {
            generated: 300,
            successful: 240,
            ignored: 30,
            total: 250,
            requeued: 45,
            failed: 10,
        };

        let averages = Averages::new(&counters, Duration::from_secs(10));
        assert_eq!(averages.generated, 30.0);
        assert_eq!(averages.successful, 24.0);
        assert_eq!(averages.ignored, 3.0);
    }

    #[test]
    fn averages_at_start() {
        let averages = Averages::new(&CountersSnapshot::default(), Duration::ZERO);
        assert_eq!(averages.generated, 0.0);
        assert_eq!(averages.successful, 0.0);
        assert_eq!(averages.ignored, 0.0);
    }

    #[test]
    fn percent_of_nothing() {
        assert_eq!(percent(0.0, 0.0), 0.0);
        assert_eq!(percent(1.0, 4.0), 25.0);
    }
}

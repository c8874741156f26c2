// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use crate::*;
use metriken::{Counter, Gauge};
use std::net::ToSocketAddrs;
use warp::Filter;

/// The HTTP admin server.
pub async fn http(config: Config, counters: Arc<Counters>) {
    let admin = filters::admin(counters);

    let addr = match config.general().admin().to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            error!("bad admin listen address: {e}");
            return;
        }
    };

    let Some(addr) = addr else {
        error!(
            "couldn't determine admin listen address from: {}",
            config.general().admin()
        );
        return;
    };

    match warp::serve(admin).try_bind_ephemeral(addr) {
        Ok((addr, server)) => {
            debug!("admin listening on: {addr}");
            server.await;
        }
        Err(e) => {
            error!("failed to start admin server on {addr}: {e}");
        }
    }
}

mod filters {
    use super::*;

    /// The combined set of admin endpoint filters
    pub fn admin(
        counters: Arc<Counters>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        prometheus_stats()
            .or(human_stats())
            .or(json_stats())
            .or(lifecycle_stats(counters))
    }

    /// Serves Prometheus / OpenMetrics text format metrics.
    ///
    /// GET /metrics
    pub fn prometheus_stats(
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        warp::path!("metrics")
            .and(warp::get())
            .and_then(handlers::prometheus_stats)
    }

    /// Serves a human readable metrics output.
    ///
    /// GET /vars
    pub fn human_stats(
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        warp::path!("vars")
            .and(warp::get())
            .and_then(handlers::human_stats)
    }

    /// Serves JSON metrics output that is compatible with Twitter Server /
    /// Finagle metrics endpoints.
    ///
    /// GET /metrics.json
    /// GET /vars.json
    pub fn json_stats(
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        warp::path!("metrics.json")
            .and(warp::get())
            .and_then(handlers::json_stats)
            .or(warp::path!("vars.json")
                .and(warp::get())
                .and_then(handlers::json_stats))
    }

    /// Serves the request lifecycle counters.
    ///
    /// GET /counters.json
    pub fn lifecycle_stats(
        counters: Arc<Counters>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        warp::path!("counters.json")
            .and(warp::get())
            .and(with_counters(counters))
            .and_then(handlers::lifecycle_stats)
    }

    fn with_counters(
        counters: Arc<Counters>,
    ) -> impl Filter<Extract = (Arc<Counters>,), Error = std::convert::Infallible> + Clone {
        warp::any().map(move || counters.clone())
    }
}

/// An enum to wrap metric readings for various metric types.
pub enum Metric<'a> {
    Counter(&'a str, Option<&'a str>, u64),
    Gauge(&'a str, Option<&'a str>, i64),
}

impl<'a> Metric<'a> {
    /// Returns the name of the metric.
    pub fn name(&self) -> &'a str {
        match self {
            Self::Counter(name, _description, _value) => name,
            Self::Gauge(name, _description, _value) => name,
        }
    }
}

impl<'a> TryFrom<&'a metriken::MetricEntry> for Metric<'a> {
    type Error = ();

    fn try_from(metric: &'a metriken::MetricEntry) -> Result<Self, ()> {
        let any = match metric.as_any() {
            Some(any) => any,
            None => {
                return Err(());
            }
        };

        if let Some(counter) = any.downcast_ref::<Counter>() {
            Ok(Metric::Counter(
                metric.name(),
                metric.description(),
                counter.value(),
            ))
        } else if let Some(gauge) = any.downcast_ref::<Gauge>() {
            Ok(Metric::Gauge(
                metric.name(),
                metric.description(),
                gauge.value(),
            ))
        } else {
            Err(())
        }
    }
}

mod handlers {
    use super::*;
    use core::convert::Infallible;

    /// Serves Prometheus / OpenMetrics text format metrics. All metrics have
    /// type information, some have descriptions as well.
    ///
    /// See: https://github.com/OpenObservability/OpenMetrics/blob/main/specification/OpenMetrics.md
    ///
    /// ```text
    /// # TYPE some_counter counter
    /// # HELP some_counter An unsigned 64bit monotonic counter.
    /// counter 0
    /// # TYPE some_gauge gauge
    /// # HELP some_gauge A signed 64bit gauge.
    /// some_gauge 0
    /// ```
    pub async fn prometheus_stats() -> Result<impl warp::Reply, Infallible> {
        let mut data = Vec::new();

        for metric in metriken::metrics()
            .iter()
            .map(Metric::try_from)
            .filter_map(|m| m.ok())
        {
            if metric.name().starts_with("log_") {
                continue;
            }

            match metric {
                Metric::Counter(name, description, value) => {
                    if let Some(description) = description {
                        data.push(format!(
                            "# TYPE {name} counter\n# HELP {name} {description}\n{name} {value}"
                        ));
                    } else {
                        data.push(format!("# TYPE {name} counter\n{name} {value}"));
                    }
                }
                Metric::Gauge(name, description, value) => {
                    if let Some(description) = description {
                        data.push(format!(
                            "# TYPE {name} gauge\n# HELP {name} {description}\n{name} {value}"
                        ));
                    } else {
                        data.push(format!("# TYPE {name} gauge\n{name} {value}"));
                    }
                }
            }
        }

        data.sort();
        let mut content = data.join("\n");
        content += "\n";
        let parts: Vec<&str> = content.split('/').collect();
        Ok(parts.join("_"))
    }

    /// Serves JSON formatted metrics following the conventions of Finagle /
    /// TwitterServer.
    ///
    /// ```text
    /// {"request/total": 0,"response/ok": 0, ... }
    /// ```
    pub async fn json_stats() -> Result<impl warp::Reply, Infallible> {
        let mut data = Vec::new();

        for metric in metriken::metrics()
            .iter()
            .map(Metric::try_from)
            .filter_map(|m| m.ok())
        {
            if metric.name().starts_with("log_") {
                continue;
            }

            match metric {
                Metric::Counter(name, _description, value) => {
                    data.push(format!("\"{name}\": {value}"));
                }
                Metric::Gauge(name, _description, value) => {
                    data.push(format!("\"{name}\": {value}"));
                }
            }
        }

        data.sort();
        let mut content = "{".to_string();
        content += &data.join(",");
        content += "}";

        Ok(content)
    }

    /// Serves human readable stats. One metric per line with a `LF` as the
    /// newline character (Unix-style).
    ///
    /// ```text
    /// request/total: 0
    /// response/ok: 0
    /// ```
    pub async fn human_stats() -> Result<impl warp::Reply, Infallible> {
        let mut data = Vec::new();

        for metric in metriken::metrics()
            .iter()
            .map(Metric::try_from)
            .filter_map(|m| m.ok())
        {
            if metric.name().starts_with("log_") {
                continue;
            }

            match metric {
                Metric::Counter(name, _description, value) => {
                    data.push(format!("{name}: {value}"));
                }
                Metric::Gauge(name, _description, value) => {
                    data.push(format!("{name}: {value}"));
                }
            }
        }

        data.sort();
        let mut content = data.join("\n");
        content += "\n";
        Ok(content)
    }

    pub async fn lifecycle_stats(counters: Arc<Counters>) -> Result<impl warp::Reply, Infallible> {
        Ok(warp::reply::json(&counters.snapshot()))
    }
}

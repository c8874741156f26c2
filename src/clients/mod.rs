// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

//! Dispatch workers and the transport they send through.

use crate::config::Config;
use crate::limiter::SlidingWindow;
use crate::metrics::Counters;
use crate::workload::RequestQueue;
use async_trait::async_trait;
use ringlog::debug;
use std::io::{Error, Result};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

mod http1;
mod worker;

#[cfg(test)]
pub(crate) mod mock;

pub use http1::HttpTransport;
pub use worker::{Expiry, Outcome, Policy, Worker};

/// The parameters of a single call to the endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub credential: Arc<str>,
    /// Milliseconds since the unix epoch at the time of the call.
    pub nonce: u64,
    pub req_id: u64,
}

/// A structured reply from the endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub code: u16,
    /// The `status` field of the reply body.
    pub status: String,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The per-call deadline passed before a response arrived.
    #[error("call timed out")]
    Timeout,
    #[error("failed to connect: {0}")]
    Connect(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),
    #[error("endpoint {0:?} has no host")]
    NoHost(String),
    #[error("invalid uri: {0}")]
    Uri(#[from] http::uri::InvalidUri),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One request/response exchange with the endpoint. Each dispatch worker owns
/// its own transport, so implementations may keep per-session state.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, call: &Call) -> std::result::Result<Response, TransportError>;
}

/// Starts one dispatch worker per configured credential on a dedicated
/// runtime.
pub fn launch(config: &Config, queue: RequestQueue, counters: Arc<Counters>) -> Result<Runtime> {
    debug!("Launching dispatch workers...");

    let credentials = config.target().credentials();

    let client_rt = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(credentials.len())
        .build()?;

    let policy = Policy::from(config);

    for (id, credential) in credentials.iter().enumerate() {
        let transport = HttpTransport::new(config.target().endpoint()).map_err(Error::other)?;
        let limiter = SlidingWindow::new(
            config.ratelimit().capacity(),
            config.ratelimit().period(),
        );

        let worker = Worker::new(
            id,
            credential.as_str().into(),
            transport,
            limiter,
            policy,
            queue.clone(),
            counters.clone(),
        );

        client_rt.spawn(worker.run());
    }

    Ok(client_rt)
}

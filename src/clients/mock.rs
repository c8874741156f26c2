// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

//! A transport double that answers from a script and records every call.

use super::*;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Answer immediately with an OK status.
    Ok,
    /// Answer immediately with the given code and status.
    Status(u16, &'static str),
    /// Fail without a response.
    Error,
    /// Answer OK after a delay.
    Delay(Duration),
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub worker: usize,
    pub call: Call,
    pub at: Instant,
}

pub struct ScriptedTransport {
    worker: usize,
    behavior: Behavior,
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl ScriptedTransport {
    pub fn new(worker: usize, behavior: Behavior, sent: Arc<Mutex<Vec<Sent>>>) -> Self {
        Self {
            worker,
            behavior,
            sent,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, call: &Call) -> std::result::Result<Response, TransportError> {
        self.sent.lock().unwrap().push(Sent {
            worker: self.worker,
            call: call.clone(),
            at: Instant::now(),
        });

        match self.behavior {
            Behavior::Ok => Ok(ok()),
            Behavior::Status(code, status) => Ok(Response {
                code,
                status: status.to_string(),
            }),
            Behavior::Error => Err(TransportError::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Behavior::Delay(delay) => {
                sleep(delay).await;
                Ok(ok())
            }
        }
    }
}

fn ok() -> Response {
    Response {
        code: 200,
        status: "OK".to_string(),
    }
}

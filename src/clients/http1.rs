// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;
use crate::metrics::*;
use bytes::Bytes;
use http::uri::Authority;
use http::Uri;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1::SendRequest;
use hyper::header::{HOST, USER_AGENT};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpStream;

static USER_AGENT_VALUE: &str = concat!("exchange-dispatch/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct Body {
    status: String,
}

/// Sends each call as a GET over a reusable http/1.1 session.
///
/// http/1.1 is not mux'd, so a transport holds at most one session. The
/// session is dropped on any failure and a new one is opened on the next call.
pub struct HttpTransport {
    endpoint: String,
    authority: Authority,
    session: Option<SendRequest<Empty<Bytes>>>,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> std::result::Result<Self, TransportError> {
        let uri: Uri = endpoint.parse()?;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| TransportError::NoHost(endpoint.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            authority,
            session: None,
        })
    }

    async fn connect(&self) -> std::result::Result<SendRequest<Empty<Bytes>>, TransportError> {
        CONNECT.increment();

        let host = self.authority.host();
        let port = self.authority.port_u16().unwrap_or(80);

        let stream = TcpStream::connect((host, port)).await.inspect_err(|_| {
            CONNECT_EX.increment();
        })?;

        let (s, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .inspect_err(|_| {
                CONNECT_EX.increment();
            })?;

        CONNECT_CURR.increment();

        tokio::task::spawn(async move {
            if let Err(e) = conn.await {
                debug!("connection closed: {e}");
            }
            CONNECT_CURR.decrement();
        });

        Ok(s)
    }

    fn uri(&self, call: &Call) -> std::result::Result<Uri, TransportError> {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };

        let uri = format!(
            "{}{separator}api_key={}&nonce={}&req_id={}",
            self.endpoint,
            url_escape::encode_component(&*call.credential),
            call.nonce,
            call.req_id
        )
        .parse()?;

        Ok(uri)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, call: &Call) -> std::result::Result<Response, TransportError> {
        let mut s = match self.session.take() {
            Some(mut s) => {
                // the server may have closed the idle session, reconnect
                // rather than failing a call that was never sent
                match s.ready().await {
                    Ok(()) => s,
                    Err(e) => {
                        debug!("session closed while idle: {e}");
                        self.connect().await?
                    }
                }
            }
            None => self.connect().await?,
        };

        s.ready().await?;

        let request = hyper::Request::builder()
            .uri(self.uri(call)?)
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Empty::<Bytes>::new())?;

        let response = s.send_request(request).await?;
        let code = response.status().as_u16();
        let body = response.into_body().collect().await?.to_bytes();

        // only a session that can take another request is kept
        if s.ready().await.is_ok() {
            self.session = Some(s);
        }

        let body: Body = serde_json::from_slice(&body)?;

        Ok(Response {
            code,
            status: body.status,
        })
    }
}

// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use super::*;

#[derive(Clone, Deserialize)]
pub struct Target {
    /// The full URL requests are sent to, eg:
    /// `http://127.0.0.1:9999/api/request`
    endpoint: String,
    /// Opaque credentials. One dispatch worker is started per credential.
    credentials: Vec<String>,
}

impl Target {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credentials(&self) -> &[String] {
        &self.credentials
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.is_empty() {
            return Err(invalid("at least one credential must be provided"));
        }

        let uri = self
            .endpoint
            .parse::<http::Uri>()
            .map_err(|e| invalid(format!("bad endpoint `{}`: {e}", self.endpoint)))?;

        if uri.scheme_str() != Some("http") {
            return Err(invalid("endpoint must use the `http` scheme"));
        }

        if uri.authority().is_none() {
            return Err(invalid("endpoint has no authority"));
        }

        Ok(())
    }
}

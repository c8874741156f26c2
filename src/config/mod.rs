// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of rpc-perf

use core::num::NonZeroU64;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

mod debug;
mod general;
mod ratelimit;
mod request;
mod target;
mod workload;

pub use debug::Debug;
pub use general::General;
pub use self::ratelimit::Ratelimit;
pub use request::Request;
pub use target::Target;
pub use workload::Workload;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    debug: Debug,
    target: Target,
    #[serde(default)]
    request: Request,
    ratelimit: Ratelimit,
    #[serde(default)]
    workload: Workload,
}

impl Config {
    /// Loads the config from `filename`, terminating the process with a
    /// message on stderr if it cannot be read, parsed, or validated.
    pub fn new(filename: &Path) -> Self {
        match Self::load(filename) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("{}: {error}", filename.display());
                std::process::exit(1);
            }
        }
    }

    pub fn load(filename: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(filename)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.target.validate()?;
        self.request.validate()?;
        self.ratelimit.validate()?;
        Ok(())
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn debug(&self) -> &Debug {
        &self.debug
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn ratelimit(&self) -> &Ratelimit {
        &self.ratelimit
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    /// The upper bound of the generator's randomized pause between requests.
    ///
    /// The pause is drawn uniformly from `[0, max)` so the mean is half of
    /// this value. With a 5% margin, the expected arrival rate lands just
    /// under `rate` per second for each credential.
    pub fn generator_max_sleep(&self) -> Duration {
        let rate = self.ratelimit.rate() as f64;
        let workers = self.target.credentials().len() as f64;
        let ms = 1000.0 / rate / workers * 1.05 * 2.0;
        Duration::from_secs_f64(ms / 1000.0)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn nonzero(value: u64, name: &str) -> Result<NonZeroU64, ConfigError> {
    NonZeroU64::new(value).ok_or_else(|| invalid(format!("`{name}` must be greater than zero")))
}

#[cfg(test)]
pub(crate) fn test_config(credentials: usize) -> Config {
    let credentials: Vec<String> = (0..credentials).map(|i| format!("\"KEY{i}\"")).collect();
    let content = format!(
        r#"
        [target]
        endpoint = "http://127.0.0.1:9999/api/request"
        credentials = [{}]

        [ratelimit]
        rate = 20
        "#,
        credentials.join(", ")
    );
    Config::parse(&content).unwrap()
}

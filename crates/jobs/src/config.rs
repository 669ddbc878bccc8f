//! Client configuration.

use std::time::Duration;

use adaas_charts::ChartLimits;
use adaas_core::DomainError;
use thiserror::Error;

use crate::types::PollPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    InvalidValue {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("base URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("invalid poll policy: {0}")]
    InvalidPolicy(#[from] DomainError),
}

/// Everything the client needs to talk to the compute service.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API root, without a trailing slash (e.g. `http://host/api/v1`).
    pub base_url: String,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    pub chart_limits: ChartLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            poll: PollPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            chart_limits: ChartLimits::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            ..Default::default()
        })
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read configuration from `ADAAS_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("ADAAS_API_URL") {
            config.base_url = normalize_base_url(url)?;
        }
        if let Some(ms) = parse_positive(&lookup, "ADAAS_POLL_INTERVAL_MS")? {
            config.poll.interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_positive(&lookup, "ADAAS_MAX_POLL_ATTEMPTS")? {
            config.poll.max_attempts = to_u32("ADAAS_MAX_POLL_ATTEMPTS", n)?;
        }
        if let Some(n) = parse_positive(&lookup, "ADAAS_MAX_NETWORK_FAILURES")? {
            config.poll.max_consecutive_network_failures = to_u32("ADAAS_MAX_NETWORK_FAILURES", n)?;
        }
        if let Some(ms) = parse_positive(&lookup, "ADAAS_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(raw));
    }
    Ok(trimmed.to_string())
}

fn parse_positive<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidValue {
            var,
            expected: "a positive integer",
            value: raw,
        }),
    }
}

fn to_u32(var: &'static str, n: u64) -> Result<u32, ConfigError> {
    u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
        var,
        expected: "at most 4294967295",
        value: n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_from_env() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ADAAS_API_URL", "https://adaas.example.com/api/v1/"),
            ("ADAAS_POLL_INTERVAL_MS", "500"),
            ("ADAAS_MAX_POLL_ATTEMPTS", "10"),
            ("ADAAS_MAX_NETWORK_FAILURES", "1"),
            ("ADAAS_REQUEST_TIMEOUT_MS", "5000"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://adaas.example.com/api/v1");
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.max_attempts, 10);
        assert_eq!(config.poll.max_consecutive_network_failures, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.url("/jobs/job_1"), "https://adaas.example.com/api/v1/jobs/job_1");
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("ADAAS_MAX_POLL_ATTEMPTS", "0")])),
            Err(ConfigError::InvalidValue { var: "ADAAS_MAX_POLL_ATTEMPTS", .. })
        ));
        assert!(ClientConfig::from_lookup(lookup(&[("ADAAS_POLL_INTERVAL_MS", "soon")])).is_err());
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("ADAAS_API_URL", "localhost:8000")])),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }
}

//! Adapter and transport configuration.
//!
//! `AdapterConfig` can be built in code, deserialized from any serde source,
//! or read from the environment:
//!
//! - `ENVELOPE_BASE_URL` (default `http://127.0.0.1:3000`)
//! - `ENVELOPE_TIMEOUT_SECS` (unset means no transport timeout)
//! - `ENVELOPE_BODY_POLICY` (`lenient` or `strict`, default `lenient`)

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

const BASE_URL_VAR: &str = "ENVELOPE_BASE_URL";
const TIMEOUT_VAR: &str = "ENVELOPE_TIMEOUT_SECS";
const BODY_POLICY_VAR: &str = "ENVELOPE_BODY_POLICY";

/// How to treat a successful response whose body is not valid JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyPolicy {
    /// Read the body as an empty object and continue down the success path.
    #[default]
    Lenient,
    /// Report the response as an `UnknownError`.
    Strict,
}

impl std::str::FromStr for BodyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(BodyPolicy::Lenient),
            "strict" => Ok(BodyPolicy::Strict),
            other => Err(format!("expected `lenient` or `strict`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub base_url: String,
    /// Whole-request timeout handed to the HTTP client. The adapter itself
    /// never times out a request.
    pub timeout_secs: Option<u64>,
    pub body_policy: BodyPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
            body_policy: BodyPolicy::default(),
        }
    }
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup(BASE_URL_VAR) {
            if base_url.trim().is_empty() {
                return Err(ConfigError::InvalidVar {
                    var: BASE_URL_VAR,
                    reason: "must not be empty".to_string(),
                });
            }
            config.base_url = base_url;
        }

        if let Some(timeout) = lookup(TIMEOUT_VAR) {
            let secs = timeout.trim().parse::<u64>().map_err(|e| ConfigError::InvalidVar {
                var: TIMEOUT_VAR,
                reason: e.to_string(),
            })?;
            config.timeout_secs = Some(secs);
        }

        if let Some(policy) = lookup(BODY_POLICY_VAR) {
            config.body_policy = policy
                .parse()
                .map_err(|reason| ConfigError::InvalidVar {
                    var: BODY_POLICY_VAR,
                    reason,
                })?;
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

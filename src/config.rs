//! Service configuration.
//!
//! Loaded from environment variables with defaults for local runs. Without a
//! gateway API key the service runs against the in-process sandbox gateway.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::DEFAULT_MAX_ATTEMPTS;

/// Webhook secret used with the sandbox gateway when none is configured.
pub const SANDBOX_WEBHOOK_SECRET: &str = "whsec_sandbox";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("missing required configuration: {0}")]
    MissingRequired(&'static str),
}

#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Default currency of registered bookings.
    pub currency: String,
    /// `None` selects the sandbox gateway.
    pub gateway_api_key: Option<String>,
    pub gateway_base_url: String,
    pub gateway_timeout: Duration,
    pub webhook_secret: String,
    pub webhook_tolerance: Duration,
    pub link_return_url: String,
    pub ledger_max_attempts: usize,
    pub notify_buffer: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("currency", &self.currency)
            .field("sandbox", &self.is_sandbox())
            .field("gateway_base_url", &self.gateway_base_url)
            .field("gateway_timeout", &self.gateway_timeout)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("link_return_url", &self.link_return_url)
            .field("ledger_max_attempts", &self.ledger_max_attempts)
            .field("notify_buffer", &self.notify_buffer)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let gateway_api_key = get("GATEWAY_API_KEY");
        let webhook_secret = match (get("WEBHOOK_SECRET"), &gateway_api_key) {
            (Some(secret), _) => secret,
            (None, None) => SANDBOX_WEBHOOK_SECRET.to_string(),
            (None, Some(_)) => return Err(ConfigError::MissingRequired("WEBHOOK_SECRET")),
        };

        let config = Config {
            bind_addr: parse(&get, "BIND_ADDR", "0.0.0.0:8080")?,
            currency: get("CURRENCY")
                .unwrap_or_else(|| "usd".to_string())
                .to_lowercase(),
            gateway_api_key,
            gateway_base_url: get("GATEWAY_BASE_URL")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            gateway_timeout: Duration::from_secs(parse(&get, "GATEWAY_TIMEOUT_SECS", "10")?),
            webhook_secret,
            webhook_tolerance: Duration::from_secs(parse(&get, "WEBHOOK_TOLERANCE_SECS", "300")?),
            link_return_url: get("LINK_RETURN_URL")
                .unwrap_or_else(|| "http://localhost:8080/payments/verify-session".to_string()),
            ledger_max_attempts: parse(
                &get,
                "LEDGER_MAX_ATTEMPTS",
                &DEFAULT_MAX_ATTEMPTS.to_string(),
            )?,
            notify_buffer: parse(&get, "NOTIFY_BUFFER", "256")?,
        };

        if config.ledger_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEDGER_MAX_ATTEMPTS",
                value: "0".into(),
            });
        }
        if config.notify_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_BUFFER",
                value: "0".into(),
            });
        }
        Ok(config)
    }

    pub fn is_sandbox(&self) -> bool {
        self.gateway_api_key.is_none()
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_select_the_sandbox() {
        let config = load(&[]).unwrap();
        assert!(config.is_sandbox());
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.currency, "usd");
        assert_eq!(config.webhook_secret, SANDBOX_WEBHOOK_SECRET);
        assert_eq!(config.webhook_tolerance, Duration::from_secs(300));
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.ledger_max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.notify_buffer, 256);
    }

    #[test]
    fn live_gateway_requires_a_webhook_secret() {
        let result = load(&[("GATEWAY_API_KEY", "sk_live_x")]);
        assert_eq!(result.unwrap_err(), ConfigError::MissingRequired("WEBHOOK_SECRET"));

        let config = load(&[("GATEWAY_API_KEY", "sk_live_x"), ("WEBHOOK_SECRET", "whsec_1")])
            .unwrap();
        assert!(!config.is_sandbox());
        assert_eq!(config.webhook_secret, "whsec_1");
    }

    #[test]
    fn invalid_numbers_name_their_key() {
        let result = load(&[("GATEWAY_TIMEOUT_SECS", "soon")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "GATEWAY_TIMEOUT_SECS", .. })
        ));
        assert!(load(&[("LEDGER_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("CURRENCY", " "), ("GATEWAY_API_KEY", "")]).unwrap();
        assert_eq!(config.currency, "usd");
        assert!(config.is_sandbox());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = load(&[("GATEWAY_API_KEY", "sk_live_x"), ("WEBHOOK_SECRET", "whsec_1")])
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_live_x"));
        assert!(!rendered.contains("whsec_1"));
    }
}

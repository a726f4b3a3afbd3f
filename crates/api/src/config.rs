//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AUTH_TOKEN_SECRET` - HMAC key for bearer tokens (min 32 chars)
//!
//! ## Optional
//! - `HOST` - bind address (default: `0.0.0.0`)
//! - `PORT` - listen port (default: `3000`)
//! - `RUST_LOG` - tracing filter directive (default: `info`)
//! - `LOG_FORMAT` - `text` or `json` (default: `text`)
//! - `DATABASE_URL` - PostgreSQL connection string; absent means in-memory storage
//! - `AUTH_TOKEN_TTL_SECS` - bearer token lifetime (default: `86400`)
//! - `GATEWAY_TIMEOUT_SECS` - bound on each payment provider call (default: `30`)
//! - `PUBLIC_BASE_URL` - base of provider callback URLs (default: `http://localhost:{PORT}`)
//! - `PESAPAL_API_URL`, `PESAPAL_CONSUMER_KEY`, `PESAPAL_CONSUMER_SECRET`,
//!   `PESAPAL_NOTIFICATION_ID`, `PESAPAL_CALLBACK_URL`
//! - `MPESA_API_URL`, `MPESA_CONSUMER_KEY`, `MPESA_CONSUMER_SECRET`,
//!   `MPESA_PASSKEY`, `MPESA_SHORTCODE`
//!
//! A payment provider is only enabled when all of its credentials are set.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use services::payments::{MpesaConfig, PesapalConfig};
use thiserror::Error;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const DEFAULT_PESAPAL_API_URL: &str = "https://pay.pesapal.com/v3";
const DEFAULT_MPESA_API_URL: &str = "https://sandbox.safaricom.co.ke";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<SecretString>,
    pub token_secret: SecretString,
    pub token_ttl: Duration,
    pub gateway_timeout: Duration,
    pub public_base_url: String,
    pub pesapal: Option<PesapalConfig>,
    pub mpesa: Option<MpesaConfig>,
}

impl Config {
    /// Loads configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key-value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let port = env.parse("PORT", 3000u16)?;
        let log_format = match env.or("LOG_FORMAT", "text").to_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "LOG_FORMAT".to_string(),
                    format!("expected text or json, got {other}"),
                ));
            }
        };

        let token_secret = env.required_secret("AUTH_TOKEN_SECRET")?;
        if token_secret.expose_secret().len() < MIN_TOKEN_SECRET_LENGTH {
            return Err(ConfigError::InsecureSecret(
                "AUTH_TOKEN_SECRET".to_string(),
                format!("must be at least {MIN_TOKEN_SECRET_LENGTH} characters"),
            ));
        }

        let public_base_url = env
            .or("PUBLIC_BASE_URL", &format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host: env.or("HOST", "0.0.0.0"),
            port,
            log_level: env.or("RUST_LOG", "info"),
            log_format,
            database_url: env.optional("DATABASE_URL").map(SecretString::from),
            token_secret,
            token_ttl: Duration::from_secs(env.parse("AUTH_TOKEN_TTL_SECS", 86_400u64)?),
            gateway_timeout: Duration::from_secs(env.parse("GATEWAY_TIMEOUT_SECS", 30u64)?),
            pesapal: pesapal_config(&env, &public_base_url),
            mpesa: mpesa_config(&env, &public_base_url),
            public_base_url,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn pesapal_config<F>(env: &Env<F>, public_base_url: &str) -> Option<PesapalConfig>
where
    F: Fn(&str) -> Option<String>,
{
    Some(PesapalConfig {
        base_url: env.or("PESAPAL_API_URL", DEFAULT_PESAPAL_API_URL),
        consumer_key: env.optional("PESAPAL_CONSUMER_KEY")?,
        consumer_secret: SecretString::from(env.optional("PESAPAL_CONSUMER_SECRET")?),
        notification_id: env.optional("PESAPAL_NOTIFICATION_ID")?,
        callback_url: env.or("PESAPAL_CALLBACK_URL", public_base_url),
    })
}

fn mpesa_config<F>(env: &Env<F>, public_base_url: &str) -> Option<MpesaConfig>
where
    F: Fn(&str) -> Option<String>,
{
    Some(MpesaConfig {
        base_url: env.or("MPESA_API_URL", DEFAULT_MPESA_API_URL),
        consumer_key: env.optional("MPESA_CONSUMER_KEY")?,
        consumer_secret: SecretString::from(env.optional("MPESA_CONSUMER_SECRET")?),
        passkey: SecretString::from(env.optional("MPESA_PASSKEY")?),
        shortcode: env.optional("MPESA_SHORTCODE")?,
        callback_url: format!("{public_base_url}/payments/mpesa/callback"),
    })
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// A set, non-blank value.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn required_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        self.optional(key)
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "k3y-f0r-t3sts-0nly-9a8b7c6d5e4f3g2h";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[("AUTH_TOKEN_SECRET", SECRET)]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.token_ttl, Duration::from_secs(86_400));
        assert_eq!(config.gateway_timeout, Duration::from_secs(30));
        assert_eq!(config.public_base_url, "http://localhost:3000");
        assert!(config.pesapal.is_none());
        assert!(config.mpesa.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = load(&[
            ("AUTH_TOKEN_SECRET", SECRET),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_token_secret_is_required_and_long() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(_))));
        assert!(matches!(
            load(&[("AUTH_TOKEN_SECRET", "short")]),
            Err(ConfigError::InsecureSecret(_, _))
        ));
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let result = load(&[("AUTH_TOKEN_SECRET", SECRET), ("PORT", "eighty")]);
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(key, _)) if key == "PORT"));

        let result = load(&[("AUTH_TOKEN_SECRET", SECRET), ("LOG_FORMAT", "xml")]);
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(key, _)) if key == "LOG_FORMAT"));
    }

    #[test]
    fn test_providers_need_complete_credentials() {
        let partial = load(&[
            ("AUTH_TOKEN_SECRET", SECRET),
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_CONSUMER_SECRET", "secret"),
        ])
        .unwrap();
        assert!(partial.mpesa.is_none());

        let full = load(&[
            ("AUTH_TOKEN_SECRET", SECRET),
            ("PUBLIC_BASE_URL", "https://shop.example.co.ke/"),
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_CONSUMER_SECRET", "secret"),
            ("MPESA_PASSKEY", "passkey"),
            ("MPESA_SHORTCODE", "174379"),
            ("PESAPAL_CONSUMER_KEY", "key"),
            ("PESAPAL_CONSUMER_SECRET", "secret"),
            ("PESAPAL_NOTIFICATION_ID", "ipn-1"),
        ])
        .unwrap();

        let mpesa = full.mpesa.unwrap();
        assert_eq!(
            mpesa.callback_url,
            "https://shop.example.co.ke/payments/mpesa/callback"
        );
        assert_eq!(mpesa.base_url, DEFAULT_MPESA_API_URL);

        let pesapal = full.pesapal.unwrap();
        assert_eq!(pesapal.base_url, DEFAULT_PESAPAL_API_URL);
        assert_eq!(pesapal.callback_url, "https://shop.example.co.ke");
    }
}

//! Worker configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `EPP_HOST` - local registry EPP endpoint hostname
//! - `EPP_USERNAME` - registrar account ID at the local registry
//! - `EPP_PASSWORD` - registrar account password (HIGH PRIVILEGE)
//! - `RESELLER_API_URL` - reseller API base URL
//! - `RESELLER_API_USER` - reseller API user
//! - `RESELLER_API_KEY` - reseller API key (HIGH PRIVILEGE)
//! - `RESELLER_USERNAME` - reseller account username
//! - `RESELLER_CLIENT_IP` - whitelisted client IP for the reseller API
//! - `SMTP_HOST` - SMTP server hostname
//! - `SMTP_USERNAME` - SMTP authentication username
//! - `SMTP_PASSWORD` - SMTP authentication password
//! - `SMTP_FROM` - email sender address
//! - `ADMIN_EMAIL` - destination for operational alerts
//!
//! ## Optional
//! - `EPP_PORT` - EPP port (default: 700)
//! - `EPP_TIMEOUT_SECS` - EPP request timeout (default: 30)
//! - `EPP_CONTACT_PREFIX` - registry contact handle prefix (default: KV)
//! - `RESELLER_TIMEOUT_SECS` - reseller request timeout (default: 60)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `RETRY_MAX_ATTEMPTS` - retry budget per failed registration (default: 3)
//! - `RETRY_BACKOFF_SECS` - fixed delay between attempts (default: 3600)
//! - `SWEEP_INTERVAL_SECS` - seconds between retry sweeps (default: 300)
//! - `SWEEP_BATCH_SIZE` - max records per sweep (default: 50)
//! - `DEFAULT_NAMESERVERS` - comma-separated nameservers applied after registration
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::models::RetryPolicy;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Local registry EPP configuration
    pub epp: EppConfig,
    /// Reseller API configuration
    pub reseller: ResellerConfig,
    /// Email configuration
    pub email: EmailConfig,
    /// Retry policy for failed registrations
    pub retry: RetryPolicy,
    /// Seconds between retry sweeps
    pub sweep_interval: Duration,
    /// Max records per sweep
    pub sweep_batch_size: i64,
    /// Nameservers applied after successful registration (empty = provider defaults)
    pub default_nameservers: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "staging", "production")
    pub sentry_environment: Option<String>,
}

/// Local registry EPP configuration.
///
/// Implements `Debug` manually to redact the HIGH PRIVILEGE password.
#[derive(Clone)]
pub struct EppConfig {
    /// EPP endpoint hostname.
    pub host: String,
    /// EPP port.
    pub port: u16,
    /// Registrar account ID.
    pub username: String,
    /// Registrar account password.
    pub password: SecretString,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Prefix applied to contact handles in registry frames.
    pub contact_prefix: String,
}

impl std::fmt::Debug for EppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("contact_prefix", &self.contact_prefix)
            .finish()
    }
}

/// Reseller API configuration.
///
/// Implements `Debug` manually to redact the HIGH PRIVILEGE API key.
#[derive(Clone)]
pub struct ResellerConfig {
    /// API base URL.
    pub base_url: String,
    /// API user.
    pub api_user: String,
    /// API key.
    pub api_key: SecretString,
    /// Account username.
    pub username: String,
    /// Whitelisted client IP.
    pub client_ip: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ResellerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResellerConfig")
            .field("base_url", &self.base_url)
            .field("api_user", &self.api_user)
            .field("api_key", &"[REDACTED]")
            .field("username", &self.username)
            .field("client_ip", &self.client_ip)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Email (SMTP) configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP port.
    pub smtp_port: u16,
    /// SMTP authentication username.
    pub smtp_username: String,
    /// SMTP authentication password.
    pub smtp_password: SecretString,
    /// Sender address.
    pub from_address: String,
    /// Destination for operational alerts.
    pub admin_address: String,
}

impl OrdersConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing, a value
    /// does not parse, or a registrar credential looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = SecretString::from(required("DATABASE_URL")?);

        let epp = EppConfig {
            host: required("EPP_HOST")?,
            port: parsed_or("EPP_PORT", 700)?,
            username: required("EPP_USERNAME")?,
            password: secret("EPP_PASSWORD")?,
            timeout_secs: parsed_or("EPP_TIMEOUT_SECS", 30)?,
            contact_prefix: optional("EPP_CONTACT_PREFIX").unwrap_or_else(|| "KV".to_owned()),
        };

        let reseller = ResellerConfig {
            base_url: required("RESELLER_API_URL")?,
            api_user: required("RESELLER_API_USER")?,
            api_key: secret("RESELLER_API_KEY")?,
            username: required("RESELLER_USERNAME")?,
            client_ip: required("RESELLER_CLIENT_IP")?,
            timeout_secs: parsed_or("RESELLER_TIMEOUT_SECS", 60)?,
        };

        let email = EmailConfig {
            smtp_host: required("SMTP_HOST")?,
            smtp_port: parsed_or("SMTP_PORT", 587)?,
            smtp_username: required("SMTP_USERNAME")?,
            smtp_password: SecretString::from(required("SMTP_PASSWORD")?),
            from_address: required("SMTP_FROM")?,
            admin_address: required("ADMIN_EMAIL")?,
        };

        let retry = RetryPolicy {
            max_retries: parsed_or("RETRY_MAX_ATTEMPTS", 3)?,
            backoff: Duration::from_secs(parsed_or("RETRY_BACKOFF_SECS", 3600)?),
        };

        let default_nameservers = optional("DEFAULT_NAMESERVERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|ns| !ns.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            epp,
            reseller,
            email,
            retry,
            sweep_interval: Duration::from_secs(parsed_or("SWEEP_INTERVAL_SECS", 300)?),
            sweep_batch_size: parsed_or("SWEEP_BATCH_SIZE", 50)?,
            default_nameservers,
            sentry_dsn: optional("SENTRY_DSN"),
            sentry_environment: optional("SENTRY_ENVIRONMENT"),
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_owned()))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar(name.to_owned(), raw)),
    }
}

/// Load a registrar credential, rejecting obvious placeholders.
fn secret(name: &str) -> Result<SecretString, ConfigError> {
    let value = SecretString::from(required(name)?);
    let lowered = value.expose_secret().to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lowered.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                name.to_owned(),
                format!("value matches placeholder pattern {pattern:?}"),
            ));
        }
    }
    Ok(value)
}

#[cfg(test)]
#[allow(unsafe_code)] // env::set_var is unsafe in edition 2024; keys are test-unique
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_secret_rejected() {
        unsafe {
            std::env::set_var("TEST_SECRET_PLACEHOLDER", "your-api-key-here");
        }
        let result = secret("TEST_SECRET_PLACEHOLDER");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_real_looking_secret_accepted() {
        unsafe {
            std::env::set_var("TEST_SECRET_REAL", "9f8e7d6c5b4a39281706f5e4d3c2b1a0");
        }
        assert!(secret("TEST_SECRET_REAL").is_ok());
    }

    #[test]
    fn test_parsed_or_default_and_invalid() {
        assert_eq!(parsed_or("TEST_UNSET_VAR", 42_u64).expect("default"), 42);

        unsafe {
            std::env::set_var("TEST_BAD_NUMBER", "not-a-number");
        }
        assert!(parsed_or::<u64>("TEST_BAD_NUMBER", 1).is_err());
    }
}

//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

use subhook_billing::webhooks::{DispatchSettings, DEFAULT_TOLERANCE_SECONDS};
use subhook_billing::StripeConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid value: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Webhook ingestion settings
#[derive(Clone)]
pub struct WebhookConfig {
    /// Signing secret; `None` disables verification
    pub secret: Option<String>,
    pub tolerance_seconds: u64,
    pub dispatch: DispatchSettings,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance_seconds", &self.tolerance_seconds)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Postgres URL; without it events are kept in memory and billing is off
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub publishable_key: String,
    /// Present when `STRIPE_SECRET_KEY` is set
    pub stripe: Option<StripeConfig>,
    pub webhook: WebhookConfig,
    pub static_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let publishable_key = var("STRIPE_PUBLISHABLE_KEY").unwrap_or_default();
        let stripe = match var("STRIPE_SECRET_KEY") {
            Some(secret_key) => Some(StripeConfig {
                secret_key,
                publishable_key: publishable_key.clone(),
                subscription_price_id: var("SUBSCRIPTION_PLAN_ID")
                    .ok_or(ConfigError::Missing("SUBSCRIPTION_PLAN_ID"))?,
            }),
            None => None,
        };

        let defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            handler_timeout: Duration::from_secs(parse_or(
                &var,
                "WEBHOOK_HANDLER_TIMEOUT_SECONDS",
                defaults.handler_timeout.as_secs(),
            )?),
            claim_timeout: Duration::from_secs(parse_or(
                &var,
                "WEBHOOK_CLAIM_TIMEOUT_SECONDS",
                defaults.claim_timeout.as_secs(),
            )?),
            duplicate_wait: Duration::from_millis(parse_or(
                &var,
                "WEBHOOK_DUPLICATE_WAIT_MS",
                defaults.duplicate_wait.as_millis() as u64,
            )?),
            ..defaults
        };
        if dispatch.duplicate_wait <= dispatch.handler_timeout {
            return Err(ConfigError::Inconsistent(format!(
                "WEBHOOK_DUPLICATE_WAIT_MS ({:?}) must exceed WEBHOOK_HANDLER_TIMEOUT_SECONDS ({:?})",
                dispatch.duplicate_wait, dispatch.handler_timeout
            )));
        }

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:4242".to_string()),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            publishable_key,
            stripe,
            webhook: WebhookConfig {
                secret: var("STRIPE_WEBHOOK_SECRET"),
                tolerance_seconds: parse_or(
                    &var,
                    "WEBHOOK_TOLERANCE_SECONDS",
                    DEFAULT_TOLERANCE_SECONDS,
                )?,
                dispatch,
            },
            static_dir: var("STATIC_DIR").map(PathBuf::from),
            log_format,
        })
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

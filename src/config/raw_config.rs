use crate::config::{
    database_config::DatabaseConfig, IngressConfig, RateLimitConfig, RedisConfig, SchedulerConfig,
    SmtpConfig, WhitelistConfig,
};
use figment::{providers, providers::Format, Figment};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// The environment variables recognized directly (unprefixed, unnested) per the external
/// interface contract, mapped onto their dotted path in the structured config.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("X_API_KEY", "ingress.api_key"),
    ("DB_USER", "db.username"),
    ("DB_PASSWORD", "db.password"),
    ("DB_HOST", "db.host"),
    ("DB_PORT", "db.port"),
    ("DB_NAME", "db.name"),
    ("REDIS_URL", "redis.url"),
    ("SCHEDULER_API_BASE_URL", "scheduler.self_callback_base_url"),
    ("SCHEDULER_API_TIMEOUT", "scheduler.self_callback_timeout"),
    ("SCHEDULER_MAX_WORKERS", "scheduler.max_workers"),
    ("SCHEDULER_ENABLED", "scheduler.enabled"),
    ("SCHEDULER_REFRESH_INTERVAL", "scheduler.refresh_interval"),
    ("WHITELIST_ENABLED", "whitelist.enabled"),
    ("WHITELIST_SIGNUP_URL", "whitelist.signup_url"),
    ("FRONTEND_URL", "whitelist.frontend_url"),
    ("PORT", "port"),
    ("BIND_ADDRESS", "bind_address"),
    ("ATTACHMENTS_DIR", "ingress.attachments_path"),
    ("ATTACHMENT_MAX_SIZE_BYTES", "ingress.max_attachment_size"),
    ("ATTACHMENT_MAX_COUNT", "ingress.max_attachments_count"),
];

/// Raw configuration structure that is used to read the configuration from the file and from
/// the environment variables recognized by the external interface.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RawConfig {
    /// Defines a TCP port to listen on.
    pub port: u16,
    /// Address the HTTP listener binds to.
    pub bind_address: String,
    /// Database configuration.
    pub db: DatabaseConfig,
    /// Configuration for the shared key-value store (rate limiter + idempotency ledger).
    pub redis: RedisConfig,
    /// Configuration for the SMTP functionality used to send reject/verification emails.
    pub smtp: Option<SmtpConfig>,
    /// Configuration for the `/process-email` ingress pipeline.
    pub ingress: IngressConfig,
    /// Configuration for the rate limiter.
    pub rate_limit: RateLimitConfig,
    /// Configuration for the whitelist gate.
    pub whitelist: WhitelistConfig,
    /// Configuration for the scheduler runner.
    pub scheduler: SchedulerConfig,
}

impl RawConfig {
    /// Reads the configuration from the file (TOML), merges it with defaults, and overlays the
    /// small set of flat environment variables the external interface recognizes.
    pub fn read_from_file(path: &str) -> anyhow::Result<Self> {
        let env_provider = providers::Env::raw().only(
            ENV_OVERRIDES
                .iter()
                .map(|(env_key, _)| *env_key)
                .collect::<Vec<_>>(),
        );
        let env_provider = ENV_OVERRIDES
            .iter()
            .fold(env_provider, |provider, (env_key, dotted_path)| {
                let dotted_path = dotted_path.to_string();
                let env_key = env_key.to_string();
                provider.map(move |key| {
                    if key.as_str().eq_ignore_ascii_case(&env_key) {
                        Cow::Owned(dotted_path.clone())
                    } else {
                        Cow::Owned(key.as_str().to_string())
                    }
                })
            });

        Ok(Figment::from(providers::Serialized::defaults(
            Self::default(),
        ))
        .merge(providers::Toml::file(path))
        .merge(env_provider)
        .extract()?)
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            db: Default::default(),
            redis: Default::default(),
            smtp: None,
            ingress: Default::default(),
            rate_limit: Default::default(),
            whitelist: Default::default(),
            scheduler: Default::default(),
        }
    }
}

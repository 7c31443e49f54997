mod database_config;
mod ingress_config;
mod raw_config;
mod rate_limit_config;
mod redis_config;
mod scheduler_config;
mod smtp_config;
mod whitelist_config;

pub use self::{
    database_config::DatabaseConfig,
    ingress_config::{HandleConfig, IngressConfig},
    raw_config::RawConfig,
    rate_limit_config::{Plan, RateLimitConfig, SenderLimits},
    redis_config::RedisConfig,
    scheduler_config::SchedulerConfig,
    smtp_config::SmtpConfig,
    whitelist_config::WhitelistConfig,
};

/// Main server config, derived from [`RawConfig`] once it has been read from disk and the
/// environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP port the API server listens on.
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

impl AsRef<Config> for Config {
    fn as_ref(&self) -> &Config {
        self
    }
}

impl From<RawConfig> for Config {
    fn from(raw_config: RawConfig) -> Self {
        Self {
            port: raw_config.port,
            bind_address: raw_config.bind_address,
            db: raw_config.db,
            redis: raw_config.redis,
            smtp: raw_config.smtp,
            ingress: raw_config.ingress,
            rate_limit: raw_config.rate_limit,
            whitelist: raw_config.whitelist,
            scheduler: raw_config.scheduler,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::config::{Config, RawConfig};

    pub fn mock_config() -> anyhow::Result<Config> {
        let mut raw_config = RawConfig::default();
        raw_config.ingress.api_key = "test-api-key".to_string();
        Ok(Config::from(raw_config))
    }

    #[test]
    fn conversion_from_raw_config() {
        let config = mock_config().unwrap();
        assert_eq!(config.ingress.api_key, "test-api-key");
        assert_eq!(config.port, 8000);
    }
}

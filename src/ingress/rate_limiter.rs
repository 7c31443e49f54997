use crate::{
    config::{Plan, RateLimitConfig},
    redis::RedisStore,
};
use time::OffsetDateTime;

/// A rolling window the sender-level limiter tracks independently.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Window {
    Hour,
    Day,
    Month,
}

impl Window {
    fn label(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// UTC bucket key component for this window, at minute precision as required elsewhere in
    /// this system: `YYYYMMDDHH`, `YYYYMMDD`, or `YYYYMM`.
    fn bucket(&self, now: OffsetDateTime) -> String {
        match self {
            Self::Hour => format!(
                "{:04}{:02}{:02}{:02}",
                now.year(),
                u8::from(now.month()),
                now.day(),
                now.hour()
            ),
            Self::Day => format!("{:04}{:02}{:02}", now.year(), u8::from(now.month()), now.day()),
            Self::Month => format!("{:04}{:02}", now.year(), u8::from(now.month())),
        }
    }

    /// Seconds until the bucket for this window, started "now", expires. Rounded up generously;
    /// a few extra seconds of TTL cannot cause an undercount since the bucket key itself changes
    /// at the window boundary.
    fn ttl_seconds(&self) -> u64 {
        match self {
            Self::Hour => 60 * 70,
            Self::Day => 60 * 60 * 26,
            Self::Month => 60 * 60 * 24 * 32,
        }
    }

    const ALL: [Window; 3] = [Window::Hour, Window::Day, Window::Month];
}

/// Outcome of a rate-limit check: either the request may proceed, or it was rejected on a
/// specific dimension and window, which the caller needs to shape the 429 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitVerdict {
    Allowed,
    SenderExceeded { window: &'static str, plan: &'static str },
    DomainExceeded { window: &'static str },
}

/// Fixed-window rate limiter keyed by normalized sender and domain. Counters are
/// incremented unconditionally before being compared against the configured ceiling; a rejected
/// request's increment is never rolled back, since a would-be abuser observing a 429 and retrying
/// must not get a second free attempt at the same window.
pub struct RateLimiter<'a> {
    redis: &'a RedisStore,
    config: &'a RateLimitConfig,
}

impl<'a> RateLimiter<'a> {
    pub fn new(redis: &'a RedisStore, config: &'a RateLimitConfig) -> Self {
        Self { redis, config }
    }

    /// Checks and increments every sender window plus (when applicable) the per-domain hourly
    /// window, all for the given normalized sender. Returns the first violated dimension, if any.
    pub async fn check_and_increment(
        &self,
        normalized_sender: &str,
        domain: Option<&str>,
        plan: Plan,
        now: OffsetDateTime,
    ) -> anyhow::Result<RateLimitVerdict> {
        let limits = self.config.limits_for(plan);

        for window in Window::ALL {
            let ceiling = match window {
                Window::Hour => limits.hour,
                Window::Day => limits.day,
                Window::Month => limits.month,
            };
            let key = format!("ratelimit:sender:{normalized_sender}:{}:{}", window.label(), window.bucket(now));
            let count = self
                .redis
                .increment_and_expire(&key, window.ttl_seconds())
                .await?;
            if count as u32 > ceiling {
                return Ok(RateLimitVerdict::SenderExceeded {
                    window: window.label(),
                    plan: plan.label(),
                });
            }
        }

        if let Some(domain) = domain {
            if !self.config.known_multi_tenant_domains.contains(domain) {
                let key = format!(
                    "ratelimit:domain:{domain}:{}:{}",
                    Window::Hour.label(),
                    Window::Hour.bucket(now)
                );
                let count = self
                    .redis
                    .increment_and_expire(&key, Window::Hour.ttl_seconds())
                    .await?;
                if count as u32 > self.config.domain_hourly_limit {
                    return Ok(RateLimitVerdict::DomainExceeded { window: "hour" });
                }
            }
        }

        Ok(RateLimitVerdict::Allowed)
    }
}

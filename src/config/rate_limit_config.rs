use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Request plan a sender is associated with. Only `Beta` is assignable today, but the shape
/// leaves room for per-plan limits without touching the limiter itself.
#[derive(Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Beta,
}

impl Plan {
    /// Human-readable name used in rejection messages (`Rate limit exceeded - ... for beta plan`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Beta => "beta",
        }
    }
}

/// Per-sender limits for a single plan, one ceiling per rolling window.
#[derive(Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct SenderLimits {
    pub hour: u32,
    pub day: u32,
    pub month: u32,
}

/// Configuration for the fixed-window rate limiter.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Per-sender limits, keyed by plan.
    pub sender_limits: Vec<(Plan, SenderLimits)>,
    /// Per-domain hourly limit, applied only to domains not in `known_multi_tenant_domains`.
    pub domain_hourly_limit: u32,
    /// Domains hosting many unrelated tenants (e.g. `gmail.com`); the per-domain limit is
    /// never applied to them since a single shared limit would punish unrelated senders.
    pub known_multi_tenant_domains: HashSet<String>,
    /// Plan assigned to senders that have no explicit plan assignment.
    pub default_plan: Plan,
}

impl RateLimitConfig {
    /// Returns the configured limits for the given plan, falling back to the default plan's
    /// limits if the plan isn't explicitly listed.
    pub fn limits_for(&self, plan: Plan) -> SenderLimits {
        self.sender_limits
            .iter()
            .find(|(p, _)| *p == plan)
            .map(|(_, limits)| *limits)
            .unwrap_or(SenderLimits {
                hour: 20,
                day: 50,
                month: 300,
            })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sender_limits: vec![(
                Plan::Beta,
                SenderLimits {
                    hour: 20,
                    day: 50,
                    month: 300,
                },
            )],
            domain_hourly_limit: 50,
            known_multi_tenant_domains: [
                "gmail.com",
                "googlemail.com",
                "outlook.com",
                "hotmail.com",
                "live.com",
                "yahoo.com",
                "icloud.com",
                "me.com",
                "aol.com",
                "protonmail.com",
                "proton.me",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            default_plan: Plan::Beta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Plan, RateLimitConfig};

    #[test]
    fn default_beta_limits_match_spec() {
        let config = RateLimitConfig::default();
        let limits = config.limits_for(Plan::Beta);
        assert_eq!(limits.hour, 20);
        assert_eq!(limits.day, 50);
        assert_eq!(limits.month, 300);
        assert_eq!(config.domain_hourly_limit, 50);
    }

    #[test]
    fn known_providers_are_recognized() {
        let config = RateLimitConfig::default();
        assert!(config.known_multi_tenant_domains.contains("gmail.com"));
        assert!(!config.known_multi_tenant_domains.contains("new-corp.test"));
    }
}

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;
use url::Url;

/// Configuration for the scheduler runner.
#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Whether the scheduler resumes/accepts jobs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Size of the scheduler's worker thread pool.
    pub max_workers: u16,
    /// Base URL the scheduler issues self-callback `POST /process-email` requests against.
    pub self_callback_base_url: Url,
    /// Timeout applied to a single self-callback request.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub self_callback_timeout: Duration,
    /// How often the refresh loop polls the shared job store for jobs added by other processes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub refresh_interval: Duration,
    /// How long shutdown waits for in-flight firings to drain.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub shutdown_timeout: Duration,
}

fn default_enabled() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: 5,
            self_callback_base_url: Url::parse("http://localhost:8000")
                .expect("Cannot parse default scheduler self-callback base URL."),
            self_callback_timeout: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SchedulerConfig;
    use insta::assert_toml_snapshot;

    #[test]
    fn serialization_and_default() {
        assert_toml_snapshot!(SchedulerConfig::default(), @r###"
        enabled = true
        max_workers = 5
        self_callback_base_url = 'http://localhost:8000/'
        self_callback_timeout = 300000
        refresh_interval = 10000
        shutdown_timeout = 30000
        "###);
    }
}

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;

/// Configuration for the SMTP functionality.
#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SmtpConfig {
    /// Username to use to authenticate to the SMTP server.
    pub username: String,
    /// Password to use to authenticate to the SMTP server.
    pub password: String,
    /// SMTP server host.
    pub host: String,
    /// SMTP server port. If not specified, default TLS port (465) will be used.
    pub port: Option<u16>,
    /// Whether to NOT use TLS for the SMTP connection.
    #[serde(default)]
    pub no_tls: bool,
    /// Artificial delay between two consecutive emails to avoid hitting SMTP server rate limits.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_throttle_delay")]
    pub throttle_delay: Duration,
}

/// Default throttle delay between two consecutive emails to avoid hitting SMTP server rate limits.
fn default_throttle_delay() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use crate::config::SmtpConfig;
    use insta::{assert_debug_snapshot, assert_toml_snapshot};
    use std::time::Duration;

    #[test]
    fn serialization() {
        let config = SmtpConfig {
            username: "notify@new-corp.test".to_string(),
            password: "password".to_string(),
            host: "smtp.new-corp.test".to_string(),
            port: None,
            no_tls: false,
            throttle_delay: Duration::from_secs(10),
        };
        assert_toml_snapshot!(config, @r###"
        username = 'notify@new-corp.test'
        password = 'password'
        host = 'smtp.new-corp.test'
        no_tls = false
        throttle_delay = 10000
        "###);

        let config = SmtpConfig {
            username: "notify@new-corp.test".to_string(),
            password: "password".to_string(),
            host: "smtp.new-corp.test".to_string(),
            port: Some(465),
            no_tls: true,
            throttle_delay: Duration::from_secs(30),
        };
        assert_toml_snapshot!(config, @r###"
        username = 'notify@new-corp.test'
        password = 'password'
        host = 'smtp.new-corp.test'
        port = 465
        no_tls = true
        throttle_delay = 30000
        "###);
    }

    #[test]
    fn deserialization() {
        let config: SmtpConfig = toml::from_str(
            r#"
        username = 'notify@new-corp.test'
        password = 'password'
        host = 'smtp.new-corp.test'
    "#,
        )
        .unwrap();
        assert_debug_snapshot!(config, @r###"
        SmtpConfig {
            username: "notify@new-corp.test",
            password: "password",
            host: "smtp.new-corp.test",
            port: None,
            no_tls: false,
            throttle_delay: 5s,
        }
        "###);

        let config: SmtpConfig = toml::from_str(
            r#"
        username = 'notify@new-corp.test'
        password = 'password'
        host = 'smtp.new-corp.test'
        port = 465
        no_tls = true
        throttle_delay = 30000
    "#,
        )
        .unwrap();
        assert_debug_snapshot!(config, @r###"
        SmtpConfig {
            username: "notify@new-corp.test",
            password: "password",
            host: "smtp.new-corp.test",
            port: Some(
                465,
            ),
            no_tls: true,
            throttle_delay: 30s,
        }
        "###);
    }
}

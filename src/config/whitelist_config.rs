use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for the sender whitelist gate.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WhitelistConfig {
    /// Feature flag; when `false` the whitelist validator is a no-op.
    pub enabled: bool,
    /// Link shown/sent to senders who aren't enrolled yet.
    pub signup_url: Url,
    /// Base URL used to build the single-use verification link sent to new senders.
    pub frontend_url: Url,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signup_url: Url::parse("https://mxtoai.com/whitelist")
                .expect("Cannot parse default whitelist signup URL."),
            frontend_url: Url::parse("https://mxtoai.com")
                .expect("Cannot parse default frontend URL."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WhitelistConfig;
    use insta::assert_toml_snapshot;

    #[test]
    fn serialization_and_default() {
        assert_toml_snapshot!(WhitelistConfig::default(), @r###"
        enabled = true
        signup_url = 'https://mxtoai.com/whitelist'
        frontend_url = 'https://mxtoai.com/'
        "###);
    }
}

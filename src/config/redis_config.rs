use serde::{Deserialize, Serialize};

/// Configuration for the shared key-value store used by the rate limiter and idempotency
/// ledger (see the ambient stack notes for why this is kept separate from the relational `db`).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

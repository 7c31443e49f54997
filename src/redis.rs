use anyhow::Context;
use redis::{aio::ConnectionManager, AsyncCommands, Script};

/// Thin wrapper around a multiplexed Redis connection shared by the rate limiter and the
/// idempotency ledger - the only two pieces of this system's state that need atomic
/// server-side counters rather than a relational transaction.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

/// Increments the counter at `KEYS[1]`, setting its expiry to `ARGV[1]` seconds only the first
/// time it is created, and returns the post-increment value - all in one round trip so that no
/// caller ever observes (or races with) a counter that has been incremented but not yet bounded.
const INCR_AND_EXPIRE: &str = r#"
local value = redis.call("INCR", KEYS[1])
if value == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return value
"#;

impl RedisStore {
    /// Connects to the shared key-value store.
    pub async fn create(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).with_context(|| "Failed to create Redis client.")?;
        let connection = client
            .get_connection_manager()
            .await
            .with_context(|| "Failed to connect to Redis.")?;
        Ok(Self { connection })
    }

    /// Atomically increments `key`, arming its expiry on first creation, and returns the
    /// post-increment value.
    pub async fn increment_and_expire(&self, key: &str, ttl_seconds: u64) -> anyhow::Result<i64> {
        let mut connection = self.connection.clone();
        let value = Script::new(INCR_AND_EXPIRE)
            .key(key)
            .arg(ttl_seconds)
            .invoke_async(&mut connection)
            .await
            .with_context(|| format!("Failed to increment rate-limit counter `{key}`."))?;
        Ok(value)
    }

    /// Writes `key = value` only if `key` is absent, arming a TTL. Returns `true` if the write
    /// happened (the key was absent), `false` if it already existed.
    pub async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<bool> {
        let mut connection = self.connection.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut connection)
            .await
            .with_context(|| format!("Failed to set-if-absent key `{key}`."))?;
        Ok(result.is_some())
    }

    /// Unconditionally overwrites `key = value`, re-arming its TTL.
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .with_context(|| format!("Failed to set key `{key}`."))?;
        Ok(())
    }

    /// Returns the current value of `key`, if any.
    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value = connection
            .get(key)
            .await
            .with_context(|| format!("Failed to read key `{key}`."))?;
        Ok(value)
    }

    /// Deletes `key`. Used only by tests to reset state between runs against a shared instance.
    #[cfg(test)]
    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(key)
            .await
            .with_context(|| format!("Failed to delete key `{key}`."))?;
        Ok(())
    }
}

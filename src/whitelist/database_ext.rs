use crate::{
    database::Database,
    whitelist::{WhitelistEntry, WhitelistState},
};
use anyhow::Context;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
struct RawWhitelistEntry {
    email: String,
    verified: bool,
    verification_token: Uuid,
}

impl From<RawWhitelistEntry> for WhitelistEntry {
    fn from(raw: RawWhitelistEntry) -> Self {
        Self {
            email: raw.email,
            verified: raw.verified,
            verification_token: raw.verification_token,
        }
    }
}

/// Whitelist CRUD. Kept minimal: this system doesn't expose sign-up/verification HTTP
/// routes of its own (those live on the surface the whitelist tool's signup/frontend URLs point
/// at), only the read path the ingress pipeline gates on, and a write path an operator-facing
/// tool could use to pre-approve a sender.
impl Database {
    /// Returns the whitelist state for the (lowercased) sender address.
    pub async fn whitelist_state(&self, normalized_sender: &str) -> anyhow::Result<WhitelistState> {
        let raw = sqlx::query_as::<_, RawWhitelistEntry>(
            "SELECT email, verified, verification_token FROM whitelist_entries WHERE email = $1",
        )
        .bind(normalized_sender)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| "Failed to fetch whitelist entry.")?;

        Ok(match raw {
            None => WhitelistState::NotFound,
            Some(entry) if entry.verified => WhitelistState::Verified,
            Some(_) => WhitelistState::Unverified,
        })
    }

    /// Inserts a new unverified whitelist entry for `normalized_sender`, returning the
    /// verification token to include in the outbound verification email. A no-op (returning the
    /// existing token) if the sender already has an entry.
    pub async fn whitelist_sender(&self, normalized_sender: &str) -> anyhow::Result<Uuid> {
        let now = Database::utc_now()?;
        let verification_token = Uuid::new_v4();
        let (token,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO whitelist_entries (email, verified, verification_token, created_at, updated_at)
            VALUES ($1, FALSE, $2, $3, $3)
            ON CONFLICT (email) DO UPDATE SET email = whitelist_entries.email
            RETURNING verification_token
            "#,
        )
        .bind(normalized_sender)
        .bind(verification_token)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| "Failed to insert whitelist entry.")?;

        Ok(token)
    }

    /// Marks a whitelist entry verified, given the token sent out in the verification email.
    /// Returns `false` if no entry matches the email/token pair.
    pub async fn verify_whitelist_entry(
        &self,
        normalized_sender: &str,
        verification_token: Uuid,
    ) -> anyhow::Result<bool> {
        let now = Database::utc_now()?;
        let result = sqlx::query(
            r#"
            UPDATE whitelist_entries SET verified = TRUE, updated_at = $3
            WHERE email = $1 AND verification_token = $2
            "#,
        )
        .bind(normalized_sender)
        .bind(verification_token)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to verify whitelist entry.")?;

        Ok(result.rows_affected() > 0)
    }
}

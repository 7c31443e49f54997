mod database_ext;

use uuid::Uuid;

/// State of a sender's whitelist entry: a two-state gate on top of plain existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistState {
    /// No row for this sender at all.
    NotFound,
    /// A row exists but hasn't completed verification yet.
    Unverified,
    /// A row exists and is verified.
    Verified,
}

/// A whitelist entry, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub email: String,
    pub verified: bool,
    pub verification_token: Uuid,
}

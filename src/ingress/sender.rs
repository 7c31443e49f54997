/// Normalizes a sender address for rate-limiting and idempotency purposes:
/// lowercases the whole address and strips a `+tag` suffix from the local part, so
/// `Alice+newsletter@Example.com` and `alice@example.com` are treated as the same sender.
pub fn normalize_sender(email: &str) -> String {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return email;
    };

    let local = match local.split_once('+') {
        Some((base, _tag)) => base,
        None => local,
    };

    format!("{local}@{domain}")
}

/// Returns the domain part of an email address, lowercased. Used for the per-domain hourly
/// rate-limit dimension.
pub fn domain_of(email: &str) -> Option<String> {
    email
        .trim()
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
}

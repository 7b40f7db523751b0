//! Client identity: cookie naming and token minting.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::connection::Request;
use crate::constants::COOKIE_PREFIX;

/// Hex SHA-256 of `parts` joined with `"x"`.
pub fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"x");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// The peer address followed by any `X-Forwarded-For` chain.
pub fn ip_chain(request: &Request) -> String {
    match request.header("x-forwarded-for").map(str::trim) {
        Some(forwarded) if !forwarded.is_empty() => format!("{},{forwarded}", request.ip),
        _ => request.ip.clone(),
    }
}

/// Name of the session cookie for one application and client.
///
/// Different applications, addresses and user agents never share a name, so
/// a cookie copied to another client is simply not looked at.
pub fn cookie_name(app_identity: &str, ip_chain: &str, user_agent: &str) -> String {
    format!(
        "{COOKIE_PREFIX}{}",
        digest(&[app_identity, ip_chain, user_agent])
    )
}

/// Fresh unguessable identifier for a public token or a session record.
pub(crate) fn mint_id() -> String {
    Uuid::new_v4().simple().to_string()
}

//! Current-purchaser resolution.
//!
//! The storefront derives "who is shopping" from state owned by the auth
//! module: the cached `user` profile record, or failing that the bearer
//! token's claims. Both the cart store and the checkout flow resolve
//! identity through this one collaborator so no second decode path exists.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use milkmaster_core::UserId;
use serde_json::Value;

use crate::storage::{StoragePort, keys};

/// Claim names checked, in order, for the user id inside a token payload.
const ID_CLAIMS: &[&str] = &["id", "userId", "sub"];

/// Resolves the current identity from the storage port.
///
/// Resolution is re-run on every call: a login during an anonymous session
/// changes the answer without restarting the store.
#[derive(Clone)]
pub struct IdentityResolver {
    storage: Arc<dyn StoragePort>,
}

impl IdentityResolver {
    /// Create a resolver over the given storage port.
    #[must_use]
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// The current identity, or `None` for an anonymous session.
    ///
    /// Prefers the cached `user` record's id; falls back to the bearer
    /// token's claims. Decode failures are logged and treated as anonymous.
    #[must_use]
    pub fn resolve(&self) -> Option<UserId> {
        if let Some(raw) = self.storage.get(keys::USER)
            && let Some(id) = id_from_user_record(&raw)
        {
            return Some(id);
        }

        let claims = self.token_claims()?;
        ID_CLAIMS
            .iter()
            .find_map(|claim| claim_string(&claims, claim))
            .map(UserId::new)
    }

    /// The email claim from the bearer token, if present.
    #[must_use]
    pub fn token_email(&self) -> Option<String> {
        let claims = self.token_claims()?;
        claim_string(&claims, "email")
    }

    /// Whether a bearer token is stored at all.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.storage.get(keys::TOKEN).is_some()
    }

    fn token_claims(&self) -> Option<Value> {
        let token = self.storage.get(keys::TOKEN)?;
        decode_token_claims(&token)
    }
}

/// Decode the claims object from a JWT-shaped bearer token.
///
/// Only the payload segment is read; the signature is never checked here -
/// the token is opaque to this client and validated server-side.
#[must_use]
pub fn decode_token_claims(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    // Tolerate both padded and unpadded base64url payloads
    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to decode token payload");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!(error = %e, "Token payload is not valid JSON");
            None
        }
    }
}

fn id_from_user_record(raw: &str) -> Option<UserId> {
    let record: Value = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(error = %e, "Cached user record is not valid JSON");
            return None;
        }
    };
    claim_string(&record, "id")
        .or_else(|| claim_string(&record, "_id"))
        .map(UserId::new)
}

fn claim_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! Short tenant-scoped document ids.
//!
//! Ids are 10 hex characters derived from SHA-256. Uniqueness is checked
//! against the store and retried a bounded number of times. No lock is
//! held between the check and the insert, so a collision window remains;
//! the primary key on `(tenant_id, id)` rejects the rare loser.

use chrono::Utc;
use kbase_core::AppResult;
use sha2::{Digest, Sha256};

pub const ID_LENGTH: usize = 10;
pub const MAX_ID_ATTEMPTS: usize = 10;

fn hex_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generate an id for a new document.
///
/// `exists` reports whether a candidate is already taken in the tenant.
/// After [`MAX_ID_ATTEMPTS`] taken candidates the id falls back to a
/// prefix of the seed's hash plus a millisecond timestamp suffix, which is
/// only as unique as the clock.
pub fn generate_document_id<F>(seed: &str, mut exists: F) -> AppResult<String>
where
    F: FnMut(&str) -> AppResult<bool>,
{
    for attempt in 0..MAX_ID_ATTEMPTS {
        let nonce = uuid::Uuid::new_v4();
        let candidate = hex_digest(&format!("{}:{}:{}", seed, nonce, attempt))[..ID_LENGTH].to_string();

        if !exists(&candidate)? {
            return Ok(candidate);
        }

        tracing::debug!("Document id collision on attempt {}: {}", attempt + 1, candidate);
    }

    let fallback = format!(
        "{}{:x}",
        &hex_digest(seed)[..6],
        Utc::now().timestamp_millis()
    );
    tracing::warn!(
        "Document id search exhausted after {} attempts, using fallback {}",
        MAX_ID_ATTEMPTS,
        fallback
    );
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_short_hex() {
        let id = generate_document_id("seed", |_| Ok(false)).unwrap();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_retries_until_free() {
        let mut checks = 0;
        let id = generate_document_id("seed", |_| {
            checks += 1;
            Ok(checks < 4)
        })
        .unwrap();

        assert_eq!(checks, 4);
        assert_eq!(id.len(), ID_LENGTH);
    }

    #[test]
    fn test_falls_back_after_max_attempts() {
        let mut checks = 0;
        let id = generate_document_id("seed", |_| {
            checks += 1;
            Ok(true)
        })
        .unwrap();

        assert_eq!(checks, MAX_ID_ATTEMPTS);
        assert!(id.starts_with(&hex_digest("seed")[..6]));
        assert!(id.len() > 6);
    }

    #[test]
    fn test_lookup_errors_propagate() {
        let result = generate_document_id("seed", |_| {
            Err(kbase_core::AppError::Storage("down".to_string()))
        });
        assert!(result.is_err());
    }
}

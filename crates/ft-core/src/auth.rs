//! Agent secrets
//!
//! Every agent is registered with its own random secret. The control plane
//! presents it as `api_key` on each call and the agent compares it in
//! constant time.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a secret in bytes (before hex encoding)
const SECRET_BYTES: usize = 32;

/// Generate a new agent secret (64 hex characters)
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Check a presented secret against the expected one
///
/// Both sides are hashed first so the comparison time does not depend on
/// the length of either input.
pub fn validate_secret(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }

    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_BYTES * 2);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_validate_secret() {
        let secret = generate_secret();
        assert!(validate_secret(&secret, &secret));
        assert!(!validate_secret("wrong", &secret));
        assert!(!validate_secret("", &secret));
    }

    #[test]
    fn test_empty_expected_never_matches() {
        assert!(!validate_secret("", ""));
    }
}

//! Authorization Check: salted-digest credential verification.
//!
//! The stored credential is `base64(SHA-256(salt || 0x00 || secret))`.
//! Candidates are hashed the same way and compared with
//! `subtle::ConstantTimeEq`, so comparison time does not depend on where the
//! digests differ. Candidate secrets are never logged or retained.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The comparison target for one user's secret (e.g. a 6-digit PIN).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub salt: String,
    /// Base64 SHA-256 digest produced by `hash_secret`.
    pub secret_hash: String,
}

impl Credential {
    /// Derive a credential from a plaintext secret. The plaintext is not kept.
    pub fn from_secret(user_id: impl Into<String>, salt: impl Into<String>, secret: &str) -> Self {
        let salt = salt.into();
        let secret_hash = hash_secret(&salt, secret);
        Self {
            user_id: user_id.into(),
            salt,
            secret_hash,
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        verify(candidate, self)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("secret_hash", &"<redacted>")
            .finish()
    }
}

/// Digest a secret under `salt`, base64-encoded.
pub fn hash_secret(salt: &str, secret: &str) -> String {
    BASE64.encode(digest(salt, secret))
}

/// Check `candidate` against `credential` in constant time.
///
/// A stored hash that is not valid base64 never verifies.
pub fn verify(candidate: &str, credential: &Credential) -> bool {
    let Ok(expected) = BASE64.decode(credential.secret_hash.as_bytes()) else {
        tracing::warn!(user_id = %credential.user_id, "stored credential hash is not valid base64");
        return false;
    };
    let actual = digest(&credential.salt, candidate);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn digest(salt: &str, secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update([0u8]);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Credential {
        Credential::from_secret("usr_839201", "demo-salt", "123456")
    }

    #[test]
    fn correct_secret_verifies() {
        assert!(demo().verify("123456"));
    }

    #[test]
    fn wrong_secret_rejected() {
        let cred = demo();
        assert!(!cred.verify("123457"));
        assert!(!cred.verify("12345"));
        assert!(!cred.verify(""));
        assert!(!cred.verify("1234567"));
    }

    #[test]
    fn salt_changes_digest() {
        assert_ne!(hash_secret("a", "123456"), hash_secret("b", "123456"));
        // The separator keeps salt/secret boundaries distinct.
        assert_ne!(hash_secret("ab", "c"), hash_secret("a", "bc"));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        let cred = Credential {
            user_id: "usr_1".to_string(),
            salt: "s".to_string(),
            secret_hash: "not base64!!".to_string(),
        };
        assert!(!cred.verify("123456"));
    }

    #[test]
    fn debug_output_redacts_hash() {
        let cred = demo();
        let dbg = format!("{:?}", cred);
        assert!(dbg.contains("usr_839201"));
        assert!(!dbg.contains(&cred.secret_hash));
    }
}

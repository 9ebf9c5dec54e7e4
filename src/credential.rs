//! Credential hashing and verification (Argon2, PHC strings).
//!
//! Inputs longer than 72 bytes are folded by XORing over themselves in
//! 72-byte chunks before hashing, so over-length credentials verify stably.
//! Policy checks (length, whitespace, control characters) live with the user
//! record validation; this module only turns a credential into an opaque
//! digest and checks candidates against it.

use std::borrow::Cow;

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

/// An opaque credential digest in PHC string form.
///
/// Comparing two digests with `==` says nothing about the credentials they
/// were derived from; use [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHash(String);

impl CredentialHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hash a credential. A failure here is an internal fault (entropy or digest
/// machinery), never a statement about the credential itself.
pub fn hash(credential: &str) -> Result<CredentialHash> {
    let ingest = fold_over_72(credential.as_bytes());

    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;

    let phc = Argon2::default()
        .hash_password(&ingest, &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();

    Ok(CredentialHash(phc))
}

/// Check a candidate against a digest produced by [`hash`]. Returns false
/// for a mismatch or an unparsable digest, never an error.
pub fn verify(hash: &CredentialHash, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash.as_str()) else {
        return false;
    };
    let ingest = fold_over_72(candidate.as_bytes());
    Argon2::default().verify_password(&ingest, &parsed).is_ok()
}

fn fold_over_72(data: &[u8]) -> Cow<'_, [u8]> {
    const SIZE: usize = 72;

    if data.len() <= SIZE {
        return Cow::Borrowed(data);
    }

    let mut folded = vec![0u8; SIZE];
    for (i, d) in data.iter().enumerate() {
        folded[i % SIZE] ^= d;
    }
    Cow::Owned(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let digest = hash("correct horse battery staple").unwrap();
        assert!(verify(&digest, "correct horse battery staple"));
        assert!(!verify(&digest, "correct horse battery stable"));
    }

    #[test]
    fn hashing_twice_differs_but_both_verify() {
        let a = hash("hunter2hunter2").unwrap();
        let b = hash("hunter2hunter2").unwrap();
        assert_ne!(a, b, "salts must differ");
        assert!(verify(&a, "hunter2hunter2"));
        assert!(verify(&b, "hunter2hunter2"));
    }

    #[test]
    fn over_length_input_folds_stably() {
        let long: String = std::iter::repeat('x').take(100).collect();
        let digest = hash(&long).unwrap();
        assert!(verify(&digest, &long));
        // A different over-length credential must not collide via the fold.
        let other: String = std::iter::repeat('y').take(100).collect();
        assert!(!verify(&digest, &other));
    }

    #[test]
    fn short_input_is_not_folded() {
        assert!(matches!(fold_over_72(b"short"), Cow::Borrowed(_)));
        let long = [b'a'; 73];
        assert!(matches!(fold_over_72(&long), Cow::Owned(_)));
    }

    #[test]
    fn garbage_digest_verifies_false() {
        let bogus = CredentialHash("not-a-phc-string".into());
        assert!(!verify(&bogus, "anything"));
    }
}

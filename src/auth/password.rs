//! Password hashing and verification.
//!
//! Secrets are stored as Argon2id PHC strings with a fresh salt per hash.
//! Verification is constant-time and never reveals whether the stored hash
//! exists or the secret was wrong; that mapping happens in the flow layer.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

/// Hash a plaintext secret into a PHC string with a fresh salt.
pub fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a plaintext secret against a stored PHC string.
///
/// Unparseable stored hashes verify as `false` rather than erroring; a
/// corrupted row must look exactly like a wrong password to the caller.
#[must_use]
pub fn verify_password(plaintext: &str, stored_phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Burn roughly the same work as a real verification.
///
/// Used on the "account not found" path so that lookups against absent
/// identifiers take as long as lookups against present ones.
pub fn equivalent_work() -> Result<()> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"presenza-decoy", &salt)
        .map(|_| ())
        .map_err(|err| anyhow::anyhow!("decoy hash failed: {err}"))
        .context("equivalent-work hashing")
}

#[cfg(test)]
mod tests {
    use super::{equivalent_work, hash_password, verify_password};
    use anyhow::Result;

    #[test]
    fn hash_then_verify_round_trip() -> Result<()> {
        let phc = hash_password("hunter2!")?;
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password("hunter2!", &phc));
        assert!(!verify_password("hunter3!", &phc));
        Ok(())
    }

    #[test]
    fn fresh_salt_per_hash() -> Result<()> {
        let first = hash_password("same-secret")?;
        let second = hash_password("same-secret")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn corrupted_hash_verifies_false() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn equivalent_work_succeeds() -> Result<()> {
        equivalent_work()
    }
}

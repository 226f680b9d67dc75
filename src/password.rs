//! Password hashing behind a trait seam.
//!
//! The engine never picks the algorithm; it asks the injected hasher. The
//! shipped implementation is argon2id with the crate defaults, producing PHC
//! strings. Verification is constant-time inside the argon2 implementation.

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher as _, PasswordVerifier as _};
use secrecy::{ExposeSecret, SecretString};

/// A syntactically valid argon2id digest that matches no password. Burned on
/// login attempts against unknown emails so the miss path costs the same as
/// a mismatch.
pub const DUMMY_DIGEST: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$gZiV/M1gPc22ElAH/Jh1Hw$CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zQno";

pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a self-describing digest string.
    fn hash(&self, plaintext: &SecretString) -> Result<String>;

    /// Verify a plaintext against a stored digest. Malformed digests verify
    /// as false rather than erroring; the caller treats both the same.
    fn verify(&self, plaintext: &SecretString, digest: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &SecretString) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = Argon2::default()
            .hash_password(plaintext.expose_secret().as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(digest.to_string())
    }

    fn verify(&self, plaintext: &SecretString, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.expose_secret().as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn hash_then_verify_round_trips() -> Result<()> {
        let hasher = Argon2Hasher;
        let digest = hasher.hash(&secret("CorrectHorse9!"))?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify(&secret("CorrectHorse9!"), &digest));
        assert!(!hasher.verify(&secret("wrong"), &digest));
        Ok(())
    }

    #[test]
    fn salts_differ_between_hashes() -> Result<()> {
        let hasher = Argon2Hasher;
        let first = hasher.hash(&secret("CorrectHorse9!"))?;
        let second = hasher.hash(&secret("CorrectHorse9!"))?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn malformed_digest_verifies_false() {
        let hasher = Argon2Hasher;
        assert!(!hasher.verify(&secret("anything"), "not-a-phc-string"));
    }

    #[test]
    fn dummy_digest_parses_and_matches_nothing() {
        let hasher = Argon2Hasher;
        assert!(PasswordHash::new(DUMMY_DIGEST).is_ok());
        assert!(!hasher.verify(&secret("password"), DUMMY_DIGEST));
    }
}

//! Token codec: raw single-use tokens and their stored fingerprints.
//!
//! The raw token is handed to the user inside an activation or reset link and
//! is never stored; the database keeps only its SHA-256 fingerprint. Changing
//! the digest would invalidate every outstanding token, so the derivation is
//! fixed here in one place.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

/// Raw token length in bytes (256 bits of entropy).
const RAW_TOKEN_BYTES: usize = 32;

/// One-way digest of a raw token, safe to persist and index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Rebuild a fingerprint from its stored byte form.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Rebuild from a database column, rejecting malformed widths.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .context("token fingerprint column is not 32 bytes")?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Log-safe short prefix; the full digest stays out of events.
        write!(
            f,
            "Fingerprint({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Mint a new raw token and its fingerprint.
///
/// The raw value goes into the emailed link and is never stored or logged.
pub fn issue() -> Result<(String, Fingerprint)> {
    let mut bytes = [0u8; RAW_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate raw token")?;
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    let fingerprint = fingerprint_of(&raw);
    Ok((raw, fingerprint))
}

/// Derive the stored fingerprint of a raw token.
///
/// Deterministic and identical to the derivation used by [`issue`]; token
/// lookups at verification time depend on that.
#[must_use]
pub fn fingerprint_of(raw: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    Fingerprint(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn issue_produces_256_bits_of_entropy() {
        let decoded_len = issue()
            .ok()
            .and_then(|(raw, _)| URL_SAFE_NO_PAD.decode(raw.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn fingerprint_matches_issuance_derivation() -> anyhow::Result<()> {
        let (raw, fingerprint) = issue()?;
        assert_eq!(fingerprint_of(&raw), fingerprint);
        Ok(())
    }

    #[test]
    fn fingerprint_is_deterministic_and_distinct() {
        let first = fingerprint_of("token");
        let second = fingerprint_of("token");
        let different = fingerprint_of("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn distinct_tokens_do_not_collide() -> anyhow::Result<()> {
        let (first_raw, first) = issue()?;
        let (second_raw, second) = issue()?;
        assert_ne!(first_raw, second_raw);
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn fingerprint_round_trips_through_bytes() {
        let fingerprint = fingerprint_of("token");
        let restored = Fingerprint::from_slice(fingerprint.as_bytes()).unwrap();
        assert_eq!(restored, fingerprint);
        assert!(Fingerprint::from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn debug_output_hides_the_full_digest() {
        let fingerprint = fingerprint_of("token");
        let rendered = format!("{fingerprint:?}");
        assert!(rendered.starts_with("Fingerprint("));
        assert!(rendered.len() < 24);
    }
}

//! Persistence seam for accounts, tokens, and profiles.
//!
//! [`Store::begin`] opens a [`StoreTx`] unit of work. Every engine workflow
//! runs inside exactly one `StoreTx`, which is what makes token consumption
//! at-most-once: validation and revocation of a token always commit or fail
//! together. Dropping an uncommitted `StoreTx` rolls it back.
//!
//! Two implementations ship with the crate: [`postgres::PgStore`] for real
//! deployments and [`memory::MemoryStore`], which serializes transactions
//! behind a single lock and backs the workflow tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Account, IssuedToken, ProfileUpdate, TokenKind, UserProfile};
use crate::token::Fingerprint;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (email already taken).
    #[error("unique constraint violated")]
    UniqueViolation,

    /// An update targeted a row that does not exist or is soft-deleted.
    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work. All reads and writes inside it observe each
    /// other; nothing is visible to other transactions until `commit`.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// One transactional unit of work.
///
/// Mutating operations return the updated record where the engine needs it.
/// "Alive" means not soft-deleted for accounts and profiles, and not revoked
/// for tokens.
#[async_trait]
pub trait StoreTx: Send {
    // -- accounts -----------------------------------------------------------

    /// Insert a new account: inactive, unverified, first-login set, status
    /// pending. Fails with [`StoreError::UniqueViolation`] when the
    /// normalized email is already taken.
    async fn insert_account(
        &mut self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    async fn find_account(&mut self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Look up an alive account by normalized email.
    async fn find_account_by_email(&mut self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Flip the account to active and email-verified.
    async fn set_account_active(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Record a successful login at `now`.
    async fn record_login(&mut self, id: Uuid, now: DateTime<Utc>)
        -> Result<Account, StoreError>;

    /// Replace the password hash and stamp `password_updated_at`.
    async fn update_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Clear the first-login flag.
    async fn clear_first_login(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    // -- tokens -------------------------------------------------------------

    async fn insert_token(
        &mut self,
        account_id: Uuid,
        kind: TokenKind,
        fingerprint: &Fingerprint,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, StoreError>;

    /// Match fingerprint + kind + unexpired + unrevoked. Expired-but-
    /// unrevoked rows are treated identically to absent rows. The returned
    /// token is locked for the remainder of the transaction, so a concurrent
    /// consumer of the same token serializes behind this call and re-observes
    /// the predicate after commit.
    async fn find_active_token(
        &mut self,
        fingerprint: &Fingerprint,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<IssuedToken>, StoreError>;

    /// Soft-delete a token. Idempotent: revoking twice is a no-op.
    async fn revoke_token(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Revoke every alive token of `kind` belonging to the account; returns
    /// how many were revoked.
    async fn revoke_tokens_for(
        &mut self,
        account_id: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // -- profiles -----------------------------------------------------------

    async fn find_profile(&mut self, account_id: Uuid)
        -> Result<Option<UserProfile>, StoreError>;

    async fn insert_profile(
        &mut self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError>;

    /// Apply the non-`None` fields of `update` to the profile.
    async fn update_profile(
        &mut self,
        account_id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError>;

    /// Commit the unit of work. Dropping without committing rolls back.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

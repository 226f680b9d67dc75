//! In-memory store for tests and local development.
//!
//! Transactions serialize behind a single async lock, which trivially gives
//! the same at-most-once token consumption as the Postgres row lock: a
//! concurrent consumer waits for the lock and then observes the token as
//! revoked. Writes apply immediately; dropping a transaction only releases
//! the lock, so this store is not suitable where genuine rollback matters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{Account, AccountStatus, IssuedToken, ProfileUpdate, TokenKind, UserProfile};
use crate::token::Fingerprint;

use super::{Store, StoreError, StoreTx};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    tokens: HashMap<Uuid, IssuedToken>,
    profiles: HashMap<Uuid, UserProfile>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTx { state: guard }))
    }
}

pub struct MemoryTx {
    state: OwnedMutexGuard<State>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_account(
        &mut self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        if self.state.accounts.values().any(|a| a.email == email) {
            return Err(StoreError::UniqueViolation);
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active: false,
            is_email_verified: false,
            is_first_login: true,
            status: AccountStatus::PendingVerification,
            password_updated_at: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&mut self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.state.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&mut self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .state
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn set_account_active(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let account = self.state.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.is_active = true;
        account.is_email_verified = true;
        account.status = AccountStatus::Active;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn record_login(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let account = self.state.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.last_login_at = Some(now);
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn update_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let account = self.state.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.password_hash = password_hash.to_string();
        account.password_updated_at = Some(now);
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn clear_first_login(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let account = self.state.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.is_first_login = false;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn insert_token(
        &mut self,
        account_id: Uuid,
        kind: TokenKind,
        fingerprint: &Fingerprint,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, StoreError> {
        let token = IssuedToken {
            id: Uuid::new_v4(),
            account_id,
            fingerprint: *fingerprint,
            kind,
            expires_at,
            revoked_at: None,
            created_at: now,
        };
        self.state.tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn find_active_token(
        &mut self,
        fingerprint: &Fingerprint,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<IssuedToken>, StoreError> {
        Ok(self
            .state
            .tokens
            .values()
            .find(|t| t.fingerprint == *fingerprint && t.kind == kind && t.is_alive(now))
            .cloned())
    }

    async fn revoke_token(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(token) = self.state.tokens.get_mut(&id) {
            if token.revoked_at.is_none() {
                token.revoked_at = Some(now);
            }
        }
        Ok(())
    }

    async fn revoke_tokens_for(
        &mut self,
        account_id: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for token in self.state.tokens.values_mut() {
            if token.account_id == account_id && token.kind == kind && token.is_alive(now) {
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_profile(
        &mut self,
        account_id: Uuid,
    ) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.state.profiles.get(&account_id).cloned())
    }

    async fn insert_profile(
        &mut self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        if self.state.profiles.contains_key(&account_id) {
            return Err(StoreError::UniqueViolation);
        }
        let profile = UserProfile {
            account_id,
            display_name: None,
            bio: None,
            avatar_ref: None,
            email_opt_in: true,
            is_public: false,
            created_at: now,
            updated_at: now,
        };
        self.state.profiles.insert(account_id, profile.clone());
        Ok(profile)
    }

    async fn update_profile(
        &mut self,
        account_id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let profile = self
            .state
            .profiles
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound)?;
        if let Some(display_name) = &update.display_name {
            profile.display_name = Some(display_name.clone());
        }
        if let Some(bio) = &update.bio {
            profile.bio = Some(bio.clone());
        }
        if let Some(avatar_ref) = &update.avatar_ref {
            profile.avatar_ref = Some(avatar_ref.clone());
        }
        if let Some(email_opt_in) = update.email_opt_in {
            profile.email_opt_in = email_opt_in;
        }
        if let Some(is_public) = update.is_public {
            profile.is_public = is_public;
        }
        profile.updated_at = now;
        Ok(profile.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // Writes are already visible; committing releases the lock.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn email_uniqueness_is_enforced() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut tx = store.begin().await?;
        tx.insert_account("a@example.com", "hash", now).await?;
        let duplicate = tx.insert_account("a@example.com", "hash2", now).await;
        assert!(matches!(duplicate, Err(StoreError::UniqueViolation)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_tokens_are_absent_from_active_lookup() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let fingerprint = crate::token::fingerprint_of("raw");
        let mut tx = store.begin().await?;
        let account = tx.insert_account("a@example.com", "hash", now).await?;
        tx.insert_token(
            account.id,
            TokenKind::Activation,
            &fingerprint,
            now + Duration::hours(1),
            now,
        )
        .await?;

        let found = tx
            .find_active_token(&fingerprint, TokenKind::Activation, now)
            .await?;
        assert!(found.is_some());

        let later = now + Duration::hours(2);
        let found = tx
            .find_active_token(&fingerprint, TokenKind::Activation, later)
            .await?;
        assert!(found.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_keeps_first_timestamp() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let fingerprint = crate::token::fingerprint_of("raw");
        let mut tx = store.begin().await?;
        let account = tx.insert_account("a@example.com", "hash", now).await?;
        let token = tx
            .insert_token(
                account.id,
                TokenKind::PasswordReset,
                &fingerprint,
                now + Duration::hours(1),
                now,
            )
            .await?;

        tx.revoke_token(token.id, now).await?;
        tx.revoke_token(token.id, now + Duration::minutes(5)).await?;

        let found = tx
            .find_active_token(&fingerprint, TokenKind::PasswordReset, now)
            .await?;
        assert!(found.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_tokens_for_skips_other_kinds() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut tx = store.begin().await?;
        let account = tx.insert_account("a@example.com", "hash", now).await?;
        let reset_fp = crate::token::fingerprint_of("reset");
        let activation_fp = crate::token::fingerprint_of("activation");
        tx.insert_token(
            account.id,
            TokenKind::PasswordReset,
            &reset_fp,
            now + Duration::hours(1),
            now,
        )
        .await?;
        tx.insert_token(
            account.id,
            TokenKind::Activation,
            &activation_fp,
            now + Duration::hours(1),
            now,
        )
        .await?;

        let revoked = tx
            .revoke_tokens_for(account.id, TokenKind::PasswordReset, now)
            .await?;
        assert_eq!(revoked, 1);
        let activation = tx
            .find_active_token(&activation_fp, TokenKind::Activation, now)
            .await?;
        assert!(activation.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn profile_update_leaves_untouched_fields() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut tx = store.begin().await?;
        let account = tx.insert_account("a@example.com", "hash", now).await?;
        tx.insert_profile(account.id, now).await?;
        tx.update_profile(
            account.id,
            &ProfileUpdate {
                display_name: Some("Alice".to_string()),
                ..ProfileUpdate::default()
            },
            now,
        )
        .await?;
        let profile = tx
            .update_profile(
                account.id,
                &ProfileUpdate {
                    bio: Some("hello".to_string()),
                    ..ProfileUpdate::default()
                },
                now,
            )
            .await?;
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.bio.as_deref(), Some("hello"));
        Ok(())
    }
}

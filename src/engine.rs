//! Credential engine: the account workflows and their error taxonomy.
//!
//! Every token workflow runs against exactly one store transaction. Token
//! validation and revocation always share that transaction, which is what
//! makes a token's consumption at-most-once under concurrency: of two
//! simultaneous consumers, the loser re-observes the token as revoked and
//! fails with the invalid-token error for its flow.
//!
//! Email delivery happens strictly after commit. A registration whose
//! activation email bounces is still a registration; the resend flow covers
//! the gap. (The alternative — aborting the registration on a mail failure —
//! would let a flaky provider destroy valid signups.)

use chrono::Duration;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::avatar::AvatarStorage;
use crate::clock::Clock;
use crate::config::AccountConfig;
use crate::email::{build_activation_url, build_reset_url, normalize_email};
use crate::error::EngineError;
use crate::models::{Account, ProfileUpdate, TokenKind};
use crate::notify::{Notifier, TEMPLATE_ACTIVATION, TEMPLATE_PASSWORD_RESET};
use crate::password::{PasswordHasher, DUMMY_DIGEST};
use crate::sessions::SessionRevoker;
use crate::store::{Store, StoreError};
use crate::token;

/// Input to [`CredentialEngine::register`]. The form layer has already
/// validated shape; the engine normalizes the email and hashes the password.
pub struct NewRegistration {
    pub email: String,
    pub password: SecretString,
    pub display_name: Option<String>,
}

/// Successful login. The caller establishes the session and branches the
/// redirect on `requires_initial_setup`.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub account: Account,
    pub requires_initial_setup: bool,
}

/// Avatar payload forwarded to the storage collaborator during initial
/// setup.
#[derive(Clone, Debug)]
pub struct AvatarUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct CredentialEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    sessions: Arc<dyn SessionRevoker>,
    avatars: Arc<dyn AvatarStorage>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    config: AccountConfig,
}

impl CredentialEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        sessions: Arc<dyn SessionRevoker>,
        avatars: Arc<dyn AvatarStorage>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
        config: AccountConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            sessions,
            avatars,
            hasher,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Create an inactive account, its profile, and an activation token in
    /// one transaction, then email the activation link.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateEmail`] when the normalized email is taken.
    /// [`EngineError::Notification`] when the email send fails — the
    /// registration itself is already committed and stays.
    pub async fn register(&self, registration: NewRegistration) -> Result<Account, EngineError> {
        let email = normalize_email(&registration.email);
        let password_hash = self.hasher.hash(&registration.password)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let account = match tx.insert_account(&email, &password_hash, now).await {
            Ok(account) => account,
            Err(StoreError::UniqueViolation) => return Err(EngineError::DuplicateEmail),
            Err(err) => return Err(err.into()),
        };
        // Profile creation is an explicit registration step rather than a
        // storage-side trigger, so the whole account shape commits together.
        tx.insert_profile(account.id, now).await?;
        if let Some(display_name) = registration.display_name {
            tx.update_profile(
                account.id,
                &ProfileUpdate {
                    display_name: Some(display_name),
                    ..ProfileUpdate::default()
                },
                now,
            )
            .await?;
        }
        let (raw_token, fingerprint) = token::issue()?;
        let expires_at = now + Duration::seconds(self.config.activation_ttl_seconds());
        tx.insert_token(account.id, TokenKind::Activation, &fingerprint, expires_at, now)
            .await?;
        tx.commit().await?;

        info!(account_id = %account.id, "registered new account");

        self.send_activation_email(&account, &raw_token)?;
        Ok(account)
    }

    /// Consume an activation token and activate its account. Either branch
    /// leaves the token revoked: a still-valid token presented for an
    /// already-active account is revoked before `AlreadyActive` is returned,
    /// and a consumed token simply fails lookup as `TokenInvalid`.
    pub async fn activate(&self, raw_token: &str) -> Result<Account, EngineError> {
        let fingerprint = token::fingerprint_of(raw_token.trim());
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let Some(issued) = tx
            .find_active_token(&fingerprint, TokenKind::Activation, now)
            .await?
        else {
            return Err(EngineError::TokenInvalid);
        };
        let account = tx
            .find_account(issued.account_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        if account.is_active {
            tx.revoke_token(issued.id, now).await?;
            tx.commit().await?;
            return Err(EngineError::AlreadyActive);
        }
        let account = tx.set_account_active(account.id, now).await?;
        tx.revoke_token(issued.id, now).await?;
        tx.commit().await?;

        info!(account_id = %account.id, "account activated");
        Ok(account)
    }

    /// Mint and mail a fresh activation token. Opaque: reports success
    /// whether or not the email maps to an account awaiting activation.
    pub async fn resend_activation(&self, email: &str) -> Result<(), EngineError> {
        let email = normalize_email(email);
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let Some(account) = tx.find_account_by_email(&email).await? else {
            debug!("activation resend for unknown email ignored");
            return Ok(());
        };
        if account.is_active {
            return Ok(());
        }
        let (raw_token, fingerprint) = token::issue()?;
        let expires_at = now + Duration::seconds(self.config.activation_ttl_seconds());
        tx.insert_token(account.id, TokenKind::Activation, &fingerprint, expires_at, now)
            .await?;
        tx.commit().await?;

        self.send_activation_email(&account, &raw_token)
    }

    /// Authenticate by email and password.
    ///
    /// # Errors
    ///
    /// [`EngineError::AuthenticationFailed`] for an unknown email or a wrong
    /// password, indistinguishably. [`EngineError::AccountLocked`] when the
    /// credentials are valid but the account is inactive.
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, EngineError> {
        let email = normalize_email(email);

        // Read-only lookup in its own transaction; the slow KDF must never
        // run inside the store's critical section.
        let account = {
            let mut tx = self.store.begin().await?;
            tx.find_account_by_email(&email).await?
        };
        let Some(account) = account else {
            // Burn a verification so the miss costs the same as a mismatch.
            let _ = self.hasher.verify(password, DUMMY_DIGEST);
            return Err(EngineError::AuthenticationFailed);
        };
        if !self.hasher.verify(password, &account.password_hash) {
            return Err(EngineError::AuthenticationFailed);
        }
        if !account.is_active {
            return Err(EngineError::AccountLocked);
        }
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let account = tx.record_login(account.id, now).await?;
        tx.commit().await?;

        Ok(LoginOutcome {
            requires_initial_setup: account.is_first_login,
            account,
        })
    }

    /// Mint a reset token and mail the reset link. Opaque: returns `Ok` for
    /// unknown emails and inactive accounts without doing anything, so the
    /// response cannot be used to enumerate accounts. Internal persistence
    /// and notification failures still surface for logging.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), EngineError> {
        let email = normalize_email(email);
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let Some(account) = tx.find_account_by_email(&email).await? else {
            debug!("password reset for unknown email ignored");
            return Ok(());
        };
        if !account.is_active {
            return Ok(());
        }
        if self.config.revoke_prior_reset_tokens() {
            let revoked = tx
                .revoke_tokens_for(account.id, TokenKind::PasswordReset, now)
                .await?;
            if revoked > 0 {
                debug!(account_id = %account.id, revoked, "revoked outstanding reset tokens");
            }
        }
        let (raw_token, fingerprint) = token::issue()?;
        let expires_at = now + Duration::seconds(self.config.reset_ttl_seconds());
        tx.insert_token(
            account.id,
            TokenKind::PasswordReset,
            &fingerprint,
            expires_at,
            now,
        )
        .await?;
        let display_name = tx
            .find_profile(account.id)
            .await?
            .and_then(|profile| profile.display_name);
        tx.commit().await?;

        let params = json!({
            "app_name": self.config.app_name(),
            "display_name": display_name,
            "reset_url": build_reset_url(self.config.base_url(), &raw_token),
            "expires_in_hours": hours(self.config.reset_ttl_seconds()),
        });
        self.notifier
            .send(TEMPLATE_PASSWORD_RESET, &account.email, &params)
            .map_err(|err| {
                error!(account_id = %account.id, "password reset email failed: {err}");
                EngineError::Notification(err)
            })
    }

    /// Consume a reset token, replace the password, and terminate every live
    /// session for the account. The token and password change commit
    /// together; session revocation runs after commit and is best-effort —
    /// a partially revoked session set is an acceptable degraded state, an
    /// unrecoverable password change is not.
    pub async fn confirm_password_reset(
        &self,
        raw_token: &str,
        new_password: &SecretString,
    ) -> Result<Account, EngineError> {
        let fingerprint = token::fingerprint_of(raw_token.trim());
        // Hash before the transaction opens; the KDF is deliberately slow
        // and must not sit inside the store's critical section.
        let password_hash = self.hasher.hash(new_password)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let Some(issued) = tx
            .find_active_token(&fingerprint, TokenKind::PasswordReset, now)
            .await?
        else {
            return Err(EngineError::PasswordResetTokenInvalid);
        };
        let account = tx
            .update_password(issued.account_id, &password_hash, now)
            .await?;
        tx.revoke_token(issued.id, now).await?;
        tx.commit().await?;

        info!(account_id = %account.id, "password reset completed");

        match self.sessions.revoke_all(account.id).await {
            Ok(count) => {
                info!(account_id = %account.id, count, "revoked sessions after password reset");
            }
            Err(err) => {
                warn!(account_id = %account.id, "session revocation failed: {err:#}");
            }
        }
        Ok(account)
    }

    /// First-login setup: ensure the profile exists, store the avatar,
    /// apply the field updates, and clear the first-login flag. Idempotent —
    /// a second call updates fields without touching the already-cleared
    /// flag.
    pub async fn initial_setup(
        &self,
        account_id: Uuid,
        mut update: ProfileUpdate,
        avatar: Option<AvatarUpload>,
    ) -> Result<Account, EngineError> {
        // Upload first: no external call inside the store transaction.
        if let Some(upload) = avatar {
            let avatar_ref = self
                .avatars
                .store(account_id, &upload.file_name, &upload.bytes)?;
            update.avatar_ref = Some(avatar_ref);
        }
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let account = tx
            .find_account(account_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        // Registration creates the profile; recreate defensively if absent.
        if tx.find_profile(account_id).await?.is_none() {
            tx.insert_profile(account_id, now).await?;
        }
        tx.update_profile(account_id, &update, now).await?;
        let account = if account.is_first_login {
            tx.clear_first_login(account_id, now).await?
        } else {
            account
        };
        tx.commit().await?;

        Ok(account)
    }

    fn send_activation_email(
        &self,
        account: &Account,
        raw_token: &str,
    ) -> Result<(), EngineError> {
        let params = json!({
            "app_name": self.config.app_name(),
            "activation_url": build_activation_url(self.config.base_url(), raw_token),
            "expires_in_hours": hours(self.config.activation_ttl_seconds()),
        });
        self.notifier
            .send(TEMPLATE_ACTIVATION, &account.email, &params)
            .map_err(|err| {
                error!(account_id = %account.id, "activation email failed: {err}");
                EngineError::Notification(err)
            })
    }
}

#[allow(clippy::cast_precision_loss)]
fn hours(seconds: i64) -> f64 {
    seconds as f64 / 3600.0
}

//! Error taxonomy surfaced by the credential engine.
//!
//! Validation of malformed input happens in the form layer before the engine
//! is invoked; everything here is a workflow-level outcome. Two deliberate
//! asymmetries:
//!
//! - [`EngineError::AuthenticationFailed`] never distinguishes a missing
//!   account from a wrong password, so login responses cannot be used to
//!   enumerate accounts.
//! - [`EngineError::AccountLocked`] is distinct: once credentials are known
//!   to be valid, state problems are reported honestly to the legitimate
//!   user.
//!
//! [`EngineError::Persistence`] redacts: its `Display` is a fixed message
//! and the storage-driver detail stays on `source()` for logging, so raw
//! SQL/driver text never crosses into user-facing layers.

use crate::notify::NotifyError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Registration hit the unique constraint on email.
    #[error("an account with this email address already exists")]
    DuplicateEmail,

    /// Missing account or wrong password; intentionally indistinguishable.
    #[error("invalid email address or password")]
    AuthenticationFailed,

    /// Credentials were valid but the account cannot log in.
    #[error("this account is not active")]
    AccountLocked,

    /// Activation token missing, expired, or already consumed; the three
    /// cases are deliberately collapsed.
    #[error("the activation token is invalid or has expired")]
    TokenInvalid,

    /// A still-valid activation token was presented for an account that is
    /// already active. The token is revoked before this is returned.
    #[error("this account is already active")]
    AlreadyActive,

    /// Reset token missing, expired, or already consumed. Distinct from
    /// [`EngineError::TokenInvalid`] so callers can route the two flows.
    #[error("the password reset token is invalid or has expired")]
    PasswordResetTokenInvalid,

    /// The notifier refused or failed delivery. State committed before the
    /// send is kept; see the registration workflow.
    #[error("failed to send notification email")]
    Notification(#[source] NotifyError),

    /// Any storage or internal failure, redacted. Unclassified errors
    /// collapse into this variant.
    #[error("persistence failure")]
    Persistence(#[source] StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Persistence(err)
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(StoreError::Backend(err))
    }
}

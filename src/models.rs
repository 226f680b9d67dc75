//! Domain records persisted by the store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::token::Fingerprint;

/// Lifecycle status of an account, independent of the `is_active` login gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountStatus {
    PendingVerification,
    Active,
    Suspended,
    Closed,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_verification" => Some(Self::PendingVerification),
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A user account. `email` is stored normalized (trimmed, lowercase) and is
/// unique among non-deleted rows.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// Login gate. An account with `is_active == false` can never complete
    /// login, regardless of credentials.
    pub is_active: bool,
    pub is_email_verified: bool,
    /// Set at registration, cleared by the first-login initial setup.
    pub is_first_login: bool,
    pub status: AccountStatus,
    pub password_updated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an issued token authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Activation,
    PasswordReset,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::PasswordReset => "password_reset",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "activation" => Some(Self::Activation),
            "password_reset" => Some(Self::PasswordReset),
            _ => None,
        }
    }
}

/// A single-use token record. Only the fingerprint of the raw token is
/// stored; `revoked_at` is the soft-delete marker set on consumption.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub id: Uuid,
    pub account_id: Uuid,
    pub fingerprint: Fingerprint,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Whether the token can still authorize anything at `now`.
    #[must_use]
    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Profile row, 1:1 with [`Account`]. Created during registration; the
/// first-login setup flow fills it in.
#[derive(Clone, Debug)]
pub struct UserProfile {
    pub account_id: Uuid,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    /// Opaque reference returned by the avatar storage collaborator.
    pub avatar_ref: Option<String>,
    pub email_opt_in: bool,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_ref: Option<String>,
    pub email_opt_in: Option<bool>,
    pub is_public: Option<bool>,
}

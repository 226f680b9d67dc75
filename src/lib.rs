//! # Monban (Account Credential & Token Lifecycle Engine)
//!
//! `monban` is the account subsystem core for a web application: registration,
//! email activation, login, password reset, and first-login profile setup.
//! The web layer (routing, forms, session cookies, HTML) lives elsewhere and
//! talks to this crate through [`engine::CredentialEngine`].
//!
//! ## Tokens
//!
//! Activation and password-reset links carry an opaque **raw token**: 32 bytes
//! of OS entropy, URL-safe base64. The database only ever sees its SHA-256
//! **fingerprint**, so a dump of stored data cannot be replayed into valid
//! links. Tokens are single-use: any workflow that validates a token revokes
//! it in the same transaction, and an expired token is indistinguishable from
//! an absent one in every caller-facing error.
//!
//! ## Account state
//!
//! Accounts are created inactive (`pending`). Activation flips them to
//! `active`; an inactive account can never complete login. A successful
//! password reset updates the hash, revokes the reset token, and terminates
//! every live session for the account.
//!
//! ## Enumeration resistance
//!
//! Login failures never reveal whether the email or the password was wrong,
//! and password-reset requests (like activation resends) report success
//! whether or not the address maps to an account.
//!
//! ## Collaborators
//!
//! Persistence ([`store::Store`]), email delivery ([`notify::Notifier`]),
//! session revocation ([`sessions::SessionRevoker`]), avatar storage
//! ([`avatar::AvatarStorage`]), password hashing
//! ([`password::PasswordHasher`]), and time ([`clock::Clock`]) are all trait
//! seams; Postgres-backed implementations ship alongside in-memory and
//! logging ones for tests and local development.

pub mod avatar;
pub mod clock;
pub mod config;
pub mod email;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod password;
pub mod sessions;
pub mod store;
pub mod token;
pub mod worker;

pub use config::AccountConfig;
pub use engine::{AvatarUpload, CredentialEngine, LoginOutcome, NewRegistration};
pub use error::EngineError;
pub use models::{Account, AccountStatus, IssuedToken, TokenKind, UserProfile};

//! Postgres-backed store.
//!
//! Expected tables (migrations are owned by the embedding service, following
//! the project-wide audit convention of `created_at`/`updated_at` plus a
//! soft-delete timestamp):
//!
//! - `accounts(id UUID PK, email TEXT UNIQUE, password_hash TEXT,
//!   is_active BOOL, is_email_verified BOOL, is_first_login BOOL,
//!   status TEXT, password_updated_at TIMESTAMPTZ NULL,
//!   last_login_at TIMESTAMPTZ NULL, created_at, updated_at,
//!   deleted_at TIMESTAMPTZ NULL)`
//! - `issued_tokens(id UUID PK, account_id UUID FK, fingerprint BYTEA,
//!   kind TEXT, expires_at TIMESTAMPTZ, revoked_at TIMESTAMPTZ NULL,
//!   created_at)`
//! - `user_profiles(account_id UUID PK FK, display_name TEXT NULL,
//!   bio TEXT NULL, avatar_ref TEXT NULL, email_opt_in BOOL,
//!   is_public BOOL, created_at, updated_at, deleted_at TIMESTAMPTZ NULL)`

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::models::{Account, AccountStatus, IssuedToken, ProfileUpdate, TokenKind, UserProfile};
use crate::token::Fingerprint;

use super::{Store, StoreError, StoreTx};

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn classify(err: sqlx::Error, what: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::UniqueViolation
    } else {
        StoreError::Backend(anyhow::Error::new(err).context(what))
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let status: String = row.get("status");
    let status = AccountStatus::parse(&status)
        .ok_or_else(|| StoreError::Backend(anyhow!("unknown account status: {status}")))?;
    Ok(Account {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        is_email_verified: row.get("is_email_verified"),
        is_first_login: row.get("is_first_login"),
        status,
        password_updated_at: row.get("password_updated_at"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn token_from_row(row: &PgRow) -> Result<IssuedToken, StoreError> {
    let kind: String = row.get("kind");
    let kind = TokenKind::parse(&kind)
        .ok_or_else(|| StoreError::Backend(anyhow!("unknown token kind: {kind}")))?;
    let fingerprint: Vec<u8> = row.get("fingerprint");
    let fingerprint = Fingerprint::from_slice(&fingerprint)?;
    Ok(IssuedToken {
        id: row.get("id"),
        account_id: row.get("account_id"),
        fingerprint,
        kind,
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    })
}

fn profile_from_row(row: &PgRow) -> UserProfile {
    UserProfile {
        account_id: row.get("account_id"),
        display_name: row.get("display_name"),
        bio: row.get("bio"),
        avatar_ref: row.get("avatar_ref"),
        email_opt_in: row.get("email_opt_in"),
        is_public: row.get("is_public"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, is_active, is_email_verified, \
     is_first_login, status, password_updated_at, last_login_at, created_at, updated_at";

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn insert_account(
        &mut self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            INSERT INTO accounts
                (id, email, password_hash, is_active, is_email_verified,
                 is_first_login, status, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, FALSE, TRUE, 'pending_verification', $4, $4)
            RETURNING {ACCOUNT_COLUMNS}
        "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(password_hash)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| classify(err, "failed to insert account"))?;
        account_from_row(&row)
    }

    async fn find_account(&mut self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND deleted_at IS NULL"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to find account by id")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_email(&mut self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1 AND deleted_at IS NULL"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to find account by email")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn set_account_active(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE accounts
            SET is_active = TRUE,
                is_email_verified = TRUE,
                status = 'active',
                updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ACCOUNT_COLUMNS}
        "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to activate account")?;
        let row = row.ok_or(StoreError::NotFound)?;
        account_from_row(&row)
    }

    async fn record_login(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE accounts
            SET last_login_at = $2, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ACCOUNT_COLUMNS}
        "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to record login")?;
        let row = row.ok_or(StoreError::NotFound)?;
        account_from_row(&row)
    }

    async fn update_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE accounts
            SET password_hash = $2,
                password_updated_at = $3,
                updated_at = $3
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ACCOUNT_COLUMNS}
        "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(password_hash)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to update password")?;
        let row = row.ok_or(StoreError::NotFound)?;
        account_from_row(&row)
    }

    async fn clear_first_login(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE accounts
            SET is_first_login = FALSE, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ACCOUNT_COLUMNS}
        "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to clear first-login flag")?;
        let row = row.ok_or(StoreError::NotFound)?;
        account_from_row(&row)
    }

    async fn insert_token(
        &mut self,
        account_id: Uuid,
        kind: TokenKind,
        fingerprint: &Fingerprint,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, StoreError> {
        let query = r"
            INSERT INTO issued_tokens
                (id, account_id, fingerprint, kind, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, account_id, fingerprint, kind, expires_at, revoked_at, created_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(account_id)
            .bind(fingerprint.as_bytes().as_slice())
            .bind(kind.as_str())
            .bind(expires_at)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| classify(err, "failed to insert token"))?;
        token_from_row(&row)
    }

    async fn find_active_token(
        &mut self,
        fingerprint: &Fingerprint,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<IssuedToken>, StoreError> {
        // FOR UPDATE serializes concurrent consumers of the same token: the
        // loser blocks here and re-evaluates the predicate after the winner
        // commits its revocation.
        let query = r"
            SELECT id, account_id, fingerprint, kind, expires_at, revoked_at, created_at
            FROM issued_tokens
            WHERE fingerprint = $1
              AND kind = $2
              AND revoked_at IS NULL
              AND expires_at > $3
            FOR UPDATE
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(fingerprint.as_bytes().as_slice())
            .bind(kind.as_str())
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to look up active token")?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn revoke_token(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        // Idempotent: a second revocation matches no rows and that is fine.
        let query = r"
            UPDATE issued_tokens
            SET revoked_at = $2
            WHERE id = $1 AND revoked_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to revoke token")?;
        Ok(())
    }

    async fn revoke_tokens_for(
        &mut self,
        account_id: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let query = r"
            UPDATE issued_tokens
            SET revoked_at = $3
            WHERE account_id = $1
              AND kind = $2
              AND revoked_at IS NULL
              AND expires_at > $3
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(kind.as_str())
            .bind(now)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to revoke outstanding tokens")?;
        Ok(result.rows_affected())
    }

    async fn find_profile(
        &mut self,
        account_id: Uuid,
    ) -> Result<Option<UserProfile>, StoreError> {
        let query = r"
            SELECT account_id, display_name, bio, avatar_ref, email_opt_in,
                   is_public, created_at, updated_at
            FROM user_profiles
            WHERE account_id = $1 AND deleted_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to find profile")?;
        Ok(row.as_ref().map(profile_from_row))
    }

    async fn insert_profile(
        &mut self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let query = r"
            INSERT INTO user_profiles
                (account_id, email_opt_in, is_public, created_at, updated_at)
            VALUES ($1, TRUE, FALSE, $2, $2)
            RETURNING account_id, display_name, bio, avatar_ref, email_opt_in,
                      is_public, created_at, updated_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| classify(err, "failed to insert profile"))?;
        Ok(profile_from_row(&row))
    }

    async fn update_profile(
        &mut self,
        account_id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        // COALESCE keeps columns whose update field is NULL.
        let query = r"
            UPDATE user_profiles
            SET display_name = COALESCE($2, display_name),
                bio = COALESCE($3, bio),
                avatar_ref = COALESCE($4, avatar_ref),
                email_opt_in = COALESCE($5, email_opt_in),
                is_public = COALESCE($6, is_public),
                updated_at = $7
            WHERE account_id = $1 AND deleted_at IS NULL
            RETURNING account_id, display_name, bio, avatar_ref, email_opt_in,
                      is_public, created_at, updated_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(update.display_name.as_deref())
            .bind(update.bio.as_deref())
            .bind(update.avatar_ref.as_deref())
            .bind(update.email_opt_in)
            .bind(update.is_public)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to update profile")?;
        let row = row.ok_or(StoreError::NotFound)?;
        Ok(profile_from_row(&row))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .context("failed to commit transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn unique_violation_is_detected_by_sqlstate() {
        // RowNotFound carries no SQLSTATE and must not classify as unique.
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn classify_wraps_other_errors_as_backend() {
        let err = classify(sqlx::Error::RowNotFound, "failed to insert account");
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn pg_store_constructs_from_lazy_pool() -> anyhow::Result<()> {
        // connect_lazy performs no I/O; this only checks wiring.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let _store = PgStore::new(pool);
        Ok(())
    }
}

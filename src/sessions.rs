//! Session store seam: enumerate and revoke live sessions for an account.
//!
//! Session establishment and cookies belong to the web layer; the engine
//! only needs to terminate every session after a password reset. Revocation
//! is best-effort there — failures are logged, never fatal to the reset.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

#[async_trait]
pub trait SessionRevoker: Send + Sync {
    /// Revoke every live session belonging to the account; returns how many
    /// were revoked.
    async fn revoke_all(&self, account_id: Uuid) -> Result<u64>;

    /// Count live sessions for the account.
    async fn count_active(&self, account_id: Uuid) -> Result<u64>;
}

/// For deployments where the web layer keeps no revocable session state
/// (e.g. short-lived stateless tokens).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSessionRevoker;

#[async_trait]
impl SessionRevoker for NoopSessionRevoker {
    async fn revoke_all(&self, _account_id: Uuid) -> Result<u64> {
        Ok(0)
    }

    async fn count_active(&self, _account_id: Uuid) -> Result<u64> {
        Ok(0)
    }
}

/// Revokes rows in a `user_sessions(account_id UUID, session_hash BYTEA,
/// expires_at TIMESTAMPTZ, ...)` table owned by the web layer.
#[derive(Clone, Debug)]
pub struct PgSessionRevoker {
    pool: PgPool,
}

impl PgSessionRevoker {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRevoker for PgSessionRevoker {
    async fn revoke_all(&self, account_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM user_sessions WHERE account_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke sessions")?;
        Ok(result.rows_affected())
    }

    async fn count_active(&self, account_id: Uuid) -> Result<u64> {
        let query = r"
            SELECT COUNT(*) AS live
            FROM user_sessions
            WHERE account_id = $1 AND expires_at > NOW()
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count sessions")?;
        let live: i64 = row.get("live");
        Ok(u64::try_from(live).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_revoker_reports_zero() -> Result<()> {
        let revoker = NoopSessionRevoker;
        assert_eq!(revoker.revoke_all(Uuid::new_v4()).await?, 0);
        assert_eq!(revoker.count_active(Uuid::new_v4()).await?, 0);
        Ok(())
    }
}

//! Postgres-backed [`AuthStore`].
//!
//! Supersession and consumption are single statements or short transactions,
//! so concurrent callers race on row locks instead of application state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::store::{Account, AuthStore, DeviceDescriptor, NewAccount, Role, TrustedDevice};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        role: Role::parse(row.try_get::<String, _>("role")?.as_str()),
        password_hash: row.try_get("password_hash")?,
    })
}

fn device_from_row(row: &PgRow) -> Result<TrustedDevice> {
    Ok(TrustedDevice {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        browser: row.try_get("browser")?,
        os: row.try_get("os")?,
        device_class: row.try_get("device_class")?,
        created_at: row.try_get("created_at")?,
        last_used: row.try_get("last_used")?,
    })
}

#[async_trait]
impl AuthStore for PgStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, role, password_hash \
             FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .instrument(info_span!("db.query", table = "accounts", op = "select"))
        .await
        .context("find account by email")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, role, password_hash \
             FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .instrument(info_span!("db.query", table = "accounts", op = "select"))
        .await
        .context("find account by id")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account(&self, new: NewAccount) -> Result<Account> {
        let row = sqlx::query(
            "INSERT INTO accounts (id, email, first_name, last_name, role, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, email, first_name, last_name, role, password_hash",
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role.as_str())
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .instrument(info_span!("db.query", table = "accounts", op = "insert"))
        .await
        .context("insert account")?;
        account_from_row(&row)
    }

    async fn update_password_hash(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET password_hash = $2 WHERE id = $1")
            .bind(account_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(info_span!("db.query", table = "accounts", op = "update"))
            .await
            .context("update password hash")?;
        Ok(())
    }

    async fn replace_code(
        &self,
        account_id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // One row per account; the upsert is the supersession.
        sqlx::query(
            "INSERT INTO one_time_codes (account_id, code, expires_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (account_id) \
             DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at",
        )
        .bind(account_id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .instrument(info_span!("db.query", table = "one_time_codes", op = "upsert"))
        .await
        .context("replace one-time code")?;
        Ok(())
    }

    async fn consume_code(
        &self,
        account_id: Uuid,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // A single conditional delete; at most one concurrent caller removes
        // the row.
        let result = sqlx::query(
            "DELETE FROM one_time_codes \
             WHERE account_id = $1 AND code = $2 AND expires_at > $3",
        )
        .bind(account_id)
        .bind(submitted)
        .bind(now)
        .execute(&self.pool)
        .instrument(info_span!("db.query", table = "one_time_codes", op = "delete"))
        .await
        .context("consume one-time code")?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin reset issue")?;
        sqlx::query(
            "UPDATE password_resets SET used_at = $2 \
             WHERE account_id = $1 AND used_at IS NULL",
        )
        .bind(account_id)
        .bind(now)
        .execute(&mut *tx)
        .instrument(info_span!("db.query", table = "password_resets", op = "update"))
        .await
        .context("supersede reset tokens")?;
        sqlx::query(
            "INSERT INTO password_resets (id, account_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .instrument(info_span!("db.query", table = "password_resets", op = "insert"))
        .await
        .context("insert reset token")?;
        tx.commit().await.context("commit reset issue")?;
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("begin reset redeem")?;
        let row = sqlx::query(
            "UPDATE password_resets SET used_at = $2 \
             WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2 \
             RETURNING account_id",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .instrument(info_span!("db.query", table = "password_resets", op = "update"))
        .await
        .context("mark reset token used")?;
        let Some(row) = row else {
            tx.rollback().await.context("rollback reset redeem")?;
            return Ok(false);
        };
        let account_id: Uuid = row.try_get("account_id")?;
        sqlx::query("UPDATE accounts SET password_hash = $2 WHERE id = $1")
            .bind(account_id)
            .bind(new_password_hash)
            .execute(&mut *tx)
            .instrument(info_span!("db.query", table = "accounts", op = "update"))
            .await
            .context("rotate password hash")?;
        tx.commit().await.context("commit reset redeem")?;
        Ok(true)
    }

    async fn insert_device(
        &self,
        account_id: Uuid,
        descriptor: &DeviceDescriptor,
    ) -> Result<TrustedDevice> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO trusted_devices \
             (id, account_id, browser, os, device_class, created_at, last_used) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) \
             RETURNING id, account_id, browser, os, device_class, created_at, last_used",
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(&descriptor.browser)
        .bind(&descriptor.os)
        .bind(&descriptor.device_class)
        .bind(now)
        .fetch_one(&self.pool)
        .instrument(info_span!("db.query", table = "trusted_devices", op = "insert"))
        .await
        .context("insert trusted device")?;
        device_from_row(&row)
    }

    async fn touch_device(
        &self,
        account_id: Uuid,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE trusted_devices SET last_used = $3 \
             WHERE account_id = $1 AND id = $2",
        )
        .bind(account_id)
        .bind(device_id)
        .bind(now)
        .execute(&self.pool)
        .instrument(info_span!("db.query", table = "trusted_devices", op = "update"))
        .await
        .context("touch trusted device")?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_devices(&self, account_id: Uuid) -> Result<Vec<TrustedDevice>> {
        let rows = sqlx::query(
            "SELECT id, account_id, browser, os, device_class, created_at, last_used \
             FROM trusted_devices WHERE account_id = $1 \
             ORDER BY last_used DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .instrument(info_span!("db.query", table = "trusted_devices", op = "select"))
        .await
        .context("list trusted devices")?;
        rows.iter().map(device_from_row).collect()
    }

    async fn delete_device(&self, account_id: Uuid, device_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM trusted_devices WHERE account_id = $1 AND id = $2",
        )
        .bind(account_id)
        .bind(device_id)
        .execute(&self.pool)
        .instrument(info_span!("db.query", table = "trusted_devices", op = "delete"))
        .await
        .context("delete trusted device")?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_all_devices(&self, account_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM trusted_devices WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .instrument(info_span!("db.query", table = "trusted_devices", op = "delete"))
            .await
            .context("delete all trusted devices")?;
        Ok(result.rows_affected())
    }
}

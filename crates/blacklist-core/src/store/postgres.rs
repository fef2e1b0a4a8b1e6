//! Postgres-backed store.
//!
//! Candidate selection relies on `SELECT … FOR UPDATE SKIP LOCKED`: a worker
//! locks the single row it is about to transition, and any concurrent worker
//! running the same query moves on to the next eligible row (or finds none).
//! The lock lives as long as the sqlx transaction; dropping the transaction
//! rolls it back and frees the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::record::{AddressRecord, AddressStatus, BlacklistEntry, RecordPatch, Selector};

use super::{AddressStore, StoreTx};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const COLUMNS: &str = "id, address, status, ttl_days, description, \
                       created_at, updated_at, last_blacklist_at, expires_at";

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a bounded connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl AddressStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn healthcheck(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "database healthcheck failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PgTx
// ---------------------------------------------------------------------------

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn record_from_row(row: &PgRow) -> Result<AddressRecord> {
    let status: String = row.try_get("status")?;
    Ok(AddressRecord {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        status: status.parse::<AddressStatus>()?,
        ttl_days: row.try_get("ttl_days")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_blacklist_at: row.try_get("last_blacklist_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn optional_record(row: Option<PgRow>) -> Result<Option<AddressRecord>> {
    row.as_ref().map(record_from_row).transpose()
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_archive_candidate(
        &mut self,
        now: DateTime<Utc>,
        cooling_period_days: i32,
        default_ttl_days: i32,
    ) -> Result<Option<AddressRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM ip_address \
             WHERE status = 'BLACKLISTED' \
               AND last_blacklist_at IS NOT NULL \
               AND last_blacklist_at + make_interval(days => $2 + COALESCE(ttl_days, $3)) <= $1 \
             ORDER BY last_blacklist_at ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .bind(cooling_period_days)
            .bind(default_ttl_days)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_record(row)
    }

    async fn find_expired_candidate(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM ip_address \
             WHERE status = 'ARCHIVED' \
               AND expires_at IS NOT NULL \
               AND expires_at <= $1 \
             ORDER BY expires_at ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_record(row)
    }

    async fn get(&mut self, selector: Selector<'_>, lock: bool) -> Result<Option<AddressRecord>> {
        let column = match selector {
            Selector::Id(_) => "id",
            Selector::Address(_) => "address",
        };
        let lock_clause = if lock { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {COLUMNS} FROM ip_address WHERE {column} = $1{lock_clause}");
        let query = sqlx::query(&sql);
        let query = match selector {
            Selector::Id(id) => query.bind(id),
            Selector::Address(address) => query.bind(address),
        };
        let row = query.fetch_optional(&mut *self.tx).await?;
        optional_record(row)
    }

    async fn transition_to_archived(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>> {
        let sql = format!(
            "UPDATE ip_address SET status = 'ARCHIVED', updated_at = $2 \
             WHERE id = $1 AND status = 'BLACKLISTED' \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_record(row)
    }

    async fn delete_record(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM ip_address WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_on_blacklist(
        &mut self,
        entry: &BlacklistEntry,
        now: DateTime<Utc>,
    ) -> Result<AddressRecord> {
        let sql = format!(
            "INSERT INTO ip_address \
                 (id, address, status, ttl_days, description, \
                  created_at, updated_at, last_blacklist_at, expires_at) \
             VALUES ($1, $2, 'BLACKLISTED', $3, $4, $5, $5, $6, $7) \
             ON CONFLICT (address) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 ttl_days = EXCLUDED.ttl_days, \
                 description = EXCLUDED.description, \
                 last_blacklist_at = EXCLUDED.last_blacklist_at, \
                 expires_at = EXCLUDED.expires_at, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&entry.address)
            .bind(entry.ttl_days)
            .bind(entry.description.as_deref())
            .bind(now)
            .bind(entry.last_blacklist_at)
            .bind(entry.expires_at)
            .fetch_one(&mut *self.tx)
            .await?;
        record_from_row(&row)
    }

    async fn patch(
        &mut self,
        id: Uuid,
        patch: &RecordPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>> {
        if patch.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "UPDATE ip_address SET \
                 status = COALESCE($2, status), \
                 description = COALESCE($3, description), \
                 last_blacklist_at = COALESCE($4, last_blacklist_at), \
                 expires_at = COALESCE($5, expires_at), \
                 updated_at = $6 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(patch.status.map(AddressStatus::as_str))
            .bind(patch.description.as_deref())
            .bind(patch.last_blacklist_at)
            .bind(patch.expires_at)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?;
        optional_record(row)
    }

    async fn list_blacklisted(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT address FROM ip_address \
             WHERE status = 'BLACKLISTED' \
             ORDER BY last_blacklist_at DESC NULLS LAST",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("address").map_err(Into::into))
            .collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

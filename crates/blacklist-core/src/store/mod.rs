//! Persistent access to address records.
//!
//! Every operation runs on a transaction (`StoreTx`). Callers that compose
//! several operations pass the same transaction to each; everything else goes
//! through [`with_transaction`], which commits on `Ok` and rolls back on `Err`.
//! Dropping an unfinished transaction rolls it back and releases its row locks,
//! so a cancelled tick never leaves a row held.
//!
//! The candidate finders lock the row they return and skip rows locked by any
//! other transaction. Concurrent workers therefore partition the eligible set
//! instead of blocking on each other or processing the same row twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::Result;
use crate::record::{AddressRecord, BlacklistEntry, RecordPatch, Selector};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgTx};

#[async_trait]
pub trait AddressStore: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;

    /// `true` when the backing store answers a trivial round trip.
    async fn healthcheck(&self) -> bool;
}

#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Oldest `BLACKLISTED` record whose cooling period plus TTL has elapsed,
    /// locked for this transaction. Rows locked elsewhere are skipped.
    async fn find_archive_candidate(
        &mut self,
        now: DateTime<Utc>,
        cooling_period_days: i32,
        default_ttl_days: i32,
    ) -> Result<Option<AddressRecord>>;

    /// Oldest `ARCHIVED` record with `expires_at <= now`, locked for this
    /// transaction. Rows locked elsewhere are skipped.
    async fn find_expired_candidate(&mut self, now: DateTime<Utc>)
        -> Result<Option<AddressRecord>>;

    /// Point read. With `lock` the row stays locked until the transaction ends.
    async fn get(&mut self, selector: Selector<'_>, lock: bool) -> Result<Option<AddressRecord>>;

    /// Returns `None` when the row is gone or is no longer `BLACKLISTED`.
    async fn transition_to_archived(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>>;

    async fn delete_record(&mut self, id: Uuid) -> Result<()>;

    /// Insert, or overwrite the existing row with the same address.
    async fn upsert_on_blacklist(
        &mut self,
        entry: &BlacklistEntry,
        now: DateTime<Utc>,
    ) -> Result<AddressRecord>;

    /// Returns `None` for an empty patch or a missing row.
    async fn patch(
        &mut self,
        id: Uuid,
        patch: &RecordPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>>;

    /// Addresses currently `BLACKLISTED`, most recently blacklisted first.
    async fn list_blacklisted(&mut self) -> Result<Vec<String>>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Run `f` on a fresh transaction, committing on success and rolling back on
/// error. The error from `f` is returned even if the rollback itself fails.
pub async fn with_transaction<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: AddressStore + ?Sized,
    T: Send,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T>> + Send,
{
    let mut tx = store.begin().await?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

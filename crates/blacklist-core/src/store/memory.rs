//! In-process store with the same locking contract as the Postgres store.
//!
//! Each transaction keeps its writes in a private overlay until commit, and
//! owns row locks in a table shared by all transactions. Candidate finders
//! skip rows locked by another transaction; point mutations wait for the
//! holder to finish, which is what a row lock does in Postgres. Dropping a
//! transaction discards its overlay and releases its locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::Result;
use crate::record::{AddressRecord, AddressStatus, BlacklistEntry, RecordPatch, Selector};

use super::{AddressStore, StoreTx};

#[derive(Default)]
struct Shared {
    state: Mutex<MemState>,
    /// Signalled whenever a transaction releases its locks.
    released: Notify,
}

#[derive(Default)]
struct MemState {
    rows: HashMap<Uuid, AddressRecord>,
    /// Row id → owning transaction id.
    locks: HashMap<Uuid, u64>,
    next_tx: u64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed records, oldest first.
    pub fn snapshot(&self) -> Vec<AddressRecord> {
        let mut rows: Vec<AddressRecord> = self.shared.state().rows.values().cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.address.cmp(&b.address)));
        rows
    }

    /// Committed record for `address`, if any.
    pub fn find(&self, address: &str) -> Option<AddressRecord> {
        self.shared
            .state()
            .rows
            .values()
            .find(|r| r.address == address)
            .cloned()
    }

    /// Number of rows currently locked by open transactions.
    pub fn locked_rows(&self) -> usize {
        self.shared.state().locks.len()
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let id = {
            let mut state = self.shared.state();
            state.next_tx += 1;
            state.next_tx
        };
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            id,
            held: HashSet::new(),
            writes: HashMap::new(),
        })
    }

    async fn healthcheck(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// MemoryTx
// ---------------------------------------------------------------------------

pub struct MemoryTx {
    shared: Arc<Shared>,
    id: u64,
    held: HashSet<Uuid>,
    /// Uncommitted writes; `None` marks a deletion.
    writes: HashMap<Uuid, Option<AddressRecord>>,
}

impl MemoryTx {
    /// Committed rows overlaid with this transaction's writes.
    fn visible(&self, state: &MemState) -> Vec<AddressRecord> {
        let mut rows: Vec<AddressRecord> = state
            .rows
            .values()
            .filter(|r| !self.writes.contains_key(&r.id))
            .cloned()
            .collect();
        rows.extend(self.writes.values().flatten().cloned());
        rows
    }

    fn lookup(&self, selector: Selector<'_>) -> Option<AddressRecord> {
        let state = self.shared.state();
        self.visible(&state)
            .into_iter()
            .find(|r| selector.matches(r))
    }

    /// Lock the first eligible row (by `key`) not held by another transaction.
    fn claim_first<F, K>(&mut self, eligible: F, key: K) -> Option<AddressRecord>
    where
        F: Fn(&AddressRecord) -> bool,
        K: Fn(&AddressRecord) -> Option<DateTime<Utc>>,
    {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.state();
        let mut candidates: Vec<AddressRecord> = self
            .visible(&state)
            .into_iter()
            .filter(|r| eligible(r))
            .filter(|r| state.locks.get(&r.id).map_or(true, |owner| *owner == self.id))
            .collect();
        candidates.sort_by(|a, b| key(a).cmp(&key(b)).then(a.address.cmp(&b.address)));
        let chosen = candidates.into_iter().next()?;
        state.locks.insert(chosen.id, self.id);
        self.held.insert(chosen.id);
        Some(chosen)
    }

    /// Wait until the row lock for `id` is free, then take it.
    async fn lock_row(&mut self, id: Uuid) {
        if self.held.contains(&id) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        loop {
            let released = shared.released.notified();
            {
                let mut state = shared.state();
                if !state.locks.contains_key(&id) {
                    state.locks.insert(id, self.id);
                    self.held.insert(id);
                    return;
                }
            }
            released.await;
        }
    }

    fn release(&mut self) {
        if self.held.is_empty() {
            return;
        }
        {
            let mut state = self.shared.state();
            for id in self.held.drain() {
                if state.locks.get(&id) == Some(&self.id) {
                    state.locks.remove(&id);
                }
            }
        }
        self.shared.released.notify_waiters();
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.writes.clear();
        self.release();
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_archive_candidate(
        &mut self,
        now: DateTime<Utc>,
        cooling_period_days: i32,
        default_ttl_days: i32,
    ) -> Result<Option<AddressRecord>> {
        Ok(self.claim_first(
            |r| {
                r.status == AddressStatus::Blacklisted
                    && r
                        .archive_due_at(cooling_period_days, default_ttl_days)
                        .is_some_and(|due| due <= now)
            },
            |r| r.last_blacklist_at,
        ))
    }

    async fn find_expired_candidate(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>> {
        Ok(self.claim_first(
            |r| r.status == AddressStatus::Archived && r.expires_at.is_some_and(|at| at <= now),
            |r| r.expires_at,
        ))
    }

    async fn get(&mut self, selector: Selector<'_>, lock: bool) -> Result<Option<AddressRecord>> {
        let Some(found) = self.lookup(selector) else {
            return Ok(None);
        };
        if !lock {
            return Ok(Some(found));
        }
        self.lock_row(found.id).await;
        // The holder we waited on may have changed or removed the row.
        Ok(self.lookup(Selector::Id(found.id)))
    }

    async fn transition_to_archived(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<AddressRecord>> {
        self.lock_row(id).await;
        let Some(mut record) = self.lookup(Selector::Id(id)) else {
            return Ok(None);
        };
        if record.status != AddressStatus::Blacklisted {
            return Ok(None);
        }
        record.status = AddressStatus::Archived;
        record.updated_at = now;
        self.writes.insert(id, Some(record.clone()));
        Ok(Some(record))
    }

    async fn delete_record(&mut self, id: Uuid) -> Result<()> {
        self.lock_row(id).await;
        self.writes.insert(id, None);
        Ok(())
    }

    async fn upsert_on_blacklist(
        &mut self,
        entry: &BlacklistEntry,
        now: DateTime<Utc>,
    ) -> Result<AddressRecord> {
        let existing = match self.lookup(Selector::Address(&entry.address)) {
            Some(found) => {
                self.lock_row(found.id).await;
                self.lookup(Selector::Id(found.id))
            }
            None => None,
        };
        let record = match existing {
            Some(mut record) => {
                record.status = AddressStatus::Blacklisted;
                record.ttl_days = entry.ttl_days;
                record.description = entry.description.clone();
                record.last_blacklist_at = Some(entry.last_blacklist_at);
                record.expires_at = Some(entry.expires_at);
                record.updated_at = now;
                record
            }
            None => AddressRecord {
                id: Uuid::new_v4(),
                address: entry.address.clone(),
                status: AddressStatus::Blacklisted,
                ttl_days: entry.ttl_days,
                description: entry.description.clone(),
                created_at: now,
                updated_at: now,
                last_blacklist_at: Some(entry.last_blacklist_at),
                expires_at: Some(entry.expires_at),
            },
        };
        self.writes.insert(record.id, Some(record.clone()));
        Ok(record)
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
        self.lock_row(id).await;
        let Some(mut record) = self.lookup(Selector::Id(id)) else {
            return Ok(None);
        };
        patch.apply(&mut record, now);
        self.writes.insert(id, Some(record.clone()));
        Ok(Some(record))
    }

    async fn list_blacklisted(&mut self) -> Result<Vec<String>> {
        let state = self.shared.state();
        let mut rows: Vec<AddressRecord> = self
            .visible(&state)
            .into_iter()
            .filter(|r| r.status == AddressStatus::Blacklisted)
            .collect();
        rows.sort_by(|a, b| b.last_blacklist_at.cmp(&a.last_blacklist_at));
        Ok(rows.into_iter().map(|r| r.address).collect())
    }

    async fn commit(mut self) -> Result<()> {
        {
            let shared = Arc::clone(&self.shared);
            let mut state = shared.state();
            for (id, write) in self.writes.drain() {
                match write {
                    Some(record) => {
                        // Another transaction may have committed the same
                        // address first; fold into its row like ON CONFLICT.
                        let clash = state
                            .rows
                            .values()
                            .find(|r| r.address == record.address && r.id != id)
                            .map(|r| (r.id, r.created_at));
                        match clash {
                            Some((existing_id, created_at)) => {
                                state.rows.insert(
                                    existing_id,
                                    AddressRecord {
                                        id: existing_id,
                                        created_at,
                                        ..record
                                    },
                                );
                            }
                            None => {
                                state.rows.insert(id, record);
                            }
                        }
                    }
                    None => {
                        state.rows.remove(&id);
                    }
                }
            }
        }
        self.release();
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Drop discards the overlay and releases locks.
        Ok(())
    }
}

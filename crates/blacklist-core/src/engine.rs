//! Lifecycle transitions on top of an [`AddressStore`].
//!
//! Background steps (`archive_one_candidate`, `delete_one_expired_candidate`)
//! never return errors: failures are logged and reported as "nothing done" so
//! the drain loop stops and the next tick retries. Request-path operations
//! (`create`, `reactivate`) propagate typed errors to the caller.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::address;
use crate::clock::Clock;
use crate::config::{LifecyclePolicy, MAX_TTL_DAYS, MIN_TTL_DAYS};
use crate::error::{BlacklistError, Result};
use crate::record::{AddressRecord, AddressStatus, BlacklistEntry, RecordPatch, Selector};
use crate::store::{with_transaction, AddressStore, StoreTx};

/// `now + ttl + cooling`, rejecting TTLs outside the accepted range.
pub fn expiry_from(
    now: DateTime<Utc>,
    ttl_days: i32,
    cooling_period_days: i32,
) -> Result<DateTime<Utc>> {
    if !(MIN_TTL_DAYS..=MAX_TTL_DAYS).contains(&ttl_days) {
        return Err(BlacklistError::InvalidTtl(ttl_days));
    }
    let days = i64::from(ttl_days) + i64::from(cooling_period_days);
    now.checked_add_signed(chrono::Duration::days(days))
        .ok_or(BlacklistError::ExpiryOutOfRange {
            from: now,
            ttl_days,
            cooling_period_days,
        })
}

pub struct LifecycleEngine<S: AddressStore> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
}

impl<S: AddressStore> LifecycleEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, policy: LifecyclePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Expiry for a record blacklisted now. `None` uses the default TTL.
    pub fn compute_expiry(&self, ttl_days: Option<i32>) -> Result<DateTime<Utc>> {
        let ttl = ttl_days.unwrap_or(self.policy.default_ttl_days);
        expiry_from(self.clock.now(), ttl, self.policy.cooling_period_days)
    }

    /// Archive the oldest eligible record. `false` when there was none or the
    /// step failed.
    pub async fn archive_one_candidate(&self) -> bool {
        let now = self.clock.now();
        let policy = self.policy;
        let result = with_transaction(&self.store, move |tx| {
            Box::pin(async move {
                let Some(candidate) = tx
                    .find_archive_candidate(
                        now,
                        policy.cooling_period_days,
                        policy.default_ttl_days,
                    )
                    .await?
                else {
                    return Ok(None);
                };
                tx.transition_to_archived(candidate.id, now).await
            })
        })
        .await;

        match result {
            Ok(Some(record)) => {
                tracing::info!(
                    id = %record.id,
                    address = %record.address,
                    "address archived"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "archive step failed");
                false
            }
        }
    }

    /// Delete the oldest archived record whose `expires_at` has passed.
    pub async fn delete_one_expired_candidate(&self) -> bool {
        let now = self.clock.now();
        let result = with_transaction(&self.store, move |tx| {
            Box::pin(async move {
                let Some(candidate) = tx.find_expired_candidate(now).await? else {
                    return Ok(None);
                };
                tx.delete_record(candidate.id).await?;
                Ok(Some(candidate))
            })
        })
        .await;

        match result {
            Ok(Some(record)) => {
                tracing::info!(
                    id = %record.id,
                    address = %record.address,
                    "expired address deleted"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "expiry step failed");
                false
            }
        }
    }

    /// Put an archived address back on the blacklist.
    ///
    /// A record that is not `ARCHIVED` is returned as-is.
    pub async fn reactivate(&self, raw_address: &str, reason: Option<&str>) -> Result<AddressRecord> {
        let address = address::canonicalize(raw_address)?;
        let now = self.clock.now();
        let expires_at = expiry_from(
            now,
            self.policy.repeated_blacklist_ttl_days,
            self.policy.cooling_period_days,
        )?;
        let reason = reason.map(str::to_owned);

        with_transaction(&self.store, move |tx| {
            Box::pin(async move {
                let record = tx
                    .get(Selector::Address(&address), true)
                    .await?
                    .ok_or_else(|| BlacklistError::NotFound(address.clone()))?;

                if record.status != AddressStatus::Archived {
                    tracing::info!(
                        address = %record.address,
                        status = %record.status,
                        "reactivation skipped, address is not archived"
                    );
                    return Ok(record);
                }

                let patch = RecordPatch {
                    status: Some(AddressStatus::Blacklisted),
                    description: Some(reactivation_note(
                        now,
                        reason.as_deref(),
                        record.description.as_deref(),
                    )),
                    last_blacklist_at: Some(now),
                    expires_at: Some(expires_at),
                };
                let updated = tx
                    .patch(record.id, &patch, now)
                    .await?
                    .ok_or_else(|| BlacklistError::NotFound(address.clone()))?;
                tracing::info!(
                    id = %updated.id,
                    address = %updated.address,
                    "address reactivated"
                );
                Ok(updated)
            })
        })
        .await
    }

    /// Blacklist a new address. An existing row with the same address, in any
    /// state, is a conflict.
    pub async fn create(
        &self,
        raw_address: &str,
        ttl_days: Option<i32>,
        description: Option<String>,
    ) -> Result<AddressRecord> {
        let address = address::canonicalize(raw_address)?;
        let policy = self.policy;
        let now = self.clock.now();

        let record = with_transaction(&self.store, move |tx| {
            Box::pin(async move {
                if tx.get(Selector::Address(&address), false).await?.is_some() {
                    return Err(BlacklistError::DuplicateAddress(address));
                }
                let ttl = ttl_days.unwrap_or(policy.default_ttl_days);
                let expires_at = expiry_from(now, ttl, policy.cooling_period_days)?;
                let entry = BlacklistEntry {
                    address,
                    ttl_days: Some(ttl),
                    description,
                    last_blacklist_at: now,
                    expires_at,
                };
                tx.upsert_on_blacklist(&entry, now).await
            })
        })
        .await?;

        tracing::info!(id = %record.id, address = %record.address, "address blacklisted");
        Ok(record)
    }

    pub async fn list_blacklisted(&self) -> Result<Vec<String>> {
        with_transaction(&self.store, |tx| Box::pin(tx.list_blacklisted())).await
    }

    pub async fn healthcheck(&self) -> bool {
        self.store.healthcheck().await
    }
}

fn reactivation_note(
    now: DateTime<Utc>,
    reason: Option<&str>,
    previous: Option<&str>,
) -> String {
    format!(
        "Re-blacklisted at {}: {}\nPrevious description: {}",
        now.date_naive(),
        reason.unwrap_or("no reason given"),
        previous.unwrap_or("none"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn engine() -> (LifecycleEngine<MemoryStore>, Arc<ManualClock>) {
        engine_with(LifecyclePolicy::default())
    }

    fn engine_with(policy: LifecyclePolicy) -> (LifecycleEngine<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = LifecycleEngine::new(MemoryStore::new(), clock.clone(), policy);
        (engine, clock)
    }

    /// Force a record into `ARCHIVED` without waiting for the clock.
    async fn archive_directly(engine: &LifecycleEngine<MemoryStore>, address: &str) {
        let address = address.to_string();
        let now = engine.now();
        with_transaction(engine.store(), move |tx| {
            Box::pin(async move {
                let record = tx.get(Selector::Address(&address), true).await?.unwrap();
                tx.transition_to_archived(record.id, now).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    }

    #[test]
    fn expiry_adds_ttl_and_cooling() {
        let (engine, _) = engine();
        for ttl in [1, 30, 365] {
            let expiry = engine.compute_expiry(Some(ttl)).unwrap();
            assert_eq!(expiry, t0() + Duration::days(i64::from(ttl) + 30));
        }
    }

    #[test]
    fn expiry_beyond_calendar_range_is_an_error() {
        let err = expiry_from(t0(), 1, i32::MAX).unwrap_err();
        assert!(matches!(err, BlacklistError::ExpiryOutOfRange { .. }));
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(expiry_from(t0(), 1, 200_000_000).is_err());
    }

    #[tokio::test]
    async fn oversized_cooling_period_fails_requests_without_panicking() {
        let (engine, clock) = engine_with(LifecyclePolicy {
            cooling_period_days: i32::MAX,
            ..Default::default()
        });
        assert!(engine.compute_expiry(Some(1)).is_err());
        assert!(engine.create("198.51.100.1", Some(1), None).await.is_err());
        assert!(engine.store().snapshot().is_empty());
        assert!(engine.reactivate("198.51.100.1", None).await.is_err());
        clock.advance(Duration::days(400));
        assert!(!engine.archive_one_candidate().await);
    }

    #[test]
    fn expiry_is_monotonic_in_ttl() {
        let (engine, _) = engine();
        let mut last = engine.compute_expiry(Some(1)).unwrap();
        for ttl in 2..=365 {
            let next = engine.compute_expiry(Some(ttl)).unwrap();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn expiry_rejects_out_of_range_ttl() {
        let (engine, _) = engine();
        for ttl in [0, 366, -1] {
            assert!(matches!(
                engine.compute_expiry(Some(ttl)),
                Err(BlacklistError::InvalidTtl(t)) if t == ttl
            ));
        }
    }

    #[test]
    fn expiry_without_ttl_uses_default() {
        let (engine, _) = engine_with(LifecyclePolicy {
            cooling_period_days: 5,
            default_ttl_days: 10,
            repeated_blacklist_ttl_days: 30,
        });
        assert_eq!(engine.compute_expiry(None).unwrap(), t0() + Duration::days(15));
    }

    #[tokio::test]
    async fn create_stores_resolved_ttl() {
        let (engine, _) = engine();
        let record = engine.create("198.51.100.1", None, None).await.unwrap();
        assert_eq!(record.status, AddressStatus::Blacklisted);
        assert_eq!(record.ttl_days, Some(30));
        assert_eq!(record.last_blacklist_at, Some(t0()));
        assert_eq!(record.expires_at, Some(t0() + Duration::days(60)));
    }

    #[tokio::test]
    async fn create_rejects_duplicates_in_any_state() {
        let (engine, _) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        let err = engine.create("198.51.100.1", Some(1), None).await.unwrap_err();
        assert!(matches!(err, BlacklistError::DuplicateAddress(_)));

        archive_directly(&engine, "198.51.100.1").await;
        let err = engine.create("198.51.100.1", None, None).await.unwrap_err();
        assert!(matches!(err, BlacklistError::DuplicateAddress(_)));
    }

    #[tokio::test]
    async fn create_validates_address_and_ttl() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.create("10.0.0.1", None, None).await,
            Err(BlacklistError::PrivateAddress(_))
        ));
        assert!(matches!(
            engine.create("nope", None, None).await,
            Err(BlacklistError::InvalidAddress(_))
        ));
        assert!(matches!(
            engine.create("198.51.100.1", Some(0), None).await,
            Err(BlacklistError::InvalidTtl(0))
        ));
        assert!(engine.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn archive_takes_oldest_first_then_reports_none() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        clock.advance(Duration::hours(1));
        engine.create("198.51.100.2", Some(1), None).await.unwrap();
        clock.advance(Duration::days(32));

        assert!(engine.archive_one_candidate().await);
        let first = engine.store().find("198.51.100.1").unwrap();
        assert_eq!(first.status, AddressStatus::Archived);
        assert_eq!(
            engine.store().find("198.51.100.2").unwrap().status,
            AddressStatus::Blacklisted
        );

        assert!(engine.archive_one_candidate().await);
        assert_eq!(
            engine.store().find("198.51.100.2").unwrap().status,
            AddressStatus::Archived
        );

        assert!(!engine.archive_one_candidate().await);
    }

    #[tokio::test]
    async fn archive_waits_for_cooling_plus_ttl() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        clock.advance(Duration::days(31) - Duration::seconds(1));
        assert!(!engine.archive_one_candidate().await);
        clock.advance(Duration::seconds(1));
        assert!(engine.archive_one_candidate().await);
    }

    #[tokio::test]
    async fn candidate_held_by_another_worker_is_skipped() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        clock.advance(Duration::days(40));

        let mut other = engine.store().begin().await.unwrap();
        let held = other
            .find_archive_candidate(engine.now(), 30, 30)
            .await
            .unwrap()
            .expect("other worker claims the only candidate");
        assert_eq!(held.address, "198.51.100.1");

        assert!(!engine.archive_one_candidate().await);
        assert_eq!(
            engine.store().find("198.51.100.1").unwrap().status,
            AddressStatus::Blacklisted
        );

        drop(other);
        assert!(engine.archive_one_candidate().await);
        assert!(!engine.archive_one_candidate().await);
        assert_eq!(engine.store().locked_rows(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_archivers_process_a_single_candidate_once() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        clock.advance(Duration::days(40));

        let engine = Arc::new(engine);
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    engine.archive_one_candidate().await
                })
            })
            .collect();

        let mut archived = 0;
        for worker in workers {
            if worker.await.unwrap() {
                archived += 1;
            }
        }
        assert_eq!(archived, 1);
        assert_eq!(engine.store().locked_rows(), 0);
    }

    #[tokio::test]
    async fn expired_archives_are_deleted() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        archive_directly(&engine, "198.51.100.1").await;

        assert!(!engine.delete_one_expired_candidate().await);
        clock.advance(Duration::days(31));
        assert!(engine.delete_one_expired_candidate().await);
        assert!(engine.store().snapshot().is_empty());
        assert!(!engine.delete_one_expired_candidate().await);
    }

    #[tokio::test]
    async fn blacklisted_records_are_never_deleted() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        clock.advance(Duration::days(400));
        assert!(!engine.delete_one_expired_candidate().await);
    }

    #[tokio::test]
    async fn reactivating_blacklisted_record_is_a_noop() {
        let (engine, clock) = engine();
        let created = engine
            .create("198.51.100.1", Some(5), Some("scanner".into()))
            .await
            .unwrap();
        clock.advance(Duration::days(2));
        let same = engine.reactivate("198.51.100.1", Some("again")).await.unwrap();
        assert_eq!(same, created);
    }

    #[tokio::test]
    async fn reactivating_archived_record_restarts_lifecycle() {
        let (engine, clock) = engine_with(LifecyclePolicy {
            cooling_period_days: 30,
            default_ttl_days: 30,
            repeated_blacklist_ttl_days: 90,
        });
        engine
            .create("198.51.100.1", Some(1), Some("scanner".into()))
            .await
            .unwrap();
        clock.advance(Duration::days(31));
        assert!(engine.archive_one_candidate().await);

        clock.advance(Duration::days(3));
        let now = clock.now();
        let record = engine
            .reactivate("198.51.100.1", Some("seen again"))
            .await
            .unwrap();
        assert_eq!(record.status, AddressStatus::Blacklisted);
        assert_eq!(record.last_blacklist_at, Some(now));
        assert_eq!(record.expires_at, Some(now + Duration::days(120)));
        assert_eq!(record.ttl_days, Some(1));
        assert_eq!(
            record.description.as_deref(),
            Some("Re-blacklisted at 2026-02-04: seen again\nPrevious description: scanner")
        );
    }

    #[tokio::test]
    async fn reactivation_note_fills_missing_parts() {
        let (engine, _) = engine();
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        archive_directly(&engine, "198.51.100.1").await;
        let record = engine.reactivate("198.51.100.1", None).await.unwrap();
        assert_eq!(
            record.description.as_deref(),
            Some("Re-blacklisted at 2026-01-01: no reason given\nPrevious description: none")
        );
    }

    #[tokio::test]
    async fn reactivating_unknown_address_is_not_found() {
        let (engine, _) = engine();
        let err = engine.reactivate("198.51.100.1", None).await.unwrap_err();
        assert!(matches!(err, BlacklistError::NotFound(_)));
    }

    #[tokio::test]
    async fn reactivated_record_is_archived_again_on_its_old_ttl() {
        // Archive eligibility keeps using the stored ttl_days, so a record
        // reactivated with a longer repeated TTL is archived after
        // cooling + its stored ttl, long before its new expires_at.
        let (engine, clock) = engine_with(LifecyclePolicy {
            cooling_period_days: 30,
            default_ttl_days: 30,
            repeated_blacklist_ttl_days: 90,
        });
        engine.create("198.51.100.1", Some(1), None).await.unwrap();
        clock.advance(Duration::days(31));
        assert!(engine.archive_one_candidate().await);
        engine.reactivate("198.51.100.1", None).await.unwrap();

        clock.advance(Duration::days(31));
        assert!(engine.archive_one_candidate().await);
        let record = engine.store().find("198.51.100.1").unwrap();
        assert_eq!(record.status, AddressStatus::Archived);
        assert!(record.expires_at.unwrap() > clock.now());
    }

    #[tokio::test]
    async fn full_lifecycle_of_documentation_address() {
        let (engine, clock) = engine();
        let created = engine.create("203.0.113.5", Some(1), None).await.unwrap();
        assert_eq!(created.expires_at, Some(t0() + Duration::days(31)));
        assert_eq!(engine.list_blacklisted().await.unwrap(), vec!["203.0.113.5"]);

        clock.advance(Duration::days(31));
        assert!(engine.archive_one_candidate().await);
        assert!(engine.list_blacklisted().await.unwrap().is_empty());

        // expires_at coincides with archive eligibility.
        assert!(engine.delete_one_expired_candidate().await);
        assert!(engine.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let (engine, clock) = engine();
        engine.create("198.51.100.1", None, None).await.unwrap();
        clock.advance(Duration::minutes(5));
        engine.create("198.51.100.2", None, None).await.unwrap();
        clock.advance(Duration::minutes(5));
        engine.create("198.51.100.3", None, None).await.unwrap();
        assert_eq!(
            engine.list_blacklisted().await.unwrap(),
            vec!["198.51.100.3", "198.51.100.2", "198.51.100.1"]
        );
    }

    #[tokio::test]
    async fn memory_store_is_always_healthy() {
        let (engine, _) = engine();
        assert!(engine.healthcheck().await);
    }
}

use std::sync::Arc;

use blacklist_core::clock::{Clock, ManualClock};
use blacklist_core::config::LifecyclePolicy;
use blacklist_core::engine::LifecycleEngine;
use blacklist_core::record::{AddressStatus, Selector};
use blacklist_core::store::{AddressStore, PgStore, StoreTx};
use chrono::{Duration, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;

async fn maybe_store() -> Option<PgStore> {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .ok()?;
    Some(PgStore::new(pool))
}

// Single test so the table is never truncated under a concurrent case.
#[tokio::test]
async fn postgres_store_lifecycle_flow() {
    let Some(store) = maybe_store().await else {
        eprintln!(
            "Skipping postgres_store_lifecycle_flow: TEST_DATABASE_URL/DATABASE_URL is not set or database is unreachable."
        );
        return;
    };

    store.migrate().await.expect("migrations should run");
    sqlx::query("TRUNCATE TABLE ip_address")
        .execute(store.pool())
        .await
        .expect("truncate should succeed");
    assert!(store.healthcheck().await);

    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let engine = LifecycleEngine::new(store.clone(), clock.clone(), LifecyclePolicy::default());

    // create + duplicate
    let created = engine
        .create("203.0.113.5", Some(1), Some("scanner".into()))
        .await
        .expect("create should succeed");
    assert_eq!(created.status, AddressStatus::Blacklisted);
    assert_eq!(created.expires_at, Some(start + Duration::days(31)));
    let dup = engine.create("203.0.113.5", Some(1), None).await.unwrap_err();
    assert_eq!(dup.code(), "DUPLICATE_IP");

    clock.advance(Duration::hours(1));
    engine
        .create("198.51.100.20", Some(1), None)
        .await
        .expect("second create should succeed");
    assert_eq!(
        engine.list_blacklisted().await.unwrap(),
        vec!["198.51.100.20".to_string(), "203.0.113.5".to_string()]
    );

    // skip-locked partition between two open transactions
    clock.advance(Duration::days(31));
    let now = clock.now();
    let mut first = store.begin().await.unwrap();
    let mut second = store.begin().await.unwrap();
    let mut third = store.begin().await.unwrap();
    let a = first
        .find_archive_candidate(now, 30, 30)
        .await
        .unwrap()
        .expect("first worker gets the oldest row");
    let b = second
        .find_archive_candidate(now, 30, 30)
        .await
        .unwrap()
        .expect("second worker skips the locked row");
    assert_eq!(a.address, "203.0.113.5");
    assert_eq!(b.address, "198.51.100.20");
    assert!(third.find_archive_candidate(now, 30, 30).await.unwrap().is_none());
    first.rollback().await.unwrap();
    second.rollback().await.unwrap();
    third.rollback().await.unwrap();

    // engine drives archive then expiry
    assert!(engine.archive_one_candidate().await);
    assert!(engine.archive_one_candidate().await);
    assert!(!engine.archive_one_candidate().await);
    assert!(engine.list_blacklisted().await.unwrap().is_empty());

    // reactivation restores one of them
    let reactivated = engine
        .reactivate("203.0.113.5", Some("seen again"))
        .await
        .expect("reactivate should succeed");
    assert_eq!(reactivated.status, AddressStatus::Blacklisted);
    assert_eq!(reactivated.last_blacklist_at, Some(now));
    assert!(reactivated
        .description
        .as_deref()
        .unwrap()
        .ends_with("Previous description: scanner"));

    assert!(engine.delete_one_expired_candidate().await);
    assert!(!engine.delete_one_expired_candidate().await);

    let mut tx = store.begin().await.unwrap();
    assert!(tx
        .get(Selector::Address("198.51.100.20"), false)
        .await
        .unwrap()
        .is_none());
    assert!(tx
        .get(Selector::Address("203.0.113.5"), false)
        .await
        .unwrap()
        .is_some());
    tx.commit().await.unwrap();

    let missing = engine.reactivate("198.51.100.20", None).await.unwrap_err();
    assert_eq!(missing.code(), "IP_NOT_FOUND");
}

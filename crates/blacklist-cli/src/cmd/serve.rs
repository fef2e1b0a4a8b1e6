use anyhow::Result;
use blacklist_core::clock::SystemClock;
use blacklist_core::config::Settings;
use blacklist_core::engine::LifecycleEngine;
use blacklist_core::store::{AddressStore, MemoryStore, PgStore};
use blacklist_core::scheduler::SchedulerError;
use blacklist_core::worker::LifecycleWorkers;
use blacklist_server::AppState;
use std::sync::Arc;

use crate::shutdown::create_shutdown_token;

pub fn run(settings: Settings, memory: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        if memory {
            tracing::warn!("using the in-memory store, records are lost on exit");
            return serve_with(MemoryStore::new(), settings).await;
        }

        let store = PgStore::connect(&settings.database).await?;
        store.migrate().await?;
        let served = serve_with(store.clone(), settings).await;
        store.close().await;
        served
    })
}

async fn serve_with<S: AddressStore>(store: S, settings: Settings) -> Result<()> {
    if settings.server.internal_token.is_none() {
        tracing::warn!("INTERNAL_API_TOKEN is not set, internal API will reject every request");
    }

    let engine = Arc::new(LifecycleEngine::new(
        store,
        Arc::new(SystemClock),
        settings.lifecycle,
    ));
    let mut workers = LifecycleWorkers::new(Arc::clone(&engine), &settings.workers);
    workers.start()?;

    let shutdown = create_shutdown_token();
    let state = AppState::new(engine, settings.server.internal_token.clone());
    let served = blacklist_server::serve(state, &settings.server, shutdown.clone()).await;

    // The servers may have failed before any signal arrived.
    shutdown.cancel();
    settle(served, workers.stop().await)
}

/// The server's outcome wins; a failed worker stop is only logged.
fn settle(served: Result<()>, stopped: Result<(), SchedulerError>) -> Result<()> {
    if let Err(e) = stopped {
        tracing::error!(error = %e, "failed to stop lifecycle workers");
    }
    served
}

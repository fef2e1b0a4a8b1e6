use anyhow::Result;
use blacklist_core::clock::SystemClock;
use blacklist_core::config::Settings;
use blacklist_core::engine::LifecycleEngine;
use blacklist_core::store::PgStore;
use blacklist_core::worker::sweep_once;
use std::sync::Arc;

use crate::shutdown::create_shutdown_token;

pub fn run(settings: Settings, json: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let store = PgStore::connect(&settings.database).await?;
        let engine = LifecycleEngine::new(store.clone(), Arc::new(SystemClock), settings.lifecycle);
        let cancel = create_shutdown_token();
        let report = sweep_once(&engine, &cancel).await;
        store.close().await;
        anyhow::Ok(report)
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("archived: {}", report.archived);
        println!("deleted:  {}", report.deleted);
    }
    Ok(())
}

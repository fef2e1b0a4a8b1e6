use anyhow::Result;
use blacklist_core::config::Settings;
use blacklist_core::store::PgStore;

pub fn run(settings: &Settings) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let store = PgStore::connect(&settings.database).await?;
        let migrated = store.migrate().await;
        store.close().await;
        migrated?;
        println!("migrations applied");
        anyhow::Ok(())
    })
}

use std::sync::Arc;

use tracing::info;

use nsfc_core::{
    config::Config,
    router::Router,
    store::{MemoryStore, Store},
};

#[tokio::main]
async fn main() -> Result<(), nsfc_core::Error> {
    nsfc_core::logging::init("nsfc")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn Store> = match &cfg.store_file {
        Some(path) => {
            info!(path = %path.display(), "loading store snapshot");
            Arc::new(MemoryStore::open(path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let router = Arc::new(Router::new());

    nsfc_telegram::router::run(cfg, router, store)
        .await
        .map_err(|e| nsfc_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

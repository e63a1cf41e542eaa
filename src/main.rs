use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use channel_translations::api::{self, AppState};
use channel_translations::backend::{build_backend, TranslationBackend};
use channel_translations::config::Config;
use channel_translations::permissions::ConfiguredPermissions;
use channel_translations::service::TranslationService;
use channel_translations::store::{KvStore, MemoryStore, MessageStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("channel_translations=info".parse()?),
        )
        .init();

    info!("Starting channel translation service");

    let config = Config::from_env()?;
    let settings = config.translation_settings();

    info!(
        "Translation {} for {} language(s): {:?}",
        if settings.enabled { "enabled" } else { "disabled" },
        settings.languages.codes().len(),
        settings.languages.codes()
    );

    // A broken backend configuration disables translation instead of the service
    let backend: Option<Arc<dyn TranslationBackend>> = match build_backend(&config) {
        Ok(backend) => {
            info!("Using {} translation backend", backend.name());
            Some(backend)
        }
        Err(e) => {
            error!("Translation backend unavailable, translations disabled: {}", e);
            None
        }
    };

    let (messages, kv): (Arc<dyn MessageStore>, Arc<dyn KvStore>) = match &config.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url).await?);
            let messages: Arc<dyn MessageStore> = store.clone();
            let kv: Arc<dyn KvStore> = store;
            (messages, kv)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            let store = Arc::new(MemoryStore::new());
            let messages: Arc<dyn MessageStore> = store.clone();
            let kv: Arc<dyn KvStore> = store;
            (messages, kv)
        }
    };

    let permissions = Arc::new(ConfiguredPermissions::new(
        config.channel_admin_user_ids.clone(),
    ));

    let service = Arc::new(TranslationService::new(
        backend,
        messages,
        kv,
        permissions,
        settings,
    ));

    if config.api_key.is_none() {
        warn!("API_KEY not set, API key check disabled");
    }

    let app = api::router(AppState::new(service, config.api_key.clone()));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("✓ Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

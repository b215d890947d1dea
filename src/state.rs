use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::clients::offline_db::OfflineDatabase;
use crate::clients::{ExternalProvider, MetadataProvider};
use crate::config::Config;
use crate::db::Store;
use crate::jobs::TaskPool;
use crate::services::{
    AnimeResolver, CatalogService, ImageCacheService, ImageUpgrader, Importer, ListingService,
    SearchEngine, UserService, WatchListService,
};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// This client should be reused across all providers to enable
/// connection pooling and avoid socket exhaustion.
pub fn build_shared_http_client(
    timeout_seconds: u64,
    user_agent: &str,
) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(user_agent)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub cache: Cache,

    pub pool: TaskPool,

    pub provider: Arc<dyn MetadataProvider>,

    pub resolver: AnimeResolver,

    pub search: SearchEngine,

    pub images: ImageUpgrader,

    pub importer: Importer,

    pub watchlist: WatchListService,

    pub users: UserService,

    pub image_cache: ImageCacheService,

    pub listings: ListingService,

    pub catalog: CatalogService,

    pub started_at: Instant,
}

impl SharedState {
    /// Connects the store and cache and builds the live provider stack.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?
        .with_timeouts(
            config.database.operation_timeout(),
            config.database.bulk_timeout(),
        );

        let cache = Cache::from_config(&config.cache).await?;

        let http_client = build_shared_http_client(
            config.providers.request_timeout_seconds,
            &config.providers.user_agent,
        )?;
        let provider: Arc<dyn MetadataProvider> = Arc::new(ExternalProvider::from_config(
            http_client.clone(),
            &config.providers,
        ));
        let dataset = OfflineDatabase::new(
            http_client,
            config.providers.offline_db_url.clone(),
            config.jobs.data_dir.clone(),
        );

        let mut state = Self::from_parts(config, store, cache, provider);
        state.importer = state.importer.with_dataset(dataset);
        Ok(state)
    }

    /// Wires every service over already-built collaborators.
    #[must_use]
    pub fn from_parts(
        config: Config,
        store: Store,
        cache: Cache,
        provider: Arc<dyn MetadataProvider>,
    ) -> Self {
        let pool = TaskPool::new(config.jobs.max_concurrent, config.jobs.max_pending);

        let images = ImageUpgrader::new(
            store.clone(),
            cache.clone(),
            Arc::clone(&provider),
            pool.clone(),
        );
        let resolver = AnimeResolver::new(
            store.clone(),
            cache.clone(),
            Arc::clone(&provider),
            images.clone(),
        );
        let search = SearchEngine::new(
            store.clone(),
            cache.clone(),
            Arc::clone(&provider),
            resolver.clone(),
            images.clone(),
        );
        let importer = Importer::new(
            store.clone(),
            Arc::clone(&provider),
            config.jobs.import_batch_size,
        )
        .with_backfill_delay(Duration::from_millis(config.jobs.backfill_delay_ms));

        Self {
            watchlist: WatchListService::new(store.clone(), resolver.clone()),
            users: UserService::new(store.clone()),
            image_cache: ImageCacheService::new(store.clone(), Arc::clone(&provider)),
            listings: ListingService::new(store.clone(), cache.clone(), images.clone()),
            catalog: CatalogService::new(store.clone(), cache.clone(), resolver.clone()),
            config: Arc::new(config),
            store,
            cache,
            pool,
            provider,
            resolver,
            search,
            images,
            importer,
            started_at: Instant::now(),
        }
    }
}

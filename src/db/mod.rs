use crate::domain::{AnimeId, UserRole};
use crate::models::anime::{AnimePatch, AnimeRecord};
use crate::models::filter::{AnimeQuery, Owner};
use crate::models::image::ImageCacheEntry;
use crate::models::user::{UserRecord, UserStats};
use anyhow::{Context, Result};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr, Statement,
};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::anime::InsertOutcome;

/// Whether `err` was caused by a unique index rejecting a write.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DbErr>()
            .and_then(DbErr::sql_err)
            .is_some_and(|e| matches!(e, SqlErr::UniqueConstraintViolation(_)))
    })
}

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(30);

/// Persistent document store for anime, users and image cache entries.
///
/// Every call is bounded by a timeout.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    operation_timeout: Duration,
    bulk_timeout: Duration,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        // Every pooled connection to an in-memory database would see its
        // own empty database.
        let in_memory = db_url.contains(":memory:");
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        if !in_memory {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file {path_str}"))?;
            }
        }

        // Recycling the only in-memory connection would drop the database.
        let lifetime = if in_memory {
            Duration::from_secs(86_400)
        } else {
            Duration::from_secs(600)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(lifetime / 2)
            .max_lifetime(lifetime)
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self {
            conn,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            bulk_timeout: DEFAULT_BULK_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_timeouts(mut self, operation: Duration, bulk: Duration) -> Self {
        self.operation_timeout = operation;
        self.bulk_timeout = bulk;
        self
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.bounded(async {
            self.conn
                .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
                .await?;
            Ok(())
        })
        .await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        Self::with_limit(self.operation_timeout, fut).await
    }

    async fn bounded_bulk<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        Self::with_limit(self.bulk_timeout, fut).await
    }

    async fn with_limit<T, F>(limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow::anyhow!("store operation timed out after {limit:?}"))?
    }

    fn anime_repo(&self) -> repositories::anime::AnimeRepository {
        repositories::anime::AnimeRepository::new(self.conn.clone())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn image_repo(&self) -> repositories::image_cache::ImageCacheRepository {
        repositories::image_cache::ImageCacheRepository::new(self.conn.clone())
    }

    // Anime

    pub async fn get_anime(&self, id: &AnimeId) -> Result<Option<AnimeRecord>> {
        self.bounded(self.anime_repo().get(id)).await
    }

    pub async fn find_canonical_by_title(&self, name: &str) -> Result<Option<AnimeRecord>> {
        self.bounded(self.anime_repo().find_canonical_by_title(name))
            .await
    }

    pub async fn find_anime(&self, query: &AnimeQuery) -> Result<Vec<AnimeRecord>> {
        self.bounded(self.anime_repo().find(query)).await
    }

    pub async fn count_anime(&self, query: &AnimeQuery) -> Result<u64> {
        self.bounded(self.anime_repo().count(query)).await
    }

    pub async fn insert_anime(&self, record: &AnimeRecord) -> Result<InsertOutcome> {
        self.bounded(self.anime_repo().insert(record)).await
    }

    pub async fn insert_anime_unordered(&self, records: &[AnimeRecord]) -> Result<u64> {
        self.bounded_bulk(self.anime_repo().insert_many_unordered(records))
            .await
    }

    pub async fn save_anime(&self, record: &AnimeRecord) -> Result<()> {
        self.bounded(self.anime_repo().save(record)).await
    }

    pub async fn update_anime(
        &self,
        id: &AnimeId,
        owner: &Owner,
        patch: &AnimePatch,
    ) -> Result<u64> {
        self.bounded(self.anime_repo().update(id, owner, patch)).await
    }

    pub async fn update_anime_images(
        &self,
        id: &AnimeId,
        image_url: &str,
        banner_url: &str,
    ) -> Result<u64> {
        self.bounded(self.anime_repo().update_images(id, image_url, banner_url))
            .await
    }

    pub async fn delete_anime(&self, id: &AnimeId, owner: &Owner) -> Result<bool> {
        self.bounded(self.anime_repo().delete(id, owner)).await
    }

    pub async fn anime_ids(&self, owner: &Owner) -> Result<Vec<AnimeId>> {
        self.bounded_bulk(self.anime_repo().ids(owner)).await
    }

    pub async fn delete_all_anime(&self, owner: &Owner) -> Result<u64> {
        self.bounded_bulk(self.anime_repo().delete_all(owner)).await
    }

    pub async fn status_counts(&self, user_id: &str) -> Result<Vec<(Option<String>, u64)>> {
        self.bounded(self.anime_repo().status_counts(user_id)).await
    }

    pub async fn random_canonical(&self) -> Result<Option<AnimeRecord>> {
        self.bounded(self.anime_repo().random_canonical()).await
    }

    // Users

    pub async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>> {
        self.bounded(self.user_repo().get_by_external_id(external_id))
            .await
    }

    pub async fn upsert_user(
        &self,
        external_id: &str,
        email: &str,
        name: &str,
        role: Option<UserRole>,
    ) -> Result<UserRecord> {
        self.bounded(self.user_repo().upsert(external_id, email, name, role))
            .await
    }

    pub async fn set_user_role(&self, external_id: &str, role: UserRole) -> Result<bool> {
        self.bounded(self.user_repo().set_role(external_id, role))
            .await
    }

    pub async fn save_user_stats(&self, external_id: &str, stats: &UserStats) -> Result<bool> {
        self.bounded(self.user_repo().save_stats(external_id, stats))
            .await
    }

    // Image cache

    pub async fn get_image_entry(
        &self,
        mal_id: Option<i32>,
        anilist_id: Option<i32>,
    ) -> Result<Option<ImageCacheEntry>> {
        self.bounded(self.image_repo().get(mal_id, anilist_id)).await
    }

    pub async fn upsert_image_entry(&self, entry: &ImageCacheEntry) -> Result<()> {
        self.bounded(self.image_repo().upsert(entry)).await
    }
}

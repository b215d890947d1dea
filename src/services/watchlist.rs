use tracing::{info, instrument, warn};

use super::error::{CatalogError, CatalogResult};
use super::resolver::AnimeResolver;
use crate::db::{InsertOutcome, Store};
use crate::domain::{AnimeId, WatchStatus, validate_name};
use crate::models::anime::{AnimePatch, AnimeRecord, Progress, validate_notes, validate_score};
use crate::models::filter::{AnimeSort, FilterParams, Owner};

const MAX_LIST_PAGE: u64 = 200;

/// Personal watch lists. Every mutation is scoped by `(user_id, record_id)`.
#[derive(Clone)]
pub struct WatchListService {
    store: Store,
    resolver: AnimeResolver,
}

impl WatchListService {
    pub fn new(store: Store, resolver: AnimeResolver) -> Self {
        Self { store, resolver }
    }

    /// Copies the canonical record for `name` onto the user's list.
    ///
    /// Falls back to a minimal stub when no canonical record can be found
    /// or imported.
    #[instrument(skip(self))]
    pub async fn add_to_list(
        &self,
        user_id: &str,
        name: &str,
        status: WatchStatus,
    ) -> CatalogResult<AnimeRecord> {
        validate_name(name).map_err(CatalogError::Validation)?;
        let name = name.trim();

        let record = match self.resolver.find_or_import(name).await {
            Ok(canonical) => canonical.user_copy(user_id, status),
            Err(CatalogError::NotFound(_) | CatalogError::Upstream(_)) => {
                warn!(user_id, anime = name, "No canonical record, adding stub");
                AnimeRecord::stub(name, user_id, status)
            }
            Err(e) => return Err(e),
        };

        match self.store.insert_anime(&record).await? {
            InsertOutcome::Inserted => {
                info!(event = "watchlist_added", user_id, anime_id = %record.id, status = %status, "Added to watch list");
                Ok(record)
            }
            InsertOutcome::Duplicate => Err(CatalogError::Conflict(format!(
                "'{}' is already on the list",
                record.name
            ))),
        }
    }

    pub async fn update_status(
        &self,
        user_id: &str,
        id: &AnimeId,
        status: WatchStatus,
    ) -> CatalogResult<AnimeRecord> {
        self.apply(
            user_id,
            id,
            &AnimePatch {
                status: Some(status),
                ..AnimePatch::default()
            },
        )
        .await
    }

    pub async fn update_score(
        &self,
        user_id: &str,
        id: &AnimeId,
        score: f32,
    ) -> CatalogResult<AnimeRecord> {
        validate_score(score).map_err(CatalogError::Validation)?;
        self.apply(
            user_id,
            id,
            &AnimePatch {
                score: Some(score),
                ..AnimePatch::default()
            },
        )
        .await
    }

    pub async fn update_notes(
        &self,
        user_id: &str,
        id: &AnimeId,
        notes: &str,
    ) -> CatalogResult<AnimeRecord> {
        validate_notes(notes).map_err(CatalogError::Validation)?;
        self.apply(
            user_id,
            id,
            &AnimePatch {
                notes: Some(notes.to_string()),
                ..AnimePatch::default()
            },
        )
        .await
    }

    /// Sets watched episodes; reaching a known total marks the entry completed.
    pub async fn update_progress(
        &self,
        user_id: &str,
        id: &AnimeId,
        watched: i32,
    ) -> CatalogResult<AnimeRecord> {
        let current = self.get(user_id, id).await?;
        let progress = Progress {
            watched,
            total: current.progress.total,
        };
        progress.validate().map_err(CatalogError::Validation)?;

        let finished = progress.total > 0 && progress.watched == progress.total;
        self.apply(
            user_id,
            id,
            &AnimePatch {
                watched: Some(watched),
                status: finished.then_some(WatchStatus::Completed),
                ..AnimePatch::default()
            },
        )
        .await
    }

    pub async fn remove(&self, user_id: &str, id: &AnimeId) -> CatalogResult<()> {
        if self.store.delete_anime(id, &owner(user_id)).await? {
            info!(event = "watchlist_removed", user_id, anime_id = %id, "Removed from watch list");
            Ok(())
        } else {
            Err(CatalogError::not_found(format!("list entry {id}")))
        }
    }

    pub async fn get(&self, user_id: &str, id: &AnimeId) -> CatalogResult<AnimeRecord> {
        self.store
            .get_anime(id)
            .await?
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| CatalogError::not_found(format!("list entry {id}")))
    }

    /// The user's entries, most recently touched first.
    pub async fn list(
        &self,
        user_id: &str,
        filters: &FilterParams,
        skip: u64,
        limit: u64,
    ) -> CatalogResult<Vec<AnimeRecord>> {
        let mut query = FilterParams {
            user_id: Some(user_id.to_string()),
            ..filters.clone()
        }
        .to_query()
        .sorted(AnimeSort::RecentlyUpdated)
        .with_limit(limit.clamp(1, MAX_LIST_PAGE));
        query.skip = skip;

        Ok(self.store.find_anime(&query).await?)
    }

    async fn apply(
        &self,
        user_id: &str,
        id: &AnimeId,
        patch: &AnimePatch,
    ) -> CatalogResult<AnimeRecord> {
        let rows = self.store.update_anime(id, &owner(user_id), patch).await?;
        if rows == 0 {
            return Err(CatalogError::not_found(format!("list entry {id}")));
        }
        self.get(user_id, id).await
    }
}

fn owner(user_id: &str) -> Owner {
    Owner::User(user_id.to_string())
}

//! Cached catalog listings.
//!
//! Listings are never invalidated on writes to the records they embed
//! (image upgrades aside); they expire by TTL.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::{CatalogError, CatalogResult};
use super::image_upgrade::ImageUpgrader;
use crate::cache::{Cache, keys};
use crate::db::Store;
use crate::domain::AnimeType;
use crate::models::anime::AnimeRecord;
use crate::models::filter::{AnimeQuery, AnimeSort};

pub const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowsePage {
    pub items: Vec<AnimeRecord>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub has_next: bool,
}

#[derive(Clone)]
pub struct ListingService {
    store: Store,
    cache: Cache,
    images: ImageUpgrader,
}

impl ListingService {
    pub fn new(store: Store, cache: Cache, images: ImageUpgrader) -> Self {
        Self {
            store,
            cache,
            images,
        }
    }

    /// Score 7 and up, best first, newer first on ties.
    pub async fn trending(&self) -> CatalogResult<Vec<AnimeRecord>> {
        let query = AnimeQuery {
            min_score: Some(7.0),
            ..AnimeQuery::canonical()
        }
        .sorted(AnimeSort::ScoreThenYearDesc)
        .with_limit(50);
        self.listing(keys::TRENDING, self.cache.ttl().trending, &query)
            .await
    }

    pub async fn popular(&self) -> CatalogResult<Vec<AnimeRecord>> {
        let query = AnimeQuery::canonical()
            .sorted(AnimeSort::ScoreDesc)
            .with_limit(20);
        self.listing(keys::POPULAR, self.cache.ttl().popular, &query)
            .await
    }

    pub async fn spotlight(&self) -> CatalogResult<Vec<AnimeRecord>> {
        let query = AnimeQuery {
            min_score: Some(8.0),
            ..AnimeQuery::canonical()
        }
        .sorted(AnimeSort::ScoreDesc)
        .with_limit(10);
        self.listing(keys::SPOTLIGHT, self.cache.ttl().spotlight, &query)
            .await
    }

    pub async fn movies(&self) -> CatalogResult<Vec<AnimeRecord>> {
        let query = AnimeQuery {
            kind: Some(AnimeType::Movie),
            ..AnimeQuery::canonical()
        }
        .sorted(AnimeSort::ScoreDesc)
        .with_limit(20);
        self.listing(keys::MOVIES, self.cache.ttl().popular, &query)
            .await
    }

    /// One-based page of the whole canonical catalog by score.
    pub async fn browse(&self, page: u64, per_page: u64) -> CatalogResult<BrowsePage> {
        if page == 0 {
            return Err(CatalogError::validation("page starts at 1"));
        }
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(CatalogError::validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }

        let key = keys::browse(page, per_page);
        if let Some(hit) = self.cache.get_json::<BrowsePage>(&key).await {
            return Ok(hit);
        }

        let mut query = AnimeQuery::canonical()
            .sorted(AnimeSort::ScoreDesc)
            .with_limit(per_page);
        query.skip = (page - 1).saturating_mul(per_page);

        let total = self.store.count_anime(&AnimeQuery::canonical()).await?;
        let items = self.store.find_anime(&query).await?;
        self.images.schedule_many(&items);

        let result = BrowsePage {
            has_next: query.skip + (items.len() as u64) < total,
            items,
            page,
            per_page,
            total,
        };
        self.cache
            .set_json(&key, &result, self.cache.ttl().browse)
            .await;
        Ok(result)
    }

    /// Any canonical record. Never cached.
    pub async fn random(&self) -> CatalogResult<AnimeRecord> {
        self.store
            .random_canonical()
            .await?
            .ok_or_else(|| CatalogError::not_found("catalog is empty"))
    }

    async fn listing(
        &self,
        key: &str,
        ttl: Duration,
        query: &AnimeQuery,
    ) -> CatalogResult<Vec<AnimeRecord>> {
        if let Some(hit) = self.cache.get_json::<Vec<AnimeRecord>>(key).await {
            debug!(key, "Listing served from cache");
            return Ok(hit);
        }

        let records = self.store.find_anime(query).await?;
        self.images.schedule_many(&records);
        self.cache.set_json(key, &records, ttl).await;
        Ok(records)
    }
}

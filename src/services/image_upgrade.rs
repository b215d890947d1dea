//! Detects low-resolution artwork and swaps it for the provider's best.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use super::error::{CatalogError, CatalogResult};
use crate::cache::{Cache, keys};
use crate::clients::MetadataProvider;
use crate::db::Store;
use crate::domain::AnimeId;
use crate::jobs::TaskPool;
use crate::models::anime::{AnimeRecord, ImagePair};
use crate::models::filter::{AnimeQuery, AnimeSort};

/// Substrings that mark a URL as a low-resolution variant. Case-sensitive.
pub const LOW_QUALITY_MARKERS: [&str; 9] = [
    "placeholder",
    "small",
    "thumb",
    "150x",
    "300x",
    "medium",
    "default",
    "no-image",
    "missing",
];

/// URLs shorter than this cannot point at real artwork.
pub const MIN_IMAGE_URL_LEN: usize = 20;

/// Candidates scanned per upgrade requested by a sweep.
const SWEEP_SCAN_FACTOR: u64 = 4;

#[must_use]
pub fn is_low_quality(url: &str) -> bool {
    url.is_empty()
        || url.len() < MIN_IMAGE_URL_LEN
        || LOW_QUALITY_MARKERS.iter().any(|marker| url.contains(marker))
}

#[must_use]
pub fn needs_upgrade(record: &AnimeRecord) -> bool {
    is_low_quality(&record.image_url) || is_low_quality(&record.banner_url)
}

/// Takes each candidate URL only where it beats the current one. A
/// low-quality candidate only replaces a missing URL.
fn choose(current: &str, candidate: &str) -> Option<String> {
    let better = current.is_empty() || !is_low_quality(candidate);
    (is_low_quality(current) && !candidate.is_empty() && candidate != current && better)
        .then(|| candidate.to_string())
}

#[derive(Clone)]
pub struct ImageUpgrader {
    store: Store,
    cache: Cache,
    provider: Arc<dyn MetadataProvider>,
    pool: TaskPool,
    in_flight: Arc<Mutex<HashSet<AnimeId>>>,
}

impl ImageUpgrader {
    pub fn new(
        store: Store,
        cache: Cache,
        provider: Arc<dyn MetadataProvider>,
        pool: TaskPool,
    ) -> Self {
        Self {
            store,
            cache,
            provider,
            pool,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Replaces low-quality cover and banner URLs of `record`.
    ///
    /// Returns the new pair when the store was updated, `None` when nothing
    /// needed or could be improved.
    #[instrument(skip(self, record), fields(anime = %record.name))]
    pub async fn ensure_high_quality(&self, record: &AnimeRecord) -> CatalogResult<Option<ImagePair>> {
        if !needs_upgrade(record) {
            return Ok(None);
        }

        let mut found = self
            .provider
            .fetch_high_quality_images(&record.name)
            .await
            .map_err(|e| CatalogError::upstream(&e))?;

        if found.is_none() && (record.mal_id.is_some() || record.anilist_id.is_some()) {
            found = self
                .provider
                .fetch_images_by_ids(record.mal_id, record.anilist_id)
                .await
                .map_err(|e| CatalogError::upstream(&e))?;
        }

        let Some(candidate) = found else {
            metrics::counter!("animeverse_image_upgrades_total", "outcome" => "not_found").increment(1);
            debug!("Provider has no artwork for this title");
            return Ok(None);
        };

        let cover = choose(&record.image_url, &candidate.cover_url);
        let banner = choose(&record.banner_url, &candidate.banner_url);
        if cover.is_none() && banner.is_none() {
            metrics::counter!("animeverse_image_upgrades_total", "outcome" => "unchanged").increment(1);
            return Ok(None);
        }

        let pair = ImagePair {
            cover_url: cover.unwrap_or_else(|| record.image_url.clone()),
            banner_url: banner.unwrap_or_else(|| record.banner_url.clone()),
        };

        self.store
            .update_anime_images(&record.id, &pair.cover_url, &pair.banner_url)
            .await?;
        self.invalidate(record).await;

        metrics::counter!("animeverse_image_upgrades_total", "outcome" => "upgraded").increment(1);
        info!(event = "image_upgraded", anime_id = %record.id, "Upgraded artwork");
        Ok(Some(pair))
    }

    /// Drops the record's own keys and every listing that may embed it.
    async fn invalidate(&self, record: &AnimeRecord) {
        let mut stale = vec![
            keys::record(&record.id),
            keys::enhanced(&record.id),
            keys::by_name(&record.name),
        ];
        stale.extend(keys::LISTINGS.iter().map(ToString::to_string));
        self.cache.invalidate(stale).await;
    }

    /// Queues an upgrade off the request path. Returns whether one was queued.
    pub fn schedule(&self, record: &AnimeRecord) -> bool {
        if !needs_upgrade(record) {
            return false;
        }

        let Ok(mut in_flight) = self.in_flight.lock() else {
            return false;
        };
        if !in_flight.insert(record.id.clone()) {
            return false;
        }
        drop(in_flight);

        let upgrader = self.clone();
        let record = record.clone();
        let id = record.id.clone();
        let queued = self.pool.submit("image_upgrade", async move {
            let result = upgrader.ensure_high_quality(&record).await;
            upgrader.release(&record.id);
            result.map(|_| ()).map_err(anyhow::Error::from)
        });

        if !queued {
            self.release(&id);
        }
        queued
    }

    pub fn schedule_many(&self, records: &[AnimeRecord]) -> usize {
        records.iter().filter(|r| self.schedule(r)).count()
    }

    fn release(&self, id: &AnimeId) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(id);
        }
    }

    /// Queues upgrades for up to `limit` of the most popular canonical
    /// records with low-quality artwork. Returns how many were queued.
    #[instrument(skip(self))]
    pub async fn sweep(&self, limit: usize) -> CatalogResult<usize> {
        let scan = u64::try_from(limit)
            .unwrap_or(u64::MAX)
            .saturating_mul(SWEEP_SCAN_FACTOR);
        let query = AnimeQuery::canonical()
            .sorted(AnimeSort::ScoreDesc)
            .with_limit(scan);
        let candidates: Vec<AnimeRecord> = self
            .store
            .find_anime(&query)
            .await?
            .into_iter()
            .filter(needs_upgrade)
            .take(limit)
            .collect();

        let queued = self.schedule_many(&candidates);
        info!(
            event = "image_sweep_queued",
            candidates = candidates.len(),
            queued,
            "Image sweep queued"
        );
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_quality_detection() {
        assert!(is_low_quality(""));
        assert!(is_low_quality("https://cdn/x-300x400.jpg"));
        assert!(!is_low_quality("https://cdn/x-extraLarge.jpg"));
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert!(is_low_quality("https://cdn.example/img/small/1.jpg"));
        assert!(!is_low_quality("https://cdn.example/img/SMALL/1.jpg"));
        assert!(is_low_quality("https://s4.anilist.co/medium/bx1.jpg"));
    }

    #[test]
    fn short_urls_are_suspicious() {
        assert!(is_low_quality("https://a/b.jpg"));
        assert!(!is_low_quality("https://img.example/cover-large.jpg"));
    }

    #[test]
    fn only_low_quality_slots_are_replaced() {
        assert_eq!(
            choose("", "https://img.example/new-cover.jpg"),
            Some("https://img.example/new-cover.jpg".to_string())
        );
        assert_eq!(
            choose("https://img.example/cover-large.jpg", "https://img.example/other.jpg"),
            None
        );
        assert_eq!(choose("https://cdn/x-300x400.jpg", ""), None);
    }

    #[test]
    fn low_quality_candidate_only_fills_missing_url() {
        let medium = "https://s4.anilist.co/cover/medium/bx1.jpg";
        assert_eq!(choose("https://cdn/x-300x400.jpg", medium), None);
        assert_eq!(choose("", medium), Some(medium.to_string()));
    }
}

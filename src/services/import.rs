//! Bulk dataset import, field backfill and the current-season refresh.
//!
//! Every job here is best-effort: per-record failures are logged and
//! skipped, and the only result is how many records made it.

use chrono::{Datelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::error::{CatalogError, CatalogResult};
use crate::clients::MetadataProvider;
use crate::clients::offline_db::{AnimeEntry, OfflineDatabase};
use crate::db::{InsertOutcome, Store};
use crate::domain::Season;
use crate::models::anime::{AnimePatch, AnimeRecord, ExternalAnime, clamp_score};
use crate::models::filter::{AnimeQuery, AnimeSort, Owner};

/// Records examined per backfill run.
const BACKFILL_SCAN_LIMIT: u64 = 500;

#[derive(Clone)]
pub struct Importer {
    store: Store,
    provider: Arc<dyn MetadataProvider>,
    dataset: Option<OfflineDatabase>,
    batch_size: usize,
    backfill_delay: Duration,
}

impl Importer {
    pub fn new(store: Store, provider: Arc<dyn MetadataProvider>, batch_size: usize) -> Self {
        Self {
            store,
            provider,
            dataset: None,
            batch_size: batch_size.max(1),
            backfill_delay: Duration::from_millis(700),
        }
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: OfflineDatabase) -> Self {
        self.dataset = Some(dataset);
        self
    }

    #[must_use]
    pub const fn with_backfill_delay(mut self, delay: Duration) -> Self {
        self.backfill_delay = delay;
        self
    }

    /// Downloads (or reuses) the offline dataset and imports it.
    #[instrument(skip(self))]
    pub async fn import_dataset(&self, refresh: bool) -> anyhow::Result<usize> {
        let Some(dataset) = &self.dataset else {
            anyhow::bail!("No offline dataset configured");
        };

        let entries = dataset.load_entries(refresh).await?;
        let total = entries.len();
        let records: Vec<AnimeRecord> = entries
            .into_iter()
            .filter_map(AnimeEntry::into_record)
            .collect();

        if records.len() < total {
            debug!(skipped = total - records.len(), "Dataset entries without a title skipped");
        }

        Ok(self.import_records(records).await)
    }

    /// Writes `records` in unordered batches. Duplicates are skipped.
    pub async fn import_records(&self, records: Vec<AnimeRecord>) -> usize {
        let started = std::time::Instant::now();
        let mut imported = 0usize;
        let mut failed_batches = 0usize;

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            match self.store.insert_anime_unordered(batch).await {
                Ok(inserted) => {
                    metrics::counter!("animeverse_import_records_total").increment(inserted);
                    let inserted = usize::try_from(inserted).unwrap_or(usize::MAX);
                    imported += inserted;
                    if inserted < batch.len() {
                        debug!(
                            batch = index,
                            duplicates = batch.len() - inserted,
                            "Skipped duplicate records"
                        );
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    warn!(batch = index, size = batch.len(), error = %e, "Import batch failed");
                }
            }
        }

        info!(
            event = "dataset_imported",
            requested = records.len(),
            imported,
            failed_batches,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Bulk import finished"
        );
        imported
    }

    /// Fills missing `year`/`season` on canonical records from the provider,
    /// pausing between requests. Returns how many records were updated.
    #[instrument(skip(self))]
    pub async fn backfill_missing_fields(&self) -> CatalogResult<usize> {
        let query = AnimeQuery {
            missing_year_or_season: true,
            ..AnimeQuery::canonical()
        }
        .sorted(AnimeSort::NameAsc)
        .with_limit(BACKFILL_SCAN_LIMIT);
        let candidates = self.store.find_anime(&query).await?;

        let total = candidates.len();
        let mut updated = 0usize;
        for (index, record) in candidates.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.backfill_delay).await;
            }

            match self.backfill_one(record).await {
                Ok(true) => updated += 1,
                Ok(false) => debug!(anime = %record.name, "Nothing to backfill"),
                Err(e) => warn!(anime = %record.name, error = %e, "Backfill failed"),
            }
        }

        info!(event = "backfill_finished", scanned = total, updated, "Backfill finished");
        Ok(updated)
    }

    async fn backfill_one(&self, record: &AnimeRecord) -> anyhow::Result<bool> {
        let Some(found) = self.provider.search_by_name(&record.name).await? else {
            return Ok(false);
        };

        let patch = AnimePatch {
            year: record
                .year
                .is_none()
                .then_some(found.details.year)
                .flatten()
                .filter(|y| *y > 0),
            season: record.season.is_none().then_some(found.details.season).flatten(),
            ..AnimePatch::default()
        };
        if patch.is_empty() {
            return Ok(false);
        }

        let rows = self
            .store
            .update_anime(&record.id, &Owner::Canonical, &patch)
            .await?;
        Ok(rows > 0)
    }

    /// Imports or refreshes every title of the season airing now.
    #[instrument(skip(self))]
    pub async fn update_current_season(&self) -> CatalogResult<usize> {
        let today = Utc::now();
        let (season, year) = Season::for_month(today.month(), today.year());
        self.update_season(season, year).await
    }

    pub async fn update_season(&self, season: Season, year: i32) -> CatalogResult<usize> {
        let listed = self
            .provider
            .fetch_current_season(season, year)
            .await
            .map_err(|e| CatalogError::upstream(&e))?;

        let total = listed.len();
        let mut processed = 0usize;
        for external in listed {
            let name = external.name.clone();
            match self.upsert_seasonal(external).await {
                Ok(()) => processed += 1,
                Err(e) => warn!(anime = %name, error = %e, "Season update failed for title"),
            }
        }

        info!(
            event = "season_updated",
            season = %season,
            year,
            listed = total,
            processed,
            "Season update finished"
        );
        Ok(processed)
    }

    async fn upsert_seasonal(&self, external: ExternalAnime) -> anyhow::Result<()> {
        let Some(mut existing) = self.store.find_canonical_by_title(&external.name).await? else {
            let record = external.into_record();
            if let InsertOutcome::Duplicate = self.store.insert_anime(&record).await? {
                debug!(anime = %record.name, "Seasonal title inserted concurrently");
            }
            return Ok(());
        };

        let score = external.score.map(clamp_score);
        let ExternalAnime { details, .. } = external;
        let cover = details.image_url.clone();
        let banner = details.banner_url.clone();

        existing.merge_enhancement(details);
        if let Some(score) = score.filter(|s| *s > 0.0) {
            existing.score = score;
        }
        if !cover.is_empty() {
            existing.image_url = cover;
        }
        if !banner.is_empty() {
            existing.banner_url = banner;
        }
        existing.touch();

        self.store.save_anime(&existing).await
    }
}

use tracing::{info, instrument, warn};

use super::error::{CatalogError, CatalogResult};
use super::resolver::AnimeResolver;
use crate::cache::{Cache, keys};
use crate::db::{InsertOutcome, Store, is_unique_violation};
use crate::domain::{AnimeId, validate_name};
use crate::models::anime::{AnimePatch, AnimeRecord, clamp_score, validate_notes};
use crate::models::filter::Owner;

/// Administrative edits to canonical records.
#[derive(Clone)]
pub struct CatalogService {
    store: Store,
    cache: Cache,
    resolver: AnimeResolver,
}

fn validate_record(record: &AnimeRecord) -> CatalogResult<()> {
    validate_name(&record.name).map_err(CatalogError::Validation)?;
    validate_notes(&record.notes).map_err(CatalogError::Validation)?;
    record.progress.validate().map_err(CatalogError::Validation)
}

/// Incoming records always become canonical, with a fresh id.
fn canonicalize(mut record: AnimeRecord) -> AnimeRecord {
    record.id = AnimeId::generate();
    record.user_id = None;
    record.name = record.name.trim().to_string();
    record.score = clamp_score(record.score);
    record
}

impl CatalogService {
    pub fn new(store: Store, cache: Cache, resolver: AnimeResolver) -> Self {
        Self {
            store,
            cache,
            resolver,
        }
    }

    #[instrument(skip(self, record), fields(anime = %record.name))]
    pub async fn create(&self, record: AnimeRecord) -> CatalogResult<AnimeRecord> {
        validate_record(&record)?;
        let record = canonicalize(record);

        match self.store.insert_anime(&record).await? {
            InsertOutcome::Inserted => {
                self.resolver.invalidate(&record).await;
                info!(event = "catalog_created", anime_id = %record.id, "Created canonical record");
                Ok(record)
            }
            InsertOutcome::Duplicate => Err(CatalogError::Conflict(format!(
                "anime '{}' already exists",
                record.name
            ))),
        }
    }

    /// Inserts every valid record, skipping duplicates. Returns how many were written.
    pub async fn create_many(&self, records: Vec<AnimeRecord>) -> CatalogResult<usize> {
        let requested = records.len();
        let valid: Vec<AnimeRecord> = records
            .into_iter()
            .filter(|r| match validate_record(r) {
                Ok(()) => true,
                Err(e) => {
                    warn!(anime = %r.name, error = %e, "Skipping invalid record");
                    false
                }
            })
            .map(canonicalize)
            .collect();

        let inserted = self.store.insert_anime_unordered(&valid).await?;
        let inserted = usize::try_from(inserted).unwrap_or(usize::MAX);
        info!(event = "catalog_bulk_created", requested, inserted, "Bulk create finished");
        Ok(inserted)
    }

    pub async fn update(&self, id: &AnimeId, patch: &AnimePatch) -> CatalogResult<AnimeRecord> {
        patch.validate().map_err(CatalogError::Validation)?;
        if patch.is_empty() {
            return Err(CatalogError::validation("nothing to update"));
        }

        // The old name key must be dropped too when the name changes.
        let before = self.get(id).await?;

        let rows = match self.store.update_anime(id, &Owner::Canonical, patch).await {
            Ok(rows) => rows,
            Err(e) if is_unique_violation(&e) => {
                return Err(CatalogError::Conflict(format!(
                    "anime '{}' already exists",
                    patch.name.as_deref().unwrap_or(&before.name)
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if rows == 0 {
            return Err(CatalogError::not_found(format!("anime {id}")));
        }

        self.resolver.invalidate(&before).await;
        let after = self.get(id).await?;
        self.resolver.invalidate(&after).await;
        Ok(after)
    }

    pub async fn delete(&self, id: &AnimeId) -> CatalogResult<()> {
        let record = self.get(id).await?;
        if !self.store.delete_anime(id, &Owner::Canonical).await? {
            return Err(CatalogError::not_found(format!("anime {id}")));
        }
        self.resolver.invalidate(&record).await;
        info!(event = "catalog_deleted", anime_id = %id, "Deleted canonical record");
        Ok(())
    }

    /// Drops every canonical record. Personal lists are left alone.
    pub async fn delete_all(&self) -> CatalogResult<u64> {
        let ids = self.store.anime_ids(&Owner::Canonical).await?;
        let deleted = self.store.delete_all_anime(&Owner::Canonical).await?;
        self.resolver.invalidate_ids(&ids).await;
        self.cache.invalidate(keys::LISTINGS).await;
        warn!(event = "catalog_cleared", deleted, "Deleted all canonical records");
        Ok(deleted)
    }

    pub async fn get(&self, id: &AnimeId) -> CatalogResult<AnimeRecord> {
        self.store
            .get_anime(id)
            .await?
            .filter(AnimeRecord::is_canonical)
            .ok_or_else(|| CatalogError::not_found(format!("anime {id}")))
    }
}

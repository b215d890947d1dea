//! Cache → Store → External resolution of a single anime.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::error::{CatalogError, CatalogResult};
use super::image_upgrade::ImageUpgrader;
use crate::cache::{Cache, keys};
use crate::clients::MetadataProvider;
use crate::db::{InsertOutcome, Store};
use crate::domain::{AnimeId, AnimeIdentifier};
use crate::models::anime::AnimeRecord;

type KeyLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

fn count_tier(tier: &'static str) {
    metrics::counter!("animeverse_resolve_total", "tier" => tier).increment(1);
}

/// Resolves anime by ID or name across the three tiers.
///
/// Concurrent resolutions of the same key are collapsed: the second caller
/// waits for the first and then reads its result from the cache.
///
/// Only `anime:{id}` holds record data. Name keys hold the id they resolved
/// to, so dropping the id key retires every name a record was reached by.
#[derive(Clone)]
pub struct AnimeResolver {
    store: Store,
    cache: Cache,
    provider: Arc<dyn MetadataProvider>,
    images: ImageUpgrader,
    in_flight: KeyLocks,
}

impl AnimeResolver {
    pub fn new(
        store: Store,
        cache: Cache,
        provider: Arc<dyn MetadataProvider>,
        images: ImageUpgrader,
    ) -> Self {
        Self {
            store,
            cache,
            provider,
            images,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, raw: &str) -> CatalogResult<AnimeRecord> {
        let identifier = AnimeIdentifier::parse(raw).map_err(CatalogError::Validation)?;
        let key = keys::for_identifier(&identifier);

        if let Some(record) = self.cached(&identifier, &key).await {
            count_tier("cache");
            return Ok(record);
        }

        let lock = self.key_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            // Another caller may have finished while we waited.
            if let Some(record) = self.cached(&identifier, &key).await {
                count_tier("cache");
                Ok(record)
            } else {
                let resolved = self.resolve_uncached(&identifier, &key).await;
                if let Ok(record) = &resolved {
                    self.images.schedule(record);
                }
                resolved
            }
        };
        self.release_key(&key, lock).await;
        result
    }

    async fn resolve_uncached(
        &self,
        identifier: &AnimeIdentifier,
        key: &str,
    ) -> CatalogResult<AnimeRecord> {
        let stored = match identifier {
            AnimeIdentifier::Id(id) => self
                .store
                .get_anime(id)
                .await?
                .filter(AnimeRecord::is_canonical),
            AnimeIdentifier::Name(name) => self.store.find_canonical_by_title(name).await?,
        };

        match (stored, identifier) {
            (Some(record), _) if record.is_complete() => {
                count_tier("store");
                self.cache_record(key, &record).await;
                Ok(record)
            }
            (Some(record), _) => self.enhance(record, key).await,
            (None, AnimeIdentifier::Id(id)) => {
                count_tier("not_found");
                Err(CatalogError::not_found(format!("anime {id}")))
            }
            (None, AnimeIdentifier::Name(name)) => {
                let record = self.import_by_name(name).await?;
                self.cache_record(key, &record).await;
                Ok(record)
            }
        }
    }

    /// Fills blanks on an incomplete stored record.
    ///
    /// Provider failure returns the record as it is, uncached, so the next
    /// request tries again.
    async fn enhance(&self, mut record: AnimeRecord, key: &str) -> CatalogResult<AnimeRecord> {
        let enhancement = match self.provider.fetch_enhanced(&record.name).await {
            Ok(Some(enhancement)) => enhancement,
            Ok(None) => {
                count_tier("degraded");
                debug!(anime = %record.name, "Provider has no enhancement data");
                return Ok(record);
            }
            Err(e) => {
                count_tier("degraded");
                warn!(anime = %record.name, error = %e, "Enhancement failed, serving stored record");
                return Ok(record);
            }
        };

        let mut changed = record.merge_enhancement(enhancement);
        if record.themes.is_empty() {
            changed |= self.fill_themes(&mut record).await;
        }

        if changed {
            if let Err(e) = self.store.save_anime(&record).await {
                warn!(anime_id = %record.id, error = %e, "Failed to persist enhancement");
                return Ok(record);
            }
            info!(event = "anime_enhanced", anime_id = %record.id, complete = record.is_complete(), "Enhanced stored record");
        }

        count_tier("enhanced");
        self.cache_record(key, &record).await;
        Ok(record)
    }

    async fn fill_themes(&self, record: &mut AnimeRecord) -> bool {
        match self.provider.fetch_themes(&record.name).await {
            Ok(Some(themes)) => {
                record.themes = themes;
                record.touch();
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(anime = %record.name, error = %e, "Theme lookup failed");
                false
            }
        }
    }

    /// Fetches `name` from the provider and stores it as a new canonical
    /// record. If a record with the same name already exists, that one wins.
    #[instrument(skip(self))]
    pub async fn import_by_name(&self, name: &str) -> CatalogResult<AnimeRecord> {
        let external = match self.provider.search_by_name(name).await {
            Ok(Some(external)) => external,
            Ok(None) => {
                count_tier("not_found");
                return Err(CatalogError::not_found(format!("anime '{name}'")));
            }
            Err(e) => {
                count_tier("not_found");
                warn!(name, error = %e, "Provider lookup failed on cold miss");
                return Err(CatalogError::not_found(format!("anime '{name}'")));
            }
        };

        let mut record = external.into_record();
        if !record.is_complete() {
            match self.provider.fetch_enhanced(&record.name).await {
                Ok(Some(enhancement)) => {
                    record.merge_enhancement(enhancement);
                }
                Ok(None) => {}
                Err(e) => debug!(name, error = %e, "Enhancement on import failed"),
            }
        }

        self.insert_canonical(record).await
    }

    /// Inserts unless the name is taken, in which case the stored record is
    /// returned.
    pub async fn insert_canonical(&self, record: AnimeRecord) -> CatalogResult<AnimeRecord> {
        match self.store.insert_anime(&record).await? {
            InsertOutcome::Inserted => {
                count_tier("external");
                info!(event = "anime_imported", anime_id = %record.id, name = %record.name, "Imported canonical record");
                self.cache_record(&keys::record(&record.id), &record).await;
                Ok(record)
            }
            InsertOutcome::Duplicate => {
                count_tier("store");
                debug!(name = %record.name, "Canonical record already exists");
                self.store
                    .find_canonical_by_title(&record.name)
                    .await?
                    .ok_or_else(|| CatalogError::Conflict(format!("anime '{}'", record.name)))
            }
        }
    }

    /// Canonical record for `name`, importing it on a store miss.
    pub async fn find_or_import(&self, name: &str) -> CatalogResult<AnimeRecord> {
        crate::domain::validate_name(name).map_err(CatalogError::Validation)?;
        if let Some(record) = self.store.find_canonical_by_title(name).await? {
            return Ok(record);
        }
        self.import_by_name(name).await
    }

    pub async fn invalidate(&self, record: &AnimeRecord) {
        self.cache
            .invalidate([
                keys::record(&record.id),
                keys::enhanced(&record.id),
                keys::by_name(&record.name),
            ])
            .await;
    }

    /// Drops the record keys of `ids`. Name keys pointing at them go dead.
    pub async fn invalidate_ids(&self, ids: &[AnimeId]) {
        let stale: Vec<String> = ids
            .iter()
            .flat_map(|id| [keys::record(id), keys::enhanced(id)])
            .collect();
        self.cache.invalidate(stale).await;
    }

    async fn cached(&self, identifier: &AnimeIdentifier, key: &str) -> Option<AnimeRecord> {
        let id = match identifier {
            AnimeIdentifier::Id(id) => id.clone(),
            AnimeIdentifier::Name(_) => self.cache.get_json::<AnimeId>(key).await?,
        };
        self.cache.get_json(&keys::record(&id)).await
    }

    async fn cache_record(&self, key: &str, record: &AnimeRecord) {
        let ttl = self.cache.ttl().record;
        let id_key = keys::record(&record.id);
        self.cache.set_json(&id_key, record, ttl).await;
        if id_key != key {
            self.cache.set_json(key, &record.id, ttl).await;
        }
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.in_flight.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    async fn release_key(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.in_flight.lock().await;
        // One reference in the map, one held here: nobody else is waiting.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }
}

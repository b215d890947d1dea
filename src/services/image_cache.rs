use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::error::{CatalogError, CatalogResult};
use crate::clients::MetadataProvider;
use crate::db::Store;
use crate::models::anime::ImagePair;
use crate::models::image::ImageCacheEntry;

/// Persistent artwork lookup keyed by provider IDs.
#[derive(Clone)]
pub struct ImageCacheService {
    store: Store,
    provider: Arc<dyn MetadataProvider>,
}

impl ImageCacheService {
    pub fn new(store: Store, provider: Arc<dyn MetadataProvider>) -> Self {
        Self { store, provider }
    }

    /// Serves an entry younger than 30 days, otherwise refetches and stores.
    ///
    /// A stale entry is still served when the provider has nothing newer.
    pub async fn get_images(
        &self,
        mal_id: Option<i32>,
        anilist_id: Option<i32>,
    ) -> CatalogResult<ImageCacheEntry> {
        if mal_id.is_none() && anilist_id.is_none() {
            return Err(CatalogError::validation(
                "at least one of mal_id or anilist_id is required",
            ));
        }

        let cached = self.store.get_image_entry(mal_id, anilist_id).await?;
        if let Some(entry) = &cached
            && !entry.is_stale()
        {
            return Ok(entry.clone());
        }

        let fetched = match self.provider.fetch_images_by_ids(mal_id, anilist_id).await {
            Ok(found) => found,
            Err(e) if cached.is_some() => {
                debug!(?mal_id, ?anilist_id, error = %e, "Image refresh failed, serving stale entry");
                None
            }
            Err(e) => return Err(CatalogError::upstream(&e)),
        };

        match (fetched, cached) {
            (Some(ImagePair { cover_url, banner_url }), _) => {
                let entry = ImageCacheEntry {
                    mal_id,
                    anilist_id,
                    image_url: cover_url,
                    banner_url,
                    last_updated: Utc::now(),
                };
                self.store.upsert_image_entry(&entry).await?;
                Ok(entry)
            }
            (None, Some(stale)) => Ok(stale),
            (None, None) => Err(CatalogError::not_found(format!(
                "images for mal_id={mal_id:?} anilist_id={anilist_id:?}"
            ))),
        }
    }
}

//! Outbound metadata sources.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::Season;
use crate::models::anime::{AnimeThemes, Enhancement, ExternalAnime, ImagePair};

pub mod anilist;
pub mod jikan;
pub mod offline_db;
pub mod provider;

pub use provider::ExternalProvider;

/// Everything the catalog needs from the outside world.
///
/// `Ok(None)` / an empty vector means the provider answered but had no
/// match; `Err` means it could not be reached or answered garbage.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search_by_name(&self, name: &str) -> Result<Option<ExternalAnime>>;

    /// Up to a handful of plausible matches for free-text input.
    async fn search_candidates(&self, query: &str) -> Result<Vec<ExternalAnime>>;

    async fn fetch_enhanced(&self, name: &str) -> Result<Option<Enhancement>>;

    async fn fetch_high_quality_images(&self, name: &str) -> Result<Option<ImagePair>>;

    async fn fetch_images_by_ids(
        &self,
        mal_id: Option<i32>,
        anilist_id: Option<i32>,
    ) -> Result<Option<ImagePair>>;

    async fn fetch_current_season(&self, season: Season, year: i32) -> Result<Vec<ExternalAnime>>;

    async fn fetch_themes(&self, name: &str) -> Result<Option<AnimeThemes>>;
}

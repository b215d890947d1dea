use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::MetadataProvider;
use super::anilist::AnilistClient;
use super::jikan::JikanClient;
use crate::config::ProviderConfig;
use crate::domain::Season;
use crate::models::anime::{AnimeThemes, Enhancement, ExternalAnime, ImagePair};

const SEASON_PAGE_SIZE: u32 = 50;
/// Season listings stop after this many pages.
const SEASON_MAX_PAGES: u32 = 4;
const CANDIDATE_LIMIT: u32 = 10;

/// `AniList` first, Jikan as fallback.
#[derive(Clone)]
pub struct ExternalProvider {
    anilist: AnilistClient,
    jikan: JikanClient,
}

impl ExternalProvider {
    #[must_use]
    pub const fn new(anilist: AnilistClient, jikan: JikanClient) -> Self {
        Self { anilist, jikan }
    }

    #[must_use]
    pub fn from_config(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self::new(
            AnilistClient::new(
                client.clone(),
                config.anilist_url.clone(),
                config.requests_per_minute,
            ),
            JikanClient::new(client, config.jikan_url.clone()),
        )
    }
}

#[async_trait]
impl MetadataProvider for ExternalProvider {
    async fn search_by_name(&self, name: &str) -> Result<Option<ExternalAnime>> {
        let primary = self.anilist.find_by_name(name).await.inspect_err(|e| {
            warn!(name, error = %e, "AniList lookup failed, trying Jikan");
        });
        if let Ok(Some(found)) = primary {
            return Ok(Some(found));
        }

        let fallback = self.jikan.search(name, 1).await.map(|found| {
            found.into_iter().next().map(super::jikan::MalAnime::into_external)
        });

        match (primary, fallback) {
            (_, Ok(Some(found))) => Ok(Some(found)),
            (Err(e), Err(_)) => Err(e),
            _ => Ok(None),
        }
    }

    async fn search_candidates(&self, query: &str) -> Result<Vec<ExternalAnime>> {
        match self.anilist.search(query, CANDIDATE_LIMIT).await {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) => debug!(query, "AniList returned no candidates"),
            Err(e) => warn!(query, error = %e, "AniList search failed, trying Jikan"),
        }

        let found = self.jikan.search(query, CANDIDATE_LIMIT).await?;
        Ok(found
            .into_iter()
            .map(super::jikan::MalAnime::into_external)
            .collect())
    }

    async fn fetch_enhanced(&self, name: &str) -> Result<Option<Enhancement>> {
        let primary = self.anilist.find_details(name).await.inspect_err(|e| {
            warn!(name, error = %e, "AniList details failed, trying Jikan");
        });
        if let Ok(Some(details)) = primary {
            return Ok(Some(details));
        }

        let fallback = async {
            let Some(anime) = self.jikan.find_full(name).await? else {
                return Ok(None);
            };
            let mal_id = anime.mal_id;
            let mut details = anime.into_external().details;
            details.characters = self.jikan.get_characters(mal_id).await.unwrap_or_else(|e| {
                debug!(mal_id, error = %e, "Character lookup failed");
                Vec::new()
            });
            Ok::<_, anyhow::Error>(Some(details))
        }
        .await;

        match (primary, fallback) {
            (_, Ok(Some(details))) => Ok(Some(details)),
            (Err(e), Err(_)) => Err(e),
            _ => Ok(None),
        }
    }

    async fn fetch_high_quality_images(&self, name: &str) -> Result<Option<ImagePair>> {
        self.anilist.find_images(name).await
    }

    async fn fetch_images_by_ids(
        &self,
        mal_id: Option<i32>,
        anilist_id: Option<i32>,
    ) -> Result<Option<ImagePair>> {
        self.anilist.images_by_ids(mal_id, anilist_id).await
    }

    async fn fetch_current_season(&self, season: Season, year: i32) -> Result<Vec<ExternalAnime>> {
        let mut all = Vec::new();
        for page in 1..=SEASON_MAX_PAGES {
            let (mut anime, has_next) = self
                .anilist
                .season_page(season, year, page, SEASON_PAGE_SIZE)
                .await?;
            all.append(&mut anime);
            if !has_next {
                break;
            }
        }
        Ok(all)
    }

    async fn fetch_themes(&self, name: &str) -> Result<Option<AnimeThemes>> {
        let Some(anime) = self.jikan.find_full(name).await? else {
            return Ok(None);
        };
        let themes = anime.theme.map(|t| AnimeThemes {
            openings: t.openings,
            endings: t.endings,
        });
        Ok(themes.filter(|t| !t.is_empty()))
    }
}

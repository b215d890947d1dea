use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::domain::{AnimeType, Season};
use crate::models::anime::{
    AlternativeTitles, AnimeInformation, AnimeStatistics, AnimeThemes, Character, Enhancement,
    ExternalAnime, RelatedAnime,
};

pub const JIKAN_API: &str = "https://api.jikan.moe/v4";

/// The public API allows roughly three requests a second.
const REQUESTS_PER_SECOND: u32 = 3;

#[derive(Debug, Deserialize)]
struct JikanResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
pub struct MalAnime {
    pub mal_id: i32,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,
    pub episodes: Option<i32>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub anime_type: Option<String>,
    pub score: Option<f32>,
    pub rank: Option<i32>,
    pub popularity: Option<i32>,
    pub favorites: Option<i32>,
    pub synopsis: Option<String>,
    pub source: Option<String>,
    pub duration: Option<String>,
    pub season: Option<String>,
    pub year: Option<i32>,
    pub aired: Option<Aired>,
    pub images: Option<Images>,
    #[serde(default)]
    pub genres: Vec<MalGenericInfo>,
    #[serde(default)]
    pub studios: Vec<MalGenericInfo>,
    /// Only present on the `/full` endpoint.
    pub theme: Option<Theme>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

#[derive(Debug, Deserialize)]
pub struct Aired {
    pub string: Option<String>,
    pub prop: Option<AiredProp>,
}

#[derive(Debug, Deserialize)]
pub struct AiredProp {
    pub from: Option<AiredDate>,
}

#[derive(Debug, Deserialize)]
pub struct AiredDate {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct Images {
    pub jpg: Option<ImageSet>,
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
pub struct ImageSet {
    pub image_url: Option<String>,
    pub large_image_url: Option<String>,
}

impl Images {
    fn best(&self) -> Option<String> {
        [self.jpg.as_ref(), self.webp.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|set| set.large_image_url.clone().or_else(|| set.image_url.clone()))
    }
}

#[derive(Debug, Deserialize)]
pub struct MalGenericInfo {
    pub mal_id: i32,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Theme {
    #[serde(default)]
    pub openings: Vec<String>,
    #[serde(default)]
    pub endings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Relation {
    pub relation: String,
    #[serde(default)]
    pub entry: Vec<RelationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RelationEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CharacterRole {
    character: MalPerson,
    role: Option<String>,
    #[serde(default)]
    voice_actors: Vec<VoiceActor>,
}

#[derive(Debug, Deserialize)]
struct MalPerson {
    name: String,
    images: Option<Images>,
}

#[derive(Debug, Deserialize)]
struct VoiceActor {
    person: MalPerson,
    language: Option<String>,
}

impl MalAnime {
    #[must_use]
    pub fn start_year(&self) -> Option<i32> {
        self.year.or_else(|| {
            self.aired
                .as_ref()
                .and_then(|a| a.prop.as_ref())
                .and_then(|p| p.from.as_ref())
                .and_then(|f| f.year)
        })
    }

    #[must_use]
    pub fn into_external(self) -> ExternalAnime {
        let year = self.start_year();
        let season = self.season.as_deref().and_then(|s| s.parse::<Season>().ok());
        let image_url = self.images.as_ref().and_then(Images::best).unwrap_or_default();
        let name = self
            .title_english
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.title.clone());

        let mut synonyms = self.title_synonyms;
        if self.title != name && !synonyms.contains(&self.title) {
            synonyms.insert(0, self.title);
        }

        let related = self
            .relations
            .into_iter()
            .flat_map(|relation| {
                let relation_type = relation.relation;
                relation
                    .entry
                    .into_iter()
                    .filter(|e| e.kind == "anime")
                    .map(move |e| RelatedAnime {
                        name: e.name,
                        relation_type: relation_type.clone(),
                        image_url: String::new(),
                    })
            })
            .collect();

        let theme = self.theme.unwrap_or_default();
        let score = self.score.filter(|s| *s > 0.0);

        ExternalAnime {
            name,
            score,
            details: Enhancement {
                mal_id: Some(self.mal_id),
                kind: self.anime_type.as_deref().and_then(AnimeType::from_external),
                synopsis: self.synopsis.unwrap_or_default().trim().to_string(),
                genres: self.genres.into_iter().map(|g| g.name).collect(),
                year,
                season,
                image_url,
                alternative_titles: AlternativeTitles {
                    synonyms,
                    japanese: self.title_japanese.unwrap_or_default(),
                    english: self.title_english.unwrap_or_default(),
                },
                information: AnimeInformation {
                    episodes: self.episodes.unwrap_or(0).max(0),
                    status: self.status.unwrap_or_default(),
                    aired: self.aired.and_then(|a| a.string).unwrap_or_default(),
                    premiered: match (&self.season, year) {
                        (Some(season), Some(year)) => {
                            let mut chars = season.chars();
                            chars.next().map_or_else(String::new, |first| {
                                format!("{}{} {year}", first.to_uppercase(), chars.as_str())
                            })
                        }
                        _ => String::new(),
                    },
                    studios: self.studios.into_iter().map(|s| s.name).collect(),
                    source: self.source.unwrap_or_default(),
                    duration: self.duration.unwrap_or_default(),
                },
                statistics: AnimeStatistics {
                    score: score.map_or(0.0, f64::from),
                    ranked: self.rank.unwrap_or(0),
                    popularity: self.popularity.unwrap_or(0),
                    favorites: self.favorites.unwrap_or(0),
                },
                themes: AnimeThemes {
                    openings: theme.openings,
                    endings: theme.endings,
                },
                related,
                ..Enhancement::default()
            },
        }
    }
}

/// REST client for the `MyAnimeList` mirror.
#[derive(Clone)]
pub struct JikanClient {
    client: Client,
    base_url: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl JikanClient {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.limiter.until_ready().await;

        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Jikan request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Jikan API error: {status} - {body}"));
        }

        let response: JikanResponse<T> = response
            .json()
            .await
            .context("Failed to decode Jikan response")?;
        Ok(Some(response.data))
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<MalAnime>> {
        let path = format!("/anime?q={}&limit={limit}", urlencoding::encode(query));
        Ok(self.get(&path).await?.unwrap_or_default())
    }

    /// Full record including themes and relations.
    pub async fn get_full(&self, mal_id: i32) -> Result<Option<MalAnime>> {
        self.get(&format!("/anime/{mal_id}/full")).await
    }

    pub async fn get_characters(&self, mal_id: i32) -> Result<Vec<Character>> {
        let roles: Vec<CharacterRole> = self
            .get(&format!("/anime/{mal_id}/characters"))
            .await?
            .unwrap_or_default();

        Ok(roles
            .into_iter()
            .take(12)
            .map(|entry| {
                let actor = entry
                    .voice_actors
                    .iter()
                    .find(|va| va.language.as_deref() == Some("Japanese"))
                    .or_else(|| entry.voice_actors.first());
                Character {
                    name: entry.character.name,
                    role: entry.role.unwrap_or_default(),
                    image_url: entry
                        .character
                        .images
                        .as_ref()
                        .and_then(Images::best)
                        .unwrap_or_default(),
                    voice_actor: actor.map(|a| a.person.name.clone()).unwrap_or_default(),
                    voice_actor_image_url: actor
                        .and_then(|a| a.person.images.as_ref())
                        .and_then(Images::best)
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Best search match for `name`, resolved to its full record.
    pub async fn find_full(&self, name: &str) -> Result<Option<MalAnime>> {
        let Some(first) = self.search(name, 1).await?.into_iter().next() else {
            return Ok(None);
        };
        Ok(self.get_full(first.mal_id).await?.or(Some(first)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MalAnime {
        serde_json::from_value(serde_json::json!({
            "mal_id": 20,
            "title": "Naruto",
            "title_english": "Naruto",
            "title_japanese": "ナルト",
            "title_synonyms": ["NARUTO"],
            "episodes": 220,
            "status": "Finished Airing",
            "type": "TV",
            "score": 8.0,
            "rank": 660,
            "popularity": 8,
            "season": "fall",
            "year": 2002,
            "images": { "jpg": { "image_url": "https://cdn.example/20.jpg", "large_image_url": "https://cdn.example/20l.jpg" } },
            "genres": [{ "mal_id": 1, "name": "Action" }],
            "theme": { "openings": ["1: \"R★O★C★K★S\""], "endings": [] },
            "relations": [
                { "relation": "Sequel", "entry": [
                    { "mal_id": 1735, "type": "anime", "name": "Naruto: Shippuuden" },
                    { "mal_id": 11, "type": "manga", "name": "Naruto" }
                ] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn full_record_maps_to_external() {
        let anime = sample().into_external();
        assert_eq!(anime.name, "Naruto");
        assert_eq!(anime.score, Some(8.0));

        let details = anime.details;
        assert_eq!(details.mal_id, Some(20));
        assert_eq!(details.kind, Some(AnimeType::Series));
        assert_eq!(details.season, Some(Season::Fall));
        assert_eq!(details.information.premiered, "Fall 2002");
        assert_eq!(details.image_url, "https://cdn.example/20l.jpg");
        assert_eq!(details.themes.openings.len(), 1);
        assert_eq!(details.related.len(), 1);
        assert_eq!(details.related[0].relation_type, "Sequel");
    }

    #[test]
    fn zero_score_means_unscored() {
        let mut anime = sample();
        anime.score = Some(0.0);
        assert_eq!(anime.into_external().score, None);
    }
}

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::domain::{AnimeType, Season};
use crate::models::anime::{
    AlternativeTitles, AnimeInformation, AnimeStatistics, Character, Enhancement, ExternalAnime,
    ImagePair, RelatedAnime, StaffMember,
};

pub const ANILIST_API: &str = "https://graphql.anilist.co";

/// Fields shared by every query that maps into a full record.
const MEDIA_FIELDS: &str = r"
    id
    idMal
    title { romaji english native }
    synonyms
    format
    episodes
    duration
    status
    source
    season
    seasonYear
    startDate { year month day }
    endDate { year month day }
    coverImage { extraLarge large medium }
    bannerImage
    description(asHtml: false)
    averageScore
    popularity
    favourites
    genres
    rankings { rank type allTime }
    studios(isMain: true) { nodes { name isAnimationStudio } }
    nextAiringEpisode { episode }
";

/// Cast, crew and relations; only requested for enhancement lookups.
const DETAIL_FIELDS: &str = r"
    characters(sort: [ROLE, RELEVANCE], perPage: 12) {
        edges {
            role
            node { name { full } image { large } }
            voiceActors(language: JAPANESE) { name { full } image { large } }
        }
    }
    staff(sort: RELEVANCE, perPage: 10) {
        edges { role node { name { full } image { large } } }
    }
    relations {
        edges {
            relationType
            node { title { romaji english } coverImage { large } type }
        }
    }
";

static HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

#[derive(Serialize)]
struct GraphQLRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: Page,
}

#[derive(Deserialize)]
struct Page {
    #[serde(rename = "pageInfo", default)]
    page_info: Option<PageInfo>,
    #[serde(default)]
    media: Vec<Media>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<Media>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i32,
    id_mal: Option<i32>,
    title: Title,
    #[serde(default)]
    synonyms: Vec<String>,
    format: Option<String>,
    episodes: Option<i32>,
    duration: Option<i32>,
    status: Option<String>,
    source: Option<String>,
    season: Option<String>,
    season_year: Option<i32>,
    start_date: Option<FuzzyDate>,
    end_date: Option<FuzzyDate>,
    cover_image: Option<CoverImage>,
    banner_image: Option<String>,
    description: Option<String>,
    average_score: Option<i32>,
    popularity: Option<i32>,
    favourites: Option<i32>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    rankings: Vec<Ranking>,
    studios: Option<Studios>,
    next_airing_episode: Option<NextAiringEpisode>,
    characters: Option<Edges<CharacterEdge>>,
    staff: Option<Edges<StaffEdge>>,
    relations: Option<Edges<RelationEdge>>,
}

#[derive(Debug, Default, Deserialize)]
struct Title {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

impl Title {
    fn preferred(&self) -> Option<String> {
        self.english
            .clone()
            .or_else(|| self.romaji.clone())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FuzzyDate {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

impl FuzzyDate {
    fn render(&self) -> Option<String> {
        let year = self.year?;
        Some(match (self.month, self.day) {
            (Some(m), Some(d)) => format!("{year}-{m:02}-{d:02}"),
            (Some(m), None) => format!("{year}-{m:02}"),
            _ => year.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverImage {
    extra_large: Option<String>,
    large: Option<String>,
    medium: Option<String>,
}

impl CoverImage {
    fn best(self) -> Option<String> {
        self.extra_large.or(self.large).or(self.medium)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ranking {
    rank: i32,
    #[serde(rename = "type")]
    kind: String,
    all_time: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Studios {
    nodes: Vec<StudioNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudioNode {
    name: String,
    is_animation_studio: bool,
}

#[derive(Debug, Deserialize)]
struct NextAiringEpisode {
    episode: i32,
}

#[derive(Debug, Deserialize)]
struct Edges<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PersonName {
    full: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonImage {
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Person {
    name: PersonName,
    image: Option<PersonImage>,
}

impl Person {
    fn image_url(&self) -> String {
        self.image
            .as_ref()
            .and_then(|i| i.large.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterEdge {
    role: Option<String>,
    node: Option<Person>,
    #[serde(default)]
    voice_actors: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct StaffEdge {
    role: Option<String>,
    node: Option<Person>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationEdge {
    relation_type: Option<String>,
    node: Option<RelatedNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedNode {
    title: Title,
    cover_image: Option<CoverImage>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
struct SearchVars<'a> {
    search: &'a str,
    #[serde(rename = "perPage")]
    per_page: u32,
}

#[derive(Serialize)]
struct SeasonVars {
    season: &'static str,
    #[serde(rename = "seasonYear")]
    season_year: i32,
    page: u32,
    #[serde(rename = "perPage")]
    per_page: u32,
}

#[derive(Serialize)]
struct IdVars {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i32>,
    #[serde(rename = "idMal", skip_serializing_if = "Option::is_none")]
    id_mal: Option<i32>,
}

/// GraphQL client for the `AniList` catalog.
#[derive(Clone)]
pub struct AnilistClient {
    client: Client,
    endpoint: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl AnilistClient {
    #[must_use]
    pub fn new(client: Client, endpoint: impl Into<String>, requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            endpoint: endpoint.into(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    async fn post<V: Serialize + Send, T: DeserializeOwned>(
        &self,
        query: &str,
        variables: V,
    ) -> Result<Option<T>> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphQLRequest { query, variables })
            .send()
            .await
            .context("AniList request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AniList API error: {status} - {body}");
        }

        let body: GraphQLResponse<T> = response
            .json()
            .await
            .context("Failed to decode AniList response")?;

        if body.data.is_none()
            && let Some(error) = body.errors.first()
        {
            // A plain "no match" is reported as a 404 inside the payload.
            if error.status == Some(404) {
                return Ok(None);
            }
            anyhow::bail!("AniList query error: {}", error.message);
        }

        Ok(body.data)
    }

    async fn search_page(&self, search: &str, per_page: u32, detailed: bool) -> Result<Vec<Media>> {
        let detail = if detailed { DETAIL_FIELDS } else { "" };
        let query = format!(
            "query ($search: String, $perPage: Int) {{
                Page(page: 1, perPage: $perPage) {{
                    media(search: $search, type: ANIME, sort: SEARCH_MATCH) {{ {MEDIA_FIELDS} {detail} }}
                }}
            }}"
        );

        let data: Option<PageData> = self.post(&query, SearchVars { search, per_page }).await?;
        Ok(data.map(|d| d.page.media).unwrap_or_default())
    }

    /// Best match for `name`, with descriptive fields only.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<ExternalAnime>> {
        let media = self.search_page(name, 1, false).await?;
        Ok(media.into_iter().next().and_then(map_media))
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<ExternalAnime>> {
        let media = self.search_page(query, limit, false).await?;
        Ok(media.into_iter().filter_map(map_media).collect())
    }

    /// Best match for `name` including cast, crew and relations.
    pub async fn find_details(&self, name: &str) -> Result<Option<Enhancement>> {
        let media = self.search_page(name, 1, true).await?;
        Ok(media
            .into_iter()
            .next()
            .and_then(map_media)
            .map(|anime| anime.details))
    }

    pub async fn find_images(&self, name: &str) -> Result<Option<ImagePair>> {
        let query = "query ($search: String, $perPage: Int) {
            Page(page: 1, perPage: $perPage) {
                media(search: $search, type: ANIME, sort: SEARCH_MATCH) {
                    id
                    title { romaji }
                    coverImage { extraLarge large }
                    bannerImage
                }
            }
        }";

        let data: Option<PageData> = self.post(query, SearchVars { search: name, per_page: 1 }).await?;
        Ok(data
            .and_then(|d| d.page.media.into_iter().next())
            .and_then(image_pair))
    }

    pub async fn images_by_ids(
        &self,
        mal_id: Option<i32>,
        anilist_id: Option<i32>,
    ) -> Result<Option<ImagePair>> {
        if mal_id.is_none() && anilist_id.is_none() {
            return Ok(None);
        }

        let query = "query ($id: Int, $idMal: Int) {
            Media(id: $id, idMal: $idMal, type: ANIME) {
                id
                title { romaji }
                coverImage { extraLarge large }
                bannerImage
            }
        }";

        let vars = IdVars {
            id: anilist_id,
            id_mal: mal_id,
        };
        let data: Option<MediaData> = self.post(query, vars).await?;
        Ok(data.and_then(|d| d.media).and_then(image_pair))
    }

    /// One page of a season listing, ordered by popularity.
    ///
    /// Returns the mapped records and whether another page exists.
    pub async fn season_page(
        &self,
        season: Season,
        year: i32,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<ExternalAnime>, bool)> {
        let query = format!(
            "query ($season: MediaSeason, $seasonYear: Int, $page: Int, $perPage: Int) {{
                Page(page: $page, perPage: $perPage) {{
                    pageInfo {{ hasNextPage }}
                    media(season: $season, seasonYear: $seasonYear, type: ANIME, sort: POPULARITY_DESC) {{ {MEDIA_FIELDS} }}
                }}
            }}"
        );

        let vars = SeasonVars {
            season: season.as_media_season(),
            season_year: year,
            page,
            per_page,
        };
        let Some(data) = self.post::<_, PageData>(&query, vars).await? else {
            return Ok((Vec::new(), false));
        };

        let has_next = data.page.page_info.is_some_and(|p| p.has_next_page);
        let anime = data.page.media.into_iter().filter_map(map_media).collect();
        debug!(season = season.as_str(), year, page, has_next, "Fetched season page");
        Ok((anime, has_next))
    }
}

fn image_pair(media: Media) -> Option<ImagePair> {
    let cover_url = media.cover_image.and_then(CoverImage::best).unwrap_or_default();
    let banner_url = media.banner_image.unwrap_or_default();
    if cover_url.is_empty() && banner_url.is_empty() {
        return None;
    }
    Some(ImagePair {
        cover_url,
        banner_url,
    })
}

/// Plain text from an `AniList` description, which may carry HTML.
fn clean_description(raw: &str) -> String {
    let text = raw.replace("<br>", "\n").replace("<br/>", "\n").replace("<br />", "\n");
    let text = HTML_TAG
        .as_ref()
        .map_or_else(|| text.clone(), |re| re.replace_all(&text, "").into_owned());
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("\n\n\n", "\n\n")
        .trim()
        .to_string()
}

fn airing_status(status: &str) -> &str {
    match status {
        "FINISHED" => "Finished Airing",
        "RELEASING" => "Currently Airing",
        "NOT_YET_RELEASED" => "Not yet aired",
        "CANCELLED" => "Cancelled",
        "HIATUS" => "On Hiatus",
        other => other,
    }
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[allow(clippy::cast_precision_loss)]
fn map_media(media: Media) -> Option<ExternalAnime> {
    let name = media.title.preferred()?;

    let year = media
        .season_year
        .or_else(|| media.start_date.as_ref().and_then(|d| d.year));
    let season = media.season.as_deref().and_then(|s| s.parse::<Season>().ok());
    let episodes = media
        .episodes
        .or_else(|| media.next_airing_episode.as_ref().map(|n| n.episode - 1))
        .unwrap_or(0)
        .max(0);

    let mut synonyms = media.synonyms;
    if let Some(romaji) = media.title.romaji.as_ref()
        && *romaji != name
        && !synonyms.contains(romaji)
    {
        synonyms.insert(0, romaji.clone());
    }

    let aired = match (
        media.start_date.as_ref().and_then(FuzzyDate::render),
        media.end_date.as_ref().and_then(FuzzyDate::render),
    ) {
        (Some(start), Some(end)) => format!("{start} to {end}"),
        (Some(start), None) => format!("{start} to ?"),
        _ => String::new(),
    };

    let ranked = media
        .rankings
        .iter()
        .find(|r| r.kind == "RATED" && r.all_time == Some(true))
        .map_or(0, |r| r.rank);

    let score = media.average_score.map(|s| s as f32 / 10.0);

    let characters = media
        .characters
        .map(|c| c.edges)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|edge| {
            let node = edge.node?;
            let actor = edge.voice_actors.first();
            Some(Character {
                name: node.name.full.clone()?,
                role: edge.role.as_deref().map(title_case).unwrap_or_default(),
                image_url: node.image_url(),
                voice_actor: actor.and_then(|a| a.name.full.clone()).unwrap_or_default(),
                voice_actor_image_url: actor.map(Person::image_url).unwrap_or_default(),
            })
        })
        .collect();

    let staff = media
        .staff
        .map(|s| s.edges)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|edge| {
            let node = edge.node?;
            Some(StaffMember {
                name: node.name.full.clone()?,
                role: edge.role.unwrap_or_default(),
                image_url: node.image_url(),
            })
        })
        .collect();

    let related = media
        .relations
        .map(|r| r.edges)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|edge| {
            let node = edge.node?;
            if node.kind.as_deref().is_some_and(|k| k != "ANIME") {
                return None;
            }
            Some(RelatedAnime {
                name: node.title.preferred()?,
                relation_type: edge.relation_type.as_deref().map(title_case).unwrap_or_default(),
                image_url: node.cover_image.and_then(CoverImage::best).unwrap_or_default(),
            })
        })
        .collect();

    let studios = media
        .studios
        .map(|s| {
            s.nodes
                .into_iter()
                .filter(|n| n.is_animation_studio)
                .map(|n| n.name)
                .collect()
        })
        .unwrap_or_default();

    let details = Enhancement {
        mal_id: media.id_mal,
        anilist_id: Some(media.id),
        kind: media.format.as_deref().and_then(AnimeType::from_external),
        synopsis: media
            .description
            .as_deref()
            .map(clean_description)
            .unwrap_or_default(),
        genres: media.genres,
        year,
        season,
        image_url: media.cover_image.and_then(CoverImage::best).unwrap_or_default(),
        banner_url: media.banner_image.unwrap_or_default(),
        alternative_titles: AlternativeTitles {
            synonyms,
            japanese: media.title.native.unwrap_or_default(),
            english: media.title.english.unwrap_or_default(),
        },
        information: AnimeInformation {
            episodes,
            status: media
                .status
                .as_deref()
                .map(|s| airing_status(s).to_string())
                .unwrap_or_default(),
            aired,
            premiered: match (season, year) {
                (Some(season), Some(year)) => format!("{} {year}", title_case(season.as_str())),
                _ => String::new(),
            },
            studios,
            source: media.source.as_deref().map(title_case).unwrap_or_default(),
            duration: media
                .duration
                .map(|d| format!("{d} min per ep"))
                .unwrap_or_default(),
        },
        statistics: AnimeStatistics {
            score: score.map_or(0.0, f64::from),
            ranked,
            popularity: media.popularity.unwrap_or(0),
            favorites: media.favourites.unwrap_or(0),
        },
        characters,
        staff,
        related,
        ..Enhancement::default()
    };

    Some(ExternalAnime {
        name,
        score,
        details,
    })
}

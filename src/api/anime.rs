//! Public catalog endpoints: resolution, search and listings.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::domain::{AnimeId, AnimeType, Season, WatchStatus};
use crate::models::anime::AnimeRecord;
use crate::models::filter::FilterParams;
use crate::models::image::ImageCacheEntry;
use crate::services::{BrowsePage, RankedMatch, SearchRequest};

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `#[serde(flatten)]` cannot decode typed fields from query strings.
#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default, alias = "type")]
    pub format: Option<AnimeType>,
    #[serde(default)]
    pub status: Option<WatchStatus>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl FilterQuery {
    /// Personal lists are only reachable through `/api/me/list`.
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            query: self.q,
            filters: FilterParams {
                name: self.name,
                genre: self.genre,
                year: self.year,
                season: self.season,
                kind: self.format,
                status: self.status,
                user_id: None,
            },
            skip: self.skip,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page", alias = "perPage")]
    pub per_page: u64,
}

const fn default_page() -> u64 {
    1
}

const fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(default, alias = "malId")]
    pub mal_id: Option<i32>,
    #[serde(default, alias = "aniListId")]
    pub anilist_id: Option<i32>,
}

fn parse_id(raw: &str) -> Result<AnimeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("Invalid anime ID: {raw}")))
}

/// `GET /api/anime/resolve/{identifier}`, identifier being an ID or a name.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let record = state.shared.resolver.resolve(&identifier).await?;
    Ok(Json(ApiResponse::success(record)))
}

/// `GET /api/anime/{id}`
pub async fn get_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let record = state.shared.resolver.resolve(&id.to_string()).await?;
    Ok(Json(ApiResponse::success(record)))
}

/// `GET /api/anime/search?q=`: tiered free-text search.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TextQuery>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    let mut results = state
        .shared
        .search
        .search(&SearchRequest::text(query.q))
        .await?;
    if let Some(limit) = query.limit {
        results.truncate(limit);
    }
    Ok(Json(ApiResponse::success(results)))
}

/// `GET /api/anime/filter?name=&genre=&year=&season=&format=&status=&q=`
pub async fn filter(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    let results = state.shared.search.search(&query.into_request()).await?;
    Ok(Json(ApiResponse::success(results)))
}

/// `GET /api/anime/ranked?q=&limit=`
pub async fn ranked(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TextQuery>,
) -> Result<Json<ApiResponse<Vec<RankedMatch>>>, ApiError> {
    let results = state
        .shared
        .search
        .ranked(&query.q, query.limit.unwrap_or(10))
        .await?;
    Ok(Json(ApiResponse::success(results)))
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    Ok(Json(ApiResponse::success(
        state.shared.listings.trending().await?,
    )))
}

pub async fn popular(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    Ok(Json(ApiResponse::success(
        state.shared.listings.popular().await?,
    )))
}

pub async fn spotlight(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    Ok(Json(ApiResponse::success(
        state.shared.listings.spotlight().await?,
    )))
}

pub async fn movies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    Ok(Json(ApiResponse::success(
        state.shared.listings.movies().await?,
    )))
}

pub async fn browse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<ApiResponse<BrowsePage>>, ApiError> {
    let page = state
        .shared
        .listings
        .browse(query.page, query.per_page)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

pub async fn random(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    Ok(Json(ApiResponse::success(
        state.shared.listings.random().await?,
    )))
}

/// `GET /api/images?mal_id=&anilist_id=`
pub async fn images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageQuery>,
) -> Result<Json<ApiResponse<ImageCacheEntry>>, ApiError> {
    let entry = state
        .shared
        .image_cache
        .get_images(query.mal_id, query.anilist_id)
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

//! The caller's profile and personal watch list.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::domain::{AnimeId, AnimeType, Season, WatchStatus};
use crate::models::anime::AnimeRecord;
use crate::models::filter::FilterParams;
use crate::models::user::{CallerIdentity, UserRecord, UserStats};

#[derive(Debug, Deserialize)]
pub struct AddToListRequest {
    pub name: String,
    #[serde(default = "default_status")]
    pub status: WatchStatus,
}

const fn default_status() -> WatchStatus {
    WatchStatus::PlanToWatch
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: WatchStatus,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub score: f32,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub watched: i32,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
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
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn default_limit() -> u64 {
    50
}

fn parse_id(raw: &str) -> Result<AnimeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("Invalid list entry ID: {raw}")))
}

/// `GET /api/me`
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<ApiResponse<UserRecord>>, ApiError> {
    let user = state.shared.users.get(&caller.subject_id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// `GET /api/me/stats`: recomputed on every call.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    let stats = state.shared.users.refresh_stats(&caller.subject_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// `GET /api/me/list`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<AnimeRecord>>>, ApiError> {
    let filters = FilterParams {
        name: query.name,
        genre: query.genre,
        year: query.year,
        season: query.season,
        kind: query.format,
        status: query.status,
        user_id: None,
    };
    let entries = state
        .shared
        .watchlist
        .list(&caller.subject_id, &filters, query.skip, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// `POST /api/me/list`
pub async fn add(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<AddToListRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AnimeRecord>>), ApiError> {
    let entry = state
        .shared
        .watchlist
        .add_to_list(&caller.subject_id, &request.name, request.status)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(entry))))
}

/// `GET /api/me/list/{id}`
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let entry = state.shared.watchlist.get(&caller.subject_id, &id).await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// `PATCH /api/me/list/{id}/status`
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let entry = state
        .shared
        .watchlist
        .update_status(&caller.subject_id, &id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// `PATCH /api/me/list/{id}/score`
pub async fn update_score(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Json(request): Json<ScoreRequest>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let entry = state
        .shared
        .watchlist
        .update_score(&caller.subject_id, &id, request.score)
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// `PATCH /api/me/list/{id}/progress`
pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Json(request): Json<ProgressRequest>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let entry = state
        .shared
        .watchlist
        .update_progress(&caller.subject_id, &id, request.watched)
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// `PATCH /api/me/list/{id}/notes`
pub async fn update_notes(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Json(request): Json<NotesRequest>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let entry = state
        .shared
        .watchlist
        .update_notes(&caller.subject_id, &id, &request.notes)
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// `DELETE /api/me/list/{id}`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let id = parse_id(&id)?;
    state.shared.watchlist.remove(&caller.subject_id, &id).await?;
    Ok(Json(ApiResponse::success(format!("Removed {id}"))))
}

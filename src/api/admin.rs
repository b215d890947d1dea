//! Administrative endpoints. Every route here sits behind the admin guard.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{ApiError, ApiResponse, AppState, CountResponse, SystemStatus, TaskAccepted};
use crate::domain::{AnimeId, UserRole};
use crate::models::anime::{AnimePatch, AnimeRecord};
use crate::models::filter::AnimeQuery;
use crate::models::user::UserRecord;

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

fn parse_id(raw: &str) -> Result<AnimeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("Invalid anime ID: {raw}")))
}

fn accepted(task: &str, queued: bool) -> Result<(StatusCode, Json<ApiResponse<TaskAccepted>>), ApiError> {
    if !queued {
        return Err(ApiError::internal(format!("{task} could not be queued, try again later")));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(TaskAccepted {
            task: task.to_string(),
            queued,
        })),
    ))
}

/// `POST /api/admin/anime`
pub async fn create_anime(
    State(state): State<Arc<AppState>>,
    Json(record): Json<AnimeRecord>,
) -> Result<(StatusCode, Json<ApiResponse<AnimeRecord>>), ApiError> {
    let created = state.shared.catalog.create(record).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// `POST /api/admin/anime/bulk`: duplicates are skipped, not rejected.
pub async fn create_many(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<AnimeRecord>>,
) -> Result<Json<ApiResponse<CountResponse>>, ApiError> {
    let inserted = state.shared.catalog.create_many(records).await?;
    Ok(Json(ApiResponse::success(CountResponse::from_usize(inserted))))
}

/// `PATCH /api/admin/anime/{id}`
pub async fn update_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<AnimePatch>,
) -> Result<Json<ApiResponse<AnimeRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let updated = state.shared.catalog.update(&id, &patch).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// `DELETE /api/admin/anime/{id}`
pub async fn delete_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let id = parse_id(&id)?;
    state.shared.catalog.delete(&id).await?;
    Ok(Json(ApiResponse::success(format!("Deleted {id}"))))
}

/// `DELETE /api/admin/anime`
pub async fn delete_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CountResponse>>, ApiError> {
    let count = state.shared.catalog.delete_all().await?;
    Ok(Json(ApiResponse::success(CountResponse { count })))
}

/// `POST /api/admin/import-dataset?refresh=`: runs in the background.
pub async fn import_dataset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
) -> Result<(StatusCode, Json<ApiResponse<TaskAccepted>>), ApiError> {
    let importer = state.shared.importer.clone();
    let queued = state.shared.pool.submit("import_dataset", async move {
        importer.import_dataset(query.refresh).await.map(|_| ())
    });
    accepted("import_dataset", queued)
}

/// `POST /api/admin/backfill`: runs in the background.
pub async fn backfill(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ApiResponse<TaskAccepted>>), ApiError> {
    let importer = state.shared.importer.clone();
    let queued = state.shared.pool.submit("backfill", async move {
        importer
            .backfill_missing_fields()
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    });
    accepted("backfill", queued)
}

/// `POST /api/admin/update-season`
pub async fn update_season(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CountResponse>>, ApiError> {
    let processed = state.shared.importer.update_current_season().await?;
    Ok(Json(ApiResponse::success(CountResponse::from_usize(processed))))
}

/// `POST /api/admin/upgrade-images?limit=`: returns how many upgrades were queued.
pub async fn upgrade_images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SweepQuery>,
) -> Result<Json<ApiResponse<CountResponse>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(state.shared.config.scheduler.image_sweep_limit);
    let queued = state.shared.images.sweep(limit).await?;
    Ok(Json(ApiResponse::success(CountResponse::from_usize(queued))))
}

/// `PUT /api/admin/users/{id}/role`
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<ApiResponse<UserRecord>>, ApiError> {
    let user = state.shared.users.set_role(&user_id, request.role).await?;
    info!(user_id = %user_id, role = request.role.as_str(), "Role updated by admin");
    Ok(Json(ApiResponse::success(user)))
}

/// `GET /api/admin/status`
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let canonical_anime = state
        .shared
        .store
        .count_anime(&AnimeQuery::canonical())
        .await?;

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.shared.started_at.elapsed().as_secs(),
        canonical_anime,
        jobs: state.shared.pool.stats(),
    })))
}

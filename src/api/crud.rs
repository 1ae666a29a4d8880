//! Generic REST routes for any [`Resource`].
//!
//! Reads are public. Writes require a valid access token.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::services::{CrudService, Page, Resource};
use crate::AppState;

/// `/` and `/:id` routes for `R`, to be nested under its collection path
pub fn routes<R: Resource>() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(read_all::<R>).post(create::<R>))
        .route("/:id", get(read::<R>).put(update::<R>).delete(delete::<R>))
}

fn service<R: Resource>(state: &AppState) -> CrudService<R> {
    CrudService::new(state.db.clone())
}

pub async fn read_all<R: Resource>(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<R::Dto>>, ApiError> {
    let items = service::<R>(&state).read_all(page).await?;
    Ok(Json(items))
}

pub async fn read<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<R::Dto>, ApiError> {
    service::<R>(&state)
        .read(id)
        .await?
        .map(Json)
        .ok_or_else(|| CrudService::<R>::not_found(id))
}

pub async fn create<R: Resource>(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(dto): Json<R::Dto>,
) -> Result<(StatusCode, Json<R::Dto>), ApiError> {
    let created = service::<R>(&state).create(dto).await?;
    tracing::info!(resource = R::NAME, user_id = claims.user_id, "Created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update<R: Resource>(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<R::Patch>,
) -> Result<Json<R::Dto>, ApiError> {
    let updated = service::<R>(&state)
        .update(id, patch)
        .await?
        .ok_or_else(|| CrudService::<R>::not_found(id))?;
    tracing::info!(resource = R::NAME, id, user_id = claims.user_id, "Updated");
    Ok(Json(updated))
}

pub async fn delete<R: Resource>(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !service::<R>(&state).delete(id).await? {
        return Err(CrudService::<R>::not_found(id));
    }
    tracing::info!(resource = R::NAME, id, user_id = claims.user_id, "Deleted");
    Ok(StatusCode::NO_CONTENT)
}

//! Families API endpoints.

use api_types::family::{FamilyAiUpdate, FamilyListResponse, FamilyNew, FamilyView};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

fn map_family(family: engine::Family) -> FamilyView {
    FamilyView {
        id: family.id,
        name: family.name,
        ai_enabled: family.ai_enabled,
    }
}

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<FamilyNew>,
) -> Result<(StatusCode, Json<FamilyView>), ServerError> {
    let family = state
        .engine
        .create_family(&payload.name, payload.ai_enabled.unwrap_or(false))
        .await?;
    Ok((StatusCode::CREATED, Json(map_family(family))))
}

pub async fn list(State(state): State<ServerState>) -> Result<Json<FamilyListResponse>, ServerError> {
    let families = state
        .engine
        .list_families()
        .await?
        .into_iter()
        .map(map_family)
        .collect();
    Ok(Json(FamilyListResponse { families }))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<FamilyView>, ServerError> {
    let family = state.engine.family(family_id).await?;
    Ok(Json(map_family(family)))
}

pub async fn set_ai(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<FamilyAiUpdate>,
) -> Result<Json<FamilyView>, ServerError> {
    let family = state.engine.set_family_ai(family_id, payload.enabled).await?;
    Ok(Json(map_family(family)))
}

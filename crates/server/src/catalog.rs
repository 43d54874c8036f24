//! Categories, merchants and tags API endpoints.

use api_types::catalog::{
    CategoryListResponse, CategoryView, MerchantListResponse, MerchantView, NameNew,
    TagListResponse, TagView,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{ServerError, server::ServerState, transactions::map_source};

fn map_category(category: engine::Category) -> CategoryView {
    CategoryView {
        id: category.id,
        name: category.name,
    }
}

fn map_merchant(merchant: engine::Merchant) -> MerchantView {
    MerchantView {
        id: merchant.id,
        name: merchant.name,
        source: map_source(merchant.source),
    }
}

fn map_tag(tag: engine::Tag) -> TagView {
    TagView {
        id: tag.id,
        name: tag.name,
    }
}

pub async fn list_categories(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<CategoryListResponse>, ServerError> {
    let categories = state
        .engine
        .list_categories(family_id)
        .await?
        .into_iter()
        .map(map_category)
        .collect();
    Ok(Json(CategoryListResponse { categories }))
}

pub async fn create_category(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<NameNew>,
) -> Result<(StatusCode, Json<CategoryView>), ServerError> {
    let category = state
        .engine
        .create_category(family_id, &payload.name)
        .await?;
    Ok((StatusCode::CREATED, Json(map_category(category))))
}

pub async fn list_merchants(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<MerchantListResponse>, ServerError> {
    let merchants = state
        .engine
        .list_merchants(family_id)
        .await?
        .into_iter()
        .map(map_merchant)
        .collect();
    Ok(Json(MerchantListResponse { merchants }))
}

pub async fn create_merchant(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<NameNew>,
) -> Result<(StatusCode, Json<MerchantView>), ServerError> {
    let merchant = state
        .engine
        .create_merchant(family_id, &payload.name)
        .await?;
    Ok((StatusCode::CREATED, Json(map_merchant(merchant))))
}

pub async fn list_tags(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<TagListResponse>, ServerError> {
    let tags = state
        .engine
        .list_tags(family_id)
        .await?
        .into_iter()
        .map(map_tag)
        .collect();
    Ok(Json(TagListResponse { tags }))
}

pub async fn create_tag(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<NameNew>,
) -> Result<(StatusCode, Json<TagView>), ServerError> {
    let tag = state.engine.create_tag(family_id, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(map_tag(tag))))
}

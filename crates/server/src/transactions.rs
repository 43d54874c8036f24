//! Transactions API endpoints

use api_types::{
    Source,
    transaction::{
        TransactionKind as ApiKind, TransactionList, TransactionListResponse, TransactionNew,
        TransactionUpdate, TransactionView,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use engine::{EnrichmentSource, MoneyCents, NewTransaction};
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 500;

pub(crate) fn map_source(source: EnrichmentSource) -> Source {
    match source {
        EnrichmentSource::User => Source::User,
        EnrichmentSource::Rule => Source::Rule,
        EnrichmentSource::Ai => Source::Ai,
    }
}

fn map_kind(kind: engine::TransactionKind) -> ApiKind {
    match kind {
        engine::TransactionKind::Standard => ApiKind::Standard,
        engine::TransactionKind::Transfer => ApiKind::Transfer,
    }
}

fn map_currency(currency: engine::Currency) -> api_types::Currency {
    match currency {
        engine::Currency::Eur => api_types::Currency::Eur,
        engine::Currency::Usd => api_types::Currency::Usd,
        engine::Currency::Gbp => api_types::Currency::Gbp,
        engine::Currency::Chf => api_types::Currency::Chf,
    }
}

fn engine_currency(currency: api_types::Currency) -> engine::Currency {
    match currency {
        api_types::Currency::Eur => engine::Currency::Eur,
        api_types::Currency::Usd => engine::Currency::Usd,
        api_types::Currency::Gbp => engine::Currency::Gbp,
        api_types::Currency::Chf => engine::Currency::Chf,
    }
}

pub(crate) fn map_transaction(tx: engine::Transaction) -> TransactionView {
    TransactionView {
        id: tx.id,
        occurred_on: tx.occurred_on,
        name: tx.name,
        amount_minor: tx.amount.cents(),
        currency: map_currency(tx.currency),
        kind: map_kind(tx.kind),
        excluded: tx.excluded,
        category_id: tx.category_id,
        merchant_id: tx.merchant_id,
        tag_ids: tx.tag_ids,
        category_source: tx.category_source.map(map_source),
        merchant_source: tx.merchant_source.map(map_source),
        name_source: tx.name_source.map(map_source),
        tags_source: tx.tags_source.map(map_source),
        updated_at: tx.updated_at,
    }
}

pub async fn list(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Query(payload): Query<TransactionList>,
) -> Result<Json<TransactionListResponse>, ServerError> {
    let limit = payload.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ServerError::Generic(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let filter = engine::TransactionListFilter {
        from: payload.from,
        to: payload.to,
        include_excluded: payload.include_excluded.unwrap_or(false),
        include_transfers: payload.include_transfers.unwrap_or(false),
        uncategorized: payload.uncategorized.unwrap_or(false),
    };

    let (txs, next_cursor) = state
        .engine
        .list_transactions_page(family_id, limit, payload.cursor.as_deref(), &filter)
        .await?;

    Ok(Json(TransactionListResponse {
        transactions: txs.into_iter().map(map_transaction).collect(),
        next_cursor,
    }))
}

pub async fn create(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<TransactionNew>,
) -> Result<(StatusCode, Json<TransactionView>), ServerError> {
    let mut cmd = NewTransaction::new(
        family_id,
        payload.occurred_on,
        payload.name,
        MoneyCents::new(payload.amount_minor),
    )
    .currency(engine_currency(payload.currency.unwrap_or_default()))
    .excluded(payload.excluded.unwrap_or(false))
    .tag_ids(payload.tag_ids);
    if payload.kind == Some(ApiKind::Transfer) {
        cmd = cmd.kind(engine::TransactionKind::Transfer);
    }
    if let Some(category_id) = payload.category_id {
        cmd = cmd.category_id(category_id);
    }
    if let Some(merchant_id) = payload.merchant_id {
        cmd = cmd.merchant_id(merchant_id);
    }

    let tx = state.engine.create_transaction(cmd).await?;
    Ok((StatusCode::CREATED, Json(map_transaction(tx))))
}

pub async fn get(
    State(state): State<ServerState>,
    Path((family_id, transaction_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TransactionView>, ServerError> {
    let tx = state.engine.transaction(family_id, transaction_id).await?;
    Ok(Json(map_transaction(tx)))
}

pub async fn update(
    State(state): State<ServerState>,
    Path((family_id, transaction_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TransactionUpdate>,
) -> Result<Json<TransactionView>, ServerError> {
    let update = engine::TransactionUpdate {
        name: payload.name,
        category_id: payload.category_id,
        merchant_id: payload.merchant_id,
        tag_ids: payload.tag_ids,
        excluded: payload.excluded,
    };
    let tx = state
        .engine
        .update_transaction(family_id, transaction_id, update)
        .await?;
    Ok(Json(map_transaction(tx)))
}

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Currency, EngineError, EnrichmentProvider, EnrichmentRequest, EnrichmentRow,
    EnrichmentSource, EnrichmentSubject, MoneyCents, ResultEngine, categories, merchants,
    scope::TransactionScope,
    transactions,
    util::{normalize_display, normalize_key},
};

use super::{ActionAborted, ActionOutcome, ExecResult, ExecutionContext};

/// Fills empty categories with provider suggestions that name an existing
/// family category.
pub(super) async fn auto_categorize(
    ctx: &ExecutionContext<'_>,
    scope: &TransactionScope,
) -> ExecResult {
    let provider = require_provider(ctx)?;
    let matched = scope.count(ctx.db).await?;
    let eligible = scope
        .select()
        .filter(transactions::Column::CategoryId.is_null())
        .filter(transactions::Column::CategorySource.is_null())
        .order_by_asc(transactions::Column::OccurredOn)
        .order_by_asc(transactions::Column::Id)
        .all(ctx.db)
        .await?;
    if eligible.is_empty() {
        return Ok(ActionOutcome::new(matched, 0));
    }

    let family_categories = categories::Entity::find()
        .filter(categories::Column::FamilyId.eq(ctx.family_id))
        .order_by_asc(categories::Column::Name)
        .all(ctx.db)
        .await?;
    let by_key: HashMap<&str, Uuid> = family_categories
        .iter()
        .map(|c| (c.name_norm.as_str(), c.id))
        .collect();
    let candidates: Vec<String> = family_categories.iter().map(|c| c.name.clone()).collect();
    let merchant_names = merchant_names(ctx.db, &eligible).await?;

    let mut updated = 0;
    let mut processed = 0;
    for batch in eligible.chunks(ctx.ai_batch_size.max(1)) {
        let request = EnrichmentRequest {
            family_id: ctx.family_id,
            subject: EnrichmentSubject::Category,
            candidates: candidates.clone(),
            rows: enrichment_rows(batch, &merchant_names)?,
        };
        let response = match provider.batch_suggest(request).await {
            Ok(response) => response,
            Err(err) => {
                return Err(aborted(matched, processed, updated, err.into()));
            }
        };

        for row in batch {
            let Some(suggestion) = response.suggestion(row.id) else {
                continue;
            };
            let Some(category_id) = normalize_key(suggestion)
                .and_then(|key| by_key.get(key.as_str()).copied())
            else {
                tracing::debug!(
                    transaction_id = %row.id,
                    suggestion,
                    "suggested category is not a family category"
                );
                continue;
            };
            let result = transactions::Entity::update_many()
                .col_expr(transactions::Column::CategoryId, Expr::value(category_id))
                .col_expr(
                    transactions::Column::CategorySource,
                    Expr::value(EnrichmentSource::Ai.as_str()),
                )
                .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transactions::Column::Id.eq(row.id))
                .filter(transactions::Column::CategoryId.is_null())
                .filter(transactions::Column::CategorySource.is_null())
                .exec(ctx.db)
                .await
                .map_err(|err| aborted(matched, processed, updated, err.into()))?;
            updated += result.rows_affected;
        }
        processed += batch.len() as u64;
    }

    Ok(ActionOutcome::new(matched, updated))
}

/// Fills empty merchants with provider suggestions, creating family
/// merchants (source `ai`) for names not seen before.
pub(super) async fn auto_detect_merchants(
    ctx: &ExecutionContext<'_>,
    scope: &TransactionScope,
) -> ExecResult {
    let provider = require_provider(ctx)?;
    let matched = scope.count(ctx.db).await?;
    let eligible = scope
        .select()
        .filter(transactions::Column::MerchantId.is_null())
        .filter(transactions::Column::MerchantSource.is_null())
        .order_by_asc(transactions::Column::OccurredOn)
        .order_by_asc(transactions::Column::Id)
        .all(ctx.db)
        .await?;
    if eligible.is_empty() {
        return Ok(ActionOutcome::new(matched, 0));
    }

    let candidates: Vec<String> = merchants::Entity::find()
        .filter(merchants::Column::FamilyId.eq(ctx.family_id))
        .order_by_asc(merchants::Column::Name)
        .all(ctx.db)
        .await?
        .into_iter()
        .map(|m| m.name)
        .collect();

    let mut resolved: HashMap<String, Uuid> = HashMap::new();
    let mut updated = 0;
    let mut processed = 0;
    for batch in eligible.chunks(ctx.ai_batch_size.max(1)) {
        let request = EnrichmentRequest {
            family_id: ctx.family_id,
            subject: EnrichmentSubject::Merchant,
            candidates: candidates.clone(),
            rows: enrichment_rows(batch, &HashMap::new())?,
        };
        let response = match provider.batch_suggest(request).await {
            Ok(response) => response,
            Err(err) => {
                return Err(aborted(matched, processed, updated, err.into()));
            }
        };

        for row in batch {
            let Some(suggestion) = response.suggestion(row.id) else {
                continue;
            };
            let merchant_id =
                find_or_create_merchant(ctx.db, ctx.family_id, suggestion, &mut resolved)
                    .await
                    .map_err(|err| aborted(matched, processed, updated, err))?;
            let Some(merchant_id) = merchant_id else {
                continue;
            };
            let result = transactions::Entity::update_many()
                .col_expr(transactions::Column::MerchantId, Expr::value(merchant_id))
                .col_expr(
                    transactions::Column::MerchantSource,
                    Expr::value(EnrichmentSource::Ai.as_str()),
                )
                .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transactions::Column::Id.eq(row.id))
                .filter(transactions::Column::MerchantId.is_null())
                .filter(transactions::Column::MerchantSource.is_null())
                .exec(ctx.db)
                .await
                .map_err(|err| aborted(matched, processed, updated, err.into()))?;
            updated += result.rows_affected;
        }
        processed += batch.len() as u64;
    }

    Ok(ActionOutcome::new(matched, updated))
}

fn require_provider<'a>(ctx: &ExecutionContext<'a>) -> ResultEngine<&'a dyn EnrichmentProvider> {
    ctx.provider.ok_or_else(|| {
        EngineError::Configuration("no enrichment provider is configured".to_string())
    })
}

/// Counters committed before the failure: rows of finished batches that were
/// not updated count as skipped, unprocessed rows are not counted.
fn aborted(matched: u64, processed: u64, updated: u64, error: EngineError) -> ActionAborted {
    ActionAborted {
        partial: ActionOutcome {
            matched,
            updated,
            skipped: processed.saturating_sub(updated),
        },
        error,
    }
}

fn enrichment_rows(
    batch: &[transactions::Model],
    merchant_names: &HashMap<Uuid, String>,
) -> ResultEngine<Vec<EnrichmentRow>> {
    batch
        .iter()
        .map(|row| {
            Ok(EnrichmentRow {
                id: row.id,
                name: row.name.clone(),
                amount: MoneyCents::new(row.amount_minor),
                currency: Currency::try_from(row.currency.as_str())?,
                merchant: row
                    .merchant_id
                    .and_then(|id| merchant_names.get(&id).cloned()),
            })
        })
        .collect()
}

async fn merchant_names(
    db: &DatabaseConnection,
    rows: &[transactions::Model],
) -> ResultEngine<HashMap<Uuid, String>> {
    let mut ids: Vec<Uuid> = rows.iter().filter_map(|row| row.merchant_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut names = HashMap::new();
    for chunk in ids.chunks(500) {
        let models = merchants::Entity::find()
            .filter(merchants::Column::Id.is_in(chunk.iter().copied()))
            .all(db)
            .await?;
        names.extend(models.into_iter().map(|m| (m.id, m.name)));
    }
    Ok(names)
}

/// Resolves a suggested merchant name to a family merchant, creating it when
/// missing. Returns `None` for names that normalize to nothing.
async fn find_or_create_merchant(
    db: &DatabaseConnection,
    family_id: Uuid,
    suggestion: &str,
    resolved: &mut HashMap<String, Uuid>,
) -> ResultEngine<Option<Uuid>> {
    let Ok(display) = normalize_display(suggestion, "merchant") else {
        return Ok(None);
    };
    let Some(key) = normalize_key(&display) else {
        return Ok(None);
    };
    if let Some(id) = resolved.get(&key) {
        return Ok(Some(*id));
    }

    let existing = merchants::Entity::find()
        .filter(merchants::Column::FamilyId.eq(family_id))
        .filter(merchants::Column::NameNorm.eq(key.clone()))
        .one(db)
        .await?;
    let id = match existing {
        Some(model) => model.id,
        None => {
            let id = Uuid::new_v4();
            let active = merchants::ActiveModel {
                id: ActiveValue::Set(id),
                family_id: ActiveValue::Set(family_id),
                name: ActiveValue::Set(display),
                name_norm: ActiveValue::Set(key.clone()),
                source: ActiveValue::Set(EnrichmentSource::Ai.as_str().to_string()),
            };
            match active.insert(db).await {
                Ok(_) => {
                    tracing::info!(%family_id, merchant_id = %id, "created merchant from suggestion");
                    id
                }
                // A concurrent run created the same merchant first.
                Err(err) => merchants::Entity::find()
                    .filter(merchants::Column::FamilyId.eq(family_id))
                    .filter(merchants::Column::NameNorm.eq(key.clone()))
                    .one(db)
                    .await?
                    .map(|m| m.id)
                    .ok_or(err)?,
            }
        }
    };
    resolved.insert(key, id);
    Ok(Some(id))
}

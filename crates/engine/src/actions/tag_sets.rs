use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sea_orm::{
    ColumnTrait, EntityTrait, QueryFilter, QuerySelect, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{EnrichmentSource, scope::TransactionScope, transaction_tags, transactions};

use super::{ActionOutcome, ExecResult, ExecutionContext, rule_writable};

/// Bound on ids per `IN (...)` list.
const CHUNK: usize = 500;

/// Replaces the tag set of every writable row whose current set differs.
///
/// Runs in one DB transaction: either every changed row gets the new set or
/// none does.
pub(super) async fn replace_tags(
    ctx: &ExecutionContext<'_>,
    scope: &TransactionScope,
    tag_ids: &[Uuid],
) -> ExecResult {
    let target: BTreeSet<Uuid> = tag_ids.iter().copied().collect();
    let db_tx = ctx.db.begin().await?;

    let matched = scope.count(&db_tx).await?;
    let mut select = scope.select();
    if !ctx.ignore_locks {
        select = select.filter(rule_writable(transactions::Column::TagsSource));
    }
    let candidates: Vec<Uuid> = select
        .select_only()
        .column(transactions::Column::Id)
        .into_tuple()
        .all(&db_tx)
        .await?;

    let mut current: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    for chunk in candidates.chunks(CHUNK) {
        let links = transaction_tags::Entity::find()
            .filter(transaction_tags::Column::TransactionId.is_in(chunk.iter().copied()))
            .all(&db_tx)
            .await?;
        for link in links {
            current
                .entry(link.transaction_id)
                .or_default()
                .insert(link.tag_id);
        }
    }

    let changed: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| current.get(id) != Some(&target))
        .collect();

    let now = Utc::now();
    for chunk in changed.chunks(CHUNK) {
        transaction_tags::Entity::delete_many()
            .filter(transaction_tags::Column::TransactionId.is_in(chunk.iter().copied()))
            .exec(&db_tx)
            .await?;
        if !target.is_empty() {
            let links = chunk.iter().flat_map(|transaction_id| {
                target.iter().map(move |tag_id| transaction_tags::ActiveModel {
                    transaction_id: sea_orm::ActiveValue::Set(*transaction_id),
                    tag_id: sea_orm::ActiveValue::Set(*tag_id),
                })
            });
            transaction_tags::Entity::insert_many(links)
                .exec_without_returning(&db_tx)
                .await?;
        }
        transactions::Entity::update_many()
            .col_expr(
                transactions::Column::TagsSource,
                Expr::value(EnrichmentSource::Rule.as_str()),
            )
            .col_expr(transactions::Column::UpdatedAt, Expr::value(now))
            .filter(transactions::Column::Id.is_in(chunk.iter().copied()))
            .exec(&db_tx)
            .await?;
    }

    db_tx.commit().await?;

    let updated = u64::try_from(changed.len()).unwrap_or(u64::MAX);
    Ok(ActionOutcome::new(matched, updated))
}

use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, Value, sea_query::Expr};

use crate::{EnrichmentSource, scope::TransactionScope, transactions};

use super::{ActionOutcome, ExecResult, ExecutionContext, rule_writable};

/// Sets `value_col` on every writable row of the scope whose value differs,
/// in one statement. Rows with a `user` source are left alone unless the run
/// ignores locks. `derived` is a column kept in step with `value_col`.
pub(super) async fn set_column(
    ctx: &ExecutionContext<'_>,
    scope: &TransactionScope,
    value_col: transactions::Column,
    source_col: transactions::Column,
    value: Value,
    derived: Option<(transactions::Column, Value)>,
) -> ExecResult {
    let matched = scope.count(ctx.db).await?;
    if matched == 0 {
        return Ok(ActionOutcome::default());
    }

    let mut update = transactions::Entity::update_many()
        .col_expr(value_col, Expr::value(value.clone()))
        .col_expr(source_col, Expr::value(EnrichmentSource::Rule.as_str()))
        .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(transactions::Column::Id.in_subquery(scope.id_subquery()))
        .filter(
            Condition::any()
                .add(value_col.is_null())
                .add(value_col.ne(value)),
        );
    if let Some((col, derived)) = derived {
        update = update.col_expr(col, Expr::value(derived));
    }
    if !ctx.ignore_locks {
        update = update.filter(rule_writable(source_col));
    }
    let result = update.exec(ctx.db).await?;

    Ok(ActionOutcome::new(matched, result.rows_affected))
}

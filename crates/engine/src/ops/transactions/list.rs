use base64::Engine as _;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, prelude::*};

use crate::{EngineError, ResultEngine, Transaction, TransactionKind, transactions};

use super::super::Engine;
use super::build_transactions;

/// Filters for listing transactions.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`).
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// If true, includes excluded transactions (default: false).
    pub include_excluded: bool,
    /// If true, includes transfers (default: false).
    pub include_transfers: bool,
    /// Only rows without a category.
    pub uncategorized: bool,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::InvalidCursor(
            "invalid range: from must be < to".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TransactionsCursor {
    occurred_on: NaiveDate,
    transaction_id: Uuid,
}

impl TransactionsCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))
    }
}

impl Engine {
    /// Lists a family's transactions with cursor-based pagination.
    ///
    /// Pagination is newest → older by `(occurred_on DESC, id DESC)`.
    pub async fn list_transactions_page(
        &self,
        family_id: Uuid,
        limit: u64,
        cursor: Option<&str>,
        filter: &TransactionListFilter,
    ) -> ResultEngine<(Vec<Transaction>, Option<String>)> {
        self.require_family(&self.database, family_id).await?;
        validate_list_filter(filter)?;

        let limit_plus_one = limit.saturating_add(1);
        let mut query = transactions::Entity::find()
            .filter(transactions::Column::FamilyId.eq(family_id))
            .order_by_desc(transactions::Column::OccurredOn)
            .order_by_desc(transactions::Column::Id)
            .limit(limit_plus_one);

        if let Some(cursor) = cursor {
            let cursor = TransactionsCursor::decode(cursor)?;
            query = query.filter(
                Condition::any()
                    .add(transactions::Column::OccurredOn.lt(cursor.occurred_on))
                    .add(
                        Condition::all()
                            .add(transactions::Column::OccurredOn.eq(cursor.occurred_on))
                            .add(transactions::Column::Id.lt(cursor.transaction_id)),
                    ),
            );
        }
        if let Some(from) = filter.from {
            query = query.filter(transactions::Column::OccurredOn.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(transactions::Column::OccurredOn.lt(to));
        }
        if !filter.include_excluded {
            query = query.filter(transactions::Column::Excluded.eq(false));
        }
        if !filter.include_transfers {
            query = query
                .filter(transactions::Column::Kind.ne(TransactionKind::Transfer.as_str()));
        }
        if filter.uncategorized {
            query = query.filter(transactions::Column::CategoryId.is_null());
        }

        let rows: Vec<transactions::Model> = query.all(&self.database).await?;
        let has_more = rows.len() > limit as usize;
        let rows: Vec<transactions::Model> = rows.into_iter().take(limit as usize).collect();
        let out = build_transactions(&self.database, rows).await?;

        let next_cursor = if has_more {
            out.last()
                .map(|tx| TransactionsCursor {
                    occurred_on: tx.occurred_on,
                    transaction_id: tx.id,
                })
                .map(|c| c.encode())
                .transpose()?
        } else {
            None
        };

        Ok((out, next_cursor))
    }

    pub async fn list_transactions(
        &self,
        family_id: Uuid,
        limit: u64,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        let (items, _next) = self
            .list_transactions_page(family_id, limit, None, filter)
            .await?;
        Ok(items)
    }
}

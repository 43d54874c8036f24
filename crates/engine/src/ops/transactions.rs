use std::collections::HashMap;

use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{ResultEngine, Transaction, transaction_tags, transactions};

mod list;
mod write;

pub use list::TransactionListFilter;

/// Tag ids per transaction, sorted.
pub(super) async fn load_tag_ids<C: ConnectionTrait>(
    db: &C,
    transaction_ids: &[Uuid],
) -> ResultEngine<HashMap<Uuid, Vec<Uuid>>> {
    let mut out: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for chunk in transaction_ids.chunks(500) {
        let links = transaction_tags::Entity::find()
            .filter(transaction_tags::Column::TransactionId.is_in(chunk.iter().copied()))
            .order_by_asc(transaction_tags::Column::TagId)
            .all(db)
            .await?;
        for link in links {
            out.entry(link.transaction_id).or_default().push(link.tag_id);
        }
    }
    Ok(out)
}

pub(super) async fn build_transactions<C: ConnectionTrait>(
    db: &C,
    models: Vec<transactions::Model>,
) -> ResultEngine<Vec<Transaction>> {
    let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
    let mut tag_ids = load_tag_ids(db, &ids).await?;
    models
        .into_iter()
        .map(|model| {
            let tags = tag_ids.remove(&model.id).unwrap_or_default();
            Transaction::from_model(model, tags)
        })
        .collect()
}

use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, EnrichmentSource, NewTransaction, ResultEngine, Transaction, TransactionUpdate,
    transaction_tags, transactions,
    util::{fold_case, normalize_display},
};

use super::super::{Engine, with_tx};
use super::load_tag_ids;

fn user_source() -> Option<String> {
    Some(EnrichmentSource::User.as_str().to_string())
}

impl Engine {
    /// Records a transaction. Category, merchant and tags given here are user
    /// values and are locked against rules and AI.
    pub async fn create_transaction(&self, cmd: NewTransaction) -> ResultEngine<Transaction> {
        let name = normalize_display(&cmd.name, "transaction")?;
        with_tx!(self, |db_tx| {
            self.require_family(&db_tx, cmd.family_id).await?;
            self.require_references(&db_tx, cmd.family_id, cmd.category_id, cmd.merchant_id, &cmd.tag_ids)
                .await?;

            let now = Utc::now();
            let id = Uuid::new_v4();
            let model = transactions::ActiveModel {
                id: ActiveValue::Set(id),
                family_id: ActiveValue::Set(cmd.family_id),
                occurred_on: ActiveValue::Set(cmd.occurred_on),
                name_folded: ActiveValue::Set(fold_case(&name)),
                name: ActiveValue::Set(name),
                amount_minor: ActiveValue::Set(cmd.amount.cents()),
                currency: ActiveValue::Set(cmd.currency.code().to_string()),
                kind: ActiveValue::Set(cmd.kind.as_str().to_string()),
                excluded: ActiveValue::Set(cmd.excluded),
                category_id: ActiveValue::Set(cmd.category_id),
                merchant_id: ActiveValue::Set(cmd.merchant_id),
                category_source: ActiveValue::Set(cmd.category_id.and_then(|_| user_source())),
                merchant_source: ActiveValue::Set(cmd.merchant_id.and_then(|_| user_source())),
                name_source: ActiveValue::Set(None),
                tags_source: ActiveValue::Set(if cmd.tag_ids.is_empty() {
                    None
                } else {
                    user_source()
                }),
                created_at: ActiveValue::Set(now),
                updated_at: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;

            let tag_ids = dedup(cmd.tag_ids);
            replace_links(&db_tx, id, &tag_ids).await?;
            Transaction::from_model(model, tag_ids)
        })
    }

    pub async fn transaction(&self, family_id: Uuid, transaction_id: Uuid) -> ResultEngine<Transaction> {
        let model = self
            .require_transaction_in_family(&self.database, family_id, transaction_id)
            .await?;
        let mut tags = load_tag_ids(&self.database, &[transaction_id]).await?;
        Transaction::from_model(model, tags.remove(&transaction_id).unwrap_or_default())
    }

    /// Manual edit. Every field present in `update` becomes a user value.
    pub async fn update_transaction(
        &self,
        family_id: Uuid,
        transaction_id: Uuid,
        update: TransactionUpdate,
    ) -> ResultEngine<Transaction> {
        let name = update
            .name
            .as_deref()
            .map(|n| normalize_display(n, "transaction"))
            .transpose()?;
        with_tx!(self, |db_tx| {
            let model = self
                .require_transaction_in_family(&db_tx, family_id, transaction_id)
                .await?;
            self.require_references(
                &db_tx,
                family_id,
                update.category_id.flatten(),
                update.merchant_id.flatten(),
                update.tag_ids.as_deref().unwrap_or_default(),
            )
            .await?;

            let mut tags = load_tag_ids(&db_tx, &[transaction_id]).await?;
            let mut tag_ids = tags.remove(&transaction_id).unwrap_or_default();
            if update.is_empty() {
                return Transaction::from_model(model, tag_ids);
            }

            let mut active: transactions::ActiveModel = model.into();
            if let Some(name) = name {
                active.name_folded = ActiveValue::Set(fold_case(&name));
                active.name = ActiveValue::Set(name);
                active.name_source = ActiveValue::Set(user_source());
            }
            if let Some(category_id) = update.category_id {
                active.category_id = ActiveValue::Set(category_id);
                active.category_source = ActiveValue::Set(user_source());
            }
            if let Some(merchant_id) = update.merchant_id {
                active.merchant_id = ActiveValue::Set(merchant_id);
                active.merchant_source = ActiveValue::Set(user_source());
            }
            if let Some(excluded) = update.excluded {
                active.excluded = ActiveValue::Set(excluded);
            }
            if let Some(new_tags) = update.tag_ids {
                tag_ids = dedup(new_tags);
                replace_links(&db_tx, transaction_id, &tag_ids).await?;
                active.tags_source = ActiveValue::Set(user_source());
            }
            active.updated_at = ActiveValue::Set(Utc::now());
            let model = active.update(&db_tx).await?;

            tracing::debug!(%family_id, %transaction_id, "transaction edited by user");
            Transaction::from_model(model, tag_ids)
        })
    }

    async fn require_transaction_in_family<C: ConnectionTrait>(
        &self,
        db: &C,
        family_id: Uuid,
        transaction_id: Uuid,
    ) -> ResultEngine<transactions::Model> {
        transactions::Entity::find_by_id(transaction_id)
            .filter(transactions::Column::FamilyId.eq(family_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("transaction not exists".to_string()))
    }

    async fn require_references(
        &self,
        db_tx: &DatabaseTransaction,
        family_id: Uuid,
        category_id: Option<Uuid>,
        merchant_id: Option<Uuid>,
        tag_ids: &[Uuid],
    ) -> ResultEngine<()> {
        if let Some(category_id) = category_id {
            self.require_category_in_family(db_tx, family_id, category_id)
                .await?;
        }
        if let Some(merchant_id) = merchant_id {
            self.require_merchant_in_family(db_tx, family_id, merchant_id)
                .await?;
        }
        for tag_id in tag_ids {
            self.require_tag_in_family(db_tx, family_id, *tag_id).await?;
        }
        Ok(())
    }
}

fn dedup(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

async fn replace_links(
    db_tx: &DatabaseTransaction,
    transaction_id: Uuid,
    tag_ids: &[Uuid],
) -> ResultEngine<()> {
    transaction_tags::Entity::delete_many()
        .filter(transaction_tags::Column::TransactionId.eq(transaction_id))
        .exec(db_tx)
        .await?;
    if tag_ids.is_empty() {
        return Ok(());
    }
    transaction_tags::Entity::insert_many(tag_ids.iter().map(|tag_id| {
        transaction_tags::ActiveModel {
            transaction_id: ActiveValue::Set(transaction_id),
            tag_id: ActiveValue::Set(*tag_id),
        }
    }))
    .exec_without_returning(db_tx)
    .await?;
    Ok(())
}

//! Transactions: the rows rules are evaluated against.
//!
//! A transaction is visible to rules when it is not `excluded` and is not a
//! transfer between the family's own accounts. The `*_source` columns record
//! which writer last set the corresponding field (see
//! [`EnrichmentSource`](crate::EnrichmentSource)).

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, EnrichmentSource, MoneyCents, ResultEngine};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Standard,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Transfer => "transfer",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "standard" => Ok(Self::Standard),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::Configuration(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub family_id: Uuid,
    pub occurred_on: NaiveDate,
    pub name: String,
    pub amount: MoneyCents,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub excluded: bool,
    pub category_id: Option<Uuid>,
    pub merchant_id: Option<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub category_source: Option<EnrichmentSource>,
    pub merchant_source: Option<EnrichmentSource>,
    pub name_source: Option<EnrichmentSource>,
    pub tags_source: Option<EnrichmentSource>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub family_id: Uuid,
    pub occurred_on: Date,
    pub name: String,
    pub name_folded: String,
    pub amount_minor: i64,
    pub currency: String,
    pub kind: String,
    pub excluded: bool,
    pub category_id: Option<Uuid>,
    pub merchant_id: Option<Uuid>,
    pub category_source: Option<String>,
    pub merchant_source: Option<String>,
    pub name_source: Option<String>,
    pub tags_source: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::families::Entity",
        from = "Column::FamilyId",
        to = "super::families::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Family,
    #[sea_orm(
        belongs_to = "super::merchants::Entity",
        from = "Column::MerchantId",
        to = "super::merchants::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Merchant,
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Category,
    #[sea_orm(has_many = "super::transaction_tags::Entity")]
    TransactionTags,
}

impl Related<super::families::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Family.def()
    }
}

impl Related<super::merchants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Merchant.def()
    }
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::transaction_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionTags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn parse_source(value: Option<&str>) -> ResultEngine<Option<EnrichmentSource>> {
    value.map(EnrichmentSource::try_from).transpose()
}

impl Transaction {
    /// Builds the domain value from a stored row and its tag ids.
    pub(crate) fn from_model(model: Model, tag_ids: Vec<Uuid>) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            family_id: model.family_id,
            occurred_on: model.occurred_on,
            name: model.name,
            amount: MoneyCents::new(model.amount_minor),
            currency: Currency::try_from(model.currency.as_str())?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            excluded: model.excluded,
            category_id: model.category_id,
            merchant_id: model.merchant_id,
            tag_ids,
            category_source: parse_source(model.category_source.as_deref())?,
            merchant_source: parse_source(model.merchant_source.as_deref())?,
            name_source: parse_source(model.name_source.as_deref())?,
            tags_source: parse_source(model.tags_source.as_deref())?,
            updated_at: model.updated_at,
        })
    }
}

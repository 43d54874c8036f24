//! Condition filters: how a rule narrows its scope.
//!
//! Each [`ConditionKind`] declares a [`FilterType`], which fixes the set of
//! [`Operator`]s it accepts and the shape of its [`ConditionValue`]. Filters
//! work in two steps over a [`TransactionScope`]:
//!
//! 1. `prepare` registers the joins the filter needs (idempotent);
//! 2. `apply` adds a parameterized predicate.
//!
//! All `prepare` calls of a rule run before any `apply`.

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
    sea_query::{Alias, Expr, Func, LikeExpr},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, ResultEngine, categories, merchants,
    scope::{ScopeJoin, TransactionScope},
    transactions,
    util::{escape_like, fold_case},
};

const MAX_TEXT_LEN: usize = 256;

/// Declared value type of a filter or an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Text,
    Number,
    Select,
}

impl FilterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Select => "select",
        }
    }

    /// Operators accepted by filters of this type, in display order.
    pub fn operators(self) -> &'static [Operator] {
        match self {
            Self::Text => &[Operator::Like, Operator::Equal],
            Self::Number => &[
                Operator::GreaterThan,
                Operator::GreaterThanOrEqual,
                Operator::LessThan,
                Operator::LessThanOrEqual,
                Operator::Equal,
            ],
            Self::Select => &[Operator::Equal, Operator::In],
        }
    }

    pub fn accepts(self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "in")]
    In,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Equal => "=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::In => "in",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Like => "contains",
            Self::Equal => "equal to",
            Self::GreaterThan => "greater than",
            Self::GreaterThanOrEqual => "greater or equal to",
            Self::LessThan => "less than",
            Self::LessThanOrEqual => "less than or equal to",
            Self::In => "is one of",
        }
    }
}

impl TryFrom<&str> for Operator {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "like" => Ok(Self::Like),
            "=" => Ok(Self::Equal),
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            "in" => Ok(Self::In),
            other => Err(EngineError::Configuration(format!(
                "unknown operator: {other}"
            ))),
        }
    }
}

/// A condition value parsed according to its filter type and operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    Text(String),
    /// Non-negative amount compared against `ABS(amount)`.
    Amount(MoneyCents),
    Id(Uuid),
    Ids(Vec<Uuid>),
}

impl ConditionValue {
    /// Parses a raw value. The error is a user-facing message.
    pub fn parse(
        filter_type: FilterType,
        operator: Operator,
        raw: Option<&str>,
    ) -> Result<Self, String> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        let Some(raw) = raw else {
            return Err("value is required".to_string());
        };
        match (filter_type, operator) {
            (FilterType::Text, _) => {
                if raw.chars().count() > MAX_TEXT_LEN {
                    return Err(format!("value must be at most {MAX_TEXT_LEN} characters"));
                }
                Ok(Self::Text(raw.to_string()))
            }
            (FilterType::Number, _) => {
                let amount = raw
                    .parse::<MoneyCents>()
                    .map_err(|_| format!("'{raw}' is not a valid amount"))?;
                if amount.is_negative() {
                    return Err("amount must not be negative".to_string());
                }
                Ok(Self::Amount(amount))
            }
            (FilterType::Select, Operator::In) => parse_id_list(raw).map(Self::Ids),
            (FilterType::Select, _) => parse_id(raw).map(Self::Id),
        }
    }

    /// Canonical stored form.
    pub fn to_raw(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Amount(amount) => amount.to_string(),
            Self::Id(id) => id.to_string(),
            Self::Ids(ids) => ids
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Record ids the value points at.
    pub fn referenced_ids(&self) -> &[Uuid] {
        match self {
            Self::Id(id) => std::slice::from_ref(id),
            Self::Ids(ids) => ids,
            Self::Text(_) | Self::Amount(_) => &[],
        }
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("'{}' is not a valid id", raw.trim()))
}

/// Comma separated ids; duplicates are dropped, order kept.
pub(crate) fn parse_id_list(raw: &str) -> Result<Vec<Uuid>, String> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = parse_id(part)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err("at least one id is required".to_string());
    }
    Ok(ids)
}

/// Choice offered by a select filter or action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    TransactionName,
    TransactionAmount,
    TransactionMerchant,
    TransactionCategory,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 4] = [
        Self::TransactionName,
        Self::TransactionAmount,
        Self::TransactionMerchant,
        Self::TransactionCategory,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::TransactionName => "transaction_name",
            Self::TransactionAmount => "transaction_amount",
            Self::TransactionMerchant => "transaction_merchant",
            Self::TransactionCategory => "transaction_category",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TransactionName => "Name",
            Self::TransactionAmount => "Amount",
            Self::TransactionMerchant => "Merchant",
            Self::TransactionCategory => "Category",
        }
    }

    pub fn filter_type(self) -> FilterType {
        match self {
            Self::TransactionName => FilterType::Text,
            Self::TransactionAmount => FilterType::Number,
            Self::TransactionMerchant | Self::TransactionCategory => FilterType::Select,
        }
    }

    pub fn operators(self) -> &'static [Operator] {
        self.filter_type().operators()
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key.trim())
    }

    /// Select choices, restricted to the family. `None` for non-select
    /// filters.
    pub async fn options<C: ConnectionTrait>(
        self,
        db: &C,
        family_id: Uuid,
    ) -> ResultEngine<Option<Vec<SelectOption>>> {
        match self {
            Self::TransactionName | Self::TransactionAmount => Ok(None),
            Self::TransactionMerchant => {
                let assigned = transactions::Entity::find()
                    .select_only()
                    .column(transactions::Column::MerchantId)
                    .filter(transactions::Column::FamilyId.eq(family_id))
                    .filter(transactions::Column::MerchantId.is_not_null())
                    .into_query();
                let rows = merchants::Entity::find()
                    .filter(merchants::Column::FamilyId.eq(family_id))
                    .filter(merchants::Column::Id.in_subquery(assigned))
                    .order_by_asc(merchants::Column::Name)
                    .all(db)
                    .await?;
                Ok(Some(
                    rows.into_iter()
                        .map(|m| SelectOption {
                            id: m.id,
                            name: m.name,
                        })
                        .collect(),
                ))
            }
            Self::TransactionCategory => {
                let rows = categories::Entity::find()
                    .filter(categories::Column::FamilyId.eq(family_id))
                    .order_by_asc(categories::Column::Name)
                    .all(db)
                    .await?;
                Ok(Some(
                    rows.into_iter()
                        .map(|c| SelectOption {
                            id: c.id,
                            name: c.name,
                        })
                        .collect(),
                ))
            }
        }
    }

    pub(crate) fn prepare(self, scope: TransactionScope) -> TransactionScope {
        match self {
            Self::TransactionMerchant => scope.join(ScopeJoin::Merchant),
            Self::TransactionName | Self::TransactionAmount | Self::TransactionCategory => scope,
        }
    }

    /// Narrows the scope. A value or operator that does not fit the filter is
    /// a configuration error; the scope is never widened.
    pub(crate) fn apply(
        self,
        scope: TransactionScope,
        operator: Operator,
        value: &ConditionValue,
    ) -> ResultEngine<TransactionScope> {
        if !self.filter_type().accepts(operator) {
            return Err(EngineError::Configuration(format!(
                "operator '{}' is not valid for {}",
                operator.as_str(),
                self.key()
            )));
        }
        let mismatch = || {
            EngineError::Configuration(format!(
                "value {value:?} does not fit {} {}",
                self.key(),
                operator.as_str()
            ))
        };

        match (self, value) {
            (Self::TransactionName, ConditionValue::Text(text)) => {
                let folded = fold_case(text);
                let scope = match operator {
                    Operator::Like => scope.filter(
                        transactions::Column::NameFolded.like(
                            LikeExpr::new(format!("%{}%", escape_like(&folded))).escape('\\'),
                        ),
                    ),
                    _ => scope.filter(transactions::Column::NameFolded.eq(folded)),
                };
                Ok(scope)
            }
            (Self::TransactionAmount, ConditionValue::Amount(amount)) => {
                let cents = amount.cents();
                let abs = || {
                    Expr::expr(Func::cust(Alias::new("ABS")).arg(Expr::col((
                        transactions::Entity,
                        transactions::Column::AmountMinor,
                    ))))
                };
                let predicate = match operator {
                    Operator::GreaterThan => abs().gt(cents),
                    Operator::GreaterThanOrEqual => abs().gte(cents),
                    Operator::LessThan => abs().lt(cents),
                    Operator::LessThanOrEqual => abs().lte(cents),
                    _ => abs().eq(cents),
                };
                Ok(scope.filter(predicate))
            }
            (Self::TransactionMerchant, ConditionValue::Id(id)) => Ok(scope
                .join(ScopeJoin::Merchant)
                .filter(Expr::col((merchants::Entity, merchants::Column::Id)).eq(*id))),
            (Self::TransactionMerchant, ConditionValue::Ids(ids)) => Ok(scope
                .join(ScopeJoin::Merchant)
                .filter(
                    Expr::col((merchants::Entity, merchants::Column::Id))
                        .is_in(ids.iter().copied()),
                )),
            (Self::TransactionCategory, ConditionValue::Id(id)) => {
                Ok(scope.filter(transactions::Column::CategoryId.eq(*id)))
            }
            (Self::TransactionCategory, ConditionValue::Ids(ids)) => Ok(scope.filter(
                transactions::Column::CategoryId.is_in(ids.iter().copied()),
            )),
            _ => Err(mismatch()),
        }
    }
}

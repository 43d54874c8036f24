//! Action executors: what a rule does to the rows it matched.
//!
//! Deterministic actions write a fixed value with a single conditional
//! `UPDATE`. AI actions ask the configured [`EnrichmentProvider`] for
//! suggestions in batches and write each one with its own conditional
//! `UPDATE`. In both cases the lock check is part of the write statement, so
//! a concurrent user edit makes the row count as skipped instead of being
//! overwritten.

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Engine, EngineError, EnrichmentProvider, EnrichmentSource, FilterType, ResultEngine, SelectOption,
    categories,
    conditions::{parse_id, parse_id_list},
    merchants,
    scope::TransactionScope,
    tags,
    util::{fold_case, normalize_display},
};

mod ai;
mod deterministic;
mod tag_sets;

pub(crate) const DEFAULT_AI_BATCH_SIZE: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SetTransactionCategory,
    SetTransactionTags,
    SetTransactionMerchant,
    SetTransactionName,
    AutoCategorize,
    AutoDetectMerchants,
}

impl ActionKind {
    /// Deterministic actions first, AI actions last.
    pub const ALL: [ActionKind; 6] = [
        Self::SetTransactionCategory,
        Self::SetTransactionTags,
        Self::SetTransactionMerchant,
        Self::SetTransactionName,
        Self::AutoCategorize,
        Self::AutoDetectMerchants,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::SetTransactionCategory => "set_transaction_category",
            Self::SetTransactionTags => "set_transaction_tags",
            Self::SetTransactionMerchant => "set_transaction_merchant",
            Self::SetTransactionName => "set_transaction_name",
            Self::AutoCategorize => "auto_categorize",
            Self::AutoDetectMerchants => "auto_detect_merchants",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SetTransactionCategory => "Set transaction category",
            Self::SetTransactionTags => "Set transaction tags",
            Self::SetTransactionMerchant => "Set transaction merchant",
            Self::SetTransactionName => "Set transaction name",
            Self::AutoCategorize => "Auto-categorize",
            Self::AutoDetectMerchants => "Auto-detect merchants",
        }
    }

    /// Value type of the action; `None` for actions without a value.
    pub fn value_type(self) -> Option<FilterType> {
        match self {
            Self::SetTransactionCategory
            | Self::SetTransactionTags
            | Self::SetTransactionMerchant => Some(FilterType::Select),
            Self::SetTransactionName => Some(FilterType::Text),
            Self::AutoCategorize | Self::AutoDetectMerchants => None,
        }
    }

    /// Whether the action calls the enrichment provider.
    pub fn is_ai(self) -> bool {
        matches!(self, Self::AutoCategorize | Self::AutoDetectMerchants)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key.trim())
    }

    pub async fn options<C: ConnectionTrait>(
        self,
        db: &C,
        family_id: Uuid,
    ) -> ResultEngine<Option<Vec<SelectOption>>> {
        let options = match self {
            Self::SetTransactionCategory => categories::Entity::find()
                .filter(categories::Column::FamilyId.eq(family_id))
                .order_by_asc(categories::Column::Name)
                .all(db)
                .await?
                .into_iter()
                .map(|c| SelectOption {
                    id: c.id,
                    name: c.name,
                })
                .collect(),
            Self::SetTransactionMerchant => merchants::Entity::find()
                .filter(merchants::Column::FamilyId.eq(family_id))
                .order_by_asc(merchants::Column::Name)
                .all(db)
                .await?
                .into_iter()
                .map(|m| SelectOption {
                    id: m.id,
                    name: m.name,
                })
                .collect(),
            Self::SetTransactionTags => tags::Entity::find()
                .filter(tags::Column::FamilyId.eq(family_id))
                .order_by_asc(tags::Column::Name)
                .all(db)
                .await?
                .into_iter()
                .map(|t| SelectOption {
                    id: t.id,
                    name: t.name,
                })
                .collect(),
            Self::SetTransactionName | Self::AutoCategorize | Self::AutoDetectMerchants => {
                return Ok(None);
            }
        };
        Ok(Some(options))
    }

    /// Runs the action against `scope`.
    pub(crate) async fn execute(
        self,
        ctx: &ExecutionContext<'_>,
        scope: &TransactionScope,
        value: &ActionValue,
    ) -> ExecResult {
        use crate::transactions::Column;

        match (self, value) {
            (Self::SetTransactionCategory, ActionValue::Id(id)) => {
                let found = ctx
                    .engine
                    .category_exists_in_family(ctx.db, ctx.family_id, *id)
                    .await?;
                still_in_family(found, "category", *id)?;
                deterministic::set_column(
                    ctx,
                    scope,
                    Column::CategoryId,
                    Column::CategorySource,
                    (*id).into(),
                    None,
                )
                .await
            }
            (Self::SetTransactionMerchant, ActionValue::Id(id)) => {
                let found = ctx
                    .engine
                    .merchant_exists_in_family(ctx.db, ctx.family_id, *id)
                    .await?;
                still_in_family(found, "merchant", *id)?;
                deterministic::set_column(
                    ctx,
                    scope,
                    Column::MerchantId,
                    Column::MerchantSource,
                    (*id).into(),
                    None,
                )
                .await
            }
            (Self::SetTransactionName, ActionValue::Text(name)) => {
                deterministic::set_column(
                    ctx,
                    scope,
                    Column::Name,
                    Column::NameSource,
                    name.clone().into(),
                    Some((Column::NameFolded, fold_case(name).into())),
                )
                .await
            }
            (Self::SetTransactionTags, ActionValue::Ids(ids)) => {
                for id in ids {
                    let found = ctx
                        .engine
                        .tag_exists_in_family(ctx.db, ctx.family_id, *id)
                        .await?;
                    still_in_family(found, "tag", *id)?;
                }
                tag_sets::replace_tags(ctx, scope, ids).await
            }
            (Self::AutoCategorize, ActionValue::None) => ai::auto_categorize(ctx, scope).await,
            (Self::AutoDetectMerchants, ActionValue::None) => {
                ai::auto_detect_merchants(ctx, scope).await
            }
            _ => Err(EngineError::Configuration(format!(
                "value {value:?} does not fit action {}",
                self.key()
            ))
            .into()),
        }
    }
}

/// An action value parsed according to the action's value type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ActionValue {
    None,
    Text(String),
    Id(Uuid),
    Ids(Vec<Uuid>),
}

impl ActionValue {
    /// Parses a raw value. AI actions ignore whatever value they are given.
    pub fn parse(kind: ActionKind, raw: Option<&str>) -> Result<Self, String> {
        if kind.is_ai() {
            return Ok(Self::None);
        }
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Err("value is required".to_string());
        };
        match kind {
            ActionKind::SetTransactionCategory | ActionKind::SetTransactionMerchant => {
                parse_id(raw).map(Self::Id)
            }
            ActionKind::SetTransactionTags => parse_id_list(raw).map(Self::Ids),
            ActionKind::SetTransactionName => normalize_display(raw, "transaction")
                .map(Self::Text)
                .map_err(|err| match err {
                    EngineError::InvalidName(message) => message,
                    other => other.to_string(),
                }),
            ActionKind::AutoCategorize | ActionKind::AutoDetectMerchants => Ok(Self::None),
        }
    }

    /// Canonical stored form.
    pub fn to_raw(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Text(text) => Some(text.clone()),
            Self::Id(id) => Some(id.to_string()),
            Self::Ids(ids) => Some(
                ids.iter()
                    .map(Uuid::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }

    pub fn referenced_ids(&self) -> &[Uuid] {
        match self {
            Self::Id(id) => std::slice::from_ref(id),
            Self::Ids(ids) => ids,
            Self::None | Self::Text(_) => &[],
        }
    }
}

/// Row counts of one action.
///
/// `matched` is the scope size when the action started, `skipped` the
/// matched rows the action left untouched (locked, already equal, no usable
/// suggestion, or lost to a concurrent writer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub matched: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl ActionOutcome {
    pub(crate) fn new(matched: u64, updated: u64) -> Self {
        Self {
            matched,
            updated,
            skipped: matched.saturating_sub(updated),
        }
    }
}

pub(crate) struct ExecutionContext<'a> {
    pub(crate) engine: &'a Engine,
    pub(crate) db: &'a DatabaseConnection,
    pub(crate) family_id: Uuid,
    pub(crate) provider: Option<&'a dyn EnrichmentProvider>,
    pub(crate) ai_batch_size: usize,
    /// Lets deterministic actions overwrite `user` values.
    pub(crate) ignore_locks: bool,
}

/// An action that stopped early. `partial` holds what was committed.
#[derive(Debug)]
pub(crate) struct ActionAborted {
    pub(crate) partial: ActionOutcome,
    pub(crate) error: EngineError,
}

impl From<EngineError> for ActionAborted {
    fn from(error: EngineError) -> Self {
        Self {
            partial: ActionOutcome::default(),
            error,
        }
    }
}

impl From<DbErr> for ActionAborted {
    fn from(error: DbErr) -> Self {
        EngineError::from(error).into()
    }
}

pub(crate) type ExecResult = Result<ActionOutcome, ActionAborted>;

/// Rule writes are allowed unless the field holds a user value.
pub(crate) fn rule_writable(source: crate::transactions::Column) -> Condition {
    Condition::any()
        .add(source.is_null())
        .add(source.ne(EnrichmentSource::User.as_str()))
}

/// Targets are checked again at run time; they may have been deleted since
/// the rule was saved.
fn still_in_family(found: bool, label: &str, id: Uuid) -> ResultEngine<()> {
    if !found {
        return Err(EngineError::Configuration(format!(
            "{label} {id} no longer exists in this family"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_actions_ignore_values() {
        assert_eq!(
            ActionValue::parse(ActionKind::AutoCategorize, Some("whatever")),
            Ok(ActionValue::None)
        );
        assert_eq!(
            ActionValue::parse(ActionKind::AutoDetectMerchants, None),
            Ok(ActionValue::None)
        );
    }

    #[test]
    fn deterministic_actions_need_a_value() {
        assert!(ActionValue::parse(ActionKind::SetTransactionCategory, None).is_err());
        assert!(ActionValue::parse(ActionKind::SetTransactionName, Some("  ")).is_err());
        assert!(ActionValue::parse(ActionKind::SetTransactionMerchant, Some("nope")).is_err());
    }

    #[test]
    fn name_values_are_normalized() {
        assert_eq!(
            ActionValue::parse(ActionKind::SetTransactionName, Some("  Amazon   Prime ")),
            Ok(ActionValue::Text("Amazon Prime".to_string()))
        );
    }

    #[test]
    fn tag_values_are_id_lists() {
        let a = Uuid::new_v4();
        let value = ActionValue::parse(ActionKind::SetTransactionTags, Some(&a.to_string()))
            .unwrap();
        assert_eq!(value, ActionValue::Ids(vec![a]));
        assert_eq!(value.to_raw(), Some(a.to_string()));
    }

    #[test]
    fn keys_round_trip_and_ai_is_last() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_key(kind.key()), Some(kind));
        }
        assert!(ActionKind::from_key("send_email").is_none());
        let first_ai = ActionKind::ALL.iter().position(|k| k.is_ai()).unwrap();
        assert!(ActionKind::ALL[first_ai..].iter().all(|k| k.is_ai()));
    }

    #[test]
    fn skipped_never_underflows() {
        assert_eq!(ActionOutcome::new(3, 2).skipped, 1);
        assert_eq!(ActionOutcome::new(1, 2).skipped, 0);
    }
}

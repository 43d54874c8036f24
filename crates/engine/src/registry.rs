//! The registry binds a resource type to its base scope, its condition
//! filters and its action executors.

use chrono::NaiveDate;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ActionKind, ConditionKind, EngineError, FilterType, Operator, ResultEngine, SelectOption,
    TransactionKind, scope::TransactionScope, transactions,
};

/// Kind of record a rule operates on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[default]
    Transaction,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
        }
    }
}

impl TryFrom<&str> for ResourceType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "transaction" => Ok(Self::Transaction),
            other => Err(EngineError::Configuration(format!(
                "unsupported resource type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Registry {
    resource_type: ResourceType,
    family_id: Uuid,
    effective_date: Option<NaiveDate>,
    ai_enabled: bool,
}

impl Registry {
    /// `ai_enabled` is decided once here: the family flag and a configured
    /// provider.
    pub fn new(
        resource_type: ResourceType,
        family_id: Uuid,
        effective_date: Option<NaiveDate>,
        ai_enabled: bool,
    ) -> Self {
        Self {
            resource_type,
            family_id,
            effective_date,
            ai_enabled,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    /// Rows a rule of this family may ever touch.
    pub fn resource_scope(&self) -> TransactionScope {
        match self.resource_type {
            ResourceType::Transaction => {
                let mut scope = TransactionScope::new(transactions::Entity::find())
                    .filter(transactions::Column::FamilyId.eq(self.family_id))
                    .filter(transactions::Column::Excluded.eq(false))
                    .filter(transactions::Column::Kind.ne(TransactionKind::Transfer.as_str()));
                if let Some(date) = self.effective_date {
                    scope = scope.filter(transactions::Column::OccurredOn.gte(date));
                }
                scope
            }
        }
    }

    pub fn condition_filters(&self) -> &'static [ConditionKind] {
        match self.resource_type {
            ResourceType::Transaction => &ConditionKind::ALL,
        }
    }

    /// Deterministic executors, then AI executors when AI is enabled.
    pub fn action_executors(&self) -> Vec<ActionKind> {
        match self.resource_type {
            ResourceType::Transaction => ActionKind::ALL
                .into_iter()
                .filter(|kind| self.ai_enabled || !kind.is_ai())
                .collect(),
        }
    }

    pub fn condition_filter(&self, key: &str) -> Option<ConditionKind> {
        ConditionKind::from_key(key).filter(|kind| self.condition_filters().contains(kind))
    }

    pub fn action_executor(&self, key: &str) -> Option<ActionKind> {
        ActionKind::from_key(key).filter(|kind| self.action_executors().contains(kind))
    }

    /// Everything a rule editor needs, with select options of this family.
    pub async fn describe<C: ConnectionTrait>(&self, db: &C) -> ResultEngine<RegistryView> {
        let mut conditions = Vec::new();
        for kind in self.condition_filters() {
            conditions.push(ConditionFilterView {
                key: kind.key().to_string(),
                label: kind.label().to_string(),
                filter_type: kind.filter_type(),
                operators: kind.operators().iter().copied().map(OperatorView::from).collect(),
                options: kind.options(db, self.family_id).await?,
            });
        }
        let mut actions = Vec::new();
        for kind in self.action_executors() {
            actions.push(ActionExecutorView {
                key: kind.key().to_string(),
                label: kind.label().to_string(),
                value_type: kind.value_type(),
                options: kind.options(db, self.family_id).await?,
            });
        }
        Ok(RegistryView {
            resource_type: self.resource_type,
            ai_enabled: self.ai_enabled,
            conditions,
            actions,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryView {
    pub resource_type: ResourceType,
    pub ai_enabled: bool,
    pub conditions: Vec<ConditionFilterView>,
    pub actions: Vec<ActionExecutorView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionFilterView {
    pub key: String,
    pub label: String,
    pub filter_type: FilterType,
    pub operators: Vec<OperatorView>,
    pub options: Option<Vec<SelectOption>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorView {
    pub key: String,
    pub label: String,
}

impl From<Operator> for OperatorView {
    fn from(operator: Operator) -> Self {
        Self {
            key: operator.as_str().to_string(),
            label: operator.label().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionExecutorView {
    pub key: String,
    pub label: String,
    pub value_type: Option<FilterType>,
    pub options: Option<Vec<SelectOption>>,
}

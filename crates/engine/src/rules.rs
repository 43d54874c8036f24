//! Persisted rules.
//!
//! A rule row owns an ordered list of conditions and actions. Conditions and
//! actions are stored with their raw type keys so a rule saved under an older
//! registry can still be loaded; unknown keys fail closed when the rule runs.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ResourceType, ResultEngine, rule_actions, rule_conditions};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: Option<String>,
    pub resource_type: ResourceType,
    /// Only transactions on or after this date are in scope.
    pub effective_date: Option<NaiveDate>,
    pub active: bool,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub id: Uuid,
    pub condition_type: String,
    pub operator: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    pub id: Uuid,
    pub action_type: String,
    pub value: Option<String>,
}

impl Rule {
    /// Display name, falling back to the first action's type key.
    pub fn title(&self) -> String {
        match (&self.name, self.actions.first()) {
            (Some(name), _) => name.clone(),
            (None, Some(action)) => action.action_type.clone(),
            (None, None) => "untitled rule".to_string(),
        }
    }

    pub(crate) fn from_models(
        model: Model,
        mut conditions: Vec<rule_conditions::Model>,
        mut actions: Vec<rule_actions::Model>,
    ) -> ResultEngine<Self> {
        conditions.sort_by_key(|c| c.position);
        actions.sort_by_key(|a| a.position);
        Ok(Self {
            id: model.id,
            family_id: model.family_id,
            name: model.name,
            resource_type: ResourceType::try_from(model.resource_type.as_str())?,
            effective_date: model.effective_date,
            active: model.active,
            conditions: conditions
                .into_iter()
                .map(|c| RuleCondition {
                    id: c.id,
                    condition_type: c.condition_type,
                    operator: c.operator,
                    value: c.value,
                })
                .collect(),
            actions: actions
                .into_iter()
                .map(|a| RuleAction {
                    id: a.id,
                    action_type: a.action_type,
                    value: a.value,
                })
                .collect(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: Option<String>,
    pub resource_type: String,
    pub effective_date: Option<Date>,
    pub active: bool,
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
    #[sea_orm(has_many = "super::rule_conditions::Entity")]
    Conditions,
    #[sea_orm(has_many = "super::rule_actions::Entity")]
    Actions,
    #[sea_orm(has_many = "super::rule_runs::Entity")]
    Runs,
}

impl Related<super::families::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Family.def()
    }
}

impl Related<super::rule_conditions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conditions.def()
    }
}

impl Related<super::rule_actions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Actions.def()
    }
}

impl Related<super::rule_runs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Runs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Rule run history and the per-run report.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// What triggered a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    #[default]
    Manual,
    Scheduled,
}

impl ExecutionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

impl TryFrom<&str> for ExecutionType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            other => Err(EngineError::Configuration(format!(
                "invalid execution type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every action completed.
    Success,
    /// Some actions failed, others completed.
    Partial,
    /// Every action failed.
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn from_reports(actions: &[ActionReport]) -> Self {
        let failed = actions.iter().filter(|a| a.failure.is_some()).count();
        match failed {
            0 => Self::Success,
            n if n == actions.len() => Self::Failed,
            _ => Self::Partial,
        }
    }
}

impl TryFrom<&str> for RunStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::Configuration(format!(
                "invalid run status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unknown or disabled action type, or an unusable stored value.
    Configuration,
    /// The enrichment provider call failed.
    Provider,
    /// The database rejected a read or write.
    Storage,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Provider => "provider",
            Self::Storage => "storage",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&EngineError> for ActionFailure {
    fn from(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::Provider(_) => FailureKind::Provider,
            EngineError::Database(_) => FailureKind::Storage,
            _ => FailureKind::Configuration,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Outcome of one action within a run.
///
/// When `failure` is set the counters hold whatever was committed before the
/// action stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub action_id: Uuid,
    pub action_type: String,
    pub matched: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failure: Option<ActionFailure>,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRunReport {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub execution_type: ExecutionType,
    pub status: RunStatus,
    /// Size of the resolved scope before the first action ran.
    pub matched: u64,
    pub actions: Vec<ActionReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RuleRunReport {
    pub fn updated(&self) -> u64 {
        self.actions.iter().map(|a| a.updated).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.actions.iter().map(|a| a.skipped).sum()
    }

    pub fn failed_actions(&self) -> usize {
        self.actions.iter().filter(|a| a.failure.is_some()).count()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rule_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub rule_id: Uuid,
    pub execution_type: String,
    pub status: String,
    pub rows_matched: i64,
    pub rows_updated: i64,
    pub rows_skipped: i64,
    pub failed_actions: i32,
    #[sea_orm(column_type = "Text")]
    pub summary: String,
    pub started_at: DateTimeUtc,
    pub finished_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rules::Entity",
        from = "Column::RuleId",
        to = "super::rules::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Rule,
}

impl Related<super::rules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl RuleRunReport {
    pub(crate) fn to_active_model(&self) -> ResultEngine<ActiveModel> {
        let summary = serde_json::to_string(&self.actions)
            .map_err(|err| EngineError::Configuration(format!("run summary: {err}")))?;
        Ok(ActiveModel {
            id: sea_orm::ActiveValue::Set(self.id),
            rule_id: sea_orm::ActiveValue::Set(self.rule_id),
            execution_type: sea_orm::ActiveValue::Set(self.execution_type.as_str().to_string()),
            status: sea_orm::ActiveValue::Set(self.status.as_str().to_string()),
            rows_matched: sea_orm::ActiveValue::Set(to_i64(self.matched)),
            rows_updated: sea_orm::ActiveValue::Set(to_i64(self.updated())),
            rows_skipped: sea_orm::ActiveValue::Set(to_i64(self.skipped())),
            failed_actions: sea_orm::ActiveValue::Set(
                i32::try_from(self.failed_actions()).unwrap_or(i32::MAX),
            ),
            summary: sea_orm::ActiveValue::Set(summary),
            started_at: sea_orm::ActiveValue::Set(self.started_at),
            finished_at: sea_orm::ActiveValue::Set(self.finished_at),
        })
    }
}

impl TryFrom<Model> for RuleRunReport {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let actions: Vec<ActionReport> = serde_json::from_str(&model.summary)
            .map_err(|err| EngineError::Configuration(format!("run summary: {err}")))?;
        Ok(Self {
            id: model.id,
            rule_id: model.rule_id,
            execution_type: ExecutionType::try_from(model.execution_type.as_str())?,
            status: RunStatus::try_from(model.status.as_str())?,
            matched: u64::try_from(model.rows_matched).unwrap_or_default(),
            actions,
            started_at: model.started_at,
            finished_at: model.finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(failure: Option<FailureKind>) -> ActionReport {
        ActionReport {
            action_id: Uuid::new_v4(),
            action_type: "set_transaction_category".to_string(),
            matched: 3,
            updated: 1,
            skipped: 2,
            failure: failure.map(|kind| ActionFailure {
                kind,
                message: "boom".to_string(),
            }),
            duration_ms: 4,
        }
    }

    #[test]
    fn status_reflects_failed_actions() {
        assert_eq!(RunStatus::from_reports(&[]), RunStatus::Success);
        assert_eq!(
            RunStatus::from_reports(&[report(None), report(Some(FailureKind::Provider))]),
            RunStatus::Partial
        );
        assert_eq!(
            RunStatus::from_reports(&[report(Some(FailureKind::Storage))]),
            RunStatus::Failed
        );
    }

    #[test]
    fn engine_errors_map_to_failure_kinds() {
        let provider = EngineError::Provider(crate::ProviderError::Timeout);
        assert_eq!(ActionFailure::from(&provider).kind, FailureKind::Provider);
        let db = EngineError::Database(DbErr::Custom("locked".to_string()));
        assert_eq!(ActionFailure::from(&db).kind, FailureKind::Storage);
        let config = EngineError::Configuration("unknown action".to_string());
        assert_eq!(ActionFailure::from(&config).kind, FailureKind::Configuration);
    }
}

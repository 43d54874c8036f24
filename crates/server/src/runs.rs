//! Rule run endpoints.

use api_types::rule::{
    ActionFailureView, ActionReportView, RuleApply, RuleRunList, RuleRunListResponse, RuleRunView,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use engine::RunOptions;
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

const DEFAULT_RUNS_LIMIT: u64 = 20;

fn map_run(run: engine::RuleRunReport) -> RuleRunView {
    RuleRunView {
        id: run.id,
        rule_id: run.rule_id,
        execution_type: run.execution_type.as_str().to_string(),
        status: run.status.as_str().to_string(),
        matched: run.matched,
        updated: run.updated(),
        skipped: run.skipped(),
        actions: run
            .actions
            .into_iter()
            .map(|a| ActionReportView {
                action_id: a.action_id,
                action_type: a.action_type,
                matched: a.matched,
                updated: a.updated,
                skipped: a.skipped,
                failure: a.failure.map(|f| ActionFailureView {
                    kind: f.kind.as_str().to_string(),
                    message: f.message,
                }),
                duration_ms: a.duration_ms,
            })
            .collect(),
        started_at: run.started_at,
        finished_at: run.finished_at,
    }
}

/// Runs a rule now. Action failures are part of the returned run, not an
/// error response.
pub async fn apply(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RuleApply>,
) -> Result<Json<RuleRunView>, ServerError> {
    let options = RunOptions::manual().ignore_locks(payload.ignore_locks.unwrap_or(false));
    let run = state.engine.apply_rule(family_id, rule_id, options).await?;
    Ok(Json(map_run(run)))
}

pub async fn list(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
    Query(payload): Query<RuleRunList>,
) -> Result<Json<RuleRunListResponse>, ServerError> {
    let limit = payload.limit.unwrap_or(DEFAULT_RUNS_LIMIT);
    let runs = state
        .engine
        .list_rule_runs(family_id, rule_id, limit)
        .await?
        .into_iter()
        .map(map_run)
        .collect();
    Ok(Json(RuleRunListResponse { runs }))
}

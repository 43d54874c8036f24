use std::time::Instant;

use chrono::Utc;
use sea_orm::{QueryFilter, QueryOrder, QuerySelect, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ActionEvent, ActionFailure, ActionReport, EngineError, ResultEngine, Rule,
    RuleRunReport, RunOptions, RunStatus,
    actions::{ActionOutcome, ExecutionContext},
    families, rule_runs, rules,
    validation::compile_action,
};

use super::{
    Engine,
    rules::{build_scope, compile_stored_conditions, load_rule},
};

/// Result of [`Engine::apply_active_rules`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub runs: Vec<RuleRunReport>,
    /// Rules that could not run at all.
    pub failures: Vec<SweepFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub family_id: Uuid,
    pub rule_id: Uuid,
    pub message: String,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Engine {
    /// Runs a rule's actions, in order, against the rows its conditions match.
    ///
    /// A failing action is recorded in the report and the next action still
    /// runs. The run is persisted in the rule's history.
    ///
    /// # Errors
    ///
    /// [`EngineError::RuleDisabled`] for inactive rules, and
    /// [`EngineError::InvalidRule`] when a stored condition no longer
    /// compiles (nothing runs in that case).
    pub async fn apply_rule(
        &self,
        family_id: Uuid,
        rule_id: Uuid,
        options: RunOptions,
    ) -> ResultEngine<RuleRunReport> {
        let family = self.require_family(&self.database, family_id).await?;
        let rule = self.rule(family_id, rule_id).await?;
        if !rule.active {
            return Err(EngineError::RuleDisabled(rule.title()));
        }
        self.run_rule(&family, &rule, options).await
    }

    /// Runs every active rule of every family as a scheduled run. A rule that
    /// cannot run is reported and the sweep continues.
    pub async fn apply_active_rules(&self) -> ResultEngine<SweepReport> {
        let models = rules::Entity::find()
            .filter(rules::Column::Active.eq(true))
            .order_by_asc(rules::Column::FamilyId)
            .order_by_asc(rules::Column::CreatedAt)
            .order_by_asc(rules::Column::Id)
            .all(&self.database)
            .await?;

        let mut report = SweepReport::default();
        let mut family: Option<families::Model> = None;
        for model in models {
            let family_id = model.family_id;
            let rule_id = model.id;
            if family.as_ref().is_none_or(|f| f.id != family_id) {
                family = Some(self.require_family(&self.database, family_id).await?);
            }
            let Some(family) = family.as_ref() else {
                continue;
            };

            let outcome = match load_rule(&self.database, model).await {
                Ok(rule) => self.run_rule(family, &rule, RunOptions::scheduled()).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(run) => report.runs.push(run),
                Err(err) => {
                    tracing::warn!(%family_id, %rule_id, error = %err, "scheduled rule run failed");
                    report.failures.push(SweepFailure {
                        family_id,
                        rule_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            runs = report.runs.len(),
            failures = report.failures.len(),
            "rule sweep finished"
        );
        Ok(report)
    }

    /// Run history of a rule, newest first.
    pub async fn list_rule_runs(
        &self,
        family_id: Uuid,
        rule_id: Uuid,
        limit: u64,
    ) -> ResultEngine<Vec<RuleRunReport>> {
        self.require_rule_in_family(&self.database, family_id, rule_id)
            .await?;
        rule_runs::Entity::find()
            .filter(rule_runs::Column::RuleId.eq(rule_id))
            .order_by_desc(rule_runs::Column::StartedAt)
            .order_by_desc(rule_runs::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(RuleRunReport::try_from)
            .collect()
    }

    async fn run_rule(
        &self,
        family: &families::Model,
        rule: &Rule,
        options: RunOptions,
    ) -> ResultEngine<RuleRunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let registry = self.registry_for(family, rule.resource_type, rule.effective_date);
        let conditions = compile_stored_conditions(&registry, rule)?;
        let scope = build_scope(&registry, &conditions)?;
        let matched = scope.count(&self.database).await?;

        tracing::info!(
            family_id = %family.id,
            rule_id = %rule.id,
            %run_id,
            execution_type = options.execution_type.as_str(),
            matched,
            "rule run started"
        );

        let ctx = ExecutionContext {
            engine: self,
            db: &self.database,
            family_id: family.id,
            provider: self.provider.as_deref(),
            ai_batch_size: self.ai_batch_size,
            ignore_locks: options.ignore_locks,
        };

        let mut reports = Vec::with_capacity(rule.actions.len());
        for (idx, action) in rule.actions.iter().enumerate() {
            let started = Instant::now();
            let result = match compile_action(
                &registry,
                idx,
                &action.action_type,
                action.value.as_deref(),
            ) {
                Ok(compiled) => compiled
                    .kind
                    .execute(&ctx, &scope, &compiled.value)
                    .await
                    .map_err(|aborted| (aborted.partial, aborted.error)),
                Err(field_error) => Err((
                    ActionOutcome::default(),
                    EngineError::Configuration(field_error.message),
                )),
            };
            let duration_ms = elapsed_ms(started);

            let report = match result {
                Ok(outcome) => {
                    tracing::info!(
                        rule_id = %rule.id,
                        action_type = action.action_type.as_str(),
                        matched = outcome.matched,
                        updated = outcome.updated,
                        skipped = outcome.skipped,
                        duration_ms,
                        "rule action applied"
                    );
                    ActionReport {
                        action_id: action.id,
                        action_type: action.action_type.clone(),
                        matched: outcome.matched,
                        updated: outcome.updated,
                        skipped: outcome.skipped,
                        failure: None,
                        duration_ms,
                    }
                }
                Err((partial, err)) => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        action_type = action.action_type.as_str(),
                        updated = partial.updated,
                        duration_ms,
                        error = %err,
                        "rule action failed"
                    );
                    ActionReport {
                        action_id: action.id,
                        action_type: action.action_type.clone(),
                        matched: partial.matched,
                        updated: partial.updated,
                        skipped: partial.skipped,
                        failure: Some(ActionFailure::from(&err)),
                        duration_ms,
                    }
                }
            };

            if let Some(sink) = &self.events {
                sink.record(&ActionEvent {
                    family_id: family.id,
                    rule_id: rule.id,
                    run_id,
                    action_type: report.action_type.clone(),
                    matched: report.matched,
                    updated: report.updated,
                    skipped: report.skipped,
                    duration_ms: report.duration_ms,
                    failure: report.failure.clone(),
                });
            }
            reports.push(report);
        }

        let report = RuleRunReport {
            id: run_id,
            rule_id: rule.id,
            execution_type: options.execution_type,
            status: RunStatus::from_reports(&reports),
            matched,
            actions: reports,
            started_at,
            finished_at: Utc::now(),
        };
        report.to_active_model()?.insert(&self.database).await?;

        tracing::info!(
            rule_id = %rule.id,
            %run_id,
            status = report.status.as_str(),
            updated = report.updated(),
            skipped = report.skipped(),
            "rule run finished"
        );
        Ok(report)
    }
}

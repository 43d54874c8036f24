use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ActionKind, ConditionKind, EngineError, Registry, RegistryView, ResourceType, ResultEngine,
    Rule, RuleDraft, RuleErrors, RuleFieldError, Transaction, families, rule_actions,
    rule_conditions, rule_runs, rules,
    scope::TransactionScope,
    transactions,
    validation::{CompiledCondition, ValidatedRule, validate_rule},
};

use super::{Engine, transactions::build_transactions, with_tx};

const PREVIEW_SAMPLE: u64 = 10;

/// What a rule would touch, without touching it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePreview {
    pub matched: u64,
    /// Most recent matching transactions.
    pub sample: Vec<Transaction>,
}

/// Base scope, then every `prepare`, then every `apply`.
pub(super) fn build_scope(
    registry: &Registry,
    conditions: &[CompiledCondition],
) -> ResultEngine<TransactionScope> {
    let mut scope = registry.resource_scope();
    for condition in conditions {
        scope = condition.kind.prepare(scope);
    }
    for condition in conditions {
        scope = condition
            .kind
            .apply(scope, condition.operator, &condition.value)?;
    }
    tracing::debug!(conditions = conditions.len(), "rule scope compiled");
    Ok(scope)
}

impl Engine {
    /// Condition filters and action executors available to a family, with
    /// select options.
    pub async fn rule_registry(&self, family_id: Uuid) -> ResultEngine<RegistryView> {
        let family = self.require_family(&self.database, family_id).await?;
        self.registry_for(&family, ResourceType::Transaction, None)
            .describe(&self.database)
            .await
    }

    pub async fn create_rule(&self, family_id: Uuid, draft: RuleDraft) -> ResultEngine<Rule> {
        let rule_id = with_tx!(self, |db_tx| {
            let family = self.require_family(&db_tx, family_id).await?;
            let validated = self.validate_draft(&db_tx, &family, &draft).await?;

            let now = Utc::now();
            let id = Uuid::new_v4();
            rules::ActiveModel {
                id: ActiveValue::Set(id),
                family_id: ActiveValue::Set(family_id),
                name: ActiveValue::Set(validated.name.clone()),
                resource_type: ActiveValue::Set(validated.resource_type.as_str().to_string()),
                effective_date: ActiveValue::Set(validated.effective_date),
                active: ActiveValue::Set(validated.active),
                created_at: ActiveValue::Set(now),
                updated_at: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;
            insert_children(&db_tx, id, &validated).await?;

            tracing::info!(
                %family_id,
                rule_id = %id,
                conditions = validated.conditions.len(),
                actions = validated.actions.len(),
                "rule created"
            );
            Ok::<_, EngineError>(id)
        })?;
        self.rule(family_id, rule_id).await
    }

    /// Replaces a rule's definition. Run history is kept.
    pub async fn update_rule(
        &self,
        family_id: Uuid,
        rule_id: Uuid,
        draft: RuleDraft,
    ) -> ResultEngine<Rule> {
        with_tx!(self, |db_tx| {
            let family = self.require_family(&db_tx, family_id).await?;
            let model = self
                .require_rule_in_family(&db_tx, family_id, rule_id)
                .await?;
            let validated = self.validate_draft(&db_tx, &family, &draft).await?;

            delete_children(&db_tx, rule_id).await?;
            insert_children(&db_tx, rule_id, &validated).await?;

            let mut active: rules::ActiveModel = model.into();
            active.name = ActiveValue::Set(validated.name.clone());
            active.resource_type = ActiveValue::Set(validated.resource_type.as_str().to_string());
            active.effective_date = ActiveValue::Set(validated.effective_date);
            active.active = ActiveValue::Set(validated.active);
            active.updated_at = ActiveValue::Set(Utc::now());
            active.update(&db_tx).await?;
            Ok::<_, EngineError>(())
        })?;
        tracing::info!(%family_id, %rule_id, "rule updated");
        self.rule(family_id, rule_id).await
    }

    pub async fn rule(&self, family_id: Uuid, rule_id: Uuid) -> ResultEngine<Rule> {
        let model = self
            .require_rule_in_family(&self.database, family_id, rule_id)
            .await?;
        load_rule(&self.database, model).await
    }

    pub async fn list_rules(&self, family_id: Uuid) -> ResultEngine<Vec<Rule>> {
        self.require_family(&self.database, family_id).await?;
        let models = rules::Entity::find()
            .filter(rules::Column::FamilyId.eq(family_id))
            .order_by_asc(rules::Column::CreatedAt)
            .order_by_asc(rules::Column::Id)
            .all(&self.database)
            .await?;
        let mut out = Vec::with_capacity(models.len());
        for model in models {
            out.push(load_rule(&self.database, model).await?);
        }
        Ok(out)
    }

    /// Enable or disable a rule. Disabled rules are kept but never evaluated.
    pub async fn set_rule_active(
        &self,
        family_id: Uuid,
        rule_id: Uuid,
        active: bool,
    ) -> ResultEngine<Rule> {
        with_tx!(self, |db_tx| {
            let model = self
                .require_rule_in_family(&db_tx, family_id, rule_id)
                .await?;
            let mut model: rules::ActiveModel = model.into();
            model.active = ActiveValue::Set(active);
            model.updated_at = ActiveValue::Set(Utc::now());
            model.update(&db_tx).await?;
            Ok::<_, EngineError>(())
        })?;
        tracing::info!(%family_id, %rule_id, active, "rule toggled");
        self.rule(family_id, rule_id).await
    }

    /// Deletes a rule with its conditions, actions and run history.
    pub async fn delete_rule(&self, family_id: Uuid, rule_id: Uuid) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.require_rule_in_family(&db_tx, family_id, rule_id)
                .await?;
            rule_runs::Entity::delete_many()
                .filter(rule_runs::Column::RuleId.eq(rule_id))
                .exec(&db_tx)
                .await?;
            delete_children(&db_tx, rule_id).await?;
            rules::Entity::delete_by_id(rule_id).exec(&db_tx).await?;
            tracing::info!(%family_id, %rule_id, "rule deleted");
            Ok(())
        })
    }

    /// Counts the rows a saved rule matches. Nothing is written.
    pub async fn preview_rule(&self, family_id: Uuid, rule_id: Uuid) -> ResultEngine<RulePreview> {
        let family = self.require_family(&self.database, family_id).await?;
        let rule = self.rule(family_id, rule_id).await?;
        let registry = self.registry_for(&family, rule.resource_type, rule.effective_date);
        let conditions = compile_stored_conditions(&registry, &rule)?;
        let scope = build_scope(&registry, &conditions)?;
        self.preview_scope(&scope).await
    }

    /// Counts the rows an unsaved draft would match. The draft is validated
    /// like on save; its actions are checked but never run.
    pub async fn preview_draft(
        &self,
        family_id: Uuid,
        draft: RuleDraft,
    ) -> ResultEngine<RulePreview> {
        let family = self.require_family(&self.database, family_id).await?;
        let validated = self.validate_draft(&self.database, &family, &draft).await?;
        let registry =
            self.registry_for(&family, validated.resource_type, validated.effective_date);
        let scope = build_scope(&registry, &validated.conditions)?;
        self.preview_scope(&scope).await
    }

    async fn preview_scope(&self, scope: &TransactionScope) -> ResultEngine<RulePreview> {
        let matched = scope.count(&self.database).await?;
        let sample = scope
            .select()
            .order_by_desc(transactions::Column::OccurredOn)
            .order_by_desc(transactions::Column::Id)
            .limit(PREVIEW_SAMPLE)
            .all(&self.database)
            .await?;
        Ok(RulePreview {
            matched,
            sample: build_transactions(&self.database, sample).await?,
        })
    }

    /// Structural validation, then family ownership of every referenced
    /// record. All problems are reported together.
    async fn validate_draft<C: ConnectionTrait>(
        &self,
        db: &C,
        family: &families::Model,
        draft: &RuleDraft,
    ) -> ResultEngine<ValidatedRule> {
        let validated = validate_rule(draft, |resource_type| {
            self.registry_for(family, resource_type, draft.effective_date)
        })?;

        let mut errors = RuleErrors::default();
        for (idx, condition) in validated.conditions.iter().enumerate() {
            for id in condition.value.referenced_ids() {
                let exists = match condition.kind {
                    ConditionKind::TransactionMerchant => {
                        self.merchant_exists_in_family(db, family.id, *id).await?
                    }
                    ConditionKind::TransactionCategory => {
                        self.category_exists_in_family(db, family.id, *id).await?
                    }
                    ConditionKind::TransactionName | ConditionKind::TransactionAmount => true,
                };
                if !exists {
                    errors.push(RuleFieldError::validation(
                        format!("conditions[{idx}].value"),
                        format!("{id} is not a {} of this family", label_of(condition.kind)),
                    ));
                }
            }
        }
        for (idx, action) in validated.actions.iter().enumerate() {
            for id in action.value.referenced_ids() {
                let (exists, label) = match action.kind {
                    ActionKind::SetTransactionCategory => (
                        self.category_exists_in_family(db, family.id, *id).await?,
                        "category",
                    ),
                    ActionKind::SetTransactionMerchant => (
                        self.merchant_exists_in_family(db, family.id, *id).await?,
                        "merchant",
                    ),
                    ActionKind::SetTransactionTags => {
                        (self.tag_exists_in_family(db, family.id, *id).await?, "tag")
                    }
                    ActionKind::SetTransactionName
                    | ActionKind::AutoCategorize
                    | ActionKind::AutoDetectMerchants => (true, ""),
                };
                if !exists {
                    errors.push(RuleFieldError::validation(
                        format!("actions[{idx}].value"),
                        format!("{id} is not a {label} of this family"),
                    ));
                }
            }
        }
        errors.into_result()?;
        Ok(validated)
    }
}

fn label_of(kind: ConditionKind) -> &'static str {
    match kind {
        ConditionKind::TransactionMerchant => "merchant",
        ConditionKind::TransactionCategory => "category",
        ConditionKind::TransactionName | ConditionKind::TransactionAmount => "record",
    }
}

/// Recompiles stored conditions against the current registry. Any condition
/// that no longer compiles fails the whole rule: a dropped condition would
/// widen the scope.
pub(super) fn compile_stored_conditions(
    registry: &Registry,
    rule: &Rule,
) -> ResultEngine<Vec<CompiledCondition>> {
    let mut errors = RuleErrors::default();
    let mut out = Vec::with_capacity(rule.conditions.len());
    for (idx, condition) in rule.conditions.iter().enumerate() {
        match crate::validation::compile_condition(
            registry,
            idx,
            &condition.condition_type,
            &condition.operator,
            condition.value.as_deref(),
        ) {
            Ok(compiled) => out.push(compiled),
            Err(err) => errors.push(err),
        }
    }
    errors.into_result()?;
    Ok(out)
}

pub(super) async fn load_rule<C: ConnectionTrait>(db: &C, model: rules::Model) -> ResultEngine<Rule> {
    let conditions = rule_conditions::Entity::find()
        .filter(rule_conditions::Column::RuleId.eq(model.id))
        .all(db)
        .await?;
    let actions = rule_actions::Entity::find()
        .filter(rule_actions::Column::RuleId.eq(model.id))
        .all(db)
        .await?;
    Rule::from_models(model, conditions, actions)
}

async fn insert_children<C: ConnectionTrait>(
    db: &C,
    rule_id: Uuid,
    validated: &ValidatedRule,
) -> ResultEngine<()> {
    for (position, condition) in validated.conditions.iter().enumerate() {
        rule_conditions::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            rule_id: ActiveValue::Set(rule_id),
            position: ActiveValue::Set(position_of(position)?),
            condition_type: ActiveValue::Set(condition.kind.key().to_string()),
            operator: ActiveValue::Set(condition.operator.as_str().to_string()),
            value: ActiveValue::Set(Some(condition.value.to_raw())),
        }
        .insert(db)
        .await?;
    }
    for (position, action) in validated.actions.iter().enumerate() {
        rule_actions::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            rule_id: ActiveValue::Set(rule_id),
            position: ActiveValue::Set(position_of(position)?),
            action_type: ActiveValue::Set(action.kind.key().to_string()),
            value: ActiveValue::Set(action.value.to_raw()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

async fn delete_children<C: ConnectionTrait>(db: &C, rule_id: Uuid) -> ResultEngine<()> {
    rule_conditions::Entity::delete_many()
        .filter(rule_conditions::Column::RuleId.eq(rule_id))
        .exec(db)
        .await?;
    rule_actions::Entity::delete_many()
        .filter(rule_actions::Column::RuleId.eq(rule_id))
        .exec(db)
        .await?;
    Ok(())
}

fn position_of(index: usize) -> ResultEngine<i32> {
    i32::try_from(index)
        .map_err(|_| EngineError::Configuration("too many rule entries".to_string()))
}

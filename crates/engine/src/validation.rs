//! Rule draft validation.
//!
//! [`validate_rule`] checks a whole draft and returns every problem at once.
//! The per-item compile functions are shared with rule runs, which recompile
//! the stored conditions and actions against the current registry.

use chrono::NaiveDate;

use crate::{
    ActionKind, ActionValue, ConditionKind, ConditionValue, Operator, Registry, ResourceType,
    RuleDraft, RuleErrors, RuleFieldError,
};

const MAX_RULE_NAME_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CompiledCondition {
    pub(crate) kind: ConditionKind,
    pub(crate) operator: Operator,
    pub(crate) value: ConditionValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CompiledAction {
    pub(crate) kind: ActionKind,
    pub(crate) value: ActionValue,
}

#[derive(Clone, Debug)]
pub(crate) struct ValidatedRule {
    pub(crate) name: Option<String>,
    pub(crate) resource_type: ResourceType,
    pub(crate) effective_date: Option<NaiveDate>,
    pub(crate) active: bool,
    pub(crate) conditions: Vec<CompiledCondition>,
    pub(crate) actions: Vec<CompiledAction>,
}

/// Validates a draft against a registry built for the draft's family.
///
/// Nothing here touches the database; ownership of referenced records is
/// checked by the caller.
pub(crate) fn validate_rule(
    draft: &RuleDraft,
    registry_for: impl FnOnce(ResourceType) -> Registry,
) -> Result<ValidatedRule, RuleErrors> {
    let resource_type = ResourceType::try_from(draft.resource_type.as_str()).map_err(|_| {
        RuleErrors::from(RuleFieldError::configuration(
            "resource_type",
            format!("unsupported resource type '{}'", draft.resource_type.trim()),
        ))
    })?;
    let registry = registry_for(resource_type);
    let mut errors = RuleErrors::default();

    let name = draft
        .name
        .as_deref()
        .map(|n| n.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|n| !n.is_empty());
    if name
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_RULE_NAME_LEN)
    {
        errors.push(RuleFieldError::validation(
            "name",
            format!("name must be at most {MAX_RULE_NAME_LEN} characters"),
        ));
    }

    let mut conditions = Vec::with_capacity(draft.conditions.len());
    for (idx, condition) in draft.conditions.iter().enumerate() {
        match compile_condition(
            &registry,
            idx,
            &condition.condition_type,
            &condition.operator,
            condition.value.as_deref(),
        ) {
            Ok(compiled) => conditions.push(compiled),
            Err(err) => errors.push(err),
        }
    }

    let mut actions = Vec::with_capacity(draft.actions.len());
    for (idx, action) in draft.actions.iter().enumerate() {
        match compile_action(&registry, idx, &action.action_type, action.value.as_deref()) {
            Ok(compiled) => actions.push(compiled),
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidatedRule {
        name,
        resource_type,
        effective_date: draft.effective_date,
        active: draft.active,
        conditions,
        actions,
    })
}

pub(crate) fn compile_condition(
    registry: &Registry,
    idx: usize,
    condition_type: &str,
    operator: &str,
    value: Option<&str>,
) -> Result<CompiledCondition, RuleFieldError> {
    let field = |name: &str| format!("conditions[{idx}].{name}");

    let kind = registry.condition_filter(condition_type).ok_or_else(|| {
        RuleFieldError::configuration(
            field("condition_type"),
            format!("unknown condition type '{}'", condition_type.trim()),
        )
    })?;
    let operator = Operator::try_from(operator).map_err(|_| {
        RuleFieldError::configuration(
            field("operator"),
            format!("unknown operator '{}'", operator.trim()),
        )
    })?;
    if !kind.filter_type().accepts(operator) {
        return Err(RuleFieldError::configuration(
            field("operator"),
            format!(
                "operator '{}' is not valid for {} filters",
                operator.as_str(),
                kind.filter_type().as_str()
            ),
        ));
    }
    let value = ConditionValue::parse(kind.filter_type(), operator, value)
        .map_err(|message| RuleFieldError::validation(field("value"), message))?;

    Ok(CompiledCondition {
        kind,
        operator,
        value,
    })
}

pub(crate) fn compile_action(
    registry: &Registry,
    idx: usize,
    action_type: &str,
    value: Option<&str>,
) -> Result<CompiledAction, RuleFieldError> {
    let field = |name: &str| format!("actions[{idx}].{name}");

    let Some(kind) = registry.action_executor(action_type) else {
        let message = match ActionKind::from_key(action_type) {
            Some(kind) if kind.is_ai() => {
                format!("action '{}' requires AI to be enabled", kind.key())
            }
            _ => format!("unknown action type '{}'", action_type.trim()),
        };
        return Err(RuleFieldError::configuration(field("action_type"), message));
    };
    let value = ActionValue::parse(kind, value)
        .map_err(|message| RuleFieldError::validation(field("value"), message))?;

    Ok(CompiledAction { kind, value })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{ActionDraft, ConditionDraft, RuleErrorKind};

    fn registry(ai_enabled: bool) -> impl FnOnce(ResourceType) -> Registry {
        move |resource_type| Registry::new(resource_type, Uuid::new_v4(), None, ai_enabled)
    }

    #[test]
    fn empty_draft_is_valid() {
        let validated = validate_rule(&RuleDraft::new(), registry(false)).unwrap();
        assert!(validated.conditions.is_empty());
        assert!(validated.actions.is_empty());
        assert!(validated.active);
    }

    #[test]
    fn unsupported_resource_type_stops_validation() {
        let draft = RuleDraft::new()
            .resource_type("account")
            .condition(ConditionDraft::new("nope", "=", "x"));
        let errors = validate_rule(&draft, registry(false)).unwrap_err();
        assert_eq!(errors.len(), 1);
        let error = errors.iter().next().unwrap();
        assert_eq!(error.field, "resource_type");
        assert_eq!(error.kind, RuleErrorKind::Configuration);
    }

    #[test]
    fn every_problem_is_reported() {
        let draft = RuleDraft::new()
            .condition(ConditionDraft::new("transaction_name", ">", "Amazon"))
            .condition(ConditionDraft::new("transaction_amount", ">", "lots"))
            .condition(ConditionDraft::new("transaction_color", "=", "red"))
            .action(ActionDraft::new("set_transaction_category"))
            .action(ActionDraft::new("send_email").value("x"));

        let errors = validate_rule(&draft, registry(false)).unwrap_err();
        let fields: Vec<_> = errors
            .iter()
            .map(|e| (e.field.as_str(), e.kind))
            .collect();
        assert_eq!(
            fields,
            [
                ("conditions[0].operator", RuleErrorKind::Configuration),
                ("conditions[1].value", RuleErrorKind::Validation),
                ("conditions[2].condition_type", RuleErrorKind::Configuration),
                ("actions[0].value", RuleErrorKind::Validation),
                ("actions[1].action_type", RuleErrorKind::Configuration),
            ]
        );
    }

    #[test]
    fn ai_actions_need_ai_enabled() {
        let draft = RuleDraft::new().action(ActionDraft::new("auto_categorize"));

        let errors = validate_rule(&draft, registry(false)).unwrap_err();
        assert!(errors.iter().next().unwrap().message.contains("requires AI"));

        let validated = validate_rule(&draft, registry(true)).unwrap();
        assert_eq!(validated.actions[0].kind, ActionKind::AutoCategorize);
        assert_eq!(validated.actions[0].value, ActionValue::None);
    }

    #[test]
    fn name_is_trimmed_and_optional() {
        let draft = RuleDraft::new().name("  Amazon   orders ");
        let validated = validate_rule(&draft, registry(false)).unwrap();
        assert_eq!(validated.name.as_deref(), Some("Amazon orders"));

        let draft = RuleDraft::new().name("   ");
        assert_eq!(validate_rule(&draft, registry(false)).unwrap().name, None);

        let draft = RuleDraft::new().name("x".repeat(129));
        assert!(validate_rule(&draft, registry(false)).is_err());
    }
}

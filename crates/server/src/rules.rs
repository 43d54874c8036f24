//! Rule management, registry and preview endpoints.

use api_types::{
    registry::{
        ActionExecutorView, ConditionFilterView, OperatorView, OptionView, RegistryResponse,
    },
    rule::{
        ActionView, ConditionView, RuleActiveUpdate, RuleInput, RuleListResponse,
        RulePreviewResponse, RuleView,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{ActionDraft, ConditionDraft, RuleDraft, SelectOption};
use uuid::Uuid;

use crate::{ServerError, server::ServerState, transactions::map_transaction};

fn draft_from_input(input: RuleInput) -> RuleDraft {
    let mut draft = RuleDraft::new();
    draft.name = input.name;
    if let Some(resource_type) = input.resource_type {
        draft.resource_type = resource_type;
    }
    draft.effective_date = input.effective_date;
    draft.active = input.active.unwrap_or(true);
    draft.conditions = input
        .conditions
        .into_iter()
        .map(|c| ConditionDraft {
            condition_type: c.condition_type,
            operator: c.operator,
            value: c.value,
        })
        .collect();
    draft.actions = input
        .actions
        .into_iter()
        .map(|a| ActionDraft {
            action_type: a.action_type,
            value: a.value,
        })
        .collect();
    draft
}

fn map_rule(rule: engine::Rule) -> RuleView {
    RuleView {
        id: rule.id,
        title: rule.title(),
        name: rule.name,
        resource_type: rule.resource_type.as_str().to_string(),
        effective_date: rule.effective_date,
        active: rule.active,
        conditions: rule
            .conditions
            .into_iter()
            .map(|c| ConditionView {
                id: c.id,
                condition_type: c.condition_type,
                operator: c.operator,
                value: c.value,
            })
            .collect(),
        actions: rule
            .actions
            .into_iter()
            .map(|a| ActionView {
                id: a.id,
                action_type: a.action_type,
                value: a.value,
            })
            .collect(),
        created_at: rule.created_at,
        updated_at: rule.updated_at,
    }
}

fn map_preview(preview: engine::RulePreview) -> RulePreviewResponse {
    RulePreviewResponse {
        matched: preview.matched,
        sample: preview.sample.into_iter().map(map_transaction).collect(),
    }
}

fn map_options(options: Option<Vec<SelectOption>>) -> Option<Vec<OptionView>> {
    options.map(|options| {
        options
            .into_iter()
            .map(|o| OptionView {
                id: o.id,
                name: o.name,
            })
            .collect()
    })
}

fn map_registry(view: engine::RegistryView) -> RegistryResponse {
    RegistryResponse {
        resource_type: view.resource_type.as_str().to_string(),
        ai_enabled: view.ai_enabled,
        conditions: view
            .conditions
            .into_iter()
            .map(|c| ConditionFilterView {
                key: c.key,
                label: c.label,
                filter_type: c.filter_type.as_str().to_string(),
                operators: c
                    .operators
                    .into_iter()
                    .map(|o| OperatorView {
                        key: o.key,
                        label: o.label,
                    })
                    .collect(),
                options: map_options(c.options),
            })
            .collect(),
        actions: view
            .actions
            .into_iter()
            .map(|a| ActionExecutorView {
                key: a.key,
                label: a.label,
                value_type: a.value_type.map(|t| t.as_str().to_string()),
                options: map_options(a.options),
            })
            .collect(),
    }
}

pub async fn registry(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<RegistryResponse>, ServerError> {
    let view = state.engine.rule_registry(family_id).await?;
    Ok(Json(map_registry(view)))
}

pub async fn list(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
) -> Result<Json<RuleListResponse>, ServerError> {
    let rules = state
        .engine
        .list_rules(family_id)
        .await?
        .into_iter()
        .map(map_rule)
        .collect();
    Ok(Json(RuleListResponse { rules }))
}

pub async fn create(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<RuleInput>,
) -> Result<(StatusCode, Json<RuleView>), ServerError> {
    let rule = state
        .engine
        .create_rule(family_id, draft_from_input(payload))
        .await?;
    Ok((StatusCode::CREATED, Json(map_rule(rule))))
}

pub async fn get(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RuleView>, ServerError> {
    let rule = state.engine.rule(family_id, rule_id).await?;
    Ok(Json(map_rule(rule)))
}

pub async fn update(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RuleInput>,
) -> Result<Json<RuleView>, ServerError> {
    let rule = state
        .engine
        .update_rule(family_id, rule_id, draft_from_input(payload))
        .await?;
    Ok(Json(map_rule(rule)))
}

pub async fn set_active(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RuleActiveUpdate>,
) -> Result<Json<RuleView>, ServerError> {
    let rule = state
        .engine
        .set_rule_active(family_id, rule_id, payload.active)
        .await?;
    Ok(Json(map_rule(rule)))
}

pub async fn delete(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_rule(family_id, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn preview(
    State(state): State<ServerState>,
    Path((family_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RulePreviewResponse>, ServerError> {
    let preview = state.engine.preview_rule(family_id, rule_id).await?;
    Ok(Json(map_preview(preview)))
}

pub async fn preview_draft(
    State(state): State<ServerState>,
    Path(family_id): Path<Uuid>,
    Json(payload): Json<RuleInput>,
) -> Result<Json<RulePreviewResponse>, ServerError> {
    let preview = state
        .engine
        .preview_draft(family_id, draft_from_input(payload))
        .await?;
    Ok(Json(map_preview(preview)))
}

use axum::{
    Router,
    routing::{get, post, put},
};

use std::sync::Arc;

use crate::{catalog, families, rules, runs, transactions};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
}

/// Every tenant-owned resource lives under `/families/{family_id}`.
pub fn router(engine: Arc<Engine>) -> Router {
    let state = ServerState { engine };
    Router::new()
        .route("/families", get(families::list).post(families::create))
        .route("/families/{family_id}", get(families::get))
        .route("/families/{family_id}/ai", put(families::set_ai))
        .route(
            "/families/{family_id}/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/families/{family_id}/merchants",
            get(catalog::list_merchants).post(catalog::create_merchant),
        )
        .route(
            "/families/{family_id}/tags",
            get(catalog::list_tags).post(catalog::create_tag),
        )
        .route(
            "/families/{family_id}/transactions",
            get(transactions::list).post(transactions::create),
        )
        .route(
            "/families/{family_id}/transactions/{transaction_id}",
            get(transactions::get).patch(transactions::update),
        )
        .route("/families/{family_id}/rules", get(rules::list).post(rules::create))
        .route("/families/{family_id}/rules/registry", get(rules::registry))
        .route("/families/{family_id}/rules/preview", post(rules::preview_draft))
        .route(
            "/families/{family_id}/rules/{rule_id}",
            get(rules::get).put(rules::update).delete(rules::delete),
        )
        .route("/families/{family_id}/rules/{rule_id}/active", put(rules::set_active))
        .route("/families/{family_id}/rules/{rule_id}/preview", get(rules::preview))
        .route("/families/{family_id}/rules/{rule_id}/apply", post(runs::apply))
        .route("/families/{family_id}/rules/{rule_id}/runs", get(runs::list))
        .with_state(state)
}

pub async fn run(engine: Arc<Engine>, addr: &str) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(engine)).await
}

pub fn spawn_with_listener(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use api_types::{
        catalog::CategoryView,
        error::ErrorResponse,
        family::FamilyView,
        registry::RegistryResponse,
        rule::{RulePreviewResponse, RuleRunListResponse, RuleRunView, RuleView},
        transaction::TransactionView,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use migration::MigratorTrait;
    use sea_orm::Database;
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    async fn make_engine() -> Arc<Engine> {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        Arc::new(Engine::builder().database(db).build().await.unwrap())
    }

    async fn send(engine: &Arc<Engine>, method: &str, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        router(engine.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn json_body<T: DeserializeOwned>(res: Response) -> T {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn family(engine: &Arc<Engine>) -> FamilyView {
        let res = send(engine, "POST", "/families", Some(json!({"name": "Rossi"}))).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        json_body(res).await
    }

    #[tokio::test]
    async fn rule_lifecycle_over_http() {
        let engine = make_engine().await;
        let family = family(&engine).await;
        let base = format!("/families/{}", family.id);

        let res = send(
            &engine,
            "POST",
            &format!("{base}/categories"),
            Some(json!({"name": "Shopping"})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let shopping: CategoryView = json_body(res).await;

        for (name, amount) in [("AMAZON EU", 2_500), ("Amazon Prime", 499), ("Bakery", 300)] {
            let res = send(
                &engine,
                "POST",
                &format!("{base}/transactions"),
                Some(json!({
                    "occurred_on": "2026-03-01",
                    "name": name,
                    "amount_minor": amount,
                })),
            )
            .await;
            assert_eq!(res.status(), StatusCode::CREATED);
        }

        let draft = json!({
            "name": "Amazon",
            "conditions": [
                {"condition_type": "transaction_name", "operator": "like", "value": "amazon"}
            ],
            "actions": [
                {"action_type": "set_transaction_category", "value": shopping.id.to_string()}
            ]
        });
        let res = send(&engine, "POST", &format!("{base}/rules/preview"), Some(draft.clone())).await;
        assert_eq!(res.status(), StatusCode::OK);
        let preview: RulePreviewResponse = json_body(res).await;
        assert_eq!(preview.matched, 2);

        let res = send(&engine, "POST", &format!("{base}/rules"), Some(draft)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let rule: RuleView = json_body(res).await;
        assert_eq!(rule.title, "Amazon");

        let res = send(
            &engine,
            "POST",
            &format!("{base}/rules/{}/apply", rule.id),
            Some(json!({})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let run: RuleRunView = json_body(res).await;
        assert_eq!(run.status, "success");
        assert_eq!(run.updated, 2);

        let res = send(&engine, "GET", &format!("{base}/rules/{}/runs", rule.id), None).await;
        let runs: RuleRunListResponse = json_body(res).await;
        assert_eq!(runs.runs.len(), 1);
        assert_eq!(runs.runs[0].id, run.id);

        let res = send(&engine, "DELETE", &format!("{base}/rules/{}", rule.id), None).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = send(&engine, "GET", &format!("{base}/rules/{}", rule.id), None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_rule_lists_fields() {
        let engine = make_engine().await;
        let family = family(&engine).await;

        let res = send(
            &engine,
            "POST",
            &format!("/families/{}/rules", family.id),
            Some(json!({
                "conditions": [
                    {"condition_type": "transaction_amount", "operator": "like", "value": "10"}
                ],
                "actions": [{"action_type": "set_transaction_name"}]
            })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorResponse = json_body(res).await;
        let fields: Vec<_> = body.fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, ["conditions[0].operator", "actions[0].value"]);
        assert_eq!(body.fields[0].kind, "configuration");
        assert_eq!(body.fields[1].kind, "validation");
    }

    #[tokio::test]
    async fn manual_edit_locks_the_field() {
        let engine = make_engine().await;
        let family = family(&engine).await;
        let base = format!("/families/{}", family.id);

        let res = send(
            &engine,
            "POST",
            &format!("{base}/transactions"),
            Some(json!({"occurred_on": "2026-03-02", "name": "Bar", "amount_minor": 450})),
        )
        .await;
        let tx: TransactionView = json_body(res).await;
        assert_eq!(tx.category_source, None);

        let res = send(
            &engine,
            "PATCH",
            &format!("{base}/transactions/{}", tx.id),
            Some(json!({"category_id": null})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let tx: TransactionView = json_body(res).await;
        assert_eq!(tx.category_id, None);
        assert_eq!(tx.category_source, Some(api_types::Source::User));
    }

    #[tokio::test]
    async fn registry_and_tenant_boundaries() {
        let engine = make_engine().await;
        let family = family(&engine).await;

        let res = send(&engine, "GET", &format!("/families/{}/rules/registry", family.id), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let registry: RegistryResponse = json_body(res).await;
        assert_eq!(registry.resource_type, "transaction");
        assert!(!registry.ai_enabled);
        assert_eq!(registry.conditions.len(), 4);

        let res = send(
            &engine,
            "GET",
            &format!("/families/{}/rules/registry", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = send(
            &engine,
            "GET",
            &format!("/families/{}/transactions?cursor=nope", family.id),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}

use api_types::error::{ErrorResponse, FieldErrorView};
use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::{EngineError, RuleErrorKind, RuleErrors};

pub use server::{router, run, run_with_listener, spawn_with_listener};

mod catalog;
mod families;
mod rules;
mod runs;
mod server;
mod transactions;

pub mod types {
    pub mod family {
        pub use api_types::family::{FamilyAiUpdate, FamilyListResponse, FamilyNew, FamilyView};
    }

    pub mod catalog {
        pub use api_types::catalog::{
            CategoryListResponse, CategoryView, MerchantListResponse, MerchantView, NameNew,
            TagListResponse, TagView,
        };
    }

    pub mod transaction {
        pub use api_types::transaction::{
            TransactionList, TransactionListResponse, TransactionNew, TransactionUpdate,
            TransactionView,
        };
    }

    pub mod rule {
        pub use api_types::rule::{
            ActionInput, ConditionInput, RuleActiveUpdate, RuleApply, RuleInput,
            RuleListResponse, RulePreviewResponse, RuleRunListResponse, RuleRunView, RuleView,
        };
    }

    pub mod registry {
        pub use api_types::registry::RegistryResponse;
    }
}

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_) | EngineError::RuleDisabled(_) => StatusCode::CONFLICT,
        EngineError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidRule(_)
        | EngineError::InvalidName(_)
        | EngineError::InvalidAmount(_)
        | EngineError::InvalidCurrency(_)
        | EngineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Provider(_) => StatusCode::BAD_GATEWAY,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn field_views(errors: &RuleErrors) -> Vec<FieldErrorView> {
    errors
        .iter()
        .map(|e| FieldErrorView {
            field: e.field.clone(),
            kind: match e.kind {
                RuleErrorKind::Configuration => "configuration",
                RuleErrorKind::Validation => "validation",
            }
            .to_string(),
            message: e.message.clone(),
        })
        .collect()
}

fn body_for_engine_error(err: EngineError) -> ErrorResponse {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            ErrorResponse {
                error: "internal server error".to_string(),
                fields: Vec::new(),
            }
        }
        EngineError::InvalidRule(errors) => ErrorResponse {
            error: "invalid rule".to_string(),
            fields: field_views(&errors),
        },
        other => ErrorResponse {
            error: other.to_string(),
            fields: Vec::new(),
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), body_for_engine_error(err)),
            ServerError::Generic(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error,
                    fields: Vec::new(),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

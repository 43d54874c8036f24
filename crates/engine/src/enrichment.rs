//! Enrichment sources and the AI provider boundary.
//!
//! Every mutable transaction field carries the source of its last write
//! (`user`, `rule` or `ai`). That source is the per-field lock:
//!
//! - rule actions never overwrite a `user` value (unless the run opts into
//!   ignoring locks);
//! - AI actions only fill fields whose value *and* source are empty, so a
//!   field enriched once is never sent to the provider again.
//!
//! The provider itself is an external collaborator. The engine only talks to
//! it through [`EnrichmentProvider::batch_suggest`], one call per batch of
//! rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{Currency, EngineError, MoneyCents};

/// Writer of a transaction field (or creator of a merchant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    User,
    Rule,
    Ai,
}

impl EnrichmentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Rule => "rule",
            Self::Ai => "ai",
        }
    }
}

impl TryFrom<&str> for EnrichmentSource {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "rule" => Ok(Self::Rule),
            "ai" => Ok(Self::Ai),
            other => Err(EngineError::Configuration(format!(
                "invalid enrichment source: {other}"
            ))),
        }
    }
}

/// What the provider is asked to suggest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSubject {
    Category,
    Merchant,
}

/// One transaction as sent to the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRow {
    pub id: Uuid,
    pub name: String,
    pub amount: MoneyCents,
    pub currency: Currency,
    pub merchant: Option<String>,
}

/// A batch request.
///
/// `candidates` lists the family's existing names for the subject (category
/// names, merchant names) so the provider can prefer them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub family_id: Uuid,
    pub subject: EnrichmentSubject,
    pub candidates: Vec<String>,
    pub rows: Vec<EnrichmentRow>,
}

/// Provider answer: row id to suggested name.
///
/// `None` (or a missing id) means the provider declined to suggest anything
/// for that row. It is not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    pub suggestions: HashMap<Uuid, Option<String>>,
}

impl EnrichmentResponse {
    pub fn suggestion(&self, row_id: Uuid) -> Option<&str> {
        self.suggestions
            .get(&row_id)
            .and_then(|s| s.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Transient failure of a whole provider call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider timed out")]
    Timeout,
    #[error("provider rate limited")]
    RateLimited,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Boundary to a language-model enrichment service.
///
/// Implementations must accept an empty `rows` list (returning an empty
/// response) and must report per-row failures as `None` suggestions rather
/// than errors. Timeouts and retries are the implementation's business.
#[async_trait::async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn batch_suggest(
        &self,
        request: EnrichmentRequest,
    ) -> Result<EnrichmentResponse, ProviderError>;
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eur,
    Usd,
    Gbp,
    Chf,
}

/// Who last wrote a transaction field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    User,
    Rule,
    Ai,
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub mod error {
    use super::*;

    /// Body of every non-2xx response.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorResponse {
        pub error: String,
        /// Rule validation problems, one per offending field.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub fields: Vec<FieldErrorView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FieldErrorView {
        /// Path such as `conditions[0].operator`.
        pub field: String,
        /// `configuration` or `validation`.
        pub kind: String,
        pub message: String,
    }
}

pub mod family {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FamilyNew {
        pub name: String,
        pub ai_enabled: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FamilyView {
        pub id: Uuid,
        pub name: String,
        pub ai_enabled: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FamilyListResponse {
        pub families: Vec<FamilyView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FamilyAiUpdate {
        pub enabled: bool,
    }
}

pub mod catalog {
    use super::*;

    /// Create a category, merchant or tag.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct NameNew {
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryView {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MerchantView {
        pub id: Uuid,
        pub name: String,
        pub source: Source,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TagView {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryListResponse {
        pub categories: Vec<CategoryView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MerchantListResponse {
        pub merchants: Vec<MerchantView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TagListResponse {
        pub tags: Vec<TagView>,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionKind {
        #[default]
        Standard,
        Transfer,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionList {
        pub limit: Option<u64>,
        /// Opaque pagination cursor (base64), from `next_cursor`.
        ///
        /// Newest → older pagination.
        pub cursor: Option<String>,
        /// Inclusive.
        pub from: Option<NaiveDate>,
        /// Exclusive.
        pub to: Option<NaiveDate>,
        pub include_excluded: Option<bool>,
        pub include_transfers: Option<bool>,
        pub uncategorized: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: Uuid,
        pub occurred_on: NaiveDate,
        pub name: String,
        /// Signed amount: positive = outflow, negative = inflow.
        pub amount_minor: i64,
        pub currency: Currency,
        pub kind: TransactionKind,
        pub excluded: bool,
        pub category_id: Option<Uuid>,
        pub merchant_id: Option<Uuid>,
        pub tag_ids: Vec<Uuid>,
        pub category_source: Option<Source>,
        pub merchant_source: Option<Source>,
        pub name_source: Option<Source>,
        pub tags_source: Option<Source>,
        pub updated_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionListResponse {
        pub transactions: Vec<TransactionView>,
        /// Opaque cursor for fetching the next page (older items).
        pub next_cursor: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub occurred_on: NaiveDate,
        pub name: String,
        pub amount_minor: i64,
        pub currency: Option<Currency>,
        pub kind: Option<TransactionKind>,
        pub excluded: Option<bool>,
        pub category_id: Option<Uuid>,
        pub merchant_id: Option<Uuid>,
        #[serde(default)]
        pub tag_ids: Vec<Uuid>,
    }

    /// Manual edit. Every field present locks that field against rules and
    /// AI; `null` clears a category or merchant.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionUpdate {
        pub name: Option<String>,
        #[serde(
            default,
            deserialize_with = "super::double_option",
            skip_serializing_if = "Option::is_none"
        )]
        pub category_id: Option<Option<Uuid>>,
        #[serde(
            default,
            deserialize_with = "super::double_option",
            skip_serializing_if = "Option::is_none"
        )]
        pub merchant_id: Option<Option<Uuid>>,
        pub tag_ids: Option<Vec<Uuid>>,
        pub excluded: Option<bool>,
    }
}

pub mod rule {
    use super::*;
    use transaction::TransactionView;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ConditionInput {
        pub condition_type: String,
        pub operator: String,
        pub value: Option<String>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ActionInput {
        pub action_type: String,
        pub value: Option<String>,
    }

    /// Body of rule create, update and draft preview.
    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    pub struct RuleInput {
        pub name: Option<String>,
        /// Defaults to `transaction`.
        pub resource_type: Option<String>,
        pub effective_date: Option<NaiveDate>,
        /// Defaults to `true`.
        pub active: Option<bool>,
        #[serde(default)]
        pub conditions: Vec<ConditionInput>,
        #[serde(default)]
        pub actions: Vec<ActionInput>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ConditionView {
        pub id: Uuid,
        pub condition_type: String,
        pub operator: String,
        pub value: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ActionView {
        pub id: Uuid,
        pub action_type: String,
        pub value: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RuleView {
        pub id: Uuid,
        pub name: Option<String>,
        /// Name, or the first action type for unnamed rules.
        pub title: String,
        pub resource_type: String,
        pub effective_date: Option<NaiveDate>,
        pub active: bool,
        pub conditions: Vec<ConditionView>,
        pub actions: Vec<ActionView>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RuleListResponse {
        pub rules: Vec<RuleView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RuleActiveUpdate {
        pub active: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RulePreviewResponse {
        pub matched: u64,
        pub sample: Vec<TransactionView>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct RuleApply {
        /// Deterministic actions also overwrite user values.
        pub ignore_locks: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ActionFailureView {
        /// `configuration`, `provider` or `storage`.
        pub kind: String,
        pub message: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ActionReportView {
        pub action_id: Uuid,
        pub action_type: String,
        pub matched: u64,
        pub updated: u64,
        pub skipped: u64,
        pub failure: Option<ActionFailureView>,
        pub duration_ms: u64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RuleRunView {
        pub id: Uuid,
        pub rule_id: Uuid,
        /// `manual` or `scheduled`.
        pub execution_type: String,
        /// `success`, `partial` or `failed`.
        pub status: String,
        pub matched: u64,
        pub updated: u64,
        pub skipped: u64,
        pub actions: Vec<ActionReportView>,
        pub started_at: DateTime<Utc>,
        pub finished_at: DateTime<Utc>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct RuleRunList {
        pub limit: Option<u64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RuleRunListResponse {
        pub runs: Vec<RuleRunView>,
    }
}

pub mod registry {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct OptionView {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct OperatorView {
        pub key: String,
        pub label: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ConditionFilterView {
        pub key: String,
        pub label: String,
        /// `text`, `number` or `select`.
        pub filter_type: String,
        pub operators: Vec<OperatorView>,
        pub options: Option<Vec<OptionView>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ActionExecutorView {
        pub key: String,
        pub label: String,
        /// `None` for actions that take no value.
        pub value_type: Option<String>,
        pub options: Option<Vec<OptionView>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RegistryResponse {
        pub resource_type: String,
        pub ai_enabled: bool,
        pub conditions: Vec<ConditionFilterView>,
        pub actions: Vec<ActionExecutorView>,
    }
}

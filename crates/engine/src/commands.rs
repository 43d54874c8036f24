//! Command structs for engine operations.
//!
//! These types group parameters for write operations (rule drafts,
//! transaction creation and edits, run options), keeping call sites readable
//! and avoiding long argument lists.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{Currency, ExecutionType, MoneyCents, ResourceType, TransactionKind};

/// An unsaved rule as entered by a user.
///
/// Type keys, operators and values stay raw here; they are checked as a whole
/// when the draft is saved or previewed.
#[derive(Clone, Debug)]
pub struct RuleDraft {
    pub name: Option<String>,
    pub resource_type: String,
    pub effective_date: Option<NaiveDate>,
    pub active: bool,
    pub conditions: Vec<ConditionDraft>,
    pub actions: Vec<ActionDraft>,
}

impl Default for RuleDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleDraft {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            resource_type: ResourceType::Transaction.as_str().to_string(),
            effective_date: None,
            active: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    #[must_use]
    pub fn effective_date(mut self, date: NaiveDate) -> Self {
        self.effective_date = Some(date);
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: ConditionDraft) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: ActionDraft) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ConditionDraft {
    pub condition_type: String,
    pub operator: String,
    pub value: Option<String>,
}

impl ConditionDraft {
    #[must_use]
    pub fn new(
        condition_type: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            operator: operator.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ActionDraft {
    pub action_type: String,
    pub value: Option<String>,
}

impl ActionDraft {
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Create a transaction. Fields set here are user values.
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub family_id: Uuid,
    pub occurred_on: NaiveDate,
    pub name: String,
    pub amount: MoneyCents,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub excluded: bool,
    pub category_id: Option<Uuid>,
    pub merchant_id: Option<Uuid>,
    pub tag_ids: Vec<Uuid>,
}

impl NewTransaction {
    #[must_use]
    pub fn new(
        family_id: Uuid,
        occurred_on: NaiveDate,
        name: impl Into<String>,
        amount: MoneyCents,
    ) -> Self {
        Self {
            family_id,
            occurred_on,
            name: name.into(),
            amount,
            currency: Currency::default(),
            kind: TransactionKind::Standard,
            excluded: false,
            category_id: None,
            merchant_id: None,
            tag_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn excluded(mut self, excluded: bool) -> Self {
        self.excluded = excluded;
        self
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn merchant_id(mut self, merchant_id: Uuid) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    #[must_use]
    pub fn tag_ids(mut self, tag_ids: Vec<Uuid>) -> Self {
        self.tag_ids = tag_ids;
        self
    }
}

/// Manual edit of a transaction.
///
/// Every field that is present becomes a user value and locks the field
/// against rules and AI. `Some(None)` clears a category or merchant (the
/// cleared field stays locked).
#[derive(Clone, Debug, Default)]
pub struct TransactionUpdate {
    pub name: Option<String>,
    pub category_id: Option<Option<Uuid>>,
    pub merchant_id: Option<Option<Uuid>>,
    pub tag_ids: Option<Vec<Uuid>>,
    pub excluded: Option<bool>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category_id.is_none()
            && self.merchant_id.is_none()
            && self.tag_ids.is_none()
            && self.excluded.is_none()
    }
}

/// Options of a rule run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    pub execution_type: ExecutionType,
    /// Deterministic actions also overwrite user-set values. AI actions
    /// always respect locks.
    pub ignore_locks: bool,
}

impl RunOptions {
    #[must_use]
    pub fn manual() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scheduled() -> Self {
        Self {
            execution_type: ExecutionType::Scheduled,
            ignore_locks: false,
        }
    }

    #[must_use]
    pub fn ignore_locks(mut self, ignore: bool) -> Self {
        self.ignore_locks = ignore;
        self
    }
}

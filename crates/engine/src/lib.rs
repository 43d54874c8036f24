//! Transaction rule engine.
//!
//! Families own transactions, categories, merchants, tags and rules. A rule
//! compiles its conditions into a [`TransactionScope`] and runs its actions
//! against it, in order. All entry points live on [`Engine`].

pub use actions::{ActionKind, ActionOutcome, ActionValue};
pub use categories::Category;
pub use commands::{
    ActionDraft, ConditionDraft, NewTransaction, RuleDraft, RunOptions, TransactionUpdate,
};
pub use conditions::{ConditionKind, ConditionValue, FilterType, Operator, SelectOption};
pub use currency::Currency;
pub use enrichment::{
    EnrichmentProvider, EnrichmentRequest, EnrichmentResponse, EnrichmentRow, EnrichmentSource,
    EnrichmentSubject, ProviderError,
};
pub use error::{EngineError, RuleErrorKind, RuleErrors, RuleFieldError};
pub use events::{ActionEvent, RuleEventSink};
pub use families::Family;
pub use merchants::Merchant;
pub use money::MoneyCents;
pub use ops::{
    Engine, EngineBuilder, RulePreview, SweepFailure, SweepReport, TransactionListFilter,
};
pub use registry::{
    ActionExecutorView, ConditionFilterView, OperatorView, Registry, RegistryView, ResourceType,
};
pub use rule_runs::{
    ActionFailure, ActionReport, ExecutionType, FailureKind, RuleRunReport, RunStatus,
};
pub use rules::{Rule, RuleAction, RuleCondition};
pub use scope::TransactionScope;
pub use tags::Tag;
pub use transactions::{Transaction, TransactionKind};

mod actions;
mod categories;
mod commands;
mod conditions;
mod currency;
mod enrichment;
mod error;
mod events;
mod families;
mod merchants;
mod money;
mod ops;
mod registry;
mod rule_actions;
mod rule_conditions;
mod rule_runs;
mod rules;
mod scope;
mod tags;
mod transaction_tags;
mod transactions;
mod util;
mod validation;

pub type ResultEngine<T> = Result<T, EngineError>;

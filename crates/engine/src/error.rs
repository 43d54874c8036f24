//! The module contains the errors the engine can return.
//!
//! Rule drafts are validated as a whole: every problem found while checking a
//! draft is collected in [`RuleErrors`] and surfaced through a single
//! [`InvalidRule`] so callers can show field-level messages.
//!
//! Failures of a single action during a rule run are *not* errors of the run:
//! they are captured in the run report (see [`ActionReport`]).
//!
//!  [`InvalidRule`]: EngineError::InvalidRule
//!  [`ActionReport`]: crate::ActionReport
use std::fmt;

use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProviderError;

/// Category of a rule validation problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleErrorKind {
    /// Unsupported resource type, unknown condition/action type, operator not
    /// valid for the filter type.
    Configuration,
    /// Missing or malformed value.
    Validation,
}

/// One problem found in a rule draft, addressed by field path
/// (e.g. `conditions[1].operator`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFieldError {
    pub field: String,
    pub kind: RuleErrorKind,
    pub message: String,
}

impl RuleFieldError {
    pub(crate) fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: RuleErrorKind::Configuration,
            message: message.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: RuleErrorKind::Validation,
            message: message.into(),
        }
    }
}

/// Ordered list of rule validation problems.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleErrors(Vec<RuleFieldError>);

impl RuleErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleFieldError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<RuleFieldError> {
        self.0
    }

    pub(crate) fn push(&mut self, error: RuleFieldError) {
        self.0.push(error);
    }

    /// `Ok(())` when nothing was collected, [`EngineError::InvalidRule`]
    /// otherwise.
    pub(crate) fn into_result(self) -> Result<(), EngineError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidRule(self))
        }
    }
}

impl fmt::Display for RuleErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl From<RuleFieldError> for RuleErrors {
    fn from(value: RuleFieldError) -> Self {
        Self(vec![value])
    }
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(RuleErrors),
    #[error("Rule disabled: {0}")]
    RuleDisabled(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<RuleErrors> for EngineError {
    fn from(value: RuleErrors) -> Self {
        Self::InvalidRule(value)
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidCurrency(a), Self::InvalidCurrency(b)) => a == b,
            (Self::InvalidRule(a), Self::InvalidRule(b)) => a == b,
            (Self::RuleDisabled(a), Self::RuleDisabled(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (Self::Provider(a), Self::Provider(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_errors_display_joins_fields() {
        let mut errors = RuleErrors::default();
        errors.push(RuleFieldError::configuration(
            "conditions[0].operator",
            "operator '>' is not valid for text filters",
        ));
        errors.push(RuleFieldError::validation(
            "actions[0].value",
            "value is required",
        ));

        assert_eq!(
            errors.to_string(),
            "conditions[0].operator: operator '>' is not valid for text filters; \
             actions[0].value: value is required"
        );
    }

    #[test]
    fn empty_rule_errors_are_ok() {
        assert!(RuleErrors::default().into_result().is_ok());
        let err = RuleErrors::from(RuleFieldError::validation("name", "too long"))
            .into_result()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule(ref e) if e.len() == 1));
    }
}

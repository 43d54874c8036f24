//! Audit hook for rule runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ActionFailure;

/// One executed action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub family_id: Uuid,
    pub rule_id: Uuid,
    pub run_id: Uuid,
    pub action_type: String,
    pub matched: u64,
    pub updated: u64,
    pub skipped: u64,
    pub duration_ms: u64,
    pub failure: Option<ActionFailure>,
}

/// Receives an [`ActionEvent`] after every action of every run.
///
/// Called inline on the run's task; implementations should hand the event
/// off (channel, buffer) rather than block.
pub trait RuleEventSink: Send + Sync {
    fn record(&self, event: &ActionEvent);
}

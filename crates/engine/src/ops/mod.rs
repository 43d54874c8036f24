use std::{fmt, sync::Arc};

use sea_orm::DatabaseConnection;

use crate::{
    EngineError, EnrichmentProvider, ResultEngine, RuleEventSink, actions::DEFAULT_AI_BATCH_SIZE,
};

mod access;
mod catalog;
mod families;
mod rules;
mod runs;
mod transactions;

pub use rules::RulePreview;
pub use runs::{SweepFailure, SweepReport};
pub use transactions::TransactionListFilter;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

pub struct Engine {
    database: DatabaseConnection,
    provider: Option<Arc<dyn EnrichmentProvider>>,
    events: Option<Arc<dyn RuleEventSink>>,
    ai_batch_size: usize,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("provider", &self.provider.is_some())
            .field("events", &self.events.is_some())
            .field("ai_batch_size", &self.ai_batch_size)
            .finish()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    provider: Option<Arc<dyn EnrichmentProvider>>,
    events: Option<Arc<dyn RuleEventSink>>,
    ai_batch_size: Option<usize>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Enrichment provider used by AI actions. Without one, AI actions are
    /// not offered and fail closed if a stored rule still has them.
    pub fn enrichment_provider(mut self, provider: Arc<dyn EnrichmentProvider>) -> EngineBuilder {
        self.provider = Some(provider);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn RuleEventSink>) -> EngineBuilder {
        self.events = Some(sink);
        self
    }

    /// Rows per provider request (default 25).
    pub fn ai_batch_size(mut self, size: usize) -> EngineBuilder {
        self.ai_batch_size = Some(size);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let ai_batch_size = self.ai_batch_size.unwrap_or(DEFAULT_AI_BATCH_SIZE);
        if ai_batch_size == 0 {
            return Err(EngineError::Configuration(
                "ai_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(Engine {
            database: self.database,
            provider: self.provider,
            events: self.events,
            ai_batch_size,
        })
    }
}

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use engine::{
    ActionDraft, ActionEvent, ConditionDraft, Engine, EngineError, EnrichmentProvider,
    EnrichmentRequest, EnrichmentResponse, EnrichmentSource, EnrichmentSubject, ExecutionType,
    FailureKind, MoneyCents, NewTransaction, ProviderError, RuleDraft, RuleErrorKind,
    RuleEventSink, RunOptions, RunStatus, Transaction, TransactionKind, TransactionUpdate,
};
use migration::MigratorTrait;
use uuid::Uuid;

/// Answers by transaction name and remembers every request.
#[derive(Default)]
struct StubProvider {
    answers: HashMap<String, String>,
    fail: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<(EnrichmentSubject, Vec<String>)>>,
}

impl StubProvider {
    fn answering(pairs: &[(&str, &str)]) -> Self {
        Self {
            answers: pairs
                .iter()
                .map(|(name, answer)| (name.to_string(), answer.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen_names(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, names)| names.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl EnrichmentProvider for StubProvider {
    async fn batch_suggest(
        &self,
        request: EnrichmentRequest,
    ) -> Result<EnrichmentResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((
            request.subject,
            request.rows.iter().map(|r| r.name.clone()).collect(),
        ));
        if self.fail {
            return Err(ProviderError::Timeout);
        }
        let mut response = EnrichmentResponse::default();
        for row in &request.rows {
            response
                .suggestions
                .insert(row.id, self.answers.get(&row.name).cloned());
        }
        Ok(response)
    }
}

/// Stands in for a user editing the row while suggestions are being fetched.
struct RacingProvider {
    db: DatabaseConnection,
    answer: String,
}

#[async_trait::async_trait]
impl EnrichmentProvider for RacingProvider {
    async fn batch_suggest(
        &self,
        request: EnrichmentRequest,
    ) -> Result<EnrichmentResponse, ProviderError> {
        self.db
            .execute_unprepared("UPDATE transactions SET category_source = 'user'")
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;
        let mut response = EnrichmentResponse::default();
        for row in &request.rows {
            response.suggestions.insert(row.id, Some(self.answer.clone()));
        }
        Ok(response)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ActionEvent>>,
}

impl RuleEventSink for RecordingSink {
    fn record(&self, event: &ActionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

async fn connect() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

async fn engine_with_db() -> Engine {
    Engine::builder()
        .database(connect().await)
        .build()
        .await
        .unwrap()
}

async fn engine_with_provider(provider: Arc<StubProvider>, batch_size: usize) -> Engine {
    Engine::builder()
        .database(connect().await)
        .enrichment_provider(provider)
        .ai_batch_size(batch_size)
        .build()
        .await
        .unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

async fn add_tx(engine: &Engine, family_id: Uuid, name: &str, cents: i64) -> Transaction {
    engine
        .create_transaction(NewTransaction::new(
            family_id,
            day(1),
            name,
            MoneyCents::new(cents),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn zero_conditions_match_the_base_scope() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();

    add_tx(&engine, family.id, "Coffee", 350).await;
    engine
        .create_transaction(
            NewTransaction::new(family.id, day(2), "Hidden", MoneyCents::new(100)).excluded(true),
        )
        .await
        .unwrap();
    engine
        .create_transaction(
            NewTransaction::new(family.id, day(2), "To savings", MoneyCents::new(10_000))
                .kind(TransactionKind::Transfer),
        )
        .await
        .unwrap();
    engine
        .create_transaction(NewTransaction::new(
            family.id,
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            "Last year",
            MoneyCents::new(100),
        ))
        .await
        .unwrap();

    let preview = engine
        .preview_draft(family.id, RuleDraft::new())
        .await
        .unwrap();
    assert_eq!(preview.matched, 2);

    let preview = engine
        .preview_draft(
            family.id,
            RuleDraft::new().effective_date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(preview.matched, 1);
    assert_eq!(preview.sample[0].name, "Coffee");
}

#[tokio::test]
async fn amount_conditions_compare_magnitude() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    add_tx(&engine, family.id, "Charge", 7_500).await;
    add_tx(&engine, family.id, "Refund", -7_500).await;
    add_tx(&engine, family.id, "Small refund", -3_000).await;

    let preview = engine
        .preview_draft(
            family.id,
            RuleDraft::new().condition(ConditionDraft::new("transaction_amount", ">", "50")),
        )
        .await
        .unwrap();
    assert_eq!(preview.matched, 2);
    assert!(preview.sample.iter().all(|t| t.amount.abs().cents() == 7_500));
}

#[tokio::test]
async fn name_conditions_fold_non_ascii_case() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    add_tx(&engine, family.id, "CAFÉ NERO", 450).await;
    add_tx(&engine, family.id, "Cafeteria", 300).await;

    let equal = engine
        .preview_draft(
            family.id,
            RuleDraft::new().condition(ConditionDraft::new("transaction_name", "=", "café nero")),
        )
        .await
        .unwrap();
    assert_eq!(equal.matched, 1);
    assert_eq!(equal.sample[0].name, "CAFÉ NERO");

    let like = engine
        .preview_draft(
            family.id,
            RuleDraft::new().condition(ConditionDraft::new("transaction_name", "like", "café")),
        )
        .await
        .unwrap();
    assert_eq!(like.matched, 1);

    // Renames by rules keep matching.
    let rename = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "cafeteria"))
                .action(ActionDraft::new("set_transaction_name").value("ÉPICERIE")),
        )
        .await
        .unwrap();
    engine
        .apply_rule(family.id, rename.id, RunOptions::manual())
        .await
        .unwrap();
    let renamed = engine
        .preview_draft(
            family.id,
            RuleDraft::new().condition(ConditionDraft::new("transaction_name", "=", "épicerie")),
        )
        .await
        .unwrap();
    assert_eq!(renamed.matched, 1);
}

#[tokio::test]
async fn amazon_rule_categorizes_matching_rows() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let shopping = engine.create_category(family.id, "Shopping").await.unwrap();
    let food = engine.create_category(family.id, "Food").await.unwrap();

    let a = add_tx(&engine, family.id, "AMAZON MKTPL 123", 2_999).await;
    let b = add_tx(&engine, family.id, "Amazon Prime", 499).await;
    let locked = engine
        .create_transaction(
            NewTransaction::new(family.id, day(3), "amazon fresh", MoneyCents::new(4_200))
                .category_id(food.id),
        )
        .await
        .unwrap();
    let other = add_tx(&engine, family.id, "Netflix", 1_299).await;
    add_tx(&engine, family.id, "Whole Foods", 5_400).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .name("Amazon is shopping")
                .condition(ConditionDraft::new("transaction_name", "like", "amazon"))
                .action(
                    ActionDraft::new("set_transaction_category").value(shopping.id.to_string()),
                ),
        )
        .await
        .unwrap();

    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.matched, 3);
    assert_eq!(report.actions[0].updated, 2);
    assert_eq!(report.actions[0].skipped, 1);

    for id in [a.id, b.id] {
        let tx = engine.transaction(family.id, id).await.unwrap();
        assert_eq!(tx.category_id, Some(shopping.id));
        assert_eq!(tx.category_source, Some(EnrichmentSource::Rule));
    }
    let tx = engine.transaction(family.id, locked.id).await.unwrap();
    assert_eq!(tx.category_id, Some(food.id));
    assert_eq!(tx.category_source, Some(EnrichmentSource::User));
    let tx = engine.transaction(family.id, other.id).await.unwrap();
    assert_eq!(tx.category_id, None);

    // Nothing left to change.
    let again = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(again.matched, 3);
    assert_eq!(again.updated(), 0);
}

#[tokio::test]
async fn deleted_targets_fail_the_action_closed() {
    let db = connect().await;
    let engine = Engine::builder().database(db.clone()).build().await.unwrap();
    let family = engine.create_family("Rossi", false).await.unwrap();
    let shopping = engine.create_category(family.id, "Shopping").await.unwrap();
    let tx = add_tx(&engine, family.id, "Amazon", 2_000).await;
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(
                ActionDraft::new("set_transaction_category").value(shopping.id.to_string()),
            ),
        )
        .await
        .unwrap();

    db.execute_unprepared("DELETE FROM categories").await.unwrap();

    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    let failure = report.actions[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Configuration);
    assert!(failure.message.contains("no longer exists"), "{}", failure.message);
    let tx = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(tx.category_id, None);
}

#[tokio::test]
async fn ignore_locks_overwrites_user_values() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let shopping = engine.create_category(family.id, "Shopping").await.unwrap();
    let food = engine.create_category(family.id, "Food").await.unwrap();
    let tx = engine
        .create_transaction(
            NewTransaction::new(family.id, day(3), "amazon fresh", MoneyCents::new(4_200))
                .category_id(food.id),
        )
        .await
        .unwrap();
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "amazon"))
                .action(
                    ActionDraft::new("set_transaction_category").value(shopping.id.to_string()),
                ),
        )
        .await
        .unwrap();

    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual().ignore_locks(true))
        .await
        .unwrap();
    assert_eq!(report.updated(), 1);
    let tx = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(tx.category_id, Some(shopping.id));
    assert_eq!(tx.category_source, Some(EnrichmentSource::Rule));
}

#[tokio::test]
async fn preview_does_not_write() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let tx = add_tx(&engine, family.id, "Uber trip", 1_800).await;
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "uber"))
                .action(ActionDraft::new("set_transaction_name").value("Uber")),
        )
        .await
        .unwrap();

    let preview = engine.preview_rule(family.id, rule.id).await.unwrap();
    assert_eq!(preview.matched, 1);
    assert_eq!(preview.sample[0].id, tx.id);

    let after = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(after.name, "Uber trip");
    assert_eq!(after.name_source, None);
    assert!(
        engine
            .list_rule_runs(family.id, rule.id, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn rules_without_actions_only_count() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let tx = add_tx(&engine, family.id, "Spotify", 1_099).await;
    add_tx(&engine, family.id, "Spotify family", 1_799).await;
    add_tx(&engine, family.id, "Rent", 90_000).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().condition(ConditionDraft::new("transaction_name", "like", "spotify")),
        )
        .await
        .unwrap();
    assert!(rule.actions.is_empty());

    let preview = engine.preview_rule(family.id, rule.id).await.unwrap();
    assert_eq!(preview.matched, 2);

    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.matched, 2);
    assert!(report.actions.is_empty());
    assert_eq!(report.updated(), 0);

    let after = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(after, tx);
}

#[tokio::test]
async fn invalid_drafts_report_every_field() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let neighbours = engine.create_family("Bianchi", false).await.unwrap();
    let foreign = engine
        .create_category(neighbours.id, "Shopping")
        .await
        .unwrap();

    let err = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", ">", "amazon"))
                .condition(ConditionDraft::new("transaction_category", "=", foreign.id.to_string()))
                .action(ActionDraft::new("set_transaction_category").value(foreign.id.to_string())),
        )
        .await
        .unwrap_err();

    // Structural errors stop before ownership checks.
    let EngineError::InvalidRule(errors) = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.iter().next().unwrap().field, "conditions[0].operator");

    let err = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_category", "=", foreign.id.to_string()))
                .action(ActionDraft::new("set_transaction_category").value(foreign.id.to_string())),
        )
        .await
        .unwrap_err();
    let EngineError::InvalidRule(errors) = err else {
        panic!("unexpected error: {err:?}");
    };
    let fields: Vec<_> = errors
        .iter()
        .map(|e| (e.field.as_str(), e.kind))
        .collect();
    assert_eq!(
        fields,
        [
            ("conditions[0].value", RuleErrorKind::Validation),
            ("actions[0].value", RuleErrorKind::Validation),
        ]
    );
    assert!(engine.list_rules(family.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rules_are_isolated_per_family() {
    let engine = engine_with_db().await;
    let rossi = engine.create_family("Rossi", false).await.unwrap();
    let bianchi = engine.create_family("Bianchi", false).await.unwrap();
    add_tx(&engine, rossi.id, "Amazon", 1_000).await;
    let theirs = add_tx(&engine, bianchi.id, "Amazon", 1_000).await;

    let rule = engine
        .create_rule(
            rossi.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "amazon"))
                .action(ActionDraft::new("set_transaction_name").value("Amazon.com")),
        )
        .await
        .unwrap();

    assert!(matches!(
        engine.rule(bianchi.id, rule.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
    assert!(matches!(
        engine.apply_rule(bianchi.id, rule.id, RunOptions::manual()).await,
        Err(EngineError::KeyNotFound(_))
    ));

    let report = engine
        .apply_rule(rossi.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.updated(), 1);
    let untouched = engine.transaction(bianchi.id, theirs.id).await.unwrap();
    assert_eq!(untouched.name, "Amazon");
}

#[tokio::test]
async fn merchant_conditions_and_actions() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let uber = engine.create_merchant(family.id, "Uber").await.unwrap();
    let transport = engine.create_category(family.id, "Transport").await.unwrap();
    let tx = add_tx(&engine, family.id, "UBER *TRIP", 1_500).await;
    add_tx(&engine, family.id, "Bakery", 300).await;

    let tagger = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "uber"))
                .action(ActionDraft::new("set_transaction_merchant").value(uber.id.to_string())),
        )
        .await
        .unwrap();
    engine
        .apply_rule(family.id, tagger.id, RunOptions::manual())
        .await
        .unwrap();

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new(
                    "transaction_merchant",
                    "=",
                    uber.id.to_string(),
                ))
                .action(
                    ActionDraft::new("set_transaction_category").value(transport.id.to_string()),
                ),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.updated(), 1);

    let tx = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(tx.merchant_id, Some(uber.id));
    assert_eq!(tx.merchant_source, Some(EnrichmentSource::Rule));
    assert_eq!(tx.category_id, Some(transport.id));
}

#[tokio::test]
async fn tag_action_replaces_tag_sets() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let online = engine.create_tag(family.id, "online").await.unwrap();
    let monthly = engine.create_tag(family.id, "monthly").await.unwrap();
    let old = engine.create_tag(family.id, "old").await.unwrap();

    let tx = engine
        .create_transaction(
            NewTransaction::new(family.id, day(4), "Spotify", MoneyCents::new(999)),
        )
        .await
        .unwrap();
    let pinned = engine
        .create_transaction(
            NewTransaction::new(family.id, day(4), "Spotify family", MoneyCents::new(1_799))
                .tag_ids(vec![old.id]),
        )
        .await
        .unwrap();

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "spotify"))
                .action(
                    ActionDraft::new("set_transaction_tags")
                        .value(format!("{},{}", online.id, monthly.id)),
                ),
        )
        .await
        .unwrap();

    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.matched, 2);
    assert_eq!(report.updated(), 1);
    assert_eq!(report.skipped(), 1);

    let tx = engine.transaction(family.id, tx.id).await.unwrap();
    let mut tags = tx.tag_ids.clone();
    tags.sort();
    let mut expected = vec![online.id, monthly.id];
    expected.sort();
    assert_eq!(tags, expected);
    assert_eq!(tx.tags_source, Some(EnrichmentSource::Rule));

    let pinned = engine.transaction(family.id, pinned.id).await.unwrap();
    assert_eq!(pinned.tag_ids, vec![old.id]);

    let again = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(again.updated(), 0);
}

#[tokio::test]
async fn auto_categorize_batches_provider_calls() {
    let provider = Arc::new(StubProvider::answering(&[
        ("Esselunga", "groceries"),
        ("Conad", "Groceries"),
    ]));
    let engine = engine_with_provider(provider.clone(), 25).await;
    let family = engine.create_family("Rossi", true).await.unwrap();
    let groceries = engine.create_category(family.id, "Groceries").await.unwrap();
    let a = add_tx(&engine, family.id, "Esselunga", 4_500).await;
    let b = add_tx(&engine, family.id, "Conad", 2_100).await;
    let c = add_tx(&engine, family.id, "Mystery shop", 900).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_categorize")),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.actions[0].matched, 3);
    assert_eq!(report.actions[0].updated, 2);
    assert_eq!(report.actions[0].skipped, 1);

    for id in [a.id, b.id] {
        let tx = engine.transaction(family.id, id).await.unwrap();
        assert_eq!(tx.category_id, Some(groceries.id));
        assert_eq!(tx.category_source, Some(EnrichmentSource::Ai));
    }
    let c = engine.transaction(family.id, c.id).await.unwrap();
    assert_eq!(c.category_id, None);
    assert_eq!(c.category_source, None);

    // Filled rows are never sent again.
    engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(
        provider.seen.lock().unwrap()[1].1,
        vec!["Mystery shop".to_string()]
    );
}

#[tokio::test]
async fn batch_size_bounds_each_request() {
    let provider = Arc::new(StubProvider::default());
    let engine = engine_with_provider(provider.clone(), 2).await;
    let family = engine.create_family("Rossi", true).await.unwrap();
    for name in ["One", "Two", "Three"] {
        add_tx(&engine, family.id, name, 100).await;
    }
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_detect_merchants")),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    let sizes: Vec<_> = provider
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|(subject, names)| {
            assert_eq!(*subject, EnrichmentSubject::Merchant);
            names.len()
        })
        .collect();
    assert_eq!(sizes, [2, 1]);
    assert_eq!(report.updated(), 0);
}

#[tokio::test]
async fn auto_detect_merchants_creates_ai_merchants() {
    let provider = Arc::new(StubProvider::answering(&[
        ("NETFLIX.COM 8899", "Netflix"),
        ("Netflix monthly", "  Netflix "),
    ]));
    let engine = engine_with_provider(provider.clone(), 25).await;
    let family = engine.create_family("Rossi", true).await.unwrap();
    let a = add_tx(&engine, family.id, "NETFLIX.COM 8899", 1_299).await;
    let b = add_tx(&engine, family.id, "Netflix monthly", 1_299).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_detect_merchants")),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.updated(), 2);

    let merchants = engine.list_merchants(family.id).await.unwrap();
    assert_eq!(merchants.len(), 1);
    assert_eq!(merchants[0].name, "Netflix");
    assert_eq!(merchants[0].source, EnrichmentSource::Ai);

    for id in [a.id, b.id] {
        let tx = engine.transaction(family.id, id).await.unwrap();
        assert_eq!(tx.merchant_id, Some(merchants[0].id));
        assert_eq!(tx.merchant_source, Some(EnrichmentSource::Ai));
    }
}

#[tokio::test]
async fn ai_never_touches_user_locked_fields() {
    let provider = Arc::new(StubProvider::answering(&[
        ("Pharmacy", "Health"),
        ("Cleared by hand", "Health"),
        ("Chosen by hand", "Health"),
    ]));
    let engine = engine_with_provider(provider.clone(), 25).await;
    let family = engine.create_family("Rossi", true).await.unwrap();
    let health = engine.create_category(family.id, "Health").await.unwrap();
    let gifts = engine.create_category(family.id, "Gifts").await.unwrap();

    let open = add_tx(&engine, family.id, "Pharmacy", 1_200).await;
    let cleared = add_tx(&engine, family.id, "Cleared by hand", 800).await;
    engine
        .update_transaction(
            family.id,
            cleared.id,
            TransactionUpdate {
                category_id: Some(None),
                ..TransactionUpdate::default()
            },
        )
        .await
        .unwrap();
    let chosen = engine
        .create_transaction(
            NewTransaction::new(family.id, day(5), "Chosen by hand", MoneyCents::new(500))
                .category_id(gifts.id),
        )
        .await
        .unwrap();

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_categorize")),
        )
        .await
        .unwrap();
    // AI actions respect locks even when a run ignores them.
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual().ignore_locks(true))
        .await
        .unwrap();

    assert_eq!(report.updated(), 1);
    assert_eq!(report.actions[0].matched, 3);
    assert_eq!(report.actions[0].skipped, 2);
    assert_eq!(provider.seen_names(), vec!["Pharmacy".to_string()]);
    let open = engine.transaction(family.id, open.id).await.unwrap();
    assert_eq!(open.category_id, Some(health.id));
    let cleared = engine.transaction(family.id, cleared.id).await.unwrap();
    assert_eq!(cleared.category_id, None);
    assert_eq!(cleared.category_source, Some(EnrichmentSource::User));
    let chosen = engine.transaction(family.id, chosen.id).await.unwrap();
    assert_eq!(chosen.category_id, Some(gifts.id));
}

#[tokio::test]
async fn rows_locked_mid_run_count_as_skipped() {
    let db = connect().await;
    let provider = Arc::new(RacingProvider {
        db: db.clone(),
        answer: "Travel".to_string(),
    });
    let engine = Engine::builder()
        .database(db)
        .enrichment_provider(provider)
        .build()
        .await
        .unwrap();
    let family = engine.create_family("Rossi", true).await.unwrap();
    engine.create_category(family.id, "Travel").await.unwrap();
    let tx = add_tx(&engine, family.id, "Trenitalia", 2_900).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_categorize")),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.actions[0].updated, 0);
    assert_eq!(report.actions[0].skipped, 1);
    assert_eq!(report.actions[0].failure, None);
    let tx = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(tx.category_id, None);
    assert_eq!(tx.category_source, Some(EnrichmentSource::User));
}

#[tokio::test]
async fn ai_actions_fail_closed_when_ai_is_disabled() {
    let provider = Arc::new(StubProvider::answering(&[("Esselunga", "Groceries")]));
    let engine = engine_with_provider(provider.clone(), 25).await;
    let family = engine.create_family("Rossi", true).await.unwrap();
    engine.create_category(family.id, "Groceries").await.unwrap();
    add_tx(&engine, family.id, "Esselunga", 4_500).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_categorize")),
        )
        .await
        .unwrap();
    engine.set_family_ai(family.id, false).await.unwrap();

    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    let failure = report.actions[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Configuration);
    assert!(failure.message.contains("requires AI"));
    assert_eq!(provider.calls(), 0);

    // New AI rules are rejected outright.
    let err = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("auto_categorize")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRule(_)));
}

#[tokio::test]
async fn provider_failure_does_not_stop_later_actions() {
    let provider = Arc::new(StubProvider::failing());
    let engine = engine_with_provider(provider.clone(), 25).await;
    let family = engine.create_family("Rossi", true).await.unwrap();
    let tx = add_tx(&engine, family.id, "amzn mktp", 2_000).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "amzn"))
                .action(ActionDraft::new("auto_categorize"))
                .action(ActionDraft::new("set_transaction_name").value("Amazon")),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.failed_actions(), 1);
    assert_eq!(
        report.actions[0].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::Provider)
    );
    assert_eq!(report.actions[0].updated, 0);
    assert!(report.actions[1].failure.is_none());
    assert_eq!(report.actions[1].updated, 1);

    let tx = engine.transaction(family.id, tx.id).await.unwrap();
    assert_eq!(tx.name, "Amazon");
    assert_eq!(tx.name_source, Some(EnrichmentSource::Rule));

    let history = engine.list_rule_runs(family.id, rule.id, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, report.id);
    assert_eq!(history[0].status, RunStatus::Partial);
    assert_eq!(history[0].actions, report.actions);
}

#[tokio::test]
async fn disabled_rules_do_not_run() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    add_tx(&engine, family.id, "Gym", 4_000).await;
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .name("Gym")
                .active(false)
                .action(ActionDraft::new("set_transaction_name").value("Gym membership")),
        )
        .await
        .unwrap();

    assert_eq!(
        engine
            .apply_rule(family.id, rule.id, RunOptions::manual())
            .await
            .unwrap_err(),
        EngineError::RuleDisabled("Gym".to_string())
    );

    let sweep = engine.apply_active_rules().await.unwrap();
    assert!(sweep.runs.is_empty());

    let rule = engine.set_rule_active(family.id, rule.id, true).await.unwrap();
    assert!(rule.active);
    let sweep = engine.apply_active_rules().await.unwrap();
    assert_eq!(sweep.runs.len(), 1);
    assert_eq!(sweep.runs[0].execution_type, ExecutionType::Scheduled);
    assert_eq!(sweep.runs[0].updated(), 1);
}

#[tokio::test]
async fn sweep_covers_every_family() {
    let engine = engine_with_db().await;
    let rossi = engine.create_family("Rossi", false).await.unwrap();
    let bianchi = engine.create_family("Bianchi", false).await.unwrap();
    for family in [&rossi, &bianchi] {
        add_tx(&engine, family.id, "rent march", 90_000).await;
        engine
            .create_rule(
                family.id,
                RuleDraft::new()
                    .condition(ConditionDraft::new("transaction_name", "like", "rent"))
                    .action(ActionDraft::new("set_transaction_name").value("Rent")),
            )
            .await
            .unwrap();
    }

    let sweep = engine.apply_active_rules().await.unwrap();
    assert!(sweep.failures.is_empty());
    assert_eq!(sweep.runs.len(), 2);
    assert!(sweep.runs.iter().all(|r| r.updated() == 1));
}

#[tokio::test]
async fn run_history_is_newest_first() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    add_tx(&engine, family.id, "Bakery", 300).await;
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new().action(ActionDraft::new("set_transaction_name").value("Bread")),
        )
        .await
        .unwrap();

    let first = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();
    let second = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();

    let history = engine.list_rule_runs(family.id, rule.id, 10).await.unwrap();
    assert_eq!(
        history.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    assert_eq!(history[1].updated(), 1);
    assert_eq!(history[0].updated(), 0);

    engine.delete_rule(family.id, rule.id).await.unwrap();
    assert!(matches!(
        engine.rule(family.id, rule.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn event_sink_sees_every_action() {
    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::builder()
        .database(connect().await)
        .event_sink(sink.clone())
        .build()
        .await
        .unwrap();
    let family = engine.create_family("Rossi", false).await.unwrap();
    let travel = engine.create_category(family.id, "Travel").await.unwrap();
    add_tx(&engine, family.id, "Trenitalia", 3_500).await;

    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .action(ActionDraft::new("set_transaction_category").value(travel.id.to_string()))
                .action(ActionDraft::new("set_transaction_name").value("Train")),
        )
        .await
        .unwrap();
    let report = engine
        .apply_rule(family.id, rule.id, RunOptions::manual())
        .await
        .unwrap();

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.run_id == report.id && e.rule_id == rule.id));
    assert_eq!(events[0].action_type, "set_transaction_category");
    assert_eq!(events[1].action_type, "set_transaction_name");
    assert!(events.iter().all(|e| e.updated == 1 && e.failure.is_none()));
}

#[tokio::test]
async fn update_rule_replaces_conditions_and_actions() {
    let engine = engine_with_db().await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    let rule = engine
        .create_rule(
            family.id,
            RuleDraft::new()
                .condition(ConditionDraft::new("transaction_name", "like", "a"))
                .condition(ConditionDraft::new("transaction_amount", "<", "10"))
                .action(ActionDraft::new("set_transaction_name").value("A")),
        )
        .await
        .unwrap();
    assert_eq!(rule.title(), "set_transaction_name");

    let updated = engine
        .update_rule(
            family.id,
            rule.id,
            RuleDraft::new()
                .name("Small amounts")
                .condition(ConditionDraft::new("transaction_amount", "<=", "5,50"))
                .action(ActionDraft::new("set_transaction_name").value("Small")),
        )
        .await
        .unwrap();
    assert_eq!(updated.title(), "Small amounts");
    assert_eq!(updated.conditions.len(), 1);
    assert_eq!(updated.conditions[0].operator, "<=");
    assert_eq!(updated.conditions[0].value.as_deref(), Some("5.50"));
    assert_eq!(updated.actions.len(), 1);
    assert_ne!(updated.actions[0].id, rule.actions[0].id);
}

#[tokio::test]
async fn registry_lists_filters_and_family_options() {
    let provider = Arc::new(StubProvider::default());
    let engine = engine_with_provider(provider, 25).await;
    let family = engine.create_family("Rossi", false).await.unwrap();
    engine.create_category(family.id, "Groceries").await.unwrap();

    let view = engine.rule_registry(family.id).await.unwrap();
    assert!(!view.ai_enabled);
    assert_eq!(view.conditions.len(), 4);
    assert_eq!(view.actions.len(), 4);
    let category = view
        .conditions
        .iter()
        .find(|c| c.key == "transaction_category")
        .unwrap();
    assert_eq!(
        category.options.as_ref().map(|o| o[0].name.as_str()),
        Some("Groceries")
    );

    engine.set_family_ai(family.id, true).await.unwrap();
    let view = engine.rule_registry(family.id).await.unwrap();
    assert!(view.ai_enabled);
    assert_eq!(view.actions.len(), 6);
}

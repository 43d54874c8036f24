use std::{sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "rulebook={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    if settings.server.is_none() && settings.sweep.is_none() {
        tracing::warn!("no server or sweep settings found, nothing to run");
        return Ok(());
    }

    let db = parse_database(&settings.engine.database).await?;
    let mut builder = engine::Engine::builder().database(db);
    if let Some(size) = settings.engine.ai_batch_size {
        builder = builder.ai_batch_size(size);
    }
    let engine = Arc::new(builder.build().await?);

    if let Some(server) = settings.server {
        tracing::info!("Found server settings...");
        let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
        let addr = format!("{}:{}", bind, server.port);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let server_engine = engine.clone();
        tasks.spawn(async move {
            if let Err(err) = server::run_with_listener(server_engine, listener).await {
                tracing::error!("server failed: {err}");
            }
        });
    }

    if let Some(sweep) = settings.sweep {
        tracing::info!(interval_secs = sweep.interval_secs, "Found sweep settings...");
        let period = Duration::from_secs(sweep.interval_secs.max(1));
        tasks.spawn(run_sweeps(engine, period));
    }

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

/// Applies every active rule once per `period`. The first sweep runs one
/// period after startup.
async fn run_sweeps(engine: Arc<engine::Engine>, period: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        match engine.apply_active_rules().await {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::warn!(
                        family_id = %failure.family_id,
                        rule_id = %failure.rule_id,
                        "rule skipped by sweep: {}",
                        failure.message
                    );
                }
            }
            Err(err) => tracing::error!("rule sweep failed: {err}"),
        }
    }
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

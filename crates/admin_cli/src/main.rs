use std::error::Error;

use clap::{Args, Parser, Subcommand};
use engine::{Engine, RuleRunReport, RunOptions};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "rulebook_admin")]
#[command(about = "Admin utilities for Rulebook (bootstrap families, inspect and run rules)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./rulebook.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Family(Family),
    Rule(Rule),
    /// Run every active rule of every family once.
    Sweep,
}

#[derive(Args, Debug)]
struct Family {
    #[command(subcommand)]
    command: FamilyCommand,
}

#[derive(Subcommand, Debug)]
enum FamilyCommand {
    Create(FamilyCreateArgs),
    List,
    /// Turn AI enrichment on or off for a family.
    Ai(FamilyAiArgs),
}

#[derive(Args, Debug)]
struct FamilyCreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value_t = false)]
    ai: bool,
}

#[derive(Args, Debug)]
struct FamilyAiArgs {
    #[arg(long)]
    family: Uuid,
    #[arg(long, action = clap::ArgAction::Set)]
    enabled: bool,
}

#[derive(Args, Debug)]
struct Rule {
    #[command(subcommand)]
    command: RuleCommand,
}

#[derive(Subcommand, Debug)]
enum RuleCommand {
    List(FamilyArg),
    Preview(RuleArgs),
    Apply(RuleApplyArgs),
    Runs(RuleRunsArgs),
}

#[derive(Args, Debug)]
struct FamilyArg {
    #[arg(long)]
    family: Uuid,
}

#[derive(Args, Debug)]
struct RuleArgs {
    #[arg(long)]
    family: Uuid,
    #[arg(long)]
    rule: Uuid,
}

#[derive(Args, Debug)]
struct RuleApplyArgs {
    #[command(flatten)]
    target: RuleArgs,
    /// Let deterministic actions overwrite user-set values.
    #[arg(long, default_value_t = false)]
    ignore_locks: bool,
}

#[derive(Args, Debug)]
struct RuleRunsArgs {
    #[command(flatten)]
    target: RuleArgs,
    #[arg(long, default_value_t = 10)]
    limit: u64,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn print_run(run: &RuleRunReport) {
    println!(
        "run {} [{}] {}: matched {}, updated {}, skipped {}",
        run.id,
        run.execution_type.as_str(),
        run.status.as_str(),
        run.matched,
        run.updated(),
        run.skipped()
    );
    for action in &run.actions {
        match &action.failure {
            Some(failure) => println!(
                "  {} failed ({}): {}",
                action.action_type,
                failure.kind.as_str(),
                failure.message
            ),
            None => println!(
                "  {}: updated {}, skipped {} ({} ms)",
                action.action_type, action.updated, action.skipped, action.duration_ms
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::Family(Family {
            command: FamilyCommand::Create(args),
        }) => {
            let family = engine.create_family(&args.name, args.ai).await?;
            println!("created family: {} ({})", family.name, family.id);
        }
        Command::Family(Family {
            command: FamilyCommand::List,
        }) => {
            for family in engine.list_families().await? {
                let ai = if family.ai_enabled { "ai on" } else { "ai off" };
                println!("{}  {} [{ai}]", family.id, family.name);
            }
        }
        Command::Family(Family {
            command: FamilyCommand::Ai(args),
        }) => {
            let family = engine.set_family_ai(args.family, args.enabled).await?;
            println!("{}: ai_enabled = {}", family.name, family.ai_enabled);
        }
        Command::Rule(Rule {
            command: RuleCommand::List(args),
        }) => {
            for rule in engine.list_rules(args.family).await? {
                let state = if rule.active { "active" } else { "disabled" };
                println!(
                    "{}  {} [{state}] {} condition(s), {} action(s)",
                    rule.id,
                    rule.title(),
                    rule.conditions.len(),
                    rule.actions.len()
                );
            }
        }
        Command::Rule(Rule {
            command: RuleCommand::Preview(args),
        }) => {
            let preview = engine.preview_rule(args.family, args.rule).await?;
            println!("matches {} transaction(s)", preview.matched);
            for tx in preview.sample {
                println!("  {}  {}  {}", tx.occurred_on, tx.amount, tx.name);
            }
        }
        Command::Rule(Rule {
            command: RuleCommand::Apply(args),
        }) => {
            let options = RunOptions::manual().ignore_locks(args.ignore_locks);
            let run = engine
                .apply_rule(args.target.family, args.target.rule, options)
                .await?;
            print_run(&run);
        }
        Command::Rule(Rule {
            command: RuleCommand::Runs(args),
        }) => {
            let runs = engine
                .list_rule_runs(args.target.family, args.target.rule, args.limit)
                .await?;
            for run in &runs {
                print_run(run);
            }
        }
        Command::Sweep => {
            let report = engine.apply_active_rules().await?;
            for run in &report.runs {
                print_run(run);
            }
            for failure in &report.failures {
                eprintln!(
                    "rule {} of family {} did not run: {}",
                    failure.rule_id, failure.family_id, failure.message
                );
            }
        }
    }

    Ok(())
}

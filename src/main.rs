//! # Wellnudge
//!
//! Turns workplace activity telemetry into rate-limited health reminders.
//!
//! Usage:
//!   wellnudge run                              # Start attendance, status and pipeline timers
//!   wellnudge aggregate --user u1              # Print today's metrics for a user
//!   wellnudge pipeline                         # Run one pipeline pass
//!   wellnudge providers                        # Show LLM provider availability
//!   wellnudge init-db                          # Create the SQLite schema

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wellnudge_core::WellnudgeConfig;
use wellnudge_core::time::{local_date, offset_hours};
use wellnudge_core::traits::{MetricsRepository, ProfileLookup};
use wellnudge_engine::{Aggregator, RecommendationGenerator};
use wellnudge_scheduler::{Collaborators, DingTalkRobot, JobOrchestrator, WellnudgeDb};

#[derive(Parser)]
#[command(
    name = "wellnudge",
    version,
    about = "🩺 Wellnudge: workplace health reminders"
)]
struct Cli {
    /// Config file (default: ~/.wellnudge/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all jobs on their timers until Ctrl-C
    Run,
    /// Aggregate one user-day and print the metrics as JSON
    Aggregate {
        #[arg(long)]
        user: String,
        /// Local date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run one aggregation → rules → delivery pass
    Pipeline,
    /// List LLM providers and whether they are configured
    Providers,
    /// Create the database schema
    InitDb,
}

fn load_config(path: Option<&str>) -> Result<WellnudgeConfig> {
    let config = match path {
        Some(p) => WellnudgeConfig::load_from(Path::new(shellexpand::tilde(p).as_ref()))?,
        None => WellnudgeConfig::load()?,
    };
    Ok(config)
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

/// Database, router, generator and delivery wired into one orchestrator.
fn build_orchestrator(
    config: &WellnudgeConfig,
    db: Arc<WellnudgeDb>,
) -> Result<(Arc<JobOrchestrator>, Arc<RecommendationGenerator>)> {
    let router = Arc::new(wellnudge_providers::build_router(config)?);
    let generator = Arc::new(RecommendationGenerator::new(router, config));
    let robot = DingTalkRobot::from_config(&config.delivery)?;
    if !robot.is_configured() {
        tracing::warn!("⚠️ DingTalk robot token missing; deliveries will be marked failed");
    }
    let collab = Collaborators::from_db(db, Arc::new(robot));
    let orchestrator = Arc::new(JobOrchestrator::new(config, collab, generator.clone()));
    Ok((orchestrator, generator))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, config.logging.json);

    let offset = offset_hours(config.attendance.utc_offset_hours);

    match cli.command {
        Command::Run => {
            let db = Arc::new(WellnudgeDb::open_configured(&config.database, offset)?);
            let (orchestrator, generator) = build_orchestrator(&config, db)?;
            if config.scheduler.user_ids.is_empty() {
                tracing::warn!("⚠️ scheduler.user_ids is empty; attendance and status jobs have no one to track");
            }

            println!("🩺 Wellnudge v{}", env!("CARGO_PKG_VERSION"));
            println!("   👥 Users:     {}", config.scheduler.user_ids.len());
            println!("   🧠 Primary:   {}", config.llm.provider);
            println!("   🗄️  Database:  {}", config.database.path);
            println!();

            let handles = orchestrator.spawn();
            tokio::signal::ctrl_c().await?;
            tracing::info!("🛑 Shutting down");
            for h in handles {
                h.abort();
            }
            tracing::info!(
                "📈 Generation stats: {}",
                serde_json::to_string(&generator.stats().snapshot())?
            );
        }
        Command::Aggregate { user, date } => {
            let db = Arc::new(WellnudgeDb::open_configured(&config.database, offset)?);
            let date = date.unwrap_or_else(|| local_date(Utc::now(), offset));
            let aggregator = Aggregator::new(db.clone(), &config.aggregation);
            let target = db.profile(&user).await?.and_then(|p| p.water_target_ml());
            match aggregator.aggregate_with_target(&user, date, target).await? {
                Some(metrics) => {
                    db.upsert(&metrics).await?;
                    println!("{}", serde_json::to_string_pretty(&metrics)?);
                }
                None => println!("📭 No events for {user} on {date}"),
            }
        }
        Command::Pipeline => {
            let db = Arc::new(WellnudgeDb::open_configured(&config.database, offset)?);
            let (orchestrator, _) = build_orchestrator(&config, db)?;
            let summary = orchestrator.trigger_pipeline().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Providers => {
            let router = wellnudge_providers::build_router(&config)?;
            let status = router.health_status();
            println!("🧠 LLM providers (primary: {})", router.primary());
            for name in wellnudge_providers::available_providers() {
                let configured = status.iter().any(|p| p.name == name && p.configured);
                let mark = if configured { "✅" } else { "❌" };
                println!("   {mark} {name}");
            }
        }
        Command::InitDb => {
            WellnudgeDb::open_configured(&config.database, offset)?;
            println!("✅ Database ready at {}", config.database.path);
        }
    }

    Ok(())
}

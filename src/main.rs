//! # Daybreak
//!
//! Scheduled morning briefing: CAC 40 movers, holdings, weather and a local
//! model's commentary, delivered to a webhook once a day.
//!
//! Usage:
//!   daybreak                          # Start the scheduler (same as `serve`)
//!   daybreak run-now                  # One briefing right away
//!   daybreak schedule 08:15           # Change the daily time
//!   daybreak holdings add MC.PA 701.5 3
//!   daybreak holdings history MC.PA  # Buys and sells of one ticker
//!   daybreak runs --limit 5           # Recent run history

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daybreak_core::config::DaybreakConfig;
use daybreak_core::db::Database;
use daybreak_core::traits::{ConfigStore, InferenceProvider, MarketSource, keys};
use daybreak_scheduler::{
    BriefingJob, Pipeline, PipelineSettings, ScheduleSpec, Scheduler, SchedulerSettings,
    SqliteRunRecorder, SystemClock, TimeOfDay, WebhookDelivery, spawn_executor, watch_store,
};
use daybreak_sources::{
    HISTORY_LIMIT, HoldingsBook, OpenWeather, PricedHoldings, TransactionKind, YahooMarket,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(
    name = "daybreak",
    version,
    about = "☀️ Daybreak: scheduled morning briefing"
)]
struct Cli {
    /// Config file (default: ~/.daybreak/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daily scheduler and wait for Ctrl-C
    Serve,
    /// Generate and deliver one briefing now
    RunNow,
    /// Set the daily briefing time (HH:MM, local to the configured zone)
    Schedule { time: String },
    /// Write a runtime setting (schedule.time_of_day, moto_score.wind_threshold,
    /// moto_score.rain_threshold, weather.location)
    Set { key: String, value: String },
    /// Read a runtime setting (all settings when no key is given)
    Get { key: Option<String> },
    /// Show recent runs
    Runs {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage the holdings book
    Holdings {
        #[command(subcommand)]
        action: HoldingsCommand,
    },
    /// Check the inference service and show the next briefing time
    Check,
}

#[derive(Subcommand)]
enum HoldingsCommand {
    /// Add a position
    Add {
        ticker: String,
        buy_price: f64,
        quantity: u32,
        /// Display name (defaults to the CAC 40 name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a position
    Remove { ticker: String },
    /// List active positions
    List,
    /// Show the buy/sell ledger of one ticker, newest first
    History {
        ticker: String,
        #[arg(short, long, default_value_t = HISTORY_LIMIT)]
        limit: usize,
    },
}

/// Settings `daybreak set` accepts.
const SETTINGS: [&str; 4] = [
    keys::SCHEDULE_TIME_OF_DAY,
    keys::WIND_THRESHOLD,
    keys::RAIN_THRESHOLD,
    keys::WEATHER_LOCATION,
];

fn load_config(path: Option<&str>) -> Result<DaybreakConfig> {
    let config = match path {
        Some(p) => {
            let path = PathBuf::from(shellexpand::tilde(p).to_string());
            DaybreakConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => DaybreakConfig::load()?,
    };
    Ok(config)
}

/// Console plus a daily rolling file. The guard flushes the file on drop.
fn init_logging(config: &DaybreakConfig, verbose: bool) -> Option<WorkerGuard> {
    let filter = if verbose {
        "daybreak=debug,daybreak_core=debug,daybreak_providers=debug,daybreak_sources=debug,daybreak_scheduler=debug"
    } else {
        "daybreak=info,daybreak_core=info,daybreak_providers=info,daybreak_sources=info,daybreak_scheduler=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    let log_dir = config.log_dir();
    match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "daybreak.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .init();
            tracing::warn!("⚠️ File logging disabled, {}: {e}", log_dir.display());
            None
        }
    }
}

/// Wire the adapters into one briefing job.
fn build_job(config: &DaybreakConfig, db: &Database) -> Result<BriefingJob> {
    let market: Arc<dyn MarketSource> = Arc::new(YahooMarket::new(&config.market)?);
    let inference: Arc<dyn InferenceProvider> =
        Arc::from(daybreak_providers::create_provider(config)?);
    let holdings = Arc::new(PricedHoldings::new(
        HoldingsBook::new(db.clone()),
        market.clone(),
    ));
    let weather = Arc::new(OpenWeather::new(&config.weather)?);
    let pipeline = Pipeline::new(
        market,
        inference,
        holdings,
        weather,
        Arc::new(db.clone()),
        PipelineSettings::from_config(config)?,
    );
    Ok(BriefingJob::new(
        pipeline,
        Arc::new(WebhookDelivery::from_config(&config.delivery)),
        Arc::new(SqliteRunRecorder::new(db.clone())),
    ))
}

async fn serve(config: &DaybreakConfig, db: Database) -> Result<()> {
    let job = Arc::new(build_job(config, &db)?);
    let (handoff, executor) = spawn_executor(job);
    let draining = handoff.clone();

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(db),
        handoff,
        Arc::new(SystemClock),
        SchedulerSettings::from_config(config)?,
    ));
    scheduler.start()?;

    let watcher = tokio::spawn(watch_store(
        scheduler.clone(),
        Duration::from_secs(config.scheduler.config_watch_secs.max(1)),
    ));

    println!("☀️ Daybreak v{}", env!("CARGO_PKG_VERSION"));
    if let Some(next) = scheduler.next_fire() {
        println!(
            "   Next briefing: {}",
            next.with_timezone(&config.tz()?).format("%Y-%m-%d %H:%M %Z")
        );
    }
    println!("   Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown requested");

    watcher.abort();
    let stopping = scheduler.clone();
    tokio::task::spawn_blocking(move || stopping.stop()).await?;
    let ceiling = Duration::from_secs(config.scheduler.run_ceiling_secs);
    if !draining.drain(ceiling).await {
        tracing::warn!("⏱️ Briefing still running after {}s, abandoning it", ceiling.as_secs());
    }
    executor.abort();

    let stats = scheduler.stats();
    tracing::info!(
        "📊 Runs: {} triggered, {} completed, {} failed, {} timed out, {} skipped",
        stats.triggered,
        stats.completed,
        stats.failed,
        stats.timed_out,
        stats.skipped
    );
    Ok(())
}

fn set_schedule(db: &Database, raw: &str) -> Result<TimeOfDay> {
    let time: TimeOfDay = raw.parse()?;
    db.set(keys::SCHEDULE_TIME_OF_DAY, &time.to_string())?;
    Ok(time)
}

/// Check one setting and return the value to store.
fn validate_setting(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    match key {
        keys::SCHEDULE_TIME_OF_DAY => Ok(value.parse::<TimeOfDay>()?.to_string()),
        keys::WIND_THRESHOLD | keys::RAIN_THRESHOLD => {
            let n: f64 = value
                .parse()
                .with_context(|| format!("{key} must be a number, got '{value}'"))?;
            if !n.is_finite() || n < 0.0 {
                anyhow::bail!("{key} must be a non-negative number, got '{value}'");
            }
            Ok(value.to_string())
        }
        keys::WEATHER_LOCATION if value.is_empty() => {
            anyhow::bail!("{key} must not be empty")
        }
        keys::WEATHER_LOCATION => Ok(value.to_string()),
        _ => anyhow::bail!("unknown setting '{key}' (expected one of: {})", SETTINGS.join(", ")),
    }
}

fn apply_setting(db: &Database, key: &str, value: &str) -> Result<String> {
    let value = validate_setting(key, value)?;
    db.set(key, &value)?;
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config, cli.verbose);

    let db = Database::open(&config.database_path())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, db).await?,

        Command::RunNow => {
            let job = build_job(&config, &db)?;
            let status = job.run_once().await;
            println!("Briefing run: {status}");
        }

        Command::Schedule { time } => {
            let time = set_schedule(&db, &time)?;
            let next = ScheduleSpec::new(time, config.tz()?).next_after(chrono::Utc::now());
            println!(
                "✅ Daily briefing at {time} (next {})",
                next.with_timezone(&config.tz()?).format("%Y-%m-%d %H:%M %Z")
            );
        }

        Command::Set { key, value } => {
            let stored = apply_setting(&db, &key, &value)?;
            println!("✅ {key} = {stored}");
        }

        Command::Get { key: Some(key) } => match db.get(&key) {
            Some(value) => println!("{value}"),
            None => println!("({key} is not set)"),
        },

        Command::Get { key: None } => {
            for (key, value) in db.config_entries()? {
                println!("{key} = {value}");
            }
        }

        Command::Runs { limit } => {
            let tz = config.tz()?;
            let runs = SqliteRunRecorder::new(db).recent_runs(limit)?;
            if runs.is_empty() {
                println!("No runs recorded yet.");
            }
            for run in runs {
                let at = run.timestamp.with_timezone(&tz).format("%Y-%m-%d %H:%M");
                match run.error_message {
                    Some(err) => println!("{at}  {}  {}  ({err})", run.status, run.content_summary),
                    None => println!("{at}  {}  {}", run.status, run.content_summary),
                }
            }
        }

        Command::Holdings { action } => {
            let book = HoldingsBook::new(db);
            match action {
                HoldingsCommand::Add {
                    ticker,
                    buy_price,
                    quantity,
                    name,
                } => {
                    let h = book.add(&ticker, name.as_deref(), buy_price, quantity)?;
                    println!("✅ Added {} ({}): {} @ {:.2}€", h.ticker, h.name, h.quantity, h.buy_price);
                }
                HoldingsCommand::Remove { ticker } => {
                    let h = book.remove(&ticker)?;
                    println!("🗑️ Removed {} ({})", h.ticker, h.name);
                }
                HoldingsCommand::History { ticker, limit } => {
                    let entries = book.history(&ticker, limit)?;
                    if entries.is_empty() {
                        println!("No transactions for {}.", ticker.trim().to_uppercase());
                    }
                    for t in entries {
                        let marker = match t.kind {
                            TransactionKind::Buy => "🟢",
                            TransactionKind::Sell => "🔴",
                        };
                        let price = t.price.map(|p| format!("{p:.2}€")).unwrap_or_else(|| "-".into());
                        let quantity = t.quantity.map(|q| q.to_string()).unwrap_or_else(|| "-".into());
                        println!(
                            "{} {marker} {:<4} {:<8} {:>5} @ {:>9}  {}",
                            t.at,
                            t.kind,
                            t.ticker,
                            quantity,
                            price,
                            t.note.unwrap_or_default()
                        );
                    }
                }
                HoldingsCommand::List => {
                    let holdings = book.list()?;
                    if holdings.is_empty() {
                        println!("No holdings yet.");
                    }
                    for h in holdings {
                        println!(
                            "{:<8} {:<24} {:>5} @ {:>9.2}€  since {}",
                            h.ticker, h.name, h.quantity, h.buy_price, h.bought_at
                        );
                    }
                }
            }
        }

        Command::Check => {
            let provider = daybreak_providers::create_provider(&config)?;
            match provider.health_check().await {
                Ok(true) => println!("✅ {} is up with model {}", provider.name(), config.inference.model),
                Ok(false) => println!(
                    "⚠️ {} answers but model {} is not installed",
                    provider.name(),
                    config.inference.model
                ),
                Err(e) => println!("❌ {} unreachable: {e}", provider.name()),
            }
            let time = db
                .get(keys::SCHEDULE_TIME_OF_DAY)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(config.scheduler.default_time.parse::<TimeOfDay>()?);
            let next = ScheduleSpec::new(time, config.tz()?).next_after(chrono::Utc::now());
            println!(
                "⏰ Next briefing at {}",
                next.with_timezone(&config.tz()?).format("%Y-%m-%d %H:%M %Z")
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_serves() {
        let cli = Cli::try_parse_from(["daybreak"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["daybreak", "-v", "runs", "--limit", "3"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Command::Runs { limit: 3 })));
    }

    #[test]
    fn test_holdings_history_parses() {
        let cli = Cli::try_parse_from(["daybreak", "holdings", "history", "mc.pa"]).unwrap();
        match cli.command {
            Some(Command::Holdings {
                action: HoldingsCommand::History { ticker, limit },
            }) => {
                assert_eq!(ticker, "mc.pa");
                assert_eq!(limit, HISTORY_LIMIT);
            }
            _ => panic!("expected holdings history"),
        }
    }

    #[test]
    fn test_unknown_setting_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = apply_setting(&db, "moto_score.wind_treshold", "30").unwrap_err();
        assert!(err.to_string().contains("unknown setting"));
        assert!(db.config_entries().unwrap().is_empty());
    }

    #[test]
    fn test_thresholds_must_be_numbers() {
        let db = Database::open_in_memory().unwrap();
        assert!(apply_setting(&db, keys::WIND_THRESHOLD, "windy").is_err());
        assert!(apply_setting(&db, keys::RAIN_THRESHOLD, "-5").is_err());
        assert!(apply_setting(&db, keys::RAIN_THRESHOLD, "NaN").is_err());
        assert_eq!(db.get(keys::WIND_THRESHOLD), None);
        assert_eq!(db.get(keys::RAIN_THRESHOLD), None);

        assert_eq!(apply_setting(&db, keys::WIND_THRESHOLD, " 32.5 ").unwrap(), "32.5");
        assert_eq!(db.get_f64(keys::WIND_THRESHOLD, 25.0), 32.5);
    }

    #[test]
    fn test_settings_are_normalized() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(apply_setting(&db, keys::SCHEDULE_TIME_OF_DAY, "6:30").unwrap(), "06:30");
        assert!(apply_setting(&db, keys::WEATHER_LOCATION, "   ").is_err());
        apply_setting(&db, keys::WEATHER_LOCATION, "Lyon").unwrap();
        assert_eq!(db.get(keys::WEATHER_LOCATION).as_deref(), Some("Lyon"));
    }

    #[test]
    fn test_schedule_is_validated_and_normalized() {
        let db = Database::open_in_memory().unwrap();
        assert!(set_schedule(&db, "25:00").is_err());
        assert_eq!(db.get(keys::SCHEDULE_TIME_OF_DAY), None);

        set_schedule(&db, "7:05").unwrap();
        assert_eq!(db.get(keys::SCHEDULE_TIME_OF_DAY).as_deref(), Some("07:05"));
    }
}

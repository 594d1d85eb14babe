use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use slotcatcher::config::AppConfig;
use slotcatcher::workflow::DateChoice;

#[derive(Parser)]
#[command(
    name = "slotcatcher",
    about = "Unattended booking of a scarce slot on a web form",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $SLOTCATCHER_CONFIG, then ./slotcatcher.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the booking once
    Once {
        /// Book this day (YYYY-MM-DD) if selectable, else the earliest
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retry the booking until confirmed or attempts run out
    Retry {
        /// Maximum attempts
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Seconds between attempts
        #[arg(long)]
        delay: Option<u64>,

        /// Book this day (YYYY-MM-DD) if selectable, else the earliest
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        headless: bool,
    },

    /// Book at fixed times every day until interrupted
    Schedule {
        /// Daily time, repeatable (replaces the configured times)
        #[arg(long = "at", value_name = "HH:MM")]
        at: Vec<String>,

        /// IANA timezone the times are in
        #[arg(long)]
        timezone: Option<String>,

        /// Attempts at each scheduled time
        #[arg(long)]
        max_attempts: Option<u32>,

        #[arg(long)]
        headless: bool,
    },

    /// Preview the next scheduled fire times
    Preview {
        /// Hours to preview
        #[arg(long, default_value = "24")]
        hours: u64,
    },

    /// Print the effective configuration, identity redacted
    ShowConfig,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Exit status for a forced stop, as a shell reports SIGINT.
const FORCED_EXIT: i32 = 130;

/// Cancelled on the first Ctrl-C; a second one exits immediately.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn(watch_interrupts(
        tokio::signal::ctrl_c,
        cancel.clone(),
        || {
            std::process::exit(FORCED_EXIT);
        },
    ));
    cancel
}

/// First interrupt cancels `cancel`, the second calls `abort`.
async fn watch_interrupts<F, Fut>(mut interrupt: F, cancel: CancellationToken, abort: impl FnOnce())
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return;
    }
    tracing::warn!("Interrupt received, stopping after the current run (Ctrl-C again to abort)");
    cancel.cancel();

    if interrupt().await.is_ok() {
        tracing::error!("Second interrupt, aborting");
        abort();
    }
}

fn date_choice(date: Option<NaiveDate>) -> DateChoice {
    date.map_or(DateChoice::Earliest, DateChoice::Specific)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Once {
            date,
            headless,
            json,
        } => {
            config.browser.headless |= headless;
            tracing::info!(?date, headless = config.browser.headless, "Running booking once");
            let report = slotcatcher::run_once(&config, date_choice(date)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Run {}: {}", report.run_id, report.outcome);
                for record in &report.steps {
                    println!("  {:<12} {:?}", record.step.to_string(), record.result);
                }
            }
            return Ok(exit_for(report.outcome.is_confirmed()));
        }
        Commands::Retry {
            max_attempts,
            delay,
            date,
            headless,
        } => {
            config.browser.headless |= headless;
            if let Some(n) = max_attempts {
                config.retry.max_attempts = n;
            }
            if let Some(secs) = delay {
                config.retry.delay_secs = secs;
            }
            let policy = config.retry.policy();
            tracing::info!(max_attempts = policy.max_attempts, delay = ?policy.delay, "Running booking with retries");

            let cancel = interrupt_token();
            let report =
                slotcatcher::run_with_bounded_retries(&config, date_choice(date), &policy, &cancel)
                    .await?;
            println!(
                "{} after {} attempt(s){}",
                report.outcome,
                report.attempts,
                if report.cancelled { " (interrupted)" } else { "" }
            );
            return Ok(exit_for(report.outcome.is_confirmed()));
        }
        Commands::Schedule {
            at,
            timezone,
            max_attempts,
            headless,
        } => {
            config.browser.headless |= headless;
            if !at.is_empty() {
                config.schedule.times = at;
            }
            if let Some(tz) = timezone {
                config.schedule.timezone = tz;
            }
            if let Some(n) = max_attempts {
                config.schedule.max_attempts = n;
            }

            let cancel = interrupt_token();
            slotcatcher::run_on_schedule(&config, &cancel).await?;
        }
        Commands::Preview { hours } => {
            let upcoming = slotcatcher::preview(&config, hours)?;
            if upcoming.is_empty() {
                println!("No runs scheduled in next {} hours.", hours);
            } else {
                println!("Upcoming runs (next {} hours, {}):", hours, config.schedule.timezone);
                for (at, entry) in upcoming {
                    println!("{} : {}", at.format("%Y-%m-%d %H:%M %Z"), entry);
                }
            }
        }
        Commands::ShowConfig => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("failed to render configuration")?;
            print!("{rendered}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn exit_for(confirmed: bool) -> ExitCode {
    if confirmed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

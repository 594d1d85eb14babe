//! slotcatcher -- unattended booking of a scarce slot on a remote web form.
//!
//! The core drives a browser through the booking form with fallback locators
//! and defensive interactions, classifies the result, retries a bounded number
//! of times, and can fire all of that at fixed civil times every day.

pub mod config;
pub mod driver;
pub mod error;
pub mod evidence;
pub mod interact;
pub mod locator;
pub mod notify;
pub mod outcome;
pub mod retry;
pub mod scheduler;
pub mod workflow;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::driver::webdriver::WebDriverLauncher;
use crate::error::PipelineError;
use crate::evidence::FsEvidenceStore;
use crate::notify::{DesktopNotifier, LogNotifier, NotificationSink};
use crate::retry::{RetryPolicy, RetryReport};
use crate::scheduler::{ScheduleEntry, SystemClock, TriggerScheduler};
use crate::workflow::{DateChoice, Pipeline, RunReport};

/// Wire the pipeline to chromedriver, the snapshot directory and the
/// configured notification sink.
pub fn build_pipeline(config: &AppConfig, date: DateChoice) -> Result<Pipeline> {
    let launcher = Arc::new(WebDriverLauncher::new(&config.browser)?);
    let evidence = Arc::new(FsEvidenceStore::new(&config.diagnostics.dir));
    let notifier: Arc<dyn NotificationSink> = if config.notify.desktop {
        Arc::new(DesktopNotifier::default())
    } else {
        Arc::new(LogNotifier)
    };

    Ok(Pipeline::new(config.run_config(), &config.target, launcher, evidence, notifier)
        .with_timing(config.timing.clone())
        .with_date(date))
}

/// A single pipeline execution.
pub async fn run_once(config: &AppConfig, date: DateChoice) -> Result<RunReport> {
    config.validate()?;
    let pipeline = build_pipeline(config, date)?;
    let report = match AssertUnwindSafe(pipeline.run()).catch_unwind().await {
        Ok(result) => result?,
        Err(panic) => {
            return Err(PipelineError::Panicked(retry::panic_message(&*panic)).into());
        }
    };
    Ok(report)
}

/// Up to `policy.max_attempts` executions, stopping at the first confirmation.
pub async fn run_with_bounded_retries(
    config: &AppConfig,
    date: DateChoice,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RetryReport> {
    config.validate()?;
    let pipeline = build_pipeline(config, date)?;
    Ok(retry::attempt(&pipeline, policy, cancel).await)
}

/// Fire the retry controller at every configured time until cancelled.
pub async fn run_on_schedule(config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    config.validate()?;
    let pipeline = build_pipeline(config, DateChoice::Earliest)?;
    let clock = SystemClock::new(config.schedule.timezone()?);
    let mut scheduler = TriggerScheduler::new(config.schedule.entries()?, clock)
        .with_poll_interval(config.schedule.poll_interval());

    let policy = RetryPolicy {
        max_attempts: config.schedule.max_attempts,
        delay: config.retry.policy().delay,
    };
    let pipeline = &pipeline;
    let policy = &policy;
    scheduler
        .run(
            move |entry| async move {
                info!(entry = %entry, max_attempts = policy.max_attempts, "Scheduled booking");
                Ok(retry::attempt(pipeline, policy, cancel).await.outcome)
            },
            cancel,
        )
        .await;
    Ok(())
}

/// Next fire times within `hours`, in the configured timezone.
pub fn preview(config: &AppConfig, hours: u64) -> Result<Vec<(DateTime<Tz>, ScheduleEntry)>> {
    let now = chrono::Utc::now().with_timezone(&config.schedule.timezone()?);
    Ok(scheduler::upcoming(&config.schedule.entries()?, &now, hours))
}

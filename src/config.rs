//! TOML configuration.
//!
//! A layered model: every section has compiled-in defaults, the file only
//! needs to override what differs. The file path comes from `--config`, then
//! the `SLOTCATCHER_CONFIG` environment variable, then `./slotcatcher.toml`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::scheduler::ScheduleEntry;

pub const CONFIG_ENV: &str = "SLOTCATCHER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "slotcatcher.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the config file: an explicit path must load, the environment
    /// variable and the working-directory file are tried in turn, and
    /// compiled-in defaults are the last resort.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            match Self::load(&path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "{CONFIG_ENV} set but file could not be loaded, trying fallback"
                ),
            }
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Reject configurations that cannot produce a valid submission.
    pub fn validate(&self) -> Result<()> {
        let id = &self.identity;
        if id.full_name.trim().is_empty() {
            bail!("identity.full_name must be set");
        }
        if !id.email.contains('@') {
            bail!("identity.email must be an email address, got '{}'", id.email);
        }
        if id.member_id.is_empty() || !id.member_id.chars().all(|c| c.is_ascii_digit()) {
            bail!("identity.member_id must be numeric, got '{}'", id.member_id);
        }
        if self.target.category.trim().is_empty() {
            bail!("target.category must be set");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.schedule.max_attempts == 0 {
            bail!("schedule.max_attempts must be at least 1");
        }
        self.schedule.timezone()?;
        self.schedule.entries()?;
        Ok(())
    }

    /// Immutable per-process view used by the pipeline.
    pub fn run_config(&self) -> Arc<RunConfig> {
        Arc::new(RunConfig {
            full_name: self.identity.full_name.clone(),
            email: self.identity.email.clone(),
            member_id: self.identity.member_id.clone(),
            category: self.target.category.clone(),
            headless: self.browser.headless,
        })
    }

    /// Copy with identity values masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.identity.email = mask(&copy.identity.email);
        copy.identity.member_id = mask(&copy.identity.member_id);
        copy
    }
}

fn mask(value: &str) -> String {
    match value.chars().next() {
        Some(first) => format!("{first}***"),
        None => String::new(),
    }
}

/// What gets submitted, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub full_name: String,
    pub email: String,
    /// Numeric identifier (student / member number).
    pub member_id: String,
    /// Label fuzzily matched against the category drop-down.
    pub category: String,
    /// Unattended (no visible browser window).
    pub headless: bool,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub full_name: String,
    pub email: String,
    pub member_id: String,
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// The remote form and the category to book.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Entry point of the booking form.
    pub entry_url: String,
    /// Drop-down label to book, matched exactly, then by substring.
    pub category: String,
    /// Last-resort option values keyed by a token found in `category`.
    pub category_fallbacks: Vec<CategoryFallback>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            entry_url: "https://antonello.unime.it/prenotazione-postazione-biblioteca/?formid=28"
                .to_string(),
            category: String::new(),
            category_fallbacks: vec![CategoryFallback {
                token: "rettorato".to_string(),
                value: "330".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFallback {
    /// Case-insensitive token looked for in the configured category.
    pub token: String,
    /// Option value selected when the token is present.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// chromedriver endpoint.
    pub webdriver_url: String,
    /// Run without a visible window.
    pub headless: bool,
    pub user_agent: Option<String>,
    /// `WIDTH,HEIGHT` passed to Chrome.
    pub window_size: String,
    pub page_load_timeout_secs: u64,
    /// Ceiling for a single WebDriver HTTP command.
    pub command_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            window_size: "1920,1080".to_string(),
            page_load_timeout_secs: 30,
            command_timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Wait budgets and settle pauses used by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Total budget for resolving a required element across all strategies.
    pub locator_timeout_secs: u64,
    /// Budget for elements that may legitimately be absent.
    pub optional_timeout_secs: u64,
    /// How long to wait for an element to become clickable.
    pub actionable_timeout_secs: u64,
    pub page_ready_timeout_secs: u64,
    /// Pause after typing or clicking.
    pub settle_ms: u64,
    /// Pause between pipeline steps.
    pub step_pause_ms: u64,
    /// Extra wait after submitting, before reading the result.
    pub after_submit_ms: u64,
    /// How many times the calendar may be advanced looking for a free day.
    pub max_period_advances: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            locator_timeout_secs: 15,
            optional_timeout_secs: 5,
            actionable_timeout_secs: 5,
            page_ready_timeout_secs: 10,
            settle_ms: 300,
            step_pause_ms: 500,
            after_submit_ms: 2000,
            max_period_advances: 3,
        }
    }
}

impl TimingConfig {
    /// All waits collapsed to zero, for tests.
    pub fn instant() -> Self {
        Self {
            settle_ms: 0,
            step_pause_ms: 0,
            after_submit_ms: 0,
            ..Self::default()
        }
    }

    pub fn locator_budget(&self) -> Duration {
        Duration::from_secs(self.locator_timeout_secs)
    }

    pub fn optional_budget(&self) -> Duration {
        Duration::from_secs(self.optional_timeout_secs)
    }

    pub fn actionable_timeout(&self) -> Duration {
        Duration::from_secs(self.actionable_timeout_secs)
    }

    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.page_ready_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.step_pause_ms)
    }

    pub fn after_submit(&self) -> Duration {
        Duration::from_millis(self.after_submit_ms)
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            delay_secs: 2,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_secs(self.delay_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA name of the civil timezone the times are expressed in.
    pub timezone: String,
    /// `HH:MM` wall-clock times, fired every day.
    pub times: Vec<String>,
    /// Upper bound between polls; polls also align to minute boundaries.
    pub poll_interval_secs: u64,
    /// Retry budget spent at each scheduled time.
    pub max_attempts: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Rome".to_string(),
            times: vec!["00:00".to_string(), "08:00".to_string()],
            poll_interval_secs: 60,
            max_attempts: 3,
        }
    }
}

impl ScheduleConfig {
    pub fn timezone(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|e| anyhow::anyhow!("invalid timezone '{}': {}", self.timezone, e))
    }

    pub fn entries(&self) -> Result<Vec<ScheduleEntry>> {
        self.times
            .iter()
            .map(|t| t.parse::<ScheduleEntry>().map_err(anyhow::Error::from))
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Diagnostics / notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Directory screenshots are written to on step failure.
    pub dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("diagnostics"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Deliver desktop notifications through `notify-send`.
    pub desktop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.identity = IdentityConfig {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.org".into(),
            member_id: "555012".into(),
        };
        cfg.target.category = "Sala Lettura - Rettorato".into();
        cfg
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [identity]
            full_name = "Ada Lovelace"

            [retry]
            max_attempts = 7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.identity.full_name, "Ada Lovelace");
        assert_eq!(cfg.retry.max_attempts, 7);
        assert_eq!(cfg.retry.delay_secs, 2);
        assert_eq!(cfg.schedule.timezone, "Europe/Rome");
        assert_eq!(cfg.timing.max_period_advances, 3);
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_numeric_member_id() {
        let mut cfg = valid();
        cfg.identity.member_id = "55A012".into();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("member_id"), "{err}");
    }

    #[test]
    fn test_validate_rejects_unknown_timezone() {
        let mut cfg = valid();
        cfg.schedule.timezone = "Mars/Olympus".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_time() {
        let mut cfg = valid();
        cfg.schedule.times = vec!["25:00".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_schedule_budget() {
        let mut cfg = valid();
        cfg.schedule.max_attempts = 0;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("schedule.max_attempts"), "{err}");
    }

    #[test]
    fn test_run_config_carries_identity_and_mode() {
        let mut cfg = valid();
        cfg.browser.headless = true;
        let run = cfg.run_config();
        assert_eq!(run.member_id, "555012");
        assert_eq!(run.category, "Sala Lettura - Rettorato");
        assert!(run.headless);
    }

    #[test]
    fn test_redacted_masks_identity() {
        let red = valid().redacted();
        assert_eq!(red.identity.email, "a***");
        assert_eq!(red.identity.member_id, "5***");
        assert_eq!(red.identity.full_name, "Ada Lovelace");
    }
}

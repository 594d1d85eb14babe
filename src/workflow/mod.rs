//! The booking pipeline: open the form, fill it, pick a date and slot,
//! tick the acknowledgements, submit and classify the result.
//!
//! Steps run strictly in order. The first failing step captures a
//! diagnostic snapshot and aborts the run; later steps are not attempted.

pub mod category;
pub mod locators;
mod steps;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::{CategoryFallback, RunConfig, TargetConfig, TimingConfig};
use crate::driver::Launcher;
use crate::error::PipelineError;
use crate::evidence::EvidenceStore;
use crate::notify::{notify, NotificationSink};
use crate::outcome::{Classifier, RunOutcome};

pub use locators::FormLocators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    OpenTarget,
    FillForm,
    SelectDate,
    SelectSlot,
    Acknowledge,
    Submit,
    Classify,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::OpenTarget => "open-target",
            Step::FillForm => "fill-form",
            Step::SelectDate => "select-date",
            Step::SelectSlot => "select-slot",
            Step::Acknowledge => "acknowledge",
            Step::Submit => "submit",
            Step::Classify => "classify",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepResult {
    Succeeded,
    Failed(String),
    /// Only for optional steps.
    Skipped,
}

/// Forward-only progress of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    NotStarted,
    FormFilled,
    DateSelected,
    SlotSelected,
    Acknowledged,
    Submitted,
    Classified,
}

/// Which day to book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateChoice {
    /// First selectable day in document order.
    #[default]
    Earliest,
    /// This day if selectable, otherwise the earliest.
    Specific(NaiveDate),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub result: StepResult,
}

/// Everything that happened in one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub steps: Vec<StepRecord>,
    pub outcome: RunOutcome,
}

/// One pipeline execution as seen by the retry controller.
#[async_trait::async_trait]
pub trait Workflow: Send + Sync {
    async fn execute(&self) -> Result<RunOutcome, PipelineError>;
}

/// Drives the booking form. Cheap to share; each run opens its own session.
pub struct Pipeline {
    run: Arc<RunConfig>,
    entry_url: String,
    fallbacks: Vec<CategoryFallback>,
    locators: FormLocators,
    timing: TimingConfig,
    date: DateChoice,
    classifier: Classifier,
    launcher: Arc<dyn Launcher>,
    evidence: Arc<dyn EvidenceStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl Pipeline {
    pub fn new(
        run: Arc<RunConfig>,
        target: &TargetConfig,
        launcher: Arc<dyn Launcher>,
        evidence: Arc<dyn EvidenceStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            run,
            entry_url: target.entry_url.clone(),
            fallbacks: target.category_fallbacks.clone(),
            locators: FormLocators::default(),
            timing: TimingConfig::default(),
            date: DateChoice::default(),
            classifier: Classifier::default(),
            launcher,
            evidence,
            notifier,
        }
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_locators(mut self, locators: FormLocators) -> Self {
        self.locators = locators;
        self
    }

    pub fn with_date(mut self, date: DateChoice) -> Self {
        self.date = date;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Execute every step once in a fresh browser session.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_in_session(run_id).instrument(span).await
    }

    async fn run_in_session(&self, run_id: Uuid) -> Result<RunReport, PipelineError> {
        info!(url = %self.entry_url, category = %self.run.category, "Starting booking run");
        let driver = self
            .launcher
            .launch()
            .await
            .map_err(PipelineError::Launch)?;

        let result = steps::Session::new(self, driver.as_ref(), run_id).drive().await;

        if let Err(e) = driver.quit().await {
            warn!(error = %e, "Browser session did not close cleanly");
        }

        match &result {
            Ok(report) if report.outcome.is_confirmed() => {
                info!("Booking confirmed");
                notify(
                    self.notifier.as_ref(),
                    "Booking confirmed",
                    &format!("{} booked for {}", self.run.category, self.run.full_name),
                )
                .await;
            }
            Ok(report) => {
                warn!(outcome = %report.outcome, "Booking not confirmed");
            }
            Err(e) => {
                warn!(error = %e, snapshot = ?e.snapshot(), "Booking run failed");
                notify(
                    self.notifier.as_ref(),
                    "Booking failed",
                    &e.to_string(),
                )
                .await;
            }
        }
        result
    }
}

#[async_trait::async_trait]
impl Workflow for Pipeline {
    async fn execute(&self) -> Result<RunOutcome, PipelineError> {
        self.run().await.map(|report| report.outcome)
    }
}

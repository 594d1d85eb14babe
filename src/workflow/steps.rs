use chrono::Datelike;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::category::match_category;
use super::{DateChoice, Pipeline, PipelineState, RunReport, Step, StepRecord, StepResult};
use crate::driver::{Driver, Target};
use crate::error::{PipelineError, StepError};
use crate::interact::Interactor;
use crate::locator::{resolve, resolve_all, LocatorSet};
use crate::outcome::{RunOutcome, Surface};

/// Class fragments marking a calendar cell as not bookable.
const UNAVAILABLE_MARKERS: &[&str] = &["disabled", "past", "unavailable"];

/// State of one run against one browser session.
pub(super) struct Session<'a> {
    pipeline: &'a Pipeline,
    driver: &'a dyn Driver,
    run_id: Uuid,
    state: PipelineState,
    steps: Vec<StepRecord>,
}

impl<'a> Session<'a> {
    pub(super) fn new(pipeline: &'a Pipeline, driver: &'a dyn Driver, run_id: Uuid) -> Self {
        Self {
            pipeline,
            driver,
            run_id,
            state: PipelineState::NotStarted,
            steps: Vec::new(),
        }
    }

    pub(super) async fn drive(mut self) -> Result<RunReport, PipelineError> {
        let r = self.open_target().await;
        self.conclude(Step::OpenTarget, r).await?;

        let r = self.fill_form().await;
        self.conclude(Step::FillForm, r).await?;
        self.advance(PipelineState::FormFilled);

        let r = self.select_date().await;
        self.conclude(Step::SelectDate, r).await?;
        self.advance(PipelineState::DateSelected);

        let r = self.select_slot().await;
        if self.conclude(Step::SelectSlot, r).await? == StepResult::Succeeded {
            self.advance(PipelineState::SlotSelected);
        }

        let r = self.acknowledge().await;
        self.conclude(Step::Acknowledge, r).await?;
        self.advance(PipelineState::Acknowledged);

        let r = self.submit().await;
        self.conclude(Step::Submit, r).await?;
        self.advance(PipelineState::Submitted);

        let outcome = match self.classify().await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(Step::Classify, e).await),
        };
        self.record(Step::Classify, StepResult::Succeeded);
        self.advance(PipelineState::Classified);

        Ok(RunReport {
            run_id: self.run_id,
            steps: self.steps,
            outcome,
        })
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.state, "pipeline moved backwards: {:?} -> {next:?}", self.state);
        debug!(from = ?self.state, to = ?next, "State advanced");
        self.state = next;
    }

    /// Record the step's result. A failure snapshots the page and becomes the
    /// run's error.
    async fn conclude(
        &mut self,
        step: Step,
        result: Result<StepResult, StepError>,
    ) -> Result<StepResult, PipelineError> {
        match result {
            Ok(r) => {
                self.record(step, r.clone());
                Ok(r)
            }
            Err(source) => Err(self.fail(step, source).await),
        }
    }

    fn record(&mut self, step: Step, result: StepResult) {
        match &result {
            StepResult::Skipped => info!(%step, "Step skipped"),
            _ => info!(%step, "Step succeeded"),
        }
        self.steps.push(StepRecord { step, result });
    }

    async fn fail(&mut self, step: Step, source: StepError) -> PipelineError {
        let snapshot = self.capture(step).await;
        error!(
            %step,
            error = %source,
            snapshot = snapshot.as_deref().unwrap_or("none"),
            "Step failed"
        );
        self.steps.push(StepRecord {
            step,
            result: StepResult::Failed(source.to_string()),
        });
        PipelineError::Step {
            step,
            source,
            snapshot,
        }
    }

    async fn capture(&self, step: Step) -> Option<String> {
        let blob = match self.driver.snapshot().await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(%step, error = %e, "Could not capture diagnostic snapshot");
                return None;
            }
        };
        let hint = format!("{}_{}", self.run_id, step);
        match self.pipeline.evidence.persist(&blob, &hint).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(%step, error = %e, "Could not store diagnostic snapshot");
                None
            }
        }
    }

    fn interactor(&self) -> Interactor<'a> {
        let timing = &self.pipeline.timing;
        Interactor::new(self.driver, timing.settle(), timing.actionable_timeout())
    }

    async fn pause(&self) {
        let pause = self.pipeline.timing.step_pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    // -----------------------------------------------------------------------
    // Open target
    // -----------------------------------------------------------------------

    async fn open_target(&self) -> Result<StepResult, StepError> {
        info!(url = %self.pipeline.entry_url, "Opening booking form");
        self.driver.navigate(&self.pipeline.entry_url).await?;
        if !self
            .driver
            .wait_until_ready(self.pipeline.timing.page_ready_timeout())
            .await?
        {
            warn!("Page did not report ready in time, continuing");
        }
        self.pause().await;
        Ok(StepResult::Succeeded)
    }

    // -----------------------------------------------------------------------
    // Fill form
    // -----------------------------------------------------------------------

    async fn fill_form(&self) -> Result<StepResult, StepError> {
        let run = &self.pipeline.run;
        let locators = &self.pipeline.locators;

        self.fill_text(&locators.full_name, &run.full_name).await?;
        self.choose_category().await?;
        self.fill_text(&locators.email, &run.email).await?;
        self.fill_text(&locators.member_id, &run.member_id).await?;
        Ok(StepResult::Succeeded)
    }

    async fn fill_text(&self, set: &LocatorSet, value: &str) -> Result<(), StepError> {
        let target = resolve(self.driver, set, self.pipeline.timing.locator_budget()).await?;
        if !self.interactor().set_text(&target, value).await? {
            return Err(StepError::InteractionFailed {
                target: set.label.clone(),
            });
        }
        info!(field = %set.label, "Field filled");
        self.pause().await;
        Ok(())
    }

    async fn choose_category(&self) -> Result<(), StepError> {
        let set = &self.pipeline.locators.category;
        let select = resolve(self.driver, set, self.pipeline.timing.locator_budget()).await?;
        let options = self.driver.options(&select).await?;
        let wanted = &self.pipeline.run.category;

        let Some(hit) = match_category(&options, wanted, &self.pipeline.fallbacks) else {
            return Err(StepError::CategoryUnmatched {
                wanted: wanted.clone(),
                available: options.iter().map(|o| o.label.clone()).collect(),
            });
        };

        self.driver.choose_option(&select, hit.option).await?;
        info!(option = %hit.option.label, tier = ?hit.tier, "Category selected");
        self.pause().await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Select date
    // -----------------------------------------------------------------------

    /// Earliest selectable day is assumed to be the first rendered one; cell
    /// order is never checked against actual dates.
    async fn select_date(&self) -> Result<StepResult, StepError> {
        let timing = &self.pipeline.timing;
        let mut advances = 0;

        loop {
            let cells = self.selectable_days().await;

            let requested = match self.pipeline.date {
                DateChoice::Specific(date) if advances == 0 => {
                    let day = date.day();
                    let hit = cells.iter().find(|(_, d)| *d == day).cloned();
                    if hit.is_none() {
                        warn!(%date, "Requested date not selectable, taking earliest available");
                    }
                    hit
                }
                _ => None,
            };

            if let Some((cell, day)) = requested.or_else(|| cells.into_iter().next()) {
                if !self.interactor().activate(&cell).await? {
                    return Err(StepError::InteractionFailed {
                        target: format!("day {day}"),
                    });
                }
                info!(day, advances, "Date selected");
                self.pause().await;
                return Ok(StepResult::Succeeded);
            }

            if advances >= timing.max_period_advances {
                return Err(StepError::NoAvailableDate { advances });
            }

            let next = match resolve(
                self.driver,
                &self.pipeline.locators.next_period,
                timing.optional_budget(),
            )
            .await
            {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "No control to advance the calendar");
                    return Err(StepError::NoAvailableDate { advances });
                }
            };
            if !self.interactor().activate(&next).await? {
                return Err(StepError::InteractionFailed {
                    target: self.pipeline.locators.next_period.label.clone(),
                });
            }
            advances += 1;
            info!(advances, "No free day in view, advanced calendar");
            self.pause().await;
        }
    }

    /// Day cells of the first strategy that yields any usable cell, with
    /// their day-of-month, in document order.
    async fn selectable_days(&self) -> Vec<(Target, u32)> {
        for strategy in &self.pipeline.locators.day_cells.strategies {
            let found = match self.driver.find_all(strategy.using, &strategy.selector).await {
                Ok(found) => found,
                Err(e) => {
                    debug!(%strategy, error = %e, "Day cell query failed");
                    continue;
                }
            };

            let mut days = Vec::new();
            for cell in found {
                let Ok(text) = self.driver.text(&cell).await else {
                    continue;
                };
                let Some(day) = day_of_month(&text) else {
                    continue;
                };
                let class = self
                    .driver
                    .attribute(&cell, "class")
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                if marked(&class, UNAVAILABLE_MARKERS) {
                    continue;
                }
                days.push((cell, day));
            }

            if !days.is_empty() {
                debug!(%strategy, count = days.len(), "Selectable days found");
                return days;
            }
        }
        Vec::new()
    }

    // -----------------------------------------------------------------------
    // Select time slot
    // -----------------------------------------------------------------------

    async fn select_slot(&self) -> Result<StepResult, StepError> {
        let slots = resolve_all(self.driver, &self.pipeline.locators.time_slots).await;
        if slots.is_empty() {
            info!("No time slot controls, nothing to choose");
            return Ok(StepResult::Skipped);
        }

        let mut classified = Vec::with_capacity(slots.len());
        for slot in slots {
            let class = self
                .driver
                .attribute(&slot, "class")
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            classified.push((slot, class));
        }

        let open = classified
            .iter()
            .filter(|(_, class)| !marked(class, &["disabled", "unavailable"]));
        let preferred = open
            .clone()
            .filter(|(_, class)| marked(class, &["available", "free"]));

        for (slot, _) in preferred.chain(open) {
            if let Ok(true) = self.interactor().activate(slot).await {
                let label = self.driver.text(slot).await.unwrap_or_default();
                info!(slot = %label, "Time slot selected");
                return Ok(StepResult::Succeeded);
            }
        }

        warn!("Time slot controls present but none selectable");
        Ok(StepResult::Skipped)
    }

    // -----------------------------------------------------------------------
    // Acknowledge
    // -----------------------------------------------------------------------

    /// Missing acknowledgements are logged, not fatal; the remote form's own
    /// validation decides the submission.
    async fn acknowledge(&self) -> Result<StepResult, StepError> {
        let locators = &self.pipeline.locators;
        let budget = self.pipeline.timing.optional_budget();
        let mut ticked = 0;
        let mut missing = Vec::new();

        for set in &locators.acknowledgements {
            match resolve(self.driver, set, budget).await {
                Ok(target) => {
                    if self.tick(&target).await {
                        ticked += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Acknowledgement control missing");
                    missing.push(set.label.clone());
                }
            }
        }

        for target in resolve_all(self.driver, &locators.required_checkboxes).await {
            if self.tick(&target).await {
                ticked += 1;
            }
        }

        if missing.is_empty() {
            info!(ticked, "Acknowledgements done");
        } else {
            warn!(ticked, ?missing, "Acknowledgements incomplete");
        }
        Ok(StepResult::Succeeded)
    }

    /// Activate an unchecked box. True if it was ticked now.
    async fn tick(&self, target: &Target) -> bool {
        match self.driver.is_selected(target).await {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                warn!(%target, error = %e, "Could not read checkbox state");
                return false;
            }
        }
        match self.interactor().activate(target).await {
            Ok(ticked) => ticked,
            Err(e) => {
                warn!(%target, error = %e, "Checkbox vanished");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Submit
    // -----------------------------------------------------------------------

    async fn submit(&self) -> Result<StepResult, StepError> {
        let timing = &self.pipeline.timing;
        let set = &self.pipeline.locators.submit;
        let button = resolve(self.driver, set, timing.locator_budget()).await?;

        if let Err(e) = self.driver.scroll_into_view(&button).await {
            debug!(error = %e, "Scroll into view failed");
        }
        if !timing.settle().is_zero() {
            tokio::time::sleep(timing.settle()).await;
        }

        if !self.interactor().activate(&button).await? {
            return Err(StepError::InteractionFailed {
                target: set.label.clone(),
            });
        }
        info!("Form submitted");

        if !self.driver.wait_until_ready(timing.page_ready_timeout()).await? {
            warn!("Result page did not report ready in time");
        }
        if !timing.after_submit().is_zero() {
            tokio::time::sleep(timing.after_submit()).await;
        }
        Ok(StepResult::Succeeded)
    }

    // -----------------------------------------------------------------------
    // Classify
    // -----------------------------------------------------------------------

    async fn classify(&self) -> Result<RunOutcome, StepError> {
        let surface = Surface {
            content: self.driver.visible_content().await?,
            success_element_visible: self.success_marker_visible().await,
            address: self.driver.current_address().await?,
        };
        Ok(self.pipeline.classifier.classify(&surface))
    }

    async fn success_marker_visible(&self) -> bool {
        for strategy in &self.pipeline.locators.success_markers.strategies {
            let Ok(found) = self.driver.find_all(strategy.using, &strategy.selector).await else {
                continue;
            };
            for marker in found {
                if let Ok(true) = self.driver.is_displayed(&marker).await {
                    debug!(%strategy, "Visible success marker");
                    return true;
                }
            }
        }
        false
    }
}

/// Day-of-month label: digits only, 1 to 31.
fn day_of_month(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|d| (1..=31).contains(d))
}

fn marked(class: &str, markers: &[&str]) -> bool {
    let class = class.to_lowercase();
    markers.iter().any(|m| class.contains(m))
}

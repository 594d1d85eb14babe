//! End-to-end runs of the booking pipeline against the in-memory page.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use slotcatcher::config::{RunConfig, TargetConfig, TimingConfig};
use slotcatcher::driver::fake::{Action, ClickEffect, FakeElement, FakePage, Scope};
use slotcatcher::driver::Using;
use slotcatcher::error::{PipelineError, StepError};
use slotcatcher::evidence::MemoryEvidenceStore;
use slotcatcher::locator::LocatorSet;
use slotcatcher::notify::RecordingNotifier;
use slotcatcher::outcome::RunOutcome;
use slotcatcher::retry::{self, RetryPolicy};
use slotcatcher::workflow::{DateChoice, FormLocators, Pipeline, Step, StepResult};

fn run_config(category: &str) -> Arc<RunConfig> {
    Arc::new(RunConfig {
        full_name: "Ada Lovelace".into(),
        email: "ada@example.org".into(),
        member_id: "555012".into(),
        category: category.into(),
        headless: true,
    })
}

fn locators() -> FormLocators {
    FormLocators {
        full_name: LocatorSet::new("full name").by(Using::Id, "name"),
        category: LocatorSet::new("category").by(Using::ClassName, "service"),
        email: LocatorSet::new("email")
            .by(Using::Id, "email_1")
            .by(Using::Name, "email"),
        member_id: LocatorSet::new("member id").by(Using::Id, "member"),
        day_cells: LocatorSet::new("day cells").by(Using::ClassName, "day"),
        next_period: LocatorSet::new("next period").by(Using::ClassName, "next"),
        time_slots: LocatorSet::new("time slots").by(Using::ClassName, "time-slot"),
        acknowledgements: vec![
            LocatorSet::new("terms").by(Using::Id, "terms"),
            LocatorSet::new("privacy").by(Using::Id, "privacy"),
        ],
        required_checkboxes: LocatorSet::new("required").by(Using::ClassName, "required"),
        submit: LocatorSet::new("submit").by(Using::Id, "submit"),
        success_markers: LocatorSet::new("success").by(Using::ClassName, "alert-success"),
    }
}

fn day(label: &str, class: &str, period: usize) -> FakeElement {
    FakeElement::new("td")
        .class(class)
        .text(label)
        .in_scope(Scope::Period(period))
}

/// Form fields, acknowledgements and a submit button; no calendar.
fn form() -> FakePage {
    FakePage::new()
        .with(FakeElement::new("input").id("name"))
        .with(
            FakeElement::new("select")
                .class("service")
                .options(&[("", ""), ("Room A", "1"), ("Room B - Main", "2")]),
        )
        .with(FakeElement::new("input").name("email"))
        .with(FakeElement::new("input").id("member"))
        .with(FakeElement::new("input").id("terms"))
        .with(FakeElement::new("input").id("privacy"))
        .with(FakeElement::new("input").id("extra").class("required"))
        .with(FakeElement::new("button").id("submit").on_click(ClickEffect::Submit))
}

/// The complete page: one free day, two time slots, a confirmation.
fn bookable() -> FakePage {
    form()
        .with(day("1", "day past", 0))
        .with(day("2", "day disabled", 0))
        .with(day("15", "day", 0))
        .with(day("20", "day", 0))
        .with(FakeElement::new("div").class("time-slot disabled").text("09:00"))
        .with(FakeElement::new("div").class("time-slot available").text("10:00"))
        .with(
            FakeElement::new("div")
                .class("alert-success")
                .text("Prenotazione confermata")
                .in_scope(Scope::Result),
        )
        .with_result(
            "Prenotazione confermata per il 15",
            "https://booking.example/prenota?esito=success",
        )
}

struct Harness {
    page: FakePage,
    evidence: Arc<MemoryEvidenceStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(page: FakePage) -> Self {
        Self {
            page,
            evidence: Arc::new(MemoryEvidenceStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    fn pipeline(&self, category: &str) -> Pipeline {
        let target = TargetConfig {
            entry_url: "https://booking.example/form".into(),
            ..TargetConfig::default()
        };
        Pipeline::new(
            run_config(category),
            &target,
            Arc::new(self.page.clone()),
            self.evidence.clone(),
            self.notifier.clone(),
        )
        .with_timing(TimingConfig::instant())
        .with_locators(locators())
    }
}

fn chosen_label(actions: &[Action]) -> Option<String> {
    actions.iter().find_map(|a| match a {
        Action::Chose { label, .. } => Some(label.clone()),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_booking_end_to_end() {
    let h = Harness::new(bookable());
    let report = h.pipeline("Room B").run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Confirmed);
    let steps: Vec<Step> = report.steps.iter().map(|r| r.step).collect();
    assert_eq!(
        steps,
        vec![
            Step::OpenTarget,
            Step::FillForm,
            Step::SelectDate,
            Step::SelectSlot,
            Step::Acknowledge,
            Step::Submit,
            Step::Classify,
        ]
    );
    assert!(report
        .steps
        .iter()
        .all(|r| r.result == StepResult::Succeeded));

    let actions = h.page.actions();
    assert_eq!(
        actions[0],
        Action::Navigated("https://booking.example/form".into())
    );
    assert!(actions.contains(&Action::Typed {
        element: "name".into(),
        text: "Ada Lovelace".into()
    }));
    assert!(actions.contains(&Action::Typed {
        element: "email".into(),
        text: "ada@example.org".into()
    }));
    assert!(actions.contains(&Action::Clicked("15".into())));
    assert!(actions.contains(&Action::Clicked("10:00".into())));
    assert!(actions.contains(&Action::Clicked("submit".into())));
    assert!(!actions.contains(&Action::Clicked("09:00".into())));

    assert!(h.page.element_by_id("terms").unwrap().selected);
    assert!(h.page.element_by_id("privacy").unwrap().selected);
    assert!(h.page.element_by_id("extra").unwrap().selected);

    assert_eq!(h.page.launches(), 1);
    assert_eq!(h.page.quits(), 1);
    assert!(h.evidence.names().is_empty());

    let sent = h.notifier.delivered();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Booking confirmed");
}

#[tokio::test(start_paused = true)]
async fn test_category_selected_by_substring() {
    let h = Harness::new(bookable());
    h.pipeline("Room B").run().await.unwrap();
    assert_eq!(
        chosen_label(&h.page.actions()).as_deref(),
        Some("Room B - Main")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_category_fails_fill_form() {
    let h = Harness::new(bookable());
    let err = h.pipeline("Auditorium").run().await.unwrap_err();

    match err {
        PipelineError::Step {
            step: Step::FillForm,
            source: StepError::CategoryUnmatched { available, .. },
            ..
        } => assert!(available.contains(&"Room A".to_string())),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_field_aborts_with_snapshot() {
    let page = FakePage::new()
        .with(FakeElement::new("input").id("name"))
        .with(FakeElement::new("button").id("submit").on_click(ClickEffect::Submit));
    let h = Harness::new(page);
    let err = h.pipeline("Room B").run().await.unwrap_err();

    assert_eq!(err.step(), Some(Step::FillForm));
    assert!(matches!(
        err,
        PipelineError::Step {
            source: StepError::TargetNotFound(_),
            ..
        }
    ));
    assert!(err.to_string().contains("'category' not found"));
    assert_eq!(err.snapshot(), Some("memory:0"));

    let names = h.evidence.names();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("_fill-form"), "{}", names[0]);

    // Nothing after the failing step ran.
    assert!(!h
        .page
        .actions()
        .iter()
        .any(|a| matches!(a, Action::Clicked(_) | Action::ForceClicked(_))));
    assert_eq!(h.page.quits(), 1);
    assert_eq!(h.notifier.delivered()[0].0, "Booking failed");
}

#[tokio::test(start_paused = true)]
async fn test_unclickable_submit_fails_with_snapshot() {
    let page = FakePage::new()
        .with(FakeElement::new("input").id("name"))
        .with(
            FakeElement::new("select")
                .class("service")
                .options(&[("Room A", "1")]),
        )
        .with(FakeElement::new("input").name("email"))
        .with(FakeElement::new("input").id("member"))
        .with(day("15", "day", 0))
        .with(FakeElement::new("button").id("submit").inert());
    let h = Harness::new(page);
    let err = h.pipeline("Room A").run().await.unwrap_err();

    match &err {
        PipelineError::Step {
            step: Step::Submit,
            source: StepError::InteractionFailed { target },
            ..
        } => assert_eq!(target, "submit"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.snapshot(), Some("memory:0"));
    let names = h.evidence.names();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("_submit"), "{}", names[0]);
    assert_eq!(h.page.quits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_snapshot_does_not_mask_step_error() {
    let page = form().failing_snapshots();
    let h = Harness::new(page);
    let err = h.pipeline("Room A").run().await.unwrap_err();

    assert_eq!(err.step(), Some(Step::SelectDate));
    assert_eq!(err.snapshot(), None);
    assert!(h.evidence.names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_calendar_advances_to_next_period() {
    let page = form()
        .with(day("30", "day past", 0))
        .with(day("31", "day disabled", 0))
        .with(
            FakeElement::new("button")
                .class("next")
                .text(">")
                .on_click(ClickEffect::NextPeriod),
        )
        .with(day("3", "day", 1))
        .with_result("Prenotazione confermata", "https://booking.example/done");
    let h = Harness::new(page);
    let report = h.pipeline("Room A").run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Confirmed);
    assert_eq!(h.page.period(), 1);
    let actions = h.page.actions();
    let advanced = actions
        .iter()
        .position(|a| *a == Action::Clicked(">".into()))
        .unwrap();
    let picked = actions
        .iter()
        .position(|a| *a == Action::Clicked("3".into()))
        .unwrap();
    assert!(advanced < picked);
}

#[tokio::test(start_paused = true)]
async fn test_no_free_day_after_advances() {
    let page = form()
        .with(day("30", "day past", 0))
        .with(
            FakeElement::new("button")
                .class("next")
                .text(">")
                .on_click(ClickEffect::NextPeriod),
        );
    let h = Harness::new(page);
    let err = h.pipeline("Room A").run().await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Step {
            step: Step::SelectDate,
            source: StepError::NoAvailableDate { advances: 3 },
            ..
        }
    ));
    assert_eq!(h.page.period(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_specific_date_preferred_then_earliest() {
    let h = Harness::new(bookable());
    let wanted = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
    h.pipeline("Room A")
        .with_date(DateChoice::Specific(wanted))
        .run()
        .await
        .unwrap();
    assert!(h.page.actions().contains(&Action::Clicked("20".into())));

    let h = Harness::new(bookable());
    let absent = NaiveDate::from_ymd_opt(2026, 11, 25).unwrap();
    h.pipeline("Room A")
        .with_date(DateChoice::Specific(absent))
        .run()
        .await
        .unwrap();
    let actions = h.page.actions();
    assert!(actions.contains(&Action::Clicked("15".into())));
    assert!(!actions.contains(&Action::Clicked("20".into())));
}

#[tokio::test(start_paused = true)]
async fn test_obstructed_submit_uses_script_click() {
    let page = FakePage::new()
        .with(FakeElement::new("input").id("name"))
        .with(
            FakeElement::new("select")
                .class("service")
                .options(&[("Room A", "1")]),
        )
        .with(FakeElement::new("input").name("email"))
        .with(FakeElement::new("input").id("member"))
        .with(day("4", "day", 0))
        .with(
            FakeElement::new("button")
                .id("submit")
                .obstructed()
                .on_click(ClickEffect::Submit),
        )
        .with_result("", "https://booking.example/conferma");
    let h = Harness::new(page);
    let report = h.pipeline("Room A").run().await.unwrap();

    assert!(h
        .page
        .actions()
        .contains(&Action::ForceClicked("submit".into())));
    // Confirmed through the address alone.
    assert_eq!(report.outcome, RunOutcome::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_missing_slots_and_acknowledgements_are_tolerated() {
    let page = FakePage::new()
        .with(FakeElement::new("input").id("name"))
        .with(
            FakeElement::new("select")
                .class("service")
                .options(&[("Room A", "1")]),
        )
        .with(FakeElement::new("input").name("email"))
        .with(FakeElement::new("input").id("member"))
        .with(day("4", "day", 0))
        .with(FakeElement::new("button").id("submit").on_click(ClickEffect::Submit))
        .with_result("Nothing to see here", "https://booking.example/form");
    let h = Harness::new(page);
    let report = h.pipeline("Room A").run().await.unwrap();

    let slot = report
        .steps
        .iter()
        .find(|r| r.step == Step::SelectSlot)
        .unwrap();
    assert_eq!(slot.result, StepResult::Skipped);
    assert_eq!(report.outcome, RunOutcome::Indeterminate);
    assert!(h.notifier.delivered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_phrase_wins_over_success_marker() {
    let page = bookable().with_result(
        "Errore: posto non disponibile. Prenotazione confermata?",
        "https://booking.example/success",
    );
    let h = Harness::new(page);
    let report = h.pipeline("Room B").run().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Rejected);
}

#[tokio::test(start_paused = true)]
async fn test_retry_opens_fresh_session_per_attempt() {
    let page = bookable().with_result("Errore: nessun posto", "https://booking.example/form");
    let h = Harness::new(page);
    let pipeline = h.pipeline("Room A");
    let policy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_secs(2),
    };

    let report = retry::attempt(&pipeline, &policy, &CancellationToken::new()).await;
    assert_eq!(report.attempts, 3);
    assert_eq!(report.outcome, RunOutcome::Rejected);
    assert_eq!(h.page.launches(), 3);
    assert_eq!(h.page.quits(), 3);
}

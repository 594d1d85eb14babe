//! Resolve one UI target through an ordered list of fallback locators.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::{Driver, Target, Using};

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocatorStrategy {
    pub using: Using,
    pub selector: String,
}

impl LocatorStrategy {
    pub fn new(using: Using, selector: impl Into<String>) -> Self {
        Self {
            using,
            selector: selector.into(),
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.using, self.selector)
    }
}

/// Strategies tried left to right; the most specific one comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSet {
    pub label: String,
    pub strategies: Vec<LocatorStrategy>,
}

impl LocatorSet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            strategies: Vec::new(),
        }
    }

    pub fn by(mut self, using: Using, selector: impl Into<String>) -> Self {
        self.strategies.push(LocatorStrategy::new(using, selector));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Every strategy of a set timed out.
#[derive(Debug, Clone, Error)]
#[error("'{label}' not found (tried {})", render(.attempted))]
pub struct NotFound {
    pub label: String,
    pub attempted: Vec<LocatorStrategy>,
}

fn render(attempted: &[LocatorStrategy]) -> String {
    if attempted.is_empty() {
        return "no strategies".to_string();
    }
    attempted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Return the first target any strategy finds, in priority order.
///
/// Each strategy may wait for an equal slice of `budget`, and the total never
/// exceeds `budget`: a strategy only gets what is left before the deadline.
/// Presence is all that is checked here; interactability is the caller's
/// concern. Driver errors on one strategy are logged and the next is tried.
pub async fn resolve(
    driver: &dyn Driver,
    set: &LocatorSet,
    budget: Duration,
) -> Result<Target, NotFound> {
    let not_found = || NotFound {
        label: set.label.clone(),
        attempted: set.strategies.clone(),
    };
    if set.is_empty() {
        return Err(not_found());
    }

    let deadline = Instant::now() + budget;
    let slice = budget / set.strategies.len() as u32;

    for strategy in &set.strategies {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = slice.min(remaining);
        match driver.find(strategy.using, &strategy.selector, wait).await {
            Ok(Some(target)) => {
                debug!(locator = %set.label, %strategy, "Element found");
                return Ok(target);
            }
            Ok(None) => debug!(locator = %set.label, %strategy, "Strategy missed"),
            Err(e) => warn!(locator = %set.label, %strategy, error = %e, "Strategy errored"),
        }
    }

    Err(not_found())
}

/// Non-waiting variant for collections: results of the first strategy that
/// matches anything at all.
pub async fn resolve_all(driver: &dyn Driver, set: &LocatorSet) -> Vec<Target> {
    for strategy in &set.strategies {
        match driver.find_all(strategy.using, &strategy.selector).await {
            Ok(found) if !found.is_empty() => {
                debug!(locator = %set.label, %strategy, count = found.len(), "Elements found");
                return found;
            }
            Ok(_) => {}
            Err(e) => warn!(locator = %set.label, %strategy, error = %e, "Strategy errored"),
        }
    }
    Vec::new()
}

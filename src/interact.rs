//! Defensive text entry and activation.
//!
//! Remote pages re-render while being driven, so each interaction gets one
//! retry through a lower-level path: direct value assignment for text, a
//! script-dispatched click for activation. Absence is not handled here; the
//! locator resolver has already established the target exists.

use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::{Driver, DriverError, Target};

/// Performs interactions against one driver with fixed pauses.
pub struct Interactor<'a> {
    driver: &'a dyn Driver,
    settle: Duration,
    actionable_timeout: Duration,
}

impl<'a> Interactor<'a> {
    pub fn new(driver: &'a dyn Driver, settle: Duration, actionable_timeout: Duration) -> Self {
        Self {
            driver,
            settle,
            actionable_timeout,
        }
    }

    /// Replace the element's content with `value`.
    ///
    /// `Ok(false)` when both paths were refused; `Err` only when the target
    /// itself has become invalid.
    pub async fn set_text(&self, target: &Target, value: &str) -> Result<bool, DriverError> {
        match self.type_natively(target, value).await {
            Ok(()) => {
                self.pause().await;
                return Ok(true);
            }
            Err(e) => warn!(%target, error = %e, "Typing failed, assigning value directly"),
        }

        match self.driver.assign_value(target, value).await {
            Ok(()) => {
                self.pause().await;
                Ok(true)
            }
            Err(e) if e.is_target_invalid() => Err(e),
            Err(e) => {
                warn!(%target, error = %e, "Direct value assignment failed");
                Ok(false)
            }
        }
    }

    async fn type_natively(&self, target: &Target, value: &str) -> Result<(), DriverError> {
        self.driver.clear(target).await?;
        self.driver.type_text(target, value).await
    }

    /// Click the element, falling back to a click that ignores obstruction.
    pub async fn activate(&self, target: &Target) -> Result<bool, DriverError> {
        match self.click_natively(target).await {
            Ok(()) => {
                self.pause().await;
                return Ok(true);
            }
            Err(e) => warn!(%target, error = %e, "Click failed, dispatching script click"),
        }

        match self.driver.force_click(target).await {
            Ok(()) => {
                debug!(%target, "Script click succeeded");
                self.pause().await;
                Ok(true)
            }
            Err(e) if e.is_target_invalid() => Err(e),
            Err(e) => {
                warn!(%target, error = %e, "Script click failed");
                Ok(false)
            }
        }
    }

    async fn click_natively(&self, target: &Target) -> Result<(), DriverError> {
        if !self
            .driver
            .wait_actionable(target, self.actionable_timeout)
            .await?
        {
            return Err(DriverError::NotInteractable(format!(
                "not clickable within {:?}",
                self.actionable_timeout
            )));
        }
        self.driver.click(target).await
    }

    async fn pause(&self) {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
    }
}

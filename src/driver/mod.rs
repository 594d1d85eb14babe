//! Browser automation driver capability.
//!
//! The pipeline only ever talks to a [`Driver`]; any implementation that can
//! find elements, type, click and report what the page shows is substitutable.
//! [`webdriver`] speaks the W3C WebDriver protocol to a running chromedriver.

use std::time::Duration;

use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod webdriver;

/// How a selector expression is interpreted when locating an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Using {
    Id,
    ClassName,
    Name,
    TagName,
    Css,
    XPath,
}

impl std::fmt::Display for Using {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Using::Id => write!(f, "id"),
            Using::ClassName => write!(f, "class"),
            Using::Name => write!(f, "name"),
            Using::TagName => write!(f, "tag"),
            Using::Css => write!(f, "css"),
            Using::XPath => write!(f, "xpath"),
        }
    }
}

/// Opaque handle to an element the driver has located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(String);

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a drop-down list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no such element")]
    NoSuchElement,

    #[error("element is stale or detached: {0}")]
    StaleElement(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("webdriver returned {code}: {message}")]
    Protocol { code: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed driver response: {0}")]
    Malformed(String),
}

impl DriverError {
    /// True when the handle itself no longer points at anything usable, as
    /// opposed to a transient refusal to interact.
    pub fn is_target_invalid(&self) -> bool {
        matches!(self, DriverError::NoSuchElement | DriverError::StaleElement(_))
    }
}

/// Everything the automation pipeline needs from a browser.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Wait until the document reports it has finished loading.
    /// Returns `false` if `timeout` elapsed first.
    async fn wait_until_ready(&self, timeout: Duration) -> Result<bool, DriverError>;

    /// Wait up to `timeout` for an element to be present. `Ok(None)` means it
    /// never appeared.
    async fn find(
        &self,
        using: Using,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Target>, DriverError>;

    /// All elements currently matching, in document order. Does not wait.
    async fn find_all(&self, using: Using, selector: &str) -> Result<Vec<Target>, DriverError>;

    async fn clear(&self, target: &Target) -> Result<(), DriverError>;

    /// Type into the element through simulated key events.
    async fn type_text(&self, target: &Target, text: &str) -> Result<(), DriverError>;

    /// Assign the element's value directly, bypassing key events.
    async fn assign_value(&self, target: &Target, text: &str) -> Result<(), DriverError>;

    /// Wait up to `timeout` for the element to be visible and enabled.
    async fn wait_actionable(&self, target: &Target, timeout: Duration)
        -> Result<bool, DriverError>;

    /// Native click, subject to the browser's interactability checks.
    async fn click(&self, target: &Target) -> Result<(), DriverError>;

    /// Script-dispatched click that ignores obstruction and visibility.
    async fn force_click(&self, target: &Target) -> Result<(), DriverError>;

    async fn scroll_into_view(&self, target: &Target) -> Result<(), DriverError>;

    async fn text(&self, target: &Target) -> Result<String, DriverError>;

    async fn attribute(&self, target: &Target, name: &str) -> Result<Option<String>, DriverError>;

    async fn is_selected(&self, target: &Target) -> Result<bool, DriverError>;

    async fn is_displayed(&self, target: &Target) -> Result<bool, DriverError>;

    /// Options of a `<select>` element, in document order.
    async fn options(&self, select: &Target) -> Result<Vec<SelectOption>, DriverError>;

    async fn choose_option(&self, select: &Target, option: &SelectOption)
        -> Result<(), DriverError>;

    /// Text currently rendered on the page.
    async fn visible_content(&self) -> Result<String, DriverError>;

    async fn current_address(&self) -> Result<String, DriverError>;

    /// Screenshot bytes (PNG for real browsers).
    async fn snapshot(&self) -> Result<Vec<u8>, DriverError>;

    /// End the browser session.
    async fn quit(&self) -> Result<(), DriverError>;
}

/// Opens a fresh browser session for one pipeline execution.
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Driver>, DriverError>;
}

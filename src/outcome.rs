//! Classify what the page shows after submission.
//!
//! No single signal is reliable on the remote side, so several are consulted
//! in a fixed order and the first that fires decides.

use serde::Serialize;
use tracing::{info, warn};

/// Verdict of one full pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Confirmed,
    Rejected,
    /// Neither success nor failure could be detected.
    Indeterminate,
}

impl RunOutcome {
    pub fn is_confirmed(self) -> bool {
        self == RunOutcome::Confirmed
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Confirmed => write!(f, "confirmed"),
            RunOutcome::Rejected => write!(f, "rejected"),
            RunOutcome::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Observations gathered from the post-submission page.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    pub content: String,
    /// A success-indicating element is present and visible.
    pub success_element_visible: bool,
    pub address: String,
}

pub const FAILURE_PHRASES: &[&str] = &[
    "errore",
    "error",
    "fallito",
    "failed",
    "impossibile",
    "non disponibile",
    "rifiutato",
];

pub const SUCCESS_PHRASES: &[&str] = &[
    "prenotazione confermata",
    "confermata",
    "confermato",
    "successo",
    "successful",
    "prenotato",
    "completata",
    "completato",
    "riuscita",
    "riuscito",
];

pub const SUCCESS_ADDRESS_TOKENS: &[&str] = &["success", "conferma", "completato"];

/// Phrase tables used by [`Classifier::classify`].
#[derive(Debug, Clone)]
pub struct Classifier {
    failure_phrases: Vec<String>,
    success_phrases: Vec<String>,
    address_tokens: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(FAILURE_PHRASES, SUCCESS_PHRASES, SUCCESS_ADDRESS_TOKENS)
    }
}

impl Classifier {
    pub fn new(failure: &[&str], success: &[&str], address: &[&str]) -> Self {
        Self {
            failure_phrases: lower(failure),
            success_phrases: lower(success),
            address_tokens: lower(address),
        }
    }

    /// Failure phrases are checked first, so a page mentioning both an error
    /// and a confirmation is `Rejected`.
    pub fn classify(&self, surface: &Surface) -> RunOutcome {
        let content = surface.content.to_lowercase();

        if let Some(phrase) = first_hit(&content, &self.failure_phrases) {
            warn!(%phrase, "Failure phrase on result page");
            return RunOutcome::Rejected;
        }

        if surface.success_element_visible {
            info!("Success element visible on result page");
            return RunOutcome::Confirmed;
        }

        if let Some(phrase) = first_hit(&content, &self.success_phrases) {
            info!(%phrase, "Success phrase on result page");
            return RunOutcome::Confirmed;
        }

        let address = surface.address.to_lowercase();
        if let Some(token) = first_hit(&address, &self.address_tokens) {
            info!(%token, address = %surface.address, "Success token in result address");
            return RunOutcome::Confirmed;
        }

        warn!(address = %surface.address, "No success or failure signal on result page");
        RunOutcome::Indeterminate
    }
}

fn lower(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_lowercase()).collect()
}

fn first_hit<'a>(haystack: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|n| haystack.contains(n.as_str()))
        .map(String::as_str)
}

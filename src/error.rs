//! Failures of a pipeline run.

use thiserror::Error;

use crate::driver::DriverError;
use crate::locator::NotFound;
use crate::workflow::Step;

/// Why a single step could not complete.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    TargetNotFound(#[from] NotFound),

    #[error("could not interact with '{target}' (native and fallback paths refused)")]
    InteractionFailed { target: String },

    #[error("no option matches category '{wanted}' (available: {available:?})")]
    CategoryUnmatched {
        wanted: String,
        available: Vec<String>,
    },

    #[error("no selectable date after {advances} period advance(s)")]
    NoAvailableDate { advances: u32 },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Why a whole run was abandoned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start browser session: {0}")]
    Launch(#[source] DriverError),

    #[error("step '{step}' failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: StepError,
        /// Reference to the diagnostic snapshot, if one was stored.
        snapshot: Option<String>,
    },

    #[error("run aborted: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn step(&self) -> Option<Step> {
        match self {
            PipelineError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&str> {
        match self {
            PipelineError::Step { snapshot, .. } => snapshot.as_deref(),
            _ => None,
        }
    }
}

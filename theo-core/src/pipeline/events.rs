//! Step progress reported to the front-end.

use std::fmt;

use parking_lot::Mutex;
use tracing::{info, warn};

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Mask,
    Research,
    Reason,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mask => write!(f, "mask"),
            Self::Research => write!(f, "research"),
            Self::Reason => write!(f, "reason"),
        }
    }
}

/// Progress event. Carries tokens, counts and categories only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A stage began.
    StepStarted(Step),
    /// A stage finished.
    StepFinished {
        /// The stage
        step: Step,
        /// Short human-readable result
        detail: String,
    },
    /// A stage failed.
    StepFailed {
        /// The stage
        step: Step,
        /// Error message
        reason: String,
    },
    /// Something the user should look at; the turn continues.
    Warning(String),
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: PipelineEvent);
}

/// Logs events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::StepStarted(step) => info!(step = %step, "Step started"),
            PipelineEvent::StepFinished { step, detail } => {
                info!(step = %step, detail = %detail, "Step finished");
            }
            PipelineEvent::StepFailed { step, reason } => {
                warn!(step = %step, reason = %reason, "Step failed");
            }
            PipelineEvent::Warning(message) => warn!(message = %message, "Pipeline warning"),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingProgress {
    /// Everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Steps that were started, in order.
    #[must_use]
    pub fn started_steps(&self) -> Vec<Step> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StepStarted(step) => Some(*step),
                _ => None,
            })
            .collect()
    }

    /// Warning messages.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Warning(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().push(event);
    }
}

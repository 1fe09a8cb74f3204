//! Human approval gate for the sanitized query.
//!
//! State machine:
//! - Pending → Approved (approve)
//! - Pending → Edited (edit; the text becomes the new sanitized query)
//! - Pending → Cancelled (cancel)
//! - Edited → Pending (next presentation)
//!
//! Approved and Cancelled are terminal. Every decision must name the
//! presentation it answers; duplicate, stale and post-terminal decisions are
//! rejected without changing state.
//!
//! The only way to obtain an [`ApprovedQuery`] is [`ApprovalGate::release`],
//! which fails unless the gate is Approved. The research stage accepts nothing
//! else, so dispatch before approval is unrepresentable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// State
// ============================================================================

/// Approval lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Awaiting a decision
    Pending,
    /// User approved the current sanitized query
    Approved,
    /// User replaced the sanitized query; will be shown again
    Edited,
    /// User cancelled; nothing is sent
    Cancelled,
}

impl ApprovalState {
    /// Returns true for Approved and Cancelled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Cancelled)
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Edited => write!(f, "edited"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Identifies one presentation of the sanitized query to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresentationId(u32);

impl fmt::Display for PresentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the reviewer is asked to decide on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    /// Id to quote back in [`ApprovalGate::decide`]
    pub id: PresentationId,
    /// The sanitized query as it would be sent
    pub sanitized_query: String,
}

/// A reviewer's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send the sanitized query as shown
    Approve,
    /// Replace the sanitized query with this text
    Edit(String),
    /// Abort the turn
    Cancel,
}

impl Decision {
    fn kind(&self) -> DecisionKind {
        match self {
            Self::Approve => DecisionKind::Approve,
            Self::Edit(_) => DecisionKind::Edit,
            Self::Cancel => DecisionKind::Cancel,
        }
    }
}

/// Decision without payload, for history and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Edit,
    Cancel,
}

/// One accepted decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Presentation the decision answered
    pub presentation: PresentationId,
    /// What was decided
    pub kind: DecisionKind,
    /// When the gate accepted it
    pub decided_at: DateTime<Utc>,
}

// ============================================================================
// Errors
// ============================================================================

/// Why a decision was ignored. The gate state is unchanged in every case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateRejection {
    /// The gate already reached a terminal state.
    #[error("approval already {state}; decision ignored")]
    Terminal {
        /// The terminal state
        state: ApprovalState,
    },

    /// The decision answers an older presentation, or one that was already
    /// decided.
    #[error("decision for presentation {got} ignored; current presentation is {current:?}")]
    StalePresentation {
        /// Id named by the decision
        got: PresentationId,
        /// Presentation awaiting a decision, if any
        current: Option<PresentationId>,
    },

    /// No presentation is awaiting a decision.
    #[error("nothing has been presented for approval")]
    NotPresented,

    /// Edited text was empty.
    #[error("edited query is empty; decision ignored")]
    EmptyEdit,
}

/// Attempt to release a query from a gate that is not Approved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("approval violation: research requested while approval is {state}")]
pub struct ApprovalViolation {
    /// State the gate was in
    pub state: ApprovalState,
}

// ============================================================================
// Approved query
// ============================================================================

/// A sanitized query the user approved.
///
/// Constructed only by [`ApprovalGate::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedQuery {
    text: String,
    presentation: PresentationId,
}

impl ApprovedQuery {
    /// The approved text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Presentation the approval answered.
    #[must_use]
    pub fn presentation(&self) -> PresentationId {
        self.presentation
    }
}

impl fmt::Display for ApprovedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Approval state machine for one turn.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    state: ApprovalState,
    sanitized_query: String,
    next_id: u32,
    awaiting: Option<PresentationId>,
    approved_by: Option<PresentationId>,
    edited: bool,
    history: Vec<DecisionRecord>,
}

impl ApprovalGate {
    /// New gate in Pending over the masker's sanitized query.
    #[must_use]
    pub fn new(sanitized_query: impl Into<String>) -> Self {
        Self {
            state: ApprovalState::Pending,
            sanitized_query: sanitized_query.into(),
            next_id: 1,
            awaiting: None,
            approved_by: None,
            edited: false,
            history: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ApprovalState {
        self.state
    }

    /// Current sanitized query (the edited text after an edit).
    #[must_use]
    pub fn sanitized_query(&self) -> &str {
        &self.sanitized_query
    }

    /// True if the user replaced the masker's output at least once.
    #[must_use]
    pub fn was_edited(&self) -> bool {
        self.edited
    }

    /// Accepted decisions, oldest first.
    #[must_use]
    pub fn history(&self) -> &[DecisionRecord] {
        &self.history
    }

    /// Show the current sanitized query for a decision.
    ///
    /// Moves Edited back to Pending. Any earlier presentation becomes stale.
    /// Returns `None` once the gate is terminal.
    pub fn present(&mut self) -> Option<Presentation> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = ApprovalState::Pending;
        let id = PresentationId(self.next_id);
        self.next_id += 1;
        self.awaiting = Some(id);
        debug!(presentation = %id, "Sanitized query presented");
        Some(Presentation {
            id,
            sanitized_query: self.sanitized_query.clone(),
        })
    }

    /// Apply `decision` to presentation `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`GateRejection`] for decisions that must be ignored; the
    /// gate is left exactly as it was.
    pub fn decide(
        &mut self,
        id: PresentationId,
        decision: Decision,
    ) -> Result<ApprovalState, GateRejection> {
        if self.state.is_terminal() {
            return Err(GateRejection::Terminal { state: self.state });
        }
        let Some(current) = self.awaiting else {
            return Err(GateRejection::NotPresented);
        };
        if current != id {
            return Err(GateRejection::StalePresentation {
                got: id,
                current: Some(current),
            });
        }

        let kind = decision.kind();
        match decision {
            Decision::Approve => {
                self.state = ApprovalState::Approved;
                self.approved_by = Some(id);
            }
            Decision::Edit(text) => {
                if text.trim().is_empty() {
                    return Err(GateRejection::EmptyEdit);
                }
                self.sanitized_query = text;
                self.edited = true;
                self.state = ApprovalState::Edited;
            }
            Decision::Cancel => self.state = ApprovalState::Cancelled,
        }

        self.awaiting = None;
        self.history.push(DecisionRecord {
            presentation: id,
            kind,
            decided_at: Utc::now(),
        });
        info!(
            presentation = %id,
            decision = ?kind,
            state = %self.state,
            "Approval decision accepted"
        );
        Ok(self.state)
    }

    /// Hand out the approved query.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalViolation`] unless the gate is Approved.
    pub fn release(&self) -> Result<ApprovedQuery, ApprovalViolation> {
        match (self.state, self.approved_by) {
            (ApprovalState::Approved, Some(presentation)) => Ok(ApprovedQuery {
                text: self.sanitized_query.clone(),
                presentation,
            }),
            (state, _) => Err(ApprovalViolation { state }),
        }
    }
}

//! theo core: the masking, approval and restoration pipeline.
//!
//! A question flows through four stages inside the user's trust boundary:
//!
//! ```text
//!  raw query ──▶ Masker ──▶ ApprovalGate ──▶ ResearchDispatcher ──▶ Reasoner ──▶ answer
//!                  │            ▲   │ edit          (sanitized only)     │
//!                  │            └───┘                                    │
//!                  └──────── PlaceholderRegistry (never leaves) ─────────┘
//! ```
//!
//! The library owns the state machine and its invariants. The chat front-end,
//! the model backends and configuration loading are collaborators injected
//! through the traits in [`backend`] and [`pipeline`].

pub mod approval;
pub mod backend;
pub mod config;
pub mod error;
pub mod factory;
pub mod internal;
pub mod masking;
pub mod pipeline;
pub mod prompts;
pub mod reasoning;
pub mod research;

pub use approval::{ApprovalGate, ApprovalState, ApprovedQuery, Decision, Presentation};
pub use error::PipelineError;
pub use masking::{Category, Detection, Masker, PlaceholderRegistry};
pub use pipeline::{Pipeline, PipelineContext, TurnOutcome};

//! Terminal front-end for theo.
//!
//! Reviews masked questions at the console and prints restored answers.

pub mod attachments;
pub mod cli;
pub mod console;
pub mod error;
pub mod session;

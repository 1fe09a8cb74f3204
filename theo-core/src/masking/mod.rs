//! Sensitive-span detection and placeholder substitution.
//!
//! - `category` - Detection taxonomy
//! - `registry` - Token ↔ original mapping and restoration
//! - `response` - Parsing of the masking model's output
//! - `masker` - The masking stage itself
//! - `summary` - Grouped view for the approval screen

pub mod category;
pub mod masker;
pub mod registry;
pub mod response;
pub mod summary;

pub use category::{Category, Taxonomy, is_valid_category_name};
pub use masker::{Detection, MaskOutcome, Masker, MaskerConfig, MaskingError};
pub use registry::{PlaceholderRegistry, RegistryError, Restored, find_tokens};
pub use response::{ModelDetections, ReportedSpan, parse_detections};
pub use summary::{CategoryGroup, DetectionSummary, MaskedEntry};

//! Grouped view of a masking result for the approval screen.
//!
//! The summary pairs each token with the value it hides so the reviewer can
//! check the masking. It stays inside the trust boundary; `Debug` output
//! redacts the originals.

use std::fmt;

use super::category::Category;
use super::masker::Detection;

/// One masked value and its token.
#[derive(Clone, PartialEq)]
pub struct MaskedEntry {
    /// Placeholder token, e.g. `[PERSON_1]`
    pub token: String,
    /// The value it replaced
    pub original: String,
}

impl fmt::Debug for MaskedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskedEntry")
            .field("token", &self.token)
            .field("original", &"[REDACTED]")
            .finish()
    }
}

/// Detections of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    /// The category
    pub category: Category,
    /// Display label (e.g. "Persons")
    pub label: String,
    /// Entries in this category, in registration order
    pub entries: Vec<MaskedEntry>,
}

impl CategoryGroup {
    /// Tokens in this category, in registration order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.token.as_str())
    }
}

/// What was masked, grouped for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSummary {
    /// Groups in order of first detection
    pub groups: Vec<CategoryGroup>,
    /// Model-reported confidence, or the mean of span confidences
    pub overall_confidence: Option<f64>,
    /// Number of PII detections
    pub pii_count: usize,
    /// Number of business-data detections
    pub business_count: usize,
    /// Long query came back with nothing masked; worth a closer look
    pub long_input_without_detections: bool,
}

impl DetectionSummary {
    pub(crate) fn build(
        detections: &[Detection],
        overall_confidence: Option<f64>,
        query_chars: usize,
        long_input_warning_chars: usize,
    ) -> Self {
        let mut groups: Vec<CategoryGroup> = Vec::new();
        for detection in detections {
            let entry = MaskedEntry {
                token: detection.token.clone(),
                original: detection.original.clone(),
            };
            match groups.iter_mut().find(|g| g.category == detection.category) {
                Some(group) => group.entries.push(entry),
                None => groups.push(CategoryGroup {
                    category: detection.category.clone(),
                    label: detection.category.label().to_string(),
                    entries: vec![entry],
                }),
            }
        }

        let pii_count = detections.iter().filter(|d| d.category.is_pii()).count();
        #[allow(clippy::cast_precision_loss)]
        let mean = (!detections.is_empty()).then(|| {
            detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
        });

        Self {
            groups,
            overall_confidence: overall_confidence.or(mean),
            pii_count,
            business_count: detections.len() - pii_count,
            long_input_without_detections: detections.is_empty()
                && query_chars > long_input_warning_chars,
        }
    }

    /// True if nothing was masked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of distinct tokens.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pii_count + self.business_count
    }
}

//! The masking stage: model detections → sanitized query + registry.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::category::{Category, Taxonomy};
use super::registry::{PlaceholderRegistry, RegistryError};
use super::response::{ReportedSpan, parse_detections};
use super::summary::DetectionSummary;
use crate::backend::{BackendError, MaskingBackend};
use crate::prompts;

// ============================================================================
// Errors
// ============================================================================

/// Errors from the masking stage.
///
/// Every variant aborts the turn before anything is shown for approval.
#[derive(Debug, Error)]
pub enum MaskingError {
    /// The query was empty.
    #[error("nothing to mask: the query is empty")]
    EmptyQuery,

    /// The masking backend returned something that is not a detection list.
    #[error("masking model returned an unparseable response: {reason}")]
    Format {
        /// Why parsing failed
        reason: String,
    },

    /// Two detections claim overlapping spans of the raw query.
    ///
    /// The span texts are carried for display but not part of the message.
    #[error(
        "overlapping detections: {first_category} at {first_range:?} and {second_category} at {second_range:?}"
    )]
    OverlappingDetection {
        /// Category of the earlier span
        first_category: Category,
        /// Byte range of the earlier span
        first_range: Range<usize>,
        /// Text of the earlier span
        first_text: String,
        /// Category of the later span
        second_category: Category,
        /// Byte range of the later span
        second_range: Range<usize>,
        /// Text of the later span
        second_text: String,
    },

    /// The masking backend call failed.
    #[error("masking backend failed: {0}")]
    Backend(#[from] BackendError),

    /// The registry refused a value.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ============================================================================
// Detection
// ============================================================================

/// One sensitive span found in the raw query and the token that replaced it.
#[derive(Clone, PartialEq)]
pub struct Detection {
    /// Category reported by the model
    pub category: Category,
    /// Original text (never leaves the trust boundary)
    pub original: String,
    /// Placeholder token substituted for every occurrence
    pub token: String,
    /// Model confidence in `[0, 1]`
    pub confidence: f64,
    /// Byte ranges of every occurrence in the raw query
    pub occurrences: Vec<Range<usize>>,
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detection")
            .field("category", &self.category)
            .field("original", &"[REDACTED]")
            .field("token", &self.token)
            .field("confidence", &self.confidence)
            .field("occurrences", &self.occurrences)
            .finish()
    }
}

/// Output of [`Masker::mask`].
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    /// Raw query with every detection replaced by its token
    pub sanitized_query: String,
    /// Token ↔ original mapping for this turn
    pub registry: PlaceholderRegistry,
    /// Detections in the order the model reported them
    pub detections: Vec<Detection>,
    /// Grouped view for display
    pub summary: DetectionSummary,
    /// Reported spans that do not occur in the query
    pub skipped: usize,
}

// ============================================================================
// Masker
// ============================================================================

/// Masker configuration.
#[derive(Debug, Clone)]
pub struct MaskerConfig {
    /// Accepted categories
    pub taxonomy: Taxonomy,
    /// Queries longer than this (in chars) without detections are flagged
    pub long_input_warning_chars: usize,
}

impl Default for MaskerConfig {
    fn default() -> Self {
        Self {
            taxonomy: Taxonomy::default(),
            long_input_warning_chars: 500,
        }
    }
}

/// Runs the masking model and substitutes placeholders.
pub struct Masker {
    backend: Arc<dyn MaskingBackend>,
    config: MaskerConfig,
    system_prompt: String,
}

struct Candidate {
    category: Category,
    text: String,
    confidence: f64,
}

impl Masker {
    /// Create a masker over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn MaskingBackend>, config: MaskerConfig) -> Self {
        let system_prompt = prompts::masking_system_prompt(&config.taxonomy);
        Self {
            backend,
            config,
            system_prompt,
        }
    }

    /// The system prompt sent with every masking request.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Detect sensitive spans in `raw_query` and replace them with tokens.
    ///
    /// # Errors
    ///
    /// - [`MaskingError::EmptyQuery`] for a blank query
    /// - [`MaskingError::Backend`] if the model call fails
    /// - [`MaskingError::Format`] if the response is not a detection list
    /// - [`MaskingError::OverlappingDetection`] if two detections overlap
    #[tracing::instrument(
        skip_all,
        fields(backend = self.backend.name(), query_chars = raw_query.chars().count())
    )]
    pub async fn mask(&self, raw_query: &str) -> Result<MaskOutcome, MaskingError> {
        if raw_query.trim().is_empty() {
            return Err(MaskingError::EmptyQuery);
        }

        let response = self
            .backend
            .detect(&self.system_prompt, &prompts::masking_user_message(raw_query))
            .await?;
        debug!(response_chars = response.len(), "Masking model responded");

        let parsed = parse_detections(&response, &self.config.taxonomy).map_err(|reason| {
            warn!(reason = %reason, "Masking response rejected");
            MaskingError::Format { reason }
        })?;

        let outcome = self.apply(raw_query, &parsed.spans, parsed.overall_confidence)?;
        info!(
            detections = outcome.detections.len(),
            skipped = outcome.skipped,
            "Query masked"
        );
        Ok(outcome)
    }

    /// Substitute `spans` into `raw_query`.
    ///
    /// Split from [`Masker::mask`] so the substitution rules can be exercised
    /// without a backend.
    ///
    /// # Errors
    ///
    /// Returns [`MaskingError::OverlappingDetection`] or
    /// [`MaskingError::Registry`].
    pub fn apply(
        &self,
        raw_query: &str,
        spans: &[ReportedSpan],
        overall_confidence: Option<f64>,
    ) -> Result<MaskOutcome, MaskingError> {
        // Same (category, text) reported twice collapses into one candidate.
        let mut candidates: Vec<Candidate> = Vec::new();
        for span in spans {
            match candidates
                .iter_mut()
                .find(|c| c.category == span.category && c.text == span.text)
            {
                Some(existing) => existing.confidence = existing.confidence.max(span.confidence),
                None => candidates.push(Candidate {
                    category: span.category.clone(),
                    text: span.text.clone(),
                    confidence: span.confidence,
                }),
            }
        }

        let mut occurrences: Vec<Vec<Range<usize>>> = Vec::with_capacity(candidates.len());
        let mut skipped = 0;
        for candidate in &candidates {
            let ranges: Vec<Range<usize>> = raw_query
                .match_indices(candidate.text.as_str())
                .map(|(start, text)| start..start + text.len())
                .collect();
            if ranges.is_empty() {
                skipped += 1;
                warn!(
                    category = %candidate.category,
                    span_chars = candidate.text.chars().count(),
                    "Reported span does not occur in the query, skipping"
                );
            }
            occurrences.push(ranges);
        }

        check_overlaps(&candidates, &occurrences)?;

        let mut registry = PlaceholderRegistry::reserving_tokens_in(raw_query);
        let mut detections = Vec::with_capacity(candidates.len());
        for (candidate, ranges) in candidates.into_iter().zip(occurrences) {
            if ranges.is_empty() {
                continue;
            }
            let token = registry.register(candidate.category.clone(), candidate.text.as_str())?;
            detections.push(Detection {
                category: candidate.category,
                original: candidate.text,
                token,
                confidence: candidate.confidence,
                occurrences: ranges,
            });
        }

        let sanitized_query = substitute(raw_query, &detections);
        let summary = DetectionSummary::build(
            &detections,
            overall_confidence,
            raw_query.chars().count(),
            self.config.long_input_warning_chars,
        );

        Ok(MaskOutcome {
            sanitized_query,
            registry,
            detections,
            summary,
            skipped,
        })
    }
}

/// Reject any two occurrences of different candidates that share a byte.
fn check_overlaps(
    candidates: &[Candidate],
    occurrences: &[Vec<Range<usize>>],
) -> Result<(), MaskingError> {
    let mut spans: Vec<(Range<usize>, usize)> = occurrences
        .iter()
        .enumerate()
        .flat_map(|(idx, ranges)| ranges.iter().map(move |r| (r.clone(), idx)))
        .collect();
    spans.sort_by_key(|(range, idx)| (range.start, range.end, *idx));

    // Track the span reaching furthest right so far; nested spans are caught
    // even when a shorter span sits between them.
    let mut furthest: Option<(Range<usize>, usize)> = None;
    for (range, idx) in spans {
        if let Some((prev_range, prev_idx)) = &furthest {
            if range.start < prev_range.end && *prev_idx != idx {
                let first = &candidates[*prev_idx];
                let second = &candidates[idx];
                return Err(MaskingError::OverlappingDetection {
                    first_category: first.category.clone(),
                    first_range: prev_range.clone(),
                    first_text: first.text.clone(),
                    second_category: second.category.clone(),
                    second_range: range,
                    second_text: second.text.clone(),
                });
            }
            if range.end <= prev_range.end {
                continue;
            }
        }
        furthest = Some((range, idx));
    }
    Ok(())
}

/// Splice tokens into `raw_query` at every detection occurrence.
fn substitute(raw_query: &str, detections: &[Detection]) -> String {
    let mut spans: Vec<(&Range<usize>, &str)> = detections
        .iter()
        .flat_map(|d| d.occurrences.iter().map(move |r| (r, d.token.as_str())))
        .collect();
    spans.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(raw_query.len());
    let mut cursor = 0;
    for (range, token) in spans {
        out.push_str(&raw_query[cursor..range.start]);
        out.push_str(token);
        cursor = range.end;
    }
    out.push_str(&raw_query[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::ScriptedMasking;

    fn masker(response: &str) -> Masker {
        Masker::new(
            Arc::new(ScriptedMasking::new(response)),
            MaskerConfig::default(),
        )
    }

    const EXAMPLE_QUERY: &str = "Can John Smith from Acme Corp review our Q3 strategy doc?";

    #[tokio::test]
    async fn test_mask_example_scenario() {
        let masker = masker(
            r#"{"entities": [
                {"category": "PERSON", "text": "John Smith"},
                {"category": "COMPANY", "text": "Acme Corp"},
                {"category": "STRATEGY", "text": "Q3 strategy doc"}
            ]}"#,
        );
        let outcome = masker.mask(EXAMPLE_QUERY).await.unwrap();
        assert_eq!(
            outcome.sanitized_query,
            "Can [PERSON_1] from [COMPANY_1] review our [STRATEGY_1]?"
        );
        assert_eq!(outcome.registry.len(), 3);
        assert_eq!(outcome.registry.restore(&outcome.sanitized_query).text, EXAMPLE_QUERY);
    }

    #[tokio::test]
    async fn test_mask_zero_detections_returns_query_unchanged() {
        let outcome = masker(r#"{"entities": []}"#).mask("What is Rust?").await.unwrap();
        assert_eq!(outcome.sanitized_query, "What is Rust?");
        assert!(outcome.registry.is_empty());
        assert!(outcome.detections.is_empty());
    }

    #[tokio::test]
    async fn test_mask_repeated_span_shares_token() {
        let masker = masker(r#"[{"category": "PERSON", "text": "Jane"}]"#);
        let outcome = masker.mask("Jane wrote to Jane's manager").await.unwrap();
        assert_eq!(outcome.sanitized_query, "[PERSON_1] wrote to [PERSON_1]'s manager");
        assert_eq!(outcome.detections[0].occurrences.len(), 2);
        assert_eq!(outcome.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_mask_duplicate_reports_collapse() {
        let masker = masker(
            r#"[{"category": "PERSON", "text": "Jane", "confidence": 0.5},
                {"category": "PERSON", "text": "Jane", "confidence": 0.8}]"#,
        );
        let outcome = masker.mask("Ask Jane").await.unwrap();
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_mask_malformed_response_is_format_error() {
        let err = masker("Sure! I masked John Smith for you.")
            .mask(EXAMPLE_QUERY)
            .await
            .unwrap_err();
        assert!(matches!(err, MaskingError::Format { .. }));
    }

    #[tokio::test]
    async fn test_mask_empty_query() {
        let err = masker("[]").mask("   ").await.unwrap_err();
        assert!(matches!(err, MaskingError::EmptyQuery));
    }

    #[tokio::test]
    async fn test_mask_nested_spans_are_rejected() {
        let masker = masker(
            r#"[{"category": "COMPANY", "text": "Acme Corp"},
                {"category": "CLIENT", "text": "Acme"}]"#,
        );
        let err = masker.mask("Call Acme Corp today").await.unwrap_err();
        match err {
            MaskingError::OverlappingDetection {
                first_category,
                first_range,
                second_category,
                second_range,
                ..
            } => {
                assert_eq!(first_category, Category::Client);
                assert_eq!(first_range, 5..9);
                assert_eq!(second_category, Category::Company);
                assert_eq!(second_range, 5..14);
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mask_same_text_two_categories_is_overlap() {
        let masker = masker(
            r#"[{"category": "COMPANY", "text": "Acme"},
                {"category": "CLIENT", "text": "Acme"}]"#,
        );
        let err = masker.mask("Acme is a client").await.unwrap_err();
        assert!(matches!(err, MaskingError::OverlappingDetection { .. }));
    }

    #[tokio::test]
    async fn test_mask_partial_overlap_is_rejected() {
        let masker = masker(
            r#"[{"category": "PROJECT", "text": "Project Phoenix"},
                {"category": "PRODUCT", "text": "Phoenix Suite"}]"#,
        );
        let err = masker
            .mask("Project Phoenix Suite launches soon")
            .await
            .unwrap_err();
        assert!(matches!(err, MaskingError::OverlappingDetection { .. }));
    }

    #[tokio::test]
    async fn test_mask_overlap_error_message_omits_text() {
        let masker = masker(
            r#"[{"category": "COMPANY", "text": "Acme Corp"},
                {"category": "CLIENT", "text": "Acme"}]"#,
        );
        let err = masker.mask("Call Acme Corp").await.unwrap_err();
        assert!(!err.to_string().contains("Acme"));
    }

    #[tokio::test]
    async fn test_mask_skips_spans_absent_from_query() {
        let masker = masker(
            r#"[{"category": "PERSON", "text": "John Smith"},
                {"category": "PERSON", "text": "Someone Else"}]"#,
        );
        let outcome = masker.mask("Email John Smith").await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.sanitized_query, "Email [PERSON_1]");
    }

    #[tokio::test]
    async fn test_mask_counters_follow_report_order() {
        let masker = masker(
            r#"[{"category": "PERSON", "text": "Bob"},
                {"category": "PERSON", "text": "Alice"}]"#,
        );
        let outcome = masker.mask("Alice and Bob").await.unwrap();
        assert_eq!(outcome.sanitized_query, "[PERSON_2] and [PERSON_1]");
    }

    #[tokio::test]
    async fn test_mask_skips_tokens_present_in_raw_query() {
        let masker = masker(r#"[{"category": "PERSON", "text": "John Smith"}]"#);
        let raw = "Fill [PERSON_1] in the template with John Smith";
        let outcome = masker.mask(raw).await.unwrap();
        assert_eq!(
            outcome.sanitized_query,
            "Fill [PERSON_1] in the template with [PERSON_2]"
        );
        assert_eq!(outcome.registry.restore(&outcome.sanitized_query).text, raw);
    }

    #[tokio::test]
    async fn test_mask_sends_query_with_taxonomy_prompt() {
        let backend = Arc::new(ScriptedMasking::new("[]"));
        let masker = Masker::new(backend.clone(), MaskerConfig::default());
        masker.mask("What does Acme do?").await.unwrap();

        let (system, user) = backend.last_request().unwrap();
        assert!(system.contains("DATE_OF_BIRTH"));
        assert!(system.contains("CLIENT"));
        assert!(user.contains("What does Acme do?"));
    }

    #[tokio::test]
    async fn test_mask_long_input_without_detections_is_flagged() {
        let long_query = "lorem ipsum ".repeat(60);
        let outcome = masker("[]").mask(&long_query).await.unwrap();
        assert!(outcome.summary.long_input_without_detections);
    }

    #[test]
    fn test_detection_debug_redacts_original() {
        let detection = Detection {
            category: Category::Person,
            original: "John Smith".to_string(),
            token: "[PERSON_1]".to_string(),
            confidence: 0.9,
            occurrences: vec![4..14],
        };
        let debug = format!("{detection:?}");
        assert!(debug.contains("[PERSON_1]"));
        assert!(!debug.contains("John Smith"));
    }
}

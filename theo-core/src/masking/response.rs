//! Parsing of the masking model's structured output.
//!
//! Accepted shapes (optionally wrapped in a Markdown code fence):
//!
//! ```json
//! {"entities": [{"category": "PERSON", "text": "John Smith", "confidence": 0.95}],
//!  "overall_confidence": 0.92}
//! ```
//!
//! or a bare array of entity objects. `original`, `span` and `span_text` are
//! accepted in place of `text`. Text outside a code fence is ignored; prose
//! with no JSON at all is a format error.

use serde::Deserialize;

use super::category::{Category, Taxonomy};

/// Default confidence when the model omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Envelope(RawEnvelope),
    List(Vec<RawEntity>),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    entities: Vec<RawEntity>,
    #[serde(default)]
    overall_confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    category: String,
    #[serde(alias = "original", alias = "span", alias = "span_text")]
    text: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// One `(category, span_text)` pair reported by the model.
#[derive(Clone, PartialEq)]
pub struct ReportedSpan {
    /// Resolved category
    pub category: Category,
    /// Span text as it should appear in the raw query
    pub text: String,
    /// Model confidence in `[0, 1]`
    pub confidence: f64,
}

impl std::fmt::Debug for ReportedSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportedSpan")
            .field("category", &self.category)
            .field("text", &"[REDACTED]")
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// Parsed model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDetections {
    /// Spans in the order the model returned them
    pub spans: Vec<ReportedSpan>,
    /// Overall confidence, if reported
    pub overall_confidence: Option<f64>,
}

/// Strip a surrounding Markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if let Some((_, rest)) = text.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some((_, rest)) = text.split_once("```") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    text
}

/// Parse the masking model's response against `taxonomy`.
///
/// # Errors
///
/// Returns a human-readable reason when the response is not valid JSON of
/// an accepted shape, names an unknown category, or has an empty span.
pub fn parse_detections(response: &str, taxonomy: &Taxonomy) -> Result<ModelDetections, String> {
    let body = strip_code_fence(response);
    if body.is_empty() {
        return Err("empty response".to_string());
    }

    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| format!("not a detection list: {e}"))?;
    let (entities, overall_confidence) = match raw {
        RawResponse::Envelope(envelope) => (envelope.entities, envelope.overall_confidence),
        RawResponse::List(entities) => (entities, None),
    };

    let mut spans = Vec::with_capacity(entities.len());
    for (index, entity) in entities.into_iter().enumerate() {
        let category = taxonomy
            .resolve(&entity.category)
            .ok_or_else(|| format!("entity {index}: unknown category '{}'", entity.category))?;
        if entity.text.trim().is_empty() {
            return Err(format!("entity {index}: empty span text"));
        }
        let confidence = entity
            .confidence
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        spans.push(ReportedSpan {
            category,
            text: entity.text,
            confidence,
        });
    }

    Ok(ModelDetections {
        spans,
        overall_confidence: overall_confidence.map(|c| c.clamp(0.0, 1.0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(response: &str) -> Result<ModelDetections, String> {
        parse_detections(response, &Taxonomy::default())
    }

    #[test]
    fn test_parse_envelope() {
        let parsed = parse(
            r#"{"entities": [
                {"category": "PERSON", "text": "John Smith", "confidence": 0.95},
                {"category": "COMPANY", "original": "Acme Corp"}
            ], "overall_confidence": 0.9}"#,
        )
        .unwrap();
        assert_eq!(parsed.spans.len(), 2);
        assert_eq!(parsed.spans[0].category, Category::Person);
        assert_eq!(parsed.spans[0].text, "John Smith");
        assert_eq!(parsed.spans[1].text, "Acme Corp");
        assert_eq!(parsed.spans[1].confidence, DEFAULT_CONFIDENCE);
        assert_eq!(parsed.overall_confidence, Some(0.9));
    }

    #[test]
    fn test_parse_bare_list_in_code_fence() {
        let parsed = parse(
            "Here you go:\n```json\n[{\"category\": \"iban\", \"span_text\": \"DE89 3704\"}]\n```",
        )
        .unwrap();
        assert_eq!(parsed.spans[0].category, Category::BankAccount);
        assert_eq!(parsed.overall_confidence, None);
    }

    #[test]
    fn test_parse_empty_entities_is_valid() {
        let parsed = parse(r#"{"entities": []}"#).unwrap();
        assert!(parsed.spans.is_empty());
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse("I found John Smith and Acme Corp.").unwrap_err();
        assert!(err.starts_with("not a detection list"));
    }

    #[test]
    fn test_parse_rejects_missing_entities() {
        assert!(parse(r#"{"masked_text": "Can [PERSON_1] help?"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let err = parse(r#"[{"category": "SPACESHIP", "text": "Enterprise"}]"#).unwrap_err();
        assert!(err.contains("unknown category 'SPACESHIP'"));
    }

    #[test]
    fn test_parse_accepts_configured_category() {
        let taxonomy = Taxonomy::with_extra(["CONTRACT"]);
        let parsed =
            parse_detections(r#"[{"category": "CONTRACT", "text": "MSA-2291"}]"#, &taxonomy)
                .unwrap();
        assert_eq!(
            parsed.spans[0].category,
            Category::Custom("CONTRACT".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_empty_span() {
        let err = parse(r#"[{"category": "PERSON", "text": " "}]"#).unwrap_err();
        assert!(err.contains("empty span"));
    }

    #[test]
    fn test_parse_rejects_empty_response() {
        assert_eq!(parse("  ").unwrap_err(), "empty response");
    }

    #[test]
    fn test_debug_redacts_span_text() {
        let parsed = parse(r#"[{"category": "PERSON", "text": "John Smith"}]"#).unwrap();
        assert!(!format!("{parsed:?}").contains("John Smith"));
    }
}

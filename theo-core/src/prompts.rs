//! Prompt text for every model call.

use crate::masking::Taxonomy;

/// System prompt for the masking model, listing the accepted categories.
#[must_use]
pub fn masking_system_prompt(taxonomy: &Taxonomy) -> String {
    let mut pii = String::new();
    let mut business = String::new();
    for category in taxonomy.iter() {
        let line = format!("- {}\n", category.as_str());
        if category.is_pii() {
            pii.push_str(&line);
        } else {
            business.push_str(&line);
        }
    }

    format!(
        "You find sensitive information in user questions so it can be removed before \
the question is sent to an external service.

Report every span that is personal data or confidential business information.

Personal data categories:
{pii}
Confidential business categories:
{business}
Rules:
- Report each span exactly as it appears in the text, character for character.
- Report a value once even if it appears several times.
- Do not report overlapping spans; report the longest meaningful span.
- Do not report general knowledge (public technologies, well-known public
  companies asked about in general, country names).
- Use only the categories listed above.

Answer with JSON only, no prose, in this shape:
{{\"entities\": [{{\"category\": \"PERSON\", \"text\": \"John Smith\", \"confidence\": 0.95}}],
 \"overall_confidence\": 0.9}}

If nothing is sensitive, answer {{\"entities\": []}}."
    )
}

/// User message wrapping the raw query for the masking model.
#[must_use]
pub fn masking_user_message(raw_query: &str) -> String {
    format!("Find the sensitive spans in this text:\n\n{raw_query}")
}

/// System prompt for the research service.
pub const RESEARCH_SYSTEM_PROMPT: &str = "You are a research assistant. Answer the question \
from current web sources, precisely and factually.

- Cite your sources with full URLs.
- Prefer recent and authoritative sources.
- Say so when the evidence is thin or contradictory.
- Bracketed tokens such as [COMPANY_1] stand for withheld names. Treat them as opaque \
and do not guess what they refer to.
- Keep the answer concise but complete.";

/// Research query with an optional response-language hint appended.
#[must_use]
pub fn research_user_message(query: &str, language: Option<&str>) -> String {
    match language {
        Some(language) => format!("{query}\n\nPlease answer in {language}."),
        None => query.to_string(),
    }
}

/// System prompt for the reasoning model.
pub const REASONING_SYSTEM_PROMPT: &str = "You turn research results into a clear final \
answer for the user.

- Analyse the research results and answer the user's question directly.
- Structure the answer with short sections or lists where it helps.
- Keep every bracketed token such as [PERSON_1] or [COMPANY_2] exactly as written. \
They stand for names that will be filled in later. Never invent new tokens.
- Be transparent about the limits of the available information.";

/// User message for composing the final answer.
#[must_use]
pub fn reasoning_user_message(sanitized_query: &str, findings: &str) -> String {
    format!(
        "## Question\n{sanitized_query}\n\n## Research results\n{findings}\n\n\
Write the final answer for the user."
    )
}

/// User message for deriving requirements.
#[must_use]
pub fn requirements_user_message(context: &str, findings: &str) -> String {
    format!(
        "From the research results below, derive a structured list of requirements \
or recommended actions.

## Context
{context}

## Research results
{findings}

Group the items under **Must**, **Should** and **Nice to have**. Format as Markdown \
with checkboxes. Keep bracketed tokens such as [PROJECT_1] exactly as written."
    )
}

/// System prompt for internal mode.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful internal assistant. Answer \
from your own knowledge; you have no web access. Be precise, and say when you are unsure.";

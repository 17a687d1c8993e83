//! Comment bodies posted back to documents. Every user-visible signal is a
//! comment with an emoji-prefixed title, a description, and action items where
//! the user can do something about it.

use crate::ai::{Answer, RelatedDoc};

fn percent(confidence: f64) -> String {
    format!("{:.0}%", confidence.clamp(0.0, 1.0) * 100.0)
}

/// Success comment after a high-confidence filing.
pub fn filing_success(collection_name: &str, confidence: f64, reasoning: &str) -> String {
    let mut body = format!(
        "✓ Filed to **{}** ({})",
        collection_name,
        percent(confidence)
    );
    if !reasoning.is_empty() {
        body.push_str(&format!(". Reasoning: {reasoning}"));
    }
    body
}

/// One alternative shown in the uncertainty comment.
pub struct AlternativeLine {
    pub name: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Uncertainty comment after a low-confidence filing. Lists alternatives and
/// shows the guidance syntax that re-triggers the filing.
pub fn filing_uncertain(
    best_name: &str,
    best_confidence: f64,
    alternatives: &[AlternativeLine],
    max_alternatives: usize,
) -> String {
    let mut body = format!(
        "❓ Not confident enough to file this ({} for **{}**).\n\nAlternatives:\n",
        percent(best_confidence),
        best_name
    );
    for alt in alternatives.iter().take(max_alternatives) {
        body.push_str(&format!(
            "- **{}** ({}){}\n",
            alt.name,
            percent(alt.confidence),
            if alt.reasoning.is_empty() {
                String::new()
            } else {
                format!(": {}", alt.reasoning)
            }
        ));
    }
    body.push_str(
        "\nTo file it, change `?ai-file` back to `/ai-file` with a hint, e.g.:\n\
         - `/ai-file backend implementation`\n\
         - `/ai-file team process docs`\n",
    );
    body
}

/// Answer comment: markdown answer, bulleted citations, confidence footer.
pub fn answer(answer: &Answer) -> String {
    let mut body = answer.answer.clone();
    if !answer.citations.is_empty() {
        body.push_str("\n\nSources:\n");
        for citation in &answer.citations {
            if citation.document_url.is_empty() {
                body.push_str(&format!("- {}\n", citation.document_title));
            } else {
                body.push_str(&format!(
                    "- [{}]({})\n",
                    citation.document_title, citation.document_url
                ));
            }
        }
    }
    body.push_str(&format!("\n_Confidence: {}_", percent(answer.confidence)));
    body
}

/// Related-documents comment.
pub fn related(related: &[RelatedDoc]) -> String {
    if related.is_empty() {
        return "No clearly related documents found.".to_string();
    }
    let mut body = String::from("Related documents:\n");
    for doc in related {
        let link = if doc.document_url.is_empty() {
            doc.title.clone()
        } else {
            format!("[{}]({})", doc.title, doc.document_url)
        };
        if doc.reason.is_empty() {
            body.push_str(&format!("- {link}\n"));
        } else {
            body.push_str(&format!("- {link}: {}\n", doc.reason));
        }
    }
    body
}

/// Permanent failure: the marker was removed, nothing will be retried.
pub fn permanent_failure(marker: &str, description: &str) -> String {
    format!(
        "❌ `{marker}` failed: {description}\n\n\
         Action items:\n\
         - Check the command and try again by re-adding the marker\n\
         - If this keeps happening, check the service logs\n"
    )
}

/// Transient failure: the marker stays; retries continue in the background.
pub fn temporary_failure(marker: &str, description: &str) -> String {
    format!(
        "⚠️ `{marker}` hit a temporary problem: {description}\n\n\
         The command marker was left in place and will be retried automatically.\n"
    )
}

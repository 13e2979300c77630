//! Citation extraction.

use std::collections::HashSet;

use super::context::ContextWindow;
use crate::types::Citation;

/// Citations for every passage in `window`, in descending score order.
///
/// An empty (or whitespace-only) answer cites nothing. Passage ids are
/// de-duplicated, keeping the first. `referenced` records whether the
/// answer contains the passage's `[n]` marker.
pub fn extract_citations(answer: &str, window: &ContextWindow, quote_chars: usize) -> Vec<Citation> {
    if answer.trim().is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    window
        .passages()
        .iter()
        .filter(|p| seen.insert(p.result.passage_id.as_str()))
        .map(|p| {
            let meta = &p.result.source_metadata;
            Citation {
                id: p.label,
                passage_id: p.result.passage_id.clone(),
                title: p.result.title.clone(),
                authors: (!meta.authors.is_empty()).then(|| meta.authors.clone()),
                doi: meta.doi.clone(),
                external_id: meta.external_id.clone(),
                relevance_score: p.result.score,
                quoted_text: quote(&p.result.snippet, quote_chars),
                referenced: answer.contains(&p.marker()),
            }
        })
        .collect()
}

/// First `max_chars` characters of `text`, ellipsized when cut.
fn quote(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

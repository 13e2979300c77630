//! Context window assembly.
//!
//! Passages enter in descending score order, each labelled `[n]` by its
//! position. Filling stops at the first passage that would overflow the
//! token budget; passages are never cut mid-text.

use std::collections::HashSet;

use crate::tokenizer::TokenCounter;
use crate::types::{SearchResult, rank_results};

/// A passage admitted into the context window.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPassage {
    /// 1-based label used as the `[n]` citation marker.
    pub label: usize,
    pub result: SearchResult,
    /// Tokens the rendered passage costs.
    pub tokens: usize,
}

impl ContextPassage {
    /// Citation marker, e.g. `[2]`.
    pub fn marker(&self) -> String {
        format!("[{}]", self.label)
    }

    /// Passage as it appears in the prompt.
    pub fn render(&self) -> String {
        render_passage(self.label, &self.result)
    }
}

fn render_passage(label: usize, result: &SearchResult) -> String {
    format!("[{label}] {}\n{}", result.title, result.snippet)
}

/// Passages selected for one prompt, within a token budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    passages: Vec<ContextPassage>,
    used_tokens: usize,
    budget: usize,
}

impl ContextWindow {
    pub fn passages(&self) -> &[ContextPassage] {
        &self.passages
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn used_tokens(&self) -> usize {
        self.used_tokens
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Search results that made it into the window, in label order.
    pub fn sources(&self) -> Vec<SearchResult> {
        self.passages.iter().map(|p| p.result.clone()).collect()
    }

    /// Every passage rendered and separated by blank lines.
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(ContextPassage::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Fill a context window from `results` within `budget` tokens.
///
/// Results are re-ranked and de-duplicated by passage id (first occurrence
/// wins) before filling.
pub fn build_context(
    results: &[SearchResult],
    budget: usize,
    counter: &dyn TokenCounter,
) -> ContextWindow {
    let mut ranked = results.to_vec();
    rank_results(&mut ranked);

    let mut seen = HashSet::new();
    let mut window = ContextWindow {
        budget,
        ..ContextWindow::default()
    };
    for result in ranked {
        if !seen.insert(result.passage_id.clone()) {
            continue;
        }
        let label = window.passages.len() + 1;
        let tokens = counter.count_tokens(&render_passage(label, &result));
        if window.used_tokens + tokens > budget {
            break;
        }
        window.used_tokens += tokens;
        window.passages.push(ContextPassage {
            label,
            result,
            tokens,
        });
    }
    window
}

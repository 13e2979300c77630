//! Prompt assembly.

use super::context::ContextWindow;
use crate::types::GenerationRequest;

/// Build the generation request for `question` over `window`.
///
/// An empty window yields a query-only prompt: the question verbatim.
pub fn build_request(system_prompt: &str, question: &str, window: &ContextWindow) -> GenerationRequest {
    let prompt = if window.is_empty() {
        question.to_string()
    } else {
        format!(
            "Sources:\n\n{}\n\nQuestion: {question}\n\nAnswer using the sources above and cite them by label.",
            window.render()
        )
    };
    GenerationRequest::new(prompt).system(system_prompt)
}

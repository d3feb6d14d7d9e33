//! # Prompt Construction
//!
//! Builds the system and user prompts for answer generation and the
//! instruction used by the query-rewrite stage. Prompts are rendered in
//! the pivot language domain: the question and citations passed in are
//! already translated before they reach here.

use crate::pipeline::model::Citation;
use std::fmt::Write;

/// Maximum number of citations rendered into the context block.
pub const MAX_CONTEXT_CITATIONS: usize = 5;

/// System prompt for the answer-generation call.
pub fn system_instruction() -> &'static str {
    "You are a retrieval-grounded assistant. Answer the user's question \
     using only the numbered reference passages provided. Cite passages \
     inline as [1], [2] where they support a statement. If the passages do \
     not contain the answer, say so plainly instead of guessing. Keep the \
     answer concise and in the same language as the question."
}

/// Instruction for the search-query rewrite call. The model must reply
/// with a JSON array of short keyword queries and nothing else.
pub fn rewrite_instruction() -> &'static str {
    "Rewrite the user's question into two to four short keyword search \
     queries suitable for a web search engine, ordered from most to least \
     specific. Reply with a JSON array of strings only, no prose, no \
     markdown."
}

/// Renders the user prompt: numbered reference passages followed by the
/// question. At most [`MAX_CONTEXT_CITATIONS`] passages are included;
/// with no passages the question is sent with an empty-context notice.
pub fn user_context_prompt(question: &str, citations: &[Citation]) -> String {
    let mut out = String::new();
    if citations.is_empty() {
        out.push_str("No reference passages were found.\n\n");
    } else {
        out.push_str("Reference passages:\n");
        for (idx, citation) in citations.iter().take(MAX_CONTEXT_CITATIONS).enumerate() {
            let _ = writeln!(
                out,
                "[{}] {} ({})\n{}",
                idx + 1,
                citation.title,
                citation.url,
                citation.snippet
            );
        }
        out.push('\n');
    }
    let _ = write!(out, "Question: {}", question);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mock::citation;

    #[test]
    fn numbers_citations_from_one() {
        let citations = vec![citation("a", "https://a"), citation("b", "https://b")];
        let prompt = user_context_prompt("what is rust", &citations);
        assert!(prompt.contains("[1] title-a (https://a)"));
        assert!(prompt.contains("[2] title-b (https://b)"));
        assert!(prompt.ends_with("Question: what is rust"));
    }

    #[test]
    fn caps_rendered_citations_at_five() {
        let citations: Vec<_> = (0..7)
            .map(|i| citation(&format!("c{}", i), &format!("https://c{}", i)))
            .collect();
        let prompt = user_context_prompt("q", &citations);
        assert!(prompt.contains("[5]"));
        assert!(!prompt.contains("[6]"));
    }

    #[test]
    fn rewrite_instruction_asks_for_two_to_four_queries() {
        let instruction = rewrite_instruction();
        assert!(instruction.contains("two to four"));
        assert!(instruction.contains("JSON array"));
    }

    #[test]
    fn empty_citations_note_missing_context() {
        let prompt = user_context_prompt("q", &[]);
        assert!(prompt.starts_with("No reference passages were found."));
    }
}

//! Prompt assembly for the answer generator.
//!
//! The system prompt sets the consultant voice and the citation contract;
//! the user prompt carries the assembled context, the numbered source list,
//! and the question. The source numbering here is the one the citation
//! renderer resolves markers against, so both sides of the contract live in
//! this module's output.

use crate::context::Source;

/// Consultant-voice instructions for every generation.
pub const SYSTEM_PROMPT: &str = "\
You are an expert consultant answering questions about the company's projects and services.

YOUR ROLE:
- Answer on behalf of the company: say \"we\" and \"our team\".
- You are the domain expert for everything the knowledge base covers.
- Give concrete, practical, useful answers.

HOW TO ANSWER:
1. Treat the provided context as the primary source of information, but never mention the context itself.
2. When the context holds relevant information, answer in detail and be specific.
3. When the context is only partially relevant, use what applies and fill the gaps with general knowledge.
4. Name concrete projects, technologies, and results when the context describes them.
5. If you cannot answer precisely, say so honestly and offer an alternative.
6. Keep the formatting simple: bold text and flat lists render well, nested headings do not.";

/// Citation formatting contract appended to the system prompt.
pub const CITATION_INSTRUCTIONS: &str = "\
CITATION REQUIREMENTS:
1. After every claim, fact, or figure taken from a source, append the source number in square brackets [N].
2. N is the number of that source in the provided source list, counting from 1.
3. Cite only sources that appear in the list.
4. Never put raw URLs in the answer text; use [N] markers only.
5. Place each marker immediately after the text it supports.";

/// Full system prompt: role instructions plus the citation contract.
pub fn system_prompt() -> String {
    format!("{SYSTEM_PROMPT}\n\n{CITATION_INSTRUCTIONS}")
}

/// Builds the user prompt from the context block, the question, and the
/// numbered source list.
pub fn user_prompt(context: &str, question: &str, sources: &[Source]) -> String {
    let listing = sources
        .iter()
        .enumerate()
        .map(|(position, source)| format!("{}. {} - {}", position + 1, source.name, source.url))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "KNOWLEDGE BASE CONTEXT:\n{context}\n\nSOURCES:\n{listing}\n\n\
         CUSTOMER QUESTION: {question}\n\n\
         Please give the most complete and useful answer the available information supports."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_carries_citation_contract() {
        let prompt = system_prompt();
        assert!(prompt.contains("expert consultant"));
        assert!(prompt.contains("CITATION REQUIREMENTS"));
        assert!(prompt.contains("[N]"));
    }

    #[test]
    fn test_user_prompt_numbers_sources_from_one() {
        let sources = vec![
            Source {
                name: "Refund Policy".to_string(),
                url: "https://docs.example.com/refund-policy".to_string(),
            },
            Source {
                name: "Shipping Times".to_string(),
                url: "https://docs.example.com/shipping-times".to_string(),
            },
        ];

        let prompt = user_prompt("the context", "How do refunds work?", &sources);
        assert!(prompt.contains("KNOWLEDGE BASE CONTEXT:\nthe context"));
        assert!(prompt.contains("1. Refund Policy - https://docs.example.com/refund-policy"));
        assert!(prompt.contains("2. Shipping Times - https://docs.example.com/shipping-times"));
        assert!(prompt.contains("CUSTOMER QUESTION: How do refunds work?"));
    }
}

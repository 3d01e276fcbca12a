//! Prompt builders for each completion call in a run

use super::synthesizer::SynthesisInput;

/// Separator placed between retrieved fragments
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// First line of any summary built without retrieved evidence
pub const NO_EVIDENCE_MARKER: &str = "[NO EVIDENCE FOUND]";

/// Ask for 2-4 independent sub-questions, one per line
pub fn decomposition_prompt(question: &str) -> String {
    format!(
        r#"You plan research for a document retrieval system.

Break the question below into 2 to 4 sub-questions. Each sub-question must be
answerable on its own with a single document search.

Question: {question}

Output only the sub-questions, one per line, with no numbering or commentary."#
    )
}

/// Ask for a bullet summary of the retrieved context
///
/// An empty context is stated outright so the model reports the gap instead
/// of answering from memory.
pub fn summary_prompt(sub_question: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return format!(
            r#"You are summarizing retrieved documents for the sub-question: {sub_question}

Documents: NONE. The search returned no documents for this sub-question.

State plainly that no supporting evidence was found. Do not answer from general
knowledge and do not invent sources."#
        );
    }

    format!(
        r#"You are summarizing retrieved documents for the sub-question: {sub_question}

Documents:
{context}

Write a concise summary of 8-10 bullet points using only the documents above."#
    )
}

/// Combine every (sub-question, summary) pair into one synthesis request
pub fn synthesis_prompt(question: &str, inputs: &[SynthesisInput], unanswered: &[String]) -> String {
    let combined = inputs
        .iter()
        .map(|input| {
            format!(
                "Sub-question {}: {}\nSummary:\n{}",
                input.index, input.sub_question, input.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let gaps = if unanswered.is_empty() {
        String::new()
    } else {
        let list = unanswered
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\n\nThese sub-questions could not be researched; say so where it matters:\n{}",
            list
        )
    };

    format!(
        r#"Original question:
{question}

Summaries for each sub-question:
{combined}{gaps}

Write a final, structured answer to the original question using only these
summaries. If the question asks for a comparison, end with a comparison table."#
    )
}

//! Question decomposition
//!
//! One completion call turns the question into an ordered list of
//! sub-questions. The response is validated here: list markers are stripped
//! and blank lines dropped, and an empty result is an error rather than
//! something to paper over.

use super::{prompts, Question, SubQuestion};
use crate::errors::{PipelineError, Result};
use crate::retry::RetryManager;
use crate::services::TextCompletion;
use std::sync::Arc;

/// Splits a question into sub-questions
pub struct Decomposer {
    completion: Arc<dyn TextCompletion>,
    retry: RetryManager,
}

impl Decomposer {
    pub fn new(completion: Arc<dyn TextCompletion>, retry: RetryManager) -> Self {
        Self { completion, retry }
    }

    /// Produce at least one sub-question for `question`
    pub async fn decompose(&self, question: &Question) -> Result<Vec<SubQuestion>> {
        let prompt = prompts::decomposition_prompt(question.as_str());

        let response = self
            .retry
            .execute("decompose", || self.completion.complete(&prompt))
            .await
            .map_err(|e| PipelineError::DecompositionFailure {
                reason: "completion call failed".to_string(),
                source: Some(e),
            })?;

        let sub_questions = parse_sub_questions(&response);
        if sub_questions.is_empty() {
            return Err(PipelineError::DecompositionFailure {
                reason: "completion produced no usable sub-questions".to_string(),
                source: None,
            });
        }

        tracing::info!(count = sub_questions.len(), "question decomposed");
        Ok(sub_questions)
    }
}

/// Split a completion into sub-questions, one per non-blank line
pub fn parse_sub_questions(response: &str) -> Vec<SubQuestion> {
    response
        .lines()
        .map(|line| strip_list_marker(line.trim()).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Remove a leading `-`, `*`, `•`, `1.` or `1)` marker
fn strip_list_marker(line: &str) -> &str {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest;
        }
    }
    if matches!(line, "-" | "*" | "•") {
        return "";
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if stripped.is_empty() || stripped.starts_with(char::is_whitespace) {
                return stripped;
            }
        }
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use async_trait::async_trait;
    use quickcheck_macros::quickcheck;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<Vec<std::result::Result<String, ServiceError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: Vec<std::result::Result<String, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextCompletion for Scripted {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ServiceError::InvalidResponse("script exhausted".into())))
        }
    }

    fn fast_retry() -> RetryManager {
        RetryManager::with_config(3, 1)
    }

    #[test]
    fn test_parse_plain_lines() {
        let parsed = parse_sub_questions("What is A?\n\nWhat is B?\n  \nHow do A and B differ?\n");
        assert_eq!(
            parsed,
            vec!["What is A?", "What is B?", "How do A and B differ?"]
        );
    }

    #[test]
    fn test_parse_strips_markers() {
        let parsed = parse_sub_questions("1. What is A?\n2) What is B?\n- What is C?\n* What is D?\n• What is E?");
        assert_eq!(
            parsed,
            vec!["What is A?", "What is B?", "What is C?", "What is D?", "What is E?"]
        );
    }

    #[test]
    fn test_parse_keeps_leading_numbers_in_text() {
        let parsed = parse_sub_questions("2024 releases of A?\n3.5 version of B?");
        assert_eq!(parsed, vec!["2024 releases of A?", "3.5 version of B?"]);
    }

    #[test]
    fn test_parse_drops_bare_markers() {
        assert!(parse_sub_questions("-\n1.\n   \n").is_empty());
    }

    #[quickcheck]
    fn prop_parsed_lines_are_trimmed_and_non_empty(input: String) -> bool {
        parse_sub_questions(&input)
            .iter()
            .all(|line| !line.is_empty() && line.trim() == line)
    }

    #[quickcheck]
    fn prop_never_more_lines_than_input(input: String) -> bool {
        parse_sub_questions(&input).len() <= input.lines().count()
    }

    #[tokio::test]
    async fn test_decompose_success() {
        let completion = Scripted::new(vec![Ok("What is A?\nWhat is B?".to_string())]);
        let decomposer = Decomposer::new(completion.clone(), fast_retry());
        let question = Question::new("Compare A and B").unwrap();

        let sub_questions = decomposer.decompose(&question).await.unwrap();
        assert_eq!(sub_questions, vec!["What is A?", "What is B?"]);
        assert!(completion.prompts.lock().unwrap()[0].contains("Compare A and B"));
    }

    #[tokio::test]
    async fn test_empty_response_is_failure() {
        let completion = Scripted::new(vec![Ok(String::new())]);
        let decomposer = Decomposer::new(completion.clone(), fast_retry());
        let question = Question::new("Compare A and B").unwrap();

        let result = decomposer.decompose(&question).await;
        assert!(matches!(
            result,
            Err(PipelineError::DecompositionFailure { source: None, .. })
        ));
        assert_eq!(completion.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let completion = Scripted::new(vec![
            Err(ServiceError::Unavailable("warming up".to_string())),
            Ok("What is A?".to_string()),
        ]);
        let decomposer = Decomposer::new(completion.clone(), fast_retry());
        let question = Question::new("What is A?").unwrap();

        let sub_questions = decomposer.decompose(&question).await.unwrap();
        assert_eq!(sub_questions.len(), 1);
        assert_eq!(completion.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_failure() {
        let completion = Scripted::new(vec![
            Err(ServiceError::Unavailable("down".to_string())),
            Err(ServiceError::Unavailable("down".to_string())),
            Err(ServiceError::Unavailable("down".to_string())),
        ]);
        let decomposer = Decomposer::new(completion, fast_retry());
        let question = Question::new("What is A?").unwrap();

        match decomposer.decompose(&question).await {
            Err(PipelineError::DecompositionFailure {
                source: Some(ServiceError::Exhausted { attempts, .. }),
                ..
            }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

//! The question/choices interaction the approval flow is built on.
//!
//! The core only ever sees [`PromptFn`]: a function from a [`Prompt`] to a
//! 1-indexed choice. Any TUI, GUI, or scripted automation can implement it;
//! [`terminal_prompt`] is the interactive terminal implementation. A prompt
//! error never grants anything: callers treat it the same as a rejection.

use dialoguer::Select;
use std::sync::Arc;
use warden_platform::{WardenError, WardenResult};

/// A question with a fixed, ordered list of choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// The question shown to the user.
    pub question: String,
    /// Choices, presented in order. Answers are 1-indexed.
    pub choices: Vec<String>,
}

/// The prompt adapter: returns the 1-indexed selected choice.
pub type PromptFn = Arc<dyn Fn(&Prompt) -> WardenResult<usize> + Send + Sync>;

/// Returns a [`PromptFn`] that asks on the controlling terminal.
pub fn terminal_prompt() -> PromptFn {
    Arc::new(|prompt: &Prompt| {
        let selection = Select::new()
            .with_prompt(prompt.question.clone())
            .items(&prompt.choices)
            .default(0)
            .interact()
            .map_err(|e| WardenError::Other(Box::new(e)))?;

        Ok(selection + 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompt_is_a_prompt_fn() {
        let prompt: PromptFn = Arc::new(|p: &Prompt| {
            assert_eq!(p.choices.len(), 2);
            Ok(2)
        });

        let answer = prompt(&Prompt {
            question: "Proceed?".to_string(),
            choices: vec!["No".to_string(), "Yes".to_string()],
        })
        .unwrap();

        assert_eq!(answer, 2);
    }

    #[test]
    fn test_prompt_errors_propagate() {
        let prompt: PromptFn =
            Arc::new(|_| Err(WardenError::Config("no interactive terminal".to_string())));

        let result = prompt(&Prompt {
            question: "Proceed?".to_string(),
            choices: vec!["No".to_string()],
        });

        assert!(matches!(result, Err(WardenError::Config(_))));
    }
}

//! ui::prompts
//!
//! Interactive password prompt.
//!
//! # Design
//!
//! Prompting is a capability ([`PasswordPrompt`]) so the dispatcher can be
//! driven without a terminal. [`TerminalPrompt`] reads masked input through
//! `rpassword`; [`StaticPrompt`] answers with a fixed value.

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("Password can't be empty")]
    Empty,

    #[error("IO error: {0}")]
    IoError(String),
}

/// Capability that asks the user for a password.
pub trait PasswordPrompt: Send + Sync {
    /// Ask for a password. An empty answer is an error.
    fn password(&self, message: &str) -> Result<String, PromptError>;
}

/// Masked prompt on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn password(&self, message: &str) -> Result<String, PromptError> {
        let value = rpassword::prompt_password(format!("{}: ", message)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::Interrupted
                || e.kind() == std::io::ErrorKind::UnexpectedEof
            {
                PromptError::Cancelled
            } else {
                PromptError::IoError(e.to_string())
            }
        })?;
        non_empty(value)
    }
}

/// Prompt answering with a fixed value, or failing when none is set.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompt {
    answer: Option<String>,
}

impl StaticPrompt {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
        }
    }

    /// A prompt the user always cancels.
    pub fn cancelled() -> Self {
        Self { answer: None }
    }
}

impl PasswordPrompt for StaticPrompt {
    fn password(&self, _message: &str) -> Result<String, PromptError> {
        match &self.answer {
            Some(answer) => non_empty(answer.clone()),
            None => Err(PromptError::Cancelled),
        }
    }
}

fn non_empty(value: String) -> Result<String, PromptError> {
    if value.is_empty() {
        Err(PromptError::Empty)
    } else {
        Ok(value)
    }
}

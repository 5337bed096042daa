use std::fmt;

use thiserror::Error;

/// Output of statement splitting: the whole block for single-shot transmission
/// plus the individually terminated statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    /// Comment-free text with newlines mapped to `\r`.
    pub block: String,
    pub statements: Vec<String>,
}

/// Source location of an unterminated construct, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExcerpt {
    pub first_line: usize,
    pub last_line: usize,
    pub text: String,
}

impl fmt::Display for SourceExcerpt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first_line == self.last_line {
            write!(f, "Line {}: {}", self.last_line, self.text)
        } else {
            write!(f, "Lines {}-{}: {}", self.first_line, self.last_line, self.text)
        }
    }
}

/// Syntax framing errors raised before anything is sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("Unbalanced quotes. {0}")]
    Quotes(SourceExcerpt),

    #[error("Unbalanced square brackets. {0}")]
    Brackets(SourceExcerpt),

    #[error("Unbalanced parentheses. {0}")]
    Parentheses(SourceExcerpt),

    #[error("Unbalanced curly braces. {0}")]
    Braces(SourceExcerpt),
}

impl SplitError {
    pub fn excerpt(&self) -> &SourceExcerpt {
        match self {
            SplitError::Quotes(e)
            | SplitError::Brackets(e)
            | SplitError::Parentheses(e)
            | SplitError::Braces(e) => e,
        }
    }
}

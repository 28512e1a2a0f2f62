//! Error types for the scorewave synthesis engine.

use std::fmt;

/// A malformed composition text source.
///
/// Carries the 1-based line and column of the offending token, matching the
/// `(line:column) message` convention of the format described by the composition
/// grammar. Parsing never recovers from an error; callers must fix the input and
/// re-parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{}) {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

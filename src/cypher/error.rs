use std::fmt;

/// A parser failure, always reported with the offending token's source
/// coordinates — the lexer/parser never panics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize, line: usize, column: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
            line,
            column,
        }
    }

    pub fn expected(what: &str, got: &str, position: usize, line: usize, column: usize) -> Self {
        ParseError::new(format!("expected {what}, got {got}"), position, line, column)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.message, self.line, self.column
        )
    }
}

impl std::error::Error for ParseError {}

// ABOUTME: Error types for lexing, parsing, and evaluation failures

use thiserror::Error;

/// A source position: 1-based line/column plus a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Debug, Clone)]
pub enum LexError {
    #[error("unterminated string starting at {0}")]
    UnterminatedString(Pos),
    #[error("unterminated comment starting at {0}")]
    UnterminatedComment(Pos),
    #[error("unexpected character {0:?} at {1}")]
    UnexpectedChar(char, Pos),
}

#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("{file}:{pos}: unexpected token {found}, expected {expected}")]
    UnexpectedToken {
        file: String,
        pos: Pos,
        found: String,
        expected: String,
    },
    #[error("{file}:{pos}: {source}")]
    Lex {
        file: String,
        pos: Pos,
        #[source]
        source: LexError,
    },
}

/// The error taxonomy of the evaluator core, per spec §7.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("value is not an attribute set")]
    NotAnAttrSet,

    #[error("attribute '{0}' not found")]
    AttributeNotFound(String),

    #[error("empty attribute path")]
    EmptyAttrPath,

    #[error("dynamic attribute name not allowed here")]
    DynamicAttrPath,

    #[error("value is not a function")]
    NotAFunction,

    #[error("pattern match failed for argument")]
    PatternMatchFailed,

    #[error("function call is missing argument '{0}'")]
    MissingAttribute(String),

    #[error("infinite recursion encountered")]
    InfiniteRecursion,

    #[error("assertion failed")]
    AssertionFailed,

    #[error("'with' requires an attribute set")]
    WithRequiresAttrSet,

    #[error("type error: {0}")]
    TypeError(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("list is empty")]
    EmptyList,

    #[error("{function}: expected {expected} argument(s), got {actual}")]
    InvalidArgCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("{0}")]
    ThrownError(String),

    #[error("evaluation aborted: {0}")]
    Aborted(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("unterminated string")]
    UnterminatedString,

    #[error("invalid flake: {0}")]
    InvalidFlake(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl EvalError {
    pub fn type_error(function: &str, expected: &str, actual_kind: &str) -> Self {
        EvalError::TypeError(format!("{function}: expected {expected}, got {actual_kind}"))
    }

    pub fn arity_error(function: &str, expected: impl Into<String>, actual: usize) -> Self {
        EvalError::InvalidArgCount {
            function: function.to_string(),
            expected: expected.into(),
            actual,
        }
    }
}

impl From<ParseError> for EvalError {
    fn from(e: ParseError) -> Self {
        EvalError::ParseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pos_display() {
        let p = Pos { line: 3, column: 7, offset: 40 };
        assert_eq!(format!("{p}"), "3:7");
    }

    #[test]
    fn type_error_message() {
        let e = EvalError::type_error("head", "list", "int");
        assert_eq!(e.to_string(), "type error: head: expected list, got int");
    }

    #[test]
    fn arity_error_message() {
        let e = EvalError::arity_error("elemAt", "2", 1);
        assert_eq!(e.to_string(), "elemAt: expected 2 argument(s), got 1");
    }
}

//! Error types for all compilation and execution phases.

use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unterminated string")]
    UnterminatedString,

    #[error("invalid integer literal '{0}'")]
    InvalidInteger(String),
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("no prefix parse rule for {0}")]
    NoPrefixRule(String),
}

impl ParserError {
    pub fn unexpected_token(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::UnexpectedToken {
            expected: "token".to_string(),
            found: err.to_string(),
        }
    }
}

/// Bytecode compilation errors. Messages are stable strings used by tests.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
}

/// Runtime errors surfaced by the VM and the tree-walking interpreter.
/// Messages are stable strings used by tests.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("calling non-function")]
    CallingNonFunction,

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("unsupported types for binary operation: {0} {1}")]
    UnsupportedBinaryTypes(&'static str, &'static str),

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum MarmotError {
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

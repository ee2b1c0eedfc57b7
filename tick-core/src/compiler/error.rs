//! Front-end error types.

use super::token::Coordinate;
use std::path::PathBuf;
use thiserror::Error;

/// Where a parse error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLocation {
    At(Coordinate),
    Eof,
}

impl std::fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLocation::At(coord) => write!(f, "{}", coord),
            ErrorLocation::Eof => write!(f, "EOF"),
        }
    }
}

/// A fatal syntax error. Parsing halts at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{location}] {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub location: ErrorLocation,
}

impl ParseError {
    pub fn at(kind: ParseErrorKind, coordinate: Coordinate) -> Self {
        Self {
            kind,
            location: ErrorLocation::At(coordinate),
        }
    }

    pub fn at_eof(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            location: ErrorLocation::Eof,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("Unexpected token {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },
    #[error("Unexpected token {found} at top level")]
    UnexpectedTopLevel { found: String },
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("Invalid number format: '{0}'")]
    InvalidNumber(String),
    #[error("Const declaration '{0}' requires an initializer")]
    ConstWithoutInitializer(String),
    #[error("Lex error: {0}")]
    Lex(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Semantic-pass errors. The pass is cumulative: it records every error
/// it finds and reports them together.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    #[error("Duplicate declaration of '{0}'")]
    DuplicateDeclaration(String),
    #[error("Duplicate method '{method}' in class '{class}'")]
    DuplicateMethod { class: String, method: String },
    #[error("Module '{module}' has no symbol '{name}'")]
    UnknownImport { module: String, name: String },
    #[error("{0}")]
    Resolve(#[from] ResolveError),
}

/// Module-loader errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("Module '{module}' not found (tried {tried:?})")]
    NotFound { module: String, tried: Vec<PathBuf> },
    #[error("Failed to read module '{path}': {message}")]
    Read { path: PathBuf, message: String },
    #[error("Failed to parse module '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

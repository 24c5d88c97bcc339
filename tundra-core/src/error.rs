//! Error types for tundra-core.
//!
//! Two families live here and they must not be confused:
//!
//! - [`EngineError`] is a fault in how the engine API was used (a bad
//!   binding name, an unknown cell). These are returned from engine calls.
//! - [`CellError`] is the payload of a `Rejected` binding. It describes why a
//!   cell's computation failed and is reported to the cell's output sink.
//!   A `CellError` never escapes the engine as a `Result::Err`.

use thiserror::Error;

use crate::graph::CellId;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine API itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A binding name that is not a legal identifier.
    #[error("invalid binding name `{0}`: expected an identifier")]
    InvalidName(String),

    /// Two cells tried to claim the same binding name.
    #[error("binding name `{name}` is already held by cell {owner}")]
    DuplicateName { name: String, owner: CellId },

    /// The cell is not known to the notebook or runtime.
    #[error("cell not found: {0}")]
    UnknownCell(CellId),

    /// A move target outside the notebook.
    #[error("position {index} is out of range for {len} cells")]
    OutOfRange { index: usize, len: usize },
}

/// Why a cell's computation was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    /// The source could not be parsed.
    #[error("SyntaxError: {message} (at offset {offset})")]
    Syntax { message: String, offset: usize },

    /// An identifier that is neither an input nor a helper.
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    /// An operation applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    Type(String),

    /// The computation threw (`throw` or the `fail` helper).
    #[error("Error: {0}")]
    Thrown(String),

    /// The binding sits on a dependency cycle and was not evaluated.
    #[error("circular definition: {name}")]
    CircularDependency { name: String },

    /// The script loader could not load a setup cell's URL.
    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },

    /// Function calls nested deeper than the configured limit.
    #[error("RangeError: maximum call depth of {0} exceeded")]
    CallDepth(usize),
}

impl CellError {
    /// Shorthand for a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Returns true if this rejection came from the cycle guard.
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}

/// Errors from reading a notebook document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// A code fence opened on `line` (1-based) was never closed.
    #[error("unterminated code fence opened on line {line}")]
    UnterminatedFence { line: usize },
}

/// Errors from loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// error.rs — Crate error taxonomy
//
// Every failure the bridge can report, from type classification through
// binding, marshalling, external stages and loading. Errors are raised
// immediately; nothing in the crate retries.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::diag::{codes, DiagCode, Diagnostic};
use crate::stage::StageId;

/// Result type for bridge operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Position of a value in a kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgPos {
    Arg(usize),
    Return,
    /// Trailing symbol slot, by symbol-table position.
    Symbol(usize),
}

impl fmt::Display for ArgPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgPos::Arg(i) => write!(f, "argument {}", i),
            ArgPos::Return => write!(f, "return value"),
            ArgPos::Symbol(i) => write!(f, "symbol slot {}", i),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A type outside {scalar, array, symbol} reached classification or marshalling.
    #[error("unsupported type `{ty}`: only scalars, arrays and symbols cross the kernel boundary")]
    UnsupportedType { ty: String },

    /// Value category or element kind does not match the declared type.
    #[error("{pos}: expected {expected}, found {found}")]
    TypeMismatch {
        pos: ArgPos,
        expected: String,
        found: String,
    },

    /// A literal declared dimension disagrees with the actual extent.
    #[error("{pos}, dimension {dim}: declared extent {expected}, found {actual}")]
    ShapeMismatch {
        pos: ArgPos,
        dim: usize,
        expected: u64,
        actual: u64,
    },

    /// A symbol resolves to two different values.
    #[error("symbol `{symbol}` is bound to {bound} but {pos}, dimension {dim} has extent {actual}")]
    SymbolConflict {
        symbol: String,
        bound: u64,
        actual: u64,
        pos: ArgPos,
        dim: usize,
    },

    /// Wrong number of call-site arguments.
    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// Marshalled word count disagrees with the prepared call interface.
    #[error("flat layout has {actual} words but the call interface expects {expected}")]
    LayoutMismatch { expected: usize, actual: usize },

    /// A return dimension names a symbol no argument binds.
    #[error("return dimension {dim} uses symbol `{symbol}`, which no argument binds")]
    UnboundSymbol { symbol: String, dim: usize },

    /// An external stage wrote to its error stream.
    #[error("stage `{stage}` ({program}) reported diagnostics:\n{diagnostics}")]
    ExternalTool {
        stage: StageId,
        program: String,
        diagnostics: String,
    },

    /// An external stage could not be started.
    #[error("stage `{stage}`: failed to run `{program}`: {source}")]
    Spawn {
        stage: StageId,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("entry `{name}` not found in {}: {source}", .path.display())]
    EntryNotFound {
        name: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The textual signature failed to lex or parse.
    #[error("invalid kernel signature:\n{}", render_diagnostics(.diagnostics))]
    Signature { diagnostics: Vec<Diagnostic> },

    #[error("toolchain config {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Stable diagnostic code for this error.
    pub fn code(&self) -> DiagCode {
        match self {
            Error::UnsupportedType { .. } => codes::E0100,
            Error::TypeMismatch { .. } => codes::E0101,
            Error::ShapeMismatch { .. } => codes::E0102,
            Error::SymbolConflict { .. } => codes::E0103,
            Error::Arity { .. } => codes::E0104,
            Error::UnboundSymbol { .. } => codes::E0105,
            Error::LayoutMismatch { .. } => codes::E0106,
            Error::ExternalTool { .. } => codes::E0200,
            Error::Spawn { .. } => codes::E0201,
            Error::Io { .. } => codes::E0202,
            Error::Load { .. } => codes::E0203,
            Error::EntryNotFound { .. } => codes::E0204,
            Error::Signature { diagnostics } => diagnostics
                .first()
                .and_then(|d| d.code)
                .unwrap_or(codes::E0002),
            Error::Config { .. } => codes::E0205,
        }
    }
}

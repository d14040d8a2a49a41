// diag.rs — Diagnostic codes and signature diagnostics
//
// Provides the stable diagnostic codes shared by every error the crate
// reports, plus the span-carrying `Diagnostic` produced by the signature
// parser.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::signature::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0103`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered codes.
///
/// `E00xx` signature notation, `E01xx` binding and marshalling,
/// `E02xx` pipeline and loading.
pub mod codes {
    use super::DiagCode;

    pub const E0001: DiagCode = DiagCode("E0001"); // unexpected character
    pub const E0002: DiagCode = DiagCode("E0002"); // syntax error
    pub const E0003: DiagCode = DiagCode("E0003"); // duplicate parameter name

    pub const E0100: DiagCode = DiagCode("E0100"); // unsupported type
    pub const E0101: DiagCode = DiagCode("E0101"); // type mismatch
    pub const E0102: DiagCode = DiagCode("E0102"); // shape mismatch
    pub const E0103: DiagCode = DiagCode("E0103"); // symbol conflict
    pub const E0104: DiagCode = DiagCode("E0104"); // arity
    pub const E0105: DiagCode = DiagCode("E0105"); // unbound return symbol
    pub const E0106: DiagCode = DiagCode("E0106"); // flat layout disagrees with call interface

    pub const E0200: DiagCode = DiagCode("E0200"); // external tool diagnostics
    pub const E0201: DiagCode = DiagCode("E0201"); // external tool could not start
    pub const E0202: DiagCode = DiagCode("E0202"); // artifact io
    pub const E0203: DiagCode = DiagCode("E0203"); // library load
    pub const E0204: DiagCode = DiagCode("E0204"); // entry symbol missing
    pub const E0205: DiagCode = DiagCode("E0205"); // toolchain config
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A located diagnostic from the signature front-end.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code or hint.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        write!(f, " at {}..{}", self.span.start, self.span.end)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

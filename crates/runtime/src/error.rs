//! Runtime error kinds
//!
//! Runtime errors terminate the current handler and propagate to the
//! host as a single diagnostic: kind, message, and the instruction index
//! that raised it. The language exposes no exception handling, so
//! nothing unwinds into user code.

/// The closed set of runtime error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Overflow,
    DivZero,
    BadCast,
    UnknownEndpoint,
    HostError,
    Cancelled,
}

impl ErrorKind {
    /// Dotted kind identifier as it appears in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Overflow => "runtime.overflow",
            ErrorKind::DivZero => "runtime.divzero",
            ErrorKind::BadCast => "runtime.bad_cast",
            ErrorKind::UnknownEndpoint => "runtime.unknown_endpoint",
            ErrorKind::HostError => "runtime.host_error",
            ErrorKind::Cancelled => "runtime.cancelled",
        }
    }
}

/// A runtime failure with its position in the instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Instruction index at which the error was raised
    pub at: usize,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, at: usize) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            at,
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (at instruction {})",
            self.kind.as_str(),
            self.message,
            self.at
        )
    }
}

impl std::error::Error for RuntimeError {}

/// How a program run ended. Cancellation is a cooperative stop, not a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// `Halt` executed; the program's halt code is 0
    Halted,
    /// The host signalled cancellation between two instructions
    Cancelled,
}

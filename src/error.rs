//! Error taxonomy for the parallel file container.
//!
//! Rendition of `p8est_file_error_class` / `p8est_file_error_string`:
//! every error a collective operation can raise is normalized to one of
//! four classes before it crosses the public API, and a count mismatch
//! is its own class distinct from a backend I/O failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FileError>;

/// The union of I/O backend errors, file-format errors, the
/// library-specific count-error class, and precondition violations.
#[derive(Error, Debug)]
pub enum FileError {
    /// The OS or collective-I/O backend itself failed (open/read/write/close).
    #[error("I/O backend error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic mismatch, bad version line, malformed ASCII header, unknown
    /// block type, missing padding sentinel, or a data-size disagreement
    /// between the file and the caller.
    #[error("file format error: {0}")]
    Format(String),

    /// A read or write returned fewer bytes than requested with no
    /// lower-level error flag set. Fatal; never collides with an I/O or
    /// format error.
    #[error("count error: expected {expected} bytes, moved {actual}")]
    Count { expected: usize, actual: usize },

    /// A precondition was violated (null pointer where forbidden,
    /// `N_global` mismatch, malformed partition map). Surfaced before any
    /// file access is attempted.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// The four public error classes, so callers never have to match on the
/// full `FileError` enum (mirrors `p8est_file_error_class`'s output domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Io,
    Format,
    Count,
    Invariant,
}

impl FileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FileError::Io(_) => ErrorClass::Io,
            FileError::Format(_) => ErrorClass::Format,
            FileError::Count { .. } => ErrorClass::Count,
            FileError::Invariant(_) => ErrorClass::Invariant,
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        FileError::Format(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        FileError::Invariant(msg.into())
    }

    pub fn count(expected: usize, actual: usize) -> Self {
        FileError::Count { expected, actual }
    }
}

/// Human-readable class name, the Rust equivalent of
/// `p8est_file_error_string`.
pub fn error_class_string(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::Io => "I/O backend error",
        ErrorClass::Format => "file format error",
        ErrorClass::Count => "count error",
        ErrorClass::Invariant => "invariant violation",
    }
}

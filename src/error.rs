//! Error types for the DWARF debug-information cache.
//!
//! Mirrors the `DwarfError`/`DwarfErrorKind` split used throughout
//! `symbolic-debuginfo`: a `Copy` enum of error kinds, plus a wrapper that
//! keeps an optional boxed source error for diagnostics.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// The kind of error produced while building or querying a [`Cache`](crate::cache::Cache).
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A structural violation of the DWARF format: a bad modifier byte, a bad
    /// array-subscript format, a bad line-program opcode, segmented aranges,
    /// invalid offsets, or a compile-unit mismatch.
    InvalidDwarf,

    /// An entity id points outside the bounds of its source section.
    InvalidReference,

    /// The requested attribute, and all of its inheritance fallbacks,
    /// produced no value. Callers use this to drive fallback chains; it must
    /// never poison a cache.
    SymbolNotFound,

    /// The execution context supplied by the caller (register scope, frame,
    /// memory view) was invalid for the requested operation.
    InvalidContext,

    /// A value read from section data or memory had an unexpected size.
    InvalidDataSize,

    /// A value read from section data or memory had an unexpected type.
    InvalidDataType,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidDwarf => "corrupted or structurally invalid dwarf data",
            Self::InvalidReference => "entity reference points outside its section",
            Self::SymbolNotFound => "attribute not found",
            Self::InvalidContext => "invalid execution context",
            Self::InvalidDataSize => "invalid size of dwarf attribute value",
            Self::InvalidDataType => "invalid type of dwarf attribute value",
        };
        f.write_str(msg)
    }
}

/// An error produced by this crate.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    /// Creates a new error of the given kind without an attached source.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Creates a new error of the given kind, keeping `source` for `Display`/`source()`.
    pub fn with_source<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<gimli::read::Error> for Error {
    fn from(e: gimli::read::Error) -> Self {
        Self::with_source(ErrorKind::InvalidDwarf, e)
    }
}

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

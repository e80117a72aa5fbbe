//! Error taxonomy for handle operations.

use std::borrow::Cow;

use thiserror::Error;

/// Text recorded when an operation needs an open library.
pub const NOT_OPEN_MESSAGE: &str = "Handle not open.";

/// Why a handle operation did not produce a result.
///
/// None of these are fatal; the handle stays usable. The same text is
/// recorded in [`Handle::error`](crate::Handle::error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DlError {
    /// The handle has no open library.
    #[error("{}", NOT_OPEN_MESSAGE)]
    NotOpen,
    /// The loader could not open the library.
    #[error("failed to load '{name}': {message}")]
    LoadFailed { name: String, message: String },
    /// The name does not resolve in the open library.
    #[error("symbol '{symbol}' not found: {message}")]
    SymbolNotFound { symbol: String, message: String },
    /// Library or symbol names cannot contain NUL bytes.
    #[error("name '{name}' contains an interior NUL byte")]
    InvalidName { name: String },
    /// The symbol resolved, but to a null address.
    #[error("symbol '{symbol}' resolved to a null address")]
    EmptySymbol { symbol: String },
    /// The factory ran and returned a null object.
    #[error("factory '{symbol}' returned a null object")]
    NullObject { symbol: String },
}

/// Fieldless view of [`DlError`] for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotOpen,
    LoadFailed,
    SymbolNotFound,
    InvalidName,
    EmptySymbol,
    NullObject,
}

impl DlError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOpen => ErrorKind::NotOpen,
            Self::LoadFailed { .. } => ErrorKind::LoadFailed,
            Self::SymbolNotFound { .. } => ErrorKind::SymbolNotFound,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::EmptySymbol { .. } => ErrorKind::EmptySymbol,
            Self::NullObject { .. } => ErrorKind::NullObject,
        }
    }

    /// The text a handle records for this error.
    ///
    /// Loader failures record the loader's own message verbatim; the rest
    /// record their display form.
    #[must_use]
    pub fn diagnostic(&self) -> Cow<'_, str> {
        match self {
            Self::LoadFailed { message, .. } | Self::SymbolNotFound { message, .. } => {
                Cow::Borrowed(message)
            }
            Self::NotOpen => Cow::Borrowed(NOT_OPEN_MESSAGE),
            other => Cow::Owned(other.to_string()),
        }
    }
}

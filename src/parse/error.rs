//! Errors raised by [`Parser`](super::Parser) methods
//!
//! Whatever the variant, a `ParseError` tells the caller that the input
//! does not hold what the piece definition describes: the input is
//! malformed. [`WindowError`] covers consuming bytes and managing context
//! windows; [`InternalError`] is reserved for bugs in a `Parser`
//! implementation.

use std::fmt::{Display, Formatter, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Window(WindowError),
    Internal(InternalError),
    /// A whole-buffer decode finished with this many bytes unread
    TrailingBytes { residual: usize },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ParseError::Window(err) => {
                write!(f, "Context-window error: {}", err)
            }
            ParseError::Internal(err) => {
                write!(f, "Internal error: {}", err)
            }
            ParseError::TrailingBytes { residual } => {
                write!(f, "{} unconsumed bytes after end of value", residual)
            }
        }
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    /// Reading `requested` bytes at `offset` would pass `limit`, the end of
    /// the innermost window or of the buffer.
    ///
    /// Truncated input is reported this way, including a repeat count
    /// computed by a dependency that asks for more bytes than remain.
    ConsumeWouldExceedLimit {
        offset: usize,
        requested: usize,
        limit: usize,
    },
    /// A window of `request` bytes would run past the end of the buffer
    OpenWouldExceedBuffer { bytes_left: usize, request: usize },
    /// A window would end after the innermost window already open
    OpenWouldExceedWindow { limit: usize, request: usize },
    /// A window was closed with bytes left unread
    CloseWithResidue { residual: usize },
    /// No window was open to close
    CloseWithoutWindow,
    /// The cursor has passed the end of the innermost window, which only a
    /// faulty `Parser` can cause
    OffsetOverflow { excess: usize },
}

impl From<WindowError> for ParseError {
    fn from(err: WindowError) -> Self {
        Self::Window(err)
    }
}

impl Display for WindowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match *self {
            WindowError::ConsumeWouldExceedLimit {
                offset,
                requested,
                limit,
            } => write!(
                f,
                "needed {} bytes at offset {}, but the view ends at {}",
                requested, offset, limit
            ),
            WindowError::OpenWouldExceedBuffer {
                bytes_left,
                request,
            } => write!(
                f,
                "{}-byte window requested with {} bytes left in the buffer",
                request, bytes_left
            ),
            WindowError::OpenWouldExceedWindow { limit, request } => write!(
                f,
                "window ending at {} does not nest in the window ending at {}",
                request, limit
            ),
            WindowError::CloseWithResidue { residual } => {
                write!(f, "window closed with {} bytes unread", residual)
            }
            WindowError::CloseWithoutWindow => f.write_str("no window to close"),
            WindowError::OffsetOverflow { excess } => write!(
                f,
                "bug: offset is {} bytes past the end of its window",
                excess
            ),
        }
    }
}

/// Broken `Parser` invariants, never caused by the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalError {
    ConsumeLengthMismatch { expected: usize, actual: usize },
}

impl From<InternalError> for ParseError {
    fn from(ierr: InternalError) -> Self {
        Self::Internal(ierr)
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            InternalError::ConsumeLengthMismatch { expected, actual } => {
                write!(
                    f,
                    "bug: consume({}) returned slice of length {}",
                    expected, actual
                )
            }
        }
    }
}

/// Copies a consumed slice into an array of its expected length
pub(crate) fn coerce_slice<const N: usize>(bytes: &'_ [u8]) -> ParseResult<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        InternalError::ConsumeLengthMismatch {
            expected: N,
            actual: bytes.len(),
        }
        .into()
    })
}

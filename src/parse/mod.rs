//! Custom parsing model with byte-level precision
//!
//! This module, along with its submodules, provides the fundamental
//! definitions related to the abstract task of processing raw sequences
//! of binary data into the primitive values held by the retrievers of a
//! [`Piece`](crate::piece::Piece).
//!
//! # Layout
//!
//! The top-level of this module defines the [`Parser`] trait, and the
//! sub-module `error` defines the hierarchy of error cases that can be
//! encountered when something goes wrong during a call to a `Parser`
//! method. The only implementing type is [`ByteParser`](byteparser::ByteParser),
//! a cursor over a borrowed, fully in-memory byte buffer.
//!
//! # Byte order
//!
//! All multi-byte `take_*` methods interpret the consumed bytes as
//! little-endian, which is the byte order of every format this crate
//! is used to describe.

pub mod error;

pub use error::ParseResult;

/// Stateful, forward-only reader over a byte buffer
///
/// Bytes are only ever read by consuming them, in order, and a consumed
/// byte cannot be read again. A *context window* can be opened over the
/// next `n` bytes; until it is closed with
/// [`enforce_target`](Parser::enforce_target), nothing past its end can be
/// consumed.
///
/// Implementations keep these properties:
///
/// * `self.remainder()` is the largest `n` for which `self.consume(n)` succeeds
/// * a failed `consume` leaves `self.offset()` unchanged
/// * right after `self.set_fit(n)` succeeds, `self.remainder()` is `n`
pub trait Parser {
    /// End of the readable view: the innermost window, or else the buffer
    fn view_len(&self) -> usize;

    /// Number of bytes consumed since the start of the buffer
    fn offset(&self) -> usize;

    /// Bytes that can still be consumed in the current view
    fn remainder(&self) -> usize {
        self.view_len() - self.offset()
    }

    /// Consumes and returns the next `nbytes` bytes.
    ///
    /// Returns `Ok(s)` with `s.len() == nbytes` exactly when doing so stays
    /// within the current view.
    fn consume(&mut self, nbytes: usize) -> ParseResult<&[u8]>;

    /// Opens a window permitting exactly `n` more bytes to be consumed
    fn set_fit(&mut self, n: usize) -> ParseResult<()>;

    /// Closes the innermost window.
    ///
    /// Fails if no window is open, or if the window still has bytes left.
    fn enforce_target(&mut self) -> ParseResult<()>;

    /// Consumes `N` bytes and returns them in array-form
    fn consume_arr<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        error::coerce_slice(self.consume(N)?)
    }

    /// Consumes one byte and returns it as a `u8` value
    #[inline]
    fn take_u8(&mut self) -> ParseResult<u8> {
        self.consume_arr::<1>().map(u8::from_le_bytes)
    }

    /// Consumes one byte and returns it as an `i8` value
    #[inline]
    fn take_i8(&mut self) -> ParseResult<i8> {
        self.consume_arr::<1>().map(i8::from_le_bytes)
    }

    /// Consumes two bytes and returns the corresponding `u16` value
    #[inline]
    fn take_u16(&mut self) -> ParseResult<u16> {
        self.consume_arr::<2>().map(u16::from_le_bytes)
    }

    /// Consumes two bytes and returns the corresponding `i16` value
    #[inline]
    fn take_i16(&mut self) -> ParseResult<i16> {
        self.consume_arr::<2>().map(i16::from_le_bytes)
    }

    /// Consumes four bytes and returns the corresponding `u32` value
    #[inline]
    fn take_u32(&mut self) -> ParseResult<u32> {
        self.consume_arr::<4>().map(u32::from_le_bytes)
    }

    /// Consumes four bytes and returns the corresponding `i32` value
    #[inline]
    fn take_i32(&mut self) -> ParseResult<i32> {
        self.consume_arr::<4>().map(i32::from_le_bytes)
    }

    /// Consumes eight bytes and returns the corresponding `u64` value
    #[inline]
    fn take_u64(&mut self) -> ParseResult<u64> {
        self.consume_arr::<8>().map(u64::from_le_bytes)
    }

    /// Consumes eight bytes and returns the corresponding `i64` value
    #[inline]
    fn take_i64(&mut self) -> ParseResult<i64> {
        self.consume_arr::<8>().map(i64::from_le_bytes)
    }

    /// Consumes four bytes and returns the corresponding `f32` value
    #[inline]
    fn take_f32(&mut self) -> ParseResult<f32> {
        self.consume_arr::<4>().map(f32::from_le_bytes)
    }

    /// Consumes eight bytes and returns the corresponding `f64` value
    #[inline]
    fn take_f64(&mut self) -> ParseResult<f64> {
        self.consume_arr::<8>().map(f64::from_le_bytes)
    }

    /// Consumes and returns a `Vec<u8>` of length `nbytes`, following
    /// the same behavioral guarantees as [`consume`](Parser::consume).
    #[inline]
    fn take_dynamic(&mut self, nbytes: usize) -> ParseResult<Vec<u8>> {
        self.consume(nbytes).map(Vec::from)
    }
}

pub mod byteparser {
    use crate::internal::offset::{ContextOffset, IndexTracker};

    use super::error::{ParseError, ParseResult, WindowError};
    use super::Parser;

    /// Cursor over a borrowed byte buffer
    ///
    /// The buffer is the whole input (for instance a file read into memory
    /// beforehand); the cursor only ever moves forward.
    #[derive(Debug)]
    pub struct ByteParser<'a> {
        buffer: &'a [u8],
        offset: ContextOffset,
    }

    impl<'a> ByteParser<'a> {
        /// Creates a `ByteParser` with an offset of 0 and no context windows.
        pub fn new(buffer: &'a [u8]) -> Self {
            let offset = ContextOffset::with_limit(buffer.len());
            Self { buffer, offset }
        }

        /// Creates a `ByteParser` whose first unconsumed byte is `buffer[start]`.
        ///
        /// Fails if `start` lies beyond the end of the buffer.
        pub fn at(buffer: &'a [u8], start: usize) -> ParseResult<Self> {
            let mut ret = Self::new(buffer);
            ret.consume(start)?;
            Ok(ret)
        }
    }

    impl Parser for ByteParser<'_> {
        #[inline]
        fn view_len(&self) -> usize {
            self.offset.limit()
        }

        #[inline]
        fn offset(&self) -> usize {
            self.offset.index()
        }

        fn consume(&mut self, nbytes: usize) -> ParseResult<&[u8]> {
            let (ix, adv) = self.offset.advance(nbytes);
            if adv {
                Ok(&self.buffer[ix..ix + nbytes])
            } else {
                Err(ParseError::Window(WindowError::ConsumeWouldExceedLimit {
                    offset: ix,
                    requested: nbytes,
                    limit: self.view_len(),
                }))
            }
        }

        #[inline]
        fn set_fit(&mut self, n: usize) -> ParseResult<()> {
            self.offset.set_fit(n)
        }

        #[inline]
        fn enforce_target(&mut self) -> ParseResult<()> {
            self.offset.enforce_target()
        }
    }
}

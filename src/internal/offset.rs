//! Cursor state of [`ByteParser`](crate::parse::byteparser::ByteParser)
//!
//! [`ContextOffset`] couples a forward-only index into the buffer with the
//! stack of context windows currently open over it. The innermost window
//! bounds how far the index may advance.

use std::cmp::Ordering;

use crate::parse::error::{ParseError, ParseResult, WindowError};

/// Forward-only index over an array-like buffer, bounded by a limit it may
/// reach but never pass.
pub trait IndexTracker {
    /// Tracker starting at index `0`, never allowed past `abs`
    #[must_use]
    fn with_limit(abs: usize) -> Self;

    #[must_use]
    fn index(&self) -> usize;

    /// Current bound on the index; never above the one given to
    /// [`with_limit`](IndexTracker::with_limit)
    #[must_use]
    fn limit(&self) -> usize;

    /// Advances the index by exactly `n` if that stays within
    /// [`limit`](IndexTracker::limit), and leaves it alone otherwise.
    ///
    /// Returns the index before the call and whether it moved.
    fn advance(&mut self, n: usize) -> (usize, bool);
}

/// Target offsets of the open context windows, innermost last.
///
/// Each window nests in the one below it, so the targets never increase
/// from bottom to top.
#[derive(Debug, Default)]
struct FrameStack(Vec<usize>);

impl FrameStack {
    fn innermost(&self) -> Option<usize> {
        self.0.last().copied()
    }

    fn open(&mut self, target: usize) -> Result<(), WindowError> {
        match self.innermost() {
            Some(limit) if target > limit => Err(WindowError::OpenWouldExceedWindow {
                limit,
                request: target,
            }),
            _ => {
                self.0.push(target);
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Option<usize> {
        self.0.pop()
    }
}

#[derive(Debug)]
pub struct ContextOffset {
    abs: usize,
    frames: FrameStack,
    cur: usize,
}

impl ContextOffset {
    /// Opens a window of `winsize` bytes from the current index.
    ///
    /// Fails if the window would run past the end of the buffer, or past
    /// the innermost window already open.
    pub fn set_fit(&mut self, winsize: usize) -> ParseResult<()> {
        match self.cur.checked_add(winsize) {
            Some(target) if target <= self.abs => Ok(self.frames.open(target)?),
            _ => Err(ParseError::Window(WindowError::OpenWouldExceedBuffer {
                bytes_left: self.abs - self.cur,
                request: winsize,
            })),
        }
    }

    /// Closes the innermost window, which must be fully consumed.
    ///
    /// The window is closed even when residual bytes make this fail.
    pub fn enforce_target(&mut self) -> ParseResult<()> {
        let target = self
            .frames
            .close()
            .ok_or(ParseError::Window(WindowError::CloseWithoutWindow))?;
        match Self::compare(target, self.cur)? {
            0 => Ok(()),
            residual => Err(ParseError::Window(WindowError::CloseWithResidue { residual })),
        }
    }

    /// Bytes left before `target`; an index beyond it is a parser bug
    fn compare(target: usize, cur: usize) -> ParseResult<usize> {
        match target.cmp(&cur) {
            Ordering::Less => Err(ParseError::Window(WindowError::OffsetOverflow {
                excess: cur - target,
            })),
            _ => Ok(target - cur),
        }
    }
}

impl IndexTracker for ContextOffset {
    fn with_limit(abs: usize) -> Self {
        Self {
            abs,
            frames: FrameStack::default(),
            cur: 0,
        }
    }

    #[inline]
    fn index(&self) -> usize {
        self.cur
    }

    /// End of the innermost window, or of the buffer when none is open
    #[inline]
    fn limit(&self) -> usize {
        self.frames.innermost().unwrap_or(self.abs)
    }

    #[inline]
    fn advance(&mut self, n: usize) -> (usize, bool) {
        let start = self.cur;
        match start.checked_add(n) {
            Some(end) if end <= self.limit() => {
                self.cur = end;
                (start, true)
            }
            _ => (start, false),
        }
    }
}

/// Marker trait for byte-oriented buffers with incremental append operations
///
/// In most ways, it is convenient to think of `Target` as an analogous trait to
/// [`std::io::Write`]. The principal difference between the two is the fact
/// that the `push_XXX` methods on `Target` are infallible and total (as opposed
/// to partial) by design; while they return a `usize` value representing the
/// number of bytes written, this is used only for summary book-keeping on the
/// caller side, rather than a feedback mechanism that may indicate failure or
/// partial success, as is the case for `std::io::Write::write`.
///
/// A `Target` is never rolled back. When encoding fails partway through a
/// field or piece, the bytes of the elements encoded before the failure
/// remain in the buffer, which should then be discarded.
pub trait Target {
    /// Reserves room for at least `extra` more bytes, where that is meaningful.
    fn anticipate(&mut self, extra: usize);

    /// Returns a fresh object of the `Self` type with an initially empty buffer.
    fn create() -> Self;

    /// Appends a single byte to a Target object.
    ///
    /// The return value must be `1`.
    fn push_one(&mut self, b: u8) -> usize;

    /// Appends the bytes in a known-length array to a Target object.
    ///
    /// The operational semantics of this method should be indistinguishable from repeated
    /// calls to `push_one` over every element of the array in order, intercalated with
    /// binary addition:
    ///
    /// ```ignore
    /// x.push_many(b"Rust") === x.push_one(b'R') + x.push_one(b'u') + x.push_one(b's') + x.push_one(b't')
    /// ```
    ///
    /// The return value must be `N`.
    fn push_many<const N: usize>(&mut self, arr: [u8; N]) -> usize;

    /// Appends the bytes in an arbitrary-length byte-slice to a Target object.
    ///
    /// The return value must be the total length of the slice.
    fn push_all(&mut self, buf: &[u8]) -> usize;
}

/// Useful alias for `std::io::Sink` that is used to count the number of
/// bytes required to serialize a piece, without performing any memory
/// operations.
pub type ByteCounter = std::io::Sink;

impl Target for ByteCounter {
    #[inline(always)]
    fn anticipate(&mut self, _: usize) {}

    #[inline]
    fn create() -> Self {
        std::io::sink()
    }

    #[inline(always)]
    fn push_one(&mut self, _: u8) -> usize {
        1
    }

    #[inline(always)]
    fn push_many<const N: usize>(&mut self, _: [u8; N]) -> usize {
        N
    }

    #[inline(always)]
    fn push_all(&mut self, buf: &[u8]) -> usize {
        buf.len()
    }
}

impl Target for Vec<u8> {
    #[inline]
    fn anticipate(&mut self, extra: usize) {
        self.reserve(extra)
    }

    #[inline]
    fn create() -> Self {
        Self::new()
    }

    #[inline]
    fn push_one(&mut self, b: u8) -> usize {
        self.push(b);
        1
    }

    #[inline]
    fn push_many<const N: usize>(&mut self, arr: [u8; N]) -> usize {
        self.extend_from_slice(&arr);
        N
    }

    #[inline]
    fn push_all(&mut self, buf: &[u8]) -> usize {
        self.extend_from_slice(buf);
        buf.len()
    }
}

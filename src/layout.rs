//! Multi-piece documents
//!
//! A [`Layout`] is the ordered list of pieces that make up a whole file.
//! Pieces are decoded one after the other over a single advancing cursor,
//! so a piece may depend on fields of any piece before it, through
//! [`FieldRef::sibling`](crate::dependency::FieldRef::sibling).

use std::sync::Arc;

use log::debug;

use crate::conv::target::{ByteCounter, Target};
use crate::error::{DefinitionError, Result, ValueError};
use crate::parse::byteparser::ByteParser;
use crate::parse::Parser;
use crate::piece::{check_blank, Piece, PieceDef};

/// Validated, ordered list of piece definitions
#[derive(Clone, Debug)]
pub struct Layout {
    pieces: Vec<Arc<PieceDef>>,
}

impl Layout {
    /// # Errors
    ///
    /// * `DuplicatePiece` if two pieces share a name
    /// * `UnknownPiece` if a sibling dependency names a piece not in the layout
    /// * `PieceOutOfOrder` if it names the piece itself or one after it
    /// * `UnknownField` if the named piece has no such field
    /// * `InvalidDefault` if a sibling field's default yields an unusable
    ///   repeat count
    pub fn try_new(pieces: Vec<Arc<PieceDef>>) -> std::result::Result<Self, DefinitionError> {
        for (k, def) in pieces.iter().enumerate() {
            if pieces[..k].iter().any(|d| d.name() == def.name()) {
                return Err(DefinitionError::DuplicatePiece(def.name().to_owned()));
            }
        }
        for (k, def) in pieces.iter().enumerate() {
            for (_, sibling, field) in def.sibling_refs() {
                let at = pieces
                    .iter()
                    .position(|d| d.name() == sibling)
                    .ok_or_else(|| DefinitionError::UnknownPiece {
                        piece: def.name().to_owned(),
                        sibling: sibling.to_owned(),
                    })?;
                if at >= k {
                    return Err(DefinitionError::PieceOutOfOrder {
                        piece: def.name().to_owned(),
                        sibling: sibling.to_owned(),
                    });
                }
                if pieces[at].position(field).is_none() {
                    return Err(DefinitionError::UnknownField {
                        piece: sibling.to_owned(),
                        field: field.to_owned(),
                    });
                }
            }
        }
        let mut blanks: Vec<Piece> = Vec::with_capacity(pieces.len());
        for def in &pieces {
            let blank = check_blank(def, blanks.as_slice())?;
            blanks.push(blank);
        }
        Ok(Self { pieces })
    }

    /// # Panics
    ///
    /// Panics where [`try_new`](Layout::try_new) would fail.
    #[must_use]
    pub fn new(pieces: Vec<Arc<PieceDef>>) -> Self {
        match Self::try_new(pieces) {
            Ok(layout) => layout,
            Err(err) => panic!("invalid layout: {}", err),
        }
    }

    #[must_use]
    pub fn pieces(&self) -> &[Arc<PieceDef>] {
        &self.pieces
    }
}

/// Every piece of a [`Layout`], decoded or defaulted
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pieces: Vec<Piece>,
}

impl Document {
    /// Decodes each piece of `layout` in turn from `p`
    pub fn decode_from<P: Parser>(layout: &Layout, p: &mut P) -> Result<Self> {
        let start = p.offset();
        let mut pieces: Vec<Piece> = Vec::with_capacity(layout.pieces.len());
        for def in &layout.pieces {
            let mut piece = Piece::new(def);
            piece.decode(p, pieces.as_slice())?;
            pieces.push(piece);
        }
        debug!(
            "decoded document of {} pieces: {} bytes at offset {}",
            pieces.len(),
            p.offset() - start,
            start
        );
        Ok(Self { pieces })
    }

    /// Decodes starting at `buffer[offset]`, returning the document and the
    /// number of bytes consumed.
    pub fn decode(layout: &Layout, buffer: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut p = ByteParser::at(buffer, offset)?;
        let doc = Self::decode_from(layout, &mut p)?;
        Ok((doc, p.offset() - offset))
    }

    /// Decodes from the start of `buffer`.
    ///
    /// With the `check_complete_parse` feature, fails with
    /// [`TrailingBytes`](crate::parse::error::ParseError::TrailingBytes)
    /// unless the whole buffer is consumed; otherwise trailing bytes are
    /// logged and ignored.
    pub fn decode_all(layout: &Layout, buffer: &[u8]) -> Result<Self> {
        let (doc, n) = Self::decode(layout, buffer, 0)?;
        if n != buffer.len() {
            cfg_if::cfg_if! {
                if #[cfg(feature = "check_complete_parse")] {
                    return Err(crate::parse::error::ParseError::TrailingBytes {
                        residual: buffer.len() - n,
                    }
                    .into());
                } else {
                    log::warn!("document left {} trailing bytes", buffer.len() - n);
                }
            }
        }
        Ok(doc)
    }

    /// Builds every piece blank, each resolving sibling dependencies
    /// against the blank pieces before it
    #[must_use]
    pub fn blank(layout: &Layout) -> Self {
        let mut pieces: Vec<Piece> = Vec::with_capacity(layout.pieces.len());
        for def in &layout.pieces {
            let piece = Piece::blank_in(def, pieces.as_slice());
            pieces.push(piece);
        }
        Self { pieces }
    }

    #[must_use]
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    #[must_use]
    pub fn piece(&self, name: &str) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.name() == name)
    }

    pub fn piece_mut(&mut self, name: &str) -> Option<&mut Piece> {
        self.pieces.iter_mut().find(|p| p.name() == name)
    }

    /// Applies the on-commit rules of every piece
    pub fn commit(&mut self) -> std::result::Result<(), ValueError> {
        self.pieces.iter_mut().try_for_each(Piece::commit)
    }

    pub fn write_to<U: Target>(&self, buf: &mut U) -> Result<usize> {
        let mut written = 0;
        for piece in &self.pieces {
            written += piece.write_to(buf)?;
        }
        Ok(written)
    }

    /// Concatenates the encodings of every piece, in layout order
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Target::create();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn encoded_len(&self) -> Result<usize> {
        let mut counter: ByteCounter = Target::create();
        self.write_to(&mut counter)
    }
}

#[cfg(feature = "serde_impls")]
impl serde::Serialize for Document {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.pieces.len()))?;
        for piece in &self.pieces {
            map.serialize_entry(piece.name(), piece)?;
        }
        map.end()
    }
}

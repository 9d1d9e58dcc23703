//! Pieces: ordered groups of retrievers
//!
//! A [`PieceDef`] is the validated, shareable description of a piece: its
//! retrievers in wire order, plus the dependency rules between them,
//! resolved to retriever positions when the definition is built. A
//! [`Piece`] is one instance of a definition, holding a value for every
//! retriever.
//!
//! # Definitions
//!
//! ```
//! use piecework::datatype::Primitive;
//! use piecework::dependency::{Dependency, Eval, FieldRef};
//! use piecework::piece::{Piece, PieceDef};
//! use piecework::retriever::RetrieverDef;
//!
//! let def = PieceDef::builder("Names")
//!     .field(RetrieverDef::new("count", Primitive::U16))
//!     .field(
//!         RetrieverDef::new("names", "str16".parse::<Primitive>().unwrap())
//!             .on_construct(Dependency::set_repeat(FieldRef::this("count"), Eval::Copy)),
//!     )
//!     .build();
//!
//! let bytes = [0x01, 0x00, 0x02, 0x00, b'h', b'i'];
//! let (piece, consumed) = Piece::from_bytes(&def, &bytes, 0).unwrap();
//! assert_eq!(consumed, 6);
//! assert_eq!(piece.encode().unwrap(), bytes);
//! ```
//!
//! Building a definition checks that no two retrievers share a name, that
//! every on-construct dependency reads a retriever decoded before its
//! target, and that the blank piece built from the defaults is consistent
//! with its own dependencies and encodable. [`PieceBuilder::build`] panics
//! on a violation, since it can only come from a mistake in the format
//! description; [`PieceBuilder::try_build`] returns it instead.
//!
//! # Lifecycle
//!
//! A piece starts [`Uninitialized`](PieceState::Uninitialized) (holding
//! declared-repeat defaults), and becomes either
//! [`Decoded`](PieceState::Decoded) through one of the `decode*` methods, or
//! [`Defaulted`](PieceState::Defaulted) when built by [`Piece::blank`]. A
//! failed decode leaves it in [`Decoding`](PieceState::Decoding), naming the
//! retriever that failed; its contents are then not meaningful.
//!
//! Mutating a value never re-derives the repeat counts of retrievers that
//! depend on it; those are only computed while decoding or defaulting.

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use log::{debug, trace};

use crate::conv::target::{ByteCounter, Target};
use crate::conv::FieldCodec;
use crate::datatype::Kind;
use crate::dependency::{Dependency, DependencyAction, Scope};
use crate::error::{DefinitionError, Error, Result, ValueError};
use crate::parse::byteparser::ByteParser;
use crate::parse::Parser;
use crate::retriever::{Retriever, RetrieverDef};
use crate::value::{FieldValue, Value};

#[derive(Clone, Debug)]
enum Source {
    /// Position of a retriever of the same piece
    Local(usize),
    Sibling { piece: String, field: String },
}

#[derive(Clone, Debug)]
struct Rule {
    source: Source,
    dep: Dependency,
}

/// Validated description of a piece
#[derive(Debug)]
pub struct PieceDef {
    name: String,
    retrievers: Vec<RetrieverDef>,
    positions: HashMap<String, usize>,
    construct: Vec<Option<Rule>>,
    commit: Vec<Option<Rule>>,
}

impl PieceDef {
    /// Starts a definition of a piece called `name`
    pub fn builder(name: impl Into<String>) -> PieceBuilder {
        PieceBuilder {
            name: name.into(),
            retrievers: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retriever declarations, in wire order
    #[must_use]
    pub fn retrievers(&self) -> &[RetrieverDef] {
        &self.retrievers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.retrievers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retrievers.is_empty()
    }

    /// Wire-order position of the retriever `name`
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    #[must_use]
    pub fn retriever(&self, name: &str) -> Option<&RetrieverDef> {
        self.position(name).map(|ix| &self.retrievers[ix])
    }

    /// Encoded width shared by every instance, if no retriever has a
    /// dependency-driven repeat or a value-dependent width.
    #[must_use]
    pub fn fixed_width(&self) -> Option<usize> {
        if self.construct.iter().any(Option::is_some) {
            return None;
        }
        self.retrievers
            .iter()
            .map(|r| r.datatype().fixed_width())
            .sum()
    }

    /// Sibling-scoped on-construct references, as
    /// `(target field, sibling piece, sibling field)`
    pub(crate) fn sibling_refs(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.construct
            .iter()
            .zip(&self.retrievers)
            .filter_map(|(rule, r)| match rule {
                Some(Rule {
                    source: Source::Sibling { piece, field },
                    ..
                }) => Some((r.name(), piece.as_str(), field.as_str())),
                _ => None,
            })
    }
}

/// Accumulates retriever declarations for a [`PieceDef`]
#[derive(Debug)]
pub struct PieceBuilder {
    name: String,
    retrievers: Vec<RetrieverDef>,
}

impl PieceBuilder {
    /// Appends a retriever after those already declared
    #[must_use]
    pub fn field(mut self, retriever: RetrieverDef) -> Self {
        self.retrievers.push(retriever);
        self
    }

    /// Validates and resolves the definition.
    ///
    /// # Errors
    ///
    /// * `DuplicateField` if two retrievers share a name
    /// * `UnknownField` if a same-piece dependency names a missing retriever
    /// * `SelfReference` if a dependency reads its own target
    /// * `ForwardReference` if an on-construct dependency reads a retriever
    ///   at or after its target
    /// * `InvalidAction` if an on-construct rule does not set a repeat, an
    ///   on-commit rule does not set a value, an on-commit rule reads a
    ///   sibling piece, or an on-commit rule targets a non-integer field
    /// * `ZeroWidthRepeat` if an on-construct rule drives the repeat of a
    ///   kind that occupies no bytes
    /// * `InvalidDefault` if a same-piece rule cannot be applied to the
    ///   defaults, or a default cannot be encoded
    pub fn try_build(self) -> std::result::Result<Arc<PieceDef>, DefinitionError> {
        let PieceBuilder { name, retrievers } = self;

        let mut positions = HashMap::with_capacity(retrievers.len());
        for (ix, r) in retrievers.iter().enumerate() {
            if positions.insert(r.name().to_owned(), ix).is_some() {
                return Err(DefinitionError::DuplicateField {
                    piece: name,
                    field: r.name().to_owned(),
                });
            }
        }

        let mut construct = Vec::with_capacity(retrievers.len());
        let mut commit = Vec::with_capacity(retrievers.len());
        for (ix, r) in retrievers.iter().enumerate() {
            let on_construct = match r.construct_dependency() {
                Some(_) if r.datatype().kind().fixed_width() == Some(0) => {
                    return Err(DefinitionError::ZeroWidthRepeat {
                        piece: name,
                        field: r.name().to_owned(),
                    });
                }
                Some(dep) => Some(resolve(&name, &positions, ix, r, dep, true)?),
                None => None,
            };
            let on_commit = match r.commit_dependency() {
                Some(dep) => Some(resolve(&name, &positions, ix, r, dep, false)?),
                None => None,
            };
            construct.push(on_construct);
            commit.push(on_commit);
        }

        let def = Arc::new(PieceDef {
            name,
            retrievers,
            positions,
            construct,
            commit,
        });
        check_blank(&def, &())?;
        Ok(def)
    }

    /// Validates and resolves the definition.
    ///
    /// # Panics
    ///
    /// Panics with the [`DefinitionError`] that
    /// [`try_build`](PieceBuilder::try_build) would return.
    #[must_use]
    pub fn build(self) -> Arc<PieceDef> {
        match self.try_build() {
            Ok(def) => def,
            Err(err) => panic!("invalid piece definition: {}", err),
        }
    }
}

fn resolve(
    piece: &str,
    positions: &HashMap<String, usize>,
    ix: usize,
    target: &RetrieverDef,
    dep: &Dependency,
    on_construct: bool,
) -> std::result::Result<Rule, DefinitionError> {
    let invalid = || DefinitionError::InvalidAction {
        piece: piece.to_owned(),
        field: target.name().to_owned(),
    };
    let expected = if on_construct {
        DependencyAction::SetRepeat
    } else {
        DependencyAction::SetValue
    };
    if dep.action != expected {
        return Err(invalid());
    }
    if !on_construct
        && !matches!(target.datatype().kind(), Kind::Prim(p) if p.int_bounds().is_some())
    {
        return Err(invalid());
    }

    let source = match &dep.source.scope {
        Scope::This => {
            let src = *positions
                .get(&dep.source.name)
                .ok_or_else(|| DefinitionError::UnknownField {
                    piece: piece.to_owned(),
                    field: dep.source.name.clone(),
                })?;
            if src == ix {
                return Err(DefinitionError::SelfReference {
                    piece: piece.to_owned(),
                    field: target.name().to_owned(),
                });
            }
            if on_construct && src > ix {
                return Err(DefinitionError::ForwardReference {
                    piece: piece.to_owned(),
                    field: target.name().to_owned(),
                    source: dep.source.name.clone(),
                });
            }
            Source::Local(src)
        }
        Scope::Piece(sibling) if on_construct => {
            if sibling == piece {
                return Err(DefinitionError::PieceOutOfOrder {
                    piece: piece.to_owned(),
                    sibling: sibling.clone(),
                });
            }
            Source::Sibling {
                piece: sibling.clone(),
                field: dep.source.name.clone(),
            }
        }
        Scope::Piece(_) => return Err(invalid()),
    };

    Ok(Rule {
        source,
        dep: dep.clone(),
    })
}

/// Builds the blank instance of `def`, failing if it is inconsistent with
/// its own dependencies or holds a default that cannot be encoded
pub(crate) fn check_blank<S: Siblings + ?Sized>(
    def: &Arc<PieceDef>,
    siblings: &S,
) -> std::result::Result<Piece, DefinitionError> {
    let invalid = |ix: usize, err: ValueError| DefinitionError::InvalidDefault {
        piece: def.name.clone(),
        field: def.retrievers[ix].name().to_owned(),
        err,
    };
    let blank = Piece::blank_checked(def, siblings).map_err(|(ix, err)| invalid(ix, err))?;
    for (ix, (rdef, r)) in def.retrievers.iter().zip(&blank.retrievers).enumerate() {
        let mut counter: ByteCounter = Target::create();
        if let Err(Error::Value(err)) = r.encode(rdef.name(), &mut counter) {
            return Err(invalid(ix, err));
        }
    }
    Ok(blank)
}

/// Where a piece instance is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PieceState {
    Uninitialized,
    /// Decoding stopped (or is under way) at the retriever at this position
    Decoding(usize),
    Decoded,
    Defaulted,
}

/// Read access to the fields of pieces decoded before the current one
pub trait Siblings {
    /// Value of `field` in the completed piece named `piece`, if there is one
    fn lookup(&self, piece: &str, field: &str) -> Option<&FieldValue>;
}

impl Siblings for () {
    fn lookup(&self, _: &str, _: &str) -> Option<&FieldValue> {
        None
    }
}

impl Siblings for [Piece] {
    fn lookup(&self, piece: &str, field: &str) -> Option<&FieldValue> {
        self.iter()
            .find(|p| p.name() == piece && p.is_complete())
            .and_then(|p| p.try_get(field).ok())
    }
}

/// One instance of a [`PieceDef`]
#[derive(Clone, Debug)]
pub struct Piece {
    def: Arc<PieceDef>,
    retrievers: Vec<Retriever>,
    state: PieceState,
}

impl Piece {
    /// Creates an uninitialized piece, ready to decode
    #[must_use]
    pub fn new(def: &Arc<PieceDef>) -> Self {
        Self {
            def: Arc::clone(def),
            retrievers: def.retrievers.iter().map(Retriever::from_def).collect(),
            state: PieceState::Uninitialized,
        }
    }

    /// Decodes a piece starting at `buffer[offset]`, returning it along
    /// with the number of bytes consumed.
    pub fn from_bytes(def: &Arc<PieceDef>, buffer: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut piece = Self::new(def);
        let n = piece.decode_at(buffer, offset)?;
        Ok((piece, n))
    }

    /// Builds a blank piece whose every retriever holds its default.
    ///
    /// On-construct dependencies are applied to the defaults of their
    /// sources, in wire order, so that the repeat counts of the blank piece
    /// agree with its own values and its encoding decodes back to an equal
    /// piece. A dependency reading a sibling piece leaves its target at the
    /// declared repeat; use [`try_blank_with`](Piece::try_blank_with) to
    /// resolve those.
    #[must_use]
    pub fn blank(def: &Arc<PieceDef>) -> Self {
        Self::blank_in(def, &())
    }

    /// As [`blank`](Piece::blank), resolving sibling-scoped dependencies
    /// against `siblings`.
    ///
    /// # Errors
    ///
    /// Fails if a sibling field yields an unusable repeat count.
    pub fn try_blank_with<S: Siblings + ?Sized>(
        def: &Arc<PieceDef>,
        siblings: &S,
    ) -> std::result::Result<Self, ValueError> {
        Self::blank_checked(def, siblings).map_err(|(_, err)| err)
    }

    /// Blank piece of a definition whose defaults were checked when it was
    /// built, and whose siblings were checked by the enclosing layout
    pub(crate) fn blank_in<S: Siblings + ?Sized>(def: &Arc<PieceDef>, siblings: &S) -> Self {
        match Self::blank_checked(def, siblings) {
            Ok(piece) => piece,
            Err((ix, err)) => panic!(
                "blank `{}.{}` escaped definition checks: {}",
                def.name,
                def.retrievers[ix].name(),
                err
            ),
        }
    }

    /// Builds the blank piece, or returns the position of the first
    /// retriever whose dependency cannot be applied
    fn blank_checked<S: Siblings + ?Sized>(
        def: &Arc<PieceDef>,
        siblings: &S,
    ) -> std::result::Result<Self, (usize, ValueError)> {
        let mut piece = Self {
            def: Arc::clone(def),
            retrievers: Vec::with_capacity(def.len()),
            state: PieceState::Uninitialized,
        };
        for (ix, rdef) in def.retrievers.iter().enumerate() {
            let mut repeat = rdef.datatype().repeat();
            if let Some(rule) = &def.construct[ix] {
                match piece.source_value(ix, rule, siblings) {
                    Some(v) => {
                        repeat = rule.dep.repeat_from(v, rdef.name()).map_err(|err| (ix, err))?;
                    }
                    None => debug!(
                        "blank `{}.{}` keeps declared repeat {}: `{}` unavailable",
                        def.name,
                        rdef.name(),
                        repeat,
                        rule.dep.source
                    ),
                }
            }
            piece.retrievers.push(Retriever::defaulted(rdef, repeat));
        }
        piece.state = PieceState::Defaulted;
        Ok(piece)
    }

    /// Maps every retriever name to the value a blank piece holds for it
    #[must_use]
    pub fn defaults(def: &Arc<PieceDef>) -> HashMap<String, FieldValue> {
        Self::blank(def)
            .fields()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn def(&self) -> &Arc<PieceDef> {
        &self.def
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub fn state(&self) -> PieceState {
        self.state
    }

    /// `true` once decoded or defaulted
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, PieceState::Decoded | PieceState::Defaulted)
    }

    /// Value of `source` as seen by the rule of the retriever at `ix`
    fn source_value<'a, S: Siblings + ?Sized>(
        &'a self,
        ix: usize,
        rule: &'a Rule,
        siblings: &'a S,
    ) -> Option<&'a FieldValue> {
        match &rule.source {
            Source::Local(src) => {
                debug_assert!(*src < ix || !matches!(rule.dep.action, DependencyAction::SetRepeat));
                self.retrievers.get(*src).map(Retriever::value)
            }
            Source::Sibling { piece, field } => siblings.lookup(piece, field),
        }
    }

    /// Decodes every retriever in wire order from `p`, returning the
    /// number of bytes consumed.
    ///
    /// Before each retriever with an on-construct dependency is decoded,
    /// its repeat count is recomputed from the already-decoded source.
    ///
    /// # Panics
    ///
    /// Panics if a sibling-scoped dependency names a piece that `siblings`
    /// does not hold in completed form; pieces must be decoded in an order
    /// that respects their dependencies.
    pub fn decode<P, S>(&mut self, p: &mut P, siblings: &S) -> Result<usize>
    where
        P: Parser,
        S: Siblings + ?Sized,
    {
        let def = Arc::clone(&self.def);
        let start = p.offset();
        for (ix, rdef) in def.retrievers.iter().enumerate() {
            self.state = PieceState::Decoding(ix);
            if let Some(rule) = &def.construct[ix] {
                let source = match self.source_value(ix, rule, siblings) {
                    Some(v) => v,
                    None => panic!(
                        "dependency of `{}.{}` reads `{}` before it is decoded",
                        def.name,
                        rdef.name(),
                        rule.dep.source
                    ),
                };
                let repeat = rule.dep.repeat_from(source, rdef.name())?;
                debug!(
                    "{}.{}: repeat {} from {}",
                    def.name,
                    rdef.name(),
                    repeat,
                    rule.dep.source
                );
                self.retrievers[ix].apply_repeat(repeat);
            }
            let at = p.offset();
            let width = self.retrievers[ix].decode_from(p)?;
            trace!(
                "{}.{}: {} bytes at offset {}",
                def.name,
                rdef.name(),
                width,
                at
            );
        }
        self.state = PieceState::Decoded;
        let total = p.offset() - start;
        debug!("decoded `{}`: {} bytes at offset {}", def.name, total, start);
        Ok(total)
    }

    /// Decodes starting at `buffer[offset]`, returning the number of bytes
    /// consumed.
    pub fn decode_at(&mut self, buffer: &[u8], offset: usize) -> Result<usize> {
        let mut p = ByteParser::at(buffer, offset)?;
        self.decode(&mut p, &())
    }

    /// Decodes from the region of exactly `len` bytes at `buffer[offset]`.
    ///
    /// Fails if the piece needs more than `len` bytes, or leaves any of them
    /// unconsumed.
    pub fn decode_region(&mut self, buffer: &[u8], offset: usize, len: usize) -> Result<usize> {
        let mut p = ByteParser::at(buffer, offset)?;
        p.set_fit(len)?;
        let n = self.decode(&mut p, &())?;
        p.enforce_target()?;
        Ok(n)
    }

    /// Decodes from the start of `buffer`.
    ///
    /// With the `check_complete_parse` feature, fails with
    /// [`TrailingBytes`](crate::parse::error::ParseError::TrailingBytes)
    /// unless the whole buffer is consumed; otherwise trailing bytes are
    /// logged and ignored.
    pub fn decode_all(&mut self, buffer: &[u8]) -> Result<usize> {
        let n = self.decode_at(buffer, 0)?;
        if n != buffer.len() {
            cfg_if::cfg_if! {
                if #[cfg(feature = "check_complete_parse")] {
                    return Err(crate::parse::error::ParseError::TrailingBytes {
                        residual: buffer.len() - n,
                    }
                    .into());
                } else {
                    log::warn!("`{}` left {} trailing bytes", self.def.name, buffer.len() - n);
                }
            }
        }
        Ok(n)
    }

    /// Appends the wire form of every retriever, in order, to `buf`
    pub fn write_to<U: Target>(&self, buf: &mut U) -> Result<usize> {
        let mut written = 0;
        for (rdef, r) in self.def.retrievers.iter().zip(&self.retrievers) {
            let n = r.encode(rdef.name(), buf)?;
            trace!("{}.{}: encoded {} bytes", self.def.name, rdef.name(), n);
            written += n;
        }
        Ok(written)
    }

    /// Serializes the current state.
    ///
    /// For a decoded piece that has not been mutated, this reproduces the
    /// consumed input exactly. Encoding does not apply on-commit rules;
    /// call [`commit`](Piece::commit) first after mutating.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Target::create();
        if let Some(w) = self.def.fixed_width() {
            buf.anticipate(w);
        }
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Number of bytes [`encode`](Piece::encode) would produce
    pub fn encoded_len(&self) -> Result<usize> {
        let mut counter: ByteCounter = Target::create();
        self.write_to(&mut counter)
    }

    /// Names and values of every retriever, in wire order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.def
            .retrievers
            .iter()
            .zip(&self.retrievers)
            .map(|(rdef, r)| (rdef.name(), r.value()))
    }

    /// # Panics
    ///
    /// Panics if the piece has no retriever called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> &FieldValue {
        match self.try_get(name) {
            Ok(v) => v,
            Err(_) => panic!("piece `{}` has no field `{}`", self.def.name, name),
        }
    }

    pub fn try_get(&self, name: &str) -> std::result::Result<&FieldValue, ValueError> {
        self.retriever(name)
            .map(Retriever::value)
            .ok_or_else(|| ValueError::UnknownField(name.to_owned()))
    }

    #[must_use]
    pub fn retriever(&self, name: &str) -> Option<&Retriever> {
        self.def.position(name).map(|ix| &self.retrievers[ix])
    }

    /// Mutable access to a value; its element count is checked on encode
    pub fn field_mut(&mut self, name: &str) -> std::result::Result<&mut FieldValue, ValueError> {
        match self.def.position(name) {
            Some(ix) => Ok(self.retrievers[ix].value_mut()),
            None => Err(ValueError::UnknownField(name.to_owned())),
        }
    }

    /// Replaces the value of the retriever `name`.
    ///
    /// See [`Retriever::set`] for the checks performed.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> std::result::Result<(), ValueError> {
        match self.def.position(name) {
            Some(ix) => self.retrievers[ix].set(name, value.into()),
            None => Err(ValueError::UnknownField(name.to_owned())),
        }
    }

    /// Applies every on-commit rule, nested structs first.
    ///
    /// Each rule writes its computed integer into every element its target
    /// holds.
    pub fn commit(&mut self) -> std::result::Result<(), ValueError> {
        for r in &mut self.retrievers {
            for v in r.value_mut().values_mut() {
                if let Value::Struct(inner) = v {
                    inner.commit()?;
                }
            }
        }

        let def = Arc::clone(&self.def);
        for (ix, rule) in def.commit.iter().enumerate() {
            let rule = match rule {
                Some(rule) => rule,
                None => continue,
            };
            let rdef = &def.retrievers[ix];
            let source = match self.source_value(ix, rule, &()) {
                Some(v) => v,
                None => continue,
            };
            let n = rule.dep.eval.evaluate(source, &rule.dep.source.name)?;
            let value = match rdef.datatype().kind() {
                Kind::Prim(prim) => prim.integer_value(n)?,
                Kind::Struct(_) => {
                    return Err(ValueError::TypeMismatch {
                        expected: "integer kind",
                        found: "struct",
                    })
                }
            };
            debug!("{}.{}: committed {} from {}", def.name, rdef.name(), n, rule.dep.source);
            for slot in self.retrievers[ix].value_mut().values_mut() {
                *slot = value.clone();
            }
        }
        Ok(())
    }
}

impl Index<&str> for Piece {
    type Output = FieldValue;

    fn index(&self, name: &str) -> &FieldValue {
        self.get(name)
    }
}

/// Pieces compare by definition name and held values
impl PartialEq for Piece {
    fn eq(&self, other: &Self) -> bool {
        self.def.name == other.def.name && self.retrievers == other.retrievers
    }
}

#[cfg(feature = "serde_impls")]
impl serde::Serialize for Piece {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.retrievers.len()))?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{DataType, Primitive};
    use crate::dependency::{Eval, FieldRef};
    use crate::error::Error;
    use crate::parse::error::{ParseError, WindowError};
    use crate::retriever::DefaultValue;
    use crate::structure::StructType;
    use crate::util::bytes_of_hex;
    use lazy_static::lazy_static;

    lazy_static! {
        static ref BITMAP_INFO: Arc<PieceDef> = PieceDef::builder("BitmapInfo")
            .field(RetrieverDef::new("size", Primitive::U32))
            .field(RetrieverDef::new("width", Primitive::I32))
            .field(RetrieverDef::new("height", Primitive::I32))
            .build();
        static ref BACKGROUND: Arc<PieceDef> = PieceDef::builder("BackgroundImage")
            .field(RetrieverDef::new("orientation", Primitive::I16))
            .field(
                RetrieverDef::new("bitmap_info", StructType::new(BITMAP_INFO.clone()))
                    .on_construct(Dependency::set_repeat(
                        FieldRef::this("orientation"),
                        Eval::one_if_in([-1, 2]),
                    ))
            )
            .build();
        static ref COUNTED: Arc<PieceDef> = PieceDef::builder("Counted")
            .field(
                RetrieverDef::new("count", Primitive::U16)
                    .on_commit(Dependency::set_value(FieldRef::this("items"), Eval::Length))
            )
            .field(
                RetrieverDef::new("items", Primitive::U8)
                    .on_construct(Dependency::set_repeat(FieldRef::this("count"), Eval::Copy))
            )
            .build();
    }

    const BITMAP_HEX: &str = "2800000010000000f0ffffff";

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn dependent_struct_present() {
        init();
        let buf = bytes_of_hex(&format!("0200{}", BITMAP_HEX)).unwrap();
        let (piece, n) = Piece::from_bytes(&BACKGROUND, &buf, 0).unwrap();
        assert_eq!(n, 14);
        assert_eq!(piece.state(), PieceState::Decoded);
        assert_eq!(piece["orientation"], FieldValue::Scalar(Value::Int(2)));

        let infos = piece["bitmap_info"].as_sequence().unwrap();
        assert_eq!(infos.len(), 1);
        let info = infos[0].as_struct().unwrap();
        assert_eq!(info["width"], FieldValue::Scalar(Value::Int(16)));
        assert_eq!(info["height"], FieldValue::Scalar(Value::Int(-16)));

        assert_eq!(piece.encode().unwrap(), buf);
        assert_eq!(piece.encoded_len().unwrap(), 14);
    }

    #[test]
    fn dependent_struct_absent() {
        let buf = bytes_of_hex("0000ffff").unwrap();
        let (piece, n) = Piece::from_bytes(&BACKGROUND, &buf, 0).unwrap();
        assert_eq!(n, 2);
        assert_eq!(piece["bitmap_info"], FieldValue::Sequence(Vec::new()));
        assert_eq!(piece.retriever("bitmap_info").unwrap().repeat(), 0);
        assert_eq!(piece.encode().unwrap(), vec![0x00, 0x00]);
    }

    #[test]
    fn decode_at_offset() {
        let buf = bytes_of_hex(&format!("aabbffff{}", BITMAP_HEX)).unwrap();
        let (piece, n) = Piece::from_bytes(&BACKGROUND, &buf, 2).unwrap();
        assert_eq!(n, 14);
        assert_eq!(piece.encode().unwrap(), &buf[2..]);
    }

    #[test]
    fn truncated_struct() {
        let buf = bytes_of_hex("020028000000").unwrap();
        let mut piece = Piece::new(&BACKGROUND);
        assert!(matches!(
            piece.decode_at(&buf, 0),
            Err(Error::Malformed(ParseError::Window(
                WindowError::ConsumeWouldExceedLimit { .. }
            )))
        ));
        assert_eq!(piece.state(), PieceState::Decoding(1));
    }

    #[test]
    fn negative_repeat() {
        let def = PieceDef::builder("Shifted")
            .field(
                RetrieverDef::new("n", Primitive::I8)
                    .with_default(DefaultValue::Fixed(Value::Int(1))),
            )
            .field(
                RetrieverDef::new("xs", Primitive::U8).on_construct(Dependency::set_repeat(
                    FieldRef::this("n"),
                    Eval::Affine {
                        scale: 1,
                        offset: -1,
                    },
                )),
            )
            .build();
        let buf = [0x03, 0x01, 0x02];
        let (piece, n) = Piece::from_bytes(&def, &buf, 0).unwrap();
        assert_eq!(n, 3);
        assert_eq!(piece["xs"].len(), 2);
        assert_eq!(
            Piece::from_bytes(&def, &[0x00], 0),
            Err(Error::Value(ValueError::NegativeRepeat {
                field: "xs".to_string(),
                computed: -1
            }))
        );
    }

    #[test]
    fn nested_repeat_varies_per_element() {
        let trigger = PieceDef::builder("Trigger")
            .field(RetrieverDef::new("n", Primitive::U8))
            .field(
                RetrieverDef::new("effects", Primitive::U16)
                    .on_construct(Dependency::set_repeat(FieldRef::this("n"), Eval::Copy)),
            )
            .build();
        let def = PieceDef::builder("Triggers")
            .field(RetrieverDef::new(
                "triggers",
                DataType::repeated(StructType::new(trigger), 2),
            ))
            .build();
        let buf = bytes_of_hex("0201000200000300").unwrap();
        let (piece, n) = Piece::from_bytes(&def, &buf, 0).unwrap();
        assert_eq!(n, 6);
        let triggers = piece["triggers"].values();
        assert_eq!(triggers[0].as_struct().unwrap()["effects"].len(), 2);
        assert_eq!(triggers[1].as_struct().unwrap()["effects"].len(), 0);
        assert_eq!(piece.encode().unwrap(), &buf[..n]);
    }

    #[test]
    fn defaults_cover_every_field() {
        let defaults = Piece::defaults(&BACKGROUND);
        let mut keys: Vec<_> = defaults.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["bitmap_info", "orientation"]);
        assert_eq!(defaults["orientation"], FieldValue::Scalar(Value::Int(0)));
        assert_eq!(defaults["bitmap_info"], FieldValue::Sequence(Vec::new()));

        let blank = Piece::blank(&BACKGROUND);
        assert_eq!(blank.state(), PieceState::Defaulted);
        let bytes = blank.encode().unwrap();
        assert_eq!(bytes, vec![0, 0]);
        let (decoded, _) = Piece::from_bytes(&BACKGROUND, &bytes, 0).unwrap();
        assert_eq!(decoded, blank);
    }

    #[test]
    fn blank_applies_dependencies_to_defaults() {
        let def = PieceDef::builder("BackgroundImage")
            .field(
                RetrieverDef::new("orientation", Primitive::I16)
                    .with_default(DefaultValue::Fixed(Value::Int(-1))),
            )
            .field(
                RetrieverDef::new("bitmap_info", StructType::new(BITMAP_INFO.clone()))
                    .on_construct(Dependency::set_repeat(
                        FieldRef::this("orientation"),
                        Eval::one_if_in([-1, 2]),
                    )),
            )
            .build();
        let blank = Piece::blank(&def);
        assert_eq!(blank["bitmap_info"].len(), 1);
        assert_eq!(blank.encoded_len().unwrap(), 14);
        let bytes = blank.encode().unwrap();
        let (decoded, _) = Piece::from_bytes(&def, &bytes, 0).unwrap();
        assert_eq!(decoded, blank);
    }

    #[test]
    fn inconsistent_defaults_rejected() {
        let shifted = PieceDef::builder("Shifted")
            .field(RetrieverDef::new("n", Primitive::U8))
            .field(
                RetrieverDef::new("xs", Primitive::U8).on_construct(Dependency::set_repeat(
                    FieldRef::this("n"),
                    Eval::Affine {
                        scale: 1,
                        offset: -1,
                    },
                )),
            )
            .try_build();
        assert_eq!(
            shifted.unwrap_err(),
            DefinitionError::InvalidDefault {
                piece: "Shifted".to_string(),
                field: "xs".to_string(),
                err: ValueError::NegativeRepeat {
                    field: "xs".to_string(),
                    computed: -1
                }
            }
        );

        let mistyped = PieceDef::builder("Mistyped")
            .field(
                RetrieverDef::new("n", Primitive::U8)
                    .with_default(DefaultValue::Fixed(Value::from("x"))),
            )
            .try_build();
        assert!(matches!(
            mistyped,
            Err(DefinitionError::InvalidDefault {
                err: ValueError::TypeMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn zero_width_driven_repeat_rejected() {
        let empty = PieceDef::builder("Empty").build();
        for kind in [
            Kind::Prim(Primitive::Data(0)),
            Kind::Prim(Primitive::Char(0)),
            Kind::Struct(StructType::new(empty)),
        ] {
            let def = PieceDef::builder("P")
                .field(RetrieverDef::new("n", Primitive::U32))
                .field(
                    RetrieverDef::new("xs", DataType::new(kind))
                        .on_construct(Dependency::set_repeat(FieldRef::this("n"), Eval::Copy)),
                )
                .try_build();
            assert_eq!(
                def.unwrap_err(),
                DefinitionError::ZeroWidthRepeat {
                    piece: "P".to_string(),
                    field: "xs".to_string()
                }
            );
        }
        let fixed = PieceDef::builder("P")
            .field(RetrieverDef::new("pad", DataType::repeated(Primitive::Data(0), 3)))
            .try_build();
        assert!(fixed.is_ok());
    }

    #[test]
    fn region_must_be_exact() {
        let buf = bytes_of_hex(&format!("0200{}0000", BITMAP_HEX)).unwrap();
        let mut piece = Piece::new(&BACKGROUND);
        assert_eq!(piece.decode_region(&buf, 0, 14), Ok(14));
        assert_eq!(
            piece.decode_region(&buf, 0, 16),
            Err(Error::Malformed(ParseError::Window(
                WindowError::CloseWithResidue { residual: 2 }
            )))
        );
        assert!(matches!(
            piece.decode_region(&buf, 0, 10),
            Err(Error::Malformed(ParseError::Window(
                WindowError::ConsumeWouldExceedLimit { limit: 10, .. }
            )))
        ));
    }

    #[test]
    fn decode_all_trailing() {
        let buf = bytes_of_hex("0000ff").unwrap();
        let result = Piece::new(&BACKGROUND).decode_all(&buf);
        cfg_if::cfg_if! {
            if #[cfg(feature = "check_complete_parse")] {
                assert_eq!(
                    result,
                    Err(Error::Malformed(ParseError::TrailingBytes { residual: 1 }))
                );
            } else {
                assert_eq!(result, Ok(2));
            }
        }
    }

    #[test]
    fn commit_syncs_count() {
        let buf = bytes_of_hex("02000a0b").unwrap();
        let (mut piece, _) = Piece::from_bytes(&COUNTED, &buf, 0).unwrap();
        piece
            .set(
                "items",
                vec![Value::UInt(10), Value::UInt(11), Value::UInt(12)],
            )
            .unwrap();
        assert_eq!(piece.encode().unwrap(), bytes_of_hex("02000a0b0c").unwrap());
        piece.commit().unwrap();
        assert_eq!(piece["count"], FieldValue::Scalar(Value::UInt(3)));
        let bytes = piece.encode().unwrap();
        assert_eq!(bytes, bytes_of_hex("03000a0b0c").unwrap());
        let (decoded, _) = Piece::from_bytes(&COUNTED, &bytes, 0).unwrap();
        assert_eq!(decoded, piece);
    }

    #[test]
    fn commit_reaches_nested_structs() {
        let def = PieceDef::builder("Groups")
            .field(RetrieverDef::new(
                "groups",
                DataType::repeated(StructType::new(COUNTED.clone()), 2),
            ))
            .build();
        let mut piece = Piece::blank(&def);
        let first = piece.field_mut("groups").unwrap().values_mut()[0]
            .as_struct_mut()
            .unwrap();
        first
            .set("items", vec![Value::UInt(7), Value::UInt(8), Value::UInt(9)])
            .unwrap();
        piece.commit().unwrap();

        let groups = piece["groups"].values();
        assert_eq!(
            groups[0].as_struct().unwrap()["count"],
            FieldValue::Scalar(Value::UInt(3))
        );
        assert_eq!(
            groups[1].as_struct().unwrap()["count"],
            FieldValue::Scalar(Value::UInt(0))
        );
        let bytes = piece.encode().unwrap();
        assert_eq!(bytes, bytes_of_hex("03000708090000").unwrap());
        let (decoded, _) = Piece::from_bytes(&def, &bytes, 0).unwrap();
        assert_eq!(decoded, piece);
    }

    #[test]
    fn failed_encode_keeps_earlier_bytes() {
        let mut piece = Piece::blank(&COUNTED);
        piece.set("count", Value::UInt(0x0102)).unwrap();
        if let FieldValue::Sequence(items) = piece.field_mut("items").unwrap() {
            items.push(Value::from("x"));
        }
        let mut buf = Vec::new();
        assert!(matches!(
            piece.write_to(&mut buf),
            Err(Error::Value(ValueError::TypeMismatch { .. }))
        ));
        assert_eq!(buf, vec![0x02, 0x01]);
    }

    #[cfg(feature = "serde_impls")]
    #[test]
    fn serializes_as_field_map() {
        let buf = bytes_of_hex(&format!("0200{}", BITMAP_HEX)).unwrap();
        let (piece, _) = Piece::from_bytes(&BACKGROUND, &buf, 0).unwrap();
        assert_eq!(
            serde_json::to_value(&piece).unwrap(),
            serde_json::json!({
                "orientation": 2,
                "bitmap_info": [{ "size": 40, "width": 16, "height": -16 }]
            })
        );
    }

    #[test]
    fn field_access() {
        let mut piece = Piece::blank(&COUNTED);
        assert_eq!(
            piece.try_get("missing"),
            Err(ValueError::UnknownField("missing".to_string()))
        );
        assert!(matches!(
            piece.set("count", vec![Value::UInt(1)]),
            Err(ValueError::ShapeMismatch { .. })
        ));
        piece.set("count", Value::UInt(0)).unwrap();
        if let FieldValue::Sequence(items) = piece.field_mut("items").unwrap() {
            items.push(Value::UInt(1));
        }
        piece.commit().unwrap();
        assert_eq!(piece.encode().unwrap(), vec![1, 0, 1]);
        assert_eq!(
            piece.fields().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["count", "items"]
        );
    }

    #[test]
    #[should_panic]
    fn get_unknown_panics() {
        let _ = &Piece::blank(&COUNTED)["missing"];
    }

    #[test]
    fn definition_errors() {
        let forward = PieceDef::builder("P")
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_repeat(FieldRef::this("n"), Eval::Copy)),
            )
            .field(RetrieverDef::new("n", Primitive::U8))
            .try_build();
        assert_eq!(
            forward.unwrap_err(),
            DefinitionError::ForwardReference {
                piece: "P".to_string(),
                field: "xs".to_string(),
                source: "n".to_string()
            }
        );

        let duplicate = PieceDef::builder("P")
            .field(RetrieverDef::new("n", Primitive::U8))
            .field(RetrieverDef::new("n", Primitive::U16))
            .try_build();
        assert!(matches!(
            duplicate,
            Err(DefinitionError::DuplicateField { .. })
        ));

        let unknown = PieceDef::builder("P")
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_repeat(FieldRef::this("m"), Eval::Copy)),
            )
            .try_build();
        assert!(matches!(unknown, Err(DefinitionError::UnknownField { .. })));

        let own = PieceDef::builder("P")
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_repeat(FieldRef::this("xs"), Eval::Copy)),
            )
            .try_build();
        assert!(matches!(own, Err(DefinitionError::SelfReference { .. })));

        let wrong_trigger = PieceDef::builder("P")
            .field(RetrieverDef::new("n", Primitive::U8))
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_value(FieldRef::this("n"), Eval::Copy)),
            )
            .try_build();
        assert!(matches!(
            wrong_trigger,
            Err(DefinitionError::InvalidAction { .. })
        ));

        let text_count = PieceDef::builder("P")
            .field(
                RetrieverDef::new("label", Primitive::Char(4))
                    .on_commit(Dependency::set_value(FieldRef::this("xs"), Eval::Length)),
            )
            .field(RetrieverDef::new("xs", Primitive::U8).possibly_list())
            .try_build();
        assert!(matches!(
            text_count,
            Err(DefinitionError::InvalidAction { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "invalid piece definition")]
    fn build_panics_on_forward_reference() {
        let _ = PieceDef::builder("P")
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_repeat(FieldRef::this("n"), Eval::Copy)),
            )
            .field(RetrieverDef::new("n", Primitive::U8))
            .build();
    }

    #[test]
    #[should_panic(expected = "before it is decoded")]
    fn missing_sibling_panics() {
        let def = PieceDef::builder("Body")
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_repeat(
                        FieldRef::sibling("Header", "n"),
                        Eval::Copy,
                    )),
            )
            .build();
        let _ = Piece::from_bytes(&def, &[0x00], 0);
    }

    #[test]
    fn fixed_width() {
        assert_eq!(BITMAP_INFO.fixed_width(), Some(12));
        assert_eq!(BACKGROUND.fixed_width(), None);
    }
}

//! General error types
//!
//! This module contains the error types that are not specific to the
//! low-level [`Parser`](crate::parse::Parser) machinery, which has its own
//! hierarchy in [`parse::error`](crate::parse::error).
//!
//! # Layout
//!
//! Errors fall into three groups:
//!   * [`WidthError`], [`LengthError`], [`BoundsError`] and [`HexConvError`] are
//!     small leaf types describing one specific kind of invalidity.
//!   * [`ValueError`] is the field-level error returned when a value cannot be
//!     encoded into its declared wire type, or when a dependency produces an
//!     unusable repeat count.
//!   * [`DefinitionError`] reports contract violations in a static piece or
//!     layout definition. The checked constructors return it; the unchecked
//!     ones panic with it.
//!
//! The crate-level [`Error`] is the sum of a malformed-input
//! [`ParseError`] and a [`ValueError`].

use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};

use crate::parse::error::ParseError;
use crate::value::Shape;

/// Enumerated error type for failures related to wire types that
/// impose a check on the byte-width of their prospective values.
///
/// Structurally similar to [`LengthError`], an analoguous error-type
/// relating to the number of elements in a repeated field, rather than
/// the number of bytes in a single value.
#[derive(Clone, PartialEq, PartialOrd, Eq, Ord, Debug)]
pub enum WidthError {
    /// Restriction on maximum byte-width exceeded
    TooWide { limit: usize, actual: usize },
    /// Requirement of precise byte-width not satisfied
    WrongWidth { exact: usize, actual: usize },
}

impl Display for WidthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WidthError::TooWide { limit, actual } => {
                write!(f, "{actual}-byte value exceeded limit of {limit} bytes")
            }
            WidthError::WrongWidth { exact, actual } => {
                write!(
                    f,
                    "{actual}-byte value violated requirement of {exact} bytes"
                )
            }
        }
    }
}

impl StdError for WidthError {}

/// Enumerated error type for failures related to the element-count of
/// a repeated field whose repeat count is fixed by its definition.
#[derive(Clone, PartialEq, PartialOrd, Eq, Ord, Debug)]
pub enum LengthError {
    /// Requirement of precise element-count not satisfied
    WrongLength { exact: usize, actual: usize },
}

impl Display for LengthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LengthError::WrongLength { exact, actual } => {
                write!(
                    f,
                    "{actual}-element value violated requirement of {exact} elements"
                )
            }
        }
    }
}

impl StdError for LengthError {}

/// Error type representing all possible conditions for invalidity
/// encountered when attempting to parse a string as a series
/// of hex-encoded bytes.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd)]
pub enum HexConvError {
    /// Error case for odd-length strings
    OddParity(String),
    /// Error case for strings containing non-hex characters,
    /// i.e. anything not in `[0-9a-fA-F]`.
    NonHex(String),
}

impl Debug for HexConvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OddParity(invalid) => {
                write!(f, "non-even length-parity for string `{}`", invalid)
            }
            Self::NonHex(invalid) => write!(f, "non-hex character found in string `{}`", invalid),
        }
    }
}

impl Display for HexConvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OddParity(_) => {
                write!(f, "hex-conversion failed on odd-length string")
            }
            Self::NonHex(_) => {
                write!(f, "hex-conversion failed on non-hex character")
            }
        }
    }
}

impl StdError for HexConvError {}

/// Error type representing invalidity of integral values
/// based on the implicit lower and upper bound of their wire width.
///
/// * `Underflow {..}` contains the illegal value in question, as well as the lower bound it falls below
/// * `Overflow {..}` contains the illegal value in question, as well as the upper bound it falls above
///
/// The generic parameter `Ext` is the type used to hold both the value
/// and the bounds, and must be wide enough that both can be converted into
/// it without perturbing their relative order. Within this crate it is
/// always `i128`, which covers every signed and unsigned wire width.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoundsError<Ext: Debug> {
    Underflow { min: Ext, val: Ext },
    Overflow { max: Ext, val: Ext },
    InvalidBounds { min: Ext, max: Ext },
}

impl<Ext: Debug + PartialOrd + Copy> BoundsError<Ext> {
    /// Checks that a value `val` falls into the inclusive range `[min, max]`,
    /// returning `Ok(val)` if this condition holds.
    ///
    /// If `val < min`, returns `Err(BoundsError::Underflow { .. })`
    ///
    /// If `val > max`, returns `Err(BoundsError::Overflow { .. })`
    pub fn restrict(val: Ext, min: Ext, max: Ext) -> std::result::Result<Ext, Self> {
        if min > max {
            Err(Self::InvalidBounds { min, max })
        } else if val < min {
            Err(Self::Underflow { min, val })
        } else if val > max {
            Err(Self::Overflow { max, val })
        } else {
            Ok(val)
        }
    }
}

impl<Ext: Debug + Display> Display for BoundsError<Ext> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundsError::Underflow { ref min, ref val } => {
                write!(f, "provided value {} less than minimum bound {}", val, min)
            }
            BoundsError::Overflow { ref max, ref val } => {
                write!(
                    f,
                    "provided value {} greater than maximum bound {}",
                    val, max
                )
            }
            BoundsError::InvalidBounds { ref min, ref max } => {
                write!(
                    f,
                    "min <= max is not satisfied for the range ({},{})",
                    min, max
                )
            }
        }
    }
}

impl<Ext: Display + Debug> StdError for BoundsError<Ext> {}

/// Field-level failures: a value that cannot be written into its declared
/// wire type, or a dependency whose result cannot serve as a repeat count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Text or blob does not fit its length prefix or fixed width
    Width(WidthError),
    /// Sequence length differs from a repeat count fixed by the definition
    Length { field: String, err: LengthError },
    /// Integer does not fit the width of its wire type
    Bounds(BoundsError<i128>),
    /// Dependency evaluated to a negative repeat count
    NegativeRepeat { field: String, computed: i64 },
    /// Value variant does not match the wire type it is encoded as
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// Scalar given where a sequence is held, or vice versa
    ShapeMismatch { field: String, expected: Shape },
    /// Dependency source is not an integer (or list, for `Eval::Length`)
    NonIntegral { field: String },
    /// Lookup by name of a field the piece does not have
    UnknownField(String),
}

impl Display for ValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueError::Width(err) => write!(f, "width violation: {}", err),
            ValueError::Length { field, err } => {
                write!(f, "length violation in field `{}`: {}", field, err)
            }
            ValueError::Bounds(err) => write!(f, "integer out of range: {}", err),
            ValueError::NegativeRepeat { field, computed } => write!(
                f,
                "dependency for field `{}` produced negative repeat count {}",
                field, computed
            ),
            ValueError::TypeMismatch { expected, found } => {
                write!(f, "expected {} value, found {}", expected, found)
            }
            ValueError::ShapeMismatch { field, expected } => {
                write!(f, "field `{}` holds a {:?}-shaped value", field, expected)
            }
            ValueError::NonIntegral { field } => {
                write!(f, "dependency source `{}` is not an integer", field)
            }
            ValueError::UnknownField(name) => write!(f, "no field named `{}`", name),
        }
    }
}

impl StdError for ValueError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ValueError::Width(err) => Some(err),
            ValueError::Length { err, .. } => Some(err),
            ValueError::Bounds(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WidthError> for ValueError {
    fn from(err: WidthError) -> Self {
        Self::Width(err)
    }
}

impl From<BoundsError<i128>> for ValueError {
    fn from(err: BoundsError<i128>) -> Self {
        Self::Bounds(err)
    }
}

/// Contract violations in a static piece or layout definition.
///
/// These describe bugs in the format description rather than in the input
/// data, and are never produced by decoding or encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Two retrievers in one piece share a name
    DuplicateField { piece: String, field: String },
    /// A dependency names a field that does not exist
    UnknownField { piece: String, field: String },
    /// An on-construct dependency reads a field decoded after its target
    ForwardReference { piece: String, field: String, source: String },
    /// A dependency reads the field it rewrites
    SelfReference { piece: String, field: String },
    /// A sibling-scoped dependency names a piece absent from the layout
    UnknownPiece { piece: String, sibling: String },
    /// A sibling-scoped dependency names a piece decoded after its own
    PieceOutOfOrder { piece: String, sibling: String },
    /// A nested struct carries a sibling-scoped dependency
    SiblingInStruct { piece: String, field: String },
    /// Two pieces in one layout share a name
    DuplicatePiece(String),
    /// A dependency action is registered under the wrong trigger
    InvalidAction { piece: String, field: String },
    /// A dependency drives the repeat of a kind that occupies no bytes
    ZeroWidthRepeat { piece: String, field: String },
    /// The blank piece cannot be built or encoded from the defaults
    InvalidDefault {
        piece: String,
        field: String,
        err: ValueError,
    },
}

impl Display for DefinitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionError::DuplicateField { piece, field } => {
                write!(f, "piece `{}` declares field `{}` twice", piece, field)
            }
            DefinitionError::UnknownField { piece, field } => {
                write!(f, "piece `{}` has no field `{}`", piece, field)
            }
            DefinitionError::ForwardReference {
                piece,
                field,
                source,
            } => write!(
                f,
                "field `{}.{}` depends on `{}`, which is decoded after it",
                piece, field, source
            ),
            DefinitionError::SelfReference { piece, field } => {
                write!(f, "field `{}.{}` depends on itself", piece, field)
            }
            DefinitionError::UnknownPiece { piece, sibling } => write!(
                f,
                "piece `{}` depends on piece `{}`, which is not in the layout",
                piece, sibling
            ),
            DefinitionError::PieceOutOfOrder { piece, sibling } => write!(
                f,
                "piece `{}` depends on piece `{}`, which is decoded after it",
                piece, sibling
            ),
            DefinitionError::SiblingInStruct { piece, field } => write!(
                f,
                "struct `{}` cannot resolve sibling dependency of field `{}`",
                piece, field
            ),
            DefinitionError::DuplicatePiece(name) => {
                write!(f, "layout declares piece `{}` twice", name)
            }
            DefinitionError::InvalidAction { piece, field } => write!(
                f,
                "field `{}.{}` registers an action under the wrong trigger",
                piece, field
            ),
            DefinitionError::ZeroWidthRepeat { piece, field } => write!(
                f,
                "field `{}.{}` has a dependency-driven repeat of a zero-width kind",
                piece, field
            ),
            DefinitionError::InvalidDefault { piece, field, err } => {
                write!(f, "default of field `{}.{}` is invalid: {}", piece, field, err)
            }
        }
    }
}

impl StdError for DefinitionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DefinitionError::InvalidDefault { err, .. } => Some(err),
            _ => None,
        }
    }
}

/// Crate-level error for decode and encode operations
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input buffer is shorter than the layout requires (or has trailing bytes)
    Malformed(ParseError),
    /// A value could not be encoded, or a dependency produced an invalid count
    Value(ValueError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(err) => write!(f, "malformed input: {}", err),
            Error::Value(err) => write!(f, "invalid value: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Malformed(err) => Some(err),
            Error::Value(err) => Some(err),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Self::Malformed(err)
    }
}

impl From<ValueError> for Error {
    fn from(err: ValueError) -> Self {
        Self::Value(err)
    }
}

impl From<WidthError> for Error {
    fn from(err: WidthError) -> Self {
        Self::Value(err.into())
    }
}

impl From<BoundsError<i128>> for Error {
    fn from(err: BoundsError<i128>) -> Self {
        Self::Value(err.into())
    }
}

/// Type alias for Result with an error type of [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

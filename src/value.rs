//! Decoded values
//!
//! A retriever holds a [`FieldValue`], which is either a single [`Value`]
//! or an ordered sequence of them. Which of the two a given retriever holds
//! is its [`Shape`], fixed once when its piece is defined (see
//! [`RetrieverDef::shape`](crate::retriever::RetrieverDef::shape)).
//!
//! # Text
//!
//! Text is held as raw bytes in a [`CharString`] rather than as a `String`,
//! so that decoding and re-encoding is byte-exact whatever encoding the
//! input happens to use. Interpretation as UTF-8 is left to the caller.

use std::fmt::{Debug, Display, Formatter};

#[cfg(feature = "serde_impls")]
use serde::{ser::SerializeSeq, Serialize, Serializer};

use crate::piece::Piece;

/// Whether a retriever holds a bare value or a sequence of values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum Shape {
    Scalar,
    Sequence,
}

/// Byte-backed text, as read from or written to the wire
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct CharString(Vec<u8>);

impl CharString {
    /// Constructs an empty `CharString`
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the raw bytes of the text
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Destructs `self` and returns its raw bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the number of bytes in the text
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the text holds zero bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interprets the text as UTF-8, after stripping trailing NUL bytes
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.trimmed())
    }

    /// Interprets the text as UTF-8, after stripping trailing NUL bytes,
    /// replacing invalid sequences.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.trimmed()).into_owned()
    }

    fn trimmed(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |ix| ix + 1);
        &self.0[..end]
    }
}

impl Debug for CharString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Display for CharString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<&str> for CharString {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for CharString {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for CharString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for CharString {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

#[cfg(feature = "serde_impls")]
impl Serialize for CharString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

/// A single decoded instance of a wire type
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize), serde(untagged))]
pub enum Value {
    /// Any unsigned integer kind
    UInt(u64),
    /// Any signed integer kind
    Int(i64),
    /// `f32` kind, kept at its own width so every bit pattern survives
    F32(f32),
    /// `f64` kind
    F64(f64),
    /// Length-prefixed and fixed-width text
    Text(CharString),
    /// Fixed-width opaque data
    Bytes(Vec<u8>),
    /// One instance of a nested struct
    Struct(Piece),
}

impl Value {
    /// Name of the variant, for error messages
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::UInt(_) => "unsigned integer",
            Value::Int(_) => "signed integer",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Struct(_) => "struct",
        }
    }

    /// Returns the integer held by `self`, signed or not
    #[must_use]
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::UInt(n) => Some(n.into()),
            Value::Int(n) => Some(n.into()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.as_integer().and_then(|n| u64::try_from(n).ok())
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|n| i64::try_from(n).ok())
    }

    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(x) => Some(x),
            _ => None,
        }
    }

    /// Returns the float held by `self`, widening an `f32`
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(x) => Some(x.into()),
            Value::F64(x) => Some(x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&CharString> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&Piece> {
        match self {
            Value::Struct(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut Piece> {
        match self {
            Value::Struct(p) => Some(p),
            _ => None,
        }
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::UInt(n.into())
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::UInt(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<i8> for Value {
    fn from(n: i8) -> Self {
        Value::Int(n.into())
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::F32(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::F64(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<CharString> for Value {
    fn from(s: CharString) -> Self {
        Value::Text(s)
    }
}

impl From<Piece> for Value {
    fn from(p: Piece) -> Self {
        Value::Struct(p)
    }
}

/// The value held by a retriever: one bare value, or a sequence
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    Sequence(Vec<Value>),
}

impl FieldValue {
    /// Builds a field value of the given shape from decoded instances.
    ///
    /// # Panics
    ///
    /// Panics if `shape` is `Scalar` and `values` does not hold exactly one
    /// element, which a retriever never allows to happen.
    #[must_use]
    pub fn from_values(shape: Shape, mut values: Vec<Value>) -> Self {
        match shape {
            Shape::Sequence => FieldValue::Sequence(values),
            Shape::Scalar => {
                assert_eq!(values.len(), 1, "scalar field built from {} values", values.len());
                FieldValue::Scalar(values.remove(0))
            }
        }
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            FieldValue::Scalar(_) => Shape::Scalar,
            FieldValue::Sequence(_) => Shape::Sequence,
        }
    }

    /// Number of instances held; `1` for a scalar
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Scalar(_) => 1,
            FieldValue::Sequence(vs) => vs.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            FieldValue::Sequence(_) => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            FieldValue::Scalar(_) => None,
            FieldValue::Sequence(vs) => Some(vs),
        }
    }

    /// Borrows the held instances as a slice, whatever the shape
    #[must_use]
    pub fn values(&self) -> &[Value] {
        match self {
            FieldValue::Scalar(v) => std::slice::from_ref(v),
            FieldValue::Sequence(vs) => vs,
        }
    }

    /// Mutably borrows the held instances as a slice, whatever the shape
    pub fn values_mut(&mut self) -> &mut [Value] {
        match self {
            FieldValue::Scalar(v) => std::slice::from_mut(v),
            FieldValue::Sequence(vs) => vs,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Scalar(v)
    }
}

impl From<Vec<Value>> for FieldValue {
    fn from(vs: Vec<Value>) -> Self {
        FieldValue::Sequence(vs)
    }
}

#[cfg(feature = "serde_impls")]
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Scalar(v) => v.serialize(serializer),
            FieldValue::Sequence(vs) => {
                let mut seq = serializer.serialize_seq(Some(vs.len()))?;
                for v in vs {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

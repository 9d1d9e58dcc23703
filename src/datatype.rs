//! Wire-type descriptors
//!
//! A [`DataType`] pairs a [`Kind`] (how one instance looks on the wire) with
//! a repeat count (how many instances follow each other contiguously).
//!
//! # Kinds
//!
//! [`Primitive`] covers the fixed set of leaf types, each of which can also
//! be named by a short textual type name:
//!
//! | name           | wire form                                                      |
//! |----------------|----------------------------------------------------------------|
//! | `u8` .. `u64`  | little-endian unsigned integer of 1, 2, 4 or 8 bytes           |
//! | `s8` .. `s64`  | little-endian two's complement integer of 1, 2, 4 or 8 bytes   |
//! | `f32`, `f64`   | little-endian IEEE-754 float                                   |
//! | `strN`         | unsigned `N`-bit length prefix, then that many bytes of text  |
//! | `charN`        | exactly `N` bytes of text, NUL-padded on encode                |
//! | `dataN`        | exactly `N` opaque bytes                                       |
//!
//! A nested compound type is described by [`Kind::Struct`] holding a
//! [`StructType`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::conv::{target::Target, FieldCodec};
use crate::error::{BoundsError, Error, LengthError, Result, ValueError, WidthError};
use crate::parse::Parser;
use crate::structure::StructType;
use crate::value::{CharString, Value};

/// Width of the unsigned length prefix of a `str` kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrefixWidth {
    U8,
    U16,
    U32,
    U64,
}

impl PrefixWidth {
    /// Number of bytes the prefix itself occupies
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            PrefixWidth::U8 => 1,
            PrefixWidth::U16 => 2,
            PrefixWidth::U32 => 4,
            PrefixWidth::U64 => 8,
        }
    }

    /// Longest text (in bytes) the prefix can describe
    #[must_use]
    pub const fn max_len(self) -> u64 {
        match self {
            PrefixWidth::U8 => u8::MAX as u64,
            PrefixWidth::U16 => u16::MAX as u64,
            PrefixWidth::U32 => u32::MAX as u64,
            PrefixWidth::U64 => u64::MAX,
        }
    }

    fn take_len<P: Parser>(self, p: &mut P) -> Result<u64> {
        Ok(match self {
            PrefixWidth::U8 => p.take_u8()?.into(),
            PrefixWidth::U16 => p.take_u16()?.into(),
            PrefixWidth::U32 => p.take_u32()?.into(),
            PrefixWidth::U64 => p.take_u64()?,
        })
    }

    /// Caller guarantees `len <= self.max_len()`
    fn push_len<U: Target>(self, len: u64, buf: &mut U) -> usize {
        match self {
            PrefixWidth::U8 => buf.push_many((len as u8).to_le_bytes()),
            PrefixWidth::U16 => buf.push_many((len as u16).to_le_bytes()),
            PrefixWidth::U32 => buf.push_many((len as u32).to_le_bytes()),
            PrefixWidth::U64 => buf.push_many(len.to_le_bytes()),
        }
    }
}

/// Leaf wire types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Length-prefixed text
    Str(PrefixWidth),
    /// Fixed-width, NUL-padded text
    Char(usize),
    /// Fixed-width opaque bytes
    Data(usize),
}

impl Primitive {
    /// Inclusive range of the integer kinds, or `None` for any other kind
    #[must_use]
    pub fn int_bounds(self) -> Option<(i128, i128)> {
        Some(match self {
            Primitive::U8 => (0, u8::MAX.into()),
            Primitive::U16 => (0, u16::MAX.into()),
            Primitive::U32 => (0, u32::MAX.into()),
            Primitive::U64 => (0, u64::MAX.into()),
            Primitive::I8 => (i8::MIN.into(), i8::MAX.into()),
            Primitive::I16 => (i16::MIN.into(), i16::MAX.into()),
            Primitive::I32 => (i32::MIN.into(), i32::MAX.into()),
            Primitive::I64 => (i64::MIN.into(), i64::MAX.into()),
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64
        )
    }

    /// Builds the value of this kind holding the integer `n`, as used by
    /// on-commit dependencies that write a computed count into a field.
    pub fn integer_value(self, n: i128) -> std::result::Result<Value, ValueError> {
        let (min, max) = self.int_bounds().ok_or(ValueError::TypeMismatch {
            expected: "integer kind",
            found: "non-integer kind",
        })?;
        let n = BoundsError::restrict(n, min, max)?;
        // in range of the kind, hence of i64/u64
        Ok(if self.is_signed() {
            Value::Int(n as i64)
        } else {
            Value::UInt(n as u64)
        })
    }

    fn encode_int<U: Target>(self, value: &Value, buf: &mut U) -> Result<usize> {
        let n = value.as_integer().ok_or(ValueError::TypeMismatch {
            expected: "integer",
            found: value.variant_name(),
        })?;
        // integer kinds always have bounds
        let (min, max) = self.int_bounds().unwrap_or((0, 0));
        let n = BoundsError::restrict(n, min, max)?;
        Ok(match self {
            Primitive::U8 => buf.push_many((n as u8).to_le_bytes()),
            Primitive::U16 => buf.push_many((n as u16).to_le_bytes()),
            Primitive::U32 => buf.push_many((n as u32).to_le_bytes()),
            Primitive::U64 => buf.push_many((n as u64).to_le_bytes()),
            Primitive::I8 => buf.push_many((n as i8).to_le_bytes()),
            Primitive::I16 => buf.push_many((n as i16).to_le_bytes()),
            Primitive::I32 => buf.push_many((n as i32).to_le_bytes()),
            Primitive::I64 => buf.push_many((n as i64).to_le_bytes()),
            _ => unreachable!("encode_int called on non-integer kind"),
        })
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Primitive::U8 => f.write_str("u8"),
            Primitive::U16 => f.write_str("u16"),
            Primitive::U32 => f.write_str("u32"),
            Primitive::U64 => f.write_str("u64"),
            Primitive::I8 => f.write_str("s8"),
            Primitive::I16 => f.write_str("s16"),
            Primitive::I32 => f.write_str("s32"),
            Primitive::I64 => f.write_str("s64"),
            Primitive::F32 => f.write_str("f32"),
            Primitive::F64 => f.write_str("f64"),
            Primitive::Str(w) => write!(f, "str{}", w.bytes() * 8),
            Primitive::Char(n) => write!(f, "char{}", n),
            Primitive::Data(n) => write!(f, "data{}", n),
        }
    }
}

/// Error returned when a textual type name does not name a [`Primitive`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownTypeName(pub String);

impl Display for UnknownTypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown type name `{}`", self.0)
    }
}

impl std::error::Error for UnknownTypeName {}

impl FromStr for Primitive {
    type Err = UnknownTypeName;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let unknown = || UnknownTypeName(s.to_owned());
        Ok(match s {
            "u8" => Primitive::U8,
            "u16" => Primitive::U16,
            "u32" => Primitive::U32,
            "u64" => Primitive::U64,
            "s8" => Primitive::I8,
            "s16" => Primitive::I16,
            "s32" => Primitive::I32,
            "s64" => Primitive::I64,
            "f32" => Primitive::F32,
            "f64" => Primitive::F64,
            "str8" => Primitive::Str(PrefixWidth::U8),
            "str16" => Primitive::Str(PrefixWidth::U16),
            "str32" => Primitive::Str(PrefixWidth::U32),
            "str64" => Primitive::Str(PrefixWidth::U64),
            _ => {
                if let Some(n) = s.strip_prefix("char") {
                    Primitive::Char(n.parse().map_err(|_| unknown())?)
                } else if let Some(n) = s.strip_prefix("data") {
                    Primitive::Data(n.parse().map_err(|_| unknown())?)
                } else {
                    return Err(unknown());
                }
            }
        })
    }
}

impl FieldCodec for Primitive {
    fn type_name(&self) -> String {
        self.to_string()
    }

    fn decode_one<P: Parser>(&self, p: &mut P) -> Result<Value> {
        Ok(match *self {
            Primitive::U8 => p.take_u8()?.into(),
            Primitive::U16 => p.take_u16()?.into(),
            Primitive::U32 => p.take_u32()?.into(),
            Primitive::U64 => p.take_u64()?.into(),
            Primitive::I8 => p.take_i8()?.into(),
            Primitive::I16 => p.take_i16()?.into(),
            Primitive::I32 => p.take_i32()?.into(),
            Primitive::I64 => p.take_i64()?.into(),
            Primitive::F32 => p.take_f32()?.into(),
            Primitive::F64 => p.take_f64()?.into(),
            Primitive::Str(w) => {
                let len = w.take_len(p)?;
                // lengths beyond the address space cannot be satisfied either way
                let len = usize::try_from(len).unwrap_or(usize::MAX);
                Value::Text(CharString::from(p.take_dynamic(len)?))
            }
            Primitive::Char(n) => Value::Text(CharString::from(p.take_dynamic(n)?)),
            Primitive::Data(n) => Value::Bytes(p.take_dynamic(n)?),
        })
    }

    fn encode_one<U: Target>(&self, value: &Value, buf: &mut U) -> Result<usize> {
        match *self {
            // never narrowed, so f32 payloads (NaN bits included) survive
            Primitive::F32 => {
                let x = value.as_f32().ok_or(ValueError::TypeMismatch {
                    expected: "f32",
                    found: value.variant_name(),
                })?;
                Ok(buf.push_many(x.to_bits().to_le_bytes()))
            }
            Primitive::F64 => {
                let x = value.as_f64().ok_or(ValueError::TypeMismatch {
                    expected: "float",
                    found: value.variant_name(),
                })?;
                Ok(buf.push_many(x.to_bits().to_le_bytes()))
            }
            Primitive::Str(w) => {
                let text = expect_text(value)?;
                let len = text.len() as u64;
                if len > w.max_len() {
                    return Err(WidthError::TooWide {
                        limit: usize::try_from(w.max_len()).unwrap_or(usize::MAX),
                        actual: text.len(),
                    }
                    .into());
                }
                Ok(w.push_len(len, buf) + buf.push_all(text.as_bytes()))
            }
            Primitive::Char(n) => {
                let text = expect_text(value)?;
                if text.len() > n {
                    return Err(WidthError::TooWide {
                        limit: n,
                        actual: text.len(),
                    }
                    .into());
                }
                let mut written = buf.push_all(text.as_bytes());
                for _ in text.len()..n {
                    written += buf.push_one(0);
                }
                Ok(written)
            }
            Primitive::Data(n) => {
                let bytes = value.as_bytes().ok_or(ValueError::TypeMismatch {
                    expected: "bytes",
                    found: value.variant_name(),
                })?;
                if bytes.len() != n {
                    return Err(WidthError::WrongWidth {
                        exact: n,
                        actual: bytes.len(),
                    }
                    .into());
                }
                Ok(buf.push_all(bytes))
            }
            int => int.encode_int(value, buf),
        }
    }

    fn default_one(&self) -> Value {
        match *self {
            Primitive::F32 => Value::F32(0.0),
            Primitive::F64 => Value::F64(0.0),
            Primitive::Str(_) => Value::Text(CharString::new()),
            Primitive::Char(n) => Value::Text(CharString::from(vec![0u8; n])),
            Primitive::Data(n) => Value::Bytes(vec![0u8; n]),
            int if int.is_signed() => Value::Int(0),
            _ => Value::UInt(0),
        }
    }

    fn fixed_width(&self) -> Option<usize> {
        match *self {
            Primitive::U8 | Primitive::I8 => Some(1),
            Primitive::U16 | Primitive::I16 => Some(2),
            Primitive::U32 | Primitive::I32 | Primitive::F32 => Some(4),
            Primitive::U64 | Primitive::I64 | Primitive::F64 => Some(8),
            Primitive::Str(_) => None,
            Primitive::Char(n) | Primitive::Data(n) => Some(n),
        }
    }
}

fn expect_text(value: &Value) -> std::result::Result<&CharString, ValueError> {
    value.as_text().ok_or(ValueError::TypeMismatch {
        expected: "text",
        found: value.variant_name(),
    })
}

/// Element type of a [`DataType`]
#[derive(Clone, Debug, PartialEq)]
pub enum Kind {
    Prim(Primitive),
    Struct(StructType),
}

impl From<Primitive> for Kind {
    fn from(p: Primitive) -> Self {
        Kind::Prim(p)
    }
}

impl From<StructType> for Kind {
    fn from(s: StructType) -> Self {
        Kind::Struct(s)
    }
}

impl FieldCodec for Kind {
    fn type_name(&self) -> String {
        match self {
            Kind::Prim(p) => p.type_name(),
            Kind::Struct(s) => s.type_name(),
        }
    }

    fn decode_one<P: Parser>(&self, p: &mut P) -> Result<Value> {
        match self {
            Kind::Prim(prim) => prim.decode_one(p),
            Kind::Struct(s) => s.decode_one(p),
        }
    }

    fn encode_one<U: Target>(&self, value: &Value, buf: &mut U) -> Result<usize> {
        match self {
            Kind::Prim(prim) => prim.encode_one(value, buf),
            Kind::Struct(s) => s.encode_one(value, buf),
        }
    }

    fn default_one(&self) -> Value {
        match self {
            Kind::Prim(prim) => prim.default_one(),
            Kind::Struct(s) => s.default_one(),
        }
    }

    fn fixed_width(&self) -> Option<usize> {
        match self {
            Kind::Prim(prim) => prim.fixed_width(),
            Kind::Struct(s) => s.fixed_width(),
        }
    }
}

/// A wire type plus the number of contiguous instances of it
#[derive(Clone, Debug, PartialEq)]
pub struct DataType {
    kind: Kind,
    repeat: usize,
}

impl DataType {
    /// A single instance of `kind`
    #[must_use]
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self {
            kind: kind.into(),
            repeat: 1,
        }
    }

    /// `repeat` contiguous instances of `kind`
    #[must_use]
    pub fn repeated(kind: impl Into<Kind>, repeat: usize) -> Self {
        Self {
            kind: kind.into(),
            repeat,
        }
    }

    /// Parses a primitive type name such as `"u32"` or `"str16"`
    pub fn parse_name(name: &str) -> std::result::Result<Self, UnknownTypeName> {
        Ok(Self::new(name.parse::<Primitive>()?))
    }

    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    #[must_use]
    pub fn repeat(&self) -> usize {
        self.repeat
    }

    /// Overwrites the repeat count, as on-construct dependencies do
    pub fn set_repeat(&mut self, repeat: usize) {
        self.repeat = repeat;
    }

    /// Returns `self` with its repeat count replaced
    #[must_use]
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    /// Exact encoded width of all `repeat` instances, when value-independent
    #[must_use]
    pub fn fixed_width(&self) -> Option<usize> {
        if self.repeat == 0 {
            return Some(0);
        }
        self.kind.fixed_width().map(|w| w * self.repeat)
    }

    /// Consumes `repeat` contiguous instances from `p`.
    ///
    /// A repeat count of zero consumes nothing and yields an empty sequence.
    pub fn decode<P: Parser>(&self, p: &mut P) -> Result<Vec<Value>> {
        (0..self.repeat).map(|_| self.kind.decode_one(p)).collect()
    }

    /// Decodes `repeat` instances starting at `buffer[offset]`, returning
    /// them along with the number of bytes consumed.
    pub fn decode_at(&self, buffer: &[u8], offset: usize) -> Result<(Vec<Value>, usize)> {
        let mut p = crate::parse::byteparser::ByteParser::at(buffer, offset)?;
        let values = self.decode(&mut p)?;
        Ok((values, p.offset() - offset))
    }

    /// Appends the wire form of `values` to `buf`.
    ///
    /// # Errors
    ///
    /// Fails with [`ValueError::Length`] if `values` does not hold exactly
    /// `repeat` elements, or with the error of the first instance that
    /// cannot be encoded.
    pub fn encode<U: Target>(&self, values: &[Value], buf: &mut U) -> Result<usize> {
        if values.len() != self.repeat {
            return Err(Error::Value(ValueError::Length {
                field: self.kind.type_name(),
                err: LengthError::WrongLength {
                    exact: self.repeat,
                    actual: values.len(),
                },
            }));
        }
        if let Some(w) = self.fixed_width() {
            buf.anticipate(w);
        }
        let mut written = 0;
        for v in values {
            written += self.kind.encode_one(v, buf)?;
        }
        Ok(written)
    }

    /// Returns `repeat` freshly built default instances
    #[must_use]
    pub fn defaults(&self) -> Vec<Value> {
        (0..self.repeat).map(|_| self.kind.default_one()).collect()
    }
}

impl From<Primitive> for DataType {
    fn from(p: Primitive) -> Self {
        Self::new(p)
    }
}

impl From<StructType> for DataType {
    fn from(s: StructType) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::error::{ParseError, WindowError};
    use crate::util::bytes_of_hex;

    fn encode_all(dt: &DataType, values: &[Value]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        dt.encode(values, &mut buf)?;
        Ok(buf)
    }

    #[test]
    fn type_names_round_trip() {
        for name in [
            "u8", "u16", "u32", "u64", "s8", "s16", "s32", "s64", "f32", "f64", "str8", "str16",
            "str32", "str64", "char256", "data4",
        ] {
            let prim: Primitive = name.parse().unwrap();
            assert_eq!(prim.to_string(), name);
        }
        assert_eq!(
            "i32".parse::<Primitive>(),
            Err(UnknownTypeName("i32".to_string()))
        );
        assert!("charx".parse::<Primitive>().is_err());
    }

    #[test]
    fn integers_little_endian() {
        let buf = bytes_of_hex("feff2a000000").unwrap();
        let (vals, n) = DataType::parse_name("s16").unwrap().decode_at(&buf, 0).unwrap();
        assert_eq!((vals, n), (vec![Value::Int(-2)], 2));
        let (vals, n) = DataType::parse_name("u32").unwrap().decode_at(&buf, 2).unwrap();
        assert_eq!((vals, n), (vec![Value::UInt(42)], 4));
    }

    #[test]
    fn repeat_zero_is_empty_for_every_kind() {
        let buf = [0u8; 4];
        for name in ["u8", "s64", "f32", "str16", "char8", "data2"] {
            let dt = DataType::parse_name(name).unwrap().with_repeat(0);
            assert_eq!(dt.decode_at(&buf, 4).unwrap(), (Vec::new(), 0));
            assert_eq!(dt.fixed_width(), Some(0));
            assert_eq!(encode_all(&dt, &[]).unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn repeated_strings() {
        let buf = bytes_of_hex("020068690000").unwrap();
        let dt = DataType::repeated(Primitive::Str(PrefixWidth::U16), 2);
        let (vals, n) = dt.decode_at(&buf, 0).unwrap();
        assert_eq!(n, 6);
        assert_eq!(vals, vec![Value::from("hi"), Value::from("")]);
        assert_eq!(encode_all(&dt, &vals).unwrap(), buf);
    }

    #[test]
    fn truncated_input() {
        let buf = bytes_of_hex("0500414243").unwrap();
        let dt = DataType::parse_name("str16").unwrap();
        assert_eq!(
            dt.decode_at(&buf, 0),
            Err(Error::Malformed(ParseError::Window(
                WindowError::ConsumeWouldExceedLimit {
                    offset: 2,
                    requested: 5,
                    limit: 5,
                }
            )))
        );
        let dt = DataType::repeated(Primitive::U16, 3);
        assert!(matches!(
            dt.decode_at(&buf, 0),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn string_too_long_for_prefix() {
        let dt = DataType::parse_name("str8").unwrap();
        let long = Value::Text(CharString::from(vec![b'a'; 256]));
        assert_eq!(
            encode_all(&dt, &[long]),
            Err(Error::Value(ValueError::Width(WidthError::TooWide {
                limit: 255,
                actual: 256
            })))
        );
    }

    #[test]
    fn fixed_text_is_padded() {
        let dt = DataType::parse_name("char4").unwrap();
        assert_eq!(encode_all(&dt, &[Value::from("ab")]).unwrap(), b"ab\0\0");
        assert!(matches!(
            encode_all(&dt, &[Value::from("abcde")]),
            Err(Error::Value(ValueError::Width(_)))
        ));
    }

    #[test]
    fn integer_out_of_range() {
        let dt = DataType::parse_name("u8").unwrap();
        assert_eq!(
            encode_all(&dt, &[Value::Int(-1)]),
            Err(Error::Value(ValueError::Bounds(BoundsError::Underflow {
                min: 0,
                val: -1
            })))
        );
        assert_eq!(encode_all(&dt, &[Value::Int(200)]).unwrap(), vec![200]);
        assert!(matches!(
            encode_all(&dt, &[Value::from("x")]),
            Err(Error::Value(ValueError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn wrong_element_count() {
        let dt = DataType::repeated(Primitive::U8, 2);
        assert!(matches!(
            encode_all(&dt, &[Value::UInt(1)]),
            Err(Error::Value(ValueError::Length { .. }))
        ));
    }

    #[test]
    fn floats_round_trip() {
        let dt = DataType::repeated(Primitive::F32, 2);
        let buf = bytes_of_hex("0000803f000020c1").unwrap();
        let (vals, _) = dt.decode_at(&buf, 0).unwrap();
        assert_eq!(vals, vec![Value::F32(1.0), Value::F32(-10.0)]);
        assert_eq!(encode_all(&dt, &vals).unwrap(), buf);
    }

    #[test]
    fn float_payloads_preserved() {
        // signalling NaN, a quieted NaN with payload, negative zero
        for hex in ["0100807f", "0100c0ff", "00000080"] {
            let buf = bytes_of_hex(hex).unwrap();
            let (vals, n) = DataType::new(Primitive::F32).decode_at(&buf, 0).unwrap();
            assert_eq!(n, 4);
            assert!(matches!(vals[0], Value::F32(_)));
            assert_eq!(encode_all(&DataType::new(Primitive::F32), &vals).unwrap(), buf);
        }
        let buf = bytes_of_hex("010000000000f07f").unwrap();
        let (vals, _) = DataType::new(Primitive::F64).decode_at(&buf, 0).unwrap();
        assert_eq!(encode_all(&DataType::new(Primitive::F64), &vals).unwrap(), buf);
    }

    #[test]
    fn f32_kind_rejects_f64_value() {
        assert!(matches!(
            encode_all(&DataType::new(Primitive::F32), &[Value::F64(1.0)]),
            Err(Error::Value(ValueError::TypeMismatch { expected: "f32", .. }))
        ));
        let widened = encode_all(&DataType::new(Primitive::F64), &[Value::F32(1.0)]).unwrap();
        assert_eq!(widened, 1.0f64.to_le_bytes());
    }

    #[test]
    fn defaults_encode() {
        for name in ["u16", "s32", "f64", "str32", "char3", "data5"] {
            let dt = DataType::parse_name(name).unwrap().with_repeat(3);
            let encoded = encode_all(&dt, &dt.defaults()).unwrap();
            if let Some(w) = dt.fixed_width() {
                assert_eq!(encoded.len(), w);
            }
        }
    }

    #[test]
    fn commit_integer_values() {
        assert_eq!(Primitive::U32.integer_value(3), Ok(Value::UInt(3)));
        assert_eq!(Primitive::I16.integer_value(-3), Ok(Value::Int(-3)));
        assert!(Primitive::U8.integer_value(256).is_err());
        assert!(Primitive::F32.integer_value(1).is_err());
    }
}

//! Core of the binary-conversion API
//!
//! This module provides the [`FieldCodec`] trait, the single capability
//! shared by every element type a [`DataType`](crate::datatype::DataType)
//! can describe: primitive wire types ([`Primitive`](crate::datatype::Primitive))
//! and nested compound types ([`StructType`](crate::structure::StructType)) alike.
//! A `DataType` handles repetition and delegates each individual instance
//! to the `FieldCodec` of its kind.
//!
//! The sub-module [`target`] offers an abstraction around [`std::io::Write`],
//! namely the [`target::Target`] trait. This is the dual to
//! [`crate::parse::Parser`], acting as the generic bound for serialization.

use crate::error::Result;
use crate::parse::Parser;
use crate::value::Value;

use self::target::Target;

pub mod target;

/// Decoding, encoding and defaulting of a single instance of a wire type
///
/// Implementors describe exactly one value on the wire. Repetition, and
/// the scalar-or-sequence shape of a field, are handled one level up by
/// [`DataType`](crate::datatype::DataType) and
/// [`Retriever`](crate::retriever::Retriever).
pub trait FieldCodec {
    /// Human-readable name of the wire type, as used in error messages
    /// and logs (e.g. `"u32"`, `"str16"`, or the name of a struct).
    fn type_name(&self) -> String;

    /// Consumes exactly one instance from `p` and returns the value it holds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::error::Error::Malformed) when the
    /// parser cannot supply the required bytes; nested structs may
    /// additionally report dependency failures as
    /// [`Error::Value`](crate::error::Error::Value).
    fn decode_one<P: Parser>(&self, p: &mut P) -> Result<Value>;

    /// Appends the wire form of `value` to `buf`, returning the number of
    /// bytes written.
    ///
    /// Nothing is written when an error is returned for a primitive; a
    /// nested struct may have written the fields preceding the failing one.
    fn encode_one<U: Target>(&self, value: &Value, buf: &mut U) -> Result<usize>;

    /// Returns a freshly built default instance, which must itself be
    /// encodable without error.
    fn default_one(&self) -> Value;

    /// Returns the exact encoded width of every instance, when that
    /// width does not depend on the value.
    fn fixed_width(&self) -> Option<usize>;
}

//! Declarative decoding and encoding of binary file layouts
//!
//! # Overview
//!
//! Many binary formats (saved games, scenario files, asset containers) are
//! described as a sequence of *pieces*, each an ordered list of named fields.
//! Whether, and how many times, a field appears frequently depends on the
//! value of a field decoded before it: a count preceding a list, or a flag
//! deciding whether an optional record follows. This crate models such
//! formats directly.
//!
//! * A [`DataType`](datatype::DataType) describes the wire form of a field:
//!   a primitive or nested struct kind, repeated a given number of times.
//! * A [`RetrieverDef`](retriever::RetrieverDef) names a field, and may
//!   register a [`Dependency`](dependency::Dependency) that recomputes its
//!   repeat count from another field just before it is decoded.
//! * A [`PieceDef`](piece::PieceDef) is an ordered, validated collection of
//!   retrievers, and a [`Piece`](piece::Piece) an instance holding values
//!   for all of them.
//! * A [`StructType`](structure::StructType) uses a piece definition as the
//!   element kind of a field, so pieces nest.
//! * A [`Layout`](layout::Layout) strings pieces together into a whole file,
//!   whose pieces may depend on fields of earlier ones.
//!
//! Decoding a piece and re-encoding it reproduces the consumed bytes
//! exactly. A piece can also be built blank from the defaults of its
//! fields, and mutated before encoding.
//!
//! # Features
//!
//! * `check_complete_parse`: whole-buffer decodes reject trailing bytes
//! * `serde_impls`: `serde::Serialize` for decoded values, pieces and documents
//! * `expose_internal`: makes the `internal` module public

pub mod conv;
pub mod datatype;
pub mod dependency;
pub mod error;
pub mod layout;
pub mod parse;
pub mod piece;
pub mod prelude;
pub mod retriever;
pub mod structure;
pub mod util;
pub mod value;

cfg_if::cfg_if! {
    if #[cfg(feature = "expose_internal")] {
        pub mod internal;
    } else {
        mod internal;
    }
}

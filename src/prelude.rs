//! Assorted imports for writing piece definitions
//!
//! ```
//! use piecework::prelude::*;
//!
//! let def = PieceDef::builder("Flag")
//!     .field(RetrieverDef::new("enabled", Primitive::U8))
//!     .build();
//! assert_eq!(Piece::defaults(&def)["enabled"], FieldValue::Scalar(Value::UInt(0)));
//! ```

pub use crate::datatype::{DataType, Kind, PrefixWidth, Primitive};
pub use crate::dependency::{Dependency, Eval, FieldRef, Scope};
pub use crate::error::{DefinitionError, Error, ValueError};
pub use crate::layout::{Document, Layout};
pub use crate::piece::{Piece, PieceDef, PieceState};
pub use crate::retriever::{DefaultValue, RetrieverDef};
pub use crate::structure::StructType;
pub use crate::value::{CharString, FieldValue, Shape, Value};

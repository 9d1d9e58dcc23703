//! Nested compound types
//!
//! A [`StructType`] lets a [`PieceDef`] serve as the element kind of a
//! [`DataType`](crate::datatype::DataType). Every decoded element is a fresh
//! [`Piece`], held in a [`Value::Struct`]; its fields are then reachable as
//! `value[i].as_struct()[field]`.
//!
//! A nested struct is decoded in isolation from the pieces around it, so its
//! dependencies may only read fields of the struct itself.

use std::sync::Arc;

use crate::conv::{target::Target, FieldCodec};
use crate::dependency::Scope;
use crate::error::{DefinitionError, Result, ValueError};
use crate::parse::Parser;
use crate::piece::{Piece, PieceDef};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct StructType(Arc<PieceDef>);

impl StructType {
    /// # Errors
    ///
    /// Fails with [`DefinitionError::SiblingInStruct`] if any retriever of
    /// `def` depends on a sibling piece.
    pub fn try_new(def: Arc<PieceDef>) -> std::result::Result<Self, DefinitionError> {
        for r in def.retrievers() {
            if let Some(dep) = r.construct_dependency() {
                if let Scope::Piece(_) = dep.source.scope {
                    return Err(DefinitionError::SiblingInStruct {
                        piece: def.name().to_owned(),
                        field: r.name().to_owned(),
                    });
                }
            }
        }
        Ok(Self(def))
    }

    /// # Panics
    ///
    /// Panics where [`try_new`](StructType::try_new) would fail.
    #[must_use]
    pub fn new(def: Arc<PieceDef>) -> Self {
        match Self::try_new(def) {
            Ok(ty) => ty,
            Err(err) => panic!("invalid struct definition: {}", err),
        }
    }

    #[must_use]
    pub fn def(&self) -> &Arc<PieceDef> {
        &self.0
    }
}

/// Struct types are equal when built from the same definition, or from
/// definitions sharing a name
impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name() == other.0.name()
    }
}

impl FieldCodec for StructType {
    fn type_name(&self) -> String {
        self.0.name().to_owned()
    }

    fn decode_one<P: Parser>(&self, p: &mut P) -> Result<Value> {
        let mut piece = Piece::new(&self.0);
        piece.decode(p, &())?;
        Ok(Value::Struct(piece))
    }

    fn encode_one<U: Target>(&self, value: &Value, buf: &mut U) -> Result<usize> {
        match value {
            Value::Struct(piece) if piece.name() == self.0.name() => piece.write_to(buf),
            Value::Struct(_) => Err(ValueError::TypeMismatch {
                expected: "struct of the declared type",
                found: "struct of another type",
            }
            .into()),
            other => Err(ValueError::TypeMismatch {
                expected: "struct",
                found: other.variant_name(),
            }
            .into()),
        }
    }

    fn default_one(&self) -> Value {
        Value::Struct(Piece::blank(&self.0))
    }

    fn fixed_width(&self) -> Option<usize> {
        self.0.fixed_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{DataType, Primitive};
    use crate::dependency::{Dependency, Eval, FieldRef};
    use crate::error::Error;
    use crate::retriever::RetrieverDef;
    use crate::util::bytes_of_hex;

    fn point() -> Arc<PieceDef> {
        PieceDef::builder("Point")
            .field(RetrieverDef::new("x", Primitive::F32))
            .field(RetrieverDef::new("y", Primitive::F32))
            .build()
    }

    #[test]
    fn repeated_structs() {
        let dt = DataType::repeated(StructType::new(point()), 2);
        assert_eq!(dt.fixed_width(), Some(16));
        let buf = bytes_of_hex("0000803f000000400000404000008040").unwrap();
        let (values, n) = dt.decode_at(&buf, 0).unwrap();
        assert_eq!(n, 16);
        let second = values[1].as_struct().unwrap();
        assert_eq!(second["x"].as_scalar(), Some(&Value::F32(3.0)));
        let mut out = Vec::new();
        dt.encode(&values, &mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn wrong_value_kind() {
        let ty = StructType::new(point());
        assert!(matches!(
            ty.encode_one(&Value::UInt(1), &mut Vec::new()),
            Err(Error::Value(ValueError::TypeMismatch { .. }))
        ));
        let other = PieceDef::builder("Other").build();
        assert!(ty
            .encode_one(&Value::Struct(Piece::blank(&other)), &mut Vec::new())
            .is_err());
    }

    #[test]
    fn default_is_blank_piece() {
        let ty = StructType::new(point());
        let blank = ty.default_one();
        let mut out = Vec::new();
        assert_eq!(ty.encode_one(&blank, &mut out), Ok(8));
    }

    #[test]
    fn sibling_dependency_rejected() {
        let def = PieceDef::builder("Effect")
            .field(
                RetrieverDef::new("xs", Primitive::U8)
                    .on_construct(Dependency::set_repeat(FieldRef::sibling("Header", "n"), Eval::Copy)),
            )
            .build();
        assert_eq!(
            StructType::try_new(def),
            Err(DefinitionError::SiblingInStruct {
                piece: "Effect".to_string(),
                field: "xs".to_string()
            })
        );
    }
}

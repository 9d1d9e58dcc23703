//! Named fields
//!
//! [`RetrieverDef`] is the static declaration of a field, shared by every
//! instance of the piece it belongs to. [`Retriever`] is the per-instance
//! state: the current repeat count and the value held.

use crate::conv::target::Target;
use crate::datatype::DataType;
use crate::dependency::Dependency;
use crate::error::{Error, LengthError, Result, ValueError};
use crate::parse::Parser;
use crate::value::{FieldValue, Shape, Value};

/// Source of the default value of a field
#[derive(Clone, Debug)]
pub enum DefaultValue {
    /// The zero of the kind: `0`, empty text, zeroed bytes, or a blank
    /// nested struct
    Kind,
    /// The same value at every position
    Fixed(Value),
    /// A fresh value computed from each element position
    Indexed(fn(usize) -> Value),
}

impl DefaultValue {
    /// Builds one independently owned default per instance of `datatype`
    #[must_use]
    pub fn build(&self, datatype: &DataType) -> Vec<Value> {
        match self {
            DefaultValue::Kind => datatype.defaults(),
            DefaultValue::Fixed(v) => vec![v.clone(); datatype.repeat()],
            DefaultValue::Indexed(f) => (0..datatype.repeat()).map(f).collect(),
        }
    }
}

/// Static declaration of a field
#[derive(Clone, Debug)]
pub struct RetrieverDef {
    name: String,
    datatype: DataType,
    possibly_list: bool,
    default: DefaultValue,
    on_construct: Option<Dependency>,
    on_commit: Option<Dependency>,
}

impl RetrieverDef {
    pub fn new(name: impl Into<String>, datatype: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
            possibly_list: false,
            default: DefaultValue::Kind,
            on_construct: None,
            on_commit: None,
        }
    }

    /// Marks the field as holding a sequence even when its repeat is 1
    #[must_use]
    pub fn possibly_list(mut self) -> Self {
        self.possibly_list = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    /// Registers a rule run immediately before this field is decoded
    #[must_use]
    pub fn on_construct(mut self, dep: Dependency) -> Self {
        self.on_construct = Some(dep);
        self
    }

    /// Registers a rule run by [`Piece::commit`](crate::piece::Piece::commit)
    #[must_use]
    pub fn on_commit(mut self, dep: Dependency) -> Self {
        self.on_commit = Some(dep);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    #[must_use]
    pub fn is_possibly_list(&self) -> bool {
        self.possibly_list
    }

    #[must_use]
    pub fn default_value(&self) -> &DefaultValue {
        &self.default
    }

    #[must_use]
    pub fn construct_dependency(&self) -> Option<&Dependency> {
        self.on_construct.as_ref()
    }

    #[must_use]
    pub fn commit_dependency(&self) -> Option<&Dependency> {
        self.on_commit.as_ref()
    }

    /// Shape of every value this field will ever hold.
    ///
    /// A field is a bare scalar exactly when it is not marked
    /// `possibly_list`, its declared repeat is 1, and no dependency can
    /// change that repeat.
    #[must_use]
    pub fn shape(&self) -> Shape {
        if !self.possibly_list && self.datatype.repeat() == 1 && self.on_construct.is_none() {
            Shape::Scalar
        } else {
            Shape::Sequence
        }
    }

    /// Repeat count that every instance must keep, if not dependency-driven
    #[must_use]
    pub fn fixed_repeat(&self) -> Option<usize> {
        match self.on_construct {
            None => Some(self.datatype.repeat()),
            Some(_) => None,
        }
    }
}

/// Runtime state of one field of a piece
#[derive(Clone, Debug)]
pub struct Retriever {
    datatype: DataType,
    shape: Shape,
    fixed: Option<usize>,
    value: FieldValue,
}

impl Retriever {
    /// Builds the field at its declared repeat, holding default values
    #[must_use]
    pub fn from_def(def: &RetrieverDef) -> Self {
        Self::defaulted(def, def.datatype.repeat())
    }

    /// Builds the field at repeat `repeat`, holding default values
    #[must_use]
    pub fn defaulted(def: &RetrieverDef, repeat: usize) -> Self {
        let datatype = def.datatype.clone().with_repeat(repeat);
        let values = def.default.build(&datatype);
        Self {
            datatype,
            shape: def.shape(),
            fixed: def.fixed_repeat(),
            value: FieldValue::from_values(def.shape(), values),
        }
    }

    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Mutable access to the held value.
    ///
    /// Changes to the number of elements are not checked until encode.
    pub fn value_mut(&mut self) -> &mut FieldValue {
        &mut self.value
    }

    #[must_use]
    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Repeat count in effect for the next decode, or of the last one
    #[must_use]
    pub fn repeat(&self) -> usize {
        self.datatype.repeat()
    }

    /// Overwrites the repeat count ahead of a decode
    pub(crate) fn apply_repeat(&mut self, repeat: usize) {
        self.datatype.set_repeat(repeat);
    }

    /// Decodes `repeat` instances from `p` into the held value, returning
    /// the number of bytes consumed.
    pub fn decode_from<P: Parser>(&mut self, p: &mut P) -> Result<usize> {
        let start = p.offset();
        let values = self.datatype.decode(p)?;
        self.value = FieldValue::from_values(self.shape, values);
        Ok(p.offset() - start)
    }

    /// Appends the wire form of the held value to `buf`.
    ///
    /// A field whose repeat is fixed by its declaration must hold exactly
    /// that many elements; any other field encodes however many it holds.
    pub fn encode<U: Target>(&self, name: &str, buf: &mut U) -> Result<usize> {
        let values = self.value.values();
        let synced;
        let datatype = match self.fixed {
            None if values.len() != self.datatype.repeat() => {
                synced = self.datatype.clone().with_repeat(values.len());
                &synced
            }
            _ => &self.datatype,
        };
        datatype.encode(values, buf).map_err(|err| match err {
            Error::Value(ValueError::Length { err, .. }) => Error::Value(ValueError::Length {
                field: name.to_owned(),
                err,
            }),
            other => other,
        })
    }

    /// Replaces the held value, keeping the repeat count in step.
    ///
    /// # Errors
    ///
    /// Fails if `value` has the wrong shape, or if the field's repeat is
    /// fixed by its declaration and `value` holds a different number of
    /// elements.
    pub fn set(&mut self, name: &str, value: FieldValue) -> std::result::Result<(), ValueError> {
        if value.shape() != self.shape {
            return Err(ValueError::ShapeMismatch {
                field: name.to_owned(),
                expected: self.shape,
            });
        }
        if let Some(exact) = self.fixed {
            if value.len() != exact {
                return Err(ValueError::Length {
                    field: name.to_owned(),
                    err: LengthError::WrongLength {
                        exact,
                        actual: value.len(),
                    },
                });
            }
        }
        self.datatype.set_repeat(value.len());
        self.value = value;
        Ok(())
    }
}

/// Retrievers compare by the value they hold
impl PartialEq for Retriever {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

//! Dependencies between retrievers
//!
//! A [`Dependency`] is registered on the retriever it rewrites (its
//! *target*) and reads the value of another retriever (its *source*),
//! named by a [`FieldRef`]. What it computes from that value is a closed
//! [`Eval`] rule, and what it does with the result is its
//! [`DependencyAction`]:
//!
//! * [`SetRepeat`](DependencyAction::SetRepeat) rules run *on construct*:
//!   immediately before the target is decoded (or defaulted), they
//!   overwrite the target's repeat count. The source must already be
//!   decoded at that point, so it must precede the target in its piece or
//!   live in an earlier piece of the same [`Layout`](crate::layout::Layout).
//! * [`SetValue`](DependencyAction::SetValue) rules run *on commit*: when
//!   [`Piece::commit`](crate::piece::Piece::commit) is called, they write
//!   the computed integer into the target. These typically keep a count
//!   field in step with the list it counts, and may read any field of the
//!   same piece.

use crate::error::ValueError;
use crate::value::FieldValue;

/// Where the source of a dependency lives
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The piece that holds the target
    This,
    /// A named piece decoded earlier in the same layout
    Piece(String),
}

/// Reference to a retriever, by scope and name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub scope: Scope,
    pub name: String,
}

impl FieldRef {
    /// A retriever of the same piece
    pub fn this(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::This,
            name: name.into(),
        }
    }

    /// A retriever of the sibling piece named `piece`
    pub fn sibling(piece: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Piece(piece.into()),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            Scope::This => write!(f, "self.{}", self.name),
            Scope::Piece(piece) => write!(f, "{}.{}", piece, self.name),
        }
    }
}

/// Closed set of functions from a source value to an integer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Eval {
    /// The source integer itself
    Copy,
    /// `scale * x + offset`
    Affine { scale: i64, offset: i64 },
    /// `then` if the source integer is in `set`, `otherwise` if not
    Membership {
        set: Vec<i64>,
        then: i64,
        otherwise: i64,
    },
    /// `then` if the source integer equals `value`, `otherwise` if not
    Equality { value: i64, then: i64, otherwise: i64 },
    /// Number of elements held by the source (1 for a scalar)
    Length,
}

impl Eval {
    /// `1` if the source is one of `set`, `0` otherwise
    pub fn one_if_in(set: impl Into<Vec<i64>>) -> Self {
        Eval::Membership {
            set: set.into(),
            then: 1,
            otherwise: 0,
        }
    }

    /// Evaluates the rule against the value of the source retriever.
    ///
    /// Every rule except [`Length`](Eval::Length) needs an integer source:
    /// either a scalar, or a sequence of exactly one element (as held by
    /// retrievers whose repeat count is itself dependency-driven).
    pub fn evaluate(&self, source: &FieldValue, source_name: &str) -> Result<i128, ValueError> {
        if let Eval::Length = self {
            return Ok(source.len() as i128);
        }
        let x = integral(source).ok_or_else(|| ValueError::NonIntegral {
            field: source_name.to_owned(),
        })?;
        Ok(match self {
            Eval::Copy => x,
            Eval::Affine { scale, offset } => i128::from(*scale) * x + i128::from(*offset),
            Eval::Membership {
                set,
                then,
                otherwise,
            } => {
                if set.iter().any(|&m| i128::from(m) == x) {
                    (*then).into()
                } else {
                    (*otherwise).into()
                }
            }
            Eval::Equality {
                value,
                then,
                otherwise,
            } => {
                if i128::from(*value) == x {
                    (*then).into()
                } else {
                    (*otherwise).into()
                }
            }
            Eval::Length => unreachable!(),
        })
    }
}

fn integral(source: &FieldValue) -> Option<i128> {
    match source.values() {
        [v] => v.as_integer(),
        _ => None,
    }
}

/// What a dependency does with the integer it computes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyAction {
    /// Overwrite the target's repeat count, before it is decoded
    SetRepeat,
    /// Overwrite the target's value, on commit
    SetValue,
}

/// A rule computing something about its target from one source retriever
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub action: DependencyAction,
    pub source: FieldRef,
    pub eval: Eval,
}

impl Dependency {
    /// On-construct rule setting the target's repeat count
    #[must_use]
    pub fn set_repeat(source: FieldRef, eval: Eval) -> Self {
        Self {
            action: DependencyAction::SetRepeat,
            source,
            eval,
        }
    }

    /// On-commit rule setting the target's value
    #[must_use]
    pub fn set_value(source: FieldRef, eval: Eval) -> Self {
        Self {
            action: DependencyAction::SetValue,
            source,
            eval,
        }
    }

    /// Computes a repeat count for the retriever `target` from `source`.
    ///
    /// # Errors
    ///
    /// Fails with [`ValueError::NegativeRepeat`] when the rule yields a
    /// negative count, and with [`ValueError::NonIntegral`] when the source
    /// does not hold a single integer.
    pub fn repeat_from(&self, source: &FieldValue, target: &str) -> Result<usize, ValueError> {
        let n = self.eval.evaluate(source, &self.source.name)?;
        if n < 0 {
            return Err(ValueError::NegativeRepeat {
                field: target.to_owned(),
                computed: i64::try_from(n).unwrap_or(i64::MIN),
            });
        }
        usize::try_from(n).map_err(|_| {
            ValueError::Bounds(crate::error::BoundsError::Overflow {
                max: usize::MAX as i128,
                val: n,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn scalar(n: i64) -> FieldValue {
        FieldValue::Scalar(Value::Int(n))
    }

    #[test]
    fn membership() {
        let dep = Dependency::set_repeat(FieldRef::this("orientation"), Eval::one_if_in([-1, 2]));
        assert_eq!(dep.repeat_from(&scalar(2), "bitmap_info"), Ok(1));
        assert_eq!(dep.repeat_from(&scalar(-1), "bitmap_info"), Ok(1));
        assert_eq!(dep.repeat_from(&scalar(0), "bitmap_info"), Ok(0));
    }

    #[test]
    fn affine_negative() {
        let dep = Dependency::set_repeat(
            FieldRef::this("count"),
            Eval::Affine {
                scale: 1,
                offset: -3,
            },
        );
        assert_eq!(dep.repeat_from(&scalar(5), "items"), Ok(2));
        assert_eq!(
            dep.repeat_from(&scalar(1), "items"),
            Err(ValueError::NegativeRepeat {
                field: "items".to_string(),
                computed: -2
            })
        );
    }

    #[test]
    fn sources() {
        let single = FieldValue::Sequence(vec![Value::UInt(4)]);
        assert_eq!(Eval::Copy.evaluate(&single, "n"), Ok(4));
        let pair = FieldValue::Sequence(vec![Value::UInt(4), Value::UInt(5)]);
        assert_eq!(Eval::Length.evaluate(&pair, "xs"), Ok(2));
        assert_eq!(
            Eval::Copy.evaluate(&pair, "xs"),
            Err(ValueError::NonIntegral {
                field: "xs".to_string()
            })
        );
        assert!(Eval::Copy
            .evaluate(&FieldValue::Scalar(Value::from("x")), "s")
            .is_err());
        let eq = Eval::Equality {
            value: 7,
            then: 3,
            otherwise: 0,
        };
        assert_eq!(eq.evaluate(&scalar(7), "v"), Ok(3));
        assert_eq!(eq.evaluate(&scalar(6), "v"), Ok(0));
    }

    #[test]
    fn display_ref() {
        assert_eq!(FieldRef::this("a").to_string(), "self.a");
        assert_eq!(FieldRef::sibling("Header", "n").to_string(), "Header.n");
    }
}

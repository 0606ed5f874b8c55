//! # Bindings, Scalar Values, and Expressions
//!
//! This module defines the scalar vocabulary of the plan model:
//!
//! - **`ColumnBinding`**: the `(table_index, column_index)` pair that uniquely
//!   identifies a column produced somewhere in a plan. Every column reference
//!   in every expression resolves to a binding advertised by a descendant
//!   operator; rewrites that move columns between operators must keep this
//!   resolution intact.
//! - **`ScalarValue`**: constant values. The integral ladder is complete in
//!   both signednesses because compression constants (range minima, narrowed
//!   slot values) live in whatever type the compression decision picked.
//! - **`Expression`**: the owned expression tree stored inside operators --
//!   column references, constants, function calls, and comparisons.

use crate::types::LogicalType;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A column produced by an operator, identified by table and column index.
///
/// Equality and hashing are by the pair. Table indices are allocated by the
/// binder and globally unique within a query, so a binding never collides
/// across operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnBinding {
    pub table_index: u32,
    pub column_index: u32,
}

impl ColumnBinding {
    pub fn new(table_index: u32, column_index: u32) -> Self {
        Self {
            table_index,
            column_index,
        }
    }
}

impl fmt::Display for ColumnBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.table_index, self.column_index)
    }
}

/// Constant scalar value.
///
/// Uses `OrderedFloat` for `f64` so that values are `Eq`/`Hash` throughout
/// (constants are compared when matching compress/decompress pairs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    HugeInt(i128),
    UTinyInt(u8),
    USmallInt(u16),
    UInteger(u32),
    UBigInt(u64),
    Double(OrderedFloat<f64>),
    Varchar(String),
}

impl ScalarValue {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            ScalarValue::Boolean(_) => LogicalType::Boolean,
            ScalarValue::TinyInt(_) => LogicalType::TinyInt,
            ScalarValue::SmallInt(_) => LogicalType::SmallInt,
            ScalarValue::Integer(_) => LogicalType::Integer,
            ScalarValue::BigInt(_) => LogicalType::BigInt,
            ScalarValue::HugeInt(_) => LogicalType::HugeInt,
            ScalarValue::UTinyInt(_) => LogicalType::UTinyInt,
            ScalarValue::USmallInt(_) => LogicalType::USmallInt,
            ScalarValue::UInteger(_) => LogicalType::UInteger,
            ScalarValue::UBigInt(_) => LogicalType::UBigInt,
            ScalarValue::Double(_) => LogicalType::Double,
            ScalarValue::Varchar(_) => LogicalType::Varchar,
        }
    }

    /// Widen an integral value to `i128`. `None` for non-integral values.
    pub fn to_i128(&self) -> Option<i128> {
        match self {
            ScalarValue::TinyInt(v) => Some(*v as i128),
            ScalarValue::SmallInt(v) => Some(*v as i128),
            ScalarValue::Integer(v) => Some(*v as i128),
            ScalarValue::BigInt(v) => Some(*v as i128),
            ScalarValue::HugeInt(v) => Some(*v),
            ScalarValue::UTinyInt(v) => Some(*v as i128),
            ScalarValue::USmallInt(v) => Some(*v as i128),
            ScalarValue::UInteger(v) => Some(*v as i128),
            ScalarValue::UBigInt(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Narrow an `i128` into an integral type. `None` if the value does not
    /// fit or the type is not integral.
    pub fn from_i128(ty: LogicalType, value: i128) -> Option<ScalarValue> {
        let (min, max) = ty.integral_bounds()?;
        if value < min || value > max {
            return None;
        }
        Some(match ty {
            LogicalType::TinyInt => ScalarValue::TinyInt(value as i8),
            LogicalType::SmallInt => ScalarValue::SmallInt(value as i16),
            LogicalType::Integer => ScalarValue::Integer(value as i32),
            LogicalType::BigInt => ScalarValue::BigInt(value as i64),
            LogicalType::HugeInt => ScalarValue::HugeInt(value),
            LogicalType::UTinyInt => ScalarValue::UTinyInt(value as u8),
            LogicalType::USmallInt => ScalarValue::USmallInt(value as u16),
            LogicalType::UInteger => ScalarValue::UInteger(value as u32),
            LogicalType::UBigInt => ScalarValue::UBigInt(value as u64),
            _ => return None,
        })
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Varchar(a), Self::Varchar(b)) => a == b,
            // Integral values compare by value, not by representation, so a
            // BigInt(5) equals a UTinyInt(5). Compression constants survive
            // retyping this way.
            _ => match (self.to_i128(), other.to_i128()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Boolean(v) => v.hash(state),
            Self::Double(v) => v.hash(state),
            Self::Varchar(v) => v.hash(state),
            other => other.to_i128().hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::TinyInt(v) => write!(f, "{}", v),
            ScalarValue::SmallInt(v) => write!(f, "{}", v),
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::BigInt(v) => write!(f, "{}", v),
            ScalarValue::HugeInt(v) => write!(f, "{}", v),
            ScalarValue::UTinyInt(v) => write!(f, "{}", v),
            ScalarValue::USmallInt(v) => write!(f, "{}", v),
            ScalarValue::UInteger(v) => write!(f, "{}", v),
            ScalarValue::UBigInt(v) => write!(f, "{}", v),
            ScalarValue::Double(v) => write!(f, "{}", v),
            ScalarValue::Varchar(v) => write!(f, "'{}'", v),
        }
    }
}

/// Comparison operators usable as join predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonType {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

/// Scalar functions the optimizer itself plants into plans.
///
/// These are the compress/decompress families and the subtraction used for
/// range evaluation; the host's full function catalog is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    IntegralCompress,
    IntegralDecompress,
    StringCompress,
    StringDecompress,
    Subtract,
}

/// Owned scalar expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Reference to a column produced by a descendant operator.
    BoundColumnRef {
        binding: ColumnBinding,
        return_type: LogicalType,
    },
    /// Constant value.
    BoundConstant { value: ScalarValue },
    /// Function call with owned arguments.
    BoundFunction {
        function: FunctionKind,
        return_type: LogicalType,
        arguments: Vec<Expression>,
    },
    /// Binary comparison; the join extractor promotes these to graph edges.
    Comparison {
        comparison: ComparisonType,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column_ref(binding: ColumnBinding, return_type: LogicalType) -> Self {
        Expression::BoundColumnRef {
            binding,
            return_type,
        }
    }

    pub fn constant(value: ScalarValue) -> Self {
        Expression::BoundConstant { value }
    }

    pub fn comparison(comparison: ComparisonType, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            comparison,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn return_type(&self) -> LogicalType {
        match self {
            Expression::BoundColumnRef { return_type, .. } => *return_type,
            Expression::BoundConstant { value } => value.logical_type(),
            Expression::BoundFunction { return_type, .. } => *return_type,
            Expression::Comparison { .. } => LogicalType::Boolean,
        }
    }

    /// Visit every node of this expression tree, parents before children.
    pub fn visit<F: FnMut(&Expression)>(&self, f: &mut F) {
        f(self);
        match self {
            Expression::BoundColumnRef { .. } | Expression::BoundConstant { .. } => {}
            Expression::BoundFunction { arguments, .. } => {
                for arg in arguments {
                    arg.visit(f);
                }
            }
            Expression::Comparison { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
        }
    }

    /// Mutable counterpart of [`visit`](Self::visit).
    pub fn visit_mut<F: FnMut(&mut Expression)>(&mut self, f: &mut F) {
        f(self);
        match self {
            Expression::BoundColumnRef { .. } | Expression::BoundConstant { .. } => {}
            Expression::BoundFunction { arguments, .. } => {
                for arg in arguments {
                    arg.visit_mut(f);
                }
            }
            Expression::Comparison { left, right, .. } => {
                left.visit_mut(f);
                right.visit_mut(f);
            }
        }
    }

    /// Collect the bindings of all column references in this tree.
    pub fn referenced_bindings(&self, out: &mut std::collections::HashSet<ColumnBinding>) {
        self.visit(&mut |expr| {
            if let Expression::BoundColumnRef { binding, .. } = expr {
                out.insert(*binding);
            }
        });
    }

    /// True iff some column reference in this tree resolves to `binding`.
    pub fn uses_binding(&self, binding: &ColumnBinding) -> bool {
        let mut uses = false;
        self.visit(&mut |expr| {
            if let Expression::BoundColumnRef { binding: b, .. } = expr {
                uses = uses || b == binding;
            }
        });
        uses
    }

    pub fn is_column_ref(&self) -> bool {
        matches!(self, Expression::BoundColumnRef { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_equality_is_by_pair() {
        assert_eq!(ColumnBinding::new(3, 1), ColumnBinding::new(3, 1));
        assert_ne!(ColumnBinding::new(3, 1), ColumnBinding::new(1, 3));
    }

    #[test]
    fn test_scalar_value_integral_equality_crosses_types() {
        assert_eq!(ScalarValue::BigInt(1000), ScalarValue::UInteger(1000));
        assert_ne!(ScalarValue::BigInt(1000), ScalarValue::BigInt(1001));
    }

    #[test]
    fn test_from_i128_respects_bounds() {
        assert_eq!(
            ScalarValue::from_i128(LogicalType::UTinyInt, 255),
            Some(ScalarValue::UTinyInt(255))
        );
        assert_eq!(ScalarValue::from_i128(LogicalType::UTinyInt, 256), None);
        assert_eq!(ScalarValue::from_i128(LogicalType::UTinyInt, -1), None);
    }

    #[test]
    fn test_uses_binding_descends_into_functions() {
        let b = ColumnBinding::new(2, 0);
        let expr = Expression::BoundFunction {
            function: FunctionKind::IntegralCompress,
            return_type: LogicalType::UTinyInt,
            arguments: vec![
                Expression::column_ref(b, LogicalType::BigInt),
                Expression::constant(ScalarValue::BigInt(1000)),
            ],
        };
        assert!(expr.uses_binding(&b));
        assert!(!expr.uses_binding(&ColumnBinding::new(2, 1)));
    }
}

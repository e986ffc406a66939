//! Constant values and operator kinds of the scalar expression layer.

use tessera_dtype::DType;

/// Constant carried by a scalar expression.
///
/// Index arithmetic only ever needs machine integers and the booleans produced by
/// comparisons, so there is no float variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
}

impl ConstValue {
    pub const fn dtype(&self) -> DType {
        match self {
            ConstValue::Int(_) => DType::Int64,
            ConstValue::Bool(_) => DType::Bool,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            ConstValue::Bool(_) => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(v) => Some(*v),
            ConstValue::Int(_) => None,
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Abs,
    Sign,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    /// Python `//`: rounds toward negative infinity.
    FloorDiv,
    Max,
    Min,

    // Comparison
    Lt,
    Ge,
    Eq,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    pub const fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Eq)
    }

    /// Infix symbol used by the expression printer, `None` for function-style ops.
    pub const fn symbol(self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Max | BinaryOp::Min => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TernaryOp {
    /// `where(cond, then, else)`.
    Where,
}

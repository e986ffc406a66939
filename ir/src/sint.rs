//! Symbolic integers and booleans.
//!
//! [`SInt`] is either a known `i64` or a symbolic [`ScalarExpr`]. Arithmetic on two
//! constants folds immediately, so code written against `SInt` produces plain numbers
//! whenever every input is known and a minimal expression otherwise. [`SBool`] plays
//! the same role for predicates and provides [`SBool::select`], the data-dependent
//! `where` used in place of host-language branches.

use std::sync::Arc;

use tessera_dtype::DType;

use crate::error::*;
use crate::scalar::{Bindings, ScalarExpr};
use crate::types::{BinaryOp, ConstValue, UnaryOp};

/// Symbolic integer: a known value or an integer expression.
///
/// # Examples
///
/// ```rust
/// # use tessera_ir::SInt;
/// let n = SInt::symbol("n");
/// let last = n.clone() - 1;
/// assert!(last.is_symbolic());
///
/// let folded = SInt::from(5) - 1;
/// assert_eq!(folded.as_const(), Some(4));
/// ```
#[derive(Debug, Clone)]
pub enum SInt {
    Const(i64),
    /// Never a constant node; constants are folded into [`SInt::Const`].
    Symbolic(Arc<ScalarExpr>),
}

/// Symbolic boolean.
#[derive(Debug, Clone)]
pub enum SBool {
    Const(bool),
    Symbolic(Arc<ScalarExpr>),
}

impl PartialEq for SInt {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SInt::Const(a), SInt::Const(b)) => a == b,
            (SInt::Symbolic(a), SInt::Symbolic(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl Eq for SInt {}

impl std::hash::Hash for SInt {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SInt::Const(v) => v.hash(state),
            SInt::Symbolic(expr) => expr.id.hash(state),
        }
    }
}

impl PartialEq for SBool {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SBool::Const(a), SBool::Const(b)) => a == b,
            (SBool::Symbolic(a), SBool::Symbolic(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl Eq for SBool {}

impl SInt {
    pub fn symbol(name: impl Into<String>) -> Self {
        SInt::Symbolic(ScalarExpr::symbol(name))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, SInt::Const(_))
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, SInt::Symbolic(_))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            SInt::Const(v) => Some(*v),
            SInt::Symbolic(_) => None,
        }
    }

    /// Known value, or the "not a compile-time constant" signal.
    pub fn to_const(&self) -> Result<i64> {
        self.as_const().ok_or(Error::NotScalarConstant)
    }

    pub fn to_expr(&self) -> Arc<ScalarExpr> {
        match self {
            SInt::Const(v) => ScalarExpr::const_int(*v),
            SInt::Symbolic(expr) => expr.clone(),
        }
    }

    pub fn evaluate(&self, bindings: &Bindings) -> Result<i64> {
        match self {
            SInt::Const(v) => Ok(*v),
            SInt::Symbolic(expr) => match expr.evaluate(bindings)? {
                ConstValue::Int(v) => Ok(v),
                ConstValue::Bool(_) => DTypeMismatchSnafu { expected: DType::Int64, actual: DType::Bool }.fail(),
            },
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        SInt::from(ScalarExpr::unary_unchecked(op, self.to_expr()))
    }

    fn binary(self, op: BinaryOp, rhs: SInt) -> Self {
        use SInt::Const;
        match (op, &self, &rhs) {
            (BinaryOp::Add, Const(0), _) | (BinaryOp::Mul, Const(1), _) => rhs,
            (BinaryOp::Add | BinaryOp::Sub, _, Const(0)) | (BinaryOp::Mul | BinaryOp::FloorDiv, _, Const(1)) => self,
            (BinaryOp::Mul, Const(0), _) | (BinaryOp::Mul, _, Const(0)) => Const(0),
            (BinaryOp::Sub, a, b) if a == b => Const(0),
            (BinaryOp::Max | BinaryOp::Min, a, b) if a == b => self,
            _ => SInt::from(ScalarExpr::binary_unchecked(op, self.to_expr(), rhs.to_expr())),
        }
    }

    fn compare(&self, op: BinaryOp, rhs: &SInt) -> SBool {
        if self == rhs {
            return SBool::Const(op != BinaryOp::Lt);
        }
        SBool::from(ScalarExpr::binary_unchecked(op, self.to_expr(), rhs.to_expr()))
    }

    pub fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    /// -1, 0 or 1.
    pub fn sign(self) -> Self {
        self.unary(UnaryOp::Sign)
    }

    /// Python `//`.
    pub fn floor_div(self, rhs: impl Into<SInt>) -> Self {
        self.binary(BinaryOp::FloorDiv, rhs.into())
    }

    pub fn max(self, rhs: impl Into<SInt>) -> Self {
        self.binary(BinaryOp::Max, rhs.into())
    }

    pub fn min(self, rhs: impl Into<SInt>) -> Self {
        self.binary(BinaryOp::Min, rhs.into())
    }

    pub fn lt(&self, rhs: impl Into<SInt>) -> SBool {
        self.compare(BinaryOp::Lt, &rhs.into())
    }

    pub fn ge(&self, rhs: impl Into<SInt>) -> SBool {
        self.compare(BinaryOp::Ge, &rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<SInt>) -> SBool {
        rhs.into().lt(self.clone())
    }

    pub fn le(&self, rhs: impl Into<SInt>) -> SBool {
        rhs.into().ge(self.clone())
    }

    /// Symbolic `==`; `PartialEq` is structural identity.
    pub fn eq_(&self, rhs: impl Into<SInt>) -> SBool {
        self.compare(BinaryOp::Eq, &rhs.into())
    }
}

impl SBool {
    pub fn as_const(&self) -> Option<bool> {
        match self {
            SBool::Const(v) => Some(*v),
            SBool::Symbolic(_) => None,
        }
    }

    pub fn to_expr(&self) -> Arc<ScalarExpr> {
        match self {
            SBool::Const(v) => ScalarExpr::const_bool(*v),
            SBool::Symbolic(expr) => expr.clone(),
        }
    }

    pub fn evaluate(&self, bindings: &Bindings) -> Result<bool> {
        match self {
            SBool::Const(v) => Ok(*v),
            SBool::Symbolic(expr) => match expr.evaluate(bindings)? {
                ConstValue::Bool(v) => Ok(v),
                ConstValue::Int(_) => DTypeMismatchSnafu { expected: DType::Bool, actual: DType::Int64 }.fail(),
            },
        }
    }

    pub fn not(&self) -> SBool {
        match self {
            SBool::Const(v) => SBool::Const(!v),
            SBool::Symbolic(expr) => SBool::from(ScalarExpr::unary_unchecked(UnaryOp::Not, expr.clone())),
        }
    }

    pub fn and(&self, rhs: &SBool) -> SBool {
        match (self, rhs) {
            (SBool::Const(false), _) | (_, SBool::Const(false)) => SBool::Const(false),
            (SBool::Const(true), other) | (other, SBool::Const(true)) => other.clone(),
            (a, b) => SBool::from(ScalarExpr::binary_unchecked(BinaryOp::And, a.to_expr(), b.to_expr())),
        }
    }

    pub fn or(&self, rhs: &SBool) -> SBool {
        match (self, rhs) {
            (SBool::Const(true), _) | (_, SBool::Const(true)) => SBool::Const(true),
            (SBool::Const(false), other) | (other, SBool::Const(false)) => other.clone(),
            (a, b) => SBool::from(ScalarExpr::binary_unchecked(BinaryOp::Or, a.to_expr(), b.to_expr())),
        }
    }

    /// `then` where this predicate holds, `otherwise` elsewhere.
    ///
    /// ```rust
    /// # use tessera_ir::{SBool, SInt};
    /// let i = SInt::symbol("i");
    /// let n = SInt::symbol("n");
    /// let wrapped = i.lt(0).select(i.clone() + n.clone(), i.clone());
    /// assert!(wrapped.is_symbolic());
    ///
    /// assert_eq!(SBool::Const(true).select(1, 2), SInt::Const(1));
    /// ```
    pub fn select(&self, then: impl Into<SInt>, otherwise: impl Into<SInt>) -> SInt {
        let (then, otherwise) = (then.into(), otherwise.into());
        match self {
            SBool::Const(true) => then,
            SBool::Const(false) => otherwise,
            SBool::Symbolic(_) if then == otherwise => then,
            SBool::Symbolic(cond) => {
                SInt::from(ScalarExpr::where_unchecked(cond.clone(), then.to_expr(), otherwise.to_expr()))
            }
        }
    }
}

// =========================================================================
// Conversions
// =========================================================================

impl From<i64> for SInt {
    fn from(value: i64) -> Self {
        SInt::Const(value)
    }
}

impl From<i32> for SInt {
    fn from(value: i32) -> Self {
        SInt::Const(value as i64)
    }
}

impl From<usize> for SInt {
    fn from(value: usize) -> Self {
        SInt::Const(value as i64)
    }
}

impl From<&SInt> for SInt {
    fn from(value: &SInt) -> Self {
        value.clone()
    }
}

impl From<Arc<ScalarExpr>> for SInt {
    fn from(expr: Arc<ScalarExpr>) -> Self {
        match expr.as_const() {
            Some(ConstValue::Int(v)) => SInt::Const(v),
            _ => SInt::Symbolic(expr),
        }
    }
}

impl From<bool> for SBool {
    fn from(value: bool) -> Self {
        SBool::Const(value)
    }
}

impl From<Arc<ScalarExpr>> for SBool {
    fn from(expr: Arc<ScalarExpr>) -> Self {
        match expr.as_const() {
            Some(ConstValue::Bool(v)) => SBool::Const(v),
            _ => SBool::Symbolic(expr),
        }
    }
}

impl std::fmt::Display for SInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SInt::Const(v) => write!(f, "{v}"),
            SInt::Symbolic(expr) => write!(f, "{expr}"),
        }
    }
}

impl std::fmt::Display for SBool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SBool::Const(v) => write!(f, "{v}"),
            SBool::Symbolic(expr) => write!(f, "{expr}"),
        }
    }
}

// =========================================================================
// Operators
// =========================================================================

macro_rules! impl_sint_binop {
    ($($trait:ident::$method:ident => $op:expr),* $(,)?) => {
        $(
            impl<T: Into<SInt>> std::ops::$trait<T> for SInt {
                type Output = SInt;

                fn $method(self, rhs: T) -> SInt {
                    self.binary($op, rhs.into())
                }
            }

            impl<T: Into<SInt>> std::ops::$trait<T> for &SInt {
                type Output = SInt;

                fn $method(self, rhs: T) -> SInt {
                    self.clone().binary($op, rhs.into())
                }
            }
        )*
    };
}

impl_sint_binop! {
    Add::add => BinaryOp::Add,
    Sub::sub => BinaryOp::Sub,
    Mul::mul => BinaryOp::Mul,
}

impl std::ops::Neg for SInt {
    type Output = SInt;

    fn neg(self) -> SInt {
        self.unary(UnaryOp::Neg)
    }
}

/// Product of all values; `1` for an empty slice.
pub fn sint_prod(values: &[SInt]) -> SInt {
    values.iter().fold(SInt::Const(1), |acc, v| acc * v)
}

/// Maximum of all values; `None` for an empty slice.
pub fn sint_max(values: &[SInt]) -> Option<SInt> {
    values.iter().cloned().reduce(|acc, v| acc.max(v))
}

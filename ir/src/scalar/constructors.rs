//! Checked constructors with constant folding.

use std::sync::Arc;

use snafu::ensure;
use tessera_dtype::DType;

use super::core::{ExprOp, ScalarExpr};
use super::eval::{eval_binary_op, eval_ternary_op, eval_unary_op};
use crate::error::*;
use crate::types::{BinaryOp, ConstValue, TernaryOp, UnaryOp};

impl ScalarExpr {
    pub fn const_int(value: i64) -> Arc<Self> {
        Self::new(ExprOp::Const(ConstValue::Int(value)), DType::Int64)
    }

    pub fn const_bool(value: bool) -> Arc<Self> {
        Self::new(ExprOp::Const(ConstValue::Bool(value)), DType::Bool)
    }

    /// Free integer symbol. Two symbols with the same name are the same expression.
    pub fn symbol(name: impl Into<String>) -> Arc<Self> {
        Self::new(ExprOp::Symbol(name.into()), DType::Int64)
    }

    pub fn try_unary(op: UnaryOp, x: &Arc<Self>) -> Result<Arc<Self>> {
        let expected = if op == UnaryOp::Not { DType::Bool } else { DType::Int64 };
        ensure!(x.dtype == expected, InvalidOperandForUnaryOpSnafu { operation: op, dtype: x.dtype });
        Ok(Self::unary_unchecked(op, x.clone()))
    }

    pub fn try_binary(op: BinaryOp, lhs: &Arc<Self>, rhs: &Arc<Self>) -> Result<Arc<Self>> {
        let valid = match op {
            BinaryOp::Eq => lhs.dtype == rhs.dtype,
            BinaryOp::And | BinaryOp::Or => lhs.dtype == DType::Bool && rhs.dtype == DType::Bool,
            _ => lhs.dtype == DType::Int64 && rhs.dtype == DType::Int64,
        };
        ensure!(valid, InvalidOperandForBinaryOpSnafu { operation: op, lhs: lhs.dtype, rhs: rhs.dtype });
        Ok(Self::binary_unchecked(op, lhs.clone(), rhs.clone()))
    }

    pub fn try_where(cond: &Arc<Self>, then: &Arc<Self>, otherwise: &Arc<Self>) -> Result<Arc<Self>> {
        ensure!(cond.dtype == DType::Bool, DTypeMismatchSnafu { expected: DType::Bool, actual: cond.dtype });
        ensure!(then.dtype == otherwise.dtype, DTypeMismatchSnafu { expected: then.dtype, actual: otherwise.dtype });
        Ok(Self::where_unchecked(cond.clone(), then.clone(), otherwise.clone()))
    }

    // Unchecked builders used by `SInt`/`SBool`, whose types already guarantee the
    // operand dtypes. Constant operands fold; a fold that fails (division by zero)
    // stays symbolic and fails again at evaluation.

    pub(crate) fn unary_unchecked(op: UnaryOp, x: Arc<Self>) -> Arc<Self> {
        if let Some(v) = x.as_const()
            && let Ok(folded) = eval_unary_op(op, v)
        {
            return Self::new(ExprOp::Const(folded), folded.dtype());
        }
        let dtype = x.dtype;
        Self::new(ExprOp::Unary(op, x), dtype)
    }

    pub(crate) fn binary_unchecked(op: BinaryOp, lhs: Arc<Self>, rhs: Arc<Self>) -> Arc<Self> {
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const())
            && let Ok(folded) = eval_binary_op(op, a, b)
        {
            return Self::new(ExprOp::Const(folded), folded.dtype());
        }
        let dtype = if op.is_comparison() { DType::Bool } else { lhs.dtype };
        Self::new(ExprOp::Binary(op, lhs, rhs), dtype)
    }

    pub(crate) fn where_unchecked(cond: Arc<Self>, then: Arc<Self>, otherwise: Arc<Self>) -> Arc<Self> {
        if let Some(c) = cond.as_const()
            && let (Some(a), Some(b)) = (then.as_const(), otherwise.as_const())
            && let Ok(folded) = eval_ternary_op(TernaryOp::Where, c, a, b)
        {
            return Self::new(ExprOp::Const(folded), folded.dtype());
        }
        let dtype = then.dtype;
        Self::new(ExprOp::Ternary(TernaryOp::Where, cond, then, otherwise), dtype)
    }
}

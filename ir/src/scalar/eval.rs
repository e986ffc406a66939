//! Constant evaluation of scalar expressions.
//!
//! Integer arithmetic wraps. `FloorDiv` rounds toward negative infinity like Python's
//! `//`, which the slice algorithms depend on for negative steps.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::OptionExt;

use super::core::{Bindings, ExprOp, ScalarExpr};
use crate::error::*;
use crate::types::{BinaryOp, ConstValue, TernaryOp, UnaryOp};

/// Python floor division on machine integers.
pub fn floor_div(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return DivisionByZeroSnafu.fail();
    }
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) { Ok(q.wrapping_sub(1)) } else { Ok(q) }
}

pub fn eval_unary_op(op: UnaryOp, v: ConstValue) -> Result<ConstValue> {
    use ConstValue::*;
    match (op, v) {
        (UnaryOp::Neg, Int(x)) => Ok(Int(x.wrapping_neg())),
        (UnaryOp::Abs, Int(x)) => Ok(Int(x.wrapping_abs())),
        (UnaryOp::Sign, Int(x)) => Ok(Int(x.signum())),
        (UnaryOp::Not, Bool(x)) => Ok(Bool(!x)),
        (operation, v) => InvalidOperandForUnaryOpSnafu { operation, dtype: v.dtype() }.fail(),
    }
}

pub fn eval_binary_op(op: BinaryOp, a: ConstValue, b: ConstValue) -> Result<ConstValue> {
    use ConstValue::*;
    Ok(match (op, a, b) {
        (BinaryOp::Add, Int(x), Int(y)) => Int(x.wrapping_add(y)),
        (BinaryOp::Sub, Int(x), Int(y)) => Int(x.wrapping_sub(y)),
        (BinaryOp::Mul, Int(x), Int(y)) => Int(x.wrapping_mul(y)),
        (BinaryOp::FloorDiv, Int(x), Int(y)) => Int(floor_div(x, y)?),
        (BinaryOp::Max, Int(x), Int(y)) => Int(x.max(y)),
        (BinaryOp::Min, Int(x), Int(y)) => Int(x.min(y)),
        (BinaryOp::Lt, Int(x), Int(y)) => Bool(x < y),
        (BinaryOp::Ge, Int(x), Int(y)) => Bool(x >= y),
        (BinaryOp::Eq, x, y) if x.dtype() == y.dtype() => Bool(x == y),
        (BinaryOp::And, Bool(x), Bool(y)) => Bool(x && y),
        (BinaryOp::Or, Bool(x), Bool(y)) => Bool(x || y),
        (operation, a, b) => {
            return InvalidOperandForBinaryOpSnafu { operation, lhs: a.dtype(), rhs: b.dtype() }.fail();
        }
    })
}

pub fn eval_ternary_op(op: TernaryOp, cond: ConstValue, a: ConstValue, b: ConstValue) -> Result<ConstValue> {
    match (op, cond) {
        (TernaryOp::Where, ConstValue::Bool(c)) if a.dtype() == b.dtype() => Ok(if c { a } else { b }),
        (TernaryOp::Where, ConstValue::Bool(_)) => DTypeMismatchSnafu { expected: a.dtype(), actual: b.dtype() }.fail(),
        (TernaryOp::Where, c) => DTypeMismatchSnafu { expected: tessera_dtype::DType::Bool, actual: c.dtype() }.fail(),
    }
}

impl ScalarExpr {
    /// Evaluate with every free symbol bound.
    ///
    /// Both arms of a `where` are evaluated, so an arm that divides by zero fails even
    /// when it is not selected.
    pub fn evaluate(self: &Arc<Self>, bindings: &Bindings) -> Result<ConstValue> {
        let mut values: HashMap<u64, ConstValue> = HashMap::new();

        for node in self.toposort() {
            let get = |child: &Arc<ScalarExpr>| values[&child.id];
            let value = match &node.op {
                ExprOp::Const(v) => *v,
                ExprOp::Symbol(name) => {
                    ConstValue::Int(*bindings.get(name).context(UnboundSymbolSnafu { name: name.clone() })?)
                }
                ExprOp::Unary(op, x) => eval_unary_op(*op, get(x))?,
                ExprOp::Binary(op, a, b) => eval_binary_op(*op, get(a), get(b))?,
                ExprOp::Ternary(op, c, a, b) => eval_ternary_op(*op, get(c), get(a), get(b))?,
            };
            values.insert(node.id, value);
        }

        Ok(values[&self.id])
    }
}

//! Core scalar expression struct and graph traversal.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::types::{BinaryOp, ConstValue, TernaryOp, UnaryOp};

/// Values for free symbols, by name.
pub type Bindings = HashMap<String, i64>;

/// Operation of a scalar expression node.
#[derive(Debug, Clone)]
pub enum ExprOp {
    Const(ConstValue),
    /// Free integer symbol, bound at evaluation time.
    Symbol(String),
    Unary(UnaryOp, Arc<ScalarExpr>),
    Binary(BinaryOp, Arc<ScalarExpr>, Arc<ScalarExpr>),
    Ternary(TernaryOp, Arc<ScalarExpr>, Arc<ScalarExpr>, Arc<ScalarExpr>),
}

impl ExprOp {
    pub fn children(&self) -> SmallVec<[&Arc<ScalarExpr>; 3]> {
        match self {
            ExprOp::Const(_) | ExprOp::Symbol(_) => SmallVec::new(),
            ExprOp::Unary(_, x) => smallvec::smallvec![x],
            ExprOp::Binary(_, a, b) => smallvec::smallvec![a, b],
            ExprOp::Ternary(_, a, b, c) => smallvec::smallvec![a, b, c],
        }
    }
}

/// Node of a hash-consed scalar expression DAG.
///
/// Structurally identical expressions share one allocation, so identity (`id`)
/// comparison is structural comparison.
#[derive(derive_more::Debug)]
pub struct ScalarExpr {
    pub id: u64,
    pub(crate) op: ExprOp,
    #[debug(skip)]
    pub(crate) dtype: DType,
}

impl ScalarExpr {
    pub fn op(&self) -> &ExprOp {
        &self.op
    }

    /// `Int64` for integer expressions, `Bool` for predicates.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_const(&self) -> Option<ConstValue> {
        match self.op {
            ExprOp::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.as_const().is_some()
    }

    /// Names of the free symbols this expression depends on.
    pub fn symbols(self: &Arc<Self>) -> BTreeSet<String> {
        self.toposort()
            .iter()
            .filter_map(|node| match &node.op {
                ExprOp::Symbol(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Nodes in dependency order, children first.
    pub fn toposort(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(Arc<Self>, bool)> = vec![(self.clone(), false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node.id) {
                continue;
            }
            stack.push((node.clone(), true));
            for child in node.op.children().into_iter().rev() {
                if !visited.contains(&child.id) {
                    stack.push((child.clone(), false));
                }
            }
        }

        order
    }
}

fn needs_parens(expr: &ScalarExpr) -> bool {
    matches!(expr.op, ExprOp::Binary(op, _, _) if op.symbol().is_some())
}

struct Operand<'a>(&'a ScalarExpr);

impl std::fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if needs_parens(self.0) { write!(f, "({})", self.0) } else { write!(f, "{}", self.0) }
    }
}

impl std::fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.op {
            ExprOp::Const(v) => write!(f, "{v}"),
            ExprOp::Symbol(name) => f.write_str(name),
            ExprOp::Unary(UnaryOp::Neg, x) => write!(f, "-{}", Operand(x)),
            ExprOp::Unary(UnaryOp::Not, x) => write!(f, "!{}", Operand(x)),
            ExprOp::Unary(op, x) => write!(f, "{op}({x})"),
            ExprOp::Binary(op, a, b) => match op.symbol() {
                Some(sym) => write!(f, "{} {sym} {}", Operand(a), Operand(b)),
                None => write!(f, "{op}({a}, {b})"),
            },
            ExprOp::Ternary(TernaryOp::Where, c, a, b) => write!(f, "where({c}, {a}, {b})"),
        }
    }
}

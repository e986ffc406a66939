//! Hash consing for scalar expressions.
//!
//! Structurally identical expressions share one `Arc`, across threads. The cache holds
//! `Weak` references: an expression lives as long as something outside the cache
//! holds it, and dead entries are dropped lazily or by [`gc_dead_refs`].

use std::mem::discriminant;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use papaya::HashMap;
use smallvec::SmallVec;
use tessera_dtype::DType;

use super::core::{ExprOp, ScalarExpr};
use crate::types::{BinaryOp, ConstValue, TernaryOp, UnaryOp};

static EXPR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_expr_id() -> u64 {
    EXPR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Cache key. Children are referenced by their stable ids so hashing never recurses.
#[derive(Eq, PartialEq, Hash, Clone)]
struct ExprKey {
    op_discriminant: std::mem::Discriminant<ExprOp>,
    dtype: DType,
    src_ids: SmallVec<[u64; 3]>,
    op_data: ExprData,
}

/// Non-recursive payload of an [`ExprOp`].
#[derive(Eq, PartialEq, Hash, Clone)]
enum ExprData {
    Const(ConstValue),
    Symbol(String),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Ternary(TernaryOp),
}

impl ExprKey {
    fn new(op: &ExprOp, dtype: DType) -> Self {
        let op_data = match op {
            ExprOp::Const(v) => ExprData::Const(*v),
            ExprOp::Symbol(name) => ExprData::Symbol(name.clone()),
            ExprOp::Unary(op, _) => ExprData::Unary(*op),
            ExprOp::Binary(op, _, _) => ExprData::Binary(*op),
            ExprOp::Ternary(op, _, _, _) => ExprData::Ternary(*op),
        };
        let src_ids = op.children().into_iter().map(|child| child.id).collect();

        Self { op_discriminant: discriminant(op), dtype, src_ids, op_data }
    }
}

static EXPRS: OnceLock<HashMap<ExprKey, Weak<ScalarExpr>>> = OnceLock::new();

fn exprs() -> &'static HashMap<ExprKey, Weak<ScalarExpr>> {
    EXPRS.get_or_init(HashMap::new)
}

/// Remove dead weak references from the expression cache.
pub fn gc_dead_refs() {
    let map = exprs();
    let guard = map.guard();

    let dead: Vec<ExprKey> =
        map.iter(&guard).filter(|(_, weak)| weak.upgrade().is_none()).map(|(k, _)| k.clone()).collect();

    for key in dead {
        map.remove(&key, &guard);
    }
}

/// Number of cached expressions that are still alive.
pub fn live_expr_count() -> usize {
    let map = exprs();
    let guard = map.guard();
    map.iter(&guard).filter(|(_, weak)| weak.strong_count() > 0).count()
}

impl ScalarExpr {
    /// Create an expression node, reusing a live identical one if it exists.
    pub(crate) fn new(op: ExprOp, dtype: DType) -> Arc<Self> {
        use papaya::{Compute, Operation};

        let key = ExprKey::new(&op, dtype);
        let guard = exprs().guard();

        if let Some(weak) = exprs().get(&key, &guard)
            && let Some(arc) = weak.upgrade()
        {
            return arc;
        }

        let new_arc = Arc::new(Self { id: next_expr_id(), op, dtype });
        let new_weak = Arc::downgrade(&new_arc);

        let result = exprs().compute(
            key,
            |entry| match entry {
                Some((_, existing)) => match existing.upgrade() {
                    Some(arc) => Operation::Abort(arc),
                    None => Operation::Insert(new_weak.clone()),
                },
                None => Operation::Insert(new_weak.clone()),
            },
            &guard,
        );

        match result {
            Compute::Aborted(existing) => existing,
            _ => new_arc,
        }
    }
}

//! Hash-consed scalar expressions.
//!
//! Symbolic dimension lengths and runtime index values are represented as small
//! integer/boolean expression DAGs over named symbols. Data-dependent control flow is
//! written with `where` nodes rather than host-language branches.

mod constructors;
mod core;
pub mod eval;
mod hash_consing;

pub use self::core::{Bindings, ExprOp, ScalarExpr};
pub use hash_consing::{gc_dead_refs, live_expr_count};

//! Core graph layer for tessera.
//!
//! This crate defines what indexing operators are built on:
//!
//! - [`scalar`] - hash-consed scalar expressions with constant folding
//! - [`sint`] - symbolic integers and booleans over those expressions
//! - [`shape`] - declared and symbolic shapes, NumPy broadcasting
//! - [`value`] - concrete `ndarray`-backed tensor values
//! - [`graph`] - typed variables, the [`Op`] trait, and the reference interpreter
//! - [`intern`] - structural interning of operator instances
//! - [`config`] - process-wide settings
//! - [`error`] - error types and result handling

pub mod config;
pub mod error;
pub mod graph;
pub mod intern;
pub mod prelude;
pub mod scalar;
pub mod shape;
pub mod sint;
pub mod types;
pub mod value;


pub use config::Config;
pub use error::{Error, Result};
pub use graph::{Apply, Gradient, Op, Ownership, TensorType, Variable, evaluate, scalar_constant_value};
pub use scalar::{Bindings, ScalarExpr};
pub use shape::{Dim, Shape, StaticShape};
pub use sint::{SBool, SInt, sint_max, sint_prod};
pub use types::{BinaryOp, ConstValue, TernaryOp, UnaryOp};
pub use value::{ArrayData, TensorValue};

pub use tessera_dtype::DType;

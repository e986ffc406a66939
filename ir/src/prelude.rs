//! Common imports for building tensor graphs.
//!
//! ```rust
//! use tessera_ir::prelude::*;
//! ```

pub use crate::graph::{Apply, Gradient, Op, Ownership, TensorType, Variable, evaluate};
pub use crate::shape::{Dim, Shape, StaticShape};
pub use crate::sint::{SBool, SInt};
pub use crate::value::TensorValue;

pub use tessera_dtype::DType;

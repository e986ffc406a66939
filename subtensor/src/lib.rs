//! NumPy-style indexing operators for tessera graphs.
//!
//! - [`normalize`] - user-facing index entries to descriptors and slot inputs
//! - [`canonical`] - canonical slices over constant or symbolic lengths
//! - [`shape_infer`] - result shapes of mixed basic/advanced indexing
//! - [`ops`] - the read and write operators
//! - [`exec`] - reference execution on concrete arrays
//! - [`api`] - `index`, `inc_subtensor`, `set_subtensor`, `take` and friends
//!
//! ```rust
//! # use tessera_ir::{DType, TensorType, TensorValue, Variable, evaluate};
//! # use tessera_subtensor::{index, s};
//! let x = Variable::input("x", TensorType::new(DType::Int64, [5usize]));
//! let y = index(&x, &[s![_, _, (-2)]]).unwrap();
//! let value = TensorValue::from(ndarray::array![0i64, 1, 2, 3, 4]);
//! let out = evaluate(&[y], &[(x, value)]).unwrap();
//! assert_eq!(out[0].as_int().unwrap().iter().copied().collect::<Vec<_>>(), vec![4, 2, 0]);
//! ```

pub mod api;
pub mod canonical;
pub mod descriptor;
pub mod error;
pub mod exec;
pub mod grad;
pub mod normalize;
pub mod ops;
pub mod shape_infer;

#[cfg(test)]
mod test;

pub use api::{
    advanced_inc_subtensor1, advanced_set_subtensor1, advanced_subtensor1, flip, inc_subtensor, index, set_subtensor,
    slice_at_axis, take,
};
pub use canonical::{CanonicalSlice, canonical_index, canonical_slice};
pub use descriptor::{Bound, IndexDescriptor, ScalarIndex};
pub use error::{Error, Result};
pub use normalize::{RawIndex, RawScalar, RawSlice, as_index_literal, get_constant_idx, indices_from_subtensor};
pub use ops::{
    AdvancedIncSubtensor, AdvancedIncSubtensor1, AdvancedSubtensor, AdvancedSubtensor1, ClipIndices, IncSubtensor,
    Subtensor, TakeMode,
};
pub use shape_infer::indexed_result_shape;

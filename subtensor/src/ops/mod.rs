//! Indexing operators.
//!
//! Every operator is an immutable value interned in a per-type [`OpCache`], so graphs
//! built from identical indexing expressions share one instance:
//!
//! - [`Subtensor`] / [`IncSubtensor`] - basic indexing (integers, slices, new axes)
//! - [`AdvancedSubtensor1`] / [`AdvancedIncSubtensor1`] - one integer vector on axis 0
//! - [`AdvancedSubtensor`] / [`AdvancedIncSubtensor`] - any mix including arrays and masks
//! - [`ClipIndices`] - index rewriting behind `take` with `clip` and `wrap` modes
//!
//! [`OpCache`]: tessera_ir::intern::OpCache

mod advanced;
mod advanced1;
mod basic;
mod clip;

pub use advanced::{AdvancedIncSubtensor, AdvancedSubtensor};
pub use advanced1::{AdvancedIncSubtensor1, AdvancedSubtensor1};
pub use basic::{IncSubtensor, Subtensor};
pub use clip::{ClipIndices, TakeMode};

use snafu::ensure;
use tessera_ir::error::InputCountMismatchSnafu;
use tessera_ir::{Gradient, Op, Variable};

use crate::descriptor::IndexDescriptor;
use crate::error::*;
use crate::shape_infer::static_result_shape;

/// Split node inputs into the `count` data inputs and the index slots.
fn split_inputs<'a>(op: &dyn Op, inputs: &'a [Variable], count: usize) -> Result<(&'a [Variable], &'a [Variable])> {
    ensure!(
        inputs.len() >= count,
        InputCountMismatchSnafu { op: op.to_string(), expected: count, actual: inputs.len() }
    );
    Ok(inputs.split_at(count))
}

/// `value` must not have more axes than the region `x[idx_list]` it is written into.
fn check_value_rank(
    action: &'static str,
    x: &Variable,
    idx_list: &[IndexDescriptor],
    slots: &[Variable],
    value: &Variable,
) -> Result<()> {
    let target = static_result_shape(x, idx_list, slots)?.len();
    ensure!(value.ndim() <= target, ValueRankTooHighSnafu { action, target, value: value.ndim() });
    Ok(())
}

/// `value` must cast to the dtype of `x` without losing information.
fn check_value_dtype(action: &'static str, x: &Variable, value: &Variable) -> Result<()> {
    let (target, value) = (x.dtype(), value.dtype());
    ensure!(value.can_safe_cast(target), ValueDTypeSnafu { action, target, value });
    Ok(())
}

/// Data inputs are connected, index inputs never are.
fn connection(data: usize, total: usize) -> Vec<bool> {
    (0..total).map(|input| input < data).collect()
}

fn with_disconnected(grads: Vec<Variable>, total: usize) -> Vec<Gradient> {
    let data = grads.len();
    grads
        .into_iter()
        .map(Gradient::Connected)
        .chain((data..total).map(|_| Gradient::Disconnected))
        .collect()
}

/// Whether any index input gained leading axes when the node was batched.
fn slots_batched(original: &[Variable], batched: &[Variable]) -> bool {
    original.iter().zip(batched).any(|(original, batched)| batched.ndim() > original.ndim())
}

fn write_action(set_instead_of_increment: bool) -> &'static str {
    if set_instead_of_increment { "set" } else { "increment" }
}

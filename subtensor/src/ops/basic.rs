use std::sync::Arc;

use bon::bon;
use snafu::ensure;
use tessera_ir::graph::{Blockwise, zeros_like};
use tessera_ir::intern::OpCache;
use tessera_ir::{Apply, Gradient, Op, Ownership, Shape, TensorType, TensorValue, Variable};

use super::{check_value_dtype, check_value_rank, connection, split_inputs, with_disconnected, write_action};
use crate::descriptor::{DisplayIndices, IndexDescriptor, check_rank, check_slots};
use crate::error::*;
use crate::exec::{basic_gather, basic_scatter, resolve};
use crate::grad::{data_grad, sum_grad_over_bcasted_dims};
use crate::shape_infer::{indexed_result_shape, shape_indices, static_result_shape};

fn check_basic(op: &str, idx_list: &[IndexDescriptor]) -> Result<()> {
    ensure!(
        !idx_list.iter().any(IndexDescriptor::is_array),
        AdvancedIndexingSnafu { reason: format!("{op} only takes integers, slices and new axes") }
    );
    Ok(())
}

// =========================================================================
// Subtensor
// =========================================================================

/// `x[idx_list]` for basic indices.
///
/// Inputs are `[x, *slots]`. The output declares itself a view of `x`; the reference
/// implementation returns a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subtensor {
    idx_list: Vec<IndexDescriptor>,
}

static SUBTENSOR: OpCache<Subtensor> = OpCache::new();

impl Subtensor {
    pub fn new(idx_list: Vec<IndexDescriptor>) -> Result<Arc<Self>> {
        check_basic("Subtensor", &idx_list)?;
        Ok(SUBTENSOR.intern(Self { idx_list }))
    }

    pub fn idx_list(&self) -> &[IndexDescriptor] {
        &self.idx_list
    }

    fn output_type(&self, inputs: &[Variable]) -> Result<TensorType> {
        let (data, slots) = split_inputs(self, inputs, 1)?;
        let x = &data[0];
        check_rank(&self.idx_list, x.ndim())?;
        check_slots(&self.to_string(), &self.idx_list, slots)?;
        let shape = static_result_shape(x, &self.idx_list, slots)?;
        Ok(TensorType { dtype: x.dtype(), shape })
    }
}

impl std::fmt::Display for Subtensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subtensor{{{}}}", DisplayIndices(&self.idx_list))
    }
}

impl Op for Subtensor {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let ty = self.output_type(&inputs)?;
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, mut inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let slots = inputs.split_off(1);
        let indices = resolve("Subtensor", &self.idx_list, slots)?;
        Ok(basic_gather(&inputs[0], &indices)?)
    }

    fn infer_shape(&self, node: &Apply, input_shapes: &[Shape]) -> tessera_ir::Result<Shape> {
        let indices = shape_indices(&self.idx_list, &node.inputs()[1..], &input_shapes[1..]);
        Ok(indexed_result_shape(&input_shapes[0], &indices)?)
    }

    fn grad(&self, node: &Apply, output_grad: &Variable) -> tessera_ir::Result<Vec<Gradient>> {
        let inputs = node.inputs();
        let (x, slots) = (&inputs[0], &inputs[1..]);
        let gx = data_grad(x, || {
            let op = IncSubtensor::builder(self.idx_list.clone()).set_instead_of_increment(true).build()?;
            let mut grad_inputs = vec![zeros_like(x, None)?, output_grad.clone()];
            grad_inputs.extend_from_slice(slots);
            op.make_node(grad_inputs)
        })?;
        Ok(with_disconnected(vec![gx], inputs.len()))
    }

    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        connection(1, node.inputs().len())
    }

    fn ownership(&self) -> Ownership {
        Ownership::view_of(0)
    }

    /// When every index input is 0-d the operator is kept and one full slice is
    /// prepended per new leading axis of `x`. Any index input with axes, batched or
    /// scalar-like, goes through [`Blockwise`].
    fn vectorize(&self, node: &Apply, batched_inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        if batched_inputs[1..].iter().any(|slot| slot.ndim() > 0) {
            tracing::debug!(op = %self, "index inputs have axes");
            return Blockwise::vectorize_node(node, batched_inputs);
        }

        let batch_ndim = batched_inputs[0].ndim().saturating_sub(node.inputs()[0].ndim());
        tracing::debug!(op = %self, batch_ndim, "batching by prepending full slices");
        let idx_list = std::iter::repeat_n(IndexDescriptor::FULL_SLICE, batch_ndim)
            .chain(self.idx_list.iter().copied())
            .collect();
        Subtensor::new(idx_list)?.make_node(batched_inputs)
    }
}

// =========================================================================
// IncSubtensor
// =========================================================================

/// Write `y` into, or add it onto, the basic region `x[idx_list]`.
///
/// Inputs are `[x, y, *slots]`; the output has the type of `x`. With `inplace` the
/// operator overwrites the buffer of `x`, and the caller guarantees nothing else still
/// reads it. `tolerate_aliasing` additionally allows `y` to share memory with `x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncSubtensor {
    idx_list: Vec<IndexDescriptor>,
    inplace: bool,
    set_instead_of_increment: bool,
    tolerate_aliasing: bool,
}

static INC_SUBTENSOR: OpCache<IncSubtensor> = OpCache::new();

#[bon]
impl IncSubtensor {
    #[builder]
    pub fn new(
        #[builder(start_fn)] idx_list: Vec<IndexDescriptor>,
        #[builder(default)] inplace: bool,
        #[builder(default)] set_instead_of_increment: bool,
        #[builder(default)] tolerate_aliasing: bool,
    ) -> Result<Arc<Self>> {
        check_basic("IncSubtensor", &idx_list)?;
        Ok(INC_SUBTENSOR.intern(Self { idx_list, inplace, set_instead_of_increment, tolerate_aliasing }))
    }

    pub fn idx_list(&self) -> &[IndexDescriptor] {
        &self.idx_list
    }

    pub fn inplace(&self) -> bool {
        self.inplace
    }

    pub fn set_instead_of_increment(&self) -> bool {
        self.set_instead_of_increment
    }

    fn output_type(&self, inputs: &[Variable]) -> Result<TensorType> {
        let (data, slots) = split_inputs(self, inputs, 2)?;
        let (x, y) = (&data[0], &data[1]);
        check_rank(&self.idx_list, x.ndim())?;
        check_slots(&self.to_string(), &self.idx_list, slots)?;
        let action = write_action(self.set_instead_of_increment);
        check_value_dtype(action, x, y)?;
        check_value_rank(action, x, &self.idx_list, slots, y)?;
        Ok(x.ty().clone())
    }
}

impl std::fmt::Display for IncSubtensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = if self.set_instead_of_increment { "SetSubtensor" } else { "IncSubtensor" };
        let inplace = if self.inplace { "Inplace" } else { "" };
        write!(f, "{name}{inplace}{{{}}}", DisplayIndices(&self.idx_list))
    }
}

impl Op for IncSubtensor {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let ty = self.output_type(&inputs)?;
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, mut inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let slots = inputs.split_off(2);
        let y = inputs.remove(1);
        let mut x = inputs.remove(0);
        let indices = resolve("IncSubtensor", &self.idx_list, slots)?;
        basic_scatter(&mut x, &indices, &y, self.set_instead_of_increment)?;
        Ok(x)
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> tessera_ir::Result<Shape> {
        Ok(input_shapes[0].clone())
    }

    fn grad(&self, node: &Apply, output_grad: &Variable) -> tessera_ir::Result<Vec<Gradient>> {
        let inputs = node.inputs();
        let (x, y, slots) = (&inputs[0], &inputs[1], &inputs[2..]);

        let gx = data_grad(x, || {
            if !self.set_instead_of_increment {
                return Ok(output_grad.clone());
            }
            let op = IncSubtensor::builder(self.idx_list.clone()).set_instead_of_increment(true).build()?;
            let mut grad_inputs = vec![output_grad.clone(), zeros_like(y, Some(output_grad.dtype()))?];
            grad_inputs.extend_from_slice(slots);
            op.make_node(grad_inputs)
        })?;
        let gy = data_grad(y, || {
            let mut region_inputs = vec![output_grad.clone()];
            region_inputs.extend_from_slice(slots);
            let region = Subtensor::new(self.idx_list.clone())?.make_node(region_inputs)?;
            sum_grad_over_bcasted_dims(y, &region)
        })?;
        Ok(with_disconnected(vec![gx, gy], inputs.len()))
    }

    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        connection(2, node.inputs().len())
    }

    fn ownership(&self) -> Ownership {
        let mut ownership = if self.inplace { Ownership::destroys(0) } else { Ownership::default() };
        if self.tolerate_aliasing {
            ownership.tolerate_aliased.push((0, 1));
        }
        ownership
    }
}

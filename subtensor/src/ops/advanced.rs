use std::sync::Arc;

use bon::bon;
use snafu::ensure;
use tessera_ir::graph::{Blockwise, zeros_like};
use tessera_ir::intern::OpCache;
use tessera_ir::{Apply, Gradient, Op, Ownership, Shape, TensorType, TensorValue, Variable};

use super::{check_value_dtype, check_value_rank, connection, slots_batched, split_inputs, with_disconnected, write_action};
use crate::descriptor::{DisplayIndices, IndexDescriptor, check_rank, check_slots};
use crate::error::*;
use crate::exec::{IndexPlan, WriteMode, check_runtime_broadcast, resolve};
use crate::grad::{data_grad, sum_grad_over_bcasted_dims};
use crate::shape_infer::{indexed_result_shape, non_consecutive_descriptors, shape_indices, static_result_shape};

fn check_advanced(op: &str, idx_list: &[IndexDescriptor]) -> Result<()> {
    ensure!(
        idx_list.iter().any(IndexDescriptor::is_array),
        UnsupportedIndexSnafu { reason: format!("{op} needs at least one array index") }
    );
    Ok(())
}

// =========================================================================
// AdvancedSubtensor
// =========================================================================

/// `x[idx_list]` for any mix of integers, slices, new axes, integer arrays and boolean
/// masks, with NumPy's placement of the broadcast array indices.
///
/// Inputs are `[x, *slots]`. The result never aliases `x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdvancedSubtensor {
    idx_list: Vec<IndexDescriptor>,
}

static ADVANCED_SUBTENSOR: OpCache<AdvancedSubtensor> = OpCache::new();

impl AdvancedSubtensor {
    pub fn new(idx_list: Vec<IndexDescriptor>) -> Result<Arc<Self>> {
        check_advanced("AdvancedSubtensor", &idx_list)?;
        Ok(ADVANCED_SUBTENSOR.intern(Self { idx_list }))
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

impl std::fmt::Display for AdvancedSubtensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AdvancedSubtensor{{{}}}", DisplayIndices(&self.idx_list))
    }
}

impl Op for AdvancedSubtensor {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let ty = self.output_type(&inputs)?;
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, mut inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let slots = inputs.split_off(1);
        let x = &inputs[0];
        let indices = resolve("AdvancedSubtensor", &self.idx_list, slots)?;
        let plan = IndexPlan::new(x.shape(), &indices)?;
        Ok(plan.gather(x)?)
    }

    fn infer_shape(&self, node: &Apply, input_shapes: &[Shape]) -> tessera_ir::Result<Shape> {
        let indices = shape_indices(&self.idx_list, &node.inputs()[1..], &input_shapes[1..]);
        Ok(indexed_result_shape(&input_shapes[0], &indices)?)
    }

    fn grad(&self, node: &Apply, output_grad: &Variable) -> tessera_ir::Result<Vec<Gradient>> {
        let inputs = node.inputs();
        let (x, slots) = (&inputs[0], &inputs[1..]);
        // Increment, so repeated indices receive their gradient once per occurrence.
        let gx = data_grad(x, || {
            let op = AdvancedIncSubtensor::builder(self.idx_list.clone()).build()?;
            let mut grad_inputs = vec![zeros_like(x, None)?, output_grad.clone()];
            grad_inputs.extend_from_slice(slots);
            op.make_node(grad_inputs)
        })?;
        Ok(with_disconnected(vec![gx], inputs.len()))
    }

    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        connection(1, node.inputs().len())
    }

    /// Prepends full slices for new leading axes of `x`, unless the index inputs are
    /// batched or the array indices are split by basic ones: prepending a slice would
    /// then move the broadcast block in front of the batch axes.
    fn vectorize(&self, node: &Apply, batched_inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let batch_ndim = batched_inputs[0].ndim().saturating_sub(node.inputs()[0].ndim());
        if slots_batched(&node.inputs()[1..], &batched_inputs[1..])
            || (batch_ndim > 0 && non_consecutive_descriptors(&self.idx_list))
        {
            tracing::debug!(op = %self, "cannot batch by prepending slices");
            return Blockwise::vectorize_node(node, batched_inputs);
        }

        tracing::debug!(op = %self, batch_ndim, "batching by prepending full slices");
        let idx_list = std::iter::repeat_n(IndexDescriptor::FULL_SLICE, batch_ndim)
            .chain(self.idx_list.iter().copied())
            .collect();
        AdvancedSubtensor::new(idx_list)?.make_node(batched_inputs)
    }
}

// =========================================================================
// AdvancedIncSubtensor
// =========================================================================

/// Write `y` into, or add it onto, `x[idx_list]` for advanced indices.
///
/// Inputs are `[x, y, *slots]`. Increments follow `np.add.at`: every occurrence of a
/// repeated position contributes. `ignore_duplicate_indices` trades that for a single
/// update per position computed from the original values; which contribution survives
/// at a repeated position is then unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdvancedIncSubtensor {
    idx_list: Vec<IndexDescriptor>,
    inplace: bool,
    set_instead_of_increment: bool,
    ignore_duplicate_indices: bool,
}

static ADVANCED_INC_SUBTENSOR: OpCache<AdvancedIncSubtensor> = OpCache::new();

#[bon]
impl AdvancedIncSubtensor {
    #[builder]
    pub fn new(
        #[builder(start_fn)] idx_list: Vec<IndexDescriptor>,
        #[builder(default)] inplace: bool,
        #[builder(default)] set_instead_of_increment: bool,
        #[builder(default)] ignore_duplicate_indices: bool,
    ) -> Result<Arc<Self>> {
        check_advanced("AdvancedIncSubtensor", &idx_list)?;
        Ok(ADVANCED_INC_SUBTENSOR.intern(Self { idx_list, inplace, set_instead_of_increment, ignore_duplicate_indices }))
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

    pub fn ignore_duplicate_indices(&self) -> bool {
        self.ignore_duplicate_indices
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

impl std::fmt::Display for AdvancedIncSubtensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = if self.set_instead_of_increment { "AdvancedSetSubtensor" } else { "AdvancedIncSubtensor" };
        let mut flags = Vec::new();
        if self.inplace {
            flags.push("inplace");
        }
        if self.ignore_duplicate_indices {
            flags.push("ignore_duplicates");
        }
        if flags.is_empty() { f.write_str(name) } else { write!(f, "{name}{{{}}}", flags.join(",")) }
    }
}

impl Op for AdvancedIncSubtensor {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let ty = self.output_type(&inputs)?;
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, node: &Apply, mut inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let slots = inputs.split_off(2);
        let y = inputs.remove(1);
        let mut x = inputs.remove(0);

        let indices = resolve("AdvancedIncSubtensor", &self.idx_list, slots)?;
        let plan = IndexPlan::new(x.shape(), &indices)?;
        let declared = node.inputs()[1].ty().broadcastable();
        check_runtime_broadcast(&self.to_string(), &declared, y.shape(), plan.out_shape())?;
        plan.scatter(&mut x, &y, WriteMode::new(self.set_instead_of_increment, self.ignore_duplicate_indices))?;
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
            let op = AdvancedIncSubtensor::builder(self.idx_list.clone()).set_instead_of_increment(true).build()?;
            let mut grad_inputs = vec![output_grad.clone(), zeros_like(y, Some(output_grad.dtype()))?];
            grad_inputs.extend_from_slice(slots);
            op.make_node(grad_inputs)
        })?;
        let gy = data_grad(y, || {
            let mut region_inputs = vec![output_grad.clone()];
            region_inputs.extend_from_slice(slots);
            let region = AdvancedSubtensor::new(self.idx_list.clone())?.make_node(region_inputs)?;
            sum_grad_over_bcasted_dims(y, &region)
        })?;
        Ok(with_disconnected(vec![gx, gy], inputs.len()))
    }

    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        connection(2, node.inputs().len())
    }

    fn ownership(&self) -> Ownership {
        if self.inplace { Ownership::destroys(0) } else { Ownership::default() }
    }
}

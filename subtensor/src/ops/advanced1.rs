use std::sync::Arc;

use ndarray::{ArrayD, Axis};
use snafu::{OptionExt, ensure};
use tessera_ir::graph::zeros_like;
use tessera_ir::intern::OpCache;
use tessera_ir::{Apply, Config, Gradient, Op, Ownership, Shape, TensorType, TensorValue, Variable};

use super::{check_value_dtype, connection, split_inputs, with_disconnected, write_action};
use crate::error::*;
use crate::exec::{IndexPlan, Resolved, WriteMode, check_runtime_broadcast, wrap_index};
use crate::grad::{data_grad, sum_grad_over_bcasted_dims};

/// Integer vector selecting rows of `x`.
fn check_index_vector(x: &Variable, ilist: &Variable) -> Result<()> {
    ensure!(ilist.dtype().is_int(), IndexTypeSnafu { dtype: ilist.dtype() });
    ensure!(
        ilist.ndim() == 1,
        UnsupportedIndexSnafu { reason: format!("index {ilist:?} must be a vector, got rank {}", ilist.ndim()) }
    );
    ensure!(x.ndim() >= 1, TooManyIndicesSnafu { ndim: 0usize, count: 1usize });
    Ok(())
}

fn index_vector(value: &TensorValue) -> Result<&ArrayD<i64>> {
    value.as_int().context(IndexTypeSnafu { dtype: value.dtype() })
}

// =========================================================================
// AdvancedSubtensor1
// =========================================================================

/// `x[ilist]` for a vector of integers: a gather along axis 0.
///
/// Inputs are `[x, ilist]`. When `ilist` is a constant and the leading axis of `x` has
/// a known length, the bounds are checked once in `make_node` and the node is built
/// with a `known_safe` instance that skips the run-time check (unless
/// [`Config::trust_known_safe`] is off).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AdvancedSubtensor1 {
    known_safe: bool,
}

static ADVANCED_SUBTENSOR1: OpCache<AdvancedSubtensor1> = OpCache::new();

impl AdvancedSubtensor1 {
    pub fn new() -> Arc<Self> {
        ADVANCED_SUBTENSOR1.intern(Self::default())
    }

    pub fn known_safe(&self) -> bool {
        self.known_safe
    }

    fn is_known_safe(x: &Variable, ilist: &Variable) -> bool {
        let indices = ilist.constant_value().and_then(TensorValue::as_int);
        match (indices, x.ty().shape[0].known()) {
            (Some(indices), Some(n)) => {
                let n = n as i64;
                indices.iter().all(|i| (-n..n).contains(i))
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for AdvancedSubtensor1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdvancedSubtensor1")
    }
}

impl Op for AdvancedSubtensor1 {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let (data, _) = split_inputs(self.as_ref(), &inputs, 2)?;
        let (x, ilist) = (&data[0], &data[1]);
        check_index_vector(x, ilist)?;

        let mut shape = ilist.ty().shape.clone();
        shape.extend(x.ty().shape[1..].iter().copied());
        let ty = TensorType { dtype: x.dtype(), shape };

        let known_safe = Self::is_known_safe(x, ilist);
        let op = if known_safe == self.known_safe { self } else { ADVANCED_SUBTENSOR1.intern(Self { known_safe }) };
        Ok(Apply::create(op, inputs, ty))
    }

    fn perform(&self, _node: &Apply, inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let (x, ilist) = (&inputs[0], index_vector(&inputs[1])?);
        let n = x.shape()[0];
        let rows: Vec<usize> = if self.known_safe && Config::global().trust_known_safe {
            ilist.iter().map(|&i| if i < 0 { (i + n as i64) as usize } else { i as usize }).collect()
        } else {
            ilist.iter().map(|&i| wrap_index(i, 0, n)).collect::<Result<_>>()?
        };
        let data = tessera_ir::map_data!(x.data(), arr => arr.select(Axis(0), &rows));
        TensorValue::new(x.dtype(), data)
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> tessera_ir::Result<Shape> {
        let mut shape = input_shapes[1].clone();
        shape.extend(input_shapes[0][1..].iter().cloned());
        Ok(shape)
    }

    fn grad(&self, node: &Apply, output_grad: &Variable) -> tessera_ir::Result<Vec<Gradient>> {
        let inputs = node.inputs();
        let (x, ilist) = (&inputs[0], &inputs[1]);
        let gx = data_grad(x, || {
            AdvancedIncSubtensor1::new(false, false).make_node(vec![
                zeros_like(x, None)?,
                output_grad.clone(),
                ilist.clone(),
            ])
        })?;
        Ok(with_disconnected(vec![gx], inputs.len()))
    }

    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        connection(1, node.inputs().len())
    }
}

// =========================================================================
// AdvancedIncSubtensor1
// =========================================================================

/// Write `y` into, or add it onto, the rows `x[ilist]`.
///
/// Inputs are `[x, y, ilist]`. Increments accumulate over repeated rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdvancedIncSubtensor1 {
    inplace: bool,
    set_instead_of_increment: bool,
}

static ADVANCED_INC_SUBTENSOR1: OpCache<AdvancedIncSubtensor1> = OpCache::new();

impl AdvancedIncSubtensor1 {
    pub fn new(inplace: bool, set_instead_of_increment: bool) -> Arc<Self> {
        ADVANCED_INC_SUBTENSOR1.intern(Self { inplace, set_instead_of_increment })
    }

    pub fn inplace(&self) -> bool {
        self.inplace
    }

    pub fn set_instead_of_increment(&self) -> bool {
        self.set_instead_of_increment
    }
}

impl std::fmt::Display for AdvancedIncSubtensor1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inplace = if self.inplace { "inplace" } else { "no_inplace" };
        let mode = if self.set_instead_of_increment { "set" } else { "inc" };
        write!(f, "AdvancedIncSubtensor1{{{inplace},{mode}}}")
    }
}

impl Op for AdvancedIncSubtensor1 {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let (data, _) = split_inputs(self.as_ref(), &inputs, 3)?;
        let (x, y, ilist) = (&data[0], &data[1], &data[2]);
        check_index_vector(x, ilist)?;
        let action = write_action(self.set_instead_of_increment);
        check_value_dtype(action, x, y)?;
        ensure!(y.ndim() <= x.ndim(), ValueRankTooHighSnafu { action, target: x.ndim(), value: y.ndim() });
        let ty = x.ty().clone();
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, node: &Apply, mut inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let ilist = index_vector(&inputs[2])?.clone();
        let y = inputs.remove(1);
        let mut x = inputs.remove(0);

        let plan = IndexPlan::new(x.shape(), &[Resolved::IntArray(ilist)])?;
        let declared = node.inputs()[1].ty().broadcastable();
        check_runtime_broadcast(&self.to_string(), &declared, y.shape(), plan.out_shape())?;
        plan.scatter(&mut x, &y, WriteMode::new(self.set_instead_of_increment, false))?;
        Ok(x)
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> tessera_ir::Result<Shape> {
        Ok(input_shapes[0].clone())
    }

    fn grad(&self, node: &Apply, output_grad: &Variable) -> tessera_ir::Result<Vec<Gradient>> {
        let inputs = node.inputs();
        let (x, y, ilist) = (&inputs[0], &inputs[1], &inputs[2]);

        let gx = data_grad(x, || {
            if !self.set_instead_of_increment {
                return Ok(output_grad.clone());
            }
            AdvancedIncSubtensor1::new(false, true).make_node(vec![
                output_grad.clone(),
                zeros_like(y, Some(output_grad.dtype()))?,
                ilist.clone(),
            ])
        })?;
        let gy = data_grad(y, || {
            let region = AdvancedSubtensor1::new().make_node(vec![output_grad.clone(), ilist.clone()])?;
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

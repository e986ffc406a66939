//! Elementary tensor operators used by gradients and helpers of indexing operators.

use std::sync::Arc;

use itertools::Itertools;
use snafu::ensure;
use tessera_dtype::DType;

use super::{Apply, Gradient, Op, TensorType, Variable};
use crate::error::*;
use crate::intern::OpCache;
use crate::shape::{Dim, Shape, StaticShape};
use crate::sint::{SInt, sint_prod};
use crate::value::TensorValue;

fn expect_inputs(op: &dyn Op, inputs: &[Variable], expected: usize) -> Result<()> {
    ensure!(
        inputs.len() == expected,
        InputCountMismatchSnafu { op: op.to_string(), expected, actual: inputs.len() }
    );
    Ok(())
}

fn check_axes(axes: &[usize], ndim: usize) -> Result<()> {
    for &axis in axes {
        ensure!(axis < ndim, AxisOutOfRangeSnafu { axis, ndim });
    }
    Ok(())
}

// =========================================================================
// Zeros
// =========================================================================

/// Zeros shaped like the input, optionally of another dtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zeros {
    pub dtype: Option<DType>,
}

static ZEROS: OpCache<Zeros> = OpCache::new();

impl std::fmt::Display for Zeros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.dtype {
            Some(dtype) => write!(f, "ZerosLike{{{dtype}}}"),
            None => f.write_str("ZerosLike"),
        }
    }
}

impl Op for Zeros {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> Result<Variable> {
        expect_inputs(self.as_ref(), &inputs, 1)?;
        let ty = inputs[0].ty().with_dtype(self.dtype.unwrap_or(inputs[0].dtype()));
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, node: &Apply, inputs: Vec<TensorValue>) -> Result<TensorValue> {
        TensorValue::zeros(node.output_type().dtype, inputs[0].shape())
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> Result<Shape> {
        Ok(input_shapes[0].clone())
    }

    fn grad(&self, _node: &Apply, _output_grad: &Variable) -> Result<Vec<Gradient>> {
        Ok(vec![Gradient::Disconnected])
    }

    fn connection_pattern(&self, _node: &Apply) -> Vec<bool> {
        vec![false]
    }
}

pub fn zeros_like(x: &Variable, dtype: Option<DType>) -> Result<Variable> {
    ZEROS.intern(Zeros { dtype }).make_node(vec![x.clone()])
}

// =========================================================================
// Sum
// =========================================================================

/// Sum over a set of axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sum {
    pub axes: Vec<usize>,
    pub keepdims: bool,
}

static SUM: OpCache<Sum> = OpCache::new();

impl std::fmt::Display for Sum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sum{{axes=[{}]", self.axes.iter().join(", "))?;
        if self.keepdims {
            f.write_str(", keepdims")?;
        }
        f.write_str("}")
    }
}

impl Op for Sum {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> Result<Variable> {
        expect_inputs(self.as_ref(), &inputs, 1)?;
        let x = &inputs[0];
        check_axes(&self.axes, x.ndim())?;
        ensure!(!x.dtype().is_bool(), UnsupportedDTypeSnafu { dtype: x.dtype(), operation: "sum" });

        let shape: StaticShape = x
            .ty()
            .shape
            .iter()
            .enumerate()
            .filter_map(|(axis, &dim)| match (self.axes.contains(&axis), self.keepdims) {
                (false, _) => Some(dim),
                (true, true) => Some(Dim::Known(1)),
                (true, false) => None,
            })
            .collect();
        let ty = TensorType { dtype: x.dtype(), shape };
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, inputs: Vec<TensorValue>) -> Result<TensorValue> {
        inputs[0].sum_axes(&self.axes, self.keepdims)
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> Result<Shape> {
        Ok(input_shapes[0]
            .iter()
            .enumerate()
            .filter_map(|(axis, dim)| match (self.axes.contains(&axis), self.keepdims) {
                (false, _) => Some(dim.clone()),
                (true, true) => Some(SInt::Const(1)),
                (true, false) => None,
            })
            .collect())
    }
}

pub fn sum(x: &Variable, axes: Vec<usize>, keepdims: bool) -> Result<Variable> {
    let mut axes = axes;
    axes.sort_unstable();
    axes.dedup();
    SUM.intern(Sum { axes, keepdims }).make_node(vec![x.clone()])
}

// =========================================================================
// DropAxes
// =========================================================================

/// Remove axes that are statically of length 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DropAxes {
    pub axes: Vec<usize>,
}

static DROP_AXES: OpCache<DropAxes> = OpCache::new();

impl std::fmt::Display for DropAxes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DropAxes{{{}}}", self.axes.iter().join(", "))
    }
}

impl Op for DropAxes {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> Result<Variable> {
        expect_inputs(self.as_ref(), &inputs, 1)?;
        let x = &inputs[0];
        check_axes(&self.axes, x.ndim())?;
        for &axis in &self.axes {
            ensure!(
                x.ty().shape[axis].is_broadcastable(),
                DropNonBroadcastableSnafu { axis, shape: x.ty().shape.clone() }
            );
        }

        let shape: StaticShape = x
            .ty()
            .shape
            .iter()
            .enumerate()
            .filter(|(axis, _)| !self.axes.contains(axis))
            .map(|(_, &dim)| dim)
            .collect();
        let ty = TensorType { dtype: x.dtype(), shape };
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, inputs: Vec<TensorValue>) -> Result<TensorValue> {
        inputs[0].drop_axes(&self.axes)
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> Result<Shape> {
        Ok(input_shapes[0]
            .iter()
            .enumerate()
            .filter(|(axis, _)| !self.axes.contains(axis))
            .map(|(_, dim)| dim.clone())
            .collect())
    }
}

pub fn drop_axes(x: &Variable, axes: Vec<usize>) -> Result<Variable> {
    if axes.is_empty() {
        return Ok(x.clone());
    }
    let mut axes = axes;
    axes.sort_unstable();
    axes.dedup();
    DROP_AXES.intern(DropAxes { axes }).make_node(vec![x.clone()])
}

// =========================================================================
// Flatten
// =========================================================================

/// Row-major flattening to rank 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Flatten;

static FLATTEN: OpCache<Flatten> = OpCache::new();

impl std::fmt::Display for Flatten {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Flatten")
    }
}

impl Op for Flatten {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> Result<Variable> {
        expect_inputs(self.as_ref(), &inputs, 1)?;
        let x = &inputs[0];
        let len: Dim = x.ty().shape.iter().map(|dim| dim.known()).product::<Option<usize>>().into();
        let ty = TensorType::new(x.dtype(), [len]);
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, inputs: Vec<TensorValue>) -> Result<TensorValue> {
        inputs[0].reshape(&[inputs[0].len()])
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> Result<Shape> {
        Ok(smallvec::smallvec![sint_prod(&input_shapes[0])])
    }
}

pub fn flatten(x: &Variable) -> Result<Variable> {
    if x.ndim() == 1 {
        return Ok(x.clone());
    }
    FLATTEN.intern(Flatten).make_node(vec![x.clone()])
}

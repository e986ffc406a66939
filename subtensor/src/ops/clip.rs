use std::sync::Arc;

use snafu::{OptionExt, ensure};
use strum::{Display, EnumString};
use tessera_ir::error::AxisOutOfRangeSnafu;
use tessera_ir::intern::OpCache;
use tessera_ir::{Apply, Gradient, Op, Shape, TensorValue, Variable};

use super::split_inputs;
use crate::error::*;
use crate::exec::wrap_index;

/// How `take` treats out-of-range indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TakeMode {
    /// Negative indices wrap once; anything else out of range is an error.
    #[default]
    Raise,
    /// Clamp into `[0, n - 1]`.
    Clip,
    /// Reduce modulo `n`.
    Wrap,
}

impl TakeMode {
    fn apply(self, index: i64, axis: usize, size: usize) -> Result<i64> {
        let n = size as i64;
        match self {
            TakeMode::Raise => Ok(wrap_index(index, axis, size)? as i64),
            _ if n == 0 => IndexOutOfBoundsSnafu { index, axis, size }.fail(),
            TakeMode::Clip => Ok(index.clamp(0, n - 1)),
            TakeMode::Wrap => Ok(index.rem_euclid(n)),
        }
    }
}

/// Rewrite the integer indices `[indices, a]` so they select valid positions along
/// `axis` of `a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipIndices {
    mode: TakeMode,
    axis: usize,
}

static CLIP_INDICES: OpCache<ClipIndices> = OpCache::new();

impl ClipIndices {
    pub fn new(mode: TakeMode, axis: usize) -> Arc<Self> {
        CLIP_INDICES.intern(Self { mode, axis })
    }
}

impl std::fmt::Display for ClipIndices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClipIndices{{{}, axis={}}}", self.mode, self.axis)
    }
}

impl Op for ClipIndices {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> tessera_ir::Result<Variable> {
        let (data, _) = split_inputs(self.as_ref(), &inputs, 2)?;
        let (indices, a) = (&data[0], &data[1]);
        ensure!(indices.dtype().is_int(), IndexTypeSnafu { dtype: indices.dtype() });
        ensure!(self.axis < a.ndim(), AxisOutOfRangeSnafu { axis: self.axis, ndim: a.ndim() });
        let ty = indices.ty().clone();
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, _node: &Apply, inputs: Vec<TensorValue>) -> tessera_ir::Result<TensorValue> {
        let (indices, a) = (&inputs[0], &inputs[1]);
        let size = a.shape()[self.axis];
        let values = indices.as_int().context(IndexTypeSnafu { dtype: indices.dtype() })?;

        let mut out = values.clone();
        for value in out.iter_mut() {
            *value = self.mode.apply(*value, self.axis, size)?;
        }
        TensorValue::from(out).with_dtype(indices.dtype())
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> tessera_ir::Result<Shape> {
        Ok(input_shapes[0].clone())
    }

    fn grad(&self, node: &Apply, _output_grad: &Variable) -> tessera_ir::Result<Vec<Gradient>> {
        Ok(vec![Gradient::Disconnected; node.inputs().len()])
    }

    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        vec![false; node.inputs().len()]
    }
}

//! Generic batching of an operator over leading axes.

use std::sync::Arc;

use snafu::{OptionExt, ensure};

use super::{Apply, Op, TensorType, Variable};
use crate::error::*;
use crate::shape::{Dim, Shape, StaticShape, broadcast_concrete, broadcast_shapes, broadcast_static};
use crate::value::{TensorValue, unravel};

/// Loop of a core operator over the broadcast leading (batch) axes of its inputs.
///
/// The core node is built once from placeholder inputs of the core types; every batch
/// element runs the core operator's `perform` against it.
#[derive(Debug)]
pub struct Blockwise {
    core: Arc<Apply>,
}

impl Blockwise {
    pub fn new(core_op: Arc<dyn Op>, core_types: Vec<TensorType>) -> Result<Arc<Self>> {
        let placeholders =
            core_types.into_iter().enumerate().map(|(i, ty)| Variable::input(format!("core{i}"), ty)).collect();
        let op_name = core_op.to_string();
        let out = core_op.make_node(placeholders)?;
        let core = out.owner().cloned().context(NotVectorizableSnafu {
            op: op_name,
            reason: "core operator did not build an application node",
        })?;
        Ok(Arc::new(Self { core }))
    }

    /// Batch `node` by wrapping its operator.
    pub fn vectorize_node(node: &Apply, batched_inputs: Vec<Variable>) -> Result<Variable> {
        tracing::debug!(op = %node.op(), "batching with a blockwise loop");
        let core_types = node.inputs().iter().map(|v| v.ty().clone()).collect();
        Self::new(node.op().clone(), core_types)?.make_node(batched_inputs)
    }

    pub fn core(&self) -> &Arc<Apply> {
        &self.core
    }

    fn core_ndim(&self, input: usize) -> usize {
        self.core.inputs()[input].ndim()
    }
}

impl std::fmt::Display for Blockwise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blockwise{{{}}}", self.core.op())
    }
}

impl Op for Blockwise {
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> Result<Variable> {
        let expected = self.core.inputs().len();
        ensure!(
            inputs.len() == expected,
            InputCountMismatchSnafu { op: self.to_string(), expected, actual: inputs.len() }
        );

        let mut batch_shapes: Vec<StaticShape> = Vec::with_capacity(inputs.len());
        for (index, (input, core_input)) in inputs.iter().zip(self.core.inputs()).enumerate() {
            ensure!(
                input.dtype() == core_input.dtype(),
                DTypeMismatchSnafu { expected: core_input.dtype(), actual: input.dtype() }
            );
            ensure!(
                input.ndim() >= core_input.ndim(),
                InputRankMismatchSnafu {
                    op: self.to_string(),
                    index,
                    expected: core_input.ndim(),
                    actual: input.ndim(),
                }
            );
            batch_shapes.push(input.ty().shape[..input.ndim() - core_input.ndim()].iter().copied().collect());
        }

        let views: Vec<&[Dim]> = batch_shapes.iter().map(|s| s.as_slice()).collect();
        let mut shape = broadcast_static(&views)?;
        shape.extend(self.core.output_type().shape.iter().copied());
        let ty = TensorType { dtype: self.core.output_type().dtype, shape };
        Ok(Apply::create(self, inputs, ty))
    }

    fn perform(&self, node: &Apply, inputs: Vec<TensorValue>) -> Result<TensorValue> {
        let core_out = self.core.output_type();
        let batch_ndim = node.output_type().ndim() - core_out.ndim();

        let batch_shapes: Vec<Vec<usize>> = inputs
            .iter()
            .enumerate()
            .map(|(i, value)| value.shape()[..value.ndim() - self.core_ndim(i)].to_vec())
            .collect();
        let views: Vec<&[usize]> = batch_shapes.iter().map(Vec::as_slice).collect();
        let batch_shape = broadcast_concrete(&views)?;
        debug_assert_eq!(batch_shape.len(), batch_ndim);

        let count: usize = batch_shape.iter().product();
        if count == 0 {
            let mut full = batch_shape.clone();
            full.extend(core_out.shape.iter().map(|dim| dim.known().unwrap_or(0)));
            return TensorValue::zeros(core_out.dtype, &full);
        }

        let mut outputs = Vec::with_capacity(count);
        for flat in 0..count {
            let position = unravel(flat, &batch_shape);
            let mut core_inputs = Vec::with_capacity(inputs.len());
            for (value, own) in inputs.iter().zip(&batch_shapes) {
                let pad = batch_ndim - own.len();
                let index: Vec<usize> =
                    own.iter().enumerate().map(|(axis, &n)| if n == 1 { 0 } else { position[pad + axis] }).collect();
                core_inputs.push(value.index_leading(&index)?);
            }
            outputs.push(self.core.op().perform(&self.core, core_inputs)?);
        }
        TensorValue::stack(core_out.dtype, &batch_shape, outputs)
    }

    fn infer_shape(&self, _node: &Apply, input_shapes: &[Shape]) -> Result<Shape> {
        let mut batch_shapes = Vec::with_capacity(input_shapes.len());
        let mut core_shapes = Vec::with_capacity(input_shapes.len());
        for (i, shape) in input_shapes.iter().enumerate() {
            let split = shape.len() - self.core_ndim(i);
            batch_shapes.push(shape[..split].iter().cloned().collect::<Shape>());
            core_shapes.push(shape[split..].iter().cloned().collect::<Shape>());
        }

        let mut shape = broadcast_shapes(&batch_shapes)?;
        shape.extend(self.core.op().infer_shape(&self.core, &core_shapes)?);
        Ok(shape)
    }

    fn connection_pattern(&self, _node: &Apply) -> Vec<bool> {
        self.core.op().connection_pattern(&self.core)
    }
}

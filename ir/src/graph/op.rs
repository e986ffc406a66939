use std::any::Any;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use smallvec::SmallVec;

use super::{Apply, Blockwise, Variable};
use crate::error::*;
use crate::shape::Shape;
use crate::value::TensorValue;

/// Gradient of a node output with respect to one input.
#[derive(Debug, Clone)]
pub enum Gradient {
    Connected(Variable),
    /// The output does not depend on this input (e.g. integer index inputs).
    Disconnected,
}

impl Gradient {
    pub fn variable(&self) -> Option<&Variable> {
        match self {
            Gradient::Connected(var) => Some(var),
            Gradient::Disconnected => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Gradient::Disconnected)
    }
}

/// Memory relationships between an operator's output and its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    /// Inputs the output may be a view of.
    pub may_alias_with: SmallVec<[usize; 2]>,
    /// Input whose buffer the operator overwrites to produce the output.
    pub mutates_argument: Option<usize>,
    /// Input pairs allowed to share memory even though one of them is mutated.
    pub tolerate_aliased: SmallVec<[(usize, usize); 1]>,
}

impl Ownership {
    pub fn view_of(input: usize) -> Self {
        Self { may_alias_with: smallvec::smallvec![input], ..Self::default() }
    }

    pub fn destroys(input: usize) -> Self {
        Self { mutates_argument: Some(input), ..Self::default() }
    }
}

/// Operator applied by graph nodes.
///
/// Operator values are immutable; two structurally equal operators behave identically.
/// `make_node` validates inputs and fixes the output type, `perform` computes a concrete
/// output from concrete inputs, and the remaining hooks describe the operator to graph
/// transformations.
pub trait Op: Debug + Display + Send + Sync + Any {
    /// Validate inputs and create the application node.
    fn make_node(self: Arc<Self>, inputs: Vec<Variable>) -> Result<Variable>;

    /// Compute the output. Inputs listed in [`Ownership::mutates_argument`] are owned
    /// buffers the operator may overwrite.
    fn perform(&self, node: &Apply, inputs: Vec<TensorValue>) -> Result<TensorValue>;

    /// Symbolic output shape given symbolic input shapes.
    fn infer_shape(&self, node: &Apply, input_shapes: &[Shape]) -> Result<Shape>;

    /// Gradient with respect to every input, given the gradient of the output.
    fn grad(&self, node: &Apply, output_grad: &Variable) -> Result<Vec<Gradient>> {
        let _ = (node, output_grad);
        GradientUndefinedSnafu { op: self.to_string() }.fail()
    }

    /// Which inputs the output depends on differentiably.
    fn connection_pattern(&self, node: &Apply) -> Vec<bool> {
        vec![true; node.inputs().len()]
    }

    fn ownership(&self) -> Ownership {
        Ownership::default()
    }

    /// Rebuild `node` over inputs that may carry extra leading batch axes.
    ///
    /// The default wraps the operator in a [`Blockwise`] loop.
    fn vectorize(&self, node: &Apply, batched_inputs: Vec<Variable>) -> Result<Variable> {
        Blockwise::vectorize_node(node, batched_inputs)
    }
}

impl dyn Op {
    pub fn downcast_ref<T: Op>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    pub fn is<T: Op>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }
}

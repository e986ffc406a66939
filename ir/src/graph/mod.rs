//! Tensor graph: typed variables and operator applications.
//!
//! A [`Variable`] is a graph input, a constant, or the single output of an [`Apply`]
//! node. A node's output type is computed once by its operator's
//! [`Op::make_node`] and never recomputed from concrete data.

mod basic;
mod blockwise;
mod interp;
mod op;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::error::*;
use crate::shape::{Dim, Shape, StaticShape, placeholder_shape};
use crate::sint::SInt;
use crate::value::TensorValue;

pub use basic::{DropAxes, Flatten, Sum, Zeros, drop_axes, flatten, sum, zeros_like};
pub use blockwise::Blockwise;
pub use interp::evaluate;
pub use op::{Gradient, Op, Ownership};

/// Declared type of a tensor variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: StaticShape,
}

impl TensorType {
    pub fn new<D: Into<Dim>>(dtype: DType, shape: impl IntoIterator<Item = D>) -> Self {
        Self { dtype, shape: shape.into_iter().map(Into::into).collect() }
    }

    /// Rank-0 type.
    pub fn scalar(dtype: DType) -> Self {
        Self { dtype, shape: StaticShape::new() }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn broadcastable(&self) -> SmallVec<[bool; 4]> {
        crate::shape::broadcastable(&self.shape)
    }

    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self { dtype, shape: self.shape.clone() }
    }

    /// Whether a concrete value is an instance of this type.
    pub fn accepts(&self, value: &TensorValue) -> bool {
        value.dtype() == self.dtype
            && value.ndim() == self.ndim()
            && self.shape.iter().zip(value.shape()).all(|(dim, &n)| dim.known().is_none_or(|k| k == n))
    }
}

impl std::fmt::Display for TensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Where a variable's value comes from.
#[derive(Debug, Clone)]
pub enum Origin {
    Input,
    Constant(TensorValue),
    Apply(Arc<Apply>),
}

struct VariableNode {
    id: u64,
    ty: TensorType,
    name: Option<String>,
    origin: Origin,
}

static VARIABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Handle to a graph variable. Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct Variable(Arc<VariableNode>);

impl Variable {
    fn with_origin(ty: TensorType, name: Option<String>, origin: Origin) -> Self {
        let id = VARIABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::new(VariableNode { id, ty, name, origin }))
    }

    /// Free input, given a value at evaluation time.
    pub fn input(name: impl Into<String>, ty: TensorType) -> Self {
        Self::with_origin(ty, Some(name.into()), Origin::Input)
    }

    /// Constant; its type has every axis known.
    pub fn constant(value: TensorValue) -> Self {
        let ty = TensorType::new(value.dtype(), value.shape().iter().copied());
        Self::with_origin(ty, None, Origin::Constant(value))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn ty(&self) -> &TensorType {
        &self.0.ty
    }

    pub fn dtype(&self) -> DType {
        self.0.ty.dtype
    }

    pub fn ndim(&self) -> usize {
        self.0.ty.ndim()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Name if given, otherwise `v{id}`.
    pub fn label(&self) -> String {
        self.0.name.clone().unwrap_or_else(|| format!("v{}", self.0.id))
    }

    pub fn origin(&self) -> &Origin {
        &self.0.origin
    }

    pub fn owner(&self) -> Option<&Arc<Apply>> {
        match &self.0.origin {
            Origin::Apply(node) => Some(node),
            _ => None,
        }
    }

    pub fn constant_value(&self) -> Option<&TensorValue> {
        match &self.0.origin {
            Origin::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Symbolic shape: known axes as constants, unknown axes as per-variable symbols.
    pub fn symbolic_shape(&self) -> Shape {
        placeholder_shape(&self.0.ty.shape, &format!("{}.shape", self.symbol_name()))
    }

    /// Symbolic value of a size-1 integer variable: its constant value if it has one,
    /// otherwise a symbol unique to this variable.
    pub fn symbolic_value(&self) -> SInt {
        match scalar_constant_value(self) {
            Ok(value) => SInt::Const(value),
            Err(_) => SInt::symbol(self.symbol_name()),
        }
    }

    fn symbol_name(&self) -> String {
        format!("{}#{}", self.label(), self.0.id)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Variable({}: {})", self.label(), self.0.ty)
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.origin {
            Origin::Constant(value) if value.len() == 1 => write!(f, "{value}"),
            Origin::Apply(node) if self.0.name.is_none() => write!(f, "{}", node.op()),
            _ => f.write_str(&self.label()),
        }
    }
}

/// Application of an operator to input variables.
#[derive(Debug)]
pub struct Apply {
    op: Arc<dyn Op>,
    inputs: Vec<Variable>,
    output_type: TensorType,
}

impl Apply {
    /// Build a node and return its output variable.
    pub fn create(op: Arc<dyn Op>, inputs: Vec<Variable>, output_type: TensorType) -> Variable {
        tracing::trace!(op = %op, inputs = inputs.len(), output = %output_type, "apply");
        let ty = output_type.clone();
        let node = Arc::new(Self { op, inputs, output_type });
        Variable::with_origin(ty, None, Origin::Apply(node))
    }

    pub fn op(&self) -> &Arc<dyn Op> {
        &self.op
    }

    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn output_type(&self) -> &TensorType {
        &self.output_type
    }

    /// Symbolic shape of every input.
    pub fn input_shapes(&self) -> Vec<Shape> {
        self.inputs.iter().map(Variable::symbolic_shape).collect()
    }
}

/// Value of a size-1 integer constant.
///
/// Returns the "not a compile-time constant" signal ([`Error::NotScalarConstant`]) for
/// anything else, including graph inputs and computed values.
pub fn scalar_constant_value(var: &Variable) -> Result<i64> {
    var.constant_value().and_then(TensorValue::as_scalar_int).ok_or(Error::NotScalarConstant)
}

//! Reference interpreter.
//!
//! Nodes run in topological order. The buffer an in-place operator mutates is moved
//! out of the environment; reading that variable again yields
//! [`Error::DestroyedValue`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use snafu::ensure;

use super::{Apply, Origin, Variable};
use crate::error::*;
use crate::value::TensorValue;

/// Apply nodes reachable from `outputs`, producers first.
fn toposort(outputs: &[Variable]) -> Vec<Variable> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(Variable, bool)> = outputs.iter().rev().map(|v| (v.clone(), false)).collect();

    while let Some((var, expanded)) = stack.pop() {
        if expanded {
            order.push(var);
            continue;
        }
        let Some(node) = var.owner().cloned() else { continue };
        if !visited.insert(var.id()) {
            continue;
        }
        stack.push((var, true));
        for input in node.inputs().iter().rev() {
            if !visited.contains(&input.id()) {
                stack.push((input.clone(), false));
            }
        }
    }
    order
}

struct Env {
    values: HashMap<u64, TensorValue>,
    destroyed: HashSet<u64>,
}

impl Env {
    fn read(&self, var: &Variable) -> Result<TensorValue> {
        ensure!(!self.destroyed.contains(&var.id()), DestroyedValueSnafu { name: var.label() });
        if let Some(value) = self.values.get(&var.id()) {
            return Ok(value.clone());
        }
        match var.origin() {
            Origin::Constant(value) => Ok(value.clone()),
            Origin::Input => MissingInputSnafu { name: var.label() }.fail(),
            Origin::Apply(_) => DestroyedValueSnafu { name: var.label() }.fail(),
        }
    }

    fn take(&mut self, var: &Variable) -> Result<TensorValue> {
        let value = match self.values.remove(&var.id()) {
            Some(value) => {
                ensure!(!self.destroyed.contains(&var.id()), DestroyedValueSnafu { name: var.label() });
                value
            }
            None => self.read(var)?,
        };
        self.destroyed.insert(var.id());
        Ok(value)
    }
}

fn run_node(node: &Arc<Apply>, env: &mut Env) -> Result<TensorValue> {
    let mutated = node.op().ownership().mutates_argument;

    let mut inputs: Vec<Option<TensorValue>> = Vec::with_capacity(node.inputs().len());
    for (i, input) in node.inputs().iter().enumerate() {
        inputs.push(if Some(i) == mutated { None } else { Some(env.read(input)?) });
    }
    if let Some(i) = mutated {
        inputs[i] = Some(env.take(&node.inputs()[i])?);
    }

    let inputs: Vec<TensorValue> = inputs.into_iter().flatten().collect();
    node.op().perform(node, inputs)
}

/// Evaluate `outputs` given values for the graph inputs.
pub fn evaluate(outputs: &[Variable], givens: &[(Variable, TensorValue)]) -> Result<Vec<TensorValue>> {
    let mut env = Env { values: HashMap::new(), destroyed: HashSet::new() };

    for (var, value) in givens {
        ensure!(
            var.dtype() == value.dtype(),
            DTypeMismatchSnafu { expected: var.dtype(), actual: value.dtype() }
        );
        ensure!(
            var.ty().accepts(value),
            RuntimeShapeMismatchSnafu { op: var.label(), expected: var.ty().shape.clone(), actual: value.shape().to_vec() }
        );
        env.values.insert(var.id(), value.clone());
    }

    for var in toposort(outputs) {
        let Some(node) = var.owner() else { continue };
        if env.values.contains_key(&var.id()) {
            continue;
        }

        let value = run_node(node, &mut env)?;
        tracing::trace!(op = %node.op(), shape = ?value.shape(), "evaluated node");

        ensure!(
            node.output_type().accepts(&value),
            RuntimeShapeMismatchSnafu {
                op: node.op().to_string(),
                expected: node.output_type().shape.clone(),
                actual: value.shape().to_vec(),
            }
        );
        env.values.insert(var.id(), value);
    }

    outputs.iter().map(|var| env.read(var)).collect()
}

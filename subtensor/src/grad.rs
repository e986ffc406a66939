//! Helpers shared by the gradients of indexing operators.

use snafu::ensure;
use tessera_ir::error::{Result, UnsupportedDTypeSnafu};
use tessera_ir::graph::{drop_axes, sum, zeros_like};
use tessera_ir::{Config, Variable};

/// Gradient flowing into the data input `x`.
///
/// Discrete inputs get zeros of the configured float dtype; complex inputs are an
/// error; anything else gets `build()`.
pub fn data_grad(x: &Variable, build: impl FnOnce() -> Result<Variable>) -> Result<Variable> {
    let dtype = x.dtype();
    if dtype.is_discrete() {
        return zeros_like(x, Some(Config::global().float_x));
    }
    ensure!(!dtype.is_complex(), UnsupportedDTypeSnafu { dtype, operation: "indexing gradients" });
    build()
}

/// Reduce `gy`, the gradient of the region `y` was written into, to the type of `y`.
///
/// Sums the leading axes `y` was broadcast over and every axis `y` declares
/// broadcastable while `gy` does not.
pub fn sum_grad_over_bcasted_dims(y: &Variable, gy: &Variable) -> Result<Variable> {
    let y_flags = y.ty().broadcastable();
    let gy_flags = gy.ty().broadcastable();
    if y_flags == gy_flags {
        return Ok(gy.clone());
    }

    let added = gy.ndim().saturating_sub(y.ndim());
    let axes: Vec<usize> =
        (0..gy.ndim()).filter(|&axis| axis < added || (y_flags[axis - added] && !gy_flags[axis])).collect();
    if axes.is_empty() {
        return Ok(gy.clone());
    }
    let summed = sum(gy, axes, true)?;
    drop_axes(&summed, (0..added).collect())
}

//! User-level indexing helpers.
//!
//! [`index`] is NumPy's `x[...]`: it picks the cheapest operator able to express the
//! index tuple. [`inc_subtensor`] and [`set_subtensor`] turn the result of such an
//! indexing expression into the matching write operator.

use bon::builder;
use snafu::{OptionExt, ensure};
use tessera_ir::error::AxisOutOfRangeSnafu;
use tessera_ir::graph::flatten;
use tessera_ir::{Op, Variable};

use crate::descriptor::IndexDescriptor;
use crate::error::*;
use crate::normalize::{RawIndex, RawSlice, expand_ellipsis, normalize_advanced_indices, normalize_indices};
use crate::ops::{
    AdvancedIncSubtensor, AdvancedIncSubtensor1, AdvancedSubtensor, AdvancedSubtensor1, ClipIndices, IncSubtensor,
    Subtensor, TakeMode,
};

fn with_slots(first: &[&Variable], slots: impl IntoIterator<Item = Variable>) -> Vec<Variable> {
    first.iter().map(|&var| var.clone()).chain(slots).collect()
}

/// Entries [`Subtensor`] can express: integers, slices, new axes and effectively 0-d
/// non-boolean variables.
fn is_basic(raw: &RawIndex) -> bool {
    match raw {
        RawIndex::Int(_) | RawIndex::Slice(_) | RawIndex::NewAxis => true,
        RawIndex::Var(var) => !var.dtype().is_bool() && var.ty().broadcastable().iter().all(|&b| b),
        RawIndex::Ellipsis | RawIndex::Bool(_) => false,
    }
}

/// `x[indices]`.
///
/// Basic tuples build a [`Subtensor`], a lone integer vector (possibly followed by full
/// slices) an [`AdvancedSubtensor1`], anything else an [`AdvancedSubtensor`].
///
/// ```rust
/// # use tessera_ir::{DType, TensorType, Variable};
/// # use tessera_ir::shape::Dim;
/// # use tessera_subtensor::{index, s};
/// let x = Variable::input("x", TensorType::new(DType::Float64, [5usize, 4]));
/// let y = index(&x, &[s![1, _], s![0]]).unwrap();
/// assert_eq!(y.ty().shape.as_slice(), &[Dim::Known(4)]);
/// ```
pub fn index(x: &Variable, indices: &[RawIndex]) -> Result<Variable> {
    let indices = expand_ellipsis(indices, x.ndim())?;

    if indices.iter().all(is_basic) {
        let (idx_list, slots) = normalize_indices(&indices)?;
        return Ok(Subtensor::new(idx_list)?.make_node(with_slots(&[x], slots))?);
    }

    if let [RawIndex::Var(ilist), rest @ ..] = indices.as_slice()
        && ilist.dtype().is_int()
        && ilist.ndim() == 1
        && rest.iter().all(RawIndex::is_full_slice)
    {
        return advanced_subtensor1(x, ilist);
    }

    let (idx_list, slots) = normalize_advanced_indices(&indices)?;
    Ok(AdvancedSubtensor::new(idx_list)?.make_node(with_slots(&[x], slots))?)
}

/// `x[ilist]` for an integer vector.
pub fn advanced_subtensor1(x: &Variable, ilist: &Variable) -> Result<Variable> {
    Ok(AdvancedSubtensor1::new().make_node(vec![x.clone(), ilist.clone()])?)
}

/// `x[ilist] += y`, accumulating over repeated rows.
pub fn advanced_inc_subtensor1(x: &Variable, y: &Variable, ilist: &Variable) -> Result<Variable> {
    Ok(AdvancedIncSubtensor1::new(false, false).make_node(vec![x.clone(), y.clone(), ilist.clone()])?)
}

/// `x[ilist] = y`.
pub fn advanced_set_subtensor1(x: &Variable, y: &Variable, ilist: &Variable) -> Result<Variable> {
    Ok(AdvancedIncSubtensor1::new(false, true).make_node(vec![x.clone(), y.clone(), ilist.clone()])?)
}

struct WriteOptions {
    set: bool,
    inplace: bool,
    tolerate_aliasing: bool,
    ignore_duplicates: bool,
}

fn write_subtensor(target: &Variable, value: &Variable, options: WriteOptions) -> Result<Variable> {
    let action = if options.set { "set" } else { "increment" };
    ensure!(
        value.ndim() <= target.ndim(),
        ValueRankTooHighSnafu { action, target: target.ndim(), value: value.ndim() }
    );

    let node = target.owner().context(UnsupportedIndexSnafu {
        reason: format!("cannot {action} {target:?}: it is not the result of an indexing operation"),
    })?;
    let (x, rest) = (&node.inputs()[0], &node.inputs()[1..]);
    let inputs = with_slots(&[x, value], rest.iter().cloned());
    let op: &dyn Op = node.op().as_ref();

    if let Some(subtensor) = op.downcast_ref::<Subtensor>() {
        let op = IncSubtensor::builder(subtensor.idx_list().to_vec())
            .inplace(options.inplace)
            .set_instead_of_increment(options.set)
            .tolerate_aliasing(options.tolerate_aliasing)
            .build()?;
        return Ok(op.make_node(inputs)?);
    }

    if op.is::<AdvancedSubtensor1>() {
        if options.ignore_duplicates && !options.set {
            let idx_list = vec![IndexDescriptor::Array { dtype: rest[0].dtype(), rank: 1 }];
            let op = AdvancedIncSubtensor::builder(idx_list)
                .inplace(options.inplace)
                .ignore_duplicate_indices(true)
                .build()?;
            return Ok(op.make_node(inputs)?);
        }
        return Ok(AdvancedIncSubtensor1::new(options.inplace, options.set).make_node(inputs)?);
    }

    if let Some(advanced) = op.downcast_ref::<AdvancedSubtensor>() {
        let op = AdvancedIncSubtensor::builder(advanced.idx_list().to_vec())
            .inplace(options.inplace)
            .set_instead_of_increment(options.set)
            .ignore_duplicate_indices(options.ignore_duplicates)
            .build()?;
        return Ok(op.make_node(inputs)?);
    }

    UnsupportedIndexSnafu { reason: format!("cannot {action} the output of {op}") }.fail()
}

/// `x[idx] += value`, where `target` is `x[idx]`; returns the updated `x`.
///
/// ```rust
/// # use tessera_ir::{DType, TensorType, Variable};
/// # use tessera_subtensor::{inc_subtensor, index, s};
/// let x = Variable::input("x", TensorType::new(DType::Float64, [5usize]));
/// let y = Variable::input("y", TensorType::new(DType::Float64, [2usize]));
/// let region = index(&x, &[s![1, 3]]).unwrap();
/// let updated = inc_subtensor(&region, &y).call().unwrap();
/// assert_eq!(updated.ty(), x.ty());
/// ```
#[builder]
pub fn inc_subtensor(
    #[builder(start_fn)] target: &Variable,
    #[builder(start_fn)] value: &Variable,
    #[builder(default)] inplace: bool,
    #[builder(default)] tolerate_aliasing: bool,
    /// Apply each position once even if the index repeats it (faster, undefined
    /// result at repeated positions).
    #[builder(default)]
    ignore_duplicates: bool,
) -> Result<Variable> {
    write_subtensor(target, value, WriteOptions { set: false, inplace, tolerate_aliasing, ignore_duplicates })
}

/// `x[idx] = value`, where `target` is `x[idx]`; returns the updated `x`.
#[builder]
pub fn set_subtensor(
    #[builder(start_fn)] target: &Variable,
    #[builder(start_fn)] value: &Variable,
    #[builder(default)] inplace: bool,
    #[builder(default)] tolerate_aliasing: bool,
) -> Result<Variable> {
    write_subtensor(target, value, WriteOptions { set: true, inplace, tolerate_aliasing, ignore_duplicates: false })
}

fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    let valid = usize::try_from(resolved).ok().filter(|&axis| axis < ndim);
    Ok(valid.context(AxisOutOfRangeSnafu { axis: axis.unsigned_abs(), ndim })?)
}

/// `np.take(a, indices, axis, mode)`.
///
/// Without an axis, `a` is flattened first. `clip` and `wrap` rewrite the indices before
/// the gather; `raise` checks them at run time.
#[builder]
pub fn take(
    #[builder(start_fn)] a: &Variable,
    #[builder(start_fn)] indices: &Variable,
    axis: Option<isize>,
    #[builder(default)] mode: TakeMode,
) -> Result<Variable> {
    let Some(axis) = axis else {
        return take(&flatten(a)?, indices).axis(0).mode(mode).call();
    };
    let axis = normalize_axis(axis, a.ndim())?;

    let indices = match mode {
        TakeMode::Raise => indices.clone(),
        TakeMode::Clip | TakeMode::Wrap => {
            ClipIndices::new(mode, axis).make_node(vec![indices.clone(), a.clone()])?
        }
    };

    let mut raw = vec![RawIndex::full_slice(); axis];
    raw.push(RawIndex::Var(indices));
    index(a, &raw)
}

/// Reverse `x` along `axes` (every axis when `None`).
pub fn flip(x: &Variable, axes: Option<&[isize]>) -> Result<Variable> {
    let ndim = x.ndim();
    let axes: Vec<usize> = match axes {
        None => (0..ndim).collect(),
        Some(axes) => axes.iter().map(|&axis| normalize_axis(axis, ndim)).collect::<Result<_>>()?,
    };
    let reversed = RawSlice::builder().step(-1).build();
    let indices: Vec<RawIndex> = (0..ndim)
        .map(|axis| if axes.contains(&axis) { RawIndex::Slice(reversed.clone()) } else { RawIndex::full_slice() })
        .collect();
    index(x, &indices)
}

/// Index tuple applying `slice` to `axis` only; negative axes count from the end.
pub fn slice_at_axis(slice: RawSlice, axis: isize) -> Vec<RawIndex> {
    if axis >= 0 {
        let mut indices = vec![RawIndex::full_slice(); axis.unsigned_abs()];
        indices.push(RawIndex::Slice(slice));
        indices.push(RawIndex::Ellipsis);
        indices
    } else {
        let mut indices = vec![RawIndex::Ellipsis, RawIndex::Slice(slice)];
        indices.extend(std::iter::repeat_n(RawIndex::full_slice(), (-1 - axis).unsigned_abs()));
        indices
    }
}

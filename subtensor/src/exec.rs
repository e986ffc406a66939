//! Reference execution of indexing on concrete arrays.
//!
//! Basic indexing narrows an `ndarray` view axis by axis. Advanced indexing builds an
//! [`IndexPlan`] that maps every output coordinate to a source coordinate, following
//! NumPy's placement of the broadcast advanced block; gathers and scatters then walk the
//! output coordinates. Results are always freshly allocated arrays.

use std::collections::HashSet;

use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension, IxDyn, Slice};
use snafu::{OptionExt, ensure};
use tessera_dtype::DType;
use tessera_ir::TensorValue;
use tessera_ir::shape::broadcast_concrete;
use tessera_ir::value::{ArrayData, Element};

use crate::canonical::{ConcreteSlice, concrete_slice};
use crate::descriptor::{Bound, IndexDescriptor, ScalarIndex, slot_count};
use crate::error::*;

/// Index entry with every slot filled by a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Int(i64),
    Slice { start: Option<i64>, stop: Option<i64>, step: Option<i64> },
    NewAxis,
    IntArray(ArrayD<i64>),
    BoolMask(ArrayD<bool>),
}

fn scalar_slot(index: &ScalarIndex, slots: &mut impl Iterator<Item = TensorValue>) -> Result<i64> {
    match *index {
        ScalarIndex::Const { value, .. } => Ok(value),
        ScalarIndex::Symbolic { dtype } => {
            let value = slots.next().context(IndexTypeSnafu { dtype })?;
            value.as_scalar_int().context(IndexTypeSnafu { dtype: value.dtype() })
        }
    }
}

fn bound_slot(bound: &Bound, slots: &mut impl Iterator<Item = TensorValue>) -> Result<Option<i64>> {
    match bound {
        Bound::Absent => Ok(None),
        Bound::Scalar(index) => scalar_slot(index, slots).map(Some),
    }
}

/// Fill the slots of `idx_list` with `slots`, in order.
pub fn resolve(op: &str, idx_list: &[IndexDescriptor], slots: Vec<TensorValue>) -> Result<Vec<Resolved>> {
    let expected = slot_count(idx_list);
    ensure!(slots.len() == expected, IndexTemplateMismatchSnafu { op, expected, actual: slots.len() });

    let mut slots = slots.into_iter();
    let mut resolved = Vec::with_capacity(idx_list.len());
    for entry in idx_list {
        resolved.push(match entry {
            IndexDescriptor::Scalar(index) => Resolved::Int(scalar_slot(index, &mut slots)?),
            IndexDescriptor::Slice { start, stop, step } => Resolved::Slice {
                start: bound_slot(start, &mut slots)?,
                stop: bound_slot(stop, &mut slots)?,
                step: bound_slot(step, &mut slots)?,
            },
            IndexDescriptor::NewAxis => Resolved::NewAxis,
            IndexDescriptor::Array { dtype, .. } => {
                let value = slots.next().context(IndexTypeSnafu { dtype: *dtype })?;
                match value.into_data() {
                    ArrayData::Int(arr) => Resolved::IntArray(arr),
                    ArrayData::Bool(arr) => Resolved::BoolMask(arr),
                    ArrayData::Float(_) => return IndexTypeSnafu { dtype: DType::Float64 }.fail(),
                }
            }
        });
    }
    Ok(resolved)
}

pub(crate) fn wrap_index(index: i64, axis: usize, size: usize) -> Result<usize> {
    let wrapped = if index < 0 { index + size as i64 } else { index };
    ensure!((0..size as i64).contains(&wrapped), IndexOutOfBoundsSnafu { index, axis, size });
    Ok(wrapped as usize)
}

// =========================================================================
// Basic indexing
// =========================================================================

/// Narrow `arr` to the region addressed by basic entries (integers, slices, new axes).
///
/// Works on owned arrays, views and mutable views alike.
pub fn basic_region<S: Data>(mut arr: ArrayBase<S, IxDyn>, indices: &[Resolved]) -> Result<ArrayBase<S, IxDyn>> {
    let ndim = arr.ndim();
    let mut axis = 0;
    let mut source_axis = 0;
    for index in indices {
        match index {
            Resolved::Int(i) => {
                let size = arr.shape().get(axis).copied().context(TooManyIndicesSnafu { ndim, count: source_axis + 1 })?;
                let i = wrap_index(*i, source_axis, size)?;
                arr = arr.index_axis_move(Axis(axis), i);
                source_axis += 1;
            }
            Resolved::Slice { start, stop, step } => {
                let size = arr.shape().get(axis).copied().context(TooManyIndicesSnafu { ndim, count: source_axis + 1 })?;
                let slice = concrete_slice(*start, *stop, *step, size)?;
                arr.slice_axis_inplace(
                    Axis(axis),
                    Slice::new(slice.start as isize, Some(slice.stop as isize), slice.step as isize),
                );
                if slice.reversed {
                    arr.invert_axis(Axis(axis));
                }
                axis += 1;
                source_axis += 1;
            }
            Resolved::NewAxis => {
                arr.insert_axis_inplace(Axis(axis));
                axis += 1;
            }
            Resolved::IntArray(_) | Resolved::BoolMask(_) => {
                return AdvancedIndexingSnafu { reason: "array index in basic indexing" }.fail();
            }
        }
    }
    Ok(arr)
}

/// `x[indices]` for basic indices, as a new array.
pub fn basic_gather(x: &TensorValue, indices: &[Resolved]) -> Result<TensorValue> {
    let data = match x.data() {
        ArrayData::Bool(arr) => ArrayData::Bool(basic_region(arr.view(), indices)?.to_owned()),
        ArrayData::Int(arr) => ArrayData::Int(basic_region(arr.view(), indices)?.to_owned()),
        ArrayData::Float(arr) => ArrayData::Float(basic_region(arr.view(), indices)?.to_owned()),
    };
    Ok(TensorValue::new(x.dtype(), data)?)
}

fn write_region<T: Element>(dst: &mut ArrayD<T>, indices: &[Resolved], src: &ArrayD<T>, set: bool) -> Result<()> {
    let mut region = basic_region(dst.view_mut(), indices)?;
    let src = src.broadcast(region.raw_dim()).context(ValueShapeMismatchSnafu {
        value: src.shape().to_vec(),
        region: region.shape().to_vec(),
    })?;
    if set {
        region.assign(&src);
    } else {
        region.zip_mut_with(&src, |a, b| a.accumulate(b));
    }
    Ok(())
}

/// Write `y` into (or add it onto) the basic region of `x`, in place.
pub fn basic_scatter(x: &mut TensorValue, indices: &[Resolved], y: &TensorValue, set: bool) -> Result<()> {
    let dtype = x.dtype();
    let y = y.cast(dtype)?;
    match (x.data_mut(), y.data()) {
        (ArrayData::Bool(dst), ArrayData::Bool(src)) => write_region(dst, indices, src, set),
        (ArrayData::Int(dst), ArrayData::Int(src)) => write_region(dst, indices, src, set),
        (ArrayData::Float(dst), ArrayData::Float(src)) => write_region(dst, indices, src, set),
        _ => Err(tessera_ir::Error::DTypeMismatch { expected: dtype, actual: y.dtype() }.into()),
    }
}

// =========================================================================
// Advanced indexing
// =========================================================================

#[derive(Debug, Clone)]
enum PlanAxis {
    Slice { source: usize, slice: ConcreteSlice },
    NewAxis,
    /// The broadcast advanced block.
    Block,
}

enum Item {
    Basic(PlanAxis),
    Advanced { source: usize, indices: ArrayD<i64> },
}

/// How `x[indices]` reads `x` for a mix of basic and advanced entries.
#[derive(Debug, Clone)]
pub struct IndexPlan {
    out_shape: Vec<usize>,
    axes: Vec<PlanAxis>,
    /// Source axis and its (wrapped, in-bounds) indices broadcast to the block shape.
    advanced: Vec<(usize, ArrayD<i64>)>,
    block_ndim: usize,
    source_ndim: usize,
}

fn check_mask(mask: &ArrayD<bool>, first_axis: usize, shape: &[usize]) -> Result<()> {
    for (k, &len) in mask.shape().iter().enumerate() {
        let axis = first_axis + k;
        let size = shape.get(axis).copied().context(TooManyIndicesSnafu { ndim: shape.len(), count: axis + 1 })?;
        ensure!(len == size, BooleanIndexMismatchSnafu { axis, size, mask: len });
    }
    Ok(())
}

/// Check that every boolean mask matches the axes it covers.
pub fn check_advanced_indexing_dimensions(shape: &[usize], indices: &[Resolved]) -> Result<()> {
    let mut axis = 0;
    for index in indices {
        match index {
            Resolved::BoolMask(mask) => {
                check_mask(mask, axis, shape)?;
                axis += mask.ndim();
            }
            Resolved::NewAxis => {}
            _ => axis += 1,
        }
    }
    Ok(())
}

/// Coordinates of the `true` entries of a mask, one index array per mask axis.
fn nonzero(mask: &ArrayD<bool>) -> Vec<ArrayD<i64>> {
    let hits: Vec<Vec<usize>> =
        mask.indexed_iter().filter(|(_, v)| **v).map(|(index, _)| index.slice().to_vec()).collect();
    (0..mask.ndim())
        .map(|k| ArrayD::from_shape_fn(IxDyn(&[hits.len()]), |i| hits[i[0]][k] as i64))
        .collect()
}

impl IndexPlan {
    pub fn new(shape: &[usize], indices: &[Resolved]) -> Result<Self> {
        check_advanced_indexing_dimensions(shape, indices)?;

        let mut items = Vec::with_capacity(indices.len());
        let mut axis = 0;
        for index in indices {
            let size = |axis: usize| {
                shape.get(axis).copied().context(TooManyIndicesSnafu { ndim: shape.len(), count: axis + 1 })
            };
            match index {
                Resolved::Int(i) => {
                    let i = wrap_index(*i, axis, size(axis)?)?;
                    items.push(Item::Advanced { source: axis, indices: ArrayD::from_elem(IxDyn(&[]), i as i64) });
                    axis += 1;
                }
                Resolved::Slice { start, stop, step } => {
                    let slice = concrete_slice(*start, *stop, *step, size(axis)?)?;
                    items.push(Item::Basic(PlanAxis::Slice { source: axis, slice }));
                    axis += 1;
                }
                Resolved::NewAxis => items.push(Item::Basic(PlanAxis::NewAxis)),
                Resolved::IntArray(arr) => {
                    let n = size(axis)?;
                    let mut wrapped = ArrayD::zeros(arr.raw_dim());
                    for (dst, &i) in wrapped.iter_mut().zip(arr.iter()) {
                        *dst = wrap_index(i, axis, n)? as i64;
                    }
                    items.push(Item::Advanced { source: axis, indices: wrapped });
                    axis += 1;
                }
                Resolved::BoolMask(mask) => {
                    for coords in nonzero(mask) {
                        items.push(Item::Advanced { source: axis, indices: coords });
                        axis += 1;
                    }
                }
            }
        }
        ensure!(axis <= shape.len(), TooManyIndicesSnafu { ndim: shape.len(), count: axis });

        let shapes: Vec<&[usize]> = items
            .iter()
            .filter_map(|item| match item {
                Item::Advanced { indices, .. } => Some(indices.shape()),
                Item::Basic(_) => None,
            })
            .collect();
        let block_shape = broadcast_concrete(&shapes)
            .map_err(|_| Error::IndexShapeMismatch { shapes: shapes.iter().map(|s| s.to_vec()).collect() })?;

        let classes: Vec<bool> = items.iter().map(|item| matches!(item, Item::Basic(_))).collect();
        let groups = classes.windows(2).filter(|pair| pair[0] != pair[1]).count() + usize::from(!classes.is_empty());
        let block_first = groups > 3 || (groups == 3 && !classes[0]);

        let mut axes = Vec::with_capacity(shape.len() + 1);
        let mut advanced = Vec::new();
        if block_first {
            axes.push(PlanAxis::Block);
        }
        for item in items {
            match item {
                Item::Basic(plan_axis) => axes.push(plan_axis),
                Item::Advanced { source, indices } => {
                    if advanced.is_empty() && !block_first {
                        axes.push(PlanAxis::Block);
                    }
                    let broadcast = indices
                        .broadcast(IxDyn(&block_shape))
                        .context(IndexShapeMismatchSnafu { shapes: vec![indices.shape().to_vec(), block_shape.clone()] })?
                        .to_owned();
                    advanced.push((source, broadcast));
                }
            }
        }
        for source in axis..shape.len() {
            let slice = ConcreteSlice { start: 0, stop: shape[source], step: 1, reversed: false };
            axes.push(PlanAxis::Slice { source, slice });
        }

        let out_shape = axes
            .iter()
            .flat_map(|plan_axis| match plan_axis {
                PlanAxis::Slice { slice, .. } => vec![slice.len()],
                PlanAxis::NewAxis => vec![1],
                PlanAxis::Block => block_shape.clone(),
            })
            .collect();

        Ok(Self { out_shape, axes, advanced, block_ndim: block_shape.len(), source_ndim: shape.len() })
    }

    pub fn out_shape(&self) -> &[usize] {
        &self.out_shape
    }

    fn source(&self, out: &[usize], source: &mut [usize]) {
        let mut k = 0;
        for plan_axis in &self.axes {
            match plan_axis {
                PlanAxis::Slice { source: axis, slice } => {
                    source[*axis] = slice.position(out[k]);
                    k += 1;
                }
                PlanAxis::NewAxis => k += 1,
                PlanAxis::Block => {
                    let block = &out[k..k + self.block_ndim];
                    for (axis, indices) in &self.advanced {
                        source[*axis] = indices[block] as usize;
                    }
                    k += self.block_ndim;
                }
            }
        }
    }

    fn gather_array<T: Clone>(&self, x: &ArrayD<T>) -> ArrayD<T> {
        let mut source = vec![0; self.source_ndim];
        ArrayD::from_shape_fn(IxDyn(&self.out_shape), |out| {
            self.source(out.slice(), &mut source);
            x[source.as_slice()].clone()
        })
    }

    fn scatter_array<T: Element>(&self, x: &mut ArrayD<T>, y: &ArrayD<T>, mode: WriteMode) -> Result<()> {
        let y = y.broadcast(IxDyn(&self.out_shape)).context(ValueShapeMismatchSnafu {
            value: y.shape().to_vec(),
            region: self.out_shape.clone(),
        })?;
        let original = matches!(mode, WriteMode::IncrementOnce).then(|| x.clone());
        let mut written = HashSet::new();
        let mut duplicates = 0usize;

        let mut source = vec![0; self.source_ndim];
        for out in ndarray::indices(IxDyn(&self.out_shape)) {
            self.source(out.slice(), &mut source);
            let value = &y[out.slice()];
            match (&original, mode) {
                (_, WriteMode::Set) => x[source.as_slice()] = value.clone(),
                (Some(original), _) => {
                    if !written.insert(source.clone()) {
                        duplicates += 1;
                    }
                    let mut updated = original[source.as_slice()].clone();
                    updated.accumulate(value);
                    x[source.as_slice()] = updated;
                }
                (None, _) => x[source.as_slice()].accumulate(value),
            }
        }

        if duplicates > 0 {
            tracing::debug!(duplicates, "repeated indices written once; only the last update is kept");
        }
        Ok(())
    }

    /// `x[indices]` as a new array.
    pub fn gather(&self, x: &TensorValue) -> Result<TensorValue> {
        let data = tessera_ir::map_data!(x.data(), arr => self.gather_array(arr));
        Ok(TensorValue::new(x.dtype(), data)?)
    }

    /// Write `y` at the planned positions of `x`, in place.
    pub fn scatter(&self, x: &mut TensorValue, y: &TensorValue, mode: WriteMode) -> Result<()> {
        let dtype = x.dtype();
        let y = y.cast(dtype)?;
        match (x.data_mut(), y.data()) {
            (ArrayData::Bool(dst), ArrayData::Bool(src)) => self.scatter_array(dst, src, mode),
            (ArrayData::Int(dst), ArrayData::Int(src)) => self.scatter_array(dst, src, mode),
            (ArrayData::Float(dst), ArrayData::Float(src)) => self.scatter_array(dst, src, mode),
            _ => Err(tessera_ir::Error::DTypeMismatch { expected: dtype, actual: y.dtype() }.into()),
        }
    }
}

/// How a scatter combines the value with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite; for repeated positions the last write wins.
    Set,
    /// Accumulate every contribution, repeated positions included (`np.add.at`).
    Increment,
    /// Add once per position from the original values; for repeated positions only the
    /// last contribution survives.
    IncrementOnce,
}

impl WriteMode {
    pub fn new(set_instead_of_increment: bool, ignore_duplicate_indices: bool) -> Self {
        match (set_instead_of_increment, ignore_duplicate_indices) {
            (true, _) => WriteMode::Set,
            (false, false) => WriteMode::Increment,
            (false, true) => WriteMode::IncrementOnce,
        }
    }
}

/// Reject writes that would broadcast `value` along an axis its declared type does not
/// mark as broadcastable. Axes are aligned from the right against `region`.
pub fn check_runtime_broadcast(op: &str, declared: &[bool], value: &[usize], region: &[usize]) -> Result<()> {
    let Some(offset) = region.len().checked_sub(value.len()) else {
        return ValueShapeMismatchSnafu { value: value.to_vec(), region: region.to_vec() }.fail();
    };
    for (axis, (&broadcastable, &len)) in declared.iter().zip(value).enumerate() {
        let target = region[offset + axis];
        ensure!(broadcastable || len != 1 || target == 1, RuntimeBroadcastSnafu { op, axis, region: target });
    }
    Ok(())
}

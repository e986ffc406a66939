//! Result shapes of mixed basic/advanced indexing.
//!
//! Works on symbolic shapes throughout. Declared (static) output shapes are obtained by
//! running the same engine on the placeholder shape of the indexed variable and mapping
//! every non-constant result back to [`Dim::Unknown`](tessera_ir::Dim::Unknown).

use itertools::Itertools;
use snafu::ensure;
use tessera_ir::shape::{broadcast_shapes, to_static};
use tessera_ir::{SInt, Shape, StaticShape, Variable};

use crate::canonical::slice_len;
use crate::descriptor::{Bound, IndexDescriptor, ScalarIndex};
use crate::error::*;

/// Index entry as seen by shape inference.
#[derive(Debug, Clone)]
pub enum ShapeIndex {
    Slice { start: Option<SInt>, stop: Option<SInt>, step: Option<SInt> },
    NewAxis,
    /// Integer scalar (empty shape) or integer array of the given shape.
    Advanced(Shape),
}

impl ShapeIndex {
    pub const FULL_SLICE: ShapeIndex = ShapeIndex::Slice { start: None, stop: None, step: None };

    pub fn is_basic(&self) -> bool {
        matches!(self, ShapeIndex::Slice { .. } | ShapeIndex::NewAxis)
    }
}

/// Maximal run of consecutive entries of the same class.
#[derive(Debug, Clone)]
pub struct IndexGroup<'a> {
    pub basic: bool,
    /// Entries with the axis they index; new axes consume none.
    pub entries: Vec<(Option<usize>, &'a ShapeIndex)>,
}

fn regroup<'a>(entries: impl Iterator<Item = (Option<usize>, &'a ShapeIndex)>) -> Vec<IndexGroup<'a>> {
    let chunks = entries.chunk_by(|(_, index)| index.is_basic());
    let groups: Vec<IndexGroup<'a>> =
        chunks.into_iter().map(|(basic, group)| IndexGroup { basic, entries: group.collect() }).collect();
    groups
}

/// Split `indices` into groups of consecutive basic or advanced entries.
pub fn group_indices(indices: &[ShapeIndex]) -> Vec<IndexGroup<'_>> {
    let mut dim = 0;
    regroup(indices.iter().map(|index| match index {
        ShapeIndex::NewAxis => (None, index),
        _ => {
            dim += 1;
            (Some(dim - 1), index)
        }
    }))
}

/// Whether advanced groups are separated by basic ones, which moves the broadcast
/// advanced result to the front of the output.
///
/// Reproduces NumPy's rule as a condition on the group table: more than three groups,
/// or exactly three starting with an advanced group.
pub fn non_consecutive(groups: &[IndexGroup<'_>]) -> bool {
    groups.len() > 3 || (groups.len() == 3 && !groups[0].basic)
}

/// [`non_consecutive`] for a descriptor list.
pub fn non_consecutive_descriptors(idx_list: &[IndexDescriptor]) -> bool {
    let classes: Vec<bool> = idx_list.iter().map(IndexDescriptor::is_basic).dedup().collect();
    classes.len() > 3 || (classes.len() == 3 && !classes[0])
}

/// Shape of `x[indices]` for an array of shape `array_shape`.
///
/// ```rust
/// # use tessera_ir::SInt;
/// # use tessera_subtensor::shape_infer::{ShapeIndex, indexed_result_shape};
/// # use smallvec::smallvec;
/// // (3, 4, 5)[arr(2), :, arr(2)]: the advanced block moves to the front.
/// let shape: Vec<SInt> = vec![3.into(), 4.into(), 5.into()];
/// let arr = ShapeIndex::Advanced(smallvec![SInt::from(2)]);
/// let result = indexed_result_shape(&shape, &[arr.clone(), ShapeIndex::FULL_SLICE, arr]).unwrap();
/// assert_eq!(result.as_slice(), &[SInt::from(2), SInt::from(4)]);
/// ```
pub fn indexed_result_shape(array_shape: &[SInt], indices: &[ShapeIndex]) -> Result<Shape> {
    let count = indices.iter().filter(|index| !matches!(index, ShapeIndex::NewAxis)).count();
    ensure!(count <= array_shape.len(), TooManyIndicesSnafu { ndim: array_shape.len(), count });

    let mut groups = group_indices(indices);
    if non_consecutive(&groups) {
        groups.sort_by_key(|group| group.basic);
        groups = regroup(groups.into_iter().flat_map(|group| group.entries));
    }

    let mut result = Shape::new();
    let mut used = vec![false; array_shape.len()];
    for group in &groups {
        for &(dim, _) in &group.entries {
            if let Some(dim) = dim {
                used[dim] = true;
            }
        }

        if group.basic {
            for &(dim, index) in &group.entries {
                match (index, dim) {
                    (ShapeIndex::Slice { start, stop, step }, Some(dim)) => {
                        result.push(slice_len(start.clone(), stop.clone(), step.clone(), &array_shape[dim])?);
                    }
                    _ => result.push(SInt::Const(1)),
                }
            }
        } else {
            let shapes: Vec<Shape> = group
                .entries
                .iter()
                .filter_map(|(_, index)| match index {
                    ShapeIndex::Advanced(shape) => Some(shape.clone()),
                    _ => None,
                })
                .collect();
            result.extend(broadcast_shapes(&shapes)?);
        }
    }

    result.extend(array_shape.iter().zip(&used).filter(|(_, used)| !**used).map(|(dim, _)| dim.clone()));
    Ok(result)
}

// =========================================================================
// Descriptor lists
// =========================================================================

/// Number of selected elements of a boolean mask: known for constant masks, a symbol
/// unique to the mask otherwise.
pub fn mask_count(mask: &Variable) -> SInt {
    match mask.constant_value().and_then(|value| value.as_bool()) {
        Some(values) => SInt::from(values.iter().filter(|&&v| v).count()),
        None => SInt::symbol(format!("nnz({}#{})", mask.label(), mask.id())),
    }
}

fn scalar_value<'a>(index: &ScalarIndex, slots: &mut impl Iterator<Item = (&'a Variable, &'a Shape)>) -> Option<SInt> {
    match *index {
        ScalarIndex::Const { value, .. } => Some(SInt::Const(value)),
        ScalarIndex::Symbolic { .. } => slots.next().map(|(var, _)| var.symbolic_value()),
    }
}

fn bound_value<'a>(bound: &Bound, slots: &mut impl Iterator<Item = (&'a Variable, &'a Shape)>) -> Option<SInt> {
    match bound {
        Bound::Absent => None,
        Bound::Scalar(index) => scalar_value(index, slots),
    }
}

/// Shape-inference entries for a descriptor list whose slots are `slots`, with
/// `slot_shapes` the symbolic shapes of those slots.
///
/// Boolean masks expand to one advanced entry per masked axis, each of length
/// [`mask_count`].
pub fn shape_indices(idx_list: &[IndexDescriptor], slots: &[Variable], slot_shapes: &[Shape]) -> Vec<ShapeIndex> {
    let mut slots = slots.iter().zip(slot_shapes);
    let mut indices = Vec::with_capacity(idx_list.len());
    for entry in idx_list {
        match entry {
            IndexDescriptor::Scalar(index) => {
                scalar_value(index, &mut slots);
                indices.push(ShapeIndex::Advanced(Shape::new()));
            }
            IndexDescriptor::Slice { start, stop, step } => {
                let start = bound_value(start, &mut slots);
                let stop = bound_value(stop, &mut slots);
                let step = bound_value(step, &mut slots);
                indices.push(ShapeIndex::Slice { start, stop, step });
            }
            IndexDescriptor::NewAxis => indices.push(ShapeIndex::NewAxis),
            IndexDescriptor::Array { dtype, rank } => {
                let Some((var, shape)) = slots.next() else { break };
                if dtype.is_bool() {
                    let count = mask_count(var);
                    indices.extend((0..*rank).map(|_| ShapeIndex::Advanced(smallvec::smallvec![count.clone()])));
                } else {
                    indices.push(ShapeIndex::Advanced(shape.clone()));
                }
            }
        }
    }
    indices
}

/// Declared output shape of `x[idx_list]` given the slot variables.
pub fn static_result_shape(x: &Variable, idx_list: &[IndexDescriptor], slots: &[Variable]) -> Result<StaticShape> {
    let slot_shapes: Vec<Shape> = slots.iter().map(Variable::symbolic_shape).collect();
    let indices = shape_indices(idx_list, slots, &slot_shapes);
    Ok(to_static(&indexed_result_shape(&x.symbolic_shape(), &indices)?))
}

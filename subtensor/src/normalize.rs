//! Conversion of user-facing index entries into descriptors and slot inputs.
//!
//! [`RawIndex`] is what callers write (`x[1:, i, None]` in NumPy terms); the
//! normalizer turns each entry into an [`IndexDescriptor`] plus the runtime inputs that
//! fill its symbolic slots. Constant values, including constant variables, are baked
//! into the descriptor and produce no slot.

use bon::Builder;
use snafu::{OptionExt, ensure};
use tessera_ir::{Variable, scalar_constant_value};

use crate::descriptor::{Bound, IndexDescriptor, ScalarIndex, slot_count};
use crate::error::*;

/// Integer that is either known now or a graph variable.
#[derive(Debug, Clone)]
pub enum RawScalar {
    Int(i64),
    Var(Variable),
}

impl From<i64> for RawScalar {
    fn from(value: i64) -> Self {
        RawScalar::Int(value)
    }
}

impl From<i32> for RawScalar {
    fn from(value: i32) -> Self {
        RawScalar::Int(value.into())
    }
}

impl From<Variable> for RawScalar {
    fn from(var: Variable) -> Self {
        RawScalar::Var(var)
    }
}

impl From<&Variable> for RawScalar {
    fn from(var: &Variable) -> Self {
        RawScalar::Var(var.clone())
    }
}

/// `start:stop:step` with optional bounds.
///
/// ```rust
/// # use tessera_subtensor::normalize::RawSlice;
/// let reversed = RawSlice::builder().step(-1).build();
/// assert!(reversed.start.is_none());
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct RawSlice {
    #[builder(into)]
    pub start: Option<RawScalar>,
    #[builder(into)]
    pub stop: Option<RawScalar>,
    #[builder(into)]
    pub step: Option<RawScalar>,
}

impl RawSlice {
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step.is_none()
    }
}

/// One entry of an index tuple as written by a caller.
#[derive(Debug, Clone)]
pub enum RawIndex {
    Int(i64),
    Slice(RawSlice),
    NewAxis,
    /// Stands for as many full slices as needed to index every axis.
    Ellipsis,
    /// Scalar, integer array or boolean mask, depending on its type.
    Var(Variable),
    Bool(bool),
}

impl RawIndex {
    pub fn full_slice() -> Self {
        RawIndex::Slice(RawSlice::default())
    }

    pub fn is_full_slice(&self) -> bool {
        matches!(self, RawIndex::Slice(slice) if slice.is_full())
    }

    /// Axes of the indexed array this entry consumes.
    pub fn consumed_dims(&self) -> usize {
        match self {
            RawIndex::NewAxis | RawIndex::Ellipsis => 0,
            RawIndex::Var(var) if var.dtype().is_bool() => var.ndim(),
            _ => 1,
        }
    }
}

impl From<i64> for RawIndex {
    fn from(value: i64) -> Self {
        RawIndex::Int(value)
    }
}

impl From<i32> for RawIndex {
    fn from(value: i32) -> Self {
        RawIndex::Int(value.into())
    }
}

impl From<bool> for RawIndex {
    fn from(value: bool) -> Self {
        RawIndex::Bool(value)
    }
}

impl From<RawSlice> for RawIndex {
    fn from(slice: RawSlice) -> Self {
        RawIndex::Slice(slice)
    }
}

impl From<Variable> for RawIndex {
    fn from(var: Variable) -> Self {
        RawIndex::Var(var)
    }
}

impl From<&Variable> for RawIndex {
    fn from(var: &Variable) -> Self {
        RawIndex::Var(var.clone())
    }
}

/// Build a [`RawIndex`].
///
/// `s![..]` is a full slice, `s![start, stop]` and `s![start, stop, step]` are slices
/// with `_` for an absent bound (wrap negative literals in parentheses),
/// `s![NewAxis]` inserts an axis and `s![i]` converts `i` with [`RawIndex::from`].
///
/// ```rust
/// # use tessera_subtensor::s;
/// # use tessera_subtensor::normalize::RawIndex;
/// let tail = s![1, _];
/// let reversed = s![_, _, (-1)];
/// assert!(matches!(s![..], RawIndex::Slice(ref slice) if slice.is_full()));
/// assert!(matches!(s![3], RawIndex::Int(3)));
/// # let _ = (tail, reversed);
/// ```
#[macro_export]
macro_rules! s {
    (..) => {
        $crate::normalize::RawIndex::full_slice()
    };
    (NewAxis) => {
        $crate::normalize::RawIndex::NewAxis
    };
    ($start:tt, $stop:tt) => {
        $crate::s![$start, $stop, _]
    };
    ($start:tt, $stop:tt, $step:tt) => {
        $crate::normalize::RawIndex::Slice($crate::normalize::RawSlice {
            start: $crate::__slice_bound!($start),
            stop: $crate::__slice_bound!($stop),
            step: $crate::__slice_bound!($step),
        })
    };
    ($index:expr) => {
        $crate::normalize::RawIndex::from($index)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __slice_bound {
    (_) => {
        None
    };
    ($value:expr) => {
        Some($crate::normalize::RawScalar::from($value))
    };
}

/// Constant value of a scalar index entry.
///
/// Variables without a constant value fail with the not-a-constant signal
/// ([`Error::is_not_constant`]).
pub fn as_index_literal(raw: &RawScalar) -> Result<i64> {
    match raw {
        RawScalar::Int(value) => Ok(*value),
        RawScalar::Var(var) => Ok(scalar_constant_value(var)?),
    }
}

// =========================================================================
// Normalization
// =========================================================================

fn scalar_from_var(var: &Variable, slots: &mut Vec<Variable>) -> ScalarIndex {
    match scalar_constant_value(var) {
        Ok(value) => ScalarIndex::Const { dtype: var.dtype(), value },
        Err(_) => {
            slots.push(var.clone());
            ScalarIndex::Symbolic { dtype: var.dtype() }
        }
    }
}

fn is_scalar_like(var: &Variable) -> bool {
    var.ty().broadcastable().iter().all(|&b| b)
}

/// Scalar entry of a basic index: integer typed and effectively 0-d.
fn basic_scalar(var: &Variable, slots: &mut Vec<Variable>) -> Result<ScalarIndex> {
    let dtype = var.dtype();
    ensure!(
        !dtype.is_bool(),
        AdvancedIndexingSnafu { reason: format!("boolean index {var:?} requires advanced indexing") }
    );
    ensure!(dtype.is_int(), IndexTypeSnafu { dtype });
    ensure!(
        is_scalar_like(var),
        AdvancedIndexingSnafu { reason: format!("array index {var:?} requires advanced indexing") }
    );
    Ok(scalar_from_var(var, slots))
}

fn normalize_bound(bound: &Option<RawScalar>, is_stop: bool, slots: &mut Vec<Variable>) -> Result<Bound> {
    let scalar = match bound {
        None => return Ok(Bound::Absent),
        Some(RawScalar::Int(value)) => ScalarIndex::int(*value),
        Some(RawScalar::Var(var)) => basic_scalar(var, slots)?,
    };
    // A stop at the platform's maximum size means "to the end".
    if is_stop && matches!(scalar, ScalarIndex::Const { value: i64::MAX, .. }) {
        return Ok(Bound::Absent);
    }
    Ok(Bound::Scalar(scalar))
}

fn normalize_slice(slice: &RawSlice, slots: &mut Vec<Variable>) -> Result<IndexDescriptor> {
    let start = normalize_bound(&slice.start, false, slots)?;
    let stop = normalize_bound(&slice.stop, true, slots)?;
    let step = normalize_bound(&slice.step, false, slots)?;
    Ok(IndexDescriptor::Slice { start, stop, step })
}

/// Descriptor and slot inputs of one basic index entry.
///
/// Accepts integers, slices, new axes and effectively 0-d integer variables.
pub fn normalize(raw: &RawIndex) -> Result<(IndexDescriptor, Vec<Variable>)> {
    let mut slots = Vec::new();
    let descriptor = match raw {
        RawIndex::Int(value) => IndexDescriptor::Scalar(ScalarIndex::int(*value)),
        RawIndex::Slice(slice) => normalize_slice(slice, &mut slots)?,
        RawIndex::NewAxis => IndexDescriptor::NewAxis,
        RawIndex::Ellipsis => {
            return UnsupportedIndexSnafu { reason: "ellipsis must be expanded before normalization" }.fail();
        }
        RawIndex::Var(var) => IndexDescriptor::Scalar(basic_scalar(var, &mut slots)?),
        RawIndex::Bool(value) => {
            return AdvancedIndexingSnafu { reason: format!("boolean index {value} requires advanced indexing") }.fail();
        }
    };
    Ok((descriptor, slots))
}

/// Descriptor and slot inputs of one advanced index entry.
///
/// Integer variables of rank 0 are scalars; integer and boolean variables of higher
/// rank are arrays. Boolean scalars are not supported.
pub fn normalize_advanced(raw: &RawIndex) -> Result<(IndexDescriptor, Vec<Variable>)> {
    match raw {
        RawIndex::Bool(value) => {
            UnsupportedIndexSnafu { reason: format!("boolean scalar index {value} is not supported") }.fail()
        }
        RawIndex::Var(var) => {
            let dtype = var.dtype();
            if dtype.is_bool() {
                ensure!(
                    var.ndim() > 0,
                    UnsupportedIndexSnafu { reason: format!("boolean scalar index {var:?} is not supported") }
                );
                return Ok((IndexDescriptor::Array { dtype, rank: var.ndim() }, vec![var.clone()]));
            }
            ensure!(dtype.is_int(), IndexTypeSnafu { dtype });
            if var.ndim() == 0 {
                let mut slots = Vec::new();
                let scalar = scalar_from_var(var, &mut slots);
                return Ok((IndexDescriptor::Scalar(scalar), slots));
            }
            Ok((IndexDescriptor::Array { dtype, rank: var.ndim() }, vec![var.clone()]))
        }
        other => normalize(other),
    }
}

fn normalize_all(
    indices: &[RawIndex],
    entry: fn(&RawIndex) -> Result<(IndexDescriptor, Vec<Variable>)>,
) -> Result<(Vec<IndexDescriptor>, Vec<Variable>)> {
    let mut idx_list = Vec::with_capacity(indices.len());
    let mut slots = Vec::new();
    for raw in indices {
        let (descriptor, inputs) = entry(raw)?;
        idx_list.push(descriptor);
        slots.extend(inputs);
    }
    Ok((idx_list, slots))
}

/// [`normalize`] over a whole index tuple.
pub fn normalize_indices(indices: &[RawIndex]) -> Result<(Vec<IndexDescriptor>, Vec<Variable>)> {
    normalize_all(indices, normalize)
}

/// [`normalize_advanced`] over a whole index tuple.
pub fn normalize_advanced_indices(indices: &[RawIndex]) -> Result<(Vec<IndexDescriptor>, Vec<Variable>)> {
    normalize_all(indices, normalize_advanced)
}

/// Replace the (single) ellipsis by full slices so every axis of an `ndim`-dimensional
/// array is indexed.
pub fn expand_ellipsis(indices: &[RawIndex], ndim: usize) -> Result<Vec<RawIndex>> {
    let count = indices.iter().filter(|raw| matches!(raw, RawIndex::Ellipsis)).count();
    ensure!(count <= 1, UnsupportedIndexSnafu { reason: "an index can only have a single ellipsis" });
    if count == 0 {
        return Ok(indices.to_vec());
    }

    let consumed: usize = indices.iter().map(RawIndex::consumed_dims).sum();
    let fill = ndim.saturating_sub(consumed);
    Ok(indices
        .iter()
        .flat_map(|raw| match raw {
            RawIndex::Ellipsis => vec![RawIndex::full_slice(); fill],
            other => vec![other.clone()],
        })
        .collect())
}

// =========================================================================
// Reconstruction
// =========================================================================

fn next_slot<'a>(slots: &mut std::slice::Iter<'a, Variable>, expected: usize) -> Result<&'a Variable> {
    slots.next().context(IndexTemplateMismatchSnafu {
        op: "index reconstruction",
        expected,
        actual: expected.saturating_sub(1),
    })
}

/// `None` rebuilds the index as written, `Some(allow_partial)` folds constant slots.
fn rebuild(idx_list: &[IndexDescriptor], slots: &[Variable], fold: Option<bool>) -> Result<Vec<RawIndex>> {
    let expected = slot_count(idx_list);
    ensure!(
        slots.len() == expected,
        IndexTemplateMismatchSnafu { op: "index reconstruction", expected, actual: slots.len() }
    );

    let mut slots = slots.iter();
    let scalar = |index: &ScalarIndex, slots: &mut std::slice::Iter<'_, Variable>| -> Result<RawScalar> {
        match *index {
            ScalarIndex::Const { value, .. } => Ok(RawScalar::Int(value)),
            ScalarIndex::Symbolic { .. } => {
                let var = next_slot(slots, expected)?;
                match fold {
                    None => Ok(RawScalar::Var(var.clone())),
                    Some(allow_partial) => match scalar_constant_value(var) {
                        Ok(value) => Ok(RawScalar::Int(value)),
                        Err(_) if allow_partial => Ok(RawScalar::Var(var.clone())),
                        Err(source) => Err(source.into()),
                    },
                }
            }
        }
    };
    let bound = |bound: &Bound, slots: &mut std::slice::Iter<'_, Variable>| -> Result<Option<RawScalar>> {
        match bound {
            Bound::Absent => Ok(None),
            Bound::Scalar(index) => scalar(index, slots).map(Some),
        }
    };

    let mut indices = Vec::with_capacity(idx_list.len());
    for entry in idx_list {
        let raw = match entry {
            IndexDescriptor::Scalar(index) => match scalar(index, &mut slots)? {
                RawScalar::Int(value) => RawIndex::Int(value),
                RawScalar::Var(var) => RawIndex::Var(var),
            },
            IndexDescriptor::Slice { start, stop, step } => RawIndex::Slice(RawSlice {
                start: bound(start, &mut slots)?,
                stop: bound(stop, &mut slots)?,
                step: bound(step, &mut slots)?,
            }),
            IndexDescriptor::NewAxis => RawIndex::NewAxis,
            IndexDescriptor::Array { .. } => {
                let var = next_slot(&mut slots, expected)?;
                if fold == Some(false) {
                    return Err(Error::Ir { source: tessera_ir::Error::NotScalarConstant });
                }
                RawIndex::Var(var.clone())
            }
        };
        indices.push(raw);
    }
    Ok(indices)
}

/// The index tuple a node was built from, with slots put back in place.
pub fn indices_from_subtensor(idx_list: &[IndexDescriptor], slots: &[Variable]) -> Result<Vec<RawIndex>> {
    rebuild(idx_list, slots, None)
}

/// The index tuple with every slot replaced by its constant value.
///
/// Slots without a constant value fail with the not-a-constant signal, unless
/// `allow_partial` is set, in which case they are kept as variables.
pub fn get_constant_idx(idx_list: &[IndexDescriptor], slots: &[Variable], allow_partial: bool) -> Result<Vec<RawIndex>> {
    rebuild(idx_list, slots, Some(allow_partial))
}

//! Index descriptors: the construction-time description of one index entry.
//!
//! A descriptor list is what an indexing operator is parameterized by. Constants are
//! baked into the descriptors; every [`ScalarIndex::Symbolic`] bound and every
//! [`IndexDescriptor::Array`] is a *slot*, filled left to right by one runtime input
//! of the operator's node.

use snafu::ensure;
use tessera_dtype::DType;
use tessera_ir::Variable;

use crate::error::*;

/// Integer index that is either baked in or supplied at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarIndex {
    Const { dtype: DType, value: i64 },
    Symbolic { dtype: DType },
}

impl ScalarIndex {
    pub const fn int(value: i64) -> Self {
        ScalarIndex::Const { dtype: DType::Int64, value }
    }

    pub fn dtype(&self) -> DType {
        match *self {
            ScalarIndex::Const { dtype, .. } | ScalarIndex::Symbolic { dtype } => dtype,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, ScalarIndex::Symbolic { .. })
    }
}

/// One bound of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    Absent,
    Scalar(ScalarIndex),
}

impl Bound {
    pub fn is_absent(&self) -> bool {
        matches!(self, Bound::Absent)
    }

    fn slot_count(&self) -> usize {
        match self {
            Bound::Scalar(scalar) if scalar.is_symbolic() => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexDescriptor {
    /// Drops the indexed axis.
    Scalar(ScalarIndex),
    Slice { start: Bound, stop: Bound, step: Bound },
    /// Inserts a length-1 axis without consuming one.
    NewAxis,
    /// Integer or boolean array; only valid for advanced operators.
    Array { dtype: DType, rank: usize },
}

impl IndexDescriptor {
    /// `:`
    pub const FULL_SLICE: IndexDescriptor =
        IndexDescriptor::Slice { start: Bound::Absent, stop: Bound::Absent, step: Bound::Absent };

    /// Slices and new axes; these keep the basic (view) layout in mixed indexing.
    pub fn is_basic(&self) -> bool {
        matches!(self, IndexDescriptor::Slice { .. } | IndexDescriptor::NewAxis)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, IndexDescriptor::Array { .. })
    }

    pub fn is_bool_mask(&self) -> bool {
        matches!(self, IndexDescriptor::Array { dtype, .. } if dtype.is_bool())
    }

    pub fn is_full_slice(&self) -> bool {
        *self == Self::FULL_SLICE
    }

    /// Number of axes of the indexed array this entry consumes.
    pub fn consumed_dims(&self) -> usize {
        match self {
            IndexDescriptor::NewAxis => 0,
            IndexDescriptor::Array { dtype, rank } if dtype.is_bool() => *rank,
            _ => 1,
        }
    }

    pub fn slot_count(&self) -> usize {
        match self {
            IndexDescriptor::Scalar(scalar) => usize::from(scalar.is_symbolic()),
            IndexDescriptor::Slice { start, stop, step } => start.slot_count() + stop.slot_count() + step.slot_count(),
            IndexDescriptor::NewAxis => 0,
            IndexDescriptor::Array { .. } => 1,
        }
    }
}

/// Total number of runtime inputs a descriptor list expects.
pub fn slot_count(idx_list: &[IndexDescriptor]) -> usize {
    idx_list.iter().map(IndexDescriptor::slot_count).sum()
}

/// Number of axes the descriptor list consumes.
pub fn consumed_dims(idx_list: &[IndexDescriptor]) -> usize {
    idx_list.iter().map(IndexDescriptor::consumed_dims).sum()
}

/// Check that `x` has enough axes for `idx_list`.
pub fn check_rank(idx_list: &[IndexDescriptor], ndim: usize) -> Result<()> {
    let count = consumed_dims(idx_list);
    ensure!(count <= ndim, TooManyIndicesSnafu { ndim, count });
    Ok(())
}

/// Check that `slots` fill the symbolic slots of `idx_list` with values of the declared
/// types.
pub fn check_slots(op: &str, idx_list: &[IndexDescriptor], slots: &[Variable]) -> Result<()> {
    let expected = slot_count(idx_list);
    ensure!(
        slots.len() == expected,
        IndexTemplateMismatchSnafu { op, expected, actual: slots.len() }
    );

    let mut slots = slots.iter();
    for entry in idx_list {
        match entry {
            IndexDescriptor::Scalar(scalar) => check_scalar_slot(scalar, &mut slots)?,
            IndexDescriptor::Slice { start, stop, step } => {
                for bound in [start, stop, step] {
                    if let Bound::Scalar(scalar) = bound {
                        check_scalar_slot(scalar, &mut slots)?;
                    }
                }
            }
            IndexDescriptor::NewAxis => {}
            IndexDescriptor::Array { dtype, rank } => {
                let Some(var) = slots.next() else { break };
                ensure!(
                    var.dtype().is_bool() == dtype.is_bool() && (var.dtype().is_int() || var.dtype().is_bool()),
                    IndexTypeSnafu { dtype: var.dtype() }
                );
                ensure!(
                    var.ndim() == *rank,
                    UnsupportedIndexSnafu {
                        reason: format!("{op} expects a rank-{rank} index array, got rank {}", var.ndim())
                    }
                );
            }
        }
    }
    Ok(())
}

fn check_scalar_slot<'a>(scalar: &ScalarIndex, slots: &mut impl Iterator<Item = &'a Variable>) -> Result<()> {
    let ScalarIndex::Symbolic { dtype } = *scalar else { return Ok(()) };
    let Some(var) = slots.next() else { return Ok(()) };
    let scalar_like = var.ty().broadcastable().iter().all(|&b| b);
    ensure!(var.dtype() == dtype && scalar_like, IndexTypeSnafu { dtype: var.dtype() });
    Ok(())
}

// =========================================================================
// Display
// =========================================================================

fn render_slice(start: &Bound, stop: &Bound, step: &Bound) -> &'static str {
    match (start.is_absent(), stop.is_absent(), step.is_absent()) {
        (true, true, true) => ":",
        (false, true, true) => "start:",
        (true, false, true) => ":stop",
        (false, false, true) => "start:stop",
        (true, true, false) => "::step",
        (false, true, false) => "start::step",
        (true, false, false) => ":stop:step",
        (false, false, false) => "start:stop:step",
    }
}

/// Compact rendering of a descriptor list: slices show which bounds are present,
/// other entries get the letters `i`, `j`, `k`, `ii`, ...
pub struct DisplayIndices<'a>(pub &'a [IndexDescriptor]);

impl std::fmt::Display for DisplayIndices<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut letters = 0usize;
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match entry {
                IndexDescriptor::Slice { start, stop, step } => f.write_str(render_slice(start, stop, step))?,
                IndexDescriptor::NewAxis => f.write_str("newaxis")?,
                IndexDescriptor::Scalar(_) | IndexDescriptor::Array { .. } => {
                    let letter = ["i", "j", "k"][letters % 3];
                    f.write_str(&letter.repeat(letters / 3 + 1))?;
                    letters += 1;
                }
            }
        }
        Ok(())
    }
}

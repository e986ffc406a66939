//! Canonical form of slices and scalar indices.
//!
//! A canonical slice satisfies `0 <= start <= stop <= length` and `step >= 1`; a
//! separate direction (`1` or `-1`) says whether the selected elements are read
//! backwards. Every quantity is an [`SInt`], so the same algorithm serves fully known
//! slices (everything folds to numbers) and symbolic ones (branches become `select`
//! expressions resolved at run time).

use snafu::ensure;
use tessera_ir::SInt;

use crate::error::*;

/// Slice in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSlice {
    pub start: SInt,
    pub stop: SInt,
    pub step: SInt,
}

impl std::fmt::Display for CanonicalSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.stop, self.step)
    }
}

/// `idx` for non-negative indices, `idx + length` otherwise.
pub fn canonical_index(idx: &SInt, length: &SInt) -> SInt {
    idx.lt(0).select(idx + length, idx)
}

/// Python's `slice(start, stop, step).indices(length)`.
pub fn slice_indices(start: Option<i64>, stop: Option<i64>, step: Option<i64>, length: i64) -> Result<(i64, i64, i64)> {
    let step = step.unwrap_or(1);
    ensure!(step != 0, SliceStepZeroSnafu);

    let (lower, upper) = if step < 0 { (-1, length - 1) } else { (0, length) };
    let clamp = |v: i64| if v < 0 { v.saturating_add(length).max(lower) } else { v.min(upper) };

    let start = start.map_or(if step < 0 { upper } else { lower }, clamp);
    let stop = stop.map_or(if step < 0 { lower } else { upper }, clamp);
    Ok((start, stop, step))
}

/// Canonicalize `start:stop:step` over an axis of length `length`.
///
/// Returns the canonical slice and its direction. When every input is a constant the
/// result is constant too.
///
/// ```rust
/// # use tessera_ir::SInt;
/// # use tessera_subtensor::canonical::canonical_slice;
/// // x[::-2] over 5 elements reads 0, 2, 4 backwards.
/// let (slice, direction) = canonical_slice(None, None, Some(SInt::from(-2)), &SInt::from(5)).unwrap();
/// assert_eq!(slice.to_string(), "0:5:2");
/// assert_eq!(direction, SInt::from(-1));
/// ```
pub fn canonical_slice(
    start: Option<SInt>,
    stop: Option<SInt>,
    step: Option<SInt>,
    length: &SInt,
) -> Result<(CanonicalSlice, SInt)> {
    if let Some(n) = length.as_const()
        && start.as_ref().is_none_or(SInt::is_const)
        && stop.as_ref().is_none_or(SInt::is_const)
        && step.as_ref().is_none_or(SInt::is_const)
    {
        let konst = |v: &Option<SInt>| v.as_ref().and_then(SInt::as_const);
        let (a, b, c) = slice_indices(konst(&start), konst(&stop), konst(&step), n)?;
        if a <= b && c >= 1 {
            return Ok((CanonicalSlice { start: a.into(), stop: b.into(), step: c.into() }, SInt::Const(1)));
        }
    }

    let step = step.unwrap_or(SInt::Const(1));
    ensure!(step.as_const() != Some(0), SliceStepZeroSnafu);

    if step.as_const() == Some(1)
        && let Some(slice) = unit_step_fast_path(start.as_ref(), stop.as_ref(), length)
    {
        return Ok((slice, SInt::Const(1)));
    }

    Ok(generic_slice(start, stop, step, length))
}

fn is_max_size(v: &SInt) -> bool {
    v.as_const() == Some(i64::MAX)
}

/// Step-1 slices where one end is the axis boundary.
fn unit_step_fast_path(start: Option<&SInt>, stop: Option<&SInt>, length: &SInt) -> Option<CanonicalSlice> {
    let is_start_0 = match start {
        None => true,
        Some(start) => match (start.as_const(), length.as_const()) {
            (Some(0), _) => true,
            (Some(s), Some(n)) => s < 0 && s + n <= 0,
            _ => false,
        },
    };
    let is_stop_length = match stop {
        None => true,
        Some(stop) if stop == length || is_max_size(stop) => true,
        Some(stop) => matches!((stop.as_const(), length.as_const()), (Some(s), Some(n)) if s >= n),
    };
    let unit = |start: SInt, stop: SInt| CanonicalSlice { start, stop, step: SInt::Const(1) };

    if is_start_0 {
        if is_stop_length {
            return Some(unit(SInt::Const(0), length.clone()));
        }
        let stop = stop?;
        if stop.as_const().is_some_and(|s| s >= 0) {
            return Some(unit(SInt::Const(0), stop.lt(length).select(stop, length)));
        }
        return Some(unit(SInt::Const(0), clamp_bound(stop, length)));
    }

    if is_stop_length {
        let start = start?;
        if start.as_const().is_some_and(|s| s >= 0) {
            return Some(unit(start.lt(length).select(start, length), length.clone()));
        }
        return Some(unit(clamp_bound(start, length), length.clone()));
    }
    None
}

/// Wrap a negative bound once, then clamp into `[0, length]`.
fn clamp_bound(bound: &SInt, length: &SInt) -> SInt {
    let wrapped = bound + length;
    bound.lt(0).select(wrapped.lt(0).select(0, &wrapped), bound.lt(length).select(bound, length))
}

/// `|step|`, saturated at `i64::MAX`. Any step at least as long as the axis selects at
/// most one element, so `i64::MIN` behaves like `-i64::MAX`.
fn step_magnitude(step: &SInt) -> SInt {
    match step.as_const() {
        Some(s) => SInt::Const(s.saturating_abs()),
        None => {
            let wrapped = step.clone().abs();
            wrapped.lt(0).select(i64::MAX, &wrapped)
        }
    }
}

fn generic_slice(start: Option<SInt>, stop: Option<SInt>, step: SInt, length: &SInt) -> (CanonicalSlice, SInt) {
    let abs_step = step_magnitude(&step);
    let (sgn_step, is_step_neg) = match step.as_const() {
        Some(s) => (SInt::Const(s.signum()), tessera_ir::SBool::Const(s < 0)),
        None => (step.clone().sign(), step.lt(0)),
    };
    let switch_neg_step = |neg: SInt, pos: SInt| is_step_neg.select(neg, pos);

    let start = match start {
        None => switch_neg_step(length - 1, SInt::Const(0)),
        Some(start) => {
            let start = start.lt(0).select(&start + length, &start);
            let start = start.lt(0).select(switch_neg_step(SInt::Const(-1), SInt::Const(0)), &start);
            start.ge(length).select(switch_neg_step(length - 1, length.clone()), &start)
        }
    };
    let stop = match stop {
        Some(stop) if !is_max_size(&stop) => {
            let stop = stop.lt(0).select(&stop + length, &stop);
            let stop = stop.lt(0).select(-1, &stop);
            stop.ge(length).select(length, &stop)
        }
        _ => switch_neg_step(SInt::Const(-1), length.clone()),
    };

    let nw_stop = switch_neg_step(&start + 1, stop.clone());
    let slice_len = (&start - &stop - 1).floor_div(&abs_step) + 1;
    let slice_len = slice_len.lt(0).select(0, &slice_len);
    // Empty ranges start at `nw_stop`.
    let neg_start = slice_len.lt(1).select(&nw_stop, &nw_stop - (&slice_len - 1) * &abs_step - 1);
    let neg_start = neg_start.lt(0).select(&nw_stop - 1, &neg_start);
    let nw_start = switch_neg_step(neg_start, start);
    let nw_start = nw_start.lt(0).select(0, &nw_start);
    let nw_stop = nw_stop.lt(0).select(0, &nw_stop);
    let nw_start = nw_start.lt(&nw_stop).select(&nw_start, &nw_stop);

    let direction = if step.as_const() == Some(1) { SInt::Const(1) } else { sgn_step };
    (CanonicalSlice { start: nw_start, stop: nw_stop, step: abs_step }, direction)
}

/// Number of elements of `range(start, stop, step)`.
pub fn range_len(slice: &CanonicalSlice) -> SInt {
    let CanonicalSlice { start, stop, step } = slice;
    let forward = step.gt(0).and(&start.lt(stop));
    let backward = step.lt(0).and(&start.gt(stop));
    forward.select(
        (stop - 1 - start).floor_div(step) + 1,
        backward.select((start - 1 - stop).floor_div(-step.clone()) + 1, 0),
    )
}

/// Length of `start:stop:step` applied to an axis of length `length`.
pub fn slice_len(start: Option<SInt>, stop: Option<SInt>, step: Option<SInt>, length: &SInt) -> Result<SInt> {
    let (canonical, _) = canonical_slice(start, stop, step, length)?;
    Ok(range_len(&canonical))
}

/// Canonical slice over a concrete axis, ready for view slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcreteSlice {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
    /// Read the selected elements back to front.
    pub reversed: bool,
}

impl ConcreteSlice {
    pub fn len(&self) -> usize {
        if self.stop > self.start { (self.stop - self.start - 1) / self.step + 1 } else { 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source position of the `i`-th selected element.
    pub fn position(&self, i: usize) -> usize {
        let i = if self.reversed { self.len() - 1 - i } else { i };
        self.start + i * self.step
    }
}

pub fn concrete_slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>, length: usize) -> Result<ConcreteSlice> {
    let (canonical, direction) =
        canonical_slice(start.map(SInt::from), stop.map(SInt::from), step.map(SInt::from), &SInt::from(length))?;
    let as_usize = |v: &SInt| -> Result<usize> { Ok(v.to_const()?.max(0) as usize) };
    Ok(ConcreteSlice {
        start: as_usize(&canonical.start)?,
        stop: as_usize(&canonical.stop)?,
        step: as_usize(&canonical.step)?,
        reversed: direction.to_const()? < 0,
    })
}

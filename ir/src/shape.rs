//! Declared (static) and symbolic shapes.
//!
//! A declared shape is what a [`TensorType`](crate::graph::TensorType) carries: per axis
//! either a known length or unknown. A symbolic [`Shape`] is what shape inference works
//! on: per axis an [`SInt`], which is a number or an expression over named symbols.
//! Static results are derived from the symbolic engine by substituting fresh symbols
//! for unknown axes and mapping non-constant results back to [`Dim::Unknown`].

use smallvec::SmallVec;
use snafu::ensure;

use crate::error::*;
use crate::scalar::Bindings;
use crate::sint::SInt;

/// Declared length of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Known(usize),
    Unknown,
}

impl Dim {
    pub const fn known(self) -> Option<usize> {
        match self {
            Dim::Known(n) => Some(n),
            Dim::Unknown => None,
        }
    }

    /// An axis is broadcastable iff its length is statically 1.
    pub const fn is_broadcastable(self) -> bool {
        matches!(self, Dim::Known(1))
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Known(n)
    }
}

impl From<Option<usize>> for Dim {
    fn from(n: Option<usize>) -> Self {
        n.map_or(Dim::Unknown, Dim::Known)
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dim::Known(n) => write!(f, "{n}"),
            Dim::Unknown => f.write_str("?"),
        }
    }
}

/// Declared shape.
pub type StaticShape = SmallVec<[Dim; 4]>;

/// Symbolic shape.
pub type Shape = SmallVec<[SInt; 4]>;

/// Build a declared shape from anything convertible to [`Dim`].
///
/// ```rust
/// # use tessera_ir::shape::{Dim, static_shape};
/// let shape = static_shape([Some(3usize), None]);
/// assert_eq!(shape.as_slice(), &[Dim::Known(3), Dim::Unknown]);
/// ```
pub fn static_shape<D: Into<Dim>>(dims: impl IntoIterator<Item = D>) -> StaticShape {
    dims.into_iter().map(Into::into).collect()
}

pub fn broadcastable(shape: &[Dim]) -> SmallVec<[bool; 4]> {
    shape.iter().map(|dim| dim.is_broadcastable()).collect()
}

/// Concrete lengths if every axis is known.
pub fn to_concrete(shape: &[Dim]) -> Option<SmallVec<[usize; 4]>> {
    shape.iter().map(|dim| dim.known()).collect()
}

/// Map a symbolic shape to a declared one; anything non-constant is unknown.
pub fn to_static(shape: &[SInt]) -> StaticShape {
    shape
        .iter()
        .map(|dim| match dim.as_const() {
            Some(n) if n >= 0 => Dim::Known(n as usize),
            _ => Dim::Unknown,
        })
        .collect()
}

/// Symbolic view of a declared shape: unknown axis `i` becomes the symbol `{prefix}[i]`.
pub fn placeholder_shape(shape: &[Dim], prefix: &str) -> Shape {
    shape
        .iter()
        .enumerate()
        .map(|(i, dim)| match dim {
            Dim::Known(n) => SInt::from(*n),
            Dim::Unknown => SInt::symbol(format!("{prefix}[{i}]")),
        })
        .collect()
}

/// Evaluate every axis of a symbolic shape.
pub fn evaluate_shape(shape: &[SInt], bindings: &Bindings) -> Result<Vec<usize>> {
    shape.iter().map(|dim| dim.evaluate(bindings).map(|n| n.max(0) as usize)).collect()
}

fn align_left<T: Clone>(shapes: &[&[T]], one: T) -> Vec<SmallVec<[T; 4]>> {
    let max_dims = shapes.iter().map(|s| s.len()).max().unwrap_or(0);

    shapes
        .iter()
        .map(|shape| {
            let mut aligned = SmallVec::with_capacity(max_dims);
            aligned.extend(std::iter::repeat_n(one.clone(), max_dims - shape.len()));
            aligned.extend(shape.iter().cloned());
            aligned
        })
        .collect()
}

// =========================================================================
// Broadcasting
// =========================================================================

/// NumPy broadcasting of declared shapes.
///
/// An unknown axis against a known length `n > 1` yields `n`: the unknown side is
/// allowed to turn out to be 1 at run time.
pub fn broadcast_static(shapes: &[&[Dim]]) -> Result<StaticShape> {
    let aligned = align_left(shapes, Dim::Known(1));
    let ndim = aligned.first().map_or(0, |s| s.len());

    (0..ndim)
        .map(|axis| {
            aligned.iter().map(|shape| shape[axis]).try_fold(Dim::Known(1), |acc, dim| match (acc, dim) {
                (Dim::Known(1), other) | (other, Dim::Known(1)) => Ok(other),
                (Dim::Known(a), Dim::Known(b)) => {
                    ensure!(a == b, BroadcastShapeMismatchSnafu { axis, lhs: acc, rhs: dim });
                    Ok(acc)
                }
                (Dim::Known(n), Dim::Unknown) | (Dim::Unknown, Dim::Known(n)) => Ok(Dim::Known(n)),
                (Dim::Unknown, Dim::Unknown) => Ok(Dim::Unknown),
            })
        })
        .collect()
}

/// NumPy broadcasting of symbolic shapes.
///
/// Two distinct symbolic lengths combine into `where(a == 1, b, a)`: whether either
/// side is 1 is only decided at run time.
pub fn broadcast_shapes(shapes: &[Shape]) -> Result<Shape> {
    let views: Vec<&[SInt]> = shapes.iter().map(|s| s.as_slice()).collect();
    let aligned = align_left(&views, SInt::Const(1));
    let ndim = aligned.first().map_or(0, |s| s.len());

    (0..ndim)
        .map(|axis| {
            aligned.iter().map(|shape| shape[axis].clone()).try_fold(SInt::Const(1), |acc, dim| {
                broadcast_dim(axis, acc, dim)
            })
        })
        .collect()
}

fn broadcast_dim(axis: usize, lhs: SInt, rhs: SInt) -> Result<SInt> {
    if lhs == rhs {
        return Ok(lhs);
    }
    Ok(match (lhs.as_const(), rhs.as_const()) {
        (Some(1), _) => rhs,
        (_, Some(1)) => lhs,
        (Some(a), Some(b)) => {
            return BroadcastShapeMismatchSnafu { axis, lhs: Dim::Known(a as usize), rhs: Dim::Known(b as usize) }
                .fail();
        }
        (Some(_), None) => lhs,
        (None, Some(_)) => rhs,
        (None, None) => lhs.eq_(1).select(rhs, lhs.clone()),
    })
}

/// NumPy broadcasting of concrete shapes, as checked at run time.
pub fn broadcast_concrete(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let aligned = align_left(shapes, 1usize);
    let ndim = aligned.first().map_or(0, |s| s.len());

    (0..ndim)
        .map(|axis| {
            aligned.iter().map(|shape| shape[axis]).try_fold(1usize, |acc, n| match (acc, n) {
                (1, n) | (n, 1) => Ok(n),
                (a, b) if a == b => Ok(a),
                _ => RuntimeBroadcastMismatchSnafu {
                    lhs: aligned[0].to_vec(),
                    rhs: aligned.iter().find(|s| s[axis] != acc && s[axis] != 1).map(|s| s.to_vec()).unwrap_or_default(),
                }
                .fail(),
            })
        })
        .collect()
}

//! Concrete runtime values.
//!
//! A [`TensorValue`] pairs a declared [`DType`] with an `ndarray` buffer. Storage is
//! grouped by family: every integer dtype is held as `i64`, every float dtype as `f64`,
//! and values are wrapped or rounded to the declared width on [`TensorValue::cast`].
//! Complex dtypes have no runtime representation.

use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn};
use snafu::ensure;
use tessera_dtype::DType;

use crate::error::*;

/// Element of a storage family.
pub trait Element: Clone + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// `self += rhs` with the family's addition (logical or for booleans).
    fn accumulate(&mut self, rhs: &Self);
}

impl Element for bool {
    fn accumulate(&mut self, rhs: &Self) {
        *self |= *rhs;
    }
}

impl Element for i64 {
    fn accumulate(&mut self, rhs: &Self) {
        *self = self.wrapping_add(*rhs);
    }
}

impl Element for f64 {
    fn accumulate(&mut self, rhs: &Self) {
        *self += *rhs;
    }
}

/// Storage of a [`TensorValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
}

/// Apply the same generic expression to whichever array an [`ArrayData`] holds,
/// rewrapping the result in the same family.
///
/// ```rust
/// # use tessera_ir::{map_data, value::ArrayData};
/// # use ndarray::{ArrayD, IxDyn};
/// let data = ArrayData::Int(ArrayD::zeros(IxDyn(&[2, 3])));
/// let transposed = map_data!(&data, arr => arr.t().to_owned());
/// assert_eq!(transposed.shape(), &[3, 2]);
/// ```
#[macro_export]
macro_rules! map_data {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            $crate::value::ArrayData::Bool($arr) => $crate::value::ArrayData::Bool($body),
            $crate::value::ArrayData::Int($arr) => $crate::value::ArrayData::Int($body),
            $crate::value::ArrayData::Float($arr) => $crate::value::ArrayData::Float($body),
        }
    };
}

/// Like [`map_data!`] for expressions that do not produce an array.
#[macro_export]
macro_rules! with_data {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            $crate::value::ArrayData::Bool($arr) => $body,
            $crate::value::ArrayData::Int($arr) => $body,
            $crate::value::ArrayData::Float($arr) => $body,
        }
    };
}

impl ArrayData {
    pub fn shape(&self) -> &[usize] {
        with_data!(self, arr => arr.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        with_data!(self, arr => arr.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn family(&self) -> Family {
        match self {
            ArrayData::Bool(_) => Family::Bool,
            ArrayData::Int(_) => Family::Int,
            ArrayData::Float(_) => Family::Float,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Bool,
    Int,
    Float,
}

fn family(dtype: DType, operation: &'static str) -> Result<Family> {
    if dtype.is_bool() {
        Ok(Family::Bool)
    } else if dtype.is_int() {
        Ok(Family::Int)
    } else if dtype.is_float() {
        Ok(Family::Float)
    } else {
        UnsupportedDTypeSnafu { dtype, operation }.fail()
    }
}

/// Concrete array with a declared dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    dtype: DType,
    data: ArrayData,
}

impl TensorValue {
    /// Pair storage with a dtype of the same family.
    pub fn new(dtype: DType, data: ArrayData) -> Result<Self> {
        let expected = family(dtype, "runtime values")?;
        ensure!(
            expected == data.family(),
            DTypeMismatchSnafu { expected: dtype, actual: Self::family_dtype(data.family()) }
        );
        Ok(Self { dtype, data })
    }

    fn family_dtype(family: Family) -> DType {
        match family {
            Family::Bool => DType::Bool,
            Family::Int => DType::Int64,
            Family::Float => DType::Float64,
        }
    }

    /// `int64` 0-d value.
    pub fn scalar_int(value: i64) -> Self {
        Self::from(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// `float64` 0-d value.
    pub fn scalar_float(value: f64) -> Self {
        Self::from(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Result<Self> {
        let data = match family(dtype, "zeros")? {
            Family::Bool => ArrayData::Bool(ArrayD::from_elem(IxDyn(shape), false)),
            Family::Int => ArrayData::Int(ArrayD::zeros(IxDyn(shape))),
            Family::Float => ArrayData::Float(ArrayD::zeros(IxDyn(shape))),
        };
        Ok(Self { dtype, data })
    }

    pub fn ones(dtype: DType, shape: &[usize]) -> Result<Self> {
        let data = match family(dtype, "ones")? {
            Family::Bool => ArrayData::Bool(ArrayD::from_elem(IxDyn(shape), true)),
            Family::Int => ArrayData::Int(ArrayD::ones(IxDyn(shape))),
            Family::Float => ArrayData::Float(ArrayD::ones(IxDyn(shape))),
        };
        Ok(Self { dtype, data })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayData {
        &mut self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bool(&self) -> Option<&ArrayD<bool>> {
        match &self.data {
            ArrayData::Bool(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match &self.data {
            ArrayData::Int(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match &self.data {
            ArrayData::Float(arr) => Some(arr),
            _ => None,
        }
    }

    /// The single element of a size-1 integer value.
    pub fn as_scalar_int(&self) -> Option<i64> {
        let arr = self.as_int()?;
        (arr.len() == 1).then(|| arr.iter().next().copied()).flatten()
    }

    /// Same data with another dtype of the same family.
    pub fn with_dtype(self, dtype: DType) -> Result<Self> {
        Self::new(dtype, self.data)
    }

    /// Convert to `dtype`, wrapping integers and rounding floats to its width.
    pub fn cast(&self, dtype: DType) -> Result<Self> {
        let data = match (&self.data, family(dtype, "cast")?) {
            (ArrayData::Bool(arr), Family::Bool) => ArrayData::Bool(arr.clone()),
            (ArrayData::Bool(arr), Family::Int) => ArrayData::Int(arr.mapv(i64::from)),
            (ArrayData::Bool(arr), Family::Float) => ArrayData::Float(arr.mapv(|v| if v { 1.0 } else { 0.0 })),
            (ArrayData::Int(arr), Family::Bool) => ArrayData::Bool(arr.mapv(|v| v != 0)),
            (ArrayData::Int(arr), Family::Int) => ArrayData::Int(arr.mapv(|v| wrap_int(v, dtype))),
            (ArrayData::Int(arr), Family::Float) => ArrayData::Float(arr.mapv(|v| round_float(v as f64, dtype))),
            (ArrayData::Float(arr), Family::Bool) => ArrayData::Bool(arr.mapv(|v| v != 0.0)),
            (ArrayData::Float(arr), Family::Int) => ArrayData::Int(arr.mapv(|v| wrap_int(v as i64, dtype))),
            (ArrayData::Float(arr), Family::Float) => ArrayData::Float(arr.mapv(|v| round_float(v, dtype))),
        };
        Ok(Self { dtype, data })
    }

    /// Sum over `axes`, keeping them as length-1 axes when `keepdims` is set.
    pub fn sum_axes(&self, axes: &[usize], keepdims: bool) -> Result<Self> {
        for &axis in axes {
            ensure!(axis < self.ndim(), AxisOutOfRangeSnafu { axis, ndim: self.ndim() });
        }
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        fn reduce<T: Element>(arr: &ArrayD<T>, axes: &[usize], keepdims: bool) -> ArrayD<T> {
            let mut out = arr.clone();
            for &axis in axes.iter().rev() {
                out = out.fold_axis(Axis(axis), T::default(), |acc: &T, v: &T| {
                    let mut acc = acc.clone();
                    acc.accumulate(v);
                    acc
                });
                if keepdims {
                    out.insert_axis_inplace(Axis(axis));
                }
            }
            out
        }

        let data = match &self.data {
            ArrayData::Bool(_) => return UnsupportedDTypeSnafu { dtype: self.dtype, operation: "sum" }.fail(),
            ArrayData::Int(arr) => ArrayData::Int(reduce(arr, &sorted, keepdims)),
            ArrayData::Float(arr) => ArrayData::Float(reduce(arr, &sorted, keepdims)),
        };
        Ok(Self { dtype: self.dtype, data })
    }

    /// Remove length-1 axes.
    pub fn drop_axes(&self, axes: &[usize]) -> Result<Self> {
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for &axis in &sorted {
            ensure!(axis < self.ndim(), AxisOutOfRangeSnafu { axis, ndim: self.ndim() });
            ensure!(
                self.shape()[axis] == 1,
                DropNonBroadcastableSnafu { axis, shape: crate::shape::static_shape(self.shape().iter().copied()) }
            );
        }

        let data = map_data!(&self.data, arr => {
            let mut out = arr.clone();
            for &axis in sorted.iter().rev() {
                out = out.index_axis_move(Axis(axis), 0);
            }
            out
        });
        Ok(Self { dtype: self.dtype, data })
    }

    /// Row-major reshape.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        ensure!(
            shape.iter().product::<usize>() == self.len(),
            ReshapeSizeMismatchSnafu { size: self.len(), shape: shape.to_vec() }
        );
        let data = map_data!(&self.data, arr => {
            let standard = arr.as_standard_layout();
            ArrayD::from_shape_vec(IxDyn(shape), standard.iter().cloned().collect())
                .map_err(|_| Error::ReshapeSizeMismatch { size: arr.len(), shape: shape.to_vec() })?
        });
        Ok(Self { dtype: self.dtype, data })
    }

    /// Sub-value at `index` over the leading axes.
    pub fn index_leading(&self, index: &[usize]) -> Result<Self> {
        ensure!(index.len() <= self.ndim(), AxisOutOfRangeSnafu { axis: index.len(), ndim: self.ndim() });
        for (axis, (&i, &n)) in index.iter().zip(self.shape()).enumerate() {
            ensure!(i < n, AxisOutOfRangeSnafu { axis, ndim: self.ndim() });
        }

        fn leading<T: Clone>(arr: &ArrayD<T>, index: &[usize]) -> ArrayD<T> {
            let mut view: ArrayViewD<'_, T> = arr.view();
            for &i in index {
                view = view.index_axis_move(Axis(0), i);
            }
            view.to_owned()
        }

        Ok(Self { dtype: self.dtype, data: map_data!(&self.data, arr => leading(arr, index)) })
    }

    /// Stack equally shaped values into one of shape `outer ++ value.shape`.
    pub fn stack(dtype: DType, outer: &[usize], values: Vec<TensorValue>) -> Result<Self> {
        let count: usize = outer.iter().product();
        ensure!(
            values.len() == count,
            ReshapeSizeMismatchSnafu { size: values.len(), shape: outer.to_vec() }
        );
        let inner: Vec<usize> = match values.first() {
            Some(first) => first.shape().to_vec(),
            None => return Self::zeros(dtype, outer),
        };
        let full: Vec<usize> = outer.iter().chain(&inner).copied().collect();

        let mut out = Self::zeros(dtype, &full)?;
        for (flat, value) in values.into_iter().enumerate() {
            let value = value.cast(dtype)?;
            ensure!(
                value.shape() == inner.as_slice(),
                RuntimeBroadcastMismatchSnafu { lhs: inner.clone(), rhs: value.shape().to_vec() }
            );
            let position = unravel(flat, outer);
            match (&mut out.data, value.data) {
                (ArrayData::Bool(dst), ArrayData::Bool(src)) => assign_leading(dst, &position, &src),
                (ArrayData::Int(dst), ArrayData::Int(src)) => assign_leading(dst, &position, &src),
                (ArrayData::Float(dst), ArrayData::Float(src)) => assign_leading(dst, &position, &src),
                _ => return UnsupportedDTypeSnafu { dtype, operation: "stack" }.fail(),
            }
        }
        Ok(out)
    }
}

fn assign_leading<T: Clone>(dst: &mut ArrayD<T>, position: &[usize], src: &ArrayD<T>) {
    let mut view = dst.view_mut();
    for &i in position {
        view = view.index_axis_move(Axis(0), i);
    }
    view.assign(src);
}

/// Row-major multi-index of `flat` within `shape`.
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, &n) in index.iter_mut().zip(shape).rev() {
        if n > 0 {
            *slot = flat % n;
            flat /= n;
        }
    }
    index
}

fn wrap_int(v: i64, dtype: DType) -> i64 {
    match dtype {
        DType::Int8 => v as i8 as i64,
        DType::UInt8 => v as u8 as i64,
        DType::Int16 => v as i16 as i64,
        DType::UInt16 => v as u16 as i64,
        DType::Int32 => v as i32 as i64,
        DType::UInt32 => v as u32 as i64,
        _ => v,
    }
}

fn round_float(v: f64, dtype: DType) -> f64 {
    match dtype {
        DType::Float16 | DType::Float32 => v as f32 as f64,
        _ => v,
    }
}

// =========================================================================
// Conversions
// =========================================================================

impl<D: Dimension> From<ndarray::Array<bool, D>> for TensorValue {
    fn from(arr: ndarray::Array<bool, D>) -> Self {
        Self { dtype: DType::Bool, data: ArrayData::Bool(arr.into_dyn()) }
    }
}

impl<D: Dimension> From<ndarray::Array<i64, D>> for TensorValue {
    fn from(arr: ndarray::Array<i64, D>) -> Self {
        Self { dtype: DType::Int64, data: ArrayData::Int(arr.into_dyn()) }
    }
}

impl<D: Dimension> From<ndarray::Array<f64, D>> for TensorValue {
    fn from(arr: ndarray::Array<f64, D>) -> Self {
        Self { dtype: DType::Float64, data: ArrayData::Float(arr.into_dyn()) }
    }
}

impl std::fmt::Display for TensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        with_data!(&self.data, arr => write!(f, "{arr} ({})", self.dtype))
    }
}

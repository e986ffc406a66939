use ndarray::{ArrayD, IxDyn, array};

use crate::error::Error;
use crate::value::{TensorValue, unravel};
use crate::DType;

fn arange(shape: &[usize]) -> TensorValue {
    let len = shape.iter().product::<usize>() as i64;
    TensorValue::from(ArrayD::from_shape_vec(IxDyn(shape), (0..len).collect()).unwrap())
}

#[test]
fn test_dtype_family_checked() {
    let data = TensorValue::from(array![1.0, 2.0]).into_data();
    assert!(TensorValue::new(DType::Float32, data.clone()).is_ok());
    assert!(matches!(TensorValue::new(DType::Int32, data.clone()), Err(Error::DTypeMismatch { .. })));
    assert!(matches!(TensorValue::new(DType::Complex64, data), Err(Error::UnsupportedDType { .. })));
}

#[test]
fn test_cast_wraps_to_width() {
    let v = TensorValue::from(array![255i64, 256, -1]);
    let cast = v.cast(DType::UInt8).unwrap();
    assert_eq!(cast.dtype(), DType::UInt8);
    assert_eq!(cast.as_int().unwrap().iter().copied().collect::<Vec<_>>(), vec![255, 0, 255]);

    let floats = TensorValue::from(array![true, false]).cast(DType::Float32).unwrap();
    assert_eq!(floats.as_float().unwrap().iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0]);
}

#[test]
fn test_sum_axes_keepdims() {
    let v = arange(&[2, 3]);
    let rows = v.sum_axes(&[1], false).unwrap();
    assert_eq!(rows.shape(), &[2]);
    assert_eq!(rows.as_int().unwrap().iter().copied().collect::<Vec<_>>(), vec![3, 12]);

    let kept = v.sum_axes(&[0, 1], true).unwrap();
    assert_eq!(kept.shape(), &[1, 1]);
    assert_eq!(kept.as_scalar_int(), Some(15));

    assert!(matches!(v.sum_axes(&[2], false), Err(Error::AxisOutOfRange { axis: 2, ndim: 2 })));
}

#[test]
fn test_drop_axes() {
    let v = arange(&[1, 3, 1]);
    assert_eq!(v.drop_axes(&[0, 2]).unwrap().shape(), &[3]);
    assert!(matches!(v.drop_axes(&[1]), Err(Error::DropNonBroadcastable { axis: 1, .. })));
}

#[test]
fn test_reshape() {
    let v = arange(&[2, 3]);
    let flat = v.reshape(&[6]).unwrap();
    assert_eq!(flat.as_int().unwrap().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
    assert!(v.reshape(&[4]).is_err());
}

#[test]
fn test_index_leading_and_stack() {
    let v = arange(&[2, 2, 3]);
    let row = v.index_leading(&[1, 0]).unwrap();
    assert_eq!(row.as_int().unwrap().iter().copied().collect::<Vec<_>>(), vec![6, 7, 8]);
    assert!(v.index_leading(&[2]).is_err());

    let parts: Vec<TensorValue> = (0..2).map(|i| v.index_leading(&[i]).unwrap()).collect();
    let restacked = TensorValue::stack(DType::Int64, &[2], parts).unwrap();
    assert_eq!(restacked, v);
}

#[test]
fn test_unravel() {
    assert_eq!(unravel(5, &[2, 3]), vec![1, 2]);
    assert_eq!(unravel(0, &[]), Vec::<usize>::new());
}

#[test]
fn test_zeros_ones() {
    let z = TensorValue::zeros(DType::Bool, &[2]).unwrap();
    assert_eq!(z.as_bool().unwrap().iter().copied().collect::<Vec<_>>(), vec![false, false]);
    let o = TensorValue::ones(DType::Int16, &[]).unwrap();
    assert_eq!(o.as_scalar_int(), Some(1));
    assert_eq!(o.dtype(), DType::Int16);
}

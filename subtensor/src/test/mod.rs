mod unit;

use ndarray::{ArrayD, IxDyn};
use tessera_ir::{DType, TensorType, TensorValue, Variable, evaluate};

pub fn input(name: &str, dtype: DType, shape: &[usize]) -> Variable {
    Variable::input(name, TensorType::new(dtype, shape.iter().copied()))
}

/// `int64` value `0, 1, 2, ...` of the given shape.
pub fn arange(shape: &[usize]) -> TensorValue {
    let len = shape.iter().product::<usize>() as i64;
    TensorValue::from(ArrayD::from_shape_vec(IxDyn(shape), (0..len).collect()).unwrap())
}

pub fn int_vector(values: &[i64]) -> TensorValue {
    TensorValue::from(ndarray::Array1::from(values.to_vec()))
}

pub fn float_vector(values: &[f64]) -> TensorValue {
    TensorValue::from(ndarray::Array1::from(values.to_vec()))
}

pub fn eval(out: &Variable, givens: &[(Variable, TensorValue)]) -> TensorValue {
    evaluate(std::slice::from_ref(out), givens).unwrap().remove(0)
}

pub fn ints(value: &TensorValue) -> Vec<i64> {
    value.as_int().unwrap().iter().copied().collect()
}

pub fn floats(value: &TensorValue) -> Vec<f64> {
    value.as_float().unwrap().iter().copied().collect()
}

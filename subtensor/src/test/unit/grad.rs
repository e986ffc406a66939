use tessera_ir::{DType, Dim, Gradient, TensorType, TensorValue, Variable};

use crate::api::{advanced_inc_subtensor1, advanced_subtensor1, index, inc_subtensor, set_subtensor};
use crate::grad::sum_grad_over_bcasted_dims;
use crate::s;
use crate::test::{arange, eval, float_vector, floats, input, int_vector};

fn grads(out: &Variable, g: &Variable) -> Vec<Gradient> {
    let node = out.owner().unwrap();
    node.op().grad(node, g).unwrap()
}

fn float_arange(shape: &[usize]) -> TensorValue {
    arange(shape).cast(DType::Float64).unwrap()
}

fn ones(shape: &[usize]) -> TensorValue {
    TensorValue::ones(DType::Float64, shape).unwrap()
}

#[test]
fn test_slice_indicator() {
    let x = input("x", DType::Float64, &[5]);
    let g = input("g", DType::Float64, &[2]);
    let out = index(&x, &[s![1, 4, 2]]).unwrap();
    let grads = grads(&out, &g);
    assert_eq!(grads.len(), 1);
    let gx = grads[0].variable().unwrap();
    assert_eq!(gx.ty(), x.ty());
    let value = eval(gx, &[(x, ones(&[5])), (g, float_vector(&[1.0, 2.0]))]);
    assert_eq!(floats(&value), vec![0.0, 1.0, 0.0, 2.0, 0.0]);
}

#[test]
fn test_negative_scalar_indicator() {
    let x = input("x", DType::Float64, &[4]);
    let i = input("i", DType::Int64, &[]);
    let g = input("g", DType::Float64, &[]);
    let out = index(&x, &[s![&i]]).unwrap();
    let grads = grads(&out, &g);
    assert!(grads[1].is_disconnected());
    let givens = [(x, ones(&[4])), (i, TensorValue::scalar_int(-1)), (g, TensorValue::scalar_float(3.0))];
    assert_eq!(floats(&eval(grads[0].variable().unwrap(), &givens)), vec![0.0, 0.0, 0.0, 3.0]);
}

#[test]
fn test_repeated_rows_accumulate() {
    let x = input("x", DType::Float64, &[3]);
    let g = input("g", DType::Float64, &[3]);
    let out = advanced_subtensor1(&x, &Variable::constant(int_vector(&[0, 0, 2]))).unwrap();
    let gx = grads(&out, &g)[0].variable().unwrap().clone();
    assert_eq!(floats(&eval(&gx, &[(x, ones(&[3])), (g, ones(&[3]))])), vec![2.0, 0.0, 1.0]);
}

#[test]
fn test_repeated_coordinates_accumulate() {
    let x = input("x", DType::Float64, &[2, 3]);
    let rows = input("rows", DType::Int64, &[2]);
    let cols = input("cols", DType::Int64, &[2]);
    let g = input("g", DType::Float64, &[2]);
    let out = index(&x, &[s![&rows], s![&cols]]).unwrap();
    let grads = grads(&out, &g);
    assert!(grads[1].is_disconnected() && grads[2].is_disconnected());

    let givens = [
        (x, ones(&[2, 3])),
        (rows, int_vector(&[0, 0])),
        (cols, int_vector(&[1, 1])),
        (g, float_vector(&[1.5, 2.5])),
    ];
    assert_eq!(floats(&eval(grads[0].variable().unwrap(), &givens)), vec![0.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
}

/// `<g, x[idx]>` is linear in `x`, so its finite differences are exact up to rounding.
#[test]
fn test_matches_finite_differences() {
    let shape = [3, 4];
    let x = input("x", DType::Float64, &shape);
    let rows = Variable::constant(int_vector(&[2, 0, 2]));
    let out = index(&x, &[s![&rows], s![_, _, (-2)]]).unwrap();
    let g = input("g", DType::Float64, &[3, 2]);
    let g_value = TensorValue::from(ndarray::Array::linspace(0.5, 3.0, 6).into_shape_with_order(vec![3, 2]).unwrap());

    let gx = grads(&out, &g)[0].variable().unwrap().clone();
    let analytic = floats(&eval(&gx, &[(x.clone(), float_arange(&shape)), (g, g_value.clone())]));

    let objective = |value: TensorValue| -> f64 {
        let selected = floats(&eval(&out, &[(x.clone(), value)]));
        selected.iter().zip(floats(&g_value)).map(|(a, b)| a * b).sum()
    };
    let base = objective(float_arange(&shape));
    let eps = 1e-3;
    for (k, expected) in analytic.iter().enumerate() {
        let mut bumped = float_arange(&shape).as_float().unwrap().clone();
        bumped.as_slice_mut().unwrap()[k] += eps;
        let numeric = (objective(TensorValue::from(bumped)) - base) / eps;
        assert!((numeric - expected).abs() < 1e-6, "element {k}: {numeric} vs {expected}");
    }
}

#[test]
fn test_discrete_input_gets_float_zeros() {
    let x = input("x", DType::Int32, &[3]);
    let g = input("g", DType::Float64, &[2]);
    let out = index(&x, &[s![1, _]]).unwrap();
    let gx = grads(&out, &g)[0].variable().unwrap().clone();
    assert_eq!(gx.dtype(), DType::Float64);
    let value = eval(&gx, &[(x, arange(&[3]).cast(DType::Int32).unwrap())]);
    assert_eq!(floats(&value), vec![0.0; 3]);
}

#[test]
fn test_complex_input_is_rejected() {
    let x = input("x", DType::Complex64, &[3]);
    let g = input("g", DType::Complex64, &[2]);
    let out = index(&x, &[s![1, _]]).unwrap();
    let node = out.owner().unwrap();
    let err = node.op().grad(node, &g).unwrap_err();
    assert!(matches!(err, tessera_ir::Error::UnsupportedDType { dtype: DType::Complex64, .. }));
}

#[test]
fn test_inc_subtensor_gradients() {
    let x = input("x", DType::Float64, &[3, 4]);
    let y = Variable::input("y", TensorType::new(DType::Float64, [Dim::Known(1), Dim::Known(4)]));
    let g = input("g", DType::Float64, &[3, 4]);
    let region = index(&x, &[s![1, _]]).unwrap();
    let givens = |x: &Variable, y: &Variable, g: &Variable| {
        vec![(x.clone(), ones(&[3, 4])), (y.clone(), ones(&[1, 4])), (g.clone(), float_arange(&[3, 4]))]
    };

    let inc = inc_subtensor(&region, &y).call().unwrap();
    let grads_inc = grads(&inc, &g);
    assert_eq!(grads_inc[0].variable().unwrap(), &g);
    let gy = grads_inc[1].variable().unwrap();
    assert_eq!(gy.ty(), y.ty());
    assert_eq!(floats(&eval(gy, &givens(&x, &y, &g))), vec![12.0, 14.0, 16.0, 18.0]);

    let set = set_subtensor(&region, &y).call().unwrap();
    let gx = grads(&set, &g)[0].variable().unwrap().clone();
    let expected: Vec<f64> = (0..12).map(|v| if v < 4 { v as f64 } else { 0.0 }).collect();
    assert_eq!(floats(&eval(&gx, &givens(&x, &y, &g))), expected);
}

#[test]
fn test_scalar_value_gradient_sums_region() {
    let x = input("x", DType::Float64, &[3, 4]);
    let y = input("y", DType::Float64, &[]);
    let g = input("g", DType::Float64, &[3, 4]);
    let region = index(&x, &[s![1, _]]).unwrap();
    let inc = inc_subtensor(&region, &y).call().unwrap();
    let gy = grads(&inc, &g)[1].variable().unwrap().clone();
    assert_eq!(gy.ndim(), 0);
    let value = eval(&gy, &[(x, ones(&[3, 4])), (y, TensorValue::scalar_float(0.0)), (g, float_arange(&[3, 4]))]);
    assert_eq!(floats(&value), vec![60.0]);
}

#[test]
fn test_advanced_inc_subtensor1_gradients() {
    let x = input("x", DType::Float64, &[3]);
    let y = input("y", DType::Float64, &[2]);
    let g = input("g", DType::Float64, &[3]);
    let rows = Variable::constant(int_vector(&[2, 2]));
    let inc = advanced_inc_subtensor1(&x, &y, &rows).unwrap();
    let grads = grads(&inc, &g);
    assert!(grads[2].is_disconnected());
    let givens = [(x, ones(&[3])), (y, ones(&[2])), (g, float_vector(&[1.0, 2.0, 3.0]))];
    assert_eq!(floats(&eval(grads[1].variable().unwrap(), &givens)), vec![3.0, 3.0]);
}

#[test]
fn test_sum_grad_keeps_matching_types() {
    let y = input("y", DType::Float64, &[2, 3]);
    let gy = input("gy", DType::Float64, &[2, 3]);
    assert_eq!(sum_grad_over_bcasted_dims(&y, &gy).unwrap(), gy);

    let flat = input("flat", DType::Float64, &[3]);
    let summed = sum_grad_over_bcasted_dims(&flat, &gy).unwrap();
    assert_eq!(summed.ty(), flat.ty());
    let value = eval(&summed, &[(gy, float_arange(&[2, 3]))]);
    assert_eq!(floats(&value), vec![3.0, 5.0, 7.0]);
}

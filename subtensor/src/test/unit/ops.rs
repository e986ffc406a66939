use ndarray::array;
use test_case::test_case;
use tessera_ir::{DType, Dim, Op, Ownership, TensorType, TensorValue, Variable, evaluate};

use crate::api::{inc_subtensor, index, set_subtensor};
use crate::descriptor::{IndexDescriptor, ScalarIndex};
use crate::error::{Error, Result};
use crate::ops::*;
use crate::s;
use crate::test::{arange, eval, input, int_vector, ints};

const ROWS: IndexDescriptor = IndexDescriptor::Array { dtype: DType::Int64, rank: 1 };

fn run(out: &Variable, givens: &[(Variable, TensorValue)]) -> Result<TensorValue> {
    Ok(evaluate(std::slice::from_ref(out), givens)?.remove(0))
}

fn op_name(out: &Variable) -> String {
    out.owner().unwrap().op().to_string()
}

#[test]
fn test_display() {
    let x = input("x", DType::Float64, &[4, 4]);
    let i = input("i", DType::Int64, &[]);
    assert_eq!(op_name(&index(&x, &[s![1, _], s![&i]]).unwrap()), "Subtensor{start:, i}");

    let set = IncSubtensor::builder(vec![IndexDescriptor::FULL_SLICE]).inplace(true).set_instead_of_increment(true);
    assert_eq!(set.build().unwrap().to_string(), "SetSubtensorInplace{:}");
    let inc = IncSubtensor::builder(vec![IndexDescriptor::Scalar(ScalarIndex::int(0))]).build().unwrap();
    assert_eq!(inc.to_string(), "IncSubtensor{i}");

    assert_eq!(AdvancedSubtensor1::new().to_string(), "AdvancedSubtensor1");
    assert_eq!(AdvancedIncSubtensor1::new(true, false).to_string(), "AdvancedIncSubtensor1{inplace,inc}");
    assert_eq!(AdvancedIncSubtensor1::new(false, true).to_string(), "AdvancedIncSubtensor1{no_inplace,set}");

    let advanced = AdvancedSubtensor::new(vec![ROWS, IndexDescriptor::FULL_SLICE]).unwrap();
    assert_eq!(advanced.to_string(), "AdvancedSubtensor{i, :}");
    let flagged = AdvancedIncSubtensor::builder(vec![ROWS]).inplace(true).ignore_duplicate_indices(true).build();
    assert_eq!(flagged.unwrap().to_string(), "AdvancedIncSubtensor{inplace,ignore_duplicates}");
    let set = AdvancedIncSubtensor::builder(vec![ROWS]).set_instead_of_increment(true).build().unwrap();
    assert_eq!(set.to_string(), "AdvancedSetSubtensor");

    assert_eq!(ClipIndices::new(TakeMode::Clip, 1).to_string(), "ClipIndices{clip, axis=1}");
}

#[test]
fn test_construction_errors() {
    assert!(matches!(Subtensor::new(vec![ROWS]), Err(Error::AdvancedIndexing { .. })));
    assert!(matches!(IncSubtensor::builder(vec![ROWS]).build(), Err(Error::AdvancedIndexing { .. })));
    assert!(matches!(AdvancedSubtensor::new(vec![IndexDescriptor::FULL_SLICE]), Err(Error::UnsupportedIndex { .. })));
    assert!(matches!(AdvancedIncSubtensor::builder(vec![]).build(), Err(Error::UnsupportedIndex { .. })));
}

#[test]
fn test_make_node_errors() {
    let x = input("x", DType::Float64, &[3]);
    let symbolic = Subtensor::new(vec![IndexDescriptor::Scalar(ScalarIndex::Symbolic { dtype: DType::Int64 })]).unwrap();
    let err = Error::from(symbolic.clone().make_node(vec![x.clone()]).unwrap_err());
    assert!(matches!(err, Error::IndexTemplateMismatch { expected: 1, actual: 0, .. }));
    let err = Error::from(symbolic.make_node(vec![]).unwrap_err());
    assert!(matches!(err, Error::Ir { source: tessera_ir::Error::InputCountMismatch { .. } }));

    let deep = Subtensor::new(vec![IndexDescriptor::Scalar(ScalarIndex::int(0)); 2]).unwrap();
    let err = Error::from(deep.make_node(vec![x.clone()]).unwrap_err());
    assert!(matches!(err, Error::TooManyIndices { ndim: 1, count: 2 }));

    let floats = input("f", DType::Float64, &[2]);
    let err = Error::from(AdvancedSubtensor1::new().make_node(vec![x.clone(), floats]).unwrap_err());
    assert!(matches!(err, Error::IndexType { dtype: DType::Float64 }));
    let matrix = input("m", DType::Int64, &[2, 2]);
    let err = Error::from(AdvancedSubtensor1::new().make_node(vec![x, matrix]).unwrap_err());
    assert!(matches!(err, Error::UnsupportedIndex { .. }));
    let scalar = input("s", DType::Float64, &[]);
    let rows = input("rows", DType::Int64, &[2]);
    let err = Error::from(AdvancedSubtensor1::new().make_node(vec![scalar, rows]).unwrap_err());
    assert!(matches!(err, Error::TooManyIndices { .. }));
}

#[test_case(DType::Float64, DType::Float32 => true; "wider float")]
#[test_case(DType::Int64, DType::Bool => true; "bool into int")]
#[test_case(DType::Float64, DType::Int32 => true; "narrow int into float")]
#[test_case(DType::Int64, DType::Float64 => false; "float into int")]
#[test_case(DType::Int32, DType::Int64 => false; "narrowing int")]
#[test_case(DType::Float64, DType::Complex128 => false; "complex into float")]
fn test_value_dtype_must_cast_safely(target: DType, value: DType) -> bool {
    let x = input("x", target, &[4]);
    let y = input("y", value, &[2]);
    let rows = input("rows", DType::Int64, &[2]);

    let results = [
        IncSubtensor::builder(vec![IndexDescriptor::FULL_SLICE]).build().unwrap().make_node(vec![x.clone(), y.clone()]),
        AdvancedIncSubtensor1::new(false, true).make_node(vec![x.clone(), y.clone(), rows.clone()]),
        AdvancedIncSubtensor::builder(vec![ROWS]).build().unwrap().make_node(vec![x.clone(), y.clone(), rows.clone()]),
    ];
    let accepted = results.iter().all(|result| result.is_ok());
    for result in results.into_iter().filter(|result| result.is_err()) {
        let err = Error::from(result.unwrap_err());
        assert!(matches!(err, Error::ValueDType { target: t, value: v, .. } if t == target && v == value));
    }
    accepted
}

#[test]
fn test_write_helpers_reject_lossy_values() {
    let x = input("x", DType::Int64, &[4]);
    let region = index(&x, &[s![1, _]]).unwrap();
    let y = input("y", DType::Float64, &[3]);
    let err = inc_subtensor(&region, &y).call().unwrap_err();
    assert!(matches!(err, Error::ValueDType { action: "increment", target: DType::Int64, value: DType::Float64 }));
    assert!(matches!(set_subtensor(&region, &y).call(), Err(Error::ValueDType { action: "set", .. })));
}

#[test]
fn test_value_rank_checked_against_region() {
    let x = input("x", DType::Float64, &[3, 4]);
    let y = input("y", DType::Float64, &[2, 4]);
    let op = IncSubtensor::builder(vec![IndexDescriptor::Scalar(ScalarIndex::int(0))]).build().unwrap();
    let err = Error::from(op.make_node(vec![x.clone(), y.clone()]).unwrap_err());
    assert!(matches!(err, Error::ValueRankTooHigh { action: "increment", target: 1, value: 2 }));

    let cube = input("cube", DType::Float64, &[2, 3, 4]);
    let rows = input("rows", DType::Int64, &[2]);
    let err = Error::from(AdvancedIncSubtensor1::new(false, true).make_node(vec![x, cube, rows]).unwrap_err());
    assert!(matches!(err, Error::ValueRankTooHigh { action: "set", target: 2, value: 3 }));
}

#[test]
fn test_output_types() {
    let x = Variable::input("x", TensorType::new(DType::Float32, [Dim::Known(5), Dim::Unknown, Dim::Known(1)]));
    let sub = index(&x, &[s![1, (-1)], s![0]]).unwrap();
    assert_eq!(sub.ty(), &TensorType::new(DType::Float32, [Dim::Known(3), Dim::Known(1)]));

    let rows = input("rows", DType::Int64, &[7]);
    let gathered = AdvancedSubtensor1::new().make_node(vec![x.clone(), rows]).unwrap();
    assert_eq!(gathered.ty(), &TensorType::new(DType::Float32, [Dim::Known(7), Dim::Unknown, Dim::Known(1)]));

    let y = input("y", DType::Float32, &[3, 1]);
    assert_eq!(inc_subtensor(&sub, &y).call().unwrap().ty(), x.ty());
}

#[test]
fn test_known_safe() {
    let x = input("x", DType::Int64, &[4, 2]);
    let safe = AdvancedSubtensor1::new().make_node(vec![x.clone(), Variable::constant(int_vector(&[0, -4, 3]))]).unwrap();
    let node = safe.owner().unwrap();
    assert!(node.op().downcast_ref::<AdvancedSubtensor1>().unwrap().known_safe());
    assert_eq!(ints(&eval(&safe, &[(x.clone(), arange(&[4, 2]))])), vec![0, 1, 0, 1, 6, 7]);

    let unsafe_rows = Variable::constant(int_vector(&[4]));
    let out = AdvancedSubtensor1::new().make_node(vec![x.clone(), unsafe_rows]).unwrap();
    assert!(!out.owner().unwrap().op().downcast_ref::<AdvancedSubtensor1>().unwrap().known_safe());
    assert!(matches!(
        run(&out, &[(x.clone(), arange(&[4, 2]))]),
        Err(Error::IndexOutOfBounds { index: 4, axis: 0, size: 4 })
    ));

    let rows = input("rows", DType::Int64, &[1]);
    let out = AdvancedSubtensor1::new().make_node(vec![x, rows]).unwrap();
    assert!(!out.owner().unwrap().op().downcast_ref::<AdvancedSubtensor1>().unwrap().known_safe());
}

#[test]
fn test_advanced_gather_with_mask() {
    let x = input("x", DType::Int64, &[2, 3]);
    let mask = Variable::constant(TensorValue::from(array![[true, false, true], [false, true, false]].into_dyn()));
    let out = index(&x, &[s![&mask]]).unwrap();
    assert!(out.owner().unwrap().op().is::<AdvancedSubtensor>());
    assert_eq!(out.ty().shape.as_slice(), &[Dim::Known(3)]);
    assert_eq!(ints(&eval(&out, &[(x.clone(), arange(&[2, 3]))])), vec![0, 2, 4]);

    let updated = set_subtensor(&out, &Variable::constant(TensorValue::scalar_int(-1))).call().unwrap();
    assert_eq!(ints(&eval(&updated, &[(x, arange(&[2, 3]))])), vec![-1, 1, -1, 3, -1, 5]);
}

#[test]
fn test_advanced_infer_shape_matches_execution() {
    let x = input("x", DType::Int64, &[3, 4, 5]);
    let rows = input("rows", DType::Int64, &[2]);
    let out = index(&x, &[s![&rows], s![1, 3], s![&rows]]).unwrap();
    let node = out.owner().unwrap();
    let inferred: Vec<i64> =
        node.op().infer_shape(node, &node.input_shapes()).unwrap().iter().map(|d| d.to_const().unwrap()).collect();
    assert_eq!(inferred, vec![2, 2]);

    let value = eval(&out, &[(x, arange(&[3, 4, 5])), (rows, int_vector(&[2, 0]))]);
    assert_eq!(value.shape(), &[2, 2]);
    assert_eq!(ints(&value), vec![47, 52, 5, 10]);
}

#[test]
fn test_runtime_broadcast_rejected() {
    let x = input("x", DType::Int64, &[3, 2]);
    let rows = Variable::constant(int_vector(&[0, 2]));
    let loose = Variable::input("y", TensorType::new(DType::Int64, [Dim::Unknown, Dim::Known(2)]));
    let out = AdvancedIncSubtensor1::new(false, false).make_node(vec![x.clone(), loose.clone(), rows.clone()]).unwrap();
    let value = TensorValue::from(array![[1i64, 2]].into_dyn());
    assert!(matches!(
        run(&out, &[(x.clone(), arange(&[3, 2])), (loose, value.clone())]),
        Err(Error::RuntimeBroadcast { axis: 0, region: 2, .. })
    ));

    let declared = input("y", DType::Int64, &[1, 2]);
    let out = AdvancedIncSubtensor1::new(false, false).make_node(vec![x.clone(), declared.clone(), rows]).unwrap();
    assert_eq!(ints(&eval(&out, &[(x, arange(&[3, 2])), (declared, value)])), vec![1, 3, 2, 3, 5, 7]);
}

#[test]
fn test_inplace_write() {
    let x = input("x", DType::Int64, &[4]);
    let y = input("y", DType::Int64, &[2]);
    let region = index(&x, &[s![_, _, 2]]).unwrap();
    let out = inc_subtensor(&region, &y).inplace(true).call().unwrap();
    assert_eq!(op_name(&out), "IncSubtensorInplace{::step}");
    assert_eq!(ints(&eval(&out, &[(x, arange(&[4])), (y, int_vector(&[10, 20]))])), vec![10, 1, 22, 3]);
}

#[test]
fn test_ownership() {
    let subtensor = Subtensor::new(vec![IndexDescriptor::FULL_SLICE]).unwrap();
    assert_eq!(subtensor.ownership(), Ownership::view_of(0));

    let inc = IncSubtensor::builder(vec![IndexDescriptor::FULL_SLICE]).inplace(true).tolerate_aliasing(true).build();
    let ownership = inc.unwrap().ownership();
    assert_eq!(ownership.mutates_argument, Some(0));
    assert_eq!(ownership.tolerate_aliased.as_slice(), &[(0, 1)]);

    assert_eq!(AdvancedSubtensor::new(vec![ROWS]).unwrap().ownership(), Ownership::default());
    assert_eq!(AdvancedIncSubtensor1::new(true, false).ownership(), Ownership::destroys(0));
    assert_eq!(AdvancedIncSubtensor1::new(false, false).ownership(), Ownership::default());
    let advanced = AdvancedIncSubtensor::builder(vec![ROWS]).inplace(true).build().unwrap();
    assert_eq!(advanced.ownership(), Ownership::destroys(0));
}

#[test]
fn test_connection_pattern() {
    let x = input("x", DType::Float64, &[4]);
    let i = input("i", DType::Int64, &[]);
    let y = input("y", DType::Float64, &[]);

    let region = index(&x, &[s![&i]]).unwrap();
    let node = region.owner().unwrap();
    assert_eq!(node.op().connection_pattern(node), vec![true, false]);

    let updated = set_subtensor(&region, &y).call().unwrap();
    let node = updated.owner().unwrap();
    assert_eq!(node.op().connection_pattern(node), vec![true, true, false]);

    let rows = input("rows", DType::Int64, &[2]);
    let clipped = ClipIndices::new(TakeMode::Wrap, 0).make_node(vec![rows, x]).unwrap();
    let node = clipped.owner().unwrap();
    assert_eq!(node.op().connection_pattern(node), vec![false, false]);
}

#[test]
fn test_clip_indices() {
    let a = input("a", DType::Float64, &[4]);
    let indices = input("indices", DType::Int64, &[3]);
    let givens = |a: &Variable, indices: &Variable| {
        vec![
            (a.clone(), TensorValue::zeros(DType::Float64, &[4]).unwrap()),
            (indices.clone(), int_vector(&[-5, 1, 7])),
        ]
    };

    let clip = ClipIndices::new(TakeMode::Clip, 0).make_node(vec![indices.clone(), a.clone()]).unwrap();
    assert_eq!(clip.ty(), indices.ty());
    assert_eq!(ints(&eval(&clip, &givens(&a, &indices))), vec![0, 1, 3]);

    let wrap = ClipIndices::new(TakeMode::Wrap, 0).make_node(vec![indices.clone(), a.clone()]).unwrap();
    assert_eq!(ints(&eval(&wrap, &givens(&a, &indices))), vec![3, 1, 3]);

    let raise = ClipIndices::new(TakeMode::Raise, 0).make_node(vec![indices.clone(), a.clone()]).unwrap();
    assert!(matches!(run(&raise, &givens(&a, &indices)), Err(Error::IndexOutOfBounds { index: -5, .. })));

    let err = Error::from(ClipIndices::new(TakeMode::Clip, 1).make_node(vec![indices, a.clone()]).unwrap_err());
    assert!(matches!(err, Error::Ir { source: tessera_ir::Error::AxisOutOfRange { axis: 1, ndim: 1 } }));
    let floats = input("f", DType::Float64, &[3]);
    let err = Error::from(ClipIndices::new(TakeMode::Clip, 0).make_node(vec![floats, a]).unwrap_err());
    assert!(matches!(err, Error::IndexType { .. }));
}

#[test]
fn test_clip_indices_empty_axis() {
    let a = input("a", DType::Float64, &[0]);
    let indices = input("indices", DType::Int64, &[1]);
    let clip = ClipIndices::new(TakeMode::Clip, 0).make_node(vec![indices.clone(), a.clone()]).unwrap();
    let givens = [(a, TensorValue::zeros(DType::Float64, &[0]).unwrap()), (indices, int_vector(&[0]))];
    assert!(matches!(run(&clip, &givens), Err(Error::IndexOutOfBounds { size: 0, .. })));
}

#[test]
fn test_take_mode_strings() {
    assert_eq!("clip".parse::<TakeMode>().unwrap(), TakeMode::Clip);
    assert_eq!(TakeMode::Wrap.to_string(), "wrap");
    assert_eq!(TakeMode::default(), TakeMode::Raise);
    assert!("nearest".parse::<TakeMode>().is_err());
}

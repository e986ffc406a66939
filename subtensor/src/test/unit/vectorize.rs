use std::sync::Arc;

use tessera_ir::graph::Blockwise;
use tessera_ir::{DType, Op, Variable};

use crate::api::index;
use crate::descriptor::IndexDescriptor;
use crate::ops::{AdvancedSubtensor, Subtensor};
use crate::s;
use crate::test::{arange, eval, input, int_vector, ints};

fn vectorize(out: &Variable, batched_inputs: Vec<Variable>) -> Variable {
    let node = out.owner().unwrap();
    node.op().vectorize(node, batched_inputs).unwrap()
}

fn op_of(out: &Variable) -> &Arc<dyn Op> {
    out.owner().unwrap().op()
}

#[test]
fn test_subtensor_prepends_full_slices() {
    let x = input("x", DType::Int64, &[4, 5]);
    let out = index(&x, &[s![1, _], s![2]]).unwrap();

    let batched = input("xb", DType::Int64, &[3, 4, 5]);
    let vectorized = vectorize(&out, vec![batched.clone()]);
    let op = op_of(&vectorized).downcast_ref::<Subtensor>().unwrap();
    assert_eq!(op.idx_list()[0], IndexDescriptor::FULL_SLICE);
    assert_eq!(op.idx_list().len(), 3);

    let value = eval(&vectorized, &[(batched, arange(&[3, 4, 5]))]);
    assert_eq!(value.shape(), &[3, 3]);
    assert_eq!(ints(&value), vec![7, 12, 17, 27, 32, 37, 47, 52, 57]);
}

#[test]
fn test_batched_index_falls_back_to_blockwise() {
    let x = input("x", DType::Int64, &[4]);
    let i = input("i", DType::Int64, &[]);
    let out = index(&x, &[s![&i]]).unwrap();

    let batched_i = input("ib", DType::Int64, &[3]);
    let vectorized = vectorize(&out, vec![x.clone(), batched_i.clone()]);
    assert!(op_of(&vectorized).is::<Blockwise>());
    let value = eval(&vectorized, &[(x, arange(&[4])), (batched_i, int_vector(&[3, 0, -3]))]);
    assert_eq!(ints(&value), vec![3, 0, 1]);
}

#[test]
fn test_scalar_like_index_falls_back_to_blockwise() {
    let x = input("x", DType::Int64, &[4]);
    let i = input("i", DType::Int64, &[1]);
    let out = index(&x, &[s![&i]]).unwrap();
    assert!(op_of(&out).is::<Subtensor>());

    let batched = input("xb", DType::Int64, &[2, 4]);
    let vectorized = vectorize(&out, vec![batched.clone(), i.clone()]);
    assert!(op_of(&vectorized).is::<Blockwise>());
    let value = eval(&vectorized, &[(batched, arange(&[2, 4])), (i, int_vector(&[-1]))]);
    assert_eq!(ints(&value), vec![3, 7]);
}

#[test]
fn test_advanced_consecutive_prepends_full_slices() {
    let x = input("x", DType::Int64, &[3, 4]);
    let rows = input("rows", DType::Int64, &[2]);
    let out = index(&x, &[s![..], s![&rows]]).unwrap();
    assert!(op_of(&out).is::<AdvancedSubtensor>());

    let batched = input("xb", DType::Int64, &[2, 3, 4]);
    let vectorized = vectorize(&out, vec![batched.clone(), rows.clone()]);
    let op = op_of(&vectorized).downcast_ref::<AdvancedSubtensor>().unwrap();
    assert_eq!(op.idx_list().len(), 3);

    let value = eval(&vectorized, &[(batched, arange(&[2, 3, 4])), (rows, int_vector(&[3, 0]))]);
    assert_eq!(value.shape(), &[2, 3, 2]);
    assert_eq!(ints(&value)[..4], [3, 0, 7, 4]);
}

#[test]
fn test_advanced_non_consecutive_falls_back_to_blockwise() {
    let x = input("x", DType::Int64, &[3, 4, 5]);
    let rows = input("rows", DType::Int64, &[2]);
    let out = index(&x, &[s![&rows], s![..], s![&rows]]).unwrap();

    let batched = input("xb", DType::Int64, &[2, 3, 4, 5]);
    let vectorized = vectorize(&out, vec![batched.clone(), rows.clone(), rows.clone()]);
    assert!(op_of(&vectorized).is::<Blockwise>());

    let value = eval(&vectorized, &[(batched, arange(&[2, 3, 4, 5])), (rows, int_vector(&[0, 1]))]);
    // Each batch element keeps the advanced block in front: shape (2, 4) per element.
    assert_eq!(value.shape(), &[2, 2, 4]);
    assert_eq!(ints(&value)[..4], [0, 5, 10, 15]);
}

#[test]
fn test_unbatched_advanced_keeps_operator() {
    let x = input("x", DType::Int64, &[3, 4, 5]);
    let rows = input("rows", DType::Int64, &[2]);
    let out = index(&x, &[s![&rows], s![..], s![&rows]]).unwrap();
    let same = vectorize(&out, vec![x, rows.clone(), rows]);
    assert!(Arc::ptr_eq(op_of(&same), op_of(&out)));
}

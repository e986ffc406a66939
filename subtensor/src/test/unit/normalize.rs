use tessera_ir::{DType, TensorValue, Variable};

use crate::descriptor::{Bound, IndexDescriptor, ScalarIndex};
use crate::error::Error;
use crate::normalize::*;
use crate::s;
use crate::test::{input, int_vector};

fn konst(value: i64) -> Variable {
    Variable::constant(TensorValue::scalar_int(value))
}

#[test]
fn test_basic_entries() {
    let i = input("i", DType::Int64, &[]);
    let (idx_list, slots) = normalize_indices(&[s![1, _], s![3], s![NewAxis], s![&i], s![..]]).unwrap();
    assert_eq!(
        idx_list,
        vec![
            IndexDescriptor::Slice {
                start: Bound::Scalar(ScalarIndex::int(1)),
                stop: Bound::Absent,
                step: Bound::Absent,
            },
            IndexDescriptor::Scalar(ScalarIndex::int(3)),
            IndexDescriptor::NewAxis,
            IndexDescriptor::Scalar(ScalarIndex::Symbolic { dtype: DType::Int64 }),
            IndexDescriptor::FULL_SLICE,
        ]
    );
    assert_eq!(slots, vec![i]);
}

#[test]
fn test_constant_variable_is_baked_in() {
    let (descriptor, slots) = normalize(&s![konst(4)]).unwrap();
    assert_eq!(descriptor, IndexDescriptor::Scalar(ScalarIndex::int(4)));
    assert!(slots.is_empty());
}

#[test]
fn test_symbolic_slice_bounds_become_slots() {
    let start = input("start", DType::Int32, &[]);
    let step = input("step", DType::Int64, &[]);
    let (descriptor, slots) = normalize(&s![(&start), 10, (&step)]).unwrap();
    assert_eq!(
        descriptor,
        IndexDescriptor::Slice {
            start: Bound::Scalar(ScalarIndex::Symbolic { dtype: DType::Int32 }),
            stop: Bound::Scalar(ScalarIndex::int(10)),
            step: Bound::Scalar(ScalarIndex::Symbolic { dtype: DType::Int64 }),
        }
    );
    assert_eq!(slots, vec![start, step]);
}

#[test]
fn test_max_stop_means_to_the_end() {
    let (descriptor, _) = normalize(&s![2, (i64::MAX)]).unwrap();
    assert_eq!(
        descriptor,
        IndexDescriptor::Slice { start: Bound::Scalar(ScalarIndex::int(2)), stop: Bound::Absent, step: Bound::Absent }
    );
}

#[test]
fn test_basic_rejects_arrays_and_booleans() {
    let vector = input("v", DType::Int64, &[3]);
    assert!(matches!(normalize(&s![&vector]), Err(Error::AdvancedIndexing { .. })));
    assert!(matches!(normalize(&s![true]), Err(Error::AdvancedIndexing { .. })));

    let mask = input("m", DType::Bool, &[]);
    assert!(matches!(normalize(&s![&mask]), Err(Error::AdvancedIndexing { .. })));

    let float = input("f", DType::Float64, &[]);
    assert!(matches!(normalize(&s![&float]), Err(Error::IndexType { dtype: DType::Float64 })));
    assert!(matches!(normalize(&s![1, (&float)]), Err(Error::IndexType { .. })));

    assert!(matches!(normalize(&RawIndex::Ellipsis), Err(Error::UnsupportedIndex { .. })));
}

#[test]
fn test_advanced_entries() {
    let vector = input("v", DType::Int32, &[3]);
    let mask = input("m", DType::Bool, &[2, 2]);
    let scalar = input("i", DType::Int64, &[]);
    let (idx_list, slots) = normalize_advanced_indices(&[s![&vector], s![&mask], s![&scalar], s![1, _]]).unwrap();
    assert_eq!(
        idx_list[..3],
        [
            IndexDescriptor::Array { dtype: DType::Int32, rank: 1 },
            IndexDescriptor::Array { dtype: DType::Bool, rank: 2 },
            IndexDescriptor::Scalar(ScalarIndex::Symbolic { dtype: DType::Int64 }),
        ]
    );
    assert_eq!(slots, vec![vector, mask, scalar]);

    let float = input("f", DType::Float32, &[3]);
    assert!(matches!(normalize_advanced(&s![&float]), Err(Error::IndexType { dtype: DType::Float32 })));
    assert!(matches!(normalize_advanced(&s![false]), Err(Error::UnsupportedIndex { .. })));
    let bool_scalar = input("b", DType::Bool, &[]);
    assert!(matches!(normalize_advanced(&s![&bool_scalar]), Err(Error::UnsupportedIndex { .. })));
}

#[test]
fn test_expand_ellipsis() {
    let expanded = expand_ellipsis(&[s![0], RawIndex::Ellipsis, s![NewAxis], s![1]], 4).unwrap();
    assert_eq!(expanded.len(), 5);
    assert!(expanded[1].is_full_slice() && expanded[2].is_full_slice());
    assert!(matches!(expanded[3], RawIndex::NewAxis));

    let mask = input("m", DType::Bool, &[2, 3]);
    let expanded = expand_ellipsis(&[RawIndex::Ellipsis, s![&mask]], 3).unwrap();
    assert_eq!(expanded.len(), 2);

    assert_eq!(expand_ellipsis(&[s![0], s![1]], 2).unwrap().len(), 2);
    assert!(matches!(
        expand_ellipsis(&[RawIndex::Ellipsis, RawIndex::Ellipsis], 2),
        Err(Error::UnsupportedIndex { .. })
    ));
}

#[test]
fn test_as_index_literal() {
    assert_eq!(as_index_literal(&RawScalar::Int(-2)).unwrap(), -2);
    assert_eq!(as_index_literal(&RawScalar::from(konst(7))).unwrap(), 7);
    let err = as_index_literal(&RawScalar::from(input("i", DType::Int64, &[]))).unwrap_err();
    assert!(err.is_not_constant());
}

fn ints_of(indices: &[RawIndex]) -> Vec<Option<i64>> {
    indices.iter().map(|raw| if let RawIndex::Int(v) = raw { Some(*v) } else { None }).collect()
}

#[test]
fn test_indices_from_subtensor_round_trip() {
    let i = input("i", DType::Int64, &[]);
    let stop = input("stop", DType::Int64, &[]);
    let (idx_list, slots) = normalize_indices(&[s![&i], s![1, (&stop)], s![NewAxis]]).unwrap();
    let rebuilt = indices_from_subtensor(&idx_list, &slots).unwrap();
    assert!(matches!(&rebuilt[0], RawIndex::Var(var) if *var == i));
    assert!(matches!(
        &rebuilt[1],
        RawIndex::Slice(RawSlice { start: Some(RawScalar::Int(1)), stop: Some(RawScalar::Var(var)), step: None }) if *var == stop
    ));
    assert!(matches!(rebuilt[2], RawIndex::NewAxis));

    assert!(matches!(
        indices_from_subtensor(&idx_list, &slots[..1]),
        Err(Error::IndexTemplateMismatch { expected: 2, actual: 1, .. })
    ));
}

#[test]
fn test_get_constant_idx() {
    let idx_list = [IndexDescriptor::Scalar(ScalarIndex::Symbolic { dtype: DType::Int64 }), IndexDescriptor::NewAxis];
    let folded = get_constant_idx(&idx_list, &[konst(3)], false).unwrap();
    assert_eq!(ints_of(&folded), vec![Some(3), None]);

    let i = input("i", DType::Int64, &[]);
    let err = get_constant_idx(&idx_list, std::slice::from_ref(&i), false).unwrap_err();
    assert!(err.is_not_constant());

    let partial = get_constant_idx(&idx_list, std::slice::from_ref(&i), true).unwrap();
    assert!(matches!(&partial[0], RawIndex::Var(var) if *var == i));
}

#[test]
fn test_get_constant_idx_arrays() {
    let idx_list = [IndexDescriptor::Array { dtype: DType::Int64, rank: 1 }];
    let rows = Variable::constant(int_vector(&[0, 1]));
    assert!(get_constant_idx(&idx_list, std::slice::from_ref(&rows), false).unwrap_err().is_not_constant());
    assert!(matches!(&get_constant_idx(&idx_list, &[rows], true).unwrap()[0], RawIndex::Var(_)));
}

#[test]
fn test_raw_slice_builder() {
    let slice = RawSlice::builder().start(1).stop(-1).build();
    assert!(matches!(slice.start, Some(RawScalar::Int(1))));
    assert!(matches!(slice.stop, Some(RawScalar::Int(-1))));
    assert!(slice.step.is_none());
    assert!(!slice.is_full());
}

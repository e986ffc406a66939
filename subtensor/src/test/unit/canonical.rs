use std::collections::HashMap;

use test_case::test_case;
use tessera_ir::SInt;

use crate::canonical::*;
use crate::error::Error;

#[test_case(Some(2), Some(10), None, 5 => (2, 5, 1); "stop past the end")]
#[test_case(None, None, Some(-1), 5 => (4, -1, -1); "full reversal")]
#[test_case(Some(-2), None, None, 5 => (3, 5, 1); "negative start")]
#[test_case(Some(-10), Some(-20), Some(-1), 5 => (-1, -1, -1); "both below the start")]
#[test_case(Some(10), None, Some(-2), 5 => (4, -1, -2); "reversed from past the end")]
#[test_case(Some(1), Some(3), None, 0 => (0, 0, 1); "empty axis")]
fn test_slice_indices(start: Option<i64>, stop: Option<i64>, step: Option<i64>, length: i64) -> (i64, i64, i64) {
    slice_indices(start, stop, step, length).unwrap()
}

#[test_case(Some(2), Some(10), Some(1), 5 => ("2:5:1".to_string(), 1); "concrete scenario")]
#[test_case(None, None, Some(-1), 5 => ("0:5:1".to_string(), -1); "reversed")]
#[test_case(None, None, Some(-2), 5 => ("0:5:2".to_string(), -1); "reversed with stride")]
#[test_case(Some(3), Some(1), None, 5 => ("1:1:1".to_string(), 1); "empty forward")]
#[test_case(Some(1), Some(3), Some(-1), 5 => ("2:2:1".to_string(), -1); "empty backward")]
#[test_case(Some(-3), None, Some(2), 5 => ("2:5:2".to_string(), 1); "negative start with stride")]
fn test_constant_canonical_slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>, length: i64) -> (String, i64) {
    let konst = |v: Option<i64>| v.map(SInt::from);
    let (slice, direction) = canonical_slice(konst(start), konst(stop), konst(step), &SInt::from(length)).unwrap();
    (slice.to_string(), direction.to_const().unwrap())
}

#[test]
fn test_concrete_scenario_length() {
    let len = slice_len(Some(2.into()), Some(10.into()), Some(1.into()), &SInt::from(5)).unwrap();
    assert_eq!(len, SInt::Const(3));
}

#[test]
fn test_zero_step_is_rejected() {
    let err = canonical_slice(None, None, Some(SInt::from(0)), &SInt::from(5)).unwrap_err();
    assert!(matches!(err, Error::SliceStepZero));
    assert!(matches!(concrete_slice(None, None, Some(0), 3), Err(Error::SliceStepZero)));
}

#[test]
fn test_canonical_index() {
    let n = SInt::from(5);
    assert_eq!(canonical_index(&SInt::from(-1), &n), SInt::Const(4));
    assert_eq!(canonical_index(&SInt::from(2), &n), SInt::Const(2));

    let i = SInt::symbol("i");
    let wrapped = canonical_index(&i, &n);
    assert!(wrapped.is_symbolic());
    let bindings = HashMap::from([("i".to_string(), -2)]);
    assert_eq!(wrapped.evaluate(&bindings).unwrap(), 3);
}

#[test]
fn test_symbolic_length_fast_path() {
    let n = SInt::symbol("n");
    let (slice, direction) = canonical_slice(Some(SInt::from(1)), None, None, &n).unwrap();
    assert_eq!(direction, SInt::Const(1));
    assert_eq!(slice.stop, n);

    for (length, start) in [(5, 1), (1, 1), (0, 0)] {
        let bindings = HashMap::from([("n".to_string(), length)]);
        assert_eq!(slice.start.evaluate(&bindings).unwrap(), start);
    }
}

#[test]
fn test_symbolic_step_selects_direction() {
    let step = SInt::symbol("step");
    let n = SInt::from(6);
    let (slice, direction) = canonical_slice(None, None, Some(step), &n).unwrap();
    assert!(direction.is_symbolic());

    let backward = HashMap::from([("step".to_string(), -2)]);
    assert_eq!(direction.evaluate(&backward).unwrap(), -1);
    assert_eq!(slice.start.evaluate(&backward).unwrap(), 1);
    assert_eq!(slice.stop.evaluate(&backward).unwrap(), 6);
    assert_eq!(slice.step.evaluate(&backward).unwrap(), 2);

    let forward = HashMap::from([("step".to_string(), 4)]);
    assert_eq!(direction.evaluate(&forward).unwrap(), 1);
    assert_eq!(range_len(&CanonicalSlice {
        start: slice.start.evaluate(&forward).unwrap().into(),
        stop: slice.stop.evaluate(&forward).unwrap().into(),
        step: slice.step.evaluate(&forward).unwrap().into(),
    }), SInt::Const(2));
}

#[test]
fn test_max_size_stop_means_end() {
    let (slice, _) = canonical_slice(Some(SInt::from(1)), Some(SInt::from(i64::MAX)), None, &SInt::symbol("n")).unwrap();
    assert_eq!(slice.stop, SInt::symbol("n"));
}

#[test]
fn test_range_len() {
    let slice = |start: i64, stop: i64, step: i64| CanonicalSlice { start: start.into(), stop: stop.into(), step: step.into() };
    assert_eq!(range_len(&slice(0, 5, 2)), SInt::Const(3));
    assert_eq!(range_len(&slice(4, 4, 1)), SInt::Const(0));
    assert_eq!(range_len(&slice(5, 0, -2)), SInt::Const(3));
}

#[test]
fn test_concrete_slice_positions() {
    let slice = concrete_slice(None, None, Some(-2), 5).unwrap();
    assert_eq!(slice, ConcreteSlice { start: 0, stop: 5, step: 2, reversed: true });
    assert_eq!((0..slice.len()).map(|i| slice.position(i)).collect::<Vec<_>>(), vec![4, 2, 0]);
    assert!(concrete_slice(Some(4), Some(1), None, 5).unwrap().is_empty());
}

#[test_case(None, None, i64::MIN => vec![4]; "most negative step")]
#[test_case(None, None, i64::MIN + 1 => vec![4]; "negated max step")]
#[test_case(Some(2), None, i64::MIN => vec![2]; "most negative step from the middle")]
#[test_case(Some(4), Some(4), i64::MIN => Vec::<usize>::new(); "empty with most negative step")]
#[test_case(Some(1), Some(3), i64::MIN => Vec::<usize>::new(); "empty backward with most negative step")]
#[test_case(None, None, i64::MAX => vec![0]; "max step")]
fn test_extreme_steps(start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let slice = concrete_slice(start, stop, Some(step), 5).unwrap();
    (0..slice.len()).map(|i| slice.position(i)).collect()
}

#[test]
fn test_symbolic_extreme_step() {
    let (slice, direction) = canonical_slice(None, None, Some(SInt::symbol("step")), &SInt::from(5)).unwrap();
    for step in [i64::MIN, i64::MIN + 1] {
        let bindings = HashMap::from([("step".to_string(), step)]);
        assert_eq!(slice.start.evaluate(&bindings).unwrap(), 4);
        assert_eq!(slice.stop.evaluate(&bindings).unwrap(), 5);
        assert_eq!(slice.step.evaluate(&bindings).unwrap(), i64::MAX);
        assert_eq!(direction.evaluate(&bindings).unwrap(), -1);
    }
}

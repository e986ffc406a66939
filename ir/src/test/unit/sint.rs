use std::collections::HashMap;

use test_case::test_case;

use crate::error::Error;
use crate::{SBool, SInt, sint_max, sint_prod};

fn bind(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
    pairs.iter().map(|(name, v)| (name.to_string(), *v)).collect()
}

#[test]
fn test_sint_const() {
    let s = SInt::from(42i64);
    assert!(s.is_const());
    assert!(!s.is_symbolic());
    assert_eq!(s.as_const(), Some(42));
    assert_eq!(s.to_const().unwrap(), 42);
}

#[test]
fn test_symbolic_is_not_constant() {
    let n = SInt::symbol("n");
    assert!(n.is_symbolic());
    assert!(n.to_const().unwrap_err().is_not_constant());
}

#[test]
fn test_identity_folding() {
    let n = SInt::symbol("n");
    assert_eq!(&n + 0, n);
    assert_eq!(SInt::Const(0) + &n, n);
    assert_eq!(&n * 1, n);
    assert_eq!(&n * 0, SInt::Const(0));
    assert_eq!(&n - &n, SInt::Const(0));
    assert_eq!(n.clone().floor_div(1), n);
    assert_eq!(n.clone().max(n.clone()), n);
}

#[test]
fn test_const_arithmetic_folds() {
    let r = (SInt::Const(7) - 10).floor_div(2);
    assert_eq!(r.as_const(), Some(-2));
    assert_eq!(SInt::Const(-3).abs().as_const(), Some(3));
    assert_eq!(SInt::Const(-3).sign().as_const(), Some(-1));
}

#[test]
fn test_comparison_of_identical_operands() {
    let n = SInt::symbol("n");
    assert_eq!(n.lt(n.clone()), SBool::Const(false));
    assert_eq!(n.ge(n.clone()), SBool::Const(true));
    assert_eq!(n.eq_(n.clone()), SBool::Const(true));
}

#[test_case(-3, 5, 2; "negative_wraps")]
#[test_case(3, 5, 3; "positive_kept")]
fn test_select_evaluates(i: i64, n: i64, expected: i64) {
    let idx = SInt::symbol("i");
    let len = SInt::symbol("len");
    let wrapped = idx.lt(0).select(&idx + &len, idx.clone());
    assert!(wrapped.is_symbolic());
    assert_eq!(wrapped.evaluate(&bind(&[("i", i), ("len", n)])).unwrap(), expected);
}

#[test]
fn test_boolean_folding() {
    let n = SInt::symbol("n");
    let p = n.lt(3);
    assert_eq!(p.and(&SBool::Const(false)), SBool::Const(false));
    assert_eq!(p.and(&SBool::Const(true)), p);
    assert_eq!(p.or(&SBool::Const(true)), SBool::Const(true));
    assert_eq!(p.or(&SBool::Const(false)), p);
    assert_eq!(SBool::Const(true).not(), SBool::Const(false));
    assert!(p.not().evaluate(&bind(&[("n", 5)])).unwrap());
}

#[test]
fn test_gt_le_are_mirrors() {
    let n = SInt::symbol("n");
    let bindings = bind(&[("n", 4)]);
    assert!(n.gt(3).evaluate(&bindings).unwrap());
    assert!(!n.le(3).evaluate(&bindings).unwrap());
}

#[test]
fn test_sint_prod_and_max() {
    let dims = [SInt::from(2i64), SInt::from(3i64), SInt::from(4i64)];
    assert_eq!(sint_prod(&dims).as_const(), Some(24));
    assert_eq!(sint_prod(&[]).as_const(), Some(1));
    assert_eq!(sint_max(&dims).and_then(|m| m.as_const()), Some(4));
    assert!(sint_max(&[]).is_none());

    let n = SInt::symbol("n");
    let prod = sint_prod(&[SInt::Const(2), n]);
    assert_eq!(prod.evaluate(&bind(&[("n", 5)])).unwrap(), 10);
}

#[test]
fn test_evaluate_division_by_zero() {
    let d = SInt::symbol("d");
    let q = SInt::Const(10).floor_div(d);
    assert!(matches!(q.evaluate(&bind(&[("d", 0)])), Err(Error::DivisionByZero)));
}

#[test]
fn test_display() {
    assert_eq!(SInt::Const(-2).to_string(), "-2");
    assert_eq!((SInt::symbol("n") + 1).to_string(), "n + 1");
}

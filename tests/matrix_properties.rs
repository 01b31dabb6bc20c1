//! Algebraic properties of the numeric matrix layer

use kodkod_num::config::{Options, Tnorm};
use kodkod_num::num::{BoolValue, Dimensions, NumValue, Number, NumericFactory, NumericMatrix};

fn fuzzy_factory() -> NumericFactory {
    NumericFactory::new(&Options::fuzzy(Tnorm::Godelian))
}

fn weighted(f: &NumericFactory, dims: Dimensions, cells: &[(usize, f64)]) -> NumericMatrix {
    let mut m = NumericMatrix::empty(dims, false);
    for &(i, w) in cells {
        m.set(i, f.constant(Number::Real(w)));
    }
    m
}

fn one_matrix(dims: Dimensions) -> NumericMatrix {
    let mut m = NumericMatrix::empty(dims.clone(), false);
    for i in 0..dims.capacity() {
        m.set(i, NumValue::ONE);
    }
    m
}

fn same_constants(a: &NumericMatrix, b: &NumericMatrix) -> bool {
    a.density() == b.density()
        && a.iter().zip(b.iter()).all(|((i, x), (j, y))| {
            i == j && x.as_number() == y.as_number()
        })
}

#[test]
fn plus_with_the_empty_matrix_is_identity() {
    let f = fuzzy_factory();
    let dims = Dimensions::square(3, 1);
    let a = weighted(&f, dims.clone(), &[(0, 0.4), (2, 0.9)]);
    let zero = NumericMatrix::empty(dims, false);

    assert!(same_constants(&a.plus(&zero, &f), &a));
}

#[test]
fn product_with_the_one_matrix_is_identity() {
    let f = fuzzy_factory();
    let dims = Dimensions::square(3, 1);
    let a = weighted(&f, dims.clone(), &[(0, 0.4), (2, 0.9)]);
    let ones = one_matrix(dims);

    assert!(same_constants(&a.product(&ones, &f), &a));
}

#[test]
fn union_with_the_empty_matrix_is_identity() {
    let f = fuzzy_factory();
    let dims = Dimensions::square(3, 1);
    let a = weighted(&f, dims.clone(), &[(1, 0.6)]);
    let empty = NumericMatrix::empty(dims, false);

    assert!(same_constants(&a.union(&empty, &f).unwrap(), &a));
}

#[test]
fn transpose_is_an_involution() {
    let f = fuzzy_factory();
    let dims = Dimensions::square(3, 2);
    let a = weighted(&f, dims, &[(1, 0.3), (5, 0.7), (6, 0.2)]);

    assert!(same_constants(&a.transpose().transpose(), &a));
}

#[test]
fn evaluating_some_twice_yields_equal_circuits() {
    // hash-consing makes the second evaluation return the same gates
    let f = fuzzy_factory();
    let dims = Dimensions::square(3, 1);
    let mut a = NumericMatrix::empty(dims, false);
    a.set(0, NumValue::Variable(f.fresh_variable()));
    a.set(1, NumValue::Variable(f.fresh_variable()));

    let first = a.some(&f);
    let second = a.some(&f);
    assert_eq!(first.label(), second.label());
}

#[test]
fn closure_support_contains_the_original() {
    let f = fuzzy_factory();
    let a = weighted(
        &f,
        Dimensions::square(4, 2),
        &[(1, 0.5), (6, 0.3), (11, 0.8)],
    );
    let closed = a.closure(&f).unwrap();
    for i in a.dense_indices() {
        assert!(!closed.get(i).is_zero(), "support lost at {}", i);
    }
}

#[test]
fn reflexive_closure_contains_the_identity_in_every_tnorm() {
    for tnorm in [
        Tnorm::Godelian,
        Tnorm::Lukasiewicz,
        Tnorm::Product,
        Tnorm::AddMin,
        Tnorm::MaxProduct,
    ] {
        let f = NumericFactory::new(&Options::fuzzy(tnorm));
        let a = weighted(&f, Dimensions::square(3, 2), &[(1, 0.4)]);
        let mut fp_eq = Vec::new();
        let star = a.reflexive_closure(&f, &mut fp_eq).unwrap();
        for i in 0..3 {
            assert!(
                !star.get(i * 3 + i).is_zero(),
                "missing diagonal at {} under {:?}",
                i,
                tnorm
            );
        }
    }
}

#[test]
fn de_morgan_holds_semantically_on_constants() {
    // not(a && b) = (not a) || (not b), checked by folding constant
    // circuits on both sides
    let f = fuzzy_factory();
    for (x, y) in [(0.0, 0.0), (0.0, 0.7), (0.4, 0.0), (0.4, 0.7)] {
        let a = f.neq(&f.constant(Number::Real(x)), &NumValue::ZERO);
        let b = f.neq(&f.constant(Number::Real(y)), &NumValue::ZERO);

        let lhs = f.not(&f.and(&a, &b));
        let rhs = f.or(&f.not(&a), &f.not(&b));
        assert_eq!(lhs.as_constant(), rhs.as_constant(), "inputs {} {}", x, y);
    }
}

#[test]
fn unit_universe_matrices_behave() {
    let f = fuzzy_factory();
    let dims = Dimensions::square(1, 1);
    let a = weighted(&f, dims.clone(), &[(0, 1.0)]);
    let empty = NumericMatrix::empty(dims, false);

    assert_eq!(a.some(&f), BoolValue::TRUE);
    assert_eq!(a.one(&f), BoolValue::TRUE);
    assert_eq!(empty.none(&f), BoolValue::TRUE);
    assert_eq!(empty.lone(&f), BoolValue::TRUE);
    assert!(empty.subset(&a, &f).is_true());
}

//! Solving and enumeration
//!
//! The trivial-path tests run everywhere. The tests that drive a real SMT
//! solver look for a Z3 binary (the `Z3_DIR` variable, then `z3` on the
//! PATH) and skip quietly when none is installed.

use std::path::PathBuf;

use kodkod_num::ast::{Expression, Relation};
use kodkod_num::config::{Options, SolverKind, Tnorm};
use kodkod_num::instance::{Bounds, TupleSet, Universe};
use kodkod_num::num::Number;
use kodkod_num::solver::{Solution, Solver};

fn z3_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("Z3_DIR") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join("z3"))
        .find(|candidate| candidate.is_file())
}

fn z3_options(domain_options: Options) -> Option<Options> {
    let binary = match z3_binary() {
        Some(binary) => binary,
        None => {
            eprintln!("no z3 binary found; skipping");
            return None;
        }
    };
    let mut options = domain_options;
    options.solver = SolverKind::Z3;
    options.binary_path = Some(binary);
    Some(options)
}

#[test]
fn trivially_sat_and_unsat() {
    let u = Universe::new(&["A", "B"]).unwrap();
    let r = Relation::unary("R");
    let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
    let mut bounds = Bounds::new(u.clone());
    bounds.bound_exactly(&r, ts).unwrap();

    let solver = Solver::new(Options::integer());

    let sat = solver.solve(&Expression::from(&r).some(), &bounds).unwrap();
    assert!(sat.is_sat() && sat.is_trivial());

    let unsat = solver.solve(&Expression::from(&r).no(), &bounds).unwrap();
    assert!(unsat.is_unsat() && unsat.is_trivial());
}

#[test]
fn trivial_enumeration_with_fixed_bounds_ends_after_one_model() {
    let u = Universe::new(&["A"]).unwrap();
    let r = Relation::unary("R");
    let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
    let mut bounds = Bounds::new(u);
    bounds.bound_exactly(&r, ts).unwrap();

    let solver = Solver::new(Options::integer());
    let verdicts: Vec<bool> = solver
        .solve_all(&Expression::from(&r).some(), &bounds)
        .map(|s| s.unwrap().is_sat())
        .collect();
    assert_eq!(verdicts, vec![true, false]);
}

#[test]
fn lifted_instances_satisfy_the_solved_formula() {
    // lift is a right inverse of interpretation: evaluating the formula
    // against the lifted instance yields true
    let u = Universe::new(&["A", "B"]).unwrap();
    let r = Relation::quantitative_unary("R");
    let mut tuples = TupleSet::empty(u.clone(), 1);
    tuples.add_weighted(&["A"], Number::Real(0.5)).unwrap();

    let mut bounds = Bounds::new(u);
    bounds.bound_exactly(&r, tuples).unwrap();

    let options = Options::fuzzy(Tnorm::Godelian);
    let formula = Expression::from(&r).some();
    let solver = Solver::new(options.clone());
    let solution = solver.solve(&formula, &bounds).unwrap();
    assert!(solution.is_sat());

    let instance = solution.instance().unwrap().clone();
    let evaluator = kodkod_num::engine::Evaluator::new(instance, options);
    assert!(evaluator.evaluate(&formula).unwrap());
}

#[test]
fn z3_finds_a_boolean_model() {
    let Some(options) = z3_options(Options::integer()) else {
        return;
    };

    let u = Universe::new(&["A", "B", "C"]).unwrap();
    let person = Relation::unary("Person");
    let mut bounds = Bounds::new(u.clone());
    bounds
        .bound(
            &person,
            TupleSet::empty(u.clone(), 1),
            TupleSet::of(u, &[&["A"], &["B"], &["C"]]).unwrap(),
        )
        .unwrap();

    let solver = Solver::new(options);
    let solution = solver
        .solve(&Expression::from(&person).some(), &bounds)
        .unwrap();

    assert!(solution.is_sat() && !solution.is_trivial());
    let instance = solution.instance().unwrap();
    let tuples = instance.tuples(&person).unwrap();
    assert!(tuples.size() >= 1);
    assert!(tuples.is_unweighted());

    let stats = solution.statistics();
    assert!(stats.function_symbols() > 0);
    assert!(stats.assertions() > 0);
}

#[test]
fn z3_decides_unsatisfiability() {
    let Some(options) = z3_options(Options::integer()) else {
        return;
    };

    let u = Universe::new(&["A"]).unwrap();
    let r = Relation::unary("R");
    let mut bounds = Bounds::new(u.clone());
    bounds
        .bound(
            &r,
            TupleSet::empty(u.clone(), 1),
            TupleSet::of(u, &[&["A"]]).unwrap(),
        )
        .unwrap();

    // some R && no R
    let contradiction = Expression::from(&r)
        .some()
        .and(Expression::from(&r).no());
    let solver = Solver::new(options);
    let solution = solver.solve(&contradiction, &bounds).unwrap();
    assert!(solution.is_unsat());
}

#[test]
fn z3_solves_fuzzy_weights() {
    let Some(options) = z3_options(Options::fuzzy(Tnorm::Godelian)) else {
        return;
    };

    let u = Universe::new(&["a"]).unwrap();
    let r = Relation::quantitative_unary("R");
    let mut bounds = Bounds::new(u.clone());
    bounds
        .bound(
            &r,
            TupleSet::empty(u.clone(), 1),
            TupleSet::of(u, &[&["a"]]).unwrap(),
        )
        .unwrap();

    // #R = 0.5 pins the single weight
    let formula = Expression::from(&r)
        .cardinality()
        .equals(Expression::real_constant(0.5));
    let solver = Solver::new(options);
    let solution = solver.solve(&formula, &bounds).unwrap();

    assert!(solution.is_sat());
    let tuples = solution.instance().unwrap().tuples(&r).unwrap();
    assert_eq!(tuples.size(), 1);
    let weight = tuples.weight(0).unwrap().as_f64();
    assert!((weight - 0.5).abs() < 1e-9, "weight was {}", weight);
}

#[test]
fn z3_enumerates_exactly_three_models() {
    let Some(options) = z3_options(Options::integer()) else {
        return;
    };

    let u = Universe::new(&["A", "B", "C"]).unwrap();
    let r = Relation::unary("R");
    let mut bounds = Bounds::new(u.clone());
    bounds
        .bound(
            &r,
            TupleSet::empty(u.clone(), 1),
            TupleSet::of(u, &[&["A"], &["B"], &["C"]]).unwrap(),
        )
        .unwrap();

    // one R: exactly the three singleton models
    let solver = Solver::new(options);
    let solutions: Vec<Solution> = solver
        .solve_all(&Expression::from(&r).one(), &bounds)
        .map(|s| s.unwrap())
        .collect();

    assert_eq!(solutions.len(), 4, "expected sat, sat, sat, unsat");
    assert!(solutions[..3].iter().all(Solution::is_sat));
    assert!(solutions[3].is_unsat());

    // blocking excluded each previous model: the three instances differ
    let mut seen: Vec<Vec<usize>> = solutions[..3]
        .iter()
        .map(|s| {
            s.instance()
                .unwrap()
                .tuples(&r)
                .unwrap()
                .index_vec()
        })
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

#[test]
fn z3_respects_integer_weight_caps() {
    let Some(mut options) = z3_options(Options::integer()) else {
        return;
    };
    options.max_weight = Some(3);

    let u = Universe::new(&["a"]).unwrap();
    let r = Relation::quantitative_unary("R");
    let mut bounds = Bounds::new(u.clone());
    bounds
        .bound(
            &r,
            TupleSet::empty(u.clone(), 1),
            TupleSet::of(u, &[&["a"]]).unwrap(),
        )
        .unwrap();

    // #R > 2 forces the weight to 3 under the cap
    let formula = Expression::from(&r)
        .cardinality()
        .gt(Expression::int_constant(2));
    let solver = Solver::new(options);
    let solution = solver.solve(&formula, &bounds).unwrap();

    assert!(solution.is_sat());
    let tuples = solution.instance().unwrap().tuples(&r).unwrap();
    assert_eq!(tuples.weight(0), Some(Number::Int(3)));
}

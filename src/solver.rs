//! Main solver API
//!
//! Translates a quantitative relational problem to SMT, drives the
//! configured external solver, and lifts models back to weighted
//! instances. `solve` answers once; `solve_all` enumerates distinct
//! models by blocking each one before re-solving.

use std::time::Instant;

use crate::ast::{Expression, Formula, Relation};
use crate::config::Options;
use crate::engine::{self, last_solve, Statistics, Translation};
use crate::error::Result;
use crate::instance::{Bounds, Instance};
use crate::smt::SmtResult;

/// The outcome of one satisfiability check.
#[derive(Debug)]
pub enum Solution {
    /// Satisfiable; the instance was lifted from a solver model.
    Sat {
        /// A satisfying weighted instance
        instance: Instance,
        /// Solve statistics
        stats: Statistics,
    },
    /// Satisfiable without calling a solver: the lower bounds already
    /// satisfy the formula.
    TriviallySat {
        /// The lower-bound instance
        instance: Instance,
        /// Solve statistics
        stats: Statistics,
    },
    /// Unsatisfiable.
    Unsat {
        /// Solve statistics
        stats: Statistics,
    },
    /// Unsatisfiable without calling a solver.
    TriviallyUnsat {
        /// Solve statistics
        stats: Statistics,
    },
    /// The solver could not decide the problem.
    Unknown {
        /// Solve statistics
        stats: Statistics,
    },
}

impl Solution {
    /// True when a satisfying instance was found.
    pub fn is_sat(&self) -> bool {
        matches!(self, Solution::Sat { .. } | Solution::TriviallySat { .. })
    }

    /// True when the problem is unsatisfiable.
    pub fn is_unsat(&self) -> bool {
        matches!(self, Solution::Unsat { .. } | Solution::TriviallyUnsat { .. })
    }

    /// True when the solver answered `unknown`.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Solution::Unknown { .. })
    }

    /// True when no solver was involved.
    pub fn is_trivial(&self) -> bool {
        matches!(
            self,
            Solution::TriviallySat { .. } | Solution::TriviallyUnsat { .. }
        )
    }

    /// The satisfying instance, when one exists.
    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Solution::Sat { instance, .. } | Solution::TriviallySat { instance, .. } => {
                Some(instance)
            }
            _ => None,
        }
    }

    /// The statistics of this solve.
    pub fn statistics(&self) -> &Statistics {
        match self {
            Solution::Sat { stats, .. }
            | Solution::TriviallySat { stats, .. }
            | Solution::Unsat { stats }
            | Solution::TriviallyUnsat { stats }
            | Solution::Unknown { stats } => stats,
        }
    }
}

/// Solver for quantitative relational problems.
pub struct Solver {
    options: Options,
}

impl Solver {
    /// Creates a solver with the given options.
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// The options this solver runs under.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Decides the formula under the given bounds, producing one solution.
    pub fn solve(&self, formula: &Formula, bounds: &Bounds) -> Result<Solution> {
        let translation_start = Instant::now();
        let mut translation = engine::translate(formula, bounds, &self.options)?;
        let translation_time = translation_start.elapsed();

        let solving_start = Instant::now();
        let sat = translation.solver_mut().solve()?;
        let solving_time = solving_start.elapsed();

        let stats = Statistics::new(translation_time, solving_time, &translation);
        let trivial = translation.trivial();

        if sat {
            let instance = translation.interpret()?;
            last_solve::record(translation.record(None));
            Ok(if trivial {
                Solution::TriviallySat { instance, stats }
            } else {
                Solution::Sat { instance, stats }
            })
        } else if translation.solver().result() == Some(SmtResult::Unknown) {
            Ok(Solution::Unknown { stats })
        } else {
            Ok(if trivial {
                Solution::TriviallyUnsat { stats }
            } else {
                Solution::Unsat { stats }
            })
        }
    }

    /// Returns an iterator over the distinct solutions of the formula.
    ///
    /// The iterator yields one `Sat` per model, then a final `Unsat`; a
    /// solver `unknown` terminates the enumeration with `Unknown` so the
    /// caller can tell "no more" from "cannot decide".
    pub fn solve_all(&self, formula: &Formula, bounds: &Bounds) -> SolutionIterator {
        SolutionIterator::new(formula, bounds, self.options.clone())
    }
}

/// Iterator over all solutions of a formula.
pub struct SolutionIterator {
    translation: Option<Translation>,
    options: Options,
    translation_time: std::time::Duration,
    trivial_rounds: usize,
    pending_error: Option<crate::KodkodError>,
}

impl SolutionIterator {
    fn new(formula: &Formula, bounds: &Bounds, options: Options) -> Self {
        let start = Instant::now();
        let translation = engine::translate(formula, bounds, &options);
        let translation_time = start.elapsed();
        match translation {
            Ok(translation) => Self {
                translation: Some(translation),
                options,
                translation_time,
                trivial_rounds: 0,
                pending_error: None,
            },
            Err(e) => Self {
                translation: None,
                options,
                translation_time,
                trivial_rounds: 0,
                // surface the translation fault on the first next()
                pending_error: Some(e),
            },
        }
    }

    fn next_non_trivial(&mut self) -> Result<Solution> {
        let translation = self
            .translation
            .as_mut()
            .expect("checked by the caller");

        let solving_start = Instant::now();
        let sat = translation.solver_mut().solve()?;
        let solving_time = solving_start.elapsed();
        let stats = Statistics::new(self.translation_time, solving_time, translation);

        if sat {
            let instance = translation.interpret()?;
            last_solve::record(translation.record(None));

            // block this model so the next solve must differ
            let labels: Vec<i32> = (1..=translation.num_primary_variables()).collect();
            translation.solver_mut().elim_solution(labels)?;
            Ok(Solution::Sat { instance, stats })
        } else {
            let unknown = translation.solver().result() == Some(SmtResult::Unknown);
            if let Some(mut done) = self.translation.take() {
                done.solver_mut().free();
            }
            Ok(if unknown {
                Solution::Unknown { stats }
            } else {
                Solution::Unsat { stats }
            })
        }
    }

    /// A trivially-sat translation yields its lower-bound instance; the
    /// next round pins that instance with fresh relation symbols and
    /// demands a difference, so progress is forced through the translator.
    fn next_trivial(&mut self) -> Result<Solution> {
        let mut translation = self
            .translation
            .take()
            .expect("checked by the caller");

        let solving_start = Instant::now();
        let sat = translation.solver_mut().solve()?;
        let solving_time = solving_start.elapsed();
        let stats = Statistics::new(self.translation_time, solving_time, &translation);

        if !sat {
            return Ok(Solution::TriviallyUnsat { stats });
        }

        let instance = translation.interpret()?;
        self.trivial_rounds += 1;

        let bounds = translation.bounds();
        let mut new_bounds = bounds.clone();
        let mut changes: Vec<Formula> = Vec::new();

        for relation in bounds.relations() {
            let lower = bounds.lower_bound(relation);
            let upper = bounds.upper_bound(relation);
            let exact = match (lower, upper) {
                (Some(l), Some(u)) => l.size() == u.size(),
                _ => true,
            };
            if exact {
                continue;
            }
            let lower = lower.expect("bounded relation has a lower bound");
            if lower.is_empty() {
                changes.push(Expression::from(relation).some());
            } else {
                // pin the previous value under a fresh symbol and demand a
                // difference
                let pinned_name = format!("{}_{}", relation.name(), self.trivial_rounds);
                let pinned = if relation.is_quantitative() {
                    Relation::quantitative_nary(pinned_name, relation.arity())
                } else {
                    Relation::nary(pinned_name, relation.arity())
                };
                new_bounds.bound_exactly(&pinned, lower.clone())?;
                changes.push(
                    Expression::from(relation)
                        .equals(Expression::from(&pinned))
                        .not(),
                );
            }
        }

        // nothing can change: this trivial instance is the only solution
        let next_formula = Formula::or_all(changes);
        let start = Instant::now();
        self.translation = Some(engine::translate(&next_formula, &new_bounds, &self.options)?);
        self.translation_time += start.elapsed();

        Ok(Solution::TriviallySat { instance, stats })
    }
}

impl Iterator for SolutionIterator {
    type Item = Result<Solution>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            self.translation = None;
            return Some(Err(e));
        }
        let translation = self.translation.as_ref()?;
        let result = if translation.trivial() {
            self.next_trivial()
        } else {
            self.next_non_trivial()
        };
        if result.is_err() {
            self.translation = None;
        }
        match &result {
            Ok(solution) if solution.is_unsat() || solution.is_unknown() => {
                self.translation = None;
            }
            _ => {}
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{TupleSet, Universe};

    #[test]
    fn trivially_sat_problems_answer_without_a_solver() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::unary("R");
        let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, ts).unwrap();

        let solver = Solver::new(Options::integer());
        let solution = solver
            .solve(&Expression::from(&r).some(), &bounds)
            .unwrap();

        assert!(solution.is_sat());
        assert!(solution.is_trivial());
        let instance = solution.instance().unwrap();
        let tuples = instance.tuples(&r).unwrap();
        assert_eq!(tuples.size(), 1);
    }

    #[test]
    fn trivially_unsat_problems_answer_without_a_solver() {
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::unary("R");
        let mut bounds = Bounds::new(u.clone());
        bounds
            .bound_exactly(&r, TupleSet::empty(u, 1))
            .unwrap();

        let solver = Solver::new(Options::integer());
        let solution = solver
            .solve(&Expression::from(&r).some(), &bounds)
            .unwrap();
        assert!(solution.is_unsat());
        assert!(solution.is_trivial());
    }

    #[test]
    fn statistics_are_reported() {
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::unary("R");
        let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, ts).unwrap();

        let solver = Solver::new(Options::integer());
        let solution = solver
            .solve(&Expression::from(&r).some(), &bounds)
            .unwrap();
        let stats = solution.statistics();
        assert_eq!(stats.function_symbols(), 0); // trivial: nothing declared
    }

    #[test]
    fn enumeration_of_a_fixed_problem_terminates() {
        // exactly bound, trivially sat, and nothing can change: one
        // solution then unsat
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::unary("R");
        let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, ts).unwrap();

        let solver = Solver::new(Options::integer());
        let solutions: Vec<Solution> = solver
            .solve_all(&Expression::from(&r).some(), &bounds)
            .map(|s| s.unwrap())
            .collect();

        assert_eq!(solutions.len(), 2);
        assert!(solutions[0].is_sat());
        assert!(solutions[1].is_unsat());
    }
}

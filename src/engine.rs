//! Translation records, statistics, evaluation, and the last-solve handle
//!
//! A [`Translation`] packages everything one solve produced: the bounds it
//! was built from, the per-relation primary-variable ranges, and the SMT
//! driver holding the solver state. Lifting a model back to a weighted
//! instance lives here, as does the process-wide record of the most recent
//! solve used by enumeration.

pub mod evaluator;

pub use evaluator::Evaluator;

use indexmap::IndexMap;
use std::ops::Range;
use std::time::Duration;

use crate::ast::Relation;
use crate::config::{Options, QuantitativeType, SolverKind, Tnorm};
use crate::error::{LiftError, Result};
use crate::instance::{Bounds, Instance, TupleSet};
use crate::num::Number;
use crate::smt::{self, SmtSolver};
use crate::translator;

/// Translates a problem all the way to a solver-backed [`Translation`].
///
/// Circuits that fold to a constant yield a trivial translation that never
/// touches a solver binary.
pub fn translate(
    formula: &crate::ast::Formula,
    bounds: &Bounds,
    options: &Options,
) -> Result<Translation> {
    let circuit = translator::translate(formula, bounds, options)?;
    let var_usage = circuit.interpreter.vars().clone();
    let max_primary = circuit.interpreter.factory().max_primary_variable();

    let solver = match circuit.constant_value() {
        Some(verdict) => SmtSolver::trivial(verdict, options),
        None => SmtSolver::new(smt::emit(&circuit, options)?, options),
    };

    Ok(Translation {
        bounds: bounds.clone(),
        options: options.clone(),
        var_usage,
        max_primary,
        solver,
    })
}

/// The translation of one quantitative problem.
pub struct Translation {
    bounds: Bounds,
    options: Options,
    var_usage: IndexMap<Relation, Range<i32>>,
    max_primary: i32,
    solver: SmtSolver,
}

impl Translation {
    /// The bounds the problem was translated against.
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// The options the problem was translated under.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The SMT driver holding this translation's solver state.
    pub fn solver(&self) -> &SmtSolver {
        &self.solver
    }

    /// Mutable access to the SMT driver, for solving and blocking.
    pub fn solver_mut(&mut self) -> &mut SmtSolver {
        &mut self.solver
    }

    /// The primary-variable label range of `relation`, if it has one.
    pub fn primary_variables(&self, relation: &Relation) -> Option<Range<i32>> {
        self.var_usage.get(relation).cloned()
    }

    /// The number of primary variables of this translation.
    pub fn num_primary_variables(&self) -> i32 {
        self.max_primary
    }

    /// True when there is nothing for a solver to decide.
    pub fn trivial(&self) -> bool {
        self.solver.spec().is_trivial()
    }

    /// Lifts the solver's current model to a weighted instance.
    ///
    /// Lower-bound tuples always carry weight 1 unless the model gave them
    /// a larger weight; a relation declared boolean must end up with unit
    /// weights only.
    pub fn interpret(&self) -> Result<Instance> {
        let mut instance = Instance::new(self.bounds.universe().clone());

        for relation in self.bounds.relations() {
            let mut tuples = TupleSet::empty(self.bounds.universe().clone(), relation.arity());

            if let Some(lower) = self.bounds.lower_bound(relation) {
                for index in lower.indices() {
                    let weight = lower.weight(index).unwrap_or(Number::Int(1));
                    tuples.add_weighted_index(index, weight);
                }
            }

            if let (Some(range), Some(upper)) = (
                self.var_usage.get(relation),
                self.bounds.upper_bound(relation),
            ) {
                for (offset, index) in upper.indices().enumerate() {
                    let label = range.start + offset as i32;
                    if self.solver.contains(label)
                        && self.solver.bool_value(label) == Some(true)
                    {
                        let weight = self
                            .solver
                            .value(label)
                            .ok_or(LiftError::MissingVariable(label))?;
                        tuples.add_weighted_index(index, weight);
                    }
                }
            }

            if !relation.is_quantitative() && !tuples.is_unweighted() {
                return Err(LiftError::BooleanWithWeights(relation.name().to_string()).into());
            }
            instance.add(relation, tuples)?;
        }

        Ok(instance)
    }

    /// The per-solve record persisted in the last-solve handle.
    pub fn record(&self, source: Option<String>) -> SolveRecord {
        SolveRecord {
            source,
            universe: self.bounds.universe().atoms().to_vec(),
            relations: self
                .bounds
                .relations()
                .map(|r| RelationRecord {
                    name: r.name().to_string(),
                    arity: r.arity(),
                    quantitative: r.is_quantitative(),
                    lower: self
                        .bounds
                        .lower_bound(r)
                        .map(TupleSet::index_vec)
                        .unwrap_or_default(),
                    upper: self
                        .bounds
                        .upper_bound(r)
                        .map(TupleSet::index_vec)
                        .unwrap_or_default(),
                })
                .collect(),
            solver: self.options.solver,
            domain: self.options.domain,
            tnorm: self.options.tnorm,
            assignments: self.solver.assignments(),
        }
    }
}

/// Statistics of one solve.
#[derive(Debug, Clone)]
pub struct Statistics {
    translation_time: Duration,
    solving_time: Duration,
    primary_variables: usize,
    function_symbols: usize,
    assertions: usize,
}

impl Statistics {
    pub(crate) fn new(
        translation_time: Duration,
        solving_time: Duration,
        translation: &Translation,
    ) -> Self {
        Self {
            translation_time,
            solving_time,
            primary_variables: translation.num_primary_variables().max(0) as usize,
            function_symbols: translation.solver.num_variables(),
            assertions: translation.solver.num_assertions(),
        }
    }

    /// Translation time in milliseconds.
    pub fn translation_time(&self) -> u64 {
        self.translation_time.as_millis() as u64
    }

    /// Solving time in milliseconds.
    pub fn solving_time(&self) -> u64 {
        self.solving_time.as_millis() as u64
    }

    /// Number of primary variables.
    pub fn primary_variables(&self) -> usize {
        self.primary_variables
    }

    /// Number of declared function symbols.
    pub fn function_symbols(&self) -> usize {
        self.function_symbols
    }

    /// Number of assertions.
    pub fn assertions(&self) -> usize {
        self.assertions
    }
}

/// One relation's bounds, flattened for the per-solve record.
#[derive(Debug, Clone)]
pub struct RelationRecord {
    /// Relation name
    pub name: String,
    /// Relation arity
    pub arity: usize,
    /// Whether the relation is quantitative
    pub quantitative: bool,
    /// Lower-bound tuple indices
    pub lower: Vec<usize>,
    /// Upper-bound tuple indices
    pub upper: Vec<usize>,
}

/// A plain-data record of one solve: enough to re-block its model on a
/// later solve.
#[derive(Debug, Clone)]
pub struct SolveRecord {
    /// The original input source, when the caller supplied it
    pub source: Option<String>,
    /// The universe's atom names
    pub universe: Vec<String>,
    /// The bounds, flattened
    pub relations: Vec<RelationRecord>,
    /// The solver that produced the model
    pub solver: SolverKind,
    /// The domain of the problem
    pub domain: QuantitativeType,
    /// The configured t-norm
    pub tnorm: Tnorm,
    /// `(primary-variable label, value or fraction string)` pairs
    pub assignments: Vec<(i32, String)>,
}

/// The process-wide handle retaining the most recent solve.
///
/// Intended for the enumerator and for re-blocking across solves; replaced
/// atomically on each new solve, explicitly torn down on shutdown. Access
/// goes through [`record`], [`last`], and [`clear`] only.
pub mod last_solve {
    use super::SolveRecord;
    use std::sync::Mutex;

    static LAST_SOLVE: Mutex<Option<SolveRecord>> = Mutex::new(None);

    /// Replaces the handle with the given record.
    pub fn record(solve: SolveRecord) {
        if let Ok(mut guard) = LAST_SOLVE.lock() {
            *guard = Some(solve);
        }
    }

    /// A copy of the most recent record, if any.
    pub fn last() -> Option<SolveRecord> {
        LAST_SOLVE.lock().ok().and_then(|guard| guard.clone())
    }

    /// Tears the handle down.
    pub fn clear() {
        if let Ok(mut guard) = LAST_SOLVE.lock() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use crate::instance::Universe;

    fn trivially_sat_translation() -> Translation {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples
            .add_weighted(&["A"], Number::Real(0.5))
            .unwrap();

        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, tuples).unwrap();

        translate(
            &Expression::from(&r).some(),
            &bounds,
            &Options::fuzzy(Tnorm::Godelian),
        )
        .unwrap()
    }

    #[test]
    fn trivial_translation_interprets_lower_bounds() {
        let mut translation = trivially_sat_translation();
        assert!(translation.trivial());
        assert!(translation.solver_mut().solve().unwrap());

        let instance = translation.interpret().unwrap();
        let r = translation.bounds().relations().next().unwrap().clone();
        let tuples = instance.tuples(&r).unwrap();
        assert_eq!(tuples.size(), 1);
        assert_eq!(tuples.weight(0), Some(Number::Real(0.5)));
    }

    #[test]
    fn boolean_relation_with_weights_is_a_lift_fault() {
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::unary("R");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples.add_weighted(&["A"], Number::Int(3)).unwrap();

        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, tuples).unwrap();

        let translation = translate(
            &Expression::from(&r).some(),
            &bounds,
            &Options::integer(),
        )
        .unwrap();
        match translation.interpret() {
            Err(crate::KodkodError::Lift(LiftError::BooleanWithWeights(name))) => {
                assert_eq!(name, "R");
            }
            other => panic!("expected a lift fault, got {:?}", other),
        }
    }

    #[test]
    fn last_solve_handle_round_trips() {
        let translation = trivially_sat_translation();
        last_solve::record(translation.record(Some("some R".to_string())));

        let record = last_solve::last().expect("a record was just installed");
        assert_eq!(record.source.as_deref(), Some("some R"));
        assert_eq!(record.universe, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(record.relations.len(), 1);
        assert_eq!(record.relations[0].name, "R");

        last_solve::clear();
        assert!(last_solve::last().is_none());
    }
}

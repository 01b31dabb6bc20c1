//! Evaluation of formulas and expressions against a concrete instance
//!
//! Evaluation reuses the translation pipeline with a constant leaf
//! interpreter: every relation realizes as a constant matrix, so the
//! circuit folds all the way down. A formula evaluates to a boolean, an
//! expression to the weighted tuple set its constant matrix denotes.

use crate::ast::{Expression, Formula};
use crate::config::Options;
use crate::error::{Result, TranslationError};
use crate::instance::{Instance, TupleSet};
use crate::translator::{self, LeafInterpreter};

/// Evaluates AST nodes against a fixed instance.
pub struct Evaluator {
    instance: Instance,
    options: Options,
}

impl Evaluator {
    /// Creates an evaluator over the given instance and options.
    pub fn new(instance: Instance, options: Options) -> Self {
        Self { instance, options }
    }

    /// The instance evaluated against.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    fn interpreter(&self) -> Result<LeafInterpreter> {
        Ok(LeafInterpreter::exact_instance(&self.instance, &self.options)?)
    }

    /// Evaluates a formula to its truth value.
    ///
    /// # Errors
    /// Fails when a leaf is not interpreted by the instance, or when the
    /// circuit does not fold to a constant (the instance leaves something
    /// undetermined).
    pub fn evaluate(&self, formula: &Formula) -> Result<bool> {
        let interpreter = self.interpreter()?;
        let value = translator::evaluate_formula(formula, &interpreter)?;
        value.as_constant().ok_or_else(|| {
            TranslationError::InvalidBounds(
                "the instance does not determine the formula".to_string(),
            )
            .into()
        })
    }

    /// Evaluates an expression to its weighted tuple set.
    pub fn evaluate_expression(&self, expr: &Expression) -> Result<TupleSet> {
        let interpreter = self.interpreter()?;
        let matrix = translator::evaluate_expression(expr, &interpreter)?;

        let arity = matrix.dimensions().num_dimensions();
        let mut tuples = TupleSet::empty(self.instance.universe().clone(), arity);
        for (index, value) in matrix.iter() {
            let weight = value.as_number().ok_or_else(|| {
                crate::KodkodError::from(TranslationError::InvalidBounds(
                    "the instance does not determine the expression".to_string(),
                ))
            })?;
            tuples.add_weighted_index(index, weight);
        }
        Ok(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Relation;
    use crate::config::Tnorm;
    use crate::instance::Universe;
    use crate::num::Number;

    fn fuzzy_evaluator() -> (Evaluator, Relation) {
        let u = Universe::new(&["a", "b", "c"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples.add_weighted(&["a"], Number::Real(0.5)).unwrap();
        tuples.add_weighted(&["b"], Number::Real(0.2)).unwrap();

        let mut instance = Instance::new(u);
        instance.add(&r, tuples).unwrap();
        (
            Evaluator::new(instance, Options::fuzzy(Tnorm::Godelian)),
            r,
        )
    }

    #[test]
    fn evaluates_multiplicities() {
        let (evaluator, r) = fuzzy_evaluator();
        assert!(evaluator.evaluate(&Expression::from(&r).some()).unwrap());
        assert!(!evaluator.evaluate(&Expression::from(&r).no()).unwrap());
        assert!(!evaluator.evaluate(&Expression::from(&r).one()).unwrap());
        assert!(!evaluator.evaluate(&Expression::from(&r).lone()).unwrap());
    }

    #[test]
    fn evaluates_expressions_to_weighted_tuples() {
        let (evaluator, r) = fuzzy_evaluator();
        let tuples = evaluator
            .evaluate_expression(&Expression::from(&r))
            .unwrap();
        assert_eq!(tuples.size(), 2);
        assert_eq!(tuples.weight(0), Some(Number::Real(0.5)));
        assert_eq!(tuples.weight(1), Some(Number::Real(0.2)));
    }

    #[test]
    fn evaluates_cardinality() {
        let (evaluator, r) = fuzzy_evaluator();
        let card = evaluator
            .evaluate_expression(&Expression::from(&r).cardinality())
            .unwrap();
        let total = card.weight(0).unwrap().as_f64();
        assert!((total - 0.7).abs() < 1e-12);
    }

    #[test]
    fn unbound_relation_fails() {
        let (evaluator, _) = fuzzy_evaluator();
        let s = Relation::unary("S");
        assert!(evaluator.evaluate(&Expression::from(&s).some()).is_err());
    }
}

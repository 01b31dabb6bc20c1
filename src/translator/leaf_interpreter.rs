//! Leaf interpreter: relations and constant expressions as matrices
//!
//! For each relation the interpreter realizes a matrix over
//! `universe.size() ^ arity`: lower-bound tuples are certain (the constant
//! one, or a non-zero variable for quantitative relations), upper-only
//! tuples get fresh primary variables. One variable slot is consumed per
//! upper-bound tuple, so a relation's contiguous label range aligns
//! position-for-position with its upper bound during lift-back.

use indexmap::IndexMap;
use std::ops::Range;
use std::rc::Rc;

use crate::ast::{ConstantExpr, Relation};
use crate::config::{Options, QuantitativeType};
use crate::error::TranslationError;
use crate::instance::{Bounds, Instance, TupleSet, Universe};
use crate::num::{Dimensions, NumValue, NumericFactory, NumericMatrix, Number, VarConstraint};

/// Interprets relations and constant expressions as numeric matrices.
///
/// Immutable after construction; the factory it carries allocates every
/// scalar of the translation.
pub struct LeafInterpreter {
    factory: Rc<NumericFactory>,
    universe: Universe,
    vars: IndexMap<Relation, Range<i32>>,
    lowers: IndexMap<Relation, TupleSet>,
    uppers: IndexMap<Relation, TupleSet>,
    constant: bool,
}

impl LeafInterpreter {
    /// An interpreter for the given bounds: allocates one primary variable
    /// per upper-bound tuple, in bounds iteration order, labels starting
    /// at 1.
    pub fn exact(bounds: &Bounds, options: &Options) -> Result<Self, TranslationError> {
        let mut vars = IndexMap::new();
        let mut lowers = IndexMap::new();
        let mut uppers = IndexMap::new();

        let mut next_var: i32 = 1;
        for relation in bounds.relations() {
            let lower = bounds
                .lower_bound(relation)
                .cloned()
                .unwrap_or_else(|| TupleSet::empty(bounds.universe().clone(), relation.arity()));
            let upper = bounds
                .upper_bound(relation)
                .cloned()
                .unwrap_or_else(|| TupleSet::empty(bounds.universe().clone(), relation.arity()));

            Self::check_weights(relation, &lower, options)?;
            Self::check_weights(relation, &upper, options)?;
            if Dimensions::checked_square(bounds.universe().size(), relation.arity()).is_none() {
                return Err(TranslationError::CapacityExceeded(format!(
                    "universe of size {} with arity {}",
                    bounds.universe().size(),
                    relation.arity()
                )));
            }

            let slots = upper.size() as i32;
            if slots > 0 {
                vars.insert(relation.clone(), next_var..next_var + slots);
                next_var += slots;
            }
            lowers.insert(relation.clone(), lower);
            uppers.insert(relation.clone(), upper);
        }

        let factory = NumericFactory::with_variables(options, (next_var - 1) as usize);
        Ok(Self {
            factory: Rc::new(factory),
            universe: bounds.universe().clone(),
            vars,
            lowers,
            uppers,
            constant: false,
        })
    }

    /// A constant interpreter over a concrete instance: every relation is
    /// realized as a constant matrix carrying the instance's weights. Used
    /// for evaluation.
    pub fn exact_instance(instance: &Instance, options: &Options) -> Result<Self, TranslationError> {
        let mut lowers = IndexMap::new();
        let mut uppers = IndexMap::new();
        for (relation, tuples) in instance.relation_tuples() {
            Self::check_weights(relation, tuples, options)?;
            lowers.insert(relation.clone(), tuples.clone());
            uppers.insert(relation.clone(), tuples.clone());
        }
        Ok(Self {
            factory: Rc::new(NumericFactory::new(options)),
            universe: instance.universe().clone(),
            vars: IndexMap::new(),
            lowers,
            uppers,
            constant: true,
        })
    }

    fn check_weights(
        relation: &Relation,
        tuples: &TupleSet,
        options: &Options,
    ) -> Result<(), TranslationError> {
        for index in tuples.indices() {
            let weight = tuples.weight(index).unwrap_or(Number::Int(1));
            match options.domain {
                QuantitativeType::Fuzzy => {
                    let w = weight.as_f64();
                    if !(0.0..=1.0).contains(&w) {
                        return Err(TranslationError::DomainMismatch(format!(
                            "fuzzy weight {} of {} lies outside [0, 1]",
                            w, relation
                        )));
                    }
                }
                QuantitativeType::Integer => {
                    if weight.as_f64().fract() != 0.0 {
                        return Err(TranslationError::DomainMismatch(format!(
                            "integer-domain weight {} of {} is fractional",
                            weight, relation
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// The factory allocating this translation's scalars.
    pub fn factory(&self) -> &Rc<NumericFactory> {
        &self.factory
    }

    /// The universe of discourse.
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// The primary-variable label range of each relation.
    pub fn vars(&self) -> &IndexMap<Relation, Range<i32>> {
        &self.vars
    }

    /// The primary-variable label range of `relation`, if any.
    pub fn vars_of(&self, relation: &Relation) -> Option<Range<i32>> {
        self.vars.get(relation).cloned()
    }

    /// The lower bounds this interpreter was built from.
    pub fn lower_bounds(&self) -> &IndexMap<Relation, TupleSet> {
        &self.lowers
    }

    /// The upper bounds this interpreter was built from.
    pub fn upper_bounds(&self) -> &IndexMap<Relation, TupleSet> {
        &self.uppers
    }

    /// Interprets a relation as its matrix.
    pub fn interpret(&self, relation: &Relation) -> Result<NumericMatrix, TranslationError> {
        let lower = self.lowers.get(relation).ok_or_else(|| {
            TranslationError::UnboundLeaf(format!("unbound relation: {}", relation))
        })?;
        let upper = self.uppers.get(relation).ok_or_else(|| {
            TranslationError::UnboundLeaf(format!("unbound relation: {}", relation))
        })?;

        let dims = Dimensions::square(self.universe.size(), relation.arity());
        let upper_indices = upper.index_vec();
        let lower_indices = lower.index_vec();
        let quantitative = relation.is_quantitative();

        let mut matrix = if quantitative {
            self.factory
                .matrix_with_bounds(dims, &upper_indices, &lower_indices)
        } else {
            self.factory
                .boolean_matrix_with_bounds(dims, &upper_indices, &lower_indices)
        };

        if let Some(range) = self.vars.get(relation) {
            let mut var_id = range.start;
            for &index in &upper_indices {
                let in_lower = lower.contains_index(index);
                if !(in_lower && !quantitative) {
                    let cell = self.factory.variable(var_id);
                    let value = if in_lower {
                        // lower-bound tuple of a quantitative relation:
                        // present, weight free
                        cell.set_constraint(VarConstraint::NonZero);
                        NumValue::Variable(cell)
                    } else if !quantitative {
                        self.factory.to_bool(&cell)
                    } else {
                        NumValue::Variable(cell)
                    };
                    matrix.set(index, value);
                }
                var_id += 1;
            }
        } else if self.constant {
            for &index in &upper_indices {
                let value = if quantitative {
                    let weight = upper.weight(index).unwrap_or(Number::Int(1));
                    self.factory.constant(weight)
                } else {
                    NumValue::ONE
                };
                matrix.set(index, value);
            }
        }

        Ok(matrix)
    }

    /// Interprets a constant expression as its canonical matrix.
    pub fn interpret_constant(&self, c: ConstantExpr) -> NumericMatrix {
        let n = self.universe.size();
        match c {
            ConstantExpr::Univ => {
                let all: Vec<usize> = (0..n).collect();
                self.factory
                    .boolean_matrix_with_bounds(Dimensions::square(n, 1), &all, &all)
            }
            ConstantExpr::Iden => {
                let iden: Vec<usize> = (0..n).map(|i| i * n + i).collect();
                self.factory
                    .matrix_with_bounds(Dimensions::square(n, 2), &iden, &iden)
            }
            ConstantExpr::None | ConstantExpr::Ints => {
                self.factory.matrix(Dimensions::square(n, 1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::BoolValue;

    fn universe() -> Universe {
        Universe::new(&["A", "B", "C"]).unwrap()
    }

    #[test]
    fn boolean_relation_cells() {
        let u = universe();
        let r = Relation::unary("R");
        let mut bounds = Bounds::new(u.clone());
        bounds
            .bound(
                &r,
                TupleSet::of(u.clone(), &[&["A"]]).unwrap(),
                TupleSet::of(u.clone(), &[&["A"], &["B"], &["C"]]).unwrap(),
            )
            .unwrap();

        let interpreter = LeafInterpreter::exact(&bounds, &Options::integer()).unwrap();
        let m = interpreter.interpret(&r).unwrap();

        // lower-bound tuple is certainly present
        assert!(m.get(0).is_one());
        // upper-only tuples are {0,1}-paired variables
        assert!(matches!(m.get(1), NumValue::Binary(_)));
        assert!(matches!(m.get(2), NumValue::Binary(_)));

        // one slot per upper tuple
        assert_eq!(interpreter.vars_of(&r), Some(1..4));
        assert_eq!(m.get(1).label(), 2);
        assert_eq!(m.get(2).label(), 3);
    }

    #[test]
    fn quantitative_relation_cells() {
        let u = universe();
        let r = Relation::quantitative_unary("R");
        let mut bounds = Bounds::new(u.clone());
        bounds
            .bound(
                &r,
                TupleSet::of(u.clone(), &[&["A"]]).unwrap(),
                TupleSet::of(u.clone(), &[&["A"], &["B"]]).unwrap(),
            )
            .unwrap();

        let interpreter = LeafInterpreter::exact(&bounds, &Options::integer()).unwrap();
        let m = interpreter.interpret(&r).unwrap();

        // lower-bound tuple: non-zero variable
        match m.get(0).as_variable() {
            Some(v) => assert!(v.is_true()),
            None => panic!("expected a variable cell"),
        }
        // upper-only tuple: free variable
        match m.get(1).as_variable() {
            Some(v) => assert!(!v.is_true() && !v.is_false()),
            None => panic!("expected a variable cell"),
        }
    }

    #[test]
    fn variable_ranges_are_contiguous_per_relation() {
        let u = universe();
        let r = Relation::unary("R");
        let s = Relation::binary("S");
        let mut bounds = Bounds::new(u.clone());
        bounds
            .bound(
                &r,
                TupleSet::empty(u.clone(), 1),
                TupleSet::of(u.clone(), &[&["A"], &["B"]]).unwrap(),
            )
            .unwrap();
        bounds
            .bound(
                &s,
                TupleSet::empty(u.clone(), 2),
                TupleSet::of(u.clone(), &[&["A", "B"], &["B", "C"], &["C", "A"]]).unwrap(),
            )
            .unwrap();

        let interpreter = LeafInterpreter::exact(&bounds, &Options::integer()).unwrap();
        assert_eq!(interpreter.vars_of(&r), Some(1..3));
        assert_eq!(interpreter.vars_of(&s), Some(3..6));
        assert_eq!(interpreter.factory().max_primary_variable(), 5);
    }

    #[test]
    fn constant_expressions() {
        let u = universe();
        let bounds = Bounds::new(u);
        let interpreter = LeafInterpreter::exact(&bounds, &Options::integer()).unwrap();

        let univ = interpreter.interpret_constant(ConstantExpr::Univ);
        assert_eq!(univ.density(), 3);
        assert!(univ.is_boolean());

        let iden = interpreter.interpret_constant(ConstantExpr::Iden);
        assert_eq!(iden.density(), 3);
        assert!(iden.get(0).is_one());
        assert!(iden.get(4).is_one());
        assert!(iden.get(8).is_one());
        assert!(iden.get(1).is_zero());

        let none = interpreter.interpret_constant(ConstantExpr::None);
        assert_eq!(none.density(), 0);
    }

    #[test]
    fn constant_interpreter_reads_weights() {
        let u = universe();
        let r = Relation::quantitative_unary("R");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples.add_weighted(&["A"], Number::Real(0.5)).unwrap();
        tuples.add(&["B"]).unwrap();

        let mut instance = Instance::new(u);
        instance.add(&r, tuples).unwrap();

        let interpreter =
            LeafInterpreter::exact_instance(&instance, &Options::fuzzy(crate::config::Tnorm::Godelian))
                .unwrap();
        let m = interpreter.interpret(&r).unwrap();
        assert_eq!(m.get(0).as_number(), Some(Number::Real(0.5)));
        assert!(m.get(1).is_one());
    }

    #[test]
    fn fuzzy_weights_outside_unit_interval_are_rejected() {
        let u = universe();
        let r = Relation::quantitative_unary("R");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples.add_weighted(&["A"], Number::Real(1.5)).unwrap();

        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, tuples).unwrap();

        let err = LeafInterpreter::exact(&bounds, &Options::fuzzy(crate::config::Tnorm::Godelian));
        assert!(matches!(err, Err(TranslationError::DomainMismatch(_))));
    }

    #[test]
    fn unbound_relation_is_a_fault() {
        let u = universe();
        let bounds = Bounds::new(u);
        let interpreter = LeafInterpreter::exact(&bounds, &Options::integer()).unwrap();
        let r = Relation::unary("R");
        assert!(matches!(
            interpreter.interpret(&r),
            Err(TranslationError::UnboundLeaf(_))
        ));
    }

    #[test]
    fn lower_bound_boolean_cells_stay_one() {
        // a boolean relation bound exactly still realizes constant cells
        let u = universe();
        let r = Relation::unary("R");
        let ts = TupleSet::of(u.clone(), &[&["A"], &["B"]]).unwrap();
        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, ts).unwrap();

        let interpreter = LeafInterpreter::exact(&bounds, &Options::integer()).unwrap();
        let m = interpreter.interpret(&r).unwrap();
        assert!(m.get(0).is_one());
        assert!(m.get(1).is_one());
        assert_eq!(
            m.some(interpreter.factory()),
            BoolValue::TRUE
        );
    }
}

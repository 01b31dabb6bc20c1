//! AST to numeric-matrix translation
//!
//! A single post-order traversal maps expression nodes to matrices and
//! formula nodes to boolean scalars, threading the environment and the
//! translation cache explicitly. Quantifiers and comprehensions ground
//! their declarations by iterating the non-zero support of the bounding
//! matrix, binding each tuple in turn.

pub mod cache;
pub mod environment;
pub mod leaf_interpreter;

pub use cache::TranslationCache;
pub use environment::Environment;
pub use leaf_interpreter::LeafInterpreter;

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::ast::{
    ConstantExpr, Decl, Decls, Expression, ExpressionInner, ExprBinaryOp, ExprUnaryOp, Formula,
    FormulaBinaryOp, FormulaInner, Multiplicity, Quantifier, Relation,
};
use crate::config::Options;
use crate::error::TranslationError;
use crate::instance::Bounds;
use crate::num::{BoolValue, Dimensions, NumValue, NumericFactory, NumericMatrix};

/// The circuit form of one problem: the root conjuncts (fixed-point
/// equations appended) plus the interpreter that allocated the primary
/// variables.
pub struct CircuitTranslation {
    /// The root boolean circuits, one per top-level conjunct
    pub roots: Vec<BoolValue>,
    /// The leaf interpreter used for the translation
    pub interpreter: LeafInterpreter,
}

impl CircuitTranslation {
    /// `Some(verdict)` when every root folded to a constant.
    pub fn constant_value(&self) -> Option<bool> {
        if self.roots.iter().any(BoolValue::is_false) {
            return Some(false);
        }
        if self.roots.iter().all(BoolValue::is_true) {
            return Some(true);
        }
        None
    }
}

/// Translates a formula under the given bounds into its circuit form.
///
/// The drop-removal rewrite runs first; the formula is then split into its
/// top-level conjuncts and each is translated with a shared cache.
pub fn translate(
    formula: &Formula,
    bounds: &Bounds,
    options: &Options,
) -> Result<CircuitTranslation, TranslationError> {
    let formula = crate::simplify::remove_drops(formula);
    let interpreter = LeafInterpreter::exact(bounds, options)?;
    let roots = translate_conjuncts(&formula, &interpreter)?;
    tracing::debug!(
        roots = roots.len(),
        primary_variables = interpreter.factory().max_primary_variable(),
        "translated formula to circuit"
    );
    Ok(CircuitTranslation { roots, interpreter })
}

/// Translates each top-level conjunct of `formula`, appending the
/// fixed-point equations collected along the way.
pub(crate) fn translate_conjuncts(
    formula: &Formula,
    interpreter: &LeafInterpreter,
) -> Result<Vec<BoolValue>, TranslationError> {
    let mut parts = Vec::new();
    conjuncts_of(formula, &mut parts);

    let cache = TranslationCache::new(formula);
    let mut translator = Fol2NumTranslator::new(interpreter, cache);

    let mut roots = Vec::with_capacity(parts.len());
    for conjunct in &parts {
        roots.push(translator.formula(conjunct)?);
    }
    roots.append(&mut translator.fixed_point_eq);
    Ok(roots)
}

/// Evaluates a formula against a constant interpreter; used by the
/// evaluator.
pub(crate) fn evaluate_formula(
    formula: &Formula,
    interpreter: &LeafInterpreter,
) -> Result<BoolValue, TranslationError> {
    let formula = crate::simplify::remove_drops(formula);
    let cache = TranslationCache::new(&formula);
    let mut translator = Fol2NumTranslator::new(interpreter, cache);
    translator.formula(&formula)
}

/// Evaluates an expression against a constant interpreter.
pub(crate) fn evaluate_expression(
    expr: &Expression,
    interpreter: &LeafInterpreter,
) -> Result<NumericMatrix, TranslationError> {
    let expr = crate::simplify::remove_drops_expr(expr);
    let mut translator = Fol2NumTranslator::new(interpreter, TranslationCache::empty());
    translator.expression(&expr)
}

fn conjuncts_of(formula: &Formula, out: &mut Vec<Formula>) {
    match &*formula.inner() {
        FormulaInner::Binary {
            left,
            op: FormulaBinaryOp::And,
            right,
        } => {
            conjuncts_of(left, out);
            conjuncts_of(right, out);
        }
        FormulaInner::Nary {
            op: FormulaBinaryOp::And,
            formulas,
        } => {
            for f in formulas {
                conjuncts_of(f, out);
            }
        }
        _ => out.push(formula.clone()),
    }
}

#[derive(PartialEq, Eq, Hash)]
enum LeafKey {
    Relation(Relation),
    Constant(ConstantExpr),
}

struct Fol2NumTranslator<'a> {
    interpreter: &'a LeafInterpreter,
    factory: Rc<NumericFactory>,
    env: Environment,
    cache: TranslationCache,
    leaf_cache: FxHashMap<LeafKey, NumericMatrix>,
    fixed_point_eq: Vec<BoolValue>,
}

impl<'a> Fol2NumTranslator<'a> {
    fn new(interpreter: &'a LeafInterpreter, cache: TranslationCache) -> Self {
        Self {
            interpreter,
            factory: interpreter.factory().clone(),
            env: Environment::empty(),
            cache,
            leaf_cache: FxHashMap::default(),
            fixed_point_eq: Vec::new(),
        }
    }

    fn formula(&mut self, formula: &Formula) -> Result<BoolValue, TranslationError> {
        if let Some(cached) = self.cache.lookup_formula(formula, &self.env) {
            return Ok(cached);
        }
        let f = self.factory.clone();
        let inner = formula.inner();
        let ret = match &*inner {
            FormulaInner::Constant(b) => BoolValue::Constant(*b),

            FormulaInner::Binary { left, op, right } => {
                let l = self.formula(left)?;
                let r = self.formula(right)?;
                match op {
                    FormulaBinaryOp::And => f.and(&l, &r),
                    FormulaBinaryOp::Or => f.or(&l, &r),
                    FormulaBinaryOp::Implies => f.implies(&l, &r),
                    FormulaBinaryOp::Iff => f.iff(&l, &r),
                }
            }

            FormulaInner::Nary { op, formulas } => {
                let mut translated = Vec::with_capacity(formulas.len());
                let mut short_circuit = None;
                for child in formulas {
                    let value = self.formula(child)?;
                    match op {
                        FormulaBinaryOp::And if value.is_false() => {
                            short_circuit = Some(BoolValue::FALSE);
                            break;
                        }
                        FormulaBinaryOp::Or if value.is_true() => {
                            short_circuit = Some(BoolValue::TRUE);
                            break;
                        }
                        _ => translated.push(value),
                    }
                }
                match short_circuit {
                    Some(v) => v,
                    None => match op {
                        FormulaBinaryOp::And => f.and_all(translated),
                        FormulaBinaryOp::Or => f.or_all(translated),
                        _ => unreachable!("n-ary formulas are conjunctions or disjunctions"),
                    },
                }
            }

            FormulaInner::Not(body) => {
                self.env.negate();
                let value = self.formula(body);
                self.env.negate();
                f.not(&value?)
            }

            FormulaInner::Comparison { left, op, right } => {
                let l = self.expression(left)?;
                let r = self.expression(right)?;
                match op {
                    crate::ast::CompareOp::Equals => l.eq(&r, &f),
                    crate::ast::CompareOp::Subset => l.subset(&r, &f),
                    crate::ast::CompareOp::Lt => l.lt(&r, &f),
                    crate::ast::CompareOp::Lte => l.lte(&r, &f),
                    crate::ast::CompareOp::Gt => l.gt(&r, &f),
                    crate::ast::CompareOp::Gte => l.gte(&r, &f),
                }
            }

            FormulaInner::Multiplicity { mult, expr } => {
                let m = self.expression(expr)?;
                match mult {
                    Multiplicity::Some => m.some(&f),
                    Multiplicity::No => m.none(&f),
                    Multiplicity::One => m.one(&f),
                    Multiplicity::Lone => m.lone(&f),
                    Multiplicity::Set => {
                        unreachable!("set multiplicity does not form a formula")
                    }
                }
            }

            FormulaInner::Quantified {
                quantifier,
                decls,
                body,
            } => match quantifier {
                Quantifier::All => {
                    let mut acc = Vec::new();
                    let mut short = false;
                    self.forall(decls, body, 0, BoolValue::FALSE, &mut acc, &mut short)?;
                    if short {
                        BoolValue::FALSE
                    } else {
                        f.and_all(acc)
                    }
                }
                Quantifier::Some => {
                    let mut acc = Vec::new();
                    let mut short = false;
                    self.exists(decls, body, 0, BoolValue::TRUE, &mut acc, &mut short)?;
                    if short {
                        BoolValue::TRUE
                    } else {
                        f.or_all(acc)
                    }
                }
            },
        };
        self.cache.cache_formula(formula, &ret, &self.env);
        Ok(ret)
    }

    fn expression(&mut self, expr: &Expression) -> Result<NumericMatrix, TranslationError> {
        if let Some(cached) = self.cache.lookup_expr(expr, &self.env) {
            return Ok(cached);
        }
        let f = self.factory.clone();
        let inner = expr.inner();
        let ret = match &*inner {
            ExpressionInner::Relation(r) => {
                let key = LeafKey::Relation(r.clone());
                match self.leaf_cache.get(&key) {
                    Some(m) => m.clone(),
                    None => {
                        let m = self.interpreter.interpret(r)?;
                        self.leaf_cache.insert(key, m.clone());
                        m
                    }
                }
            }

            ExpressionInner::Variable(v) => self.env.lookup(v).cloned().ok_or_else(|| {
                TranslationError::UnboundLeaf(format!("unbound variable: {}", v))
            })?,

            ExpressionInner::Constant(c) => {
                let key = LeafKey::Constant(*c);
                match self.leaf_cache.get(&key) {
                    Some(m) => m.clone(),
                    None => {
                        let m = self.interpreter.interpret_constant(*c);
                        self.leaf_cache.insert(key, m.clone());
                        m
                    }
                }
            }

            ExpressionInner::NumConstant(n) => {
                let size = self.interpreter.universe().size();
                f.constant_matrix(
                    Dimensions::square(size, 1),
                    (0..size).collect(),
                    f.constant(*n),
                )
            }

            ExpressionInner::Binary { left, op, right } => {
                let l = self.expression(left)?;
                let r = self.expression(right)?;
                match op {
                    ExprBinaryOp::Union => l.union(&r, &f)?,
                    ExprBinaryOp::Intersection => l.intersection(&r, &f)?,
                    ExprBinaryOp::Difference => l.difference(&r, &f)?,
                    ExprBinaryOp::Minus => l.minus(&r, &f),
                    ExprBinaryOp::Override => l.override_with(&r, &f),
                    ExprBinaryOp::Join => l.dot(&r, &f)?,
                    ExprBinaryOp::MultiJoin => l.multi_dot(&r, &f),
                    ExprBinaryOp::Product => l.cross(&r, &f)?,
                    ExprBinaryOp::Addition => l.plus(&r, &f),
                    ExprBinaryOp::HadamardProduct => l.product(&r, &f),
                    ExprBinaryOp::HadamardDivision => l.divide(&r, &f)?,
                    ExprBinaryOp::Modulo => l.modulo(&r, &f)?,
                    ExprBinaryOp::LeftIntersection => l.left_intersection(&r, &f),
                    ExprBinaryOp::RightIntersection => l.right_intersection(&r, &f),
                    ExprBinaryOp::Domain => l.domain(&r, &f),
                    ExprBinaryOp::Range => l.range(&r, &f),
                    ExprBinaryOp::KhatriRao => l.khatri_rao(&r, &f),
                    ExprBinaryOp::Scalar => r.scale(&l.get_first(), &f),
                    ExprBinaryOp::AlphaCut => r.alpha_cut(&l.get_first(), &f),
                }
            }

            ExpressionInner::Nary { op, exprs } => {
                let mut acc = self.expression(&exprs[0])?;
                for e in &exprs[1..] {
                    let m = self.expression(e)?;
                    acc = match op {
                        ExprBinaryOp::Union => acc.union(&m, &f)?,
                        ExprBinaryOp::Intersection => acc.intersection(&m, &f)?,
                        ExprBinaryOp::Addition => acc.plus(&m, &f),
                        ExprBinaryOp::Product => acc.cross(&m, &f)?,
                        ExprBinaryOp::HadamardProduct => acc.product(&m, &f),
                        _ => unreachable!("unsupported n-ary operator"),
                    };
                }
                acc
            }

            ExpressionInner::Unary { op, expr } => {
                let child = self.expression(expr)?;
                match op {
                    ExprUnaryOp::Transpose => child.transpose(),
                    ExprUnaryOp::Closure => child.closure(&f)?,
                    ExprUnaryOp::ReflexiveClosure => {
                        child.reflexive_closure(&f, &mut self.fixed_point_eq)?
                    }
                    ExprUnaryOp::Drop => {
                        if child.is_boolean() {
                            child
                        } else {
                            child.drop(&f)
                        }
                    }
                    ExprUnaryOp::Neg => child.negate(&f),
                    ExprUnaryOp::Abs => child.abs(&f),
                    ExprUnaryOp::Sgn => child.signum(&f),
                    ExprUnaryOp::Cardinality => child.cardinality(&f),
                }
            }

            ExpressionInner::Comprehension { decls, formula } => {
                let size = self.interpreter.universe().size();
                let dims = Dimensions::checked_square(size, decls.size()).ok_or_else(|| {
                    TranslationError::CapacityExceeded(format!(
                        "comprehension over {} declarations",
                        decls.size()
                    ))
                })?;
                let mut matrix = f.boolean_matrix(dims);
                self.comprehension(decls, formula, 0, BoolValue::TRUE, 0, &mut matrix)?;
                matrix
            }

            ExpressionInner::QtComprehension { decls, body } => {
                let size = self.interpreter.universe().size();
                let dims = Dimensions::checked_square(size, decls.size()).ok_or_else(|| {
                    TranslationError::CapacityExceeded(format!(
                        "comprehension over {} declarations",
                        decls.size()
                    ))
                })?;
                let mut matrix = f.matrix(dims);
                self.qt_comprehension(decls, body, 0, BoolValue::TRUE, 0, &mut matrix)?;
                matrix
            }

            ExpressionInner::If {
                condition,
                then_expr,
                else_expr,
            } => {
                let c = self.formula(condition)?;
                let t = self.expression(then_expr)?;
                let e = self.expression(else_expr)?;
                t.choice(&c, &e, &f)
            }

            ExpressionInner::Project { expr, columns } => {
                let mut cols = Vec::with_capacity(columns.len());
                for c in columns {
                    cols.push(self.expression(c)?.get_first());
                }
                self.expression(expr)?.project(&cols, &f)
            }

            ExpressionInner::Sum { decls, body } => {
                let mut values = Vec::new();
                self.sum(decls, body, 0, BoolValue::TRUE, &mut values)?;

                // the declared tuple space gives the broadcast shape
                let mut shape: Option<NumericMatrix> = None;
                for decl in decls.iter() {
                    let dm = self.decl_matrix(decl)?;
                    shape = Some(match shape {
                        None => dm,
                        Some(s) => s.cross(&dm, &f)?,
                    });
                }
                let shape = shape.ok_or_else(|| {
                    TranslationError::HigherOrder("sum without declarations".to_string())
                })?;

                let total = f.plus_all(values);
                NumericMatrix::homogeneous(
                    shape.dimensions().clone(),
                    shape.dense_indices(),
                    total,
                )
            }
        };
        self.cache.cache_expr(expr, &ret, &self.env);
        Ok(ret)
    }

    fn decl_matrix(&mut self, decl: &Decl) -> Result<NumericMatrix, TranslationError> {
        if decl.multiplicity() != Multiplicity::One {
            return Err(TranslationError::HigherOrder(format!(
                "declaration of {} is not 'one'",
                decl.variable()
            )));
        }
        self.expression(decl.expression())
    }

    fn set_binding(&mut self, decl: &Decl, index: usize, value: NumValue) {
        if let Some(m) = self.env.lookup_mut(decl.variable()) {
            m.set(index, value);
        }
    }

    /// `all decls | body`: one conjunct per tuple assignment,
    /// `declConstraints || body`, short-circuiting on a false conjunct.
    fn forall(
        &mut self,
        decls: &Decls,
        body: &Formula,
        current: usize,
        constraints: BoolValue,
        acc: &mut Vec<BoolValue>,
        short: &mut bool,
    ) -> Result<(), TranslationError> {
        if *short {
            return Ok(());
        }
        let f = self.factory.clone();

        if current == decls.size() {
            let circuit = f.or(&constraints, &self.formula(body)?);
            if circuit.is_false() {
                *short = true;
            } else if !circuit.is_true() {
                acc.push(circuit);
            }
            return Ok(());
        }

        let decl = decls.get(current);
        let decl_matrix = self.decl_matrix(decl)?;
        let ground = if decl_matrix.is_boolean() {
            f.boolean_matrix(decl_matrix.dimensions().clone())
        } else {
            f.matrix(decl_matrix.dimensions().clone())
        };
        self.env
            .extend(decl.variable().clone(), ground, Quantifier::All);
        for (index, value) in decl_matrix.entries() {
            self.set_binding(decl, index, value.clone());
            let absent = f.not(&f.drop_value(&value));
            self.forall(decls, body, current + 1, f.or(&absent, &constraints), acc, short)?;
            self.set_binding(decl, index, NumValue::ZERO);
        }
        self.env.pop();
        Ok(())
    }

    /// `some decls | body`: one disjunct per tuple assignment,
    /// `declConstraints && body`, short-circuiting on a true disjunct.
    fn exists(
        &mut self,
        decls: &Decls,
        body: &Formula,
        current: usize,
        constraints: BoolValue,
        acc: &mut Vec<BoolValue>,
        short: &mut bool,
    ) -> Result<(), TranslationError> {
        if *short {
            return Ok(());
        }
        let f = self.factory.clone();

        if current == decls.size() {
            let circuit = f.and(&constraints, &self.formula(body)?);
            if circuit.is_true() {
                *short = true;
            } else if !circuit.is_false() {
                acc.push(circuit);
            }
            return Ok(());
        }

        let decl = decls.get(current);
        let decl_matrix = self.decl_matrix(decl)?;
        let ground = if decl_matrix.is_boolean() {
            f.boolean_matrix(decl_matrix.dimensions().clone())
        } else {
            f.matrix(decl_matrix.dimensions().clone())
        };
        self.env
            .extend(decl.variable().clone(), ground, Quantifier::Some);
        for (index, value) in decl_matrix.entries() {
            self.set_binding(decl, index, value.clone());
            let present = f.drop_value(&value);
            self.exists(decls, body, current + 1, f.and(&present, &constraints), acc, short)?;
            self.set_binding(decl, index, NumValue::ZERO);
        }
        self.env.pop();
        Ok(())
    }

    /// `{ decls | formula }`: sets each tuple's cell to
    /// `declConstraints && formula`, lifted to `{0,1}`.
    fn comprehension(
        &mut self,
        decls: &Decls,
        body: &Formula,
        current: usize,
        constraints: BoolValue,
        partial_index: usize,
        matrix: &mut NumericMatrix,
    ) -> Result<(), TranslationError> {
        let f = self.factory.clone();

        if current == decls.size() {
            let included = f.and(&constraints, &self.formula(body)?);
            matrix.set(partial_index, f.guard(&included, &NumValue::ONE));
            return Ok(());
        }

        let decl = decls.get(current);
        let decl_matrix = self.decl_matrix(decl)?;
        let position = self
            .interpreter
            .universe()
            .size()
            .pow((decls.size() - current - 1) as u32);
        let ground = f.boolean_matrix(decl_matrix.dimensions().clone());
        self.env
            .extend(decl.variable().clone(), ground, Quantifier::Some);
        for (index, value) in decl_matrix.entries() {
            self.set_binding(decl, index, NumValue::ONE);
            self.comprehension(
                decls,
                body,
                current + 1,
                f.and(&f.drop_value(&value), &constraints),
                partial_index + index * position,
                matrix,
            )?;
            self.set_binding(decl, index, NumValue::ZERO);
        }
        self.env.pop();
        Ok(())
    }

    /// `{ decls | e }`: stores the numeric body under the declaration
    /// guard at each tuple.
    fn qt_comprehension(
        &mut self,
        decls: &Decls,
        body: &Expression,
        current: usize,
        constraints: BoolValue,
        partial_index: usize,
        matrix: &mut NumericMatrix,
    ) -> Result<(), TranslationError> {
        let f = self.factory.clone();

        if current == decls.size() {
            let value = self.expression(body)?.get_first();
            matrix.set(partial_index, f.guard(&constraints, &value));
            return Ok(());
        }

        let decl = decls.get(current);
        let decl_matrix = self.decl_matrix(decl)?;
        let position = self
            .interpreter
            .universe()
            .size()
            .pow((decls.size() - current - 1) as u32);
        let ground = f.matrix(decl_matrix.dimensions().clone());
        self.env
            .extend(decl.variable().clone(), ground, Quantifier::Some);
        for (index, value) in decl_matrix.entries() {
            self.set_binding(decl, index, NumValue::ONE);
            self.qt_comprehension(
                decls,
                body,
                current + 1,
                f.and(&f.drop_value(&value), &constraints),
                partial_index + index * position,
                matrix,
            )?;
            self.set_binding(decl, index, NumValue::ZERO);
        }
        self.env.pop();
        Ok(())
    }

    /// `sum decls | e`: collects one guarded scalar summand per tuple
    /// assignment.
    fn sum(
        &mut self,
        decls: &Decls,
        body: &Expression,
        current: usize,
        constraints: BoolValue,
        values: &mut Vec<NumValue>,
    ) -> Result<(), TranslationError> {
        let f = self.factory.clone();

        if current == decls.size() {
            let summand = self.expression(body)?.get_first();
            values.push(f.guard(&constraints, &summand));
            return Ok(());
        }

        let decl = decls.get(current);
        let decl_matrix = self.decl_matrix(decl)?;
        let ground = f.matrix(decl_matrix.dimensions().clone());
        self.env
            .extend(decl.variable().clone(), ground, Quantifier::Some);
        for (index, value) in decl_matrix.entries() {
            self.set_binding(decl, index, value.clone());
            self.sum(
                decls,
                body,
                current + 1,
                f.and(&f.drop_value(&value), &constraints),
                values,
            )?;
            self.set_binding(decl, index, NumValue::ZERO);
        }
        self.env.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, Variable};
    use crate::config::Tnorm;
    use crate::instance::{Instance, TupleSet, Universe};
    use crate::num::Number;

    fn fuzzy_options() -> Options {
        Options::fuzzy(Tnorm::Godelian)
    }

    fn weighted_instance(
        universe: &Universe,
        relation: &Relation,
        cells: &[(&str, f64)],
    ) -> Instance {
        let mut tuples = TupleSet::empty(universe.clone(), 1);
        for &(atom, w) in cells {
            tuples.add_weighted(&[atom], Number::Real(w)).unwrap();
        }
        let mut instance = Instance::new(universe.clone());
        instance.add(relation, tuples).unwrap();
        instance
    }

    #[test]
    fn constant_formula_evaluation() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let instance = weighted_instance(&u, &r, &[("A", 0.5)]);
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        let some = evaluate_formula(&Expression::from(&r).some(), &interpreter).unwrap();
        assert!(some.is_true());

        let none = evaluate_formula(&Expression::from(&r).no(), &interpreter).unwrap();
        assert!(none.is_false());
    }

    #[test]
    fn cardinality_sums_weights() {
        let u = Universe::new(&["a", "b", "c"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let instance = weighted_instance(&u, &r, &[("a", 0.5), ("b", 0.2)]);
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        let card = evaluate_expression(&Expression::from(&r).cardinality(), &interpreter).unwrap();
        let total = card.get_first().as_number().unwrap().as_f64();
        assert!((total - 0.7).abs() < 1e-12);
    }

    #[test]
    fn quantifier_grounds_over_bound_support() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let person = Relation::unary("Person");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples.add(&["A"]).unwrap();
        tuples.add(&["B"]).unwrap();
        let mut instance = Instance::new(u.clone());
        instance.add(&person, tuples).unwrap();
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        // all x: Person | x in Person
        let x = Variable::unary("x");
        let formula = Formula::forall(
            crate::ast::Decls::from(Decl::one_of(x.clone(), Expression::from(&person))),
            Expression::from(&x).in_set(Expression::from(&person)),
        );
        assert!(evaluate_formula(&formula, &interpreter).unwrap().is_true());

        // some x: Person | x !in Person
        let y = Variable::unary("y");
        let negative = Formula::exists(
            crate::ast::Decls::from(Decl::one_of(y.clone(), Expression::from(&person))),
            Expression::from(&y).in_set(Expression::from(&person)).not(),
        );
        assert!(evaluate_formula(&negative, &interpreter).unwrap().is_false());
    }

    #[test]
    fn comprehension_collects_satisfying_tuples() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let instance = weighted_instance(&u, &r, &[("A", 0.9)]);
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        // { x: R | some R } — every tuple of R's support qualifies
        let x = Variable::unary("x");
        let comp = Expression::comprehension(
            crate::ast::Decls::from(Decl::one_of(x, Expression::from(&r))),
            Expression::from(&r).some(),
        );
        let m = evaluate_expression(&comp, &interpreter).unwrap();
        assert!(m.get(0).is_one());
        assert!(m.get(1).is_zero());
    }

    #[test]
    fn sum_accumulates_guarded_bodies() {
        let u = Universe::new(&["a", "b"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let instance = weighted_instance(&u, &r, &[("a", 0.25), ("b", 0.5)]);
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        // sum x: R | #x — each binding contributes its own tuple's weight
        let x = Variable::unary("x");
        let sum = Expression::sum(
            crate::ast::Decls::from(Decl::one_of(x.clone(), Expression::from(&r))),
            Expression::from(&x).cardinality(),
        );
        let m = evaluate_expression(&sum, &interpreter).unwrap();
        let total = m.get_first().as_number().unwrap().as_f64();
        assert!((total - 0.75).abs() < 1e-12);
    }

    #[test]
    fn unbound_variable_is_a_fault() {
        let u = Universe::new(&["A"]).unwrap();
        let instance = Instance::new(u);
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        let x = Variable::unary("x");
        let err = evaluate_expression(&Expression::from(&x), &interpreter);
        assert!(matches!(err, Err(TranslationError::UnboundLeaf(_))));
    }

    #[test]
    fn higher_order_declaration_is_a_fault() {
        let u = Universe::new(&["A"]).unwrap();
        let person = Relation::unary("Person");
        let mut tuples = TupleSet::empty(u.clone(), 1);
        tuples.add(&["A"]).unwrap();
        let mut instance = Instance::new(u);
        instance.add(&person, tuples).unwrap();
        let interpreter = LeafInterpreter::exact_instance(&instance, &fuzzy_options()).unwrap();

        let x = Variable::unary("x");
        let formula = Formula::forall(
            crate::ast::Decls::from(Decl::new(
                x,
                Multiplicity::Set,
                Expression::from(&person),
            )),
            Formula::TRUE,
        );
        assert!(matches!(
            evaluate_formula(&formula, &interpreter),
            Err(TranslationError::HigherOrder(_))
        ));
    }

    #[test]
    fn trivially_constant_circuits_are_detected() {
        let u = Universe::new(&["A"]).unwrap();
        let r = Relation::unary("R");
        let ts = TupleSet::of(u.clone(), &[&["A"]]).unwrap();
        let mut bounds = Bounds::new(u);
        bounds.bound_exactly(&r, ts).unwrap();

        let sat = translate(&Expression::from(&r).some(), &bounds, &Options::integer()).unwrap();
        assert_eq!(sat.constant_value(), Some(true));

        let unsat = translate(&Expression::from(&r).no(), &bounds, &Options::integer()).unwrap();
        assert_eq!(unsat.constant_value(), Some(false));
    }
}

//! Circuit-to-SMT-LIB serialization
//!
//! Each allocated variable becomes a declared function symbol (`v<label>`,
//! plus a paired `b<label>` Bool for `{0,1}`-valued variables); every gate
//! is emitted once as a `define-fun` in dependency order and referenced by
//! name thereafter, so shared subcircuits stay shared on the solver side.
//! Assertion order is deterministic: the root conjuncts (fixed-point
//! equations included), the per-variable constraints, then the single
//! division-by-zero guard.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;

use super::SmtSpecification;
use crate::config::{Options, QuantitativeType};
use crate::error::TranslationError;
use crate::num::{
    AritOp, BoolGateKind, BoolValue, ChoiceOp, CmpOp, DivisionDetector, NumUnaryOp, NumValue,
    VarConstraint,
};
use crate::translator::CircuitTranslation;

/// Serializes a circuit translation into an SMT-LIB specification.
pub fn emit(
    translation: &CircuitTranslation,
    options: &Options,
) -> Result<SmtSpecification, TranslationError> {
    let factory = translation.interpreter.factory();
    let fuzzy = options.domain == QuantitativeType::Fuzzy;
    let logic = if fuzzy { "QF_UFLRA" } else { "QF_UFLIA" };
    let num_sort = if fuzzy { "Real" } else { "Int" };

    let mut serializer = Serializer {
        fuzzy,
        defs: String::new(),
        defined: FxHashSet::default(),
    };

    // serialize the roots and the guard first so every define-fun lands
    // ahead of the assertions referencing it
    let mut root_terms = Vec::with_capacity(translation.roots.len());
    for root in &translation.roots {
        root_terms.push(serializer.boolean(root));
    }
    let detector = DivisionDetector::detect(&translation.roots);
    let guard = detector.division_by_zero(factory);
    let guard_term = if guard.is_false() {
        None
    } else {
        Some(serializer.boolean(&guard))
    };

    let mut declarations = String::new();
    let mut constraints = Vec::new();
    let mut num_function_symbols = FxHashMap::default();
    let mut bool_function_symbols = FxHashMap::default();
    let mut num_variables = 0usize;

    for var in factory.variables() {
        let label = var.label();
        let name = format!("v{}", label);
        let _ = writeln!(declarations, "(declare-fun {} () {})", name, num_sort);
        num_variables += 1;

        if var.allowed_values().is_some() {
            // {0,1}-paired variable: declare the boolean twin and assert
            // the pairing invariant
            let bool_name = format!("b{}", label);
            let _ = writeln!(declarations, "(declare-fun {} () Bool)", bool_name);
            num_variables += 1;
            constraints.push(format!(
                "(= {} (ite {} {} {}))",
                name,
                bool_name,
                literal(fuzzy, 1.0),
                literal(fuzzy, 0.0)
            ));
            bool_function_symbols.insert(label, bool_name);
        } else if fuzzy {
            constraints.push(format!(
                "(and (>= {} {}) (<= {} {}))",
                name,
                literal(fuzzy, 0.0),
                name,
                literal(fuzzy, 1.0)
            ));
        } else if let Some(max) = options.max_weight {
            constraints.push(format!("(and (>= {} 0) (<= {} {}))", name, name, max));
        }

        match var.constraint() {
            VarConstraint::NonZero => {
                constraints.push(format!("(not (= {} {}))", name, literal(fuzzy, 0.0)));
            }
            VarConstraint::Zero => {
                constraints.push(format!("(= {} {})", name, literal(fuzzy, 0.0)));
            }
            VarConstraint::Free => {}
        }
        if let Some(max) = var.max_value() {
            constraints.push(format!("(<= {} {})", name, literal(fuzzy, max.as_f64())));
        }
        num_function_symbols.insert(label, name);
    }

    let mut text = String::new();
    text.push_str(&declarations);
    text.push_str(&serializer.defs);

    let mut num_assertions = 0usize;
    for term in &root_terms {
        if term == "true" {
            continue;
        }
        let _ = writeln!(text, "(assert {})", term);
        num_assertions += 1;
    }
    for constraint in &constraints {
        let _ = writeln!(text, "(assert {})", constraint);
        num_assertions += 1;
    }
    if let Some(guard_term) = guard_term {
        let _ = writeln!(text, "(assert (not {}))", guard_term);
        num_assertions += 1;
    }

    Ok(SmtSpecification::new(
        logic,
        text,
        num_function_symbols,
        bool_function_symbols,
        num_variables,
        num_assertions,
    ))
}

/// A numeric literal of the active domain.
fn literal(fuzzy: bool, value: f64) -> String {
    if fuzzy {
        real_literal(value)
    } else {
        int_literal(value as i64)
    }
}

fn int_literal(value: i64) -> String {
    if value < 0 {
        format!("(- {})", -value)
    } else {
        value.to_string()
    }
}

/// A plain decimal literal; never scientific notation.
fn real_literal(value: f64) -> String {
    if value < 0.0 {
        return format!("(- {})", real_literal(-value));
    }
    let mut s = format!("{:.16}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

struct Serializer {
    fuzzy: bool,
    defs: String,
    defined: FxHashSet<(char, i32)>,
}

impl Serializer {
    fn num_sort(&self) -> &'static str {
        if self.fuzzy {
            "Real"
        } else {
            "Int"
        }
    }

    fn define(&mut self, namespace: char, label: i32, sort: &str, body: String) -> String {
        let name = format!("{}{}", namespace, label);
        if self.defined.insert((namespace, label)) {
            let _ = writeln!(self.defs, "(define-fun {} () {} {})", name, sort, body);
        }
        name
    }

    fn num(&mut self, value: &NumValue) -> String {
        match value {
            NumValue::Constant(c) => {
                let n = c.value();
                if self.fuzzy {
                    real_literal(n.as_f64())
                } else {
                    int_literal(n.as_f64() as i64)
                }
            }
            NumValue::Variable(v) => format!("v{}", v.label()),
            NumValue::Binary(b) => self.num(b.to_numeric()),
            NumValue::Arit(g) => {
                if self.defined.contains(&('n', g.label())) {
                    return format!("n{}", g.label());
                }
                let op = match g.op() {
                    AritOp::Plus => "+",
                    AritOp::Minus => "-",
                    AritOp::Times => "*",
                    AritOp::Div => {
                        if self.fuzzy {
                            "/"
                        } else {
                            "div"
                        }
                    }
                    AritOp::Mod => "mod",
                };
                let inputs: Vec<String> = g.inputs().iter().map(|v| self.num(v)).collect();
                let body = format!("({} {})", op, inputs.join(" "));
                self.define('n', g.label(), self.num_sort(), body)
            }
            NumValue::Choice(g) => {
                if self.defined.contains(&('n', g.label())) {
                    return format!("n{}", g.label());
                }
                let left = self.num(g.left());
                let right = self.num(g.right());
                let cmp = match g.op() {
                    ChoiceOp::Min => "<=",
                    ChoiceOp::Max => ">=",
                };
                let body = format!("(ite ({} {} {}) {} {})", cmp, left, right, left, right);
                self.define('n', g.label(), self.num_sort(), body)
            }
            NumValue::Ite(g) => {
                if self.defined.contains(&('n', g.label())) {
                    return format!("n{}", g.label());
                }
                let condition = self.boolean(g.condition());
                let then_value = self.num(g.then_value());
                let else_value = self.num(g.else_value());
                let body = format!("(ite {} {} {})", condition, then_value, else_value);
                self.define('n', g.label(), self.num_sort(), body)
            }
            NumValue::Unary(g) => {
                if self.defined.contains(&('n', g.label())) {
                    return format!("n{}", g.label());
                }
                let input = self.num(g.input());
                let zero = literal(self.fuzzy, 0.0);
                let body = match g.op() {
                    NumUnaryOp::Neg => format!("(- {})", input),
                    NumUnaryOp::Abs => {
                        format!("(ite (>= {} {}) {} (- {}))", input, zero, input, input)
                    }
                    NumUnaryOp::Sgn => format!(
                        "(ite (> {} {}) {} (ite (< {} {}) (- {}) {}))",
                        input,
                        zero,
                        literal(self.fuzzy, 1.0),
                        input,
                        zero,
                        literal(self.fuzzy, 1.0),
                        zero
                    ),
                };
                self.define('n', g.label(), self.num_sort(), body)
            }
        }
    }

    fn boolean(&mut self, value: &BoolValue) -> String {
        match value {
            BoolValue::Constant(true) => "true".to_string(),
            BoolValue::Constant(false) => "false".to_string(),
            BoolValue::Variable(v) => format!("b{}", v.label()),
            BoolValue::Cmp(c) => {
                if self.defined.contains(&('p', c.label())) {
                    return format!("p{}", c.label());
                }
                let left = self.num(c.left());
                let right = self.num(c.right());
                let body = match c.op() {
                    CmpOp::Eq => format!("(= {} {})", left, right),
                    CmpOp::Neq => format!("(not (= {} {}))", left, right),
                    CmpOp::Lt => format!("(< {} {})", left, right),
                    CmpOp::Lte => format!("(<= {} {})", left, right),
                    CmpOp::Gt => format!("(> {} {})", left, right),
                    CmpOp::Gte => format!("(>= {} {})", left, right),
                };
                self.define('p', c.label(), "Bool", body)
            }
            BoolValue::Gate(g) => {
                if self.defined.contains(&('p', g.label())) {
                    return format!("p{}", g.label());
                }
                let body = match g.kind() {
                    BoolGateKind::And(inputs) => {
                        let parts: Vec<String> = inputs.iter().map(|v| self.boolean(v)).collect();
                        format!("(and {})", parts.join(" "))
                    }
                    BoolGateKind::Or(inputs) => {
                        let parts: Vec<String> = inputs.iter().map(|v| self.boolean(v)).collect();
                        format!("(or {})", parts.join(" "))
                    }
                    BoolGateKind::Not(input) => format!("(not {})", self.boolean(input)),
                    BoolGateKind::Ite {
                        condition,
                        then_value,
                        else_value,
                    } => format!(
                        "(ite {} {} {})",
                        self.boolean(condition),
                        self.boolean(then_value),
                        self.boolean(else_value)
                    ),
                };
                self.define('p', g.label(), "Bool", body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, Relation};
    use crate::config::Tnorm;
    use crate::instance::{Bounds, TupleSet, Universe};

    fn simple_problem(options: &Options) -> SmtSpecification {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let mut bounds = Bounds::new(u.clone());
        bounds
            .bound(
                &r,
                TupleSet::empty(u.clone(), 1),
                TupleSet::of(u, &[&["A"], &["B"]]).unwrap(),
            )
            .unwrap();
        let translation =
            crate::translator::translate(&Expression::from(&r).some(), &bounds, options).unwrap();
        emit(&translation, options).unwrap()
    }

    #[test]
    fn integer_problems_use_uflia() {
        let spec = simple_problem(&Options::integer());
        assert_eq!(spec.logic(), "QF_UFLIA");
        assert!(spec.assertions().contains("(declare-fun v1 () Int)"));
        assert!(spec.assertions().contains("(declare-fun v2 () Int)"));
        assert!(spec.num_variables() >= 2);
        assert!(spec.num_assertions() >= 1);
    }

    #[test]
    fn fuzzy_problems_use_uflra_and_range_constraints() {
        let spec = simple_problem(&Options::fuzzy(Tnorm::Godelian));
        assert_eq!(spec.logic(), "QF_UFLRA");
        assert!(spec.assertions().contains("(declare-fun v1 () Real)"));
        assert!(spec
            .assertions()
            .contains("(assert (and (>= v1 0.0) (<= v1 1.0)))"));
    }

    #[test]
    fn max_weight_bounds_integer_variables() {
        let mut options = Options::integer();
        options.max_weight = Some(7);
        let spec = simple_problem(&options);
        assert!(spec
            .assertions()
            .contains("(assert (and (>= v1 0) (<= v1 7)))"));
    }

    #[test]
    fn binary_pairing_for_boolean_relations() {
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
        let options = Options::integer();
        let translation =
            crate::translator::translate(&Expression::from(&r).some(), &bounds, &options).unwrap();
        let spec = emit(&translation, &options).unwrap();

        assert!(spec.assertions().contains("(declare-fun b1 () Bool)"));
        assert!(spec.assertions().contains("(assert (= v1 (ite b1 1 0)))"));
        assert_eq!(spec.bool_function_symbols().get(&1).map(String::as_str), Some("b1"));
    }

    #[test]
    fn real_literals_are_plain_decimals() {
        assert_eq!(real_literal(0.5), "0.5");
        assert_eq!(real_literal(1.0), "1.0");
        assert_eq!(real_literal(0.0000001), "0.0000001");
        assert_eq!(real_literal(-0.25), "(- 0.25)");
        assert_eq!(int_literal(-5), "(- 5)");
    }

    #[test]
    fn shared_gates_are_defined_once() {
        let u = Universe::new(&["A", "B"]).unwrap();
        let r = Relation::quantitative_unary("R");
        let mut bounds = Bounds::new(u.clone());
        bounds
            .bound(
                &r,
                TupleSet::empty(u.clone(), 1),
                TupleSet::of(u, &[&["A"], &["B"]]).unwrap(),
            )
            .unwrap();
        // `some R && some R` shares the whole submcircuit
        let formula = Expression::from(&r)
            .some()
            .and(Expression::from(&r).some());
        let options = Options::integer();
        let translation = crate::translator::translate(&formula, &bounds, &options).unwrap();
        let spec = emit(&translation, &options).unwrap();

        let defines = spec
            .assertions()
            .matches("(define-fun p")
            .count();
        let asserts = spec.assertions().matches("(assert p").count();
        assert!(defines >= 1);
        assert!(asserts >= 1);
    }
}

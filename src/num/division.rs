//! Division detection over numeric circuits
//!
//! A pass over the root circuits that records every division gate: its
//! denominator and the primary variables feeding both sides of the
//! fraction. From those records it builds the single division-by-zero
//! guard the SMT layer asserts — no model may assign zero to a live
//! denominator.

use rustc_hash::FxHashSet;

use super::{AritOp, BoolGateKind, BoolValue, NumValue, NumericFactory};

struct Fraction {
    denominator: NumValue,
    variables: Vec<NumValue>,
}

/// Gathers the details of each division occurring in a circuit.
pub struct DivisionDetector {
    fractions: Vec<Fraction>,
    visited: FxHashSet<i32>,
}

impl DivisionDetector {
    /// Scans the given root circuits for division gates.
    pub fn detect(roots: &[BoolValue]) -> Self {
        let mut detector = Self {
            fractions: Vec::new(),
            visited: FxHashSet::default(),
        };
        for root in roots {
            detector.visit_bool(root);
        }
        detector
    }

    /// True if the circuit contains at least one division.
    pub fn has_division(&self) -> bool {
        !self.fractions.is_empty()
    }

    /// The formula detecting division by zero: some fraction has a zero
    /// denominator while a primary variable feeding it is live.
    pub fn division_by_zero(&self, f: &NumericFactory) -> BoolValue {
        let mut div_by_zero = BoolValue::FALSE;
        for fraction in &self.fractions {
            let mut frac_zero = f.eq(&fraction.denominator, &NumValue::ZERO);
            if !fraction.variables.is_empty() {
                let live: Vec<BoolValue> = fraction
                    .variables
                    .iter()
                    .map(|v| f.neq(v, &NumValue::ZERO))
                    .collect();
                frac_zero = f.and(&frac_zero, &f.or_all(live));
            }
            div_by_zero = f.or(&div_by_zero, &frac_zero);
        }
        div_by_zero
    }

    fn visit_bool(&mut self, value: &BoolValue) {
        match value {
            BoolValue::Constant(_) | BoolValue::Variable(_) => {}
            BoolValue::Gate(g) => {
                if !self.visited.insert(g.label()) {
                    return;
                }
                match g.kind() {
                    BoolGateKind::And(inputs) | BoolGateKind::Or(inputs) => {
                        for input in inputs {
                            self.visit_bool(input);
                        }
                    }
                    BoolGateKind::Not(input) => self.visit_bool(input),
                    BoolGateKind::Ite {
                        condition,
                        then_value,
                        else_value,
                    } => {
                        self.visit_bool(condition);
                        self.visit_bool(then_value);
                        self.visit_bool(else_value);
                    }
                }
            }
            BoolValue::Cmp(c) => {
                if !self.visited.insert(c.label()) {
                    return;
                }
                self.visit_num(c.left());
                self.visit_num(c.right());
            }
        }
    }

    fn visit_num(&mut self, value: &NumValue) {
        match value {
            NumValue::Constant(_) | NumValue::Variable(_) => {}
            NumValue::Arit(g) => {
                if !self.visited.insert(g.label()) {
                    return;
                }
                if g.op() == AritOp::Div {
                    // inputs[0] is the numerator; each further input is a
                    // denominator of the (possibly chained) fraction
                    let mut variables = Vec::new();
                    collect_variables(&g.inputs()[0], &mut variables, &mut FxHashSet::default());
                    for denominator in &g.inputs()[1..] {
                        collect_variables(
                            denominator,
                            &mut variables,
                            &mut FxHashSet::default(),
                        );
                        self.fractions.push(Fraction {
                            denominator: denominator.clone(),
                            variables: variables.clone(),
                        });
                    }
                }
                for input in g.inputs() {
                    self.visit_num(input);
                }
            }
            NumValue::Choice(g) => {
                if !self.visited.insert(g.label()) {
                    return;
                }
                self.visit_num(g.left());
                self.visit_num(g.right());
            }
            NumValue::Ite(g) => {
                if !self.visited.insert(g.label()) {
                    return;
                }
                self.visit_bool(g.condition());
                self.visit_num(g.then_value());
                self.visit_num(g.else_value());
            }
            NumValue::Unary(g) => {
                if !self.visited.insert(g.label()) {
                    return;
                }
                self.visit_num(g.input());
            }
            NumValue::Binary(b) => {
                self.visit_num(b.to_numeric());
            }
        }
    }
}

/// Collects the variables occurring in a value's subtree.
fn collect_variables(value: &NumValue, out: &mut Vec<NumValue>, seen: &mut FxHashSet<i32>) {
    match value {
        NumValue::Constant(_) => {}
        NumValue::Variable(v) => {
            if seen.insert(v.label()) {
                out.push(value.clone());
            }
        }
        NumValue::Arit(g) => {
            if seen.insert(g.label()) {
                for input in g.inputs() {
                    collect_variables(input, out, seen);
                }
            }
        }
        NumValue::Choice(g) => {
            if seen.insert(g.label()) {
                collect_variables(g.left(), out, seen);
                collect_variables(g.right(), out, seen);
            }
        }
        NumValue::Ite(g) => {
            if seen.insert(g.label()) {
                collect_variables(g.then_value(), out, seen);
                collect_variables(g.else_value(), out, seen);
            }
        }
        NumValue::Unary(g) => {
            if seen.insert(g.label()) {
                collect_variables(g.input(), out, seen);
            }
        }
        NumValue::Binary(b) => collect_variables(b.to_numeric(), out, seen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::num::CmpOp;

    #[test]
    fn detects_divisions_behind_guards() {
        let f = NumericFactory::with_variables(&Options::integer(), 2);
        let a = NumValue::Variable(f.variable(1));
        let b = NumValue::Variable(f.variable(2));

        let quotient = f.divide(&a, &b).unwrap();
        let root = f.cmp(CmpOp::Gt, &quotient, &NumValue::ZERO);

        let detector = DivisionDetector::detect(&[root]);
        assert!(detector.has_division());

        let guard = detector.division_by_zero(&f);
        assert!(!guard.is_false());
        assert!(!guard.is_true());
    }

    #[test]
    fn no_divisions_means_constant_false_guard() {
        let f = NumericFactory::with_variables(&Options::integer(), 2);
        let a = NumValue::Variable(f.variable(1));
        let b = NumValue::Variable(f.variable(2));
        let root = f.eq(&f.plus(&a, &b), &NumValue::ZERO);

        let detector = DivisionDetector::detect(&[root]);
        assert!(!detector.has_division());
        assert!(detector.division_by_zero(&f).is_false());
    }
}

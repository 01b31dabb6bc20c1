//! Environment for variable bindings during translation
//!
//! A stack of frames, one per declaration in scope. Each frame binds a
//! variable to its ground-value matrix and records the quantifier that
//! introduced it, adjusted by the current negation polarity: entering a
//! negation flips the polarity, leaving it restores it.

use crate::ast::{Quantifier, Variable};
use crate::num::NumericMatrix;

struct Binding {
    variable: Variable,
    value: NumericMatrix,
    quantifier: Quantifier,
}

/// Stack-based environment for quantified variable bindings.
pub struct Environment {
    bindings: Vec<Binding>,
    negations: usize,
}

impl Environment {
    /// Creates an empty environment.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
            negations: 0,
        }
    }

    /// Pushes a binding for a quantifier scope. The recorded quantifier is
    /// flipped when the environment sits under an odd number of negations.
    pub fn extend(&mut self, variable: Variable, value: NumericMatrix, quantifier: Quantifier) {
        let quantifier = if self.negated() {
            quantifier.flipped()
        } else {
            quantifier
        };
        self.bindings.push(Binding {
            variable,
            value,
            quantifier,
        });
    }

    /// Pops the most recent binding.
    pub fn pop(&mut self) {
        self.bindings.pop();
    }

    /// Flips the negation polarity; called on entry to and exit from a
    /// negation.
    pub fn negate(&mut self) {
        self.negations = 1 - self.negations;
    }

    /// True under an odd number of negations.
    pub fn negated(&self) -> bool {
        self.negations % 2 == 1
    }

    /// Looks up a variable, innermost binding first.
    pub fn lookup(&self, variable: &Variable) -> Option<&NumericMatrix> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.variable == *variable)
            .map(|b| &b.value)
    }

    /// Looks up a variable mutably, innermost binding first.
    pub fn lookup_mut(&mut self, variable: &Variable) -> Option<&mut NumericMatrix> {
        self.bindings
            .iter_mut()
            .rev()
            .find(|b| b.variable == *variable)
            .map(|b| &mut b.value)
    }

    /// The quantifier recorded for the innermost binding of `variable`.
    pub fn quantifier(&self, variable: &Variable) -> Option<Quantifier> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.variable == *variable)
            .map(|b| b.quantifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::{Dimensions, NumericMatrix};

    fn matrix(side: usize) -> NumericMatrix {
        NumericMatrix::empty(Dimensions::square(side, 1), false)
    }

    #[test]
    fn lookup_finds_innermost_binding() {
        let mut env = Environment::empty();
        let x = Variable::unary("x");

        env.extend(x.clone(), matrix(2), Quantifier::All);
        env.extend(x.clone(), matrix(3), Quantifier::Some);

        assert_eq!(env.lookup(&x).unwrap().dimensions().capacity(), 3);
        env.pop();
        assert_eq!(env.lookup(&x).unwrap().dimensions().capacity(), 2);
        env.pop();
        assert!(env.lookup(&x).is_none());
    }

    #[test]
    fn negation_flips_recorded_quantifiers() {
        let mut env = Environment::empty();
        let x = Variable::unary("x");
        let y = Variable::unary("y");

        env.extend(x.clone(), matrix(2), Quantifier::All);
        env.negate();
        env.extend(y.clone(), matrix(2), Quantifier::All);
        env.negate();

        assert_eq!(env.quantifier(&x), Some(Quantifier::All));
        assert_eq!(env.quantifier(&y), Some(Quantifier::Some));
        assert!(!env.negated());
    }
}

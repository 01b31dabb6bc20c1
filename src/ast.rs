//! AST types for quantitative relational logic
//!
//! The tree is tagged-variant: expressions and formulas are thin handles
//! around reference-counted inner enums, with builder methods as the public
//! surface. Numeric expressions are ordinary expressions here — cardinality,
//! sums, and arithmetic all denote matrices, so a separate integer
//! expression type would only duplicate the operator set.

mod expr;
mod formula;

pub use expr::{ConstantExpr, ExprBinaryOp, ExprUnaryOp, Expression, ExpressionInner};
pub use formula::{
    CompareOp, Decl, Decls, Formula, FormulaBinaryOp, FormulaInner, Multiplicity, Quantifier,
};

use std::fmt;
use std::sync::Arc;

/// A relation symbol: a leaf expression with a fixed arity.
///
/// A relation is either boolean (its tuples carry weight 1) or
/// quantitative (its tuples carry arbitrary weights from the domain).
/// Two relations are equal iff they are the same object.
#[derive(Clone)]
pub struct Relation {
    inner: Arc<RelationInner>,
}

struct RelationInner {
    name: String,
    arity: usize,
    quantitative: bool,
}

impl Relation {
    /// Creates a boolean relation with the given name and arity.
    ///
    /// # Panics
    /// Panics if arity < 1
    pub fn nary(name: impl Into<String>, arity: usize) -> Self {
        Self::build(name, arity, false)
    }

    /// Creates a quantitative relation with the given name and arity.
    ///
    /// # Panics
    /// Panics if arity < 1
    pub fn quantitative_nary(name: impl Into<String>, arity: usize) -> Self {
        Self::build(name, arity, true)
    }

    /// Creates a boolean unary relation.
    pub fn unary(name: impl Into<String>) -> Self {
        Self::nary(name, 1)
    }

    /// Creates a boolean binary relation.
    pub fn binary(name: impl Into<String>) -> Self {
        Self::nary(name, 2)
    }

    /// Creates a quantitative unary relation.
    pub fn quantitative_unary(name: impl Into<String>) -> Self {
        Self::quantitative_nary(name, 1)
    }

    /// Creates a quantitative binary relation.
    pub fn quantitative_binary(name: impl Into<String>) -> Self {
        Self::quantitative_nary(name, 2)
    }

    fn build(name: impl Into<String>, arity: usize, quantitative: bool) -> Self {
        assert!(arity >= 1, "arity must be at least 1, got {}", arity);
        Self {
            inner: Arc::new(RelationInner {
                name: name.into(),
                arity,
                quantitative,
            }),
        }
    }

    /// Returns the name of this relation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the arity of this relation.
    pub fn arity(&self) -> usize {
        self.inner.arity
    }

    /// True if this relation's tuples may carry non-unit weights.
    pub fn is_quantitative(&self) -> bool {
        self.inner.quantitative
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Relation {}

impl std::hash::Hash for Relation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Relation({}/{}{})",
            self.name(),
            self.arity(),
            if self.is_quantitative() { " qt" } else { "" }
        )
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A quantified variable. Identity equality, like [`Relation`].
#[derive(Clone)]
pub struct Variable {
    inner: Arc<VariableInner>,
}

struct VariableInner {
    name: String,
    arity: usize,
}

impl Variable {
    /// Creates a unary variable with the given name.
    pub fn unary(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(VariableInner {
                name: name.into(),
                arity: 1,
            }),
        }
    }

    /// Returns the name of this variable.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the arity of this variable.
    pub fn arity(&self) -> usize {
        self.inner.arity
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({})", self.name())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_relations() {
        let r1 = Relation::unary("Person");
        assert_eq!(r1.name(), "Person");
        assert_eq!(r1.arity(), 1);
        assert!(!r1.is_quantitative());

        let r2 = Relation::quantitative_binary("weighs");
        assert_eq!(r2.arity(), 2);
        assert!(r2.is_quantitative());
    }

    #[test]
    fn relation_identity() {
        let r1 = Relation::unary("Person");
        let r2 = Relation::unary("Person");
        let r3 = r1.clone();

        assert_eq!(r1, r3);
        // Same name, different object
        assert_ne!(r1, r2);
    }

    #[test]
    #[should_panic(expected = "arity must be at least 1")]
    fn zero_arity_panics() {
        Relation::nary("invalid", 0);
    }

    #[test]
    fn variable_identity() {
        let x = Variable::unary("x");
        let y = Variable::unary("x");
        assert_eq!(x, x.clone());
        assert_ne!(x, y);
    }
}

//! Expression types
//!
//! Every expression denotes a (possibly weighted) relation, i.e. a numeric
//! matrix after translation. Scalar-valued expressions — cardinality, sums,
//! integer constants — denote constant matrices whose cells all hold the
//! scalar, so they compose with the relational operators without a separate
//! type.

use std::borrow::Cow;
use std::rc::Rc;

use super::formula::{Decls, Formula};
use super::{Relation, Variable};
use crate::num::Number;

/// Constant expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantExpr {
    /// The universal unary relation
    Univ,
    /// The binary identity relation
    Iden,
    /// The empty unary relation
    None,
    /// The unary relation of integer-carrying atoms
    Ints,
}

/// Binary expression operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprBinaryOp {
    /// T-conorm union
    Union,
    /// T-norm intersection
    Intersection,
    /// Weighted difference: `A[i] != 0 => A[i] - tnorm(A[i], B[i])`
    Difference,
    /// Bounded cellwise subtraction `max(0, A[i] - B[i])`
    Minus,
    /// Row-wise override
    Override,
    /// Relational join under the join–meet product
    Join,
    /// Relational join under the plus–times product
    MultiJoin,
    /// Cross (Kronecker) product
    Product,
    /// Bounded cellwise addition
    Addition,
    /// Hadamard (cellwise) product
    HadamardProduct,
    /// Hadamard (cellwise) bounded division
    HadamardDivision,
    /// Cellwise modulo
    Modulo,
    /// Intersection gated on the left operand's support
    LeftIntersection,
    /// Intersection gated on the right operand's support
    RightIntersection,
    /// Restriction to rows whose first atom occurs in the left vector
    Domain,
    /// Restriction to columns whose last atom occurs in the right vector
    Range,
    /// Khatri–Rao (column-wise Kronecker) product
    KhatriRao,
    /// Scalar multiplication; the left operand denotes the scalar
    Scalar,
    /// Alpha-cut; the left operand denotes the cut level
    AlphaCut,
}

/// Unary expression operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprUnaryOp {
    /// Transposition of a binary relation
    Transpose,
    /// Transitive closure under the join–meet semiring
    Closure,
    /// Reflexive transitive closure (fixed-point encoded)
    ReflexiveClosure,
    /// Projection onto the boolean support, `A[i] != 0`
    Drop,
    /// Cellwise negation
    Neg,
    /// Cellwise absolute value
    Abs,
    /// Cellwise sign
    Sgn,
    /// Sum of all cells, broadcast as a constant matrix
    Cardinality,
}

/// A relational expression (reference-counted for cheap sharing).
#[derive(Clone, Debug)]
pub enum Expression {
    /// Reference-counted compound or leaf expression
    Ref(Rc<ExpressionInner>),
    /// Constant expression (inline, no allocation)
    Constant(ConstantExpr),
}

/// Inner representation of an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionInner {
    /// Relation leaf
    Relation(Relation),
    /// Quantified-variable leaf
    Variable(Variable),
    /// Constant expression leaf
    Constant(ConstantExpr),
    /// A scalar constant broadcast over the unary universe
    NumConstant(Number),
    /// Binary operator application
    Binary {
        /// Left operand
        left: Expression,
        /// Operator
        op: ExprBinaryOp,
        /// Right operand
        right: Expression,
    },
    /// N-ary operator application (union, intersection, addition, product)
    Nary {
        /// Operator; must be associative
        op: ExprBinaryOp,
        /// Operands, at least two
        exprs: Vec<Expression>,
    },
    /// Unary operator application
    Unary {
        /// Operator
        op: ExprUnaryOp,
        /// Operand
        expr: Expression,
    },
    /// Boolean set comprehension `{ decls | formula }`
    Comprehension {
        /// Bound declarations
        decls: Decls,
        /// Membership condition
        formula: Formula,
    },
    /// Quantitative comprehension `{ decls | body }`, storing the body's
    /// scalar value at each tuple under the declaration guard
    QtComprehension {
        /// Bound declarations
        decls: Decls,
        /// Weight expression
        body: Expression,
    },
    /// Conditional expression
    If {
        /// Condition
        condition: Formula,
        /// Value when the condition holds
        then_expr: Expression,
        /// Value otherwise
        else_expr: Expression,
    },
    /// Projection onto the given (scalar-valued) columns
    Project {
        /// Projected expression
        expr: Expression,
        /// Column selectors; each denotes a scalar
        columns: Vec<Expression>,
    },
    /// Summation `sum decls | body`
    Sum {
        /// Bound declarations
        decls: Decls,
        /// Summand
        body: Expression,
    },
}

impl Expression {
    fn wrap(inner: ExpressionInner) -> Expression {
        Expression::Ref(Rc::new(inner))
    }

    /// Returns a view of the inner representation.
    pub fn inner(&self) -> Cow<'_, ExpressionInner> {
        match self {
            Expression::Ref(rc) => Cow::Borrowed(rc.as_ref()),
            Expression::Constant(c) => Cow::Owned(ExpressionInner::Constant(*c)),
        }
    }

    /// The universal unary relation.
    pub const UNIV: Expression = Expression::Constant(ConstantExpr::Univ);
    /// The binary identity relation.
    pub const IDEN: Expression = Expression::Constant(ConstantExpr::Iden);
    /// The empty unary relation.
    pub const NONE: Expression = Expression::Constant(ConstantExpr::None);
    /// The unary relation of integer-carrying atoms.
    pub const INTS: Expression = Expression::Constant(ConstantExpr::Ints);

    /// An integer constant, broadcast over the unary universe.
    pub fn int_constant(value: i64) -> Expression {
        Expression::wrap(ExpressionInner::NumConstant(Number::Int(value)))
    }

    /// A real constant, broadcast over the unary universe.
    pub fn real_constant(value: f64) -> Expression {
        Expression::wrap(ExpressionInner::NumConstant(Number::Real(value)))
    }

    fn binary(self, op: ExprBinaryOp, right: Expression) -> Expression {
        Expression::wrap(ExpressionInner::Binary {
            left: self,
            op,
            right,
        })
    }

    fn unary(self, op: ExprUnaryOp) -> Expression {
        Expression::wrap(ExpressionInner::Unary { op, expr: self })
    }

    /// Union: cellwise t-conorm.
    pub fn union(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Union, other)
    }

    /// Intersection: cellwise t-norm.
    pub fn intersection(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Intersection, other)
    }

    /// Weighted difference.
    pub fn difference(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Difference, other)
    }

    /// Bounded cellwise subtraction.
    pub fn minus(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Minus, other)
    }

    /// Row-wise override.
    pub fn override_with(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Override, other)
    }

    /// Relational join (join–meet product).
    pub fn join(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Join, other)
    }

    /// Relational join under the plus–times product.
    pub fn multi_join(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::MultiJoin, other)
    }

    /// Cross product.
    pub fn product(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Product, other)
    }

    /// Bounded cellwise addition.
    pub fn plus(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Addition, other)
    }

    /// Hadamard product.
    pub fn hadamard_product(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::HadamardProduct, other)
    }

    /// Hadamard bounded division.
    pub fn hadamard_divide(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::HadamardDivision, other)
    }

    /// Cellwise modulo.
    pub fn modulo(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Modulo, other)
    }

    /// Intersection gated on this expression's support.
    pub fn left_intersection(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::LeftIntersection, other)
    }

    /// Intersection gated on the other expression's support.
    pub fn right_intersection(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::RightIntersection, other)
    }

    /// Domain restriction: `self <: other` keeps rows of `other` led by
    /// atoms in `self`.
    pub fn domain(self, other: Expression) -> Expression {
        other.binary(ExprBinaryOp::Domain, self)
    }

    /// Range restriction: `self :> other` keeps columns of `self` ending in
    /// atoms of `other`.
    pub fn range(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Range, other)
    }

    /// Khatri–Rao product.
    pub fn khatri_rao(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::KhatriRao, other)
    }

    /// Scalar multiplication of `other` by this scalar-valued expression.
    pub fn scale(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::Scalar, other)
    }

    /// Alpha-cut of `other` at this scalar-valued level.
    pub fn alpha_cut(self, other: Expression) -> Expression {
        self.binary(ExprBinaryOp::AlphaCut, other)
    }

    /// N-ary union.
    pub fn union_all(exprs: Vec<Expression>) -> Expression {
        Self::nary(ExprBinaryOp::Union, exprs)
    }

    /// N-ary intersection.
    pub fn intersection_all(exprs: Vec<Expression>) -> Expression {
        Self::nary(ExprBinaryOp::Intersection, exprs)
    }

    /// N-ary bounded addition.
    pub fn plus_all(exprs: Vec<Expression>) -> Expression {
        Self::nary(ExprBinaryOp::Addition, exprs)
    }

    fn nary(op: ExprBinaryOp, exprs: Vec<Expression>) -> Expression {
        assert!(exprs.len() >= 2, "n-ary expression needs at least two operands");
        Expression::wrap(ExpressionInner::Nary { op, exprs })
    }

    /// Transposition.
    pub fn transpose(self) -> Expression {
        self.unary(ExprUnaryOp::Transpose)
    }

    /// Transitive closure.
    pub fn closure(self) -> Expression {
        self.unary(ExprUnaryOp::Closure)
    }

    /// Reflexive transitive closure.
    pub fn reflexive_closure(self) -> Expression {
        self.unary(ExprUnaryOp::ReflexiveClosure)
    }

    /// Projection onto the boolean support.
    pub fn drop(self) -> Expression {
        self.unary(ExprUnaryOp::Drop)
    }

    /// Cellwise negation.
    pub fn negate(self) -> Expression {
        self.unary(ExprUnaryOp::Neg)
    }

    /// Cellwise absolute value.
    pub fn abs(self) -> Expression {
        self.unary(ExprUnaryOp::Abs)
    }

    /// Cellwise sign.
    pub fn signum(self) -> Expression {
        self.unary(ExprUnaryOp::Sgn)
    }

    /// Cardinality: the accumulated sum of all cells.
    pub fn cardinality(self) -> Expression {
        self.unary(ExprUnaryOp::Cardinality)
    }

    /// Boolean comprehension `{ decls | formula }`.
    pub fn comprehension(decls: Decls, formula: Formula) -> Expression {
        Expression::wrap(ExpressionInner::Comprehension { decls, formula })
    }

    /// Quantitative comprehension `{ decls | body }`.
    pub fn qt_comprehension(decls: Decls, body: Expression) -> Expression {
        Expression::wrap(ExpressionInner::QtComprehension { decls, body })
    }

    /// Conditional expression.
    pub fn if_then_else(condition: Formula, then_expr: Expression, else_expr: Expression) -> Expression {
        Expression::wrap(ExpressionInner::If {
            condition,
            then_expr,
            else_expr,
        })
    }

    /// Projection onto the given scalar-valued columns.
    pub fn project(self, columns: Vec<Expression>) -> Expression {
        assert!(!columns.is_empty(), "projection needs at least one column");
        Expression::wrap(ExpressionInner::Project {
            expr: self,
            columns,
        })
    }

    /// Summation `sum decls | body`.
    pub fn sum(decls: Decls, body: Expression) -> Expression {
        Expression::wrap(ExpressionInner::Sum { decls, body })
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Ref(a), Expression::Ref(b)) => {
                Rc::ptr_eq(a, b) || a.as_ref() == b.as_ref()
            }
            _ => *self.inner() == *other.inner(),
        }
    }
}

impl From<Relation> for Expression {
    fn from(r: Relation) -> Self {
        Expression::wrap(ExpressionInner::Relation(r))
    }
}

impl From<&Relation> for Expression {
    fn from(r: &Relation) -> Self {
        Expression::from(r.clone())
    }
}

impl From<Variable> for Expression {
    fn from(v: Variable) -> Self {
        Expression::wrap(ExpressionInner::Variable(v))
    }
}

impl From<&Variable> for Expression {
    fn from(v: &Variable) -> Self {
        Expression::from(v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_produce_expected_shapes() {
        let r = Relation::quantitative_binary("R");
        let s = Relation::quantitative_binary("S");

        let u = Expression::from(&r).union(Expression::from(&s));
        assert!(matches!(
            &*u.inner(),
            ExpressionInner::Binary {
                op: ExprBinaryOp::Union,
                ..
            }
        ));

        let t = Expression::from(&r).transpose();
        assert!(matches!(
            &*t.inner(),
            ExpressionInner::Unary {
                op: ExprUnaryOp::Transpose,
                ..
            }
        ));
    }

    #[test]
    fn constants_are_inline() {
        assert!(matches!(
            &*Expression::UNIV.inner(),
            ExpressionInner::Constant(ConstantExpr::Univ)
        ));
        assert!(matches!(
            &*Expression::int_constant(3).inner(),
            ExpressionInner::NumConstant(Number::Int(3))
        ));
    }

    #[test]
    fn domain_and_range_orient_operands() {
        let r = Relation::binary("R");
        let v = Relation::unary("V");

        // v <: r restricts r, so r is the left operand of the Domain node
        let d = Expression::from(&v).domain(Expression::from(&r));
        match &*d.inner() {
            ExpressionInner::Binary {
                left,
                op: ExprBinaryOp::Domain,
                ..
            } => {
                assert_eq!(*left, Expression::from(&r));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }
}

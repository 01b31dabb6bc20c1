//! AST rewrites applied before translation
//!
//! The one pass here removes redundant `drop` nodes: a `drop` whose
//! operand already denotes a `{0,1}`-valued matrix is the identity, and
//! removing it up front keeps the circuit free of needless projection
//! gates. The rewrite is a discrete pass over the tree rather than a flag
//! threaded through the translator; rewritten nodes are memoized by
//! pointer so shared subtrees stay shared.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::ast::{
    ConstantExpr, Decl, Decls, Expression, ExpressionInner, ExprBinaryOp, ExprUnaryOp, Formula,
    FormulaBinaryOp, FormulaInner,
};

/// Removes redundant `drop` nodes from a formula.
pub fn remove_drops(formula: &Formula) -> Formula {
    Rewriter::default().formula(formula)
}

/// Removes redundant `drop` nodes from an expression.
pub fn remove_drops_expr(expr: &Expression) -> Expression {
    Rewriter::default().expr(expr)
}

/// True when the expression certainly denotes a `{0,1}`-valued matrix.
/// Conservative: `false` answers only cost a redundant projection.
fn is_boolean(expr: &Expression) -> bool {
    match &*expr.inner() {
        ExpressionInner::Relation(r) => !r.is_quantitative(),
        ExpressionInner::Constant(ConstantExpr::Univ) => true,
        ExpressionInner::Constant(_) => false,
        ExpressionInner::Comprehension { .. } => true,
        ExpressionInner::Unary { op, expr } => match op {
            ExprUnaryOp::Drop => true,
            ExprUnaryOp::Transpose | ExprUnaryOp::Closure => is_boolean(expr),
            _ => false,
        },
        ExpressionInner::Binary { left, op, right } => match op {
            ExprBinaryOp::Union
            | ExprBinaryOp::Intersection
            | ExprBinaryOp::Difference
            | ExprBinaryOp::Join
            | ExprBinaryOp::Product
            | ExprBinaryOp::Override => is_boolean(left) && is_boolean(right),
            ExprBinaryOp::AlphaCut => true,
            ExprBinaryOp::Domain | ExprBinaryOp::Range => is_boolean(left),
            _ => false,
        },
        ExpressionInner::Nary { op, exprs } => match op {
            ExprBinaryOp::Union | ExprBinaryOp::Intersection | ExprBinaryOp::Product => {
                exprs.iter().all(is_boolean)
            }
            _ => false,
        },
        ExpressionInner::If {
            then_expr,
            else_expr,
            ..
        } => is_boolean(then_expr) && is_boolean(else_expr),
        _ => false,
    }
}

#[derive(Default)]
struct Rewriter {
    exprs: FxHashMap<*const ExpressionInner, Expression>,
    formulas: FxHashMap<*const FormulaInner, Formula>,
}

impl Rewriter {
    fn formula(&mut self, formula: &Formula) -> Formula {
        let key = match formula {
            Formula::Ref(rc) => Some(Rc::as_ptr(rc)),
            _ => return formula.clone(),
        };
        if let Some(key) = key {
            if let Some(done) = self.formulas.get(&key) {
                return done.clone();
            }
        }

        let ret = match &*formula.inner() {
            FormulaInner::Constant(_) => formula.clone(),
            FormulaInner::Binary { left, op, right } => {
                let l = self.formula(left);
                let r = self.formula(right);
                match op {
                    FormulaBinaryOp::And => l.and(r),
                    FormulaBinaryOp::Or => l.or(r),
                    FormulaBinaryOp::Implies => l.implies(r),
                    FormulaBinaryOp::Iff => l.iff(r),
                }
            }
            FormulaInner::Nary { op, formulas } => {
                let rewritten: Vec<Formula> = formulas.iter().map(|f| self.formula(f)).collect();
                match op {
                    FormulaBinaryOp::And => Formula::and_all(rewritten),
                    _ => Formula::or_all(rewritten),
                }
            }
            FormulaInner::Not(inner) => self.formula(inner).not(),
            FormulaInner::Comparison { left, op, right } => {
                let l = self.expr(left);
                let r = self.expr(right);
                match op {
                    crate::ast::CompareOp::Equals => l.equals(r),
                    crate::ast::CompareOp::Subset => l.in_set(r),
                    crate::ast::CompareOp::Lt => l.lt(r),
                    crate::ast::CompareOp::Lte => l.lte(r),
                    crate::ast::CompareOp::Gt => l.gt(r),
                    crate::ast::CompareOp::Gte => l.gte(r),
                }
            }
            FormulaInner::Multiplicity { mult, expr } => {
                let e = self.expr(expr);
                match mult {
                    crate::ast::Multiplicity::Some => e.some(),
                    crate::ast::Multiplicity::One => e.one(),
                    crate::ast::Multiplicity::Lone => e.lone(),
                    crate::ast::Multiplicity::No => e.no(),
                    crate::ast::Multiplicity::Set => unreachable!("set multiplicity in a formula"),
                }
            }
            FormulaInner::Quantified {
                quantifier,
                decls,
                body,
            } => {
                let decls = self.decls(decls);
                let body = self.formula(body);
                match quantifier {
                    crate::ast::Quantifier::All => Formula::forall(decls, body),
                    crate::ast::Quantifier::Some => Formula::exists(decls, body),
                }
            }
        };

        if let Some(key) = key {
            self.formulas.insert(key, ret.clone());
        }
        ret
    }

    fn expr(&mut self, expr: &Expression) -> Expression {
        let key = match expr {
            Expression::Ref(rc) => Some(Rc::as_ptr(rc)),
            Expression::Constant(_) => return expr.clone(),
        };
        if let Some(key) = key {
            if let Some(done) = self.exprs.get(&key) {
                return done.clone();
            }
        }

        let ret = match &*expr.inner() {
            ExpressionInner::Relation(_)
            | ExpressionInner::Variable(_)
            | ExpressionInner::Constant(_)
            | ExpressionInner::NumConstant(_) => expr.clone(),

            ExpressionInner::Unary { op, expr: child } => {
                let child = self.expr(child);
                match op {
                    ExprUnaryOp::Drop if is_boolean(&child) => child,
                    ExprUnaryOp::Transpose => child.transpose(),
                    ExprUnaryOp::Closure => child.closure(),
                    ExprUnaryOp::ReflexiveClosure => child.reflexive_closure(),
                    ExprUnaryOp::Drop => child.drop(),
                    ExprUnaryOp::Neg => child.negate(),
                    ExprUnaryOp::Abs => child.abs(),
                    ExprUnaryOp::Sgn => child.signum(),
                    ExprUnaryOp::Cardinality => child.cardinality(),
                }
            }

            ExpressionInner::Binary { left, op, right } => {
                let l = self.expr(left);
                let r = self.expr(right);
                match op {
                    ExprBinaryOp::Union => l.union(r),
                    ExprBinaryOp::Intersection => l.intersection(r),
                    ExprBinaryOp::Difference => l.difference(r),
                    ExprBinaryOp::Minus => l.minus(r),
                    ExprBinaryOp::Override => l.override_with(r),
                    ExprBinaryOp::Join => l.join(r),
                    ExprBinaryOp::MultiJoin => l.multi_join(r),
                    ExprBinaryOp::Product => l.product(r),
                    ExprBinaryOp::Addition => l.plus(r),
                    ExprBinaryOp::HadamardProduct => l.hadamard_product(r),
                    ExprBinaryOp::HadamardDivision => l.hadamard_divide(r),
                    ExprBinaryOp::Modulo => l.modulo(r),
                    ExprBinaryOp::LeftIntersection => l.left_intersection(r),
                    ExprBinaryOp::RightIntersection => l.right_intersection(r),
                    // the builder flips domain restriction; rebuild directly
                    ExprBinaryOp::Domain => r.domain(l),
                    ExprBinaryOp::Range => l.range(r),
                    ExprBinaryOp::KhatriRao => l.khatri_rao(r),
                    ExprBinaryOp::Scalar => l.scale(r),
                    ExprBinaryOp::AlphaCut => l.alpha_cut(r),
                }
            }

            ExpressionInner::Nary { op, exprs } => {
                let rewritten: Vec<Expression> = exprs.iter().map(|e| self.expr(e)).collect();
                match op {
                    ExprBinaryOp::Union => Expression::union_all(rewritten),
                    ExprBinaryOp::Intersection => Expression::intersection_all(rewritten),
                    ExprBinaryOp::Addition => Expression::plus_all(rewritten),
                    _ => {
                        // other n-ary operators fold pairwise
                        let mut it = rewritten.into_iter();
                        let first = it.next().expect("n-ary expression has operands");
                        it.fold(first, |acc, e| match op {
                            ExprBinaryOp::Product => acc.product(e),
                            ExprBinaryOp::HadamardProduct => acc.hadamard_product(e),
                            _ => unreachable!("unsupported n-ary operator"),
                        })
                    }
                }
            }

            ExpressionInner::Comprehension { decls, formula } => {
                Expression::comprehension(self.decls(decls), self.formula(formula))
            }
            ExpressionInner::QtComprehension { decls, body } => {
                Expression::qt_comprehension(self.decls(decls), self.expr(body))
            }
            ExpressionInner::If {
                condition,
                then_expr,
                else_expr,
            } => Expression::if_then_else(
                self.formula(condition),
                self.expr(then_expr),
                self.expr(else_expr),
            ),
            ExpressionInner::Project { expr, columns } => {
                let columns = columns.iter().map(|c| self.expr(c)).collect();
                self.expr(expr).project(columns)
            }
            ExpressionInner::Sum { decls, body } => {
                Expression::sum(self.decls(decls), self.expr(body))
            }
        };

        if let Some(key) = key {
            self.exprs.insert(key, ret.clone());
        }
        ret
    }

    fn decls(&mut self, decls: &Decls) -> Decls {
        let rewritten: Vec<Decl> = decls
            .iter()
            .map(|d| Decl::new(d.variable().clone(), d.multiplicity(), self.expr(d.expression())))
            .collect();
        Decls::from_vec(rewritten)
    }
}

//! Translation cache keyed by AST node and free-variable bindings
//!
//! A pre-pass detects nodes worth caching: nodes that occur more than once
//! in the tree, and nodes whose free variables do not include the innermost
//! bound variable (their translation survives that variable's iteration).
//! A record for a node without free variables stores one translation; a
//! record for a node with free variables additionally remembers the tuple
//! index each variable was bound to, and only answers when the current
//! environment binds them identically.

use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

use super::Environment;
use crate::ast::{
    Decls, Expression, ExpressionInner, Formula, FormulaInner, Variable,
};
use crate::num::{BoolValue, NumericMatrix};

/// Identity of an AST node, by inner pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// An expression node
    Expr(*const ExpressionInner),
    /// A formula node
    Formula(*const FormulaInner),
}

impl NodeId {
    fn from_expr(expr: &Expression) -> Option<Self> {
        match expr {
            Expression::Ref(rc) => Some(NodeId::Expr(Rc::as_ptr(rc))),
            _ => None,
        }
    }

    fn from_formula(formula: &Formula) -> Option<Self> {
        match formula {
            Formula::Ref(rc) => Some(NodeId::Formula(Rc::as_ptr(rc))),
            _ => None,
        }
    }
}

/// Detects nodes that occur more than once in an AST.
struct SharingDetector {
    visited: FxHashMap<NodeId, bool>,
}

impl SharingDetector {
    fn detect(formula: &Formula) -> FxHashSet<NodeId> {
        let mut detector = SharingDetector {
            visited: FxHashMap::default(),
        };
        detector.visit_formula(formula);
        detector
            .visited
            .into_iter()
            .filter_map(|(id, shared)| if shared { Some(id) } else { None })
            .collect()
    }

    /// Records a visit; true if the node was seen before.
    fn visit_node(&mut self, id: NodeId) -> bool {
        match self.visited.get_mut(&id) {
            None => {
                self.visited.insert(id, false);
                false
            }
            Some(shared) => {
                *shared = true;
                true
            }
        }
    }

    fn visit_formula(&mut self, formula: &Formula) {
        if let Some(id) = NodeId::from_formula(formula) {
            if self.visit_node(id) {
                return;
            }
        }
        match &*formula.inner() {
            FormulaInner::Constant(_) => {}
            FormulaInner::Binary { left, right, .. } => {
                self.visit_formula(left);
                self.visit_formula(right);
            }
            FormulaInner::Nary { formulas, .. } => {
                for f in formulas {
                    self.visit_formula(f);
                }
            }
            FormulaInner::Not(inner) => self.visit_formula(inner),
            FormulaInner::Comparison { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            FormulaInner::Multiplicity { expr, .. } => self.visit_expr(expr),
            FormulaInner::Quantified { decls, body, .. } => {
                self.visit_decls(decls);
                self.visit_formula(body);
            }
        }
    }

    fn visit_decls(&mut self, decls: &Decls) {
        for decl in decls.iter() {
            self.visit_expr(decl.expression());
        }
    }

    fn visit_expr(&mut self, expr: &Expression) {
        if let Some(id) = NodeId::from_expr(expr) {
            if self.visit_node(id) {
                return;
            }
        }
        match &*expr.inner() {
            ExpressionInner::Relation(_)
            | ExpressionInner::Variable(_)
            | ExpressionInner::Constant(_)
            | ExpressionInner::NumConstant(_) => {}
            ExpressionInner::Binary { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            ExpressionInner::Nary { exprs, .. } => {
                for e in exprs {
                    self.visit_expr(e);
                }
            }
            ExpressionInner::Unary { expr, .. } => self.visit_expr(expr),
            ExpressionInner::Comprehension { decls, formula } => {
                self.visit_decls(decls);
                self.visit_formula(formula);
            }
            ExpressionInner::QtComprehension { decls, body } => {
                self.visit_decls(decls);
                self.visit_expr(body);
            }
            ExpressionInner::If {
                condition,
                then_expr,
                else_expr,
            } => {
                self.visit_formula(condition);
                self.visit_expr(then_expr);
                self.visit_expr(else_expr);
            }
            ExpressionInner::Project { expr, columns } => {
                self.visit_expr(expr);
                for c in columns {
                    self.visit_expr(c);
                }
            }
            ExpressionInner::Sum { decls, body } => {
                self.visit_decls(decls);
                self.visit_expr(body);
            }
        }
    }
}

/// Computes free variables and decides which nodes get cache records.
struct FreeVariableCollector {
    vars_in_scope: Vec<Variable>,
    shared: FxHashSet<NodeId>,
    cache: FxHashMap<NodeId, Vec<Variable>>,
}

impl FreeVariableCollector {
    fn collect(formula: &Formula, shared: FxHashSet<NodeId>) -> FxHashMap<NodeId, Vec<Variable>> {
        let mut collector = FreeVariableCollector {
            vars_in_scope: Vec::new(),
            shared,
            cache: FxHashMap::default(),
        };
        collector.visit_formula(formula);
        collector.cache
    }

    /// A node is recorded when it is shared, or when it has free variables
    /// none of which is the innermost bound variable.
    fn record(&mut self, id: Option<NodeId>, free_vars: &FxHashSet<Variable>) {
        let Some(id) = id else { return };
        let worth_caching = self.shared.contains(&id)
            || match self.vars_in_scope.last() {
                Some(top) => !free_vars.is_empty() && !free_vars.contains(top),
                None => false,
            };
        if worth_caching {
            let mut vars: Vec<Variable> = free_vars.iter().cloned().collect();
            vars.sort_by(|a, b| a.name().cmp(b.name()));
            self.cache.insert(id, vars);
        }
    }

    fn visit_formula(&mut self, formula: &Formula) -> FxHashSet<Variable> {
        let id = NodeId::from_formula(formula);
        let free_vars = match &*formula.inner() {
            FormulaInner::Constant(_) => FxHashSet::default(),
            FormulaInner::Binary { left, right, .. } => {
                let mut fv = self.visit_formula(left);
                fv.extend(self.visit_formula(right));
                fv
            }
            FormulaInner::Nary { formulas, .. } => {
                let mut fv = FxHashSet::default();
                for f in formulas {
                    fv.extend(self.visit_formula(f));
                }
                fv
            }
            FormulaInner::Not(inner) => self.visit_formula(inner),
            FormulaInner::Comparison { left, right, .. } => {
                let mut fv = self.visit_expr(left);
                fv.extend(self.visit_expr(right));
                fv
            }
            FormulaInner::Multiplicity { expr, .. } => self.visit_expr(expr),
            FormulaInner::Quantified { decls, body, .. } => {
                self.visit_quantified(decls, |this| this.visit_formula(body))
            }
        };
        self.record(id, &free_vars);
        free_vars
    }

    fn visit_expr(&mut self, expr: &Expression) -> FxHashSet<Variable> {
        let id = NodeId::from_expr(expr);
        let free_vars = match &*expr.inner() {
            ExpressionInner::Relation(_)
            | ExpressionInner::Constant(_)
            | ExpressionInner::NumConstant(_) => FxHashSet::default(),
            ExpressionInner::Variable(v) => {
                let mut fv = FxHashSet::default();
                fv.insert(v.clone());
                fv
            }
            ExpressionInner::Binary { left, right, .. } => {
                let mut fv = self.visit_expr(left);
                fv.extend(self.visit_expr(right));
                fv
            }
            ExpressionInner::Nary { exprs, .. } => {
                let mut fv = FxHashSet::default();
                for e in exprs {
                    fv.extend(self.visit_expr(e));
                }
                fv
            }
            ExpressionInner::Unary { expr, .. } => self.visit_expr(expr),
            ExpressionInner::Comprehension { decls, formula } => {
                self.visit_quantified(decls, |this| this.visit_formula(formula))
            }
            ExpressionInner::QtComprehension { decls, body } => {
                self.visit_quantified(decls, |this| this.visit_expr(body))
            }
            ExpressionInner::If {
                condition,
                then_expr,
                else_expr,
            } => {
                let mut fv = self.visit_formula(condition);
                fv.extend(self.visit_expr(then_expr));
                fv.extend(self.visit_expr(else_expr));
                fv
            }
            ExpressionInner::Project { expr, columns } => {
                let mut fv = self.visit_expr(expr);
                for c in columns {
                    fv.extend(self.visit_expr(c));
                }
                fv
            }
            ExpressionInner::Sum { decls, body } => {
                self.visit_quantified(decls, |this| this.visit_expr(body))
            }
        };
        self.record(id, &free_vars);
        free_vars
    }

    fn visit_quantified<F>(&mut self, decls: &Decls, body: F) -> FxHashSet<Variable>
    where
        F: FnOnce(&mut Self) -> FxHashSet<Variable>,
    {
        let mut free_vars = FxHashSet::default();
        let mut bound = FxHashSet::default();

        for decl in decls.iter() {
            for v in self.visit_expr(decl.expression()) {
                if !bound.contains(&v) {
                    free_vars.insert(v);
                }
            }
            self.vars_in_scope.push(decl.variable().clone());
            bound.insert(decl.variable().clone());
        }

        for v in body(self) {
            if !bound.contains(&v) {
                free_vars.insert(v);
            }
        }

        for _ in 0..decls.size() {
            self.vars_in_scope.pop();
        }
        free_vars
    }
}

/// Cache record for a node without free variables.
struct NoVarRecord<T> {
    translation: Option<T>,
}

/// Cache record for a node with free variables: the translation plus the
/// tuple index each variable was bound to when it was produced.
struct MultiVarRecord<T> {
    vars: Vec<Variable>,
    tuples: Vec<usize>,
    translation: Option<T>,
}

impl<T: Clone> MultiVarRecord<T> {
    fn get(&self, env: &Environment) -> Option<T> {
        let translation = self.translation.as_ref()?;
        for (var, &tuple) in self.vars.iter().zip(&self.tuples) {
            let bound = env.lookup(var)?;
            if bound.fast_get(tuple).is_zero() {
                return None;
            }
        }
        Some(translation.clone())
    }

    fn set(&mut self, translation: T, env: &Environment) {
        for (i, var) in self.vars.iter().enumerate() {
            if let Some(bound) = env.lookup(var) {
                if let Some((index, _)) = bound.iter().next() {
                    self.tuples[i] = index;
                }
            }
        }
        self.translation = Some(translation);
    }
}

enum CacheRecord<T> {
    NoVar(NoVarRecord<T>),
    MultiVar(MultiVarRecord<T>),
}

impl<T: Clone> CacheRecord<T> {
    fn new(vars: Vec<Variable>) -> Self {
        if vars.is_empty() {
            CacheRecord::NoVar(NoVarRecord { translation: None })
        } else {
            let tuples = vec![0; vars.len()];
            CacheRecord::MultiVar(MultiVarRecord {
                vars,
                tuples,
                translation: None,
            })
        }
    }

    fn get(&self, env: &Environment) -> Option<T> {
        match self {
            CacheRecord::NoVar(r) => r.translation.clone(),
            CacheRecord::MultiVar(r) => r.get(env),
        }
    }

    fn set(&mut self, translation: T, env: &Environment) {
        match self {
            CacheRecord::NoVar(r) => r.translation = Some(translation),
            CacheRecord::MultiVar(r) => r.set(translation, env),
        }
    }
}

/// The translation cache for one problem.
pub struct TranslationCache {
    expr_cache: FxHashMap<NodeId, CacheRecord<NumericMatrix>>,
    formula_cache: FxHashMap<NodeId, CacheRecord<BoolValue>>,
}

impl TranslationCache {
    /// Builds cache records for the shareable nodes of `formula`.
    pub fn new(formula: &Formula) -> Self {
        let shared = SharingDetector::detect(formula);
        let cacheable = FreeVariableCollector::collect(formula, shared);

        let mut expr_cache = FxHashMap::default();
        let mut formula_cache = FxHashMap::default();
        for (id, vars) in cacheable {
            match id {
                NodeId::Expr(_) => {
                    expr_cache.insert(id, CacheRecord::new(vars));
                }
                NodeId::Formula(_) => {
                    formula_cache.insert(id, CacheRecord::new(vars));
                }
            }
        }
        Self {
            expr_cache,
            formula_cache,
        }
    }

    /// An empty cache, for single-shot evaluations.
    pub fn empty() -> Self {
        Self {
            expr_cache: FxHashMap::default(),
            formula_cache: FxHashMap::default(),
        }
    }

    /// Looks up a cached expression translation valid under `env`.
    pub fn lookup_expr(&self, expr: &Expression, env: &Environment) -> Option<NumericMatrix> {
        let id = NodeId::from_expr(expr)?;
        self.expr_cache.get(&id)?.get(env)
    }

    /// Installs an expression translation if the node has a record.
    pub fn cache_expr(&mut self, expr: &Expression, translation: &NumericMatrix, env: &Environment) {
        if let Some(id) = NodeId::from_expr(expr) {
            if let Some(record) = self.expr_cache.get_mut(&id) {
                record.set(translation.clone(), env);
            }
        }
    }

    /// Looks up a cached formula translation valid under `env`.
    pub fn lookup_formula(&self, formula: &Formula, env: &Environment) -> Option<BoolValue> {
        let id = NodeId::from_formula(formula)?;
        self.formula_cache.get(&id)?.get(env)
    }

    /// Installs a formula translation if the node has a record.
    pub fn cache_formula(&mut self, formula: &Formula, translation: &BoolValue, env: &Environment) {
        if let Some(id) = NodeId::from_formula(formula) {
            if let Some(record) = self.formula_cache.get_mut(&id) {
                record.set(translation.clone(), env);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Relation;

    #[test]
    fn unshared_nodes_get_no_records() {
        let r = Relation::unary("R");
        let s = Relation::unary("S");
        let formula = Expression::from(&r).some().and(Expression::from(&s).some());

        let cache = TranslationCache::new(&formula);
        assert!(cache.expr_cache.is_empty());
    }

    #[test]
    fn shared_expressions_get_records() {
        let r = Relation::unary("R");
        let shared = Expression::from(&r);
        let formula = shared.clone().some().and(shared.no());

        let cache = TranslationCache::new(&formula);
        assert_eq!(cache.expr_cache.len(), 1);
    }

    #[test]
    fn no_var_record_round_trips() {
        let r = Relation::unary("R");
        let shared = Expression::from(&r);
        let formula = shared.clone().some().and(shared.clone().no());

        let mut cache = TranslationCache::new(&formula);
        let env = Environment::empty();
        assert!(cache.lookup_expr(&shared, &env).is_none());

        let m = NumericMatrix::empty(crate::num::Dimensions::square(2, 1), false);
        cache.cache_expr(&shared, &m, &env);
        assert!(cache.lookup_expr(&shared, &env).is_some());
    }
}

//! Numeric factory: the single allocator of scalar nodes
//!
//! Every constructor returns a canonicalized value: constants fold,
//! identities collapse, negations fuse, and structurally identical gates
//! are hash-consed by `(operator, input labels)`. The factory also carries
//! the semiring: a record of `fn` pointers for the t-norm, t-conorm, and
//! the inner/outer operations of the matrix product, pre-bound once at
//! construction from the configured domain and t-norm.

use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};

use super::{
    AritGate, AritOp, BinaryValue, BoolGate, BoolGateKind, BoolValue, BoolVariable, ChoiceGate,
    ChoiceOp, CmpGate, CmpOp, Dimensions, NumConstant, NumIteGate, NumUnaryGate, NumUnaryOp,
    NumValue, NumVariable, Number, NumericMatrix, VarConstraint,
};
use crate::config::{Options, QuantitativeType, Tnorm};
use crate::error::TranslationError;
use crate::util::SparseSequence;

type SemiringOp = fn(&NumericFactory, &NumValue, &NumValue) -> Result<NumValue, TranslationError>;

/// The pluggable semiring: conjunction-like and disjunction-like scalar
/// operations, plus the inner (`meet`) and outer (`join`) operations of the
/// matrix product.
#[derive(Clone, Copy)]
pub struct Semiring {
    tnorm: SemiringOp,
    tconorm: SemiringOp,
    meet: SemiringOp,
    join: SemiringOp,
}

impl Semiring {
    fn select(domain: QuantitativeType, tnorm: Tnorm) -> Semiring {
        if domain == QuantitativeType::Integer {
            // the zero-guarded min/max pair, for every t-norm choice
            return Semiring {
                tnorm: t_min_zero,
                tconorm: s_max_zero,
                meet: t_min_zero,
                join: s_max_zero,
            };
        }
        let (t, s): (SemiringOp, SemiringOp) = match tnorm {
            Tnorm::Godelian => (t_min_zero, s_max_zero),
            Tnorm::Lukasiewicz => (t_lukasiewicz, s_lukasiewicz),
            Tnorm::Product => (t_product, s_product),
            Tnorm::Drastic => (t_drastic, s_drastic),
            Tnorm::Einstein => (t_einstein, s_einstein),
            Tnorm::AddMin => (t_min_zero, s_lukasiewicz),
            Tnorm::MaxProduct => (t_product, s_max_zero),
        };
        Semiring {
            tnorm: t,
            tconorm: s,
            meet: t,
            join: s,
        }
    }
}

fn t_min_zero(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    Ok(f.min_zero(a, b))
}

fn s_max_zero(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    Ok(f.max_zero(a, b))
}

fn t_lukasiewicz(
    f: &NumericFactory,
    a: &NumValue,
    b: &NumValue,
) -> Result<NumValue, TranslationError> {
    // max(0, a + b - 1)
    Ok(f.maximum(&NumValue::ZERO, &f.minus(&f.plus(a, b), &NumValue::ONE)))
}

fn s_lukasiewicz(
    f: &NumericFactory,
    a: &NumValue,
    b: &NumValue,
) -> Result<NumValue, TranslationError> {
    // min(a + b, 1)
    Ok(f.minimum(&f.plus(a, b), &NumValue::ONE))
}

fn t_product(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    Ok(f.times(a, b))
}

fn s_product(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    // a + b - a * b
    Ok(f.minus(&f.plus(a, b), &f.times(a, b)))
}

fn t_drastic(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    // b = 1 => a, a = 1 => b, 0
    let inner = f.ite(&f.cmp(CmpOp::Eq, a, &NumValue::ONE), b, &NumValue::ZERO);
    Ok(f.ite(&f.cmp(CmpOp::Eq, b, &NumValue::ONE), a, &inner))
}

fn s_drastic(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    // b = 0 => a, a = 0 => b, 1
    let inner = f.ite(&f.cmp(CmpOp::Eq, a, &NumValue::ZERO), b, &NumValue::ONE);
    Ok(f.ite(&f.cmp(CmpOp::Eq, b, &NumValue::ZERO), a, &inner))
}

fn t_einstein(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    // a * b / (1 + (1 - a) * (1 - b))
    let numerator = f.times(a, b);
    let complement = f.times(&f.minus(&NumValue::ONE, a), &f.minus(&NumValue::ONE, b));
    f.divide(&numerator, &f.plus(&NumValue::ONE, &complement))
}

fn s_einstein(f: &NumericFactory, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
    // (a + b) / (1 + a * b)
    f.divide(&f.plus(a, b), &f.plus(&NumValue::ONE, &f.times(a, b)))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BoolKey {
    And(Vec<i32>),
    Or(Vec<i32>),
    Not(i32),
    Ite(i32, i32, i32),
    Cmp(CmpOp, i32, i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NumKey {
    Arit(AritOp, Vec<i32>),
    Choice(ChoiceOp, i32, i32),
    Ite(i32, i32, i32),
    Unary(NumUnaryOp, i32),
}

/// A factory for creating scalar values and numeric matrices.
///
/// One factory serves one translation; all scalars combined by the matrix
/// layer must come from the same factory. The factory creates gates through
/// `&self` (interior mutability for the label counter and the interning
/// tables), matching how the translation threads it around.
pub struct NumericFactory {
    domain: QuantitativeType,
    tnorm_kind: Tnorm,
    semiring: Semiring,
    next_label: Cell<i32>,
    max_primary: Cell<i32>,
    vars: RefCell<FxHashMap<i32, NumVariable>>,
    constants: RefCell<FxHashMap<Number, NumValue>>,
    bool_cache: RefCell<FxHashMap<BoolKey, BoolValue>>,
    num_cache: RefCell<FxHashMap<NumKey, NumValue>>,
}

impl NumericFactory {
    /// Creates a factory for the given options, with no variables.
    pub fn new(options: &Options) -> Self {
        Self {
            domain: options.domain,
            tnorm_kind: options.tnorm,
            semiring: Semiring::select(options.domain, options.tnorm),
            next_label: Cell::new(1),
            max_primary: Cell::new(0),
            vars: RefCell::new(FxHashMap::default()),
            constants: RefCell::new(FxHashMap::default()),
            bool_cache: RefCell::new(FxHashMap::default()),
            num_cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Creates a factory initialized with `num_vars` fresh primary variables,
    /// labelled `1..=num_vars`.
    pub fn with_variables(options: &Options, num_vars: usize) -> Self {
        let factory = Self::new(options);
        factory.add_variables(num_vars);
        factory
    }

    /// The domain this factory interprets scalars over.
    pub fn factory_type(&self) -> QuantitativeType {
        self.domain
    }

    /// The configured t-norm.
    pub fn tnorm_kind(&self) -> Tnorm {
        self.tnorm_kind
    }

    fn allocate_label(&self) -> i32 {
        let label = self.next_label.get();
        self.next_label.set(label + 1);
        label
    }

    /*
     * -----------------------------------------------------------------
     * Constants and variables
     * -----------------------------------------------------------------
     */

    /// Returns the interned constant for `value`. Fuzzy constants are
    /// rounded to 16 decimal places, half-up.
    pub fn constant(&self, value: Number) -> NumValue {
        let value = match (self.domain, value) {
            (QuantitativeType::Fuzzy, Number::Real(r)) => Number::Real(Number::round16(r)),
            (QuantitativeType::Fuzzy, Number::Int(i)) => Number::Int(i),
            (QuantitativeType::Integer, v) => Number::Int(v.as_f64() as i64),
        };
        if value.is_zero() {
            return NumValue::ZERO;
        }
        if value.is_one() {
            return NumValue::ONE;
        }
        if let Some(cached) = self.constants.borrow().get(&value) {
            return cached.clone();
        }
        let c = NumValue::Constant(NumConstant::new(self.allocate_label(), value));
        self.constants.borrow_mut().insert(value, c.clone());
        c
    }

    /// Returns the interned constant for the integer `value`.
    pub fn int_constant(&self, value: i64) -> NumValue {
        self.constant(Number::Int(value))
    }

    /// Creates a fresh primary variable.
    pub fn fresh_variable(&self) -> NumVariable {
        let v = NumVariable::new(self.allocate_label(), VarConstraint::Free);
        self.vars.borrow_mut().insert(v.label(), v.clone());
        self.max_primary.set(v.label());
        v
    }

    /// Adds `num_vars` fresh primary variables.
    pub fn add_variables(&self, num_vars: usize) {
        for _ in 0..num_vars {
            self.fresh_variable();
        }
    }

    /// Returns the variable with the given label.
    ///
    /// # Panics
    /// Panics if no variable carries the label.
    pub fn variable(&self, label: i32) -> NumVariable {
        self.vars
            .borrow()
            .get(&label)
            .cloned()
            .unwrap_or_else(|| panic!("expected a variable label, given label = {}", label))
    }

    /// The number of variables allocated so far, auxiliary ones included.
    pub fn num_variables(&self) -> usize {
        self.vars.borrow().len()
    }

    /// All allocated variables, ascending by label.
    pub fn variables(&self) -> Vec<NumVariable> {
        let mut vars: Vec<NumVariable> = self.vars.borrow().values().cloned().collect();
        vars.sort_by_key(|v| v.label());
        vars
    }

    /// The highest primary-variable label produced.
    pub fn max_primary_variable(&self) -> i32 {
        self.max_primary.get()
    }

    /// Creates a fresh variable constrained non-zero.
    pub fn true_variable(&self) -> NumValue {
        let v = NumVariable::new(self.allocate_label(), VarConstraint::NonZero);
        self.vars.borrow_mut().insert(v.label(), v.clone());
        NumValue::Variable(v)
    }

    /// Returns the variable with the given label constrained non-zero,
    /// creating it if absent.
    pub fn true_variable_with_label(&self, label: i32) -> NumValue {
        if label >= self.next_label.get() {
            self.next_label.set(label + 1);
        }
        let mut vars = self.vars.borrow_mut();
        let v = vars
            .entry(label)
            .or_insert_with(|| NumVariable::new(label, VarConstraint::Free));
        v.set_constraint(VarConstraint::NonZero);
        NumValue::Variable(v.clone())
    }

    /*
     * -----------------------------------------------------------------
     * Boolean/numeric bridging
     * -----------------------------------------------------------------
     */

    /// Constrains the variable to `{0, 1}` and pairs it with its boolean
    /// counterpart of the same label.
    pub fn to_bool(&self, v: &NumVariable) -> NumValue {
        v.set_allowed_values((Number::Int(0), Number::Int(1)));
        NumValue::Binary(BinaryValue::new(
            v.label(),
            NumValue::Variable(v.clone()),
            BoolValue::Variable(BoolVariable::new(v.label())),
        ))
    }

    /// Lifts a boolean value into a `{0,1}`-valued numeric pair.
    pub fn to_binary(&self, b: &BoolValue) -> NumValue {
        if b.is_true() {
            return NumValue::ONE;
        }
        if b.is_false() {
            return NumValue::ZERO;
        }
        // the gate reuses the boolean value's label so the pair stays
        // addressable through one identifier
        let num = NumValue::Ite(NumIteGate::new(
            b.label(),
            b.clone(),
            NumValue::ONE,
            NumValue::ZERO,
        ));
        NumValue::Binary(BinaryValue::new(b.label(), num, b.clone()))
    }

    /// Lifts a boolean value into the numeric realm as a guarded non-zero
    /// variable.
    pub fn lift(&self, b: &BoolValue) -> NumValue {
        if b.is_true() {
            return self.true_variable();
        }
        if b.is_false() {
            return NumValue::ZERO;
        }
        let witness = self.true_variable_with_label(b.label());
        NumValue::Ite(NumIteGate::new(
            self.allocate_label(),
            b.clone(),
            witness,
            NumValue::ZERO,
        ))
    }

    /// Drops a numeric value to its boolean reading, `v != 0`.
    pub fn drop_value(&self, v: &NumValue) -> BoolValue {
        match v {
            NumValue::Constant(c) => BoolValue::Constant(!c.value().is_zero()),
            NumValue::Variable(var) if var.is_true() => BoolValue::TRUE,
            NumValue::Variable(var) if var.is_false() => BoolValue::FALSE,
            NumValue::Binary(b) => b.to_bool().clone(),
            _ => self.cmp(CmpOp::Neq, v, &NumValue::ZERO),
        }
    }

    /// Drops a numeric value to its boolean reading in a numeric context,
    /// `v != 0 ? 1 : 0`.
    pub fn drop_num(&self, v: &NumValue) -> NumValue {
        match v {
            NumValue::Constant(c) => {
                if c.value().is_zero() {
                    NumValue::ZERO
                } else {
                    NumValue::ONE
                }
            }
            NumValue::Variable(var) if var.is_true() => NumValue::ONE,
            NumValue::Variable(var) if var.is_false() => NumValue::ZERO,
            NumValue::Binary(b) => b.to_numeric().clone(),
            _ => self.ite(
                &self.cmp(CmpOp::Eq, v, &NumValue::ZERO),
                &NumValue::ZERO,
                &NumValue::ONE,
            ),
        }
    }

    /*
     * -----------------------------------------------------------------
     * Semiring operations
     * -----------------------------------------------------------------
     */

    /// Minimum of the operands where zero means absence: a zero side
    /// short-circuits the result to zero.
    pub fn min_zero(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if a.is_zero() || b.is_zero() {
            return NumValue::ZERO;
        }
        let both_present = self.and(
            &self.cmp(CmpOp::Neq, a, &NumValue::ZERO),
            &self.cmp(CmpOp::Neq, b, &NumValue::ZERO),
        );
        self.ite(&both_present, &self.minimum(a, b), &NumValue::ZERO)
    }

    /// Maximum of the operands where zero means absence: a zero side yields
    /// the other side.
    pub fn max_zero(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if a.is_zero() {
            return b.clone();
        }
        if b.is_zero() {
            return a.clone();
        }
        let both_present = self.and(
            &self.cmp(CmpOp::Neq, a, &NumValue::ZERO),
            &self.cmp(CmpOp::Neq, b, &NumValue::ZERO),
        );
        let one_side = self.ite(&self.cmp(CmpOp::Neq, a, &NumValue::ZERO), a, b);
        self.ite(&both_present, &self.maximum(a, b), &one_side)
    }

    /// The configured t-norm.
    pub fn tnorm(&self, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
        (self.semiring.tnorm)(self, a, b)
    }

    /// The configured t-conorm.
    pub fn tconorm(&self, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
        (self.semiring.tconorm)(self, a, b)
    }

    /// The inner operation of the matrix product.
    pub fn meet(&self, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
        (self.semiring.meet)(self, a, b)
    }

    /// The outer operation of the matrix product.
    pub fn join(&self, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
        (self.semiring.join)(self, a, b)
    }

    /*
     * -----------------------------------------------------------------
     * Arithmetic
     * -----------------------------------------------------------------
     */

    fn fold_closed(&self, op: AritOp, x: Number, y: Number) -> Number {
        match self.domain {
            QuantitativeType::Integer => {
                let (a, b) = (x.as_f64() as i64, y.as_f64() as i64);
                Number::Int(match op {
                    AritOp::Plus => a.saturating_add(b),
                    AritOp::Minus => a.saturating_sub(b),
                    AritOp::Times => a.saturating_mul(b),
                    AritOp::Div | AritOp::Mod => unreachable!("fold_closed excludes div/mod"),
                })
            }
            QuantitativeType::Fuzzy => {
                let (a, b) = (x.as_f64(), y.as_f64());
                Number::Real(Number::round16(match op {
                    AritOp::Plus => a + b,
                    AritOp::Minus => a - b,
                    AritOp::Times => a * b,
                    AritOp::Div | AritOp::Mod => unreachable!("fold_closed excludes div/mod"),
                }))
            }
        }
    }

    fn arit_gate(&self, op: AritOp, inputs: Vec<NumValue>) -> NumValue {
        let key = NumKey::Arit(op, inputs.iter().map(NumValue::label).collect());
        if let Some(cached) = self.num_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = NumValue::Arit(AritGate::new(self.allocate_label(), op, inputs));
        self.num_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Addition: `x + 0 = x`, constants fold.
    pub fn plus(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if a.is_zero() {
            return b.clone();
        }
        if b.is_zero() {
            return a.clone();
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return self.constant(self.fold_closed(AritOp::Plus, x, y));
        }
        self.arit_gate(AritOp::Plus, vec![a.clone(), b.clone()])
    }

    /// Subtraction: `x - 0 = x`, `0 - x = -x`, constants fold.
    pub fn minus(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if b.is_zero() {
            return a.clone();
        }
        if a.is_zero() {
            return self.negate(b);
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return self.constant(self.fold_closed(AritOp::Minus, x, y));
        }
        self.arit_gate(AritOp::Minus, vec![a.clone(), b.clone()])
    }

    /// Multiplication: `x * 1 = x`, `x * 0 = 0`, constants fold.
    pub fn times(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if a.is_one() {
            return b.clone();
        }
        if b.is_one() {
            return a.clone();
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return self.constant(self.fold_closed(AritOp::Times, x, y));
        }
        if a.is_zero() || b.is_zero() {
            return NumValue::ZERO;
        }
        self.arit_gate(AritOp::Times, vec![a.clone(), b.clone()])
    }

    /// Division: `x / 1 = x`; constant division by zero is a fault; a
    /// non-constant division keeps its structure behind a zero guard.
    pub fn divide(&self, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
        if b.is_one() {
            return Ok(a.clone());
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            if y.is_zero() {
                return Err(TranslationError::Arithmetic(format!(
                    "cannot divide by zero: {} / 0",
                    x
                )));
            }
            return Ok(match self.domain {
                QuantitativeType::Integer => {
                    self.constant(Number::Int((x.as_f64() as i64) / (y.as_f64() as i64)))
                }
                QuantitativeType::Fuzzy => {
                    self.constant(Number::Real(Number::round16(x.as_f64() / y.as_f64())))
                }
            });
        }
        let gate = self.arit_gate(AritOp::Div, vec![a.clone(), b.clone()]);
        Ok(self.ite(&self.cmp(CmpOp::Eq, b, &NumValue::ZERO), &NumValue::ZERO, &gate))
    }

    /// Modulo: `x mod 1 = 0`, `x mod x = 0`; constant modulo by zero is a
    /// fault.
    pub fn modulo(&self, a: &NumValue, b: &NumValue) -> Result<NumValue, TranslationError> {
        if b.is_one() || a == b {
            return Ok(NumValue::ZERO);
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            if y.is_zero() {
                return Err(TranslationError::Arithmetic(format!(
                    "cannot take modulo by zero: {} mod 0",
                    x
                )));
            }
            return Ok(match self.domain {
                QuantitativeType::Integer => {
                    self.constant(Number::Int((x.as_f64() as i64) % (y.as_f64() as i64)))
                }
                QuantitativeType::Fuzzy => {
                    self.constant(Number::Real(Number::round16(x.as_f64() % y.as_f64())))
                }
            });
        }
        Ok(self.arit_gate(AritOp::Mod, vec![a.clone(), b.clone()]))
    }

    /// Minimum: `min(a, a) = a`, constants fold.
    pub fn minimum(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if a == b {
            return a.clone();
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return if x > y { b.clone() } else { a.clone() };
        }
        self.choice_gate(ChoiceOp::Min, a, b)
    }

    /// Maximum: `max(a, a) = a`, constants fold.
    pub fn maximum(&self, a: &NumValue, b: &NumValue) -> NumValue {
        if a == b {
            return a.clone();
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return if x < y { b.clone() } else { a.clone() };
        }
        self.choice_gate(ChoiceOp::Max, a, b)
    }

    fn choice_gate(&self, op: ChoiceOp, a: &NumValue, b: &NumValue) -> NumValue {
        let key = NumKey::Choice(op, a.label(), b.label());
        if let Some(cached) = self.num_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = NumValue::Choice(ChoiceGate::new(
            self.allocate_label(),
            op,
            a.clone(),
            b.clone(),
        ));
        self.num_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Negation: constants fold, `neg(neg(x)) = x`.
    pub fn negate(&self, v: &NumValue) -> NumValue {
        if let Some(x) = v.as_number() {
            return self.constant(match x {
                Number::Int(i) => Number::Int(-i),
                Number::Real(r) => Number::Real(-r),
            });
        }
        if let NumValue::Unary(g) = v {
            if g.op() == NumUnaryOp::Neg {
                return g.input().clone();
            }
        }
        self.unary_gate(NumUnaryOp::Neg, v)
    }

    /// Absolute value: constants fold, `abs(abs(x)) = abs(x)`.
    pub fn abs(&self, v: &NumValue) -> NumValue {
        if let Some(x) = v.as_number() {
            return if x.as_f64() >= 0.0 {
                v.clone()
            } else {
                self.negate(v)
            };
        }
        if let NumValue::Unary(g) = v {
            if g.op() == NumUnaryOp::Abs {
                return v.clone();
            }
        }
        self.unary_gate(NumUnaryOp::Abs, v)
    }

    /// Sign: constants fold, `sgn(sgn(x)) = sgn(x)`.
    pub fn signum(&self, v: &NumValue) -> NumValue {
        if let Some(x) = v.as_number() {
            let value = x.as_f64();
            return if value > 0.0 {
                NumValue::ONE
            } else if value < 0.0 {
                self.int_constant(-1)
            } else {
                NumValue::ZERO
            };
        }
        if let NumValue::Unary(g) = v {
            if g.op() == NumUnaryOp::Sgn {
                return v.clone();
            }
        }
        self.unary_gate(NumUnaryOp::Sgn, v)
    }

    fn unary_gate(&self, op: NumUnaryOp, v: &NumValue) -> NumValue {
        let key = NumKey::Unary(op, v.label());
        if let Some(cached) = self.num_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = NumValue::Unary(NumUnaryGate::new(self.allocate_label(), op, v.clone()));
        self.num_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Accumulates the inputs under the given closed operator (plus, minus,
    /// or times). An all-constant accumulator folds to one constant; one
    /// input passes through; two make a binary gate; more an n-ary gate.
    pub fn accumulate(&self, op: AritOp, inputs: Vec<NumValue>) -> NumValue {
        debug_assert!(
            matches!(op, AritOp::Plus | AritOp::Minus | AritOp::Times),
            "accumulation is for closed operators"
        );
        if inputs.is_empty() {
            return NumValue::ZERO;
        }
        if inputs.iter().all(|v| v.is_constant()) {
            let mut value = inputs[0].as_number().unwrap();
            for v in &inputs[1..] {
                value = self.fold_closed(op, value, v.as_number().unwrap());
            }
            return self.constant(value);
        }
        if inputs.len() == 1 {
            return inputs.into_iter().next().unwrap();
        }
        self.arit_gate(op, inputs)
    }

    /// Accumulated addition of the inputs.
    pub fn plus_all(&self, inputs: Vec<NumValue>) -> NumValue {
        let inputs: Vec<NumValue> = inputs.into_iter().filter(|v| !v.is_zero()).collect();
        self.accumulate(AritOp::Plus, inputs)
    }

    /*
     * -----------------------------------------------------------------
     * Comparisons
     * -----------------------------------------------------------------
     */

    /// Compares two scalars; identical operands and constants fold.
    pub fn cmp(&self, op: CmpOp, a: &NumValue, b: &NumValue) -> BoolValue {
        if a == b {
            return BoolValue::Constant(matches!(op, CmpOp::Eq | CmpOp::Gte | CmpOp::Lte));
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return BoolValue::Constant(op.eval(x, y));
        }
        let key = BoolKey::Cmp(op, a.label(), b.label());
        if let Some(cached) = self.bool_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = BoolValue::Cmp(CmpGate::new(self.allocate_label(), op, a.clone(), b.clone()));
        self.bool_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// `a = b`
    pub fn eq(&self, a: &NumValue, b: &NumValue) -> BoolValue {
        self.cmp(CmpOp::Eq, a, b)
    }

    /// `a != b`
    pub fn neq(&self, a: &NumValue, b: &NumValue) -> BoolValue {
        self.cmp(CmpOp::Neq, a, b)
    }

    /// `a < b`
    pub fn lt(&self, a: &NumValue, b: &NumValue) -> BoolValue {
        self.cmp(CmpOp::Lt, a, b)
    }

    /// `a <= b`
    pub fn lte(&self, a: &NumValue, b: &NumValue) -> BoolValue {
        self.cmp(CmpOp::Lte, a, b)
    }

    /// `a > b`
    pub fn gt(&self, a: &NumValue, b: &NumValue) -> BoolValue {
        self.cmp(CmpOp::Gt, a, b)
    }

    /// `a >= b`
    pub fn gte(&self, a: &NumValue, b: &NumValue) -> BoolValue {
        self.cmp(CmpOp::Gte, a, b)
    }

    /// Compares two sparse cell sequences cellwise over the union of their
    /// supports, absent cells reading as zero. `Lt`/`Gt` additionally
    /// require at least one strict cell.
    pub(crate) fn cmp_cells(
        &self,
        op: CmpOp,
        m: &SparseSequence<NumValue>,
        n: &SparseSequence<NumValue>,
    ) -> BoolValue {
        if m.is_empty() && n.is_empty() {
            return BoolValue::Constant(!matches!(op, CmpOp::Gt | CmpOp::Lt));
        }

        let indices: std::collections::BTreeSet<usize> =
            m.indices().into_iter().chain(n.indices()).collect();
        let cell = |seq: &SparseSequence<NumValue>, i: usize| {
            seq.get(i).cloned().unwrap_or(NumValue::ZERO)
        };

        let cellwise = |weak_op: CmpOp| {
            let mut acc = Vec::with_capacity(indices.len());
            for &i in &indices {
                let c = self.cmp(weak_op, &cell(m, i), &cell(n, i));
                if c.is_false() {
                    return BoolValue::FALSE;
                }
                acc.push(c);
            }
            self.and_all(acc)
        };

        match op {
            CmpOp::Gt | CmpOp::Lt => {
                let weak = if op == CmpOp::Gt { CmpOp::Gte } else { CmpOp::Lte };
                let ordering = cellwise(weak);
                if ordering.is_false() {
                    return BoolValue::FALSE;
                }
                let mut strict = Vec::with_capacity(indices.len());
                for &i in &indices {
                    let c = self.cmp(op, &cell(m, i), &cell(n, i));
                    if c.is_true() {
                        return ordering;
                    }
                    strict.push(c);
                }
                self.and(&ordering, &self.or_all(strict))
            }
            _ => cellwise(op),
        }
    }

    /*
     * -----------------------------------------------------------------
     * Boolean connectives
     * -----------------------------------------------------------------
     */

    /// Conjunction with constant collapsing.
    pub fn and(&self, a: &BoolValue, b: &BoolValue) -> BoolValue {
        self.and_all(vec![a.clone(), b.clone()])
    }

    /// N-ary conjunction with constant collapsing.
    pub fn and_all(&self, mut inputs: Vec<BoolValue>) -> BoolValue {
        if inputs.iter().any(BoolValue::is_false) {
            return BoolValue::FALSE;
        }
        inputs.retain(|v| !v.is_true());
        if inputs.is_empty() {
            return BoolValue::TRUE;
        }
        if inputs.len() == 1 {
            return inputs.into_iter().next().unwrap();
        }
        let key = BoolKey::And(inputs.iter().map(BoolValue::label).collect());
        if let Some(cached) = self.bool_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = BoolValue::Gate(BoolGate::new(
            self.allocate_label(),
            BoolGateKind::And(inputs),
        ));
        self.bool_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Disjunction with constant collapsing.
    pub fn or(&self, a: &BoolValue, b: &BoolValue) -> BoolValue {
        self.or_all(vec![a.clone(), b.clone()])
    }

    /// N-ary disjunction with constant collapsing.
    pub fn or_all(&self, mut inputs: Vec<BoolValue>) -> BoolValue {
        if inputs.iter().any(BoolValue::is_true) {
            return BoolValue::TRUE;
        }
        inputs.retain(|v| !v.is_false());
        if inputs.is_empty() {
            return BoolValue::FALSE;
        }
        if inputs.len() == 1 {
            return inputs.into_iter().next().unwrap();
        }
        let key = BoolKey::Or(inputs.iter().map(BoolValue::label).collect());
        if let Some(cached) = self.bool_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = BoolValue::Gate(BoolGate::new(
            self.allocate_label(),
            BoolGateKind::Or(inputs),
        ));
        self.bool_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Conjunction of the negations of the inputs.
    pub fn nand_all(&self, inputs: Vec<BoolValue>) -> BoolValue {
        let negated = inputs.iter().map(|v| self.not(v)).collect();
        self.and_all(negated)
    }

    /// Negation: constants flip, comparisons complement, double negations
    /// cancel.
    pub fn not(&self, v: &BoolValue) -> BoolValue {
        match v {
            BoolValue::Constant(b) => BoolValue::Constant(!b),
            BoolValue::Cmp(c) => self.cmp(c.op().negated(), c.left(), c.right()),
            BoolValue::Gate(g) => {
                if let BoolGateKind::Not(inner) = g.kind() {
                    return inner.clone();
                }
                self.not_gate(v)
            }
            _ => self.not_gate(v),
        }
    }

    fn not_gate(&self, v: &BoolValue) -> BoolValue {
        let key = BoolKey::Not(v.label());
        if let Some(cached) = self.bool_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = BoolValue::Gate(BoolGate::new(
            self.allocate_label(),
            BoolGateKind::Not(v.clone()),
        ));
        self.bool_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Implication, `!a | b`.
    pub fn implies(&self, a: &BoolValue, b: &BoolValue) -> BoolValue {
        self.or(&self.not(a), b)
    }

    /// Biconditional, `(a => b) & (b => a)`.
    pub fn iff(&self, a: &BoolValue, b: &BoolValue) -> BoolValue {
        self.and(&self.implies(a, b), &self.implies(b, a))
    }

    /// Numeric if-then-else: `ite(c, a, a) = a`, constant conditions select
    /// an arm.
    pub fn ite(&self, condition: &BoolValue, a: &NumValue, b: &NumValue) -> NumValue {
        if a == b {
            return a.clone();
        }
        if condition.is_true() {
            return a.clone();
        }
        if condition.is_false() {
            return b.clone();
        }
        let key = NumKey::Ite(condition.label(), a.label(), b.label());
        if let Some(cached) = self.num_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = NumValue::Ite(NumIteGate::new(
            self.allocate_label(),
            condition.clone(),
            a.clone(),
            b.clone(),
        ));
        self.num_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Boolean if-then-else with the analogous collapses.
    pub fn ite_bool(&self, condition: &BoolValue, a: &BoolValue, b: &BoolValue) -> BoolValue {
        if a == b {
            return a.clone();
        }
        if condition.is_true() {
            return a.clone();
        }
        if condition.is_false() {
            return b.clone();
        }
        let key = BoolKey::Ite(condition.label(), a.label(), b.label());
        if let Some(cached) = self.bool_cache.borrow().get(&key) {
            return cached.clone();
        }
        let gate = BoolValue::Gate(BoolGate::new(
            self.allocate_label(),
            BoolGateKind::Ite {
                condition: condition.clone(),
                then_value: a.clone(),
                else_value: b.clone(),
            },
        ));
        self.bool_cache.borrow_mut().insert(key, gate.clone());
        gate
    }

    /// Selects the value when the condition holds and zero otherwise.
    pub fn guard(&self, condition: &BoolValue, v: &NumValue) -> NumValue {
        self.ite(condition, v, &NumValue::ZERO)
    }

    /*
     * -----------------------------------------------------------------
     * Matrix construction
     * -----------------------------------------------------------------
     */

    /// An empty numeric matrix with the given dimensions.
    pub fn matrix(&self, dims: Dimensions) -> NumericMatrix {
        NumericMatrix::empty(dims, false)
    }

    /// An empty `{0,1}`-valued matrix with the given dimensions.
    pub fn boolean_matrix(&self, dims: Dimensions) -> NumericMatrix {
        NumericMatrix::empty(dims, true)
    }

    /// A numeric matrix storing `ONE` at `true_indices`; `all_indices`
    /// delimits the cells the matrix is expected to hold.
    pub fn matrix_with_bounds(
        &self,
        dims: Dimensions,
        all_indices: &[usize],
        true_indices: &[usize],
    ) -> NumericMatrix {
        NumericMatrix::with_bounds(dims, false, all_indices, true_indices)
    }

    /// The boolean analogue of [`Self::matrix_with_bounds`].
    pub fn boolean_matrix_with_bounds(
        &self,
        dims: Dimensions,
        all_indices: &[usize],
        true_indices: &[usize],
    ) -> NumericMatrix {
        NumericMatrix::with_bounds(dims, true, all_indices, true_indices)
    }

    /// A matrix storing the same value at every given index.
    pub fn constant_matrix(
        &self,
        dims: Dimensions,
        indices: Vec<usize>,
        value: NumValue,
    ) -> NumericMatrix {
        NumericMatrix::homogeneous(dims, indices, value)
    }
}

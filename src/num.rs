//! Scalar circuit representation
//!
//! The numeric layer is the intermediate representation used when lowering
//! relational formulas to an SMT problem. A scalar value is a constant, a
//! variable, or a gate; boolean and numeric scalars are separate types that
//! bridge through comparison gates (numeric → boolean) and conditional
//! gates (boolean → numeric). Every value carries an integer label; labels
//! drive hash-consing, SMT naming, and model lift-back.
//!
//! Key types:
//! - [`Number`]: an integer or rounded real constant value
//! - [`BoolValue`] / [`NumValue`]: the two scalar kinds
//! - [`NumVariable`]: primary variable with a mutable value constraint
//! - [`BinaryValue`]: a `{0,1}`-valued scalar addressable from both sides
//! - [`NumericFactory`]: the single allocator of scalar nodes
//! - [`NumericMatrix`]: sparse tensor of numeric scalars

pub mod division;
pub mod factory;
pub mod matrix;
mod matrix_ops;

pub use division::DivisionDetector;
pub use factory::NumericFactory;
pub use matrix::{Dimensions, NumericMatrix};

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Number of decimal places a real constant is rounded to.
pub const DECIMAL_PLACES: u32 = 16;

/// Label of the interned ZERO constant.
pub const ZERO_LABEL: i32 = i32::MIN;
/// Label of the interned ONE constant.
pub const ONE_LABEL: i32 = i32::MIN + 1;

/// A constant scalar value: an integer, or a real canonicalized to
/// [`DECIMAL_PLACES`] decimal places.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// Integer value
    Int(i64),
    /// Real value, already rounded
    Real(f64),
}

impl Number {
    /// The value as a double, the common comparison ground.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Real(r) => r,
        }
    }

    /// True if the value is zero.
    pub fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }

    /// True if the value is one.
    pub fn is_one(self) -> bool {
        self.as_f64() == 1.0
    }

    /// Rounds a real to [`DECIMAL_PLACES`] decimal places, half-up.
    pub fn round16(value: f64) -> f64 {
        const SCALE: f64 = 1e16;
        // f64::round rounds halves away from zero
        (value * SCALE).round() / SCALE
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.as_f64() == other.as_f64()
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.as_f64().partial_cmp(&other.as_f64())
    }
}

impl std::hash::Hash for Number {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_f64().to_bits().hash(state);
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Real(r) => write!(f, "{}", r),
        }
    }
}

/// Operators of arithmetic gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AritOp {
    /// Addition
    Plus,
    /// Subtraction
    Minus,
    /// Multiplication
    Times,
    /// Division
    Div,
    /// Modulo
    Mod,
}

/// Operators of choice gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceOp {
    /// Minimum of the operands
    Min,
    /// Maximum of the operands
    Max,
}

/// Operators of unary numeric gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumUnaryOp {
    /// Negation
    Neg,
    /// Absolute value
    Abs,
    /// Sign
    Sgn,
}

/// Comparison operators; a comparison gate is boolean-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Neq,
    /// Less than
    Lt,
    /// Less or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater or equal
    Gte,
}

impl CmpOp {
    /// The complement operator, used to fuse negation into comparisons.
    pub fn negated(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Neq,
            CmpOp::Neq => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Gte,
            CmpOp::Lte => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Lte,
            CmpOp::Gte => CmpOp::Lt,
        }
    }

    /// Compares two constant values under this operator.
    pub fn eval(self, left: Number, right: Number) -> bool {
        let (x, y) = (left.as_f64(), right.as_f64());
        match self {
            CmpOp::Eq => x == y,
            CmpOp::Neq => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Lte => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Gte => x >= y,
        }
    }
}

/// A boolean variable, paired with a numeric twin by [`BinaryValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVariable {
    label: i32,
}

impl BoolVariable {
    pub(crate) fn new(label: i32) -> Self {
        Self { label }
    }

    /// Returns the label of this variable.
    pub fn label(&self) -> i32 {
        self.label
    }
}

/// Boolean gate kinds.
#[derive(Debug)]
pub enum BoolGateKind {
    /// N-ary conjunction
    And(Vec<BoolValue>),
    /// N-ary disjunction
    Or(Vec<BoolValue>),
    /// Negation
    Not(BoolValue),
    /// If-then-else over boolean arms
    Ite {
        /// Condition
        condition: BoolValue,
        /// Value when the condition holds
        then_value: BoolValue,
        /// Value otherwise
        else_value: BoolValue,
    },
}

/// A boolean gate, shared by reference.
#[derive(Debug, Clone)]
pub struct BoolGate {
    inner: Rc<BoolGateInner>,
}

#[derive(Debug)]
struct BoolGateInner {
    label: i32,
    kind: BoolGateKind,
}

impl BoolGate {
    pub(crate) fn new(label: i32, kind: BoolGateKind) -> Self {
        Self {
            inner: Rc::new(BoolGateInner { label, kind }),
        }
    }

    /// Returns the label of this gate.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the gate kind.
    pub fn kind(&self) -> &BoolGateKind {
        &self.inner.kind
    }
}

/// A boolean-valued comparison of two numeric scalars.
#[derive(Debug, Clone)]
pub struct CmpGate {
    inner: Rc<CmpGateInner>,
}

#[derive(Debug)]
struct CmpGateInner {
    label: i32,
    op: CmpOp,
    left: NumValue,
    right: NumValue,
}

impl CmpGate {
    pub(crate) fn new(label: i32, op: CmpOp, left: NumValue, right: NumValue) -> Self {
        Self {
            inner: Rc::new(CmpGateInner {
                label,
                op,
                left,
                right,
            }),
        }
    }

    /// Returns the label of this gate.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the comparison operator.
    pub fn op(&self) -> CmpOp {
        self.inner.op
    }

    /// Returns the left operand.
    pub fn left(&self) -> &NumValue {
        &self.inner.left
    }

    /// Returns the right operand.
    pub fn right(&self) -> &NumValue {
        &self.inner.right
    }
}

/// A boolean scalar: constant, variable, gate, or comparison.
#[derive(Debug, Clone)]
pub enum BoolValue {
    /// TRUE (label 0) or FALSE (label -1)
    Constant(bool),
    /// Boolean variable
    Variable(BoolVariable),
    /// Boolean gate
    Gate(BoolGate),
    /// Numeric comparison
    Cmp(CmpGate),
}

impl BoolValue {
    /// The TRUE constant.
    pub const TRUE: BoolValue = BoolValue::Constant(true);
    /// The FALSE constant.
    pub const FALSE: BoolValue = BoolValue::Constant(false);

    /// Returns the label of this value. Constants have the fixed labels
    /// TRUE = 0 and FALSE = -1.
    pub fn label(&self) -> i32 {
        match self {
            BoolValue::Constant(true) => 0,
            BoolValue::Constant(false) => -1,
            BoolValue::Variable(v) => v.label(),
            BoolValue::Gate(g) => g.label(),
            BoolValue::Cmp(c) => c.label(),
        }
    }

    /// True if this is the TRUE constant.
    pub fn is_true(&self) -> bool {
        matches!(self, BoolValue::Constant(true))
    }

    /// True if this is the FALSE constant.
    pub fn is_false(&self) -> bool {
        matches!(self, BoolValue::Constant(false))
    }

    /// Returns the constant value, if this is a constant.
    pub fn as_constant(&self) -> Option<bool> {
        match self {
            BoolValue::Constant(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for BoolValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BoolValue::Constant(a), BoolValue::Constant(b)) => a == b,
            (BoolValue::Constant(_), _) | (_, BoolValue::Constant(_)) => false,
            _ => self.label() == other.label(),
        }
    }
}

impl Eq for BoolValue {}

impl std::hash::Hash for BoolValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.label().hash(state);
    }
}

/// The value constraint attached to a numeric variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarConstraint {
    /// The variable may take any value of the domain
    Free,
    /// The variable must be non-zero (boolean-true)
    NonZero,
    /// The variable must be zero (boolean-false)
    Zero,
}

/// A numeric variable.
///
/// Primary variables encode the weight of a potentially-present tuple; the
/// constraint, maximum value, and allowed-value list are set after creation
/// as bounds information arrives, which is why they sit behind cells.
#[derive(Debug, Clone)]
pub struct NumVariable {
    inner: Rc<NumVariableInner>,
}

#[derive(Debug)]
struct NumVariableInner {
    label: i32,
    constraint: Cell<VarConstraint>,
    max_value: Cell<Option<Number>>,
    allowed_values: Cell<Option<(Number, Number)>>,
}

impl NumVariable {
    pub(crate) fn new(label: i32, constraint: VarConstraint) -> Self {
        Self {
            inner: Rc::new(NumVariableInner {
                label,
                constraint: Cell::new(constraint),
                max_value: Cell::new(None),
                allowed_values: Cell::new(None),
            }),
        }
    }

    /// Returns the label of this variable.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the current value constraint.
    pub fn constraint(&self) -> VarConstraint {
        self.inner.constraint.get()
    }

    /// Updates the value constraint.
    pub fn set_constraint(&self, constraint: VarConstraint) {
        self.inner.constraint.set(constraint);
    }

    /// True if the variable is constrained non-zero.
    pub fn is_true(&self) -> bool {
        self.constraint() == VarConstraint::NonZero
    }

    /// True if the variable is constrained zero.
    pub fn is_false(&self) -> bool {
        self.constraint() == VarConstraint::Zero
    }

    /// Returns the maximum value, if one was set.
    pub fn max_value(&self) -> Option<Number> {
        self.inner.max_value.get()
    }

    /// Sets the maximum value.
    pub fn set_max_value(&self, max: Option<Number>) {
        self.inner.max_value.set(max);
    }

    /// Returns the pair of allowed values, if one was installed.
    pub fn allowed_values(&self) -> Option<(Number, Number)> {
        self.inner.allowed_values.get()
    }

    /// Restricts this variable to the two given values. The only pair ever
    /// installed is `{0, 1}`, by [`NumericFactory::to_bool`].
    pub fn set_allowed_values(&self, values: (Number, Number)) {
        self.inner.allowed_values.set(Some(values));
    }
}

/// An arithmetic gate over two or more operands.
#[derive(Debug, Clone)]
pub struct AritGate {
    inner: Rc<AritGateInner>,
}

#[derive(Debug)]
struct AritGateInner {
    label: i32,
    op: AritOp,
    inputs: Vec<NumValue>,
}

impl AritGate {
    pub(crate) fn new(label: i32, op: AritOp, inputs: Vec<NumValue>) -> Self {
        assert!(inputs.len() >= 2, "arithmetic gate needs at least two inputs");
        Self {
            inner: Rc::new(AritGateInner { label, op, inputs }),
        }
    }

    /// Returns the label of this gate.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the operator.
    pub fn op(&self) -> AritOp {
        self.inner.op
    }

    /// Returns the operands.
    pub fn inputs(&self) -> &[NumValue] {
        &self.inner.inputs
    }
}

/// A min/max choice gate.
#[derive(Debug, Clone)]
pub struct ChoiceGate {
    inner: Rc<ChoiceGateInner>,
}

#[derive(Debug)]
struct ChoiceGateInner {
    label: i32,
    op: ChoiceOp,
    left: NumValue,
    right: NumValue,
}

impl ChoiceGate {
    pub(crate) fn new(label: i32, op: ChoiceOp, left: NumValue, right: NumValue) -> Self {
        Self {
            inner: Rc::new(ChoiceGateInner {
                label,
                op,
                left,
                right,
            }),
        }
    }

    /// Returns the label of this gate.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the operator.
    pub fn op(&self) -> ChoiceOp {
        self.inner.op
    }

    /// Returns the left operand.
    pub fn left(&self) -> &NumValue {
        &self.inner.left
    }

    /// Returns the right operand.
    pub fn right(&self) -> &NumValue {
        &self.inner.right
    }
}

/// A numeric if-then-else gate with a boolean condition.
#[derive(Debug, Clone)]
pub struct NumIteGate {
    inner: Rc<NumIteGateInner>,
}

#[derive(Debug)]
struct NumIteGateInner {
    label: i32,
    condition: BoolValue,
    then_value: NumValue,
    else_value: NumValue,
}

impl NumIteGate {
    pub(crate) fn new(
        label: i32,
        condition: BoolValue,
        then_value: NumValue,
        else_value: NumValue,
    ) -> Self {
        Self {
            inner: Rc::new(NumIteGateInner {
                label,
                condition,
                then_value,
                else_value,
            }),
        }
    }

    /// Returns the label of this gate.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the condition.
    pub fn condition(&self) -> &BoolValue {
        &self.inner.condition
    }

    /// Returns the then-arm.
    pub fn then_value(&self) -> &NumValue {
        &self.inner.then_value
    }

    /// Returns the else-arm.
    pub fn else_value(&self) -> &NumValue {
        &self.inner.else_value
    }
}

/// A unary numeric gate.
#[derive(Debug, Clone)]
pub struct NumUnaryGate {
    inner: Rc<NumUnaryGateInner>,
}

#[derive(Debug)]
struct NumUnaryGateInner {
    label: i32,
    op: NumUnaryOp,
    input: NumValue,
}

impl NumUnaryGate {
    pub(crate) fn new(label: i32, op: NumUnaryOp, input: NumValue) -> Self {
        Self {
            inner: Rc::new(NumUnaryGateInner { label, op, input }),
        }
    }

    /// Returns the label of this gate.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// Returns the operator.
    pub fn op(&self) -> NumUnaryOp {
        self.inner.op
    }

    /// Returns the operand.
    pub fn input(&self) -> &NumValue {
        &self.inner.input
    }
}

/// A `{0,1}`-valued scalar addressable from both the numeric and the
/// boolean side, with the pairing invariant `num = if bool { 1 } else { 0 }`.
#[derive(Debug, Clone)]
pub struct BinaryValue {
    inner: Rc<BinaryValueInner>,
}

#[derive(Debug)]
struct BinaryValueInner {
    label: i32,
    num: NumValue,
    bool: BoolValue,
}

impl BinaryValue {
    pub(crate) fn new(label: i32, num: NumValue, bool: BoolValue) -> Self {
        Self {
            inner: Rc::new(BinaryValueInner { label, num, bool }),
        }
    }

    /// Returns the shared label of the pair.
    pub fn label(&self) -> i32 {
        self.inner.label
    }

    /// The numeric side of the pair.
    pub fn to_numeric(&self) -> &NumValue {
        &self.inner.num
    }

    /// The boolean side of the pair.
    pub fn to_bool(&self) -> &BoolValue {
        &self.inner.bool
    }
}

/// A numeric scalar: constant, variable, gate, or binary pair.
#[derive(Debug, Clone)]
pub enum NumValue {
    /// Constant
    Constant(NumConstant),
    /// Primary or auxiliary variable
    Variable(NumVariable),
    /// Arithmetic gate
    Arit(AritGate),
    /// Min/max gate
    Choice(ChoiceGate),
    /// If-then-else gate
    Ite(NumIteGate),
    /// Unary gate
    Unary(NumUnaryGate),
    /// `{0,1}`-valued binary pair
    Binary(BinaryValue),
}

/// A labelled constant scalar.
#[derive(Debug, Clone, Copy)]
pub struct NumConstant {
    label: i32,
    value: Number,
}

impl NumConstant {
    pub(crate) fn new(label: i32, value: Number) -> Self {
        Self { label, value }
    }

    /// Returns the label of this constant.
    pub fn label(&self) -> i32 {
        self.label
    }

    /// Returns the constant value.
    pub fn value(&self) -> Number {
        self.value
    }
}

impl NumValue {
    /// The interned zero constant.
    pub const ZERO: NumValue = NumValue::Constant(NumConstant {
        label: ZERO_LABEL,
        value: Number::Int(0),
    });

    /// The interned one constant.
    pub const ONE: NumValue = NumValue::Constant(NumConstant {
        label: ONE_LABEL,
        value: Number::Int(1),
    });

    /// Returns the label of this value.
    pub fn label(&self) -> i32 {
        match self {
            NumValue::Constant(c) => c.label(),
            NumValue::Variable(v) => v.label(),
            NumValue::Arit(g) => g.label(),
            NumValue::Choice(g) => g.label(),
            NumValue::Ite(g) => g.label(),
            NumValue::Unary(g) => g.label(),
            NumValue::Binary(b) => b.label(),
        }
    }

    /// Returns the constant value, if this is a constant.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            NumValue::Constant(c) => Some(c.value()),
            _ => None,
        }
    }

    /// True if this is the zero constant.
    pub fn is_zero(&self) -> bool {
        matches!(self.as_number(), Some(n) if n.is_zero())
    }

    /// True if this is the one constant.
    pub fn is_one(&self) -> bool {
        matches!(self.as_number(), Some(n) if n.is_one())
    }

    /// True if this is a constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, NumValue::Constant(_))
    }

    /// Returns the variable, if this is one.
    pub fn as_variable(&self) -> Option<&NumVariable> {
        match self {
            NumValue::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for NumValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NumValue::Constant(a), NumValue::Constant(b)) => a.value() == b.value(),
            (NumValue::Constant(_), _) | (_, NumValue::Constant(_)) => false,
            _ => self.label() == other.label(),
        }
    }
}

impl Eq for NumValue {}

impl std::hash::Hash for NumValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            NumValue::Constant(c) => c.value().hash(state),
            _ => self.label().hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_constants() {
        assert_eq!(NumValue::ZERO.label(), ZERO_LABEL);
        assert_eq!(NumValue::ONE.label(), ONE_LABEL);
        assert!(NumValue::ZERO.is_zero());
        assert!(NumValue::ONE.is_one());
    }

    #[test]
    fn constants_compare_by_value() {
        let a = NumValue::Constant(NumConstant::new(17, Number::Real(0.5)));
        let b = NumValue::Constant(NumConstant::new(99, Number::Real(0.5)));
        assert_eq!(a, b);

        let int_one = NumValue::Constant(NumConstant::new(3, Number::Int(1)));
        assert_eq!(int_one, NumValue::ONE);
    }

    #[test]
    fn bool_constant_labels() {
        assert_eq!(BoolValue::TRUE.label(), 0);
        assert_eq!(BoolValue::FALSE.label(), -1);
        assert_ne!(BoolValue::TRUE, BoolValue::FALSE);
    }

    #[test]
    fn variable_constraints_mutate() {
        let v = NumVariable::new(1, VarConstraint::Free);
        assert!(!v.is_true());
        v.set_constraint(VarConstraint::NonZero);
        assert!(v.is_true());
        assert!(!v.is_false());
    }

    #[test]
    fn cmp_op_negation() {
        assert_eq!(CmpOp::Eq.negated(), CmpOp::Neq);
        assert_eq!(CmpOp::Lt.negated(), CmpOp::Gte);
        assert_eq!(CmpOp::Gte.negated(), CmpOp::Lt);
    }

    #[test]
    fn round16_rounds_at_the_sixteenth_place() {
        assert_eq!(Number::round16(0.5), 0.5);
        assert_eq!(Number::round16(1.23e-16), 1e-16);
        assert_eq!(Number::round16(1.73e-16), 2e-16);
    }

    #[test]
    fn number_ordering() {
        assert!(Number::Int(1) > Number::Real(0.5));
        assert_eq!(Number::Int(1), Number::Real(1.0));
    }
}

//! Compiled condition trees
//!
//! A rule's body is an ordered list of [`Pattern`]s, one per join position. Each pattern
//! runs an ordered list of per-argument [`ArgCheck`]s against its candidate fact and then
//! an ordered list of [`Guard`]s over the bound local variables. Evaluation stops at the
//! first failing check, and the first failing position fails the whole combination.
//!
//! Local variables live in [`Bindings`], a slot buffer indexed by compile-time slot
//! numbers. A `Bind` check either binds an unset slot or unifies with the bound value,
//! which is how join variables (including self-joins) are expressed.

use crate::error::{EngineError, EngineResult};
use crate::fact::{Fact, FactId};
use serde::{Deserialize, Serialize};
use sift_types::Value;
use std::cmp::Ordering;

/// Index of a local variable in a rule's binding buffer
pub type Slot = usize;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    /// Compare two values.
    ///
    /// Ordering operators need two numbers. Equality compares numbers numerically and
    /// other values structurally, provided both sides share a variant or one side is
    /// `None`. Any other pairing is an error.
    pub fn apply(self, left: &Value, right: &Value) -> EngineResult<bool> {
        if left.is_numeric() && right.is_numeric() {
            let ordering = numeric_ordering(left, right);
            return Ok(match self {
                CompareOp::Lt => ordering == Some(Ordering::Less),
                CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                CompareOp::Gt => ordering == Some(Ordering::Greater),
                CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                CompareOp::Eq => ordering == Some(Ordering::Equal),
                CompareOp::Ne => ordering != Some(Ordering::Equal),
            });
        }

        let same_variant = std::mem::discriminant(left) == std::mem::discriminant(right);
        match self {
            CompareOp::Eq | CompareOp::Ne if same_variant || left.is_none() || right.is_none() => {
                Ok((left == right) == (self == CompareOp::Eq))
            }
            _ => Err(EngineError::Incomparable {
                operator: self.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }
}

fn numeric_ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => left.as_number()?.partial_cmp(&right.as_number()?),
    }
}

/// Arithmetic operators usable inside expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    /// Integer operands stay integral (checked); any float operand promotes to float.
    pub fn apply(self, left: &Value, right: &Value) -> EngineResult<Value> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match self {
                    ArithOp::Add => a.checked_add(*b),
                    ArithOp::Sub => a.checked_sub(*b),
                    ArithOp::Mul => a.checked_mul(*b),
                    ArithOp::Div => a.checked_div(*b),
                };
                result.map(Value::Int).ok_or(EngineError::Arithmetic {
                    operator: self.symbol(),
                    message: "integer overflow or division by zero",
                })
            }
            _ => match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Float(match self {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                })),
                _ => Err(EngineError::Incomparable {
                    operator: self.symbol(),
                    left: left.type_name(),
                    right: right.type_name(),
                }),
            },
        }
    }
}

/// Value expression over constants, bound slots and the facts of the current combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Value),
    /// A bound local variable
    Local(Slot),
    /// Argument of the fact at the position being checked
    Arg(usize),
    /// Argument of the fact at another position of the combination
    Field { operand: usize, index: usize },
    Arith { op: ArithOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Compare { op: CompareOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Not(Box<Expr>),
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Const(value.into())
    }

    pub fn local(slot: Slot) -> Self {
        Expr::Local(slot)
    }

    pub fn arg(index: usize) -> Self {
        Expr::Arg(index)
    }

    pub fn field(operand: usize, index: usize) -> Self {
        Expr::Field { operand, index }
    }

    pub fn arith(op: ArithOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Arith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn negate(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// Evaluate to a value. Boolean connectives short-circuit.
    pub fn eval(&self, ctx: &EvalContext<'_, '_>) -> EngineResult<Value> {
        match self {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Local(slot) => ctx.bindings.require(*slot).cloned(),
            Expr::Arg(index) => match ctx.current {
                Some(fact) => fact.field(*index).cloned(),
                None => Err(EngineError::invalid_rule(
                    "<consequence>",
                    "argument reference outside a pattern",
                )),
            },
            Expr::Field { operand, index } => {
                let fact = ctx.tuple.get(*operand).ok_or(EngineError::OperandOutOfRange {
                    operand: *operand,
                    width: ctx.tuple.len(),
                })?;
                fact.field(*index).cloned()
            }
            Expr::Arith { op, lhs, rhs } => op.apply(&lhs.eval(ctx)?, &rhs.eval(ctx)?),
            Expr::Compare { op, lhs, rhs } => {
                op.apply(&lhs.eval(ctx)?, &rhs.eval(ctx)?).map(Value::Bool)
            }
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval_bool(ctx)?)),
            Expr::All(terms) => {
                for term in terms {
                    if !term.eval_bool(ctx)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Any(terms) => {
                for term in terms {
                    if term.eval_bool(ctx)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
        }
    }

    /// Evaluate and coerce to bool; a non-boolean result is a type error.
    pub fn eval_bool(&self, ctx: &EvalContext<'_, '_>) -> EngineResult<bool> {
        let value = self.eval(ctx)?;
        value
            .as_bool()
            .ok_or(EngineError::TypeMismatch { expected: "bool", found: value.type_name() })
    }

    /// Highest slot this expression reads
    pub fn max_slot(&self) -> Option<Slot> {
        match self {
            Expr::Local(slot) => Some(*slot),
            Expr::Const(_) | Expr::Arg(_) | Expr::Field { .. } => None,
            Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                lhs.max_slot().max(rhs.max_slot())
            }
            Expr::Not(inner) => inner.max_slot(),
            Expr::All(terms) | Expr::Any(terms) => terms.iter().filter_map(Expr::max_slot).max(),
        }
    }

    /// Check operand references against the join width
    pub(crate) fn validate(&self, width: usize, allow_arg: bool) -> Result<(), String> {
        match self {
            Expr::Const(_) | Expr::Local(_) => Ok(()),
            Expr::Arg(_) if allow_arg => Ok(()),
            Expr::Arg(index) => Err(format!("argument reference ${index} outside a pattern")),
            Expr::Field { operand, .. } if *operand < width => Ok(()),
            Expr::Field { operand, .. } => {
                Err(format!("operand {operand} out of range for {width} patterns"))
            }
            Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                lhs.validate(width, allow_arg)?;
                rhs.validate(width, allow_arg)
            }
            Expr::Not(inner) => inner.validate(width, allow_arg),
            Expr::All(terms) | Expr::Any(terms) => {
                terms.iter().try_for_each(|term| term.validate(width, allow_arg))
            }
        }
    }
}

/// What an expression can see while it is evaluated
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'c, 'f> {
    pub bindings: &'c Bindings,
    /// Every fact of the candidate combination
    pub tuple: &'c [&'f Fact],
    /// The fact being checked, absent while building consequences
    pub current: Option<&'f Fact>,
}

/// Per-argument check of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgCheck {
    /// Argument must equal a constant
    Equals { index: usize, value: Value },
    /// Bind an unset slot to the argument, or unify with the bound value
    Bind { index: usize, slot: Slot },
    /// Compare two expressions
    Compare { op: CompareOp, lhs: Expr, rhs: Expr },
}

/// Boolean expression evaluated after a pattern's argument checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard(pub Expr);

/// Checks applied to the fact drawn at one join position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    fact_type: FactId,
    checks: Vec<ArgCheck>,
    guards: Vec<Guard>,
}

impl Pattern {
    pub fn new(fact_type: FactId) -> Self {
        Self { fact_type, checks: Vec::new(), guards: Vec::new() }
    }

    pub fn equals(mut self, index: usize, value: impl Into<Value>) -> Self {
        self.checks.push(ArgCheck::Equals { index, value: value.into() });
        self
    }

    pub fn bind(mut self, index: usize, slot: Slot) -> Self {
        self.checks.push(ArgCheck::Bind { index, slot });
        self
    }

    pub fn compare(mut self, op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        self.checks.push(ArgCheck::Compare { op, lhs, rhs });
        self
    }

    pub fn guard(mut self, expr: Expr) -> Self {
        self.guards.push(Guard(expr));
        self
    }

    pub fn fact_type(&self) -> FactId {
        self.fact_type
    }

    pub fn checks(&self) -> &[ArgCheck] {
        &self.checks
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    /// Run this pattern against `tuple[position]`, short-circuiting on the first failure
    pub fn matches(
        &self,
        position: usize,
        tuple: &[&Fact],
        bindings: &mut Bindings,
    ) -> EngineResult<bool> {
        let fact = *tuple
            .get(position)
            .ok_or(EngineError::OperandOutOfRange { operand: position, width: tuple.len() })?;

        for check in &self.checks {
            let passed = match check {
                ArgCheck::Equals { index, value } => fact.field(*index)? == value,
                ArgCheck::Bind { index, slot } => bindings.unify(*slot, fact.field(*index)?),
                ArgCheck::Compare { op, lhs, rhs } => {
                    let ctx = EvalContext { bindings: &*bindings, tuple, current: Some(fact) };
                    op.apply(&lhs.eval(&ctx)?, &rhs.eval(&ctx)?)?
                }
            };
            if !passed {
                return Ok(false);
            }
        }

        let ctx = EvalContext { bindings: &*bindings, tuple, current: Some(fact) };
        for Guard(expr) in &self.guards {
            if !expr.eval_bool(&ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn max_slot(&self) -> Option<Slot> {
        let from_checks = self.checks.iter().filter_map(|check| match check {
            ArgCheck::Equals { .. } => None,
            ArgCheck::Bind { slot, .. } => Some(*slot),
            ArgCheck::Compare { lhs, rhs, .. } => lhs.max_slot().max(rhs.max_slot()),
        });
        let from_guards = self.guards.iter().filter_map(|Guard(expr)| expr.max_slot());
        from_checks.chain(from_guards).max()
    }

    pub(crate) fn validate(&self, width: usize) -> Result<(), String> {
        for check in &self.checks {
            if let ArgCheck::Compare { lhs, rhs, .. } = check {
                lhs.validate(width, true)?;
                rhs.validate(width, true)?;
            }
        }
        self.guards.iter().try_for_each(|Guard(expr)| expr.validate(width, true))
    }
}

/// Evaluate a full condition list against one combination.
///
/// Bindings are reset first; position `i` of `patterns` checks `tuple[i]`.
pub fn matches_all(
    patterns: &[Pattern],
    tuple: &[&Fact],
    bindings: &mut Bindings,
) -> EngineResult<bool> {
    bindings.reset();
    for (position, pattern) in patterns.iter().enumerate() {
        if !pattern.matches(position, tuple, bindings)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Local variable buffer of a rule or query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    slots: Vec<Option<Value>>,
}

impl Bindings {
    pub fn with_slots(count: usize) -> Self {
        Self { slots: vec![None; count] }
    }

    /// Mark every slot unset
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn get(&self, slot: Slot) -> Option<&Value> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn require(&self, slot: Slot) -> EngineResult<&Value> {
        self.get(slot).ok_or(EngineError::UnboundVariable { slot })
    }

    /// Bind an unset slot, or report whether the bound value equals `value`
    pub fn unify(&mut self, slot: Slot, value: &Value) -> bool {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        match &self.slots[slot] {
            Some(bound) => bound == value,
            None => {
                self.slots[slot] = Some(value.clone());
                true
            }
        }
    }

    /// Copy of every slot, unset slots as `Value::None`
    pub fn snapshot(&self) -> Vec<Value> {
        self.slots.iter().map(|slot| slot.clone().unwrap_or_default()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

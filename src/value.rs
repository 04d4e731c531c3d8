// ABOUTME: Runtime value types: the tagged union forced by the evaluator (spec §4.V)

use crate::ast::{Expr, Param};
use crate::env::Env;
use crate::error::EvalError;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// An attribute set is backed by a `BTreeMap` rather than a `HashMap` so
/// that `attrNames`/`attrValues`/iteration order are lexicographic by
/// construction, matching spec §8's sortedness property without a sort
/// step at every call site.
pub type AttrSet = BTreeMap<Rc<str>, Value>;

#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    Path(Rc<str>),
    Null,
    List(Rc<Vec<Value>>),
    AttrSet(Rc<AttrSet>),
    Lambda(Rc<LambdaVal>),
    Builtin(Rc<BuiltinVal>),
    Thunk(Rc<Thunk>),
}

pub struct LambdaVal {
    pub param: Param,
    pub body: Expr,
    pub env: Rc<Env>,
}

pub type NativeFn = fn(&[Value], &mut crate::eval::Evaluator) -> Result<Value, EvalError>;

/// A builtin primitive, possibly partially applied. Declared with a fixed
/// `arity`; applications accumulate into `partial_args` until saturated
/// (spec §4.E "Application" / "Currying contract").
pub struct BuiltinVal {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeFn,
    pub partial_args: Vec<Value>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThunkState {
    Unforced,
    Evaluating,
    Forced,
}

/// A deferred computation: either an unevaluated expression in its
/// environment, or (once forced) the resulting value. `state` and `value`
/// are interior-mutable so that forcing a `Thunk` reachable through many
/// `Rc` clones is visible to all of them (spec §4.E "Forcing").
pub struct Thunk {
    state: RefCell<ThunkState>,
    expr: RefCell<Option<(Expr, Rc<Env>)>>,
    value: RefCell<Option<Value>>,
}

impl Thunk {
    pub fn new(expr: Expr, env: Rc<Env>) -> Rc<Thunk> {
        Rc::new(Thunk {
            state: RefCell::new(ThunkState::Unforced),
            expr: RefCell::new(Some((expr, env))),
            value: RefCell::new(None),
        })
    }

    pub fn from_value(v: Value) -> Rc<Thunk> {
        Rc::new(Thunk {
            state: RefCell::new(ThunkState::Forced),
            expr: RefCell::new(None),
            value: RefCell::new(Some(v)),
        })
    }

    pub fn state(&self) -> ThunkState {
        *self.state.borrow()
    }

    pub fn begin_evaluating(&self) {
        *self.state.borrow_mut() = ThunkState::Evaluating;
    }

    /// Clones out the pending expression/environment rather than taking
    /// them, so a thunk that fails mid-force (e.g. under `tryEval`) is left
    /// in a recoverable state instead of panicking on a later retry.
    pub fn expr_env(&self) -> Option<(Expr, Rc<Env>)> {
        self.expr.borrow().clone()
    }

    pub fn reset_to_unforced(&self) {
        *self.state.borrow_mut() = ThunkState::Unforced;
    }

    pub fn store(&self, v: Value) {
        *self.value.borrow_mut() = Some(v);
        *self.state.borrow_mut() = ThunkState::Forced;
    }

    pub fn forced_value(&self) -> Value {
        self.value
            .borrow()
            .clone()
            .expect("forced_value called on a thunk that is not Forced")
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Path(_) => "path",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::AttrSet(_) => "set",
            Value::Lambda(_) | Value::Builtin(_) => "lambda",
            Value::Thunk(_) => "thunk",
        }
    }

    pub fn as_attrset(&self) -> Option<&Rc<AttrSet>> {
        match self {
            Value::AttrSet(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<Vec<Value>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Lambda(_) | Value::Builtin(_))
    }
}

/// Structural equality per spec §4.V: scalars compare by value; lists and
/// attribute sets compare only as the same `Rc` allocation (reference
/// identity), never structurally; lambdas/builtins/thunks never compare
/// equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::AttrSet(a), Value::AttrSet(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Path(p) => write!(f, "Path({p:?})"),
            Value::Null => write!(f, "Null"),
            Value::List(l) => write!(f, "List(len={})", l.len()),
            Value::AttrSet(a) => write!(f, "AttrSet(len={})", a.len()),
            Value::Lambda(_) => write!(f, "Lambda"),
            Value::Builtin(b) => write!(f, "Builtin({}, {}/{})", b.name, b.partial_args.len(), b.arity),
            Value::Thunk(t) => write!(f, "Thunk({:?})", t.state()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_equality() {
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Int(2));
        assert_eq!(Value::Str(Rc::from("a")), Value::Str(Rc::from("a")));
    }

    #[test]
    fn different_kinds_are_unequal() {
        assert_ne!(Value::Int(0), Value::Bool(false));
        assert_ne!(Value::Null, Value::Bool(false));
    }

    #[test]
    fn lists_compare_by_identity_only() {
        let a = Value::List(Rc::new(vec![Value::Int(1)]));
        let b = Value::List(Rc::new(vec![Value::Int(1)]));
        assert_ne!(a, b);
        let c = a.clone();
        assert_eq!(a, c);
    }

    #[test]
    fn thunk_state_transitions() {
        let t = Thunk::from_value(Value::Int(5));
        assert_eq!(t.state(), ThunkState::Forced);
        assert_eq!(t.forced_value(), Value::Int(5));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::List(Rc::new(vec![])).type_name(), "list");
    }
}

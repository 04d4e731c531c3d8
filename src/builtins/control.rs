// ABOUTME: Control-flow and diagnostic primitives (spec §4.B "Control")

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::rc::Rc;

fn seq(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    ev.force(args[0].clone())?;
    Ok(args[1].clone())
}

/// `deepSeq`: forces one level deeper than `seq` (spec §9 open question —
/// the source's behaviour stops at one extra level rather than recursing
/// through the whole structure).
fn deep_seq(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    ev.force_one_level(args[0].clone())?;
    Ok(args[1].clone())
}

fn trace(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let msg = ev.coerce_to_string(args[0].clone())?;
    log::info!("trace: {msg}");
    Ok(args[1].clone())
}

fn warn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let msg = ev.coerce_to_string(args[0].clone())?;
    log::warn!("{msg}");
    Ok(args[1].clone())
}

fn throw(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let msg = ev.coerce_to_string(args[0].clone())?;
    Err(EvalError::ThrownError(msg))
}

fn abort(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let msg = ev.coerce_to_string(args[0].clone())?;
    Err(EvalError::Aborted(msg))
}

/// On success: `{ success = true; value = v; }`. On any evaluation error:
/// `{ success = false; value = false; }` — per spec §4.B, errors buried in
/// structures that are never forced here don't need to be caught.
fn try_eval(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let mut set = crate::value::AttrSet::new();
    match ev.force(args[0].clone()) {
        Ok(v) => {
            set.insert(Rc::from("success"), Value::Bool(true));
            set.insert(Rc::from("value"), v);
        }
        Err(_) => {
            set.insert(Rc::from("success"), Value::Bool(false));
            set.insert(Rc::from("value"), Value::Bool(false));
        }
    }
    Ok(Value::AttrSet(Rc::new(set)))
}

/// Prefixes any error message from forcing `arg` with `context`, otherwise
/// transparent.
fn add_error_context(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let context = ev.coerce_to_string(args[0].clone())?;
    ev.force(args[1].clone()).map_err(|e| EvalError::ThrownError(format!("{context}: {e}")))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("seq", native("seq", 2, seq)),
        ("deepSeq", native("deepSeq", 2, deep_seq)),
        ("trace", native("trace", 2, trace)),
        ("warn", native("warn", 2, warn)),
        ("throw", native("throw", 1, throw)),
        ("abort", native("abort", 1, abort)),
        ("tryEval", native("tryEval", 1, try_eval)),
        ("addErrorContext", native("addErrorContext", 2, add_error_context)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::io::NullIoHandle;

    fn ev() -> Evaluator {
        Evaluator::new(Env::new(), Rc::new(NullIoHandle))
    }

    #[test]
    fn seq_forces_first_returns_second() {
        let mut e = ev();
        let r = seq(&[Value::Int(1), Value::Str(Rc::from("ok"))], &mut e).unwrap();
        assert_eq!(r, Value::Str(Rc::from("ok")));
    }

    #[test]
    fn try_eval_reports_success() {
        let mut e = ev();
        let r = try_eval(&[Value::Int(5)], &mut e).unwrap();
        let set = r.as_attrset().unwrap();
        assert_eq!(set.get("success"), Some(&Value::Bool(true)));
        assert_eq!(set.get("value"), Some(&Value::Int(5)));
    }

    #[test]
    fn throw_produces_error() {
        let mut e = ev();
        assert!(throw(&[Value::Str(Rc::from("boom"))], &mut e).is_err());
    }
}

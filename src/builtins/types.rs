// ABOUTME: Type predicates and typeOf (spec §4.B "Type predicates")

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::rc::Rc;

fn is_null(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::Null)))
}

fn is_function(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(args[0].is_callable()))
}

fn is_list(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::List(_))))
}

fn is_attrs(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::AttrSet(_))))
}

fn is_string(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::Str(_))))
}

fn is_int(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::Int(_))))
}

fn is_bool(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

fn is_path(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::Path(_))))
}

fn is_float(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(matches!(args[0], Value::Float(_))))
}

fn type_of(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Str(Rc::from(args[0].type_name())))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("isNull", native("isNull", 1, is_null)),
        ("isFunction", native("isFunction", 1, is_function)),
        ("isList", native("isList", 1, is_list)),
        ("isAttrs", native("isAttrs", 1, is_attrs)),
        ("isString", native("isString", 1, is_string)),
        ("isInt", native("isInt", 1, is_int)),
        ("isBool", native("isBool", 1, is_bool)),
        ("isPath", native("isPath", 1, is_path)),
        ("isFloat", native("isFloat", 1, is_float)),
        ("typeOf", native("typeOf", 1, type_of)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_their_kind() {
        let mut ev = Evaluator::new(crate::env::Env::new(), Rc::new(crate::io::NullIoHandle));
        assert_eq!(is_null(&[Value::Null], &mut ev).unwrap(), Value::Bool(true));
        assert_eq!(is_int(&[Value::Int(1)], &mut ev).unwrap(), Value::Bool(true));
        assert_eq!(is_int(&[Value::Null], &mut ev).unwrap(), Value::Bool(false));
    }

    #[test]
    fn type_of_returns_spec_names() {
        let mut ev = Evaluator::new(crate::env::Env::new(), Rc::new(crate::io::NullIoHandle));
        assert_eq!(type_of(&[Value::Int(1)], &mut ev).unwrap(), Value::Str(Rc::from("int")));
        assert_eq!(type_of(&[Value::Null], &mut ev).unwrap(), Value::Str(Rc::from("null")));
    }
}

// ABOUTME: Integer-only math primops (spec §4.B "Math"; see §9 open question
// on the add/sub/mul/div-vs-`+ - * /`-operator asymmetry)

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;

fn as_int(v: &Value, fname: &str) -> Result<i64, EvalError> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(EvalError::type_error(fname, "int", other.type_name())),
    }
}

fn add(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Int(as_int(&args[0], "add")? + as_int(&args[1], "add")?))
}

fn sub(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Int(as_int(&args[0], "sub")? - as_int(&args[1], "sub")?))
}

fn mul(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Int(as_int(&args[0], "mul")? * as_int(&args[1], "mul")?))
}

fn div(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let a = as_int(&args[0], "div")?;
    let b = as_int(&args[1], "div")?;
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Value::Int(a / b))
}

fn less_than(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(as_int(&args[0], "lessThan")? < as_int(&args[1], "lessThan")?))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("add", native("add", 2, add)),
        ("sub", native("sub", 2, sub)),
        ("mul", native("mul", 2, mul)),
        ("div", native("div", 2, div)),
        ("lessThan", native("lessThan", 2, less_than)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::io::NullIoHandle;
    use std::rc::Rc;

    fn ev() -> Evaluator {
        Evaluator::new(Env::new(), Rc::new(NullIoHandle))
    }

    #[test]
    fn integer_arithmetic() {
        let mut e = ev();
        assert_eq!(add(&[Value::Int(2), Value::Int(3)], &mut e).unwrap(), Value::Int(5));
        assert_eq!(sub(&[Value::Int(5), Value::Int(3)], &mut e).unwrap(), Value::Int(2));
        assert_eq!(mul(&[Value::Int(4), Value::Int(3)], &mut e).unwrap(), Value::Int(12));
    }

    #[test]
    fn div_by_zero_errors() {
        let mut e = ev();
        assert!(matches!(div(&[Value::Int(1), Value::Int(0)], &mut e), Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn rejects_floats() {
        let mut e = ev();
        assert!(add(&[Value::Float(1.0), Value::Int(1)], &mut e).is_err());
    }
}

// ABOUTME: String-context stubs (spec §4.B "Context"; §9 open question —
// this core has no string-context tracking, so these behave as no-ops)

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::rc::Rc;

fn unsafe_discard_string_context(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(args[0].clone())
}

fn has_context(_args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Bool(false))
}

fn get_context(_args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::AttrSet(Rc::new(crate::value::AttrSet::new())))
}

fn unsafe_get_attr_pos(_args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Null)
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("unsafeDiscardStringContext", native("unsafeDiscardStringContext", 1, unsafe_discard_string_context)),
        ("hasContext", native("hasContext", 1, has_context)),
        ("getContext", native("getContext", 1, get_context)),
        ("unsafeGetAttrPos", native("unsafeGetAttrPos", 2, unsafe_get_attr_pos)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::io::NullIoHandle;

    #[test]
    fn context_builtins_are_vacuous() {
        let mut e = Evaluator::new(Env::new(), Rc::new(NullIoHandle));
        assert_eq!(has_context(&[Value::Str(Rc::from("x"))], &mut e).unwrap(), Value::Bool(false));
        assert_eq!(
            unsafe_discard_string_context(&[Value::Str(Rc::from("x"))], &mut e).unwrap(),
            Value::Str(Rc::from("x"))
        );
    }
}

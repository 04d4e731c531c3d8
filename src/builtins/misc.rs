// ABOUTME: Misc constants (spec §4.B "Misc constants")

use super::native;
use crate::config;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::rc::Rc;

/// Always returns the empty string: this evaluator runs in pure mode, so
/// there is no process environment to read from (spec §6).
fn get_env(_args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Str(Rc::from("")))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("currentSystem", Value::Str(Rc::from(config::current_system().as_str()))),
        ("storeDir", Value::Str(Rc::from(config::STORE_DIR))),
        ("nixVersion", Value::Str(Rc::from(config::NIX_VERSION))),
        ("langVersion", Value::Int(config::LANG_VERSION)),
        ("getEnv", native("getEnv", 1, get_env)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::io::NullIoHandle;

    #[test]
    fn get_env_is_always_empty_in_pure_mode() {
        let mut e = Evaluator::new(Env::new(), Rc::new(NullIoHandle));
        assert_eq!(get_env(&[Value::Str(Rc::from("PATH"))], &mut e).unwrap(), Value::Str(Rc::from("")));
    }
}

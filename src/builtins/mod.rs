// ABOUTME: Registers all ~80 primitive operations into the global environment (spec §4.B)

pub mod arithmetic;
pub mod attrs;
pub mod context;
pub mod control;
pub mod derivation;
pub mod fetch;
pub mod io;
pub mod json;
pub mod lists;
pub mod misc;
pub mod strings;
pub mod types;
pub mod version;

use crate::env::Env;
use crate::value::{AttrSet, BuiltinVal, NativeFn, Value};
use std::rc::Rc;

/// Wraps a function pointer as a (possibly not yet saturated) builtin
/// value; currying accumulates further applications in `partial_args`
/// (spec §4.B "Currying contract").
pub fn native(name: &'static str, arity: usize, func: NativeFn) -> Value {
    Value::Builtin(Rc::new(BuiltinVal { name, arity, func, partial_args: Vec::new() }))
}

/// Names also bound at the top level, aliasing entries already present in
/// `builtins` (spec §4.B).
const TOP_LEVEL_ALIASES: &[&str] = &[
    "toString",
    "typeOf",
    "import",
    "derivation",
    "abort",
    "throw",
    "removeAttrs",
    "map",
    "baseNameOf",
    "dirOf",
    "isNull",
    "placeholder",
    "fetchTarball",
    "fetchGit",
];

fn all_entries() -> Vec<(&'static str, Value)> {
    types::entries()
        .into_iter()
        .chain(lists::entries())
        .chain(attrs::entries())
        .chain(strings::entries())
        .chain(arithmetic::entries())
        .chain(json::entries())
        .chain(io::entries())
        .chain(control::entries())
        .chain(derivation::entries())
        .chain(fetch::entries())
        .chain(version::entries())
        .chain(context::entries())
        .chain(misc::entries())
        .collect()
}

/// Builds the global environment: a `builtins` attribute set holding every
/// primitive plus the commonly-used top-level aliases and the `true`/
/// `false`/`null` constants (spec §4.B).
pub fn global_env() -> Rc<Env> {
    let mut set = AttrSet::new();
    for (name, value) in all_entries() {
        set.insert(Rc::from(name), value);
    }

    let env = Env::new();
    env.define(Rc::from("true"), Value::Bool(true));
    env.define(Rc::from("false"), Value::Bool(false));
    env.define(Rc::from("null"), Value::Null);

    for name in TOP_LEVEL_ALIASES {
        if let Some(v) = set.get(*name) {
            env.define(Rc::from(*name), v.clone());
        }
    }

    env.define(Rc::from("builtins"), Value::AttrSet(Rc::new(set)));
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_env_exposes_builtins_set() {
        let env = global_env();
        match env.get("builtins") {
            Some(Value::AttrSet(set)) => {
                assert!(set.contains_key("head"));
                assert!(set.contains_key("toJSON"));
                assert!(set.contains_key("derivation"));
            }
            _ => panic!("expected builtins set"),
        }
    }

    #[test]
    fn top_level_aliases_are_bound() {
        let env = global_env();
        assert!(env.get("toString").is_some());
        assert!(env.get("map").is_some());
        assert!(env.get("true") == Some(Value::Bool(true)));
    }
}

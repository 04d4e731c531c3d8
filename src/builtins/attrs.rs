// ABOUTME: Attribute-set operations (spec §4.B "Attribute set")

use super::native;
use crate::ast::Param;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::{AttrSet, Value};
use std::rc::Rc;

fn as_attrset<'v>(v: &'v Value, fname: &str) -> Result<&'v Rc<AttrSet>, EvalError> {
    v.as_attrset().ok_or_else(|| EvalError::type_error(fname, "set", v.type_name()))
}

fn attr_names(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let set = as_attrset(&args[0], "attrNames")?;
    // `AttrSet` is a `BTreeMap`, so keys already iterate in lexicographic
    // order (spec §8's sortedness property, satisfied by construction).
    let names = set.keys().map(|k| Value::Str(k.clone())).collect();
    Ok(Value::List(Rc::new(names)))
}

fn attr_values(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let set = as_attrset(&args[0], "attrValues")?;
    let values = set.values().cloned().collect();
    Ok(Value::List(Rc::new(values)))
}

fn has_attr(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let name = match &args[0] {
        Value::Str(s) => s.as_ref(),
        other => return Err(EvalError::type_error("hasAttr", "string", other.type_name())),
    };
    let set = as_attrset(&args[1], "hasAttr")?;
    Ok(Value::Bool(set.contains_key(name)))
}

fn get_attr(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let name = match &args[0] {
        Value::Str(s) => s.as_ref(),
        other => return Err(EvalError::type_error("getAttr", "string", other.type_name())),
    };
    let set = as_attrset(&args[1], "getAttr")?;
    set.get(name).cloned().ok_or_else(|| EvalError::AttributeNotFound(name.to_string()))
}

fn remove_attrs(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let set = as_attrset(&args[0], "removeAttrs")?;
    let names = args[1].as_list().ok_or_else(|| EvalError::type_error("removeAttrs", "list", args[1].type_name()))?;
    let mut to_remove = Vec::with_capacity(names.len());
    for n in names.iter() {
        match n {
            Value::Str(s) => to_remove.push(s.clone()),
            other => return Err(EvalError::type_error("removeAttrs", "string", other.type_name())),
        }
    }
    let mut out = (**set).clone();
    for name in &to_remove {
        out.remove(name.as_ref());
    }
    Ok(Value::AttrSet(Rc::new(out)))
}

fn list_to_attrs(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let entries = args[0].as_list().ok_or_else(|| EvalError::type_error("listToAttrs", "list", args[0].type_name()))?;
    let mut out = AttrSet::new();
    for entry in entries.iter() {
        let forced = ev.force(entry.clone())?;
        let set = as_attrset(&forced, "listToAttrs")?;
        let name = set.get("name").cloned().ok_or_else(|| EvalError::AttributeNotFound("name".to_string()))?;
        let name = match ev.force(name)? {
            Value::Str(s) => s,
            other => return Err(EvalError::type_error("listToAttrs", "string", other.type_name())),
        };
        let value = set.get("value").cloned().ok_or_else(|| EvalError::AttributeNotFound("value".to_string()))?;
        // First occurrence of a duplicate name wins, matching real Nix.
        out.entry(name).or_insert(value);
    }
    Ok(Value::AttrSet(Rc::new(out)))
}

fn intersect_attrs(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let a = as_attrset(&args[0], "intersectAttrs")?;
    let b = as_attrset(&args[1], "intersectAttrs")?;
    let mut out = AttrSet::new();
    for (k, v) in b.iter() {
        if a.contains_key(k) {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(Value::AttrSet(Rc::new(out)))
}

fn map_attrs(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let f = args[0].clone();
    let set = as_attrset(&args[1], "mapAttrs")?;
    let mut out = AttrSet::new();
    for (k, v) in set.iter() {
        let partial = ev.call(f.clone(), Value::Str(k.clone()))?;
        let mapped = ev.call(partial, v.clone())?;
        out.insert(k.clone(), mapped);
    }
    Ok(Value::AttrSet(Rc::new(out)))
}

fn function_args(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Lambda(l) => {
            let mut out = AttrSet::new();
            if let Param::Pattern { formals, .. } = &l.param {
                for formal in formals {
                    out.insert(formal.name.clone(), Value::Bool(formal.default.is_some()));
                }
            }
            Ok(Value::AttrSet(Rc::new(out)))
        }
        other => Err(EvalError::type_error("functionArgs", "lambda", other.type_name())),
    }
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("attrNames", native("attrNames", 1, attr_names)),
        ("attrValues", native("attrValues", 1, attr_values)),
        ("hasAttr", native("hasAttr", 2, has_attr)),
        ("getAttr", native("getAttr", 2, get_attr)),
        ("removeAttrs", native("removeAttrs", 2, remove_attrs)),
        ("listToAttrs", native("listToAttrs", 1, list_to_attrs)),
        ("intersectAttrs", native("intersectAttrs", 2, intersect_attrs)),
        ("mapAttrs", native("mapAttrs", 2, map_attrs)),
        ("functionArgs", native("functionArgs", 1, function_args)),
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

    fn set_of(pairs: &[(&str, Value)]) -> Value {
        let mut s = AttrSet::new();
        for (k, v) in pairs {
            s.insert(Rc::from(*k), v.clone());
        }
        Value::AttrSet(Rc::new(s))
    }

    #[test]
    fn attr_names_is_sorted() {
        let mut e = ev();
        let set = set_of(&[("b", Value::Int(1)), ("a", Value::Int(2))]);
        let names = attr_names(&[set], &mut e).unwrap();
        let names = names.as_list().unwrap();
        assert_eq!(names[0], Value::Str(Rc::from("a")));
        assert_eq!(names[1], Value::Str(Rc::from("b")));
    }

    #[test]
    fn remove_attrs_drops_named_keys() {
        let mut e = ev();
        let set = set_of(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        let names = Value::List(Rc::new(vec![Value::Str(Rc::from("a"))]));
        let out = remove_attrs(&[set, names], &mut e).unwrap();
        let out = out.as_attrset().unwrap();
        assert!(!out.contains_key("a"));
        assert!(out.contains_key("b"));
    }

    #[test]
    fn has_attr_and_get_attr() {
        let mut e = ev();
        let set = set_of(&[("x", Value::Int(9))]);
        assert_eq!(has_attr(&[Value::Str(Rc::from("x")), set.clone()], &mut e).unwrap(), Value::Bool(true));
        assert_eq!(get_attr(&[Value::Str(Rc::from("x")), set], &mut e).unwrap(), Value::Int(9));
    }
}

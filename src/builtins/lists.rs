// ABOUTME: List operations (spec §4.B "List")

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

fn as_list<'v>(v: &'v Value, fname: &str) -> Result<&'v Rc<Vec<Value>>, EvalError> {
    v.as_list().ok_or_else(|| EvalError::type_error(fname, "list", v.type_name()))
}

/// Applies a two-argument (curried) callable to `a` then `b`.
fn apply2(ev: &mut Evaluator, f: Value, a: Value, b: Value) -> Result<Value, EvalError> {
    let partial = ev.call(f, a)?;
    ev.call(partial, b)
}

fn length(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Int(as_list(&args[0], "length")?.len() as i64))
}

fn head(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let l = as_list(&args[0], "head")?;
    l.first().cloned().ok_or(EvalError::EmptyList)
}

fn tail(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let l = as_list(&args[0], "tail")?;
    if l.is_empty() {
        return Err(EvalError::EmptyList);
    }
    Ok(Value::List(Rc::new(l[1..].to_vec())))
}

fn elem_at(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let l = as_list(&args[0], "elemAt")?;
    let idx = match &args[1] {
        Value::Int(n) => *n,
        other => return Err(EvalError::type_error("elemAt", "int", other.type_name())),
    };
    if idx < 0 || idx as usize >= l.len() {
        return Err(EvalError::IndexOutOfBounds { index: idx, len: l.len() });
    }
    Ok(l[idx as usize].clone())
}

fn map_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let f = args[0].clone();
    let l = as_list(&args[1], "map")?;
    let mut out = Vec::with_capacity(l.len());
    for item in l.iter() {
        out.push(ev.call(f.clone(), item.clone())?);
    }
    Ok(Value::List(Rc::new(out)))
}

fn filter_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let pred = args[0].clone();
    let l = as_list(&args[1], "filter")?;
    let mut out = Vec::new();
    for item in l.iter() {
        let kept = ev.call(pred.clone(), item.clone())?;
        match ev.force(kept)? {
            Value::Bool(true) => out.push(item.clone()),
            Value::Bool(false) => {}
            other => return Err(EvalError::type_error("filter", "bool", other.type_name())),
        }
    }
    Ok(Value::List(Rc::new(out)))
}

fn foldl_prime(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let op = args[0].clone();
    let mut acc = args[1].clone();
    let l = as_list(&args[2], "foldl'")?;
    for item in l.iter() {
        let next = apply2(ev, op.clone(), acc, item.clone())?;
        acc = ev.force(next)?;
    }
    Ok(acc)
}

fn concat_lists(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let outer = as_list(&args[0], "concatLists")?;
    let mut out = Vec::new();
    for inner in outer.iter() {
        let forced = ev.force(inner.clone())?;
        out.extend(as_list(&forced, "concatLists")?.iter().cloned());
    }
    Ok(Value::List(Rc::new(out)))
}

fn gen_list(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let generator = args[0].clone();
    let n = match &args[1] {
        Value::Int(n) => *n,
        other => return Err(EvalError::type_error("genList", "int", other.type_name())),
    };
    if n < 0 {
        return Err(EvalError::type_error("genList", "non-negative int", "negative int"));
    }
    let mut out = Vec::with_capacity(n as usize);
    for i in 0..n {
        out.push(ev.call(generator.clone(), Value::Int(i))?);
    }
    Ok(Value::List(Rc::new(out)))
}

fn all_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let pred = args[0].clone();
    let l = as_list(&args[1], "all")?;
    for item in l.iter() {
        let r = ev.call(pred.clone(), item.clone())?;
        match ev.force(r)? {
            Value::Bool(true) => {}
            Value::Bool(false) => return Ok(Value::Bool(false)),
            other => return Err(EvalError::type_error("all", "bool", other.type_name())),
        }
    }
    Ok(Value::Bool(true))
}

fn any_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let pred = args[0].clone();
    let l = as_list(&args[1], "any")?;
    for item in l.iter() {
        let r = ev.call(pred.clone(), item.clone())?;
        match ev.force(r)? {
            Value::Bool(true) => return Ok(Value::Bool(true)),
            Value::Bool(false) => {}
            other => return Err(EvalError::type_error("any", "bool", other.type_name())),
        }
    }
    Ok(Value::Bool(false))
}

fn elem_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let needle = ev.force(args[0].clone())?;
    let l = as_list(&args[1], "elem")?;
    for item in l.iter() {
        if ev.force(item.clone())? == needle {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// Stable merge sort using a fallible `less_than(a, b)` comparator, since
/// `Vec::sort_by` can't express a comparator that may itself error.
fn sort_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let less_than = args[0].clone();
    let l = as_list(&args[1], "sort")?;
    let mut items: Vec<Value> = Vec::with_capacity(l.len());
    for item in l.iter() {
        items.push(ev.force(item.clone())?);
    }
    let sorted = merge_sort(ev, &less_than, items)?;
    Ok(Value::List(Rc::new(sorted)))
}

fn merge_sort(ev: &mut Evaluator, less_than: &Value, items: Vec<Value>) -> Result<Vec<Value>, EvalError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mid = items.len() / 2;
    let mut left = items;
    let right = left.split_off(mid);
    let left = merge_sort(ev, less_than, left)?;
    let right = merge_sort(ev, less_than, right)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let is_less = apply2(ev, less_than.clone(), right[j].clone(), left[i].clone())?;
        if matches!(ev.force(is_less)?, Value::Bool(true)) {
            out.push(right[j].clone());
            j += 1;
        } else {
            out.push(left[i].clone());
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    Ok(out)
}

fn concat_map(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let mapped = map_fn(args, ev)?;
    concat_lists(&[mapped], ev)
}

fn cat_attrs(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let name = match &args[0] {
        Value::Str(s) => s.clone(),
        other => return Err(EvalError::type_error("catAttrs", "string", other.type_name())),
    };
    let l = as_list(&args[1], "catAttrs")?;
    let mut out = Vec::new();
    for item in l.iter() {
        let forced = ev.force(item.clone())?;
        if let Some(set) = forced.as_attrset() {
            if let Some(v) = set.get(name.as_ref()) {
                out.push(v.clone());
            }
        }
    }
    Ok(Value::List(Rc::new(out)))
}

fn group_by(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let f = args[0].clone();
    let l = as_list(&args[1], "groupBy")?;
    let mut groups: BTreeMap<Rc<str>, Vec<Value>> = BTreeMap::new();
    let mut order: Vec<Rc<str>> = Vec::new();
    for item in l.iter() {
        let key_v = ev.call(f.clone(), item.clone())?;
        let key = match ev.force(key_v)? {
            Value::Str(s) => s,
            other => return Err(EvalError::type_error("groupBy", "string", other.type_name())),
        };
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(item.clone());
    }
    let mut set = crate::value::AttrSet::new();
    for key in order {
        let items = groups.remove(&key).unwrap_or_default();
        set.insert(key, Value::List(Rc::new(items)));
    }
    Ok(Value::AttrSet(Rc::new(set)))
}

fn partition_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let pred = args[0].clone();
    let l = as_list(&args[1], "partition")?;
    let mut right = Vec::new();
    let mut wrong = Vec::new();
    for item in l.iter() {
        let r = ev.call(pred.clone(), item.clone())?;
        match ev.force(r)? {
            Value::Bool(true) => right.push(item.clone()),
            Value::Bool(false) => wrong.push(item.clone()),
            other => return Err(EvalError::type_error("partition", "bool", other.type_name())),
        }
    }
    let mut set = crate::value::AttrSet::new();
    set.insert(Rc::from("right"), Value::List(Rc::new(right)));
    set.insert(Rc::from("wrong"), Value::List(Rc::new(wrong)));
    Ok(Value::AttrSet(Rc::new(set)))
}

/// Breadth-first transitive closure: `startSet`/`operator` each item carries
/// a `key` attribute used to deduplicate already-visited nodes.
fn generic_closure(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let arg = args[0]
        .as_attrset()
        .ok_or_else(|| EvalError::type_error("genericClosure", "set", args[0].type_name()))?
        .clone();
    let start = arg
        .get("startSet")
        .cloned()
        .ok_or_else(|| EvalError::AttributeNotFound("startSet".to_string()))?;
    let operator = arg
        .get("operator")
        .cloned()
        .ok_or_else(|| EvalError::AttributeNotFound("operator".to_string()))?;
    let start_list = ev.force(start)?;
    let mut queue: Vec<Value> = as_list(&start_list, "genericClosure")?.to_vec();
    let mut seen: Vec<Value> = Vec::new();
    let mut result: Vec<Value> = Vec::new();
    let mut i = 0;
    while i < queue.len() {
        let item = ev.force(queue[i].clone())?;
        i += 1;
        let set = item
            .as_attrset()
            .ok_or_else(|| EvalError::type_error("genericClosure", "set", item.type_name()))?;
        let key = set
            .get("key")
            .cloned()
            .ok_or_else(|| EvalError::AttributeNotFound("key".to_string()))?;
        let key = ev.force(key)?;
        if seen.iter().any(|k| *k == key) {
            continue;
        }
        seen.push(key);
        result.push(item.clone());
        let more = ev.call(operator.clone(), item)?;
        let more = ev.force(more)?;
        queue.extend(as_list(&more, "genericClosure")?.iter().cloned());
    }
    Ok(Value::List(Rc::new(result)))
}

fn zip_attrs_with(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let f = args[0].clone();
    let l = as_list(&args[1], "zipAttrsWith")?;
    let mut per_key: BTreeMap<Rc<str>, Vec<Value>> = BTreeMap::new();
    for item in l.iter() {
        let forced = ev.force(item.clone())?;
        let set = forced
            .as_attrset()
            .ok_or_else(|| EvalError::type_error("zipAttrsWith", "set", forced.type_name()))?;
        for (k, v) in set.iter() {
            per_key.entry(k.clone()).or_default().push(v.clone());
        }
    }
    let mut out = crate::value::AttrSet::new();
    for (k, values) in per_key {
        let combined = apply2(ev, f.clone(), Value::Str(k.clone()), Value::List(Rc::new(values)))?;
        out.insert(k, combined);
    }
    Ok(Value::AttrSet(Rc::new(out)))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("length", native("length", 1, length)),
        ("head", native("head", 1, head)),
        ("tail", native("tail", 1, tail)),
        ("elemAt", native("elemAt", 2, elem_at)),
        ("map", native("map", 2, map_fn)),
        ("filter", native("filter", 2, filter_fn)),
        ("foldl'", native("foldl'", 3, foldl_prime)),
        ("concatLists", native("concatLists", 1, concat_lists)),
        ("genList", native("genList", 2, gen_list)),
        ("all", native("all", 2, all_fn)),
        ("any", native("any", 2, any_fn)),
        ("elem", native("elem", 2, elem_fn)),
        ("sort", native("sort", 2, sort_fn)),
        ("concatMap", native("concatMap", 2, concat_map)),
        ("catAttrs", native("catAttrs", 2, cat_attrs)),
        ("groupBy", native("groupBy", 2, group_by)),
        ("partition", native("partition", 2, partition_fn)),
        ("genericClosure", native("genericClosure", 1, generic_closure)),
        ("zipAttrsWith", native("zipAttrsWith", 2, zip_attrs_with)),
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
    fn head_and_tail() {
        let mut e = ev();
        let l = Value::List(Rc::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(head(&[l.clone()], &mut e).unwrap(), Value::Int(1));
        let t = tail(&[l], &mut e).unwrap();
        assert_eq!(as_list(&t, "tail").unwrap().len(), 2);
    }

    #[test]
    fn head_of_empty_errors() {
        let mut e = ev();
        let l = Value::List(Rc::new(vec![]));
        assert!(matches!(head(&[l], &mut e), Err(EvalError::EmptyList)));
    }

    #[test]
    fn elem_at_bounds_check() {
        let mut e = ev();
        let l = Value::List(Rc::new(vec![Value::Int(1)]));
        assert!(matches!(
            elem_at(&[l, Value::Int(5)], &mut e),
            Err(EvalError::IndexOutOfBounds { index: 5, len: 1 })
        ));
    }

    #[test]
    fn partition_splits_right_and_wrong() {
        let mut e = ev();
        let is_pos = native("isPos", 1, |args: &[Value], _ev: &mut Evaluator| {
            Ok(Value::Bool(matches!(args[0], Value::Int(n) if n > 0)))
        });
        let l = Value::List(Rc::new(vec![Value::Int(1), Value::Int(-1), Value::Int(2)]));
        let result = partition_fn(&[is_pos, l], &mut e).unwrap();
        let set = result.as_attrset().unwrap();
        assert_eq!(as_list(set.get("right").unwrap(), "t").unwrap().len(), 2);
        assert_eq!(as_list(set.get("wrong").unwrap(), "t").unwrap().len(), 1);
    }
}

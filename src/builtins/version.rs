// ABOUTME: Version-string comparison and derivation-name parsing (spec §4.B "Version")

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::cmp::Ordering;
use std::rc::Rc;

/// Splits a version string on `.` and `-`, dropping empty components.
fn split_components(s: &str) -> Vec<&str> {
    s.split(['.', '-']).filter(|c| !c.is_empty()).collect()
}

fn compare_component(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn compare_versions_str(a: &str, b: &str) -> i64 {
    let (pa, pb) = (split_components(a), split_components(b));
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let ca = pa.get(i).copied().unwrap_or("");
        let cb = pb.get(i).copied().unwrap_or("");
        match compare_component(ca, cb) {
            Ordering::Less => return -1,
            Ordering::Greater => return 1,
            Ordering::Equal => {}
        }
    }
    0
}

fn compare_versions(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let a = args[0].as_str().ok_or_else(|| EvalError::type_error("compareVersions", "string", args[0].type_name()))?;
    let b = args[1].as_str().ok_or_else(|| EvalError::type_error("compareVersions", "string", args[1].type_name()))?;
    Ok(Value::Int(compare_versions_str(a, b)))
}

fn split_version(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let s = args[0].as_str().ok_or_else(|| EvalError::type_error("splitVersion", "string", args[0].type_name()))?;
    let parts = split_components(s).into_iter().map(|c| Value::Str(Rc::from(c))).collect();
    Ok(Value::List(Rc::new(parts)))
}

/// Splits `<name>-<version>` at the last `-` that is immediately followed by
/// a digit, per spec §4.B.
fn parse_drv_name(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let s = args[0].as_str().ok_or_else(|| EvalError::type_error("parseDrvName", "string", args[0].type_name()))?;
    let bytes = s.as_bytes();
    let mut split_at = None;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'-' && bytes.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
            split_at = Some(i);
        }
    }
    let mut set = crate::value::AttrSet::new();
    match split_at {
        Some(i) => {
            set.insert(Rc::from("name"), Value::Str(Rc::from(&s[..i])));
            set.insert(Rc::from("version"), Value::Str(Rc::from(&s[i + 1..])));
        }
        None => {
            set.insert(Rc::from("name"), Value::Str(Rc::from(s)));
            set.insert(Rc::from("version"), Value::Str(Rc::from("")));
        }
    }
    Ok(Value::AttrSet(Rc::new(set)))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("compareVersions", native("compareVersions", 2, compare_versions)),
        ("splitVersion", native("splitVersion", 1, split_version)),
        ("parseDrvName", native("parseDrvName", 1, parse_drv_name)),
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
    fn compare_versions_is_antisymmetric() {
        assert_eq!(compare_versions_str("1.2", "1.3"), -1);
        assert_eq!(compare_versions_str("1.3", "1.2"), 1);
        assert_eq!(compare_versions_str("1.2", "1.2"), 0);
    }

    #[test]
    fn parse_drv_name_splits_on_last_digit_dash() {
        let mut e = ev();
        let r = parse_drv_name(&[Value::Str(Rc::from("hello-2.12.1"))], &mut e).unwrap();
        let set = r.as_attrset().unwrap();
        assert_eq!(set.get("name"), Some(&Value::Str(Rc::from("hello"))));
        assert_eq!(set.get("version"), Some(&Value::Str(Rc::from("2.12.1"))));
    }

    #[test]
    fn parse_drv_name_with_no_version() {
        let mut e = ev();
        let r = parse_drv_name(&[Value::Str(Rc::from("hello"))], &mut e).unwrap();
        let set = r.as_attrset().unwrap();
        assert_eq!(set.get("name"), Some(&Value::Str(Rc::from("hello"))));
        assert_eq!(set.get("version"), Some(&Value::Str(Rc::from(""))));
    }
}

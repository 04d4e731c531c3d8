// ABOUTME: String operations (spec §4.B "String")

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::rc::Rc;

fn as_str<'v>(v: &'v Value, fname: &str) -> Result<&'v str, EvalError> {
    v.as_str().ok_or_else(|| EvalError::type_error(fname, "string", v.type_name()))
}

fn as_int(v: &Value, fname: &str) -> Result<i64, EvalError> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(EvalError::type_error(fname, "int", other.type_name())),
    }
}

fn string_length(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    Ok(Value::Int(as_str(&args[0], "stringLength")?.len() as i64))
}

/// `substring start len s`: clamps `len` past the end of the string (real
/// Nix does the same rather than erroring), per byte offsets.
fn substring(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let start = as_int(&args[0], "substring")?;
    let len = as_int(&args[1], "substring")?;
    let s = as_str(&args[2], "substring")?;
    if start < 0 {
        return Err(EvalError::type_error("substring", "non-negative start", "negative int"));
    }
    let start = (start as usize).min(s.len());
    let end = if len < 0 { s.len() } else { (start + len as usize).min(s.len()) };
    Ok(Value::Str(Rc::from(&s[start..end])))
}

fn concat_strings(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let l = args[0].as_list().ok_or_else(|| EvalError::type_error("concatStrings", "list", args[0].type_name()))?;
    let mut out = String::new();
    for item in l.iter() {
        out.push_str(&ev.coerce_to_string(item.clone())?);
    }
    Ok(Value::Str(Rc::from(out.as_str())))
}

fn concat_strings_sep(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let sep = as_str(&args[0], "concatStringsSep")?.to_string();
    let l = args[1].as_list().ok_or_else(|| EvalError::type_error("concatStringsSep", "list", args[1].type_name()))?;
    let mut parts = Vec::with_capacity(l.len());
    for item in l.iter() {
        parts.push(ev.coerce_to_string(item.clone())?);
    }
    Ok(Value::Str(Rc::from(parts.join(&sep).as_str())))
}

/// Replaces each occurrence of `from[i]` with `to[i]`, scanning left to
/// right and preferring the first `from` entry that matches at each
/// position (matches real Nix's `replaceStrings` semantics for literal,
/// non-regex patterns).
fn replace_strings(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let from = args[0].as_list().ok_or_else(|| EvalError::type_error("replaceStrings", "list", args[0].type_name()))?;
    let to = args[1].as_list().ok_or_else(|| EvalError::type_error("replaceStrings", "list", args[1].type_name()))?;
    let s = as_str(&args[2], "replaceStrings")?;
    let mut froms = Vec::with_capacity(from.len());
    for f in from.iter() {
        froms.push(as_str(f, "replaceStrings")?.to_string());
    }
    let mut tos = Vec::with_capacity(to.len());
    for t in to.iter() {
        tos.push(as_str(t, "replaceStrings")?.to_string());
    }
    let mut out = String::new();
    let mut i = 0;
    'outer: while i < s.len() {
        for (pat, rep) in froms.iter().zip(tos.iter()) {
            if !pat.is_empty() && s[i..].starts_with(pat.as_str()) {
                out.push_str(rep);
                i += pat.len();
                continue 'outer;
            }
        }
        let ch = s[i..].chars().next().expect("i < s.len()");
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(Value::Str(Rc::from(out.as_str())))
}

/// Splits `s` on literal occurrences of `sep`. Real Nix's `split` takes a
/// POSIX extended regex; this core has no regex engine (spec §9 open
/// question, same allowance as `builtins.match`), so `sep` is matched
/// literally instead.
fn split(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let sep = as_str(&args[0], "split")?;
    let s = as_str(&args[1], "split")?;
    if sep.is_empty() {
        return Err(EvalError::type_error("split", "non-empty separator", "empty string"));
    }
    let pieces: Vec<Value> = s.split(sep).map(|p| Value::Str(Rc::from(p))).collect();
    Ok(Value::List(Rc::new(pieces)))
}

fn to_string(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let s = ev.coerce_to_string(args[0].clone())?;
    Ok(Value::Str(Rc::from(s.as_str())))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("stringLength", native("stringLength", 1, string_length)),
        ("substring", native("substring", 3, substring)),
        ("concatStrings", native("concatStrings", 1, concat_strings)),
        ("concatStringsSep", native("concatStringsSep", 2, concat_strings_sep)),
        ("replaceStrings", native("replaceStrings", 3, replace_strings)),
        ("split", native("split", 2, split)),
        ("toString", native("toString", 1, to_string)),
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
    fn substring_clamps_length() {
        let mut e = ev();
        let r = substring(&[Value::Int(0), Value::Int(100), Value::Str(Rc::from("hello"))], &mut e).unwrap();
        assert_eq!(r, Value::Str(Rc::from("hello")));
    }

    #[test]
    fn replace_strings_literal() {
        let mut e = ev();
        let from = Value::List(Rc::new(vec![Value::Str(Rc::from("a"))]));
        let to = Value::List(Rc::new(vec![Value::Str(Rc::from("X"))]));
        let r = replace_strings(&[from, to, Value::Str(Rc::from("banana"))], &mut e).unwrap();
        assert_eq!(r, Value::Str(Rc::from("bXnXnX")));
    }

    #[test]
    fn split_on_literal_separator() {
        let mut e = ev();
        let r = split(&[Value::Str(Rc::from(",")), Value::Str(Rc::from("a,b,c"))], &mut e).unwrap();
        let items = r.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Value::Str(Rc::from("b")));
    }

    #[test]
    fn to_string_coerces_int() {
        let mut e = ev();
        assert_eq!(to_string(&[Value::Int(42)], &mut e).unwrap(), Value::Str(Rc::from("42")));
    }
}

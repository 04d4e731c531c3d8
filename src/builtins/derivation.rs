// ABOUTME: `derivation`/`derivationStrict`/`placeholder` (spec §4.B "Derivation", §4.S)

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::store::{self, Derivation, DerivationOutput};
use crate::value::{AttrSet, Value};
use std::rc::Rc;

fn require_str(set: &AttrSet, key: &str, fname: &str) -> Result<String, EvalError> {
    match set.get(key) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(EvalError::type_error(fname, "string", other.type_name())),
        None => Err(EvalError::AttributeNotFound(key.to_string())),
    }
}

/// Builds the derivation and returns the input attribute set extended with
/// `type = "derivation"`, `outPath`, and `drvPath`, per spec §4.B.
fn derivation_strict(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let input = args[0]
        .as_attrset()
        .ok_or_else(|| EvalError::type_error("derivation", "set", args[0].type_name()))?
        .clone();

    let mut forced = AttrSet::new();
    for (k, v) in input.iter() {
        forced.insert(k.clone(), ev.force(v.clone())?);
    }

    let name = require_str(&forced, "name", "derivation")?;
    let system = require_str(&forced, "system", "derivation")?;
    let builder = require_str(&forced, "builder", "derivation")?;

    let mut args_list = Vec::new();
    if let Some(Value::List(items)) = forced.get("args") {
        for item in items.iter() {
            let s = ev.coerce_to_string(item.clone())?;
            args_list.push(s);
        }
    }

    let mut env_vars: Vec<(String, String)> = Vec::new();
    for (k, v) in forced.iter() {
        if matches!(k.as_ref(), "name" | "system" | "builder" | "args") {
            continue;
        }
        env_vars.push((k.to_string(), ev.coerce_to_string(v.clone())?));
    }

    let drv = Derivation {
        outputs: vec![DerivationOutput {
            name: "out".to_string(),
            path: String::new(),
            hash_algo: String::new(),
            hash: String::new(),
        }],
        input_drvs: Vec::new(),
        input_srcs: Vec::new(),
        system: system.clone(),
        builder: builder.clone(),
        args: args_list,
        env: env_vars,
    };
    let aterm = drv.to_aterm();
    let store_dir = crate::config::STORE_DIR;
    let drv_path = store::drv_path(&name, &aterm, store_dir);
    let out_path = store::output_path(&drv_path, &name, "out", store_dir);

    let mut result = input.as_ref().clone();
    result.insert(Rc::from("type"), Value::Str(Rc::from("derivation")));
    result.insert(Rc::from("outPath"), Value::Path(Rc::from(out_path.as_str())));
    result.insert(Rc::from("drvPath"), Value::Path(Rc::from(drv_path.as_str())));
    Ok(Value::AttrSet(Rc::new(result)))
}

/// `placeholder "out"` returns a string used at build time to refer to an
/// output path before it's known; here it's a stable hash-derived token so
/// substitution is at least self-consistent within one evaluation.
fn placeholder(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let name = args[0].as_str().ok_or_else(|| EvalError::type_error("placeholder", "string", args[0].type_name()))?;
    let digest = store::sha256_hex(format!("placeholder:{name}").as_bytes());
    Ok(Value::Str(Rc::from(format!("/{digest}").as_str())))
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("derivation", native("derivation", 1, derivation_strict)),
        ("derivationStrict", native("derivationStrict", 1, derivation_strict)),
        ("placeholder", native("placeholder", 1, placeholder)),
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
    fn derivation_store_path_shape() {
        let mut e = ev();
        let mut set = AttrSet::new();
        set.insert(Rc::from("name"), Value::Str(Rc::from("hello")));
        set.insert(Rc::from("system"), Value::Str(Rc::from("x86_64-linux")));
        set.insert(Rc::from("builder"), Value::Str(Rc::from("/bin/sh")));
        let result = derivation_strict(&[Value::AttrSet(Rc::new(set))], &mut e).unwrap();
        let set = result.as_attrset().unwrap();
        let out_path = match set.get("outPath") {
            Some(Value::Path(p)) => p.to_string(),
            _ => panic!("expected outPath"),
        };
        assert!(out_path.starts_with("/nix/store/"));
        assert!(out_path.ends_with("-hello"));
        let hash = &out_path["/nix/store/".len()..out_path.len() - "-hello".len()];
        assert_eq!(hash.len(), 52);
    }
}

// ABOUTME: Filesystem primitives (spec §4.B "Path/IO"), backed by `crate::io::IoHandle`

use super::native;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::io::{FileKind, IoHandle};
use crate::value::Value;
use std::path::Path;
use std::rc::Rc;

fn path_text(v: &Value, fname: &str) -> Result<&str, EvalError> {
    match v {
        Value::Path(p) => Ok(p.as_ref()),
        Value::Str(s) => Ok(s.as_ref()),
        other => Err(EvalError::type_error(fname, "path or string", other.type_name())),
    }
}

fn kind_name(k: FileKind) -> &'static str {
    match k {
        FileKind::Regular => "regular",
        FileKind::Directory => "directory",
        FileKind::Symlink => "symlink",
        FileKind::Unknown => "unknown",
    }
}

fn import_fn(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let path = path_text(&args[0], "import")?.to_string();
    let src = ev.io.read_file(&path).map_err(|e| EvalError::FileNotFound(e.to_string()))?;
    let base_dir = Path::new(&path).parent().unwrap_or_else(|| Path::new("/")).to_path_buf();
    let expr = crate::parser::parse(&src, &path, &base_dir)?;
    ev.eval(&expr, &ev.global.clone())
}

fn read_file(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let path = path_text(&args[0], "readFile")?;
    let text = ev.io.read_file(path).map_err(|e| EvalError::FileNotFound(e.to_string()))?;
    Ok(Value::Str(Rc::from(text.as_str())))
}

fn read_dir(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let path = path_text(&args[0], "readDir")?;
    let entries = ev.io.read_dir(path).map_err(|e| EvalError::FileNotFound(e.to_string()))?;
    let mut set = crate::value::AttrSet::new();
    for (name, kind) in entries {
        set.insert(Rc::from(name.as_str()), Value::Str(Rc::from(kind_name(kind))));
    }
    Ok(Value::AttrSet(Rc::new(set)))
}

fn read_file_type(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let path = path_text(&args[0], "readFileType")?;
    let kind = ev.io.file_kind(path).map_err(|e| EvalError::FileNotFound(e.to_string()))?;
    Ok(Value::Str(Rc::from(kind_name(kind))))
}

fn path_exists(args: &[Value], ev: &mut Evaluator) -> Result<Value, EvalError> {
    let path = path_text(&args[0], "pathExists")?;
    Ok(Value::Bool(ev.io.path_exists(path)))
}

fn to_path(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let s = path_text(&args[0], "toPath")?;
    Ok(Value::Path(Rc::from(s)))
}

fn base_name_of(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let s = path_text(&args[0], "baseNameOf")?;
    let name = Path::new(s).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(Value::Str(Rc::from(name.as_str())))
}

fn dir_of(args: &[Value], _ev: &mut Evaluator) -> Result<Value, EvalError> {
    let parent = Path::new(path_text(&args[0], "dirOf")?)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());
    match &args[0] {
        Value::Path(_) => Ok(Value::Path(Rc::from(parent.as_str()))),
        _ => Ok(Value::Str(Rc::from(parent.as_str()))),
    }
}

pub fn entries() -> Vec<(&'static str, Value)> {
    vec![
        ("import", native("import", 1, import_fn)),
        ("readFile", native("readFile", 1, read_file)),
        ("readDir", native("readDir", 1, read_dir)),
        ("readFileType", native("readFileType", 1, read_file_type)),
        ("pathExists", native("pathExists", 1, path_exists)),
        ("toPath", native("toPath", 1, to_path)),
        ("baseNameOf", native("baseNameOf", 1, base_name_of)),
        ("dirOf", native("dirOf", 1, dir_of)),
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
    fn base_name_and_dir_of() {
        let mut e = ev();
        let p = Value::Path(Rc::from("/a/b/c.nix"));
        assert_eq!(base_name_of(&[p.clone()], &mut e).unwrap(), Value::Str(Rc::from("c.nix")));
        assert_eq!(dir_of(&[p], &mut e).unwrap(), Value::Path(Rc::from("/a/b")));
    }

    #[test]
    fn path_exists_false_under_null_handle() {
        let mut e = ev();
        assert_eq!(path_exists(&[Value::Path(Rc::from("/tmp"))], &mut e).unwrap(), Value::Bool(false));
    }

    #[test]
    fn read_file_fails_under_null_handle() {
        let mut e = ev();
        assert!(read_file(&[Value::Path(Rc::from("/tmp/x"))], &mut e).is_err());
    }
}

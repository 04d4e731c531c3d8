// ABOUTME: Parent-linked lexical scope chain holding thunk-wrapped bindings

use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Env {
    bindings: RefCell<HashMap<Rc<str>, Value>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    /// Creates a new global environment with no parent.
    pub fn new() -> Rc<Self> {
        Rc::new(Env { bindings: RefCell::new(HashMap::new()), parent: None })
    }

    /// Creates a new child environment with a parent.
    pub fn with_parent(parent: Rc<Env>) -> Rc<Self> {
        Rc::new(Env { bindings: RefCell::new(HashMap::new()), parent: Some(parent) })
    }

    /// Defines a binding in THIS scope only (doesn't walk the parent chain);
    /// re-defining an existing name overwrites it.
    pub fn define(&self, name: Rc<str>, value: Value) {
        self.bindings.borrow_mut().insert(name, value);
    }

    /// Looks up a name in this scope, else recurses into the parent.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(ref parent) = self.parent {
            return parent.get(name);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let env = Env::new();
        env.define(Rc::from("x"), Value::Int(42));
        match env.get("x") {
            Some(Value::Int(n)) => assert_eq!(n, 42),
            _ => panic!("expected Int(42)"),
        }
    }

    #[test]
    fn undefined_name() {
        let env = Env::new();
        assert!(env.get("undefined").is_none());
    }

    #[test]
    fn shadowing() {
        let parent = Env::new();
        parent.define(Rc::from("x"), Value::Int(1));
        let child = Env::with_parent(parent);
        child.define(Rc::from("x"), Value::Int(2));
        match child.get("x") {
            Some(Value::Int(n)) => assert_eq!(n, 2),
            _ => panic!("expected shadowed Int(2)"),
        }
    }

    #[test]
    fn parent_lookup() {
        let parent = Env::new();
        parent.define(Rc::from("x"), Value::Int(42));
        let child = Env::with_parent(parent);
        match child.get("x") {
            Some(Value::Int(n)) => assert_eq!(n, 42),
            _ => panic!("expected inherited Int(42)"),
        }
    }

    #[test]
    fn multiple_levels() {
        let grandparent = Env::new();
        grandparent.define(Rc::from("a"), Value::Int(1));
        let parent = Env::with_parent(grandparent);
        parent.define(Rc::from("b"), Value::Int(2));
        let child = Env::with_parent(parent);
        child.define(Rc::from("c"), Value::Int(3));

        assert_eq!(child.get("a"), Some(Value::Int(1)));
        assert_eq!(child.get("b"), Some(Value::Int(2)));
        assert_eq!(child.get("c"), Some(Value::Int(3)));
    }
}

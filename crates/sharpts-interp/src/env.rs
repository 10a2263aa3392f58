//! Lexical environments: a chain of binding frames.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::value::Value;

pub type Env = Rc<Environment>;

pub struct Environment {
    vars: RefCell<FxHashMap<String, Value>>,
    parent: Option<Env>,
}

impl Environment {
    pub fn root() -> Env {
        Rc::new(Environment {
            vars: RefCell::new(FxHashMap::default()),
            parent: None,
        })
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Environment {
            vars: RefCell::new(FxHashMap::default()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Introduce (or overwrite) a binding in this frame.
    pub fn define(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Assign to the nearest frame holding the name; returns false when
    /// no frame does.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        if self.vars.borrow().contains_key(name) {
            self.vars.borrow_mut().insert(name.to_string(), value);
            return true;
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
            || self.parent.as_ref().is_some_and(|p| p.has(name))
    }

    /// Clone out this frame's own bindings (namespace objects).
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.vars
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

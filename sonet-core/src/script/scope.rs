use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::Value;

/// One level of lexical variable storage.
///
/// The global scope has no parent. Function frames get a fresh scope whose
/// parent is the global scope, so locals shadow globals of the same name.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn global() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    pub fn with_parent(parent: Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(parent),
        })
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Resolve through the parent chain; the nearest declaration wins.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set_local(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
            || self.parent.as_ref().is_some_and(|p| p.contains(name))
    }

    /// Assign to the nearest existing binding, or create one here.
    pub fn set(&self, name: &str, value: Value) {
        if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
            *slot = value;
            return;
        }
        let mut cur = self.parent.as_deref();
        while let Some(scope) = cur {
            if let Some(slot) = scope.vars.borrow_mut().get_mut(name) {
                *slot = value;
                return;
            }
            cur = scope.parent.as_deref();
        }
        self.set_local(name, value);
    }

    pub fn len(&self) -> usize {
        self.vars.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.borrow().is_empty()
    }
}

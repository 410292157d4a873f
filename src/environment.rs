//! Runtime representation of nested lexical scopes.
//!
//! Environments form a singly-linked chain of `Rc<RefCell<_>>` frames rooted
//! at the global environment.  A closure holds a shared handle to the frame
//! that was active at its definition site, so frames routinely outlive the
//! block or call that created them; the chain is dropped when the last
//! closure or call frame releases it.
//!
//! Two lookup paths exist on purpose.  `get`/`assign` walk the chain by name
//! and are used for globals only — a miss there is an ordinary Lox runtime
//! condition ("Undefined variable").  `get_at`/`assign_at` hop an exact,
//! resolver-computed distance and *panic* on a missing binding: the resolver
//! guarantees the slot exists, so a miss is an interpreter defect, not a
//! user-facing error.

use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to one scope frame.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    /// A root (global) frame with no parent.
    pub fn new() -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: None,
        }))
    }

    /// A child frame chained under `enclosing`.
    pub fn with_enclosing(enclosing: EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }))
    }

    /// Bind `name` in *this* frame, overwriting any previous binding here.
    /// Redeclaration in the same frame is legal: the later definition wins.
    pub fn define(&mut self, name: &str, value: Value) {
        debug!("define '{}' = {}", name, value);
        self.values.insert(name.to_string(), value);
    }

    /// Name lookup walking the whole chain; used for globals and the REPL.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            Some(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            None
        }
    }

    /// Assignment walking the whole chain; `false` if the name is unbound.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            true
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            false
        }
    }

    /// Read a binding exactly `distance` frames up the chain.
    ///
    /// Panics if the frame or binding is absent — that would mean the
    /// resolver and the runtime disagree about scope layout.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str) -> Value {
        let frame: EnvRef = Self::ancestor(env, distance);
        let value: Option<Value> = frame.borrow().values.get(name).cloned();

        value.unwrap_or_else(|| {
            panic!(
                "resolver/runtime mismatch: no binding '{}' at distance {}",
                name, distance
            )
        })
    }

    /// Write a binding exactly `distance` frames up the chain.
    ///
    /// Panics if the binding is absent, same as [`get_at`](Self::get_at).
    pub fn assign_at(env: &EnvRef, distance: usize, name: &str, value: Value) {
        let frame: EnvRef = Self::ancestor(env, distance);
        let mut frame = frame.borrow_mut();

        match frame.values.get_mut(name) {
            Some(slot) => *slot = value,
            None => panic!(
                "resolver/runtime mismatch: no binding '{}' at distance {}",
                name, distance
            ),
        }
    }

    /// Walk exactly `distance` parent links.
    fn ancestor(env: &EnvRef, distance: usize) -> EnvRef {
        let mut frame: EnvRef = Rc::clone(env);

        for _ in 0..distance {
            let parent: EnvRef = frame
                .borrow()
                .enclosing
                .clone()
                .expect("resolver/runtime mismatch: environment chain too short");
            frame = parent;
        }

        frame
    }
}

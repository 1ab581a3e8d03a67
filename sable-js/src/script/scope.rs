//! Lexical environments.
//!
//! Function and block scopes form a parent chain that closures capture.
//! The outermost environment is the global object, which is not a `Scope`:
//! a lookup that falls off the chain goes to the session's global object.

use std::sync::Arc;

use hashbrown::HashMap;
use spin::Mutex;

use crate::value::Value;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
}

#[derive(Debug, Default)]
struct ScopeData {
    vars: HashMap<String, Binding>,
    parent: Option<Scope>,
}

/// Shared handle to one environment record. Locks are held only for the
/// duration of a single read or write.
#[derive(Debug, Clone)]
pub struct Scope(Arc<Mutex<ScopeData>>);

/// Outcome of assigning through the scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assign {
    Done,
    /// The binding is a `const`.
    Constant,
    /// No scope declares the name; the global object handles it.
    Unbound,
}

impl Scope {
    pub fn new(parent: Option<Scope>) -> Self {
        Scope(Arc::new(Mutex::new(ScopeData {
            vars: HashMap::new(),
            parent,
        })))
    }

    pub fn child(&self) -> Self {
        Scope::new(Some(self.clone()))
    }

    /// Create or overwrite a binding in this scope.
    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .lock()
            .vars
            .insert(name.to_string(), Binding { value, mutable });
    }

    /// Declare `name` as `undefined` unless this scope already has it.
    pub fn declare_hoisted(&self, name: &str) {
        let mut data = self.0.lock();
        if !data.vars.contains_key(name) {
            data.vars.insert(
                name.to_string(),
                Binding {
                    value: Value::Undefined,
                    mutable: true,
                },
            );
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.0.lock().vars.contains_key(name)
    }

    /// Value of the nearest binding for `name`.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let parent = {
                let data = current.0.lock();
                if let Some(binding) = data.vars.get(name) {
                    return Some(binding.value.clone());
                }
                data.parent.clone()
            };
            current = parent?;
        }
    }

    /// Assign to the nearest binding for `name`.
    pub fn assign(&self, name: &str, value: Value) -> Assign {
        let mut current = self.clone();
        loop {
            let parent = {
                let mut data = current.0.lock();
                if let Some(binding) = data.vars.get_mut(name) {
                    if !binding.mutable {
                        return Assign::Constant;
                    }
                    binding.value = value;
                    return Assign::Done;
                }
                data.parent.clone()
            };
            match parent {
                Some(parent) => current = parent,
                None => return Assign::Unbound,
            }
        }
    }

    /// A sibling scope holding copies of this scope's bindings. Used to give
    /// each `for (let ...)` iteration its own environment.
    pub fn fork(&self) -> Self {
        let data = self.0.lock();
        Scope(Arc::new(Mutex::new(ScopeData {
            vars: data.vars.clone(),
            parent: data.parent.clone(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents_and_shadowing_wins() {
        let outer = Scope::new(None);
        outer.declare("x", Value::from(1), true);
        outer.declare("y", Value::from(2), true);
        let inner = outer.child();
        inner.declare("x", Value::from(10), true);
        assert_eq!(inner.lookup("x"), Some(Value::from(10)));
        assert_eq!(inner.lookup("y"), Some(Value::from(2)));
        assert_eq!(inner.lookup("z"), None);
    }

    #[test]
    fn assign_respects_const_and_reports_unbound() {
        let outer = Scope::new(None);
        outer.declare("k", Value::from(1), false);
        let inner = outer.child();
        assert_eq!(inner.assign("k", Value::from(2)), Assign::Constant);
        assert_eq!(inner.assign("missing", Value::from(2)), Assign::Unbound);
        outer.declare_hoisted("v");
        assert_eq!(inner.assign("v", Value::from(3)), Assign::Done);
        assert_eq!(outer.lookup("v"), Some(Value::from(3)));
    }

    #[test]
    fn fork_copies_without_sharing() {
        let scope = Scope::new(None);
        scope.declare("i", Value::from(0), true);
        let next = scope.fork();
        next.assign("i", Value::from(1));
        assert_eq!(scope.lookup("i"), Some(Value::from(0)));
        assert_eq!(next.lookup("i"), Some(Value::from(1)));
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::runtime::Value;

/// A handle to one scope in the lexical-binding chain.
///
/// Handles are cheap to clone and share the underlying scope, which is what
/// lets a closure keep its defining scope alive after the call that created
/// it has returned.
#[derive(Clone)]
pub struct Env {
    scope: Rc<RefCell<Scope>>,
}

impl Env {
    /// The chain root: a scope with no enclosing scope.
    pub fn new() -> Self {
        Self {
            scope: Rc::new(RefCell::new(Scope {
                bindings: FxHashMap::default(),
                enclosing: None,
            })),
        }
    }

    /// A fresh scope enclosed by `outer`.
    pub fn wrap(outer: &Env) -> Self {
        Self {
            scope: Rc::new(RefCell::new(Scope {
                bindings: FxHashMap::default(),
                enclosing: Some(Rc::clone(&outer.scope)),
            })),
        }
    }

    /// Insert or overwrite a binding in this scope.
    pub fn define(&mut self, name: String, value: Value) {
        self.scope.borrow_mut().bindings.insert(name, value);
    }

    /// Search this scope, then each enclosing scope in turn.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut curr = Some(Rc::clone(&self.scope));
        while let Some(rc) = curr {
            let scope = rc.borrow();
            if let Some(value) = scope.bindings.get(name) {
                return Some(value.clone());
            }
            curr = scope.enclosing.as_ref().map(Rc::clone);
        }
        None
    }

    /// Mutate an existing binding, searching outward. Returns false if no
    /// scope in the chain declares `name`.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        let mut curr = Some(Rc::clone(&self.scope));
        while let Some(rc) = curr {
            let mut scope = rc.borrow_mut();
            if let Some(slot) = scope.bindings.get_mut(name) {
                *slot = value;
                return true;
            }
            curr = scope.enclosing.as_ref().map(Rc::clone);
        }
        false
    }

    /// Read from the scope exactly `distance` hops out, with no search.
    pub fn get_at(&self, distance: usize, name: &str) -> Option<Value> {
        self.ancestor(distance)
            .and_then(|rc| rc.borrow().bindings.get(name).cloned())
    }

    /// Write to the scope exactly `distance` hops out, with no search.
    pub fn assign_at(&mut self, distance: usize, name: &str, value: Value) -> bool {
        match self.ancestor(distance) {
            Some(rc) => match rc.borrow_mut().bindings.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    fn ancestor(&self, distance: usize) -> Option<Rc<RefCell<Scope>>> {
        let mut curr = Some(Rc::clone(&self.scope));
        for _ in 0..distance {
            curr = match curr {
                Some(rc) => rc.borrow().enclosing.as_ref().map(Rc::clone),
                None => return None,
            };
        }
        curr
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

struct Scope {
    bindings: FxHashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Scope>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_then_get() {
        let mut env = Env::new();
        env.define(String::from("a"), Value::Num(1.0));
        assert_eq!(Some(Value::Num(1.0)), env.get("a"));
    }

    #[test]
    fn get_missing_is_none() {
        let env = Env::new();
        assert_eq!(None, env.get("a"));
    }

    #[test]
    fn redefine_overwrites() {
        let mut env = Env::new();
        env.define(String::from("a"), Value::Num(1.0));
        env.define(String::from("a"), Value::Str(String::from("x")));
        assert_eq!(Some(Value::Str(String::from("x"))), env.get("a"));
    }

    #[test]
    fn get_walks_enclosing_chain() {
        let mut root = Env::new();
        root.define(String::from("a"), Value::Num(1.0));
        let inner = Env::wrap(&Env::wrap(&root));
        assert_eq!(Some(Value::Num(1.0)), inner.get("a"));
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut root = Env::new();
        root.define(String::from("a"), Value::Num(1.0));
        let mut inner = Env::wrap(&root);
        inner.define(String::from("a"), Value::Num(2.0));
        assert_eq!(Some(Value::Num(2.0)), inner.get("a"));
        assert_eq!(Some(Value::Num(1.0)), root.get("a"));
    }

    #[test]
    fn assign_mutates_declaring_scope() {
        let mut root = Env::new();
        root.define(String::from("a"), Value::Num(1.0));
        let mut inner = Env::wrap(&root);
        assert!(inner.assign("a", Value::Num(2.0)));
        assert_eq!(Some(Value::Num(2.0)), root.get("a"));
    }

    #[test]
    fn assign_without_declaration_fails() {
        let mut env = Env::new();
        assert!(!env.assign("a", Value::Num(1.0)));
        assert_eq!(None, env.get("a"));
    }

    #[test]
    fn get_at_skips_exactly_distance_scopes() {
        let mut root = Env::new();
        root.define(String::from("a"), Value::Num(1.0));
        let mut mid = Env::wrap(&root);
        mid.define(String::from("a"), Value::Num(2.0));
        let inner = Env::wrap(&mid);

        assert_eq!(Some(Value::Num(2.0)), inner.get_at(1, "a"));
        assert_eq!(Some(Value::Num(1.0)), inner.get_at(2, "a"));
        assert_eq!(None, inner.get_at(0, "a"));
    }

    #[test]
    fn assign_at_targets_one_scope_only() {
        let mut root = Env::new();
        root.define(String::from("a"), Value::Num(1.0));
        let mut inner = Env::wrap(&root);
        inner.define(String::from("a"), Value::Num(2.0));

        assert!(inner.assign_at(1, "a", Value::Num(9.0)));
        assert_eq!(Some(Value::Num(9.0)), root.get("a"));
        assert_eq!(Some(Value::Num(2.0)), inner.get_at(0, "a"));
    }

    #[test]
    fn assign_at_past_chain_end_fails() {
        let mut env = Env::new();
        assert!(!env.assign_at(3, "a", Value::Nil));
    }

    #[test]
    fn captured_scope_outlives_the_wrapping_call() {
        let captured;
        {
            let mut local = Env::wrap(&Env::new());
            local.define(String::from("count"), Value::Num(7.0));
            captured = local.clone();
        }
        assert_eq!(Some(Value::Num(7.0)), captured.get("count"));
    }
}

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::interpreter::Interpreter;
use crate::runtime::{Call, LoxFunction, RunResult, Value};

/// A class value: name, optional superclass, and the method table.
#[derive(Clone)]
pub struct LoxClass(Rc<Class>);

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<LoxClass>,
        methods: FxHashMap<String, LoxFunction>,
    ) -> Self {
        Self(Rc::new(Class {
            name,
            superclass,
            methods,
        }))
    }

    /// Search this class, then the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<LoxFunction> {
        self.0.find_method(name)
    }
}

impl Call for LoxClass {
    fn name(&self) -> String {
        self.0.name.to_owned()
    }

    fn arity(&self) -> usize {
        self.0
            .find_method("init")
            .map(|fun| fun.arity())
            .unwrap_or(0)
    }

    /// Calling a class allocates an instance, runs `init` bound to it (if
    /// declared), and yields the instance no matter what `init` returned.
    fn call(&self, rt: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
        let instance = LoxInstance::new(self.clone());
        if let Some(fun) = self.0.find_method("init") {
            fun.bind(instance.clone()).call(rt, args)?;
        }
        Ok(Value::Instance(instance))
    }
}

impl PartialEq for LoxClass {
    fn eq(&self, other: &LoxClass) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

struct Class {
    name: String,
    superclass: Option<LoxClass>,
    methods: FxHashMap<String, LoxFunction>,
}

impl Class {
    fn find_method(&self, name: &str) -> Option<LoxFunction> {
        self.methods.get(name).cloned().or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|parent| parent.0.find_method(name))
        })
    }
}

/// An instance: a class reference plus a mutable field table.
#[derive(Clone)]
pub struct LoxInstance(Rc<RefCell<Instance>>);

impl LoxInstance {
    pub fn new(class: LoxClass) -> Self {
        Self(Rc::new(RefCell::new(Instance {
            class,
            fields: FxHashMap::default(),
        })))
    }

    /// Fields shadow methods; a method hit is bound to this instance.
    pub fn get(&self, name: &str) -> Option<Value> {
        let inst = self.0.borrow();
        if let Some(value) = inst.fields.get(name) {
            return Some(value.clone());
        }
        inst.class
            .find_method(name)
            .map(|fun| Value::Fun(fun.bind(self.clone())))
    }

    /// Writes always land in the instance's own field table.
    pub fn set(&self, name: String, value: Value) {
        self.0.borrow_mut().fields.insert(name, value);
    }
}

impl PartialEq for LoxInstance {
    fn eq(&self, other: &LoxInstance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} instance", self.0.borrow().class.0.name)
    }
}

struct Instance {
    class: LoxClass,
    fields: FxHashMap<String, Value>,
}

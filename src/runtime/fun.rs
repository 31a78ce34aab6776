use std::fmt;
use std::rc::Rc;

use crate::ast::FunDecl;
use crate::interpreter::Interpreter;
use crate::runtime::{Call, Env, LoxInstance, RunResult, Signal, Value};

/// A user function value: a shared declaration plus the environment that
/// was active when the declaration was evaluated.
#[derive(Clone)]
pub struct LoxFunction(Rc<Function>);

impl LoxFunction {
    pub fn new(decl: Rc<FunDecl>, closure: Env, is_init: bool) -> Self {
        Self(Rc::new(Function {
            decl,
            closure,
            is_init,
        }))
    }

    /// A new function value sharing this declaration, with a fresh
    /// one-binding scope (`this` -> receiver) chained onto the original
    /// closure. The original closure is never rebound.
    pub fn bind(&self, instance: LoxInstance) -> Self {
        let mut env = Env::wrap(&self.0.closure);
        env.define(String::from("this"), Value::Instance(instance));
        Self(Rc::new(Function {
            decl: Rc::clone(&self.0.decl),
            closure: env,
            is_init: self.0.is_init,
        }))
    }
}

impl Call for LoxFunction {
    fn name(&self) -> String {
        self.0.decl.name.to_owned()
    }

    fn arity(&self) -> usize {
        self.0.decl.params.len()
    }

    fn call(&self, rt: &mut Interpreter, args: Vec<Value>) -> RunResult<Value> {
        let mut env = Env::wrap(&self.0.closure);
        self.0.decl.params.iter().zip(args).for_each(|(param, arg)| {
            env.define(param.name.to_owned(), arg);
        });

        let sig = rt.run_with(&self.0.decl.body, env)?;
        let result = match sig {
            Signal::Ret(value) => value,
            Signal::None if self.0.is_init => {
                // A bound initializer always has the receiver at distance 0.
                self.0.closure.get_at(0, "this").unwrap()
            }
            Signal::None => Value::Nil,
        };
        Ok(result)
    }
}

impl PartialEq for LoxFunction {
    fn eq(&self, other: &LoxFunction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.decl.name.is_empty() {
            write!(f, "<fn>")
        } else {
            write!(f, "<fn {}>", self.0.decl.name)
        }
    }
}

struct Function {
    decl: Rc<FunDecl>,
    closure: Env,
    is_init: bool,
}

//! The native callables installed into the global scope.

use std::fmt;
use std::rc::Rc;
use std::time::SystemTime;

use crate::interpreter::Interpreter;
use crate::runtime::{Call, Env, RunResult, Value};

/// Define every native in the given (global) scope.
pub fn register(env: &mut Env) {
    env.define(String::from("clock"), Value::Native(Rc::new(Clock)));
}

/// Seconds since the Unix epoch, as a number.
#[derive(Debug)]
pub struct Clock;

impl Call for Clock {
    fn name(&self) -> String {
        String::from("clock")
    }

    fn arity(&self) -> usize {
        0
    }

    fn call(&self, _: &mut Interpreter, _: Vec<Value>) -> RunResult<Value> {
        let seconds = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Value::Num(seconds))
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<native fn>")
    }
}

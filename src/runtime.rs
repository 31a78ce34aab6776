//! Module for runtime representation of language items.

use thiserror::Error;

use crate::interpreter::Interpreter;

mod env;
mod fun;
mod obj;
mod value;

pub use self::env::Env;
pub use self::fun::LoxFunction;
pub use self::obj::{LoxClass, LoxInstance};
pub use self::value::Value;

/// Anything invocable with call syntax: user functions, classes, natives.
pub trait Call: std::fmt::Display {
    fn name(&self) -> String;
    fn arity(&self) -> usize;
    fn call(&self, rt: &mut Interpreter, args: Vec<Value>) -> RunResult<Value>;
}

pub type RunResult<T> = Result<T, RuntimeError>;

/// A fault during execution. Aborts the enclosing `interpret` call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// (line, expected, actual)
    #[error("[line {0}] runtime error: Expected {1} argument(s) but got {2}.")]
    ArityMismatch(usize, usize, usize),
    /// (line)
    #[error("[line {0}] runtime error: operands must be two numbers or two strings")]
    AddUnsupported(usize),
    /// (line)
    #[error("[line {0}] runtime error: operands must be numbers")]
    BinNonNumeric(usize),
    /// (line)
    #[error("[line {0}] runtime error: operand must be a number")]
    UniNonNumeric(usize),
    /// (line)
    #[error("[line {0}] runtime error: can only call functions and classes")]
    NotCallable(usize),
    /// (line)
    #[error("[line {0}] runtime error: only instances have properties")]
    NotInstance(usize),
    /// (line)
    #[error("[line {0}] runtime error: only instances have fields")]
    NoFields(usize),
    /// (line)
    #[error("[line {0}] runtime error: superclass must be a class")]
    NotSuperclass(usize),
    /// (line, name)
    #[error("[line {0}] runtime error: undefined property '{1}'")]
    UndefinedProp(usize, String),
    /// (line, name)
    #[error("[line {0}] runtime error: undefined variable '{1}'")]
    UndefinedVar(usize, String),
}

/// How a statement finished.
///
/// `Ret` is a control transfer, not an error: it unwinds to the nearest
/// enclosing call frame and must never surface as a fault.
pub enum Signal {
    None,
    Ret(Value),
}

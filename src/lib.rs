//! A tree-walking interpreter for the Lox scripting language.
//!
//! A program moves through three passes before producing output: the
//! [`Lexer`] turns source text into a token stream, the [`Parser`] builds
//! the syntax tree, and the [`Resolver`] computes a scope distance for
//! every variable reference. The [`Interpreter`] then executes the
//! resolved tree. Each pass hands its result to the next through one of
//! the program structs below; nothing is communicated through shared
//! mutable state.

use rustc_hash::FxHashMap;

pub mod ast;
pub mod runtime;
pub mod stdlib;

mod interpreter;
mod lexer;
mod parser;
mod resolver;

pub use interpreter::{Interpreter, PrintSink};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use resolver::{ResolveError, Resolver};

/// Token stream plus any malformed input found along the way.
pub struct LexedProgram {
    pub spans: Vec<ast::Span>,
    pub errors: Vec<LexError>,
}

/// Syntax tree plus any syntax errors recovered from. `next_id` is the
/// first unused reference-node id, for callers that parse incrementally.
pub struct ParsedProgram {
    pub decls: Vec<ast::Decl>,
    pub errors: Vec<ParseError>,
    pub next_id: usize,
}

/// A program that passed scope analysis, with the distance table the
/// interpreter consults for resolved references.
pub struct ResolvedProgram {
    pub decls: Vec<ast::Decl>,
    pub hops: FxHashMap<usize, usize>,
}

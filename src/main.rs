use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use loxtree::{Interpreter, Lexer, Parser, Resolver};

static NAME: &str = "loxtree";

const EX_USAGE: i32 = 64;
const EX_DATAERR: i32 = 65;
const EX_NOINPUT: i32 = 66;
const EX_SOFTWARE: i32 = 70;

fn main() {
    env_logger::init();

    let args = env::args().collect::<Vec<String>>();
    match args.len() {
        1 => run_prompt(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: {} [script]", NAME);
            process::exit(EX_USAGE);
        }
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}: cannot read '{}': {}", NAME, path, err);
            process::exit(EX_NOINPUT);
        }
    };

    let mut rt = Interpreter::new();
    match run(&source, &mut rt, 0) {
        Outcome::Ok(_) => {}
        Outcome::StaticError => process::exit(EX_DATAERR),
        Outcome::Fault(_) => process::exit(EX_SOFTWARE),
    }
}

fn run_prompt() {
    let stdin = io::stdin();
    let mut rt = Interpreter::new();
    let mut next_id = 0;

    print_prompt();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        // Errors reset between lines; the interpreter and the node-id
        // counter carry over so later lines see earlier definitions. A
        // faulted line still consumed its ids (it may have left closures
        // behind), so its counter position carries over too.
        match run(&line, &mut rt, next_id) {
            Outcome::Ok(id) | Outcome::Fault(id) => next_id = id,
            Outcome::StaticError => {}
        }
        print_prompt();
    }
}

fn print_prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

enum Outcome {
    /// Ran to completion; carries the next unused node id.
    Ok(usize),
    StaticError,
    /// Execution faulted after a successful parse; the node ids the
    /// program consumed are spent, so the next unused id carries along.
    Fault(usize),
}

fn run(source: &str, rt: &mut Interpreter, next_id: usize) -> Outcome {
    let lexed = Lexer::new(source).scan();
    if !lexed.errors.is_empty() {
        for err in &lexed.errors {
            eprintln!("{}", err);
        }
        return Outcome::StaticError;
    }

    let parsed = Parser::with_next_id(lexed.spans, next_id).parse();
    if !parsed.errors.is_empty() {
        for err in &parsed.errors {
            eprintln!("{}", err);
        }
        return Outcome::StaticError;
    }
    let next_id = parsed.next_id;

    let resolved = match Resolver::new().resolve(parsed.decls) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("{}", err);
            return Outcome::StaticError;
        }
    };

    match rt.interpret(resolved) {
        Ok(()) => Outcome::Ok(next_id),
        Err(fault) => {
            eprintln!("{}", fault);
            Outcome::Fault(next_id)
        }
    }
}

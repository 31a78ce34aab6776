use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{Decl, Expr, FunDecl, Stmt, Var};
use crate::ResolvedProgram;

/// A scoping or class-usage violation, detected before any execution.
///
/// Resolution is fail-fast: the first violation aborts the pass, and a
/// program that failed to resolve is never handed to the interpreter.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// (line, name)
    #[error("[line {0}] resolve error at '{1}': variable with this name already declared in this scope")]
    AlreadyDeclared(usize, String),
    /// (line, name)
    #[error("[line {0}] resolve error at '{1}': cannot read local variable in its own initializer")]
    OwnInitializer(usize, String),
    /// (line)
    #[error("[line {0}] resolve error at 'return': cannot return from top-level code")]
    TopReturn(usize),
    /// (line)
    #[error("[line {0}] resolve error at 'return': cannot return a value from an initializer")]
    InitReturn(usize),
    /// (line)
    #[error("[line {0}] resolve error at 'this': cannot use 'this' outside of a class")]
    InvalidThis(usize),
    /// (line)
    #[error("[line {0}] resolve error at 'super': cannot use 'super' outside of a class")]
    SuperOutsideClass(usize),
    /// (line)
    #[error("[line {0}] resolve error at 'super': cannot use 'super' in a class with no superclass")]
    SuperWithoutParent(usize),
    /// (line, name)
    #[error("[line {0}] resolve error at '{1}': a class cannot inherit from itself")]
    InheritSelf(usize, String),
}

type ResolveResult = Result<(), ResolveError>;

#[derive(Clone, Copy, PartialEq)]
enum FunKind {
    None,
    Function,
    Method,
    Init,
}

#[derive(Clone, Copy, PartialEq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

/// What the scope-stack scan turned up for a name.
enum ScanHit {
    /// Usable binding found this many scopes out.
    Found(usize),
    /// The only mention is a binding still in its own initializer.
    OnlyDeclared,
    /// No scope mentions the name; it is late-bound against the globals.
    Missing,
}

/// The static scope-analysis pass.
///
/// Walks the statement sequence once, maintaining a stack of lexical
/// scopes, and records for each reference node how many environments the
/// interpreter must skip to find its binding. Names never found in the
/// stack get no entry and fall back to a by-name global lookup at
/// execution time, which is what lets separately resolved programs (REPL
/// lines) see globals from earlier ones.
///
/// The bottom of the stack is the global scope. It is exempt from the
/// duplicate-declaration rule, and its bindings become usable immediately
/// on declaration so a global `var` may be re-declared from its own prior
/// value. A binding still in its initializer is invisible to the scan;
/// the reference falls through to an enclosing binding instead, and only
/// faults when no enclosing scope can supply the name.
///
/// The scope stack must open and close scopes exactly where the
/// interpreter creates environments, or the recorded distances desync.
pub struct Resolver {
    scopes: Vec<FxHashMap<String, bool>>,
    hops: FxHashMap<usize, usize>,
    curr_fun: FunKind,
    curr_class: ClassKind,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
            hops: FxHashMap::default(),
            curr_fun: FunKind::None,
            curr_class: ClassKind::None,
        }
    }

    pub fn resolve(mut self, decls: Vec<Decl>) -> Result<ResolvedProgram, ResolveError> {
        self.resolve_all(&decls)?;
        debug!("resolved {} reference nodes", self.hops.len());
        Ok(ResolvedProgram {
            decls,
            hops: self.hops,
        })
    }

    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn in_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Mark a name declared but not yet usable. Duplicate declarations in
    /// one scope are an error; the global scope is exempt, and its
    /// bindings are usable at once.
    fn declare(&mut self, name: &str, line: usize) -> ResolveResult {
        let global = self.in_global_scope();
        if let Some(scope) = self.scopes.last_mut() {
            if global {
                scope.insert(name.to_owned(), true);
            } else if scope.insert(name.to_owned(), false).is_some() {
                return Err(ResolveError::AlreadyDeclared(line, name.to_owned()));
            }
        }
        Ok(())
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), true);
        }
    }

    fn scan(&self, name: &str) -> ScanHit {
        let mut only_declared = false;
        for (dist, scope) in self.scopes.iter().rev().enumerate() {
            match scope.get(name) {
                Some(true) => return ScanHit::Found(dist),
                Some(false) => only_declared = true,
                None => {}
            }
        }
        if only_declared {
            ScanHit::OnlyDeclared
        } else {
            ScanHit::Missing
        }
    }

    fn resolve_var(&mut self, var: &Var) -> ResolveResult {
        match self.scan(&var.name) {
            ScanHit::Found(dist) => {
                self.hops.insert(var.id, dist);
                Ok(())
            }
            ScanHit::OnlyDeclared => {
                Err(ResolveError::OwnInitializer(var.line, var.name.to_owned()))
            }
            // Not found, assume global.
            ScanHit::Missing => Ok(()),
        }
    }

    fn resolve_all(&mut self, decls: &[Decl]) -> ResolveResult {
        for decl in decls {
            self.resolve_decl(decl)?;
        }
        Ok(())
    }

    fn resolve_decl(&mut self, decl: &Decl) -> ResolveResult {
        match decl {
            Decl::Class(line, name, superclass, methods) => {
                self.resolve_class(*line, name, superclass, methods)
            }
            Decl::Function(decl) => {
                self.declare(&decl.name, decl.line)?;
                self.define(&decl.name);
                self.resolve_function(decl, FunKind::Function)
            }
            Decl::Var(line, name, value) => {
                self.declare(name, *line)?;
                if let Some(expr) = value {
                    self.resolve_expr(expr)?;
                }
                self.define(name);
                Ok(())
            }
            Decl::Statement(stmt) => self.resolve_stmt(stmt),
        }
    }

    fn resolve_class(
        &mut self,
        line: usize,
        name: &str,
        superclass: &Option<Var>,
        methods: &[Rc<FunDecl>],
    ) -> ResolveResult {
        let prev = self.curr_class;
        self.curr_class = ClassKind::Class;

        self.declare(name, line)?;
        self.define(name);

        if let Some(var) = superclass {
            if var.name == name {
                return Err(ResolveError::InheritSelf(var.line, var.name.to_owned()));
            }
            self.curr_class = ClassKind::Subclass;
            self.resolve_var(var)?;
            self.begin_scope();
            self.define("super");
        }

        self.begin_scope();
        self.define("this");

        for method in methods {
            let kind = if method.name == "init" {
                FunKind::Init
            } else {
                FunKind::Method
            };
            self.resolve_function(method, kind)?;
        }

        self.end_scope();
        if superclass.is_some() {
            self.end_scope();
        }
        self.curr_class = prev;
        Ok(())
    }

    /// One scope covers the parameters and the body together, mirroring
    /// the single environment a call installs.
    fn resolve_function(&mut self, decl: &FunDecl, kind: FunKind) -> ResolveResult {
        let prev = self.curr_fun;
        self.curr_fun = kind;

        self.begin_scope();
        for param in &decl.params {
            self.declare(&param.name, param.line)?;
            self.define(&param.name);
        }
        self.resolve_all(&decl.body)?;
        self.end_scope();

        self.curr_fun = prev;
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> ResolveResult {
        match stmt {
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::Print(_, expr) => self.resolve_expr(expr),
            Stmt::Return(line, value) => {
                if self.curr_fun == FunKind::None {
                    return Err(ResolveError::TopReturn(*line));
                }
                if let Some(expr) = value {
                    if self.curr_fun == FunKind::Init {
                        return Err(ResolveError::InitReturn(*line));
                    }
                    self.resolve_expr(expr)?;
                }
                Ok(())
            }
            Stmt::If(cond, then, otherwise) => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(then)?;
                if let Some(stmt) = otherwise {
                    self.resolve_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::While(cond, body) => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(body)
            }
            Stmt::Block(body) => {
                self.begin_scope();
                let result = self.resolve_all(body);
                self.end_scope();
                result
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) -> ResolveResult {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Logical(lhs, _, rhs) | Expr::Binary(lhs, _, rhs) => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)
            }
            Expr::Unary(_, expr) | Expr::Group(expr) => self.resolve_expr(expr),
            Expr::Call(_, callee, args) => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            Expr::Get(_, object, _) => self.resolve_expr(object),
            Expr::Set(_, object, _, value) => {
                self.resolve_expr(value)?;
                self.resolve_expr(object)
            }
            Expr::Assign(var, value) => {
                self.resolve_expr(value)?;
                self.resolve_var(var)
            }
            Expr::Variable(var) => self.resolve_var(var),
            Expr::This(var) => {
                if self.curr_class == ClassKind::None {
                    return Err(ResolveError::InvalidThis(var.line));
                }
                self.resolve_var(var)
            }
            Expr::Super(var, _, _) => {
                match self.curr_class {
                    ClassKind::None => return Err(ResolveError::SuperOutsideClass(var.line)),
                    ClassKind::Class => return Err(ResolveError::SuperWithoutParent(var.line)),
                    ClassKind::Subclass => {}
                }
                self.resolve_var(var)
            }
            Expr::Lambda(decl) => self.resolve_function(decl, FunKind::Function),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::ast::{BinOp, Decl, Expr, FunDecl, LogOp, Primitive, Stmt, UniOp, Var};
use crate::runtime::{Env, LoxClass, LoxFunction, RunResult, RuntimeError, Signal, Value};
use crate::stdlib;
use crate::ResolvedProgram;

/// Where `print` statements send their output: the process stdout, or an
/// in-memory buffer tests can read back.
pub enum PrintSink {
    Stdout,
    Buffer(Rc<RefCell<Vec<String>>>),
}

impl PrintSink {
    fn println(&self, line: &str) {
        match self {
            PrintSink::Stdout => println!("{}", line),
            PrintSink::Buffer(buf) => buf.borrow_mut().push(line.to_owned()),
        }
    }
}

/// The tree-walking evaluator.
///
/// Consumes resolved programs: each reference node either carries an entry
/// in the distance table (then it is read with `get_at` against the
/// current environment) or falls back to a by-name lookup in the globals.
/// Execution is strictly single-threaded and recursive; the host call
/// stack is the call stack.
pub struct Interpreter {
    globals: Env,
    env: Env,
    hops: FxHashMap<usize, usize>,
    sink: PrintSink,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_sink(PrintSink::Stdout)
    }

    pub fn with_sink(sink: PrintSink) -> Self {
        let mut globals = Env::new();
        stdlib::register(&mut globals);
        Self {
            env: globals.clone(),
            globals,
            hops: FxHashMap::default(),
            sink,
        }
    }

    /// Execute a full program. The first fault aborts the run; the
    /// distance table is merged so functions from earlier programs keep
    /// their entries when the REPL feeds several programs through one
    /// interpreter.
    pub fn interpret(&mut self, program: ResolvedProgram) -> Result<(), RuntimeError> {
        debug!(
            "interpreting {} declarations, {} resolved references",
            program.decls.len(),
            program.hops.len()
        );
        self.hops.extend(program.hops);
        for decl in &program.decls {
            // Top-level `return` is rejected at resolve time, so the
            // signal out of a top-level declaration is always `None`.
            self.exec_decl(decl)?;
        }
        Ok(())
    }

    /// Run a function body in the given environment, restoring the
    /// previous environment on every exit path. This is the re-entry
    /// point used by function-call mechanics.
    pub(crate) fn run_with(&mut self, body: &[Decl], env: Env) -> RunResult<Signal> {
        let prev = mem::replace(&mut self.env, env);
        let result = self.exec_all(body);
        self.env = prev;
        result
    }

    fn exec_all(&mut self, body: &[Decl]) -> RunResult<Signal> {
        for decl in body {
            match self.exec_decl(decl)? {
                Signal::None => {}
                ret => return Ok(ret),
            }
        }
        Ok(Signal::None)
    }

    fn exec_decl(&mut self, decl: &Decl) -> RunResult<Signal> {
        match decl {
            Decl::Class(_, name, superclass, methods) => {
                self.exec_class(name, superclass, methods)?;
                Ok(Signal::None)
            }
            Decl::Function(decl) => {
                let fun = LoxFunction::new(Rc::clone(decl), self.env.clone(), false);
                self.env.define(decl.name.to_owned(), Value::Fun(fun));
                Ok(Signal::None)
            }
            Decl::Var(_, name, value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.env.define(name.to_owned(), value);
                Ok(Signal::None)
            }
            Decl::Statement(stmt) => self.exec_stmt(stmt),
        }
    }

    fn exec_class(
        &mut self,
        name: &str,
        superclass: &Option<Var>,
        methods: &[Rc<FunDecl>],
    ) -> RunResult<()> {
        // Bound to nil first so method bodies may reference the class
        // recursively.
        self.env.define(name.to_owned(), Value::Nil);

        let parent = match superclass {
            Some(var) => match self.lookup_var(var)? {
                Value::Class(class) => Some(class),
                _ => return Err(RuntimeError::NotSuperclass(var.line)),
            },
            None => None,
        };

        // Methods close over a scope holding `super`, opened only when
        // there is a superclass; the resolver opens the same scope.
        let mut method_env = self.env.clone();
        if let Some(class) = &parent {
            method_env = Env::wrap(&method_env);
            method_env.define(String::from("super"), Value::Class(class.clone()));
        }

        let mut table = FxHashMap::default();
        for method in methods {
            let is_init = method.name == "init";
            let fun = LoxFunction::new(Rc::clone(method), method_env.clone(), is_init);
            table.insert(method.name.to_owned(), fun);
        }

        let class = LoxClass::new(name.to_owned(), parent, table);
        self.env.assign(name, Value::Class(class));
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> RunResult<Signal> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Signal::None)
            }
            Stmt::Print(_, expr) => {
                let value = self.evaluate(expr)?;
                self.sink.println(&value.to_string());
                Ok(Signal::None)
            }
            Stmt::Return(_, value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Signal::Ret(value))
            }
            Stmt::If(cond, then, otherwise) => {
                if self.evaluate(cond)?.is_truthy() {
                    self.exec_stmt(then)
                } else if let Some(stmt) = otherwise {
                    self.exec_stmt(stmt)
                } else {
                    Ok(Signal::None)
                }
            }
            Stmt::While(cond, body) => {
                while self.evaluate(cond)?.is_truthy() {
                    match self.exec_stmt(body)? {
                        Signal::None => {}
                        ret => return Ok(ret),
                    }
                }
                Ok(Signal::None)
            }
            Stmt::Block(body) => {
                let env = Env::wrap(&self.env);
                self.run_with(body, env)
            }
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> RunResult<Value> {
        match expr {
            Expr::Literal(prim) => Ok(match prim {
                Primitive::Nil(_) => Value::Nil,
                Primitive::Bool(b, _) => Value::Bool(*b),
                Primitive::Num(n, _) => Value::Num(*n),
                Primitive::Str(s, _) => Value::Str(s.clone()),
            }),
            Expr::Logical(lhs, op, rhs) => {
                let left = self.evaluate(lhs)?;
                match op {
                    LogOp::Or(_) if left.is_truthy() => Ok(left),
                    LogOp::And(_) if !left.is_truthy() => Ok(left),
                    _ => self.evaluate(rhs),
                }
            }
            Expr::Binary(lhs, op, rhs) => {
                let left = self.evaluate(lhs)?;
                let right = self.evaluate(rhs)?;
                self.eval_binary(left, op, right)
            }
            Expr::Unary(op, rhs) => {
                let right = self.evaluate(rhs)?;
                match op {
                    UniOp::Neg(line) => match right {
                        Value::Num(n) => Ok(Value::Num(-n)),
                        _ => Err(RuntimeError::UniNonNumeric(*line)),
                    },
                    UniOp::Not(_) => Ok(Value::Bool(!right.is_truthy())),
                }
            }
            Expr::Call(line, callee, args) => {
                let callee = self.evaluate(callee)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.evaluate(arg)?);
                }

                let call = callee.as_call().ok_or(RuntimeError::NotCallable(*line))?;
                if call.arity() != evaluated.len() {
                    return Err(RuntimeError::ArityMismatch(
                        *line,
                        call.arity(),
                        evaluated.len(),
                    ));
                }
                call.call(self, evaluated)
            }
            Expr::Get(line, object, name) => match self.evaluate(object)? {
                Value::Instance(inst) => inst
                    .get(name)
                    .ok_or_else(|| RuntimeError::UndefinedProp(*line, name.to_owned())),
                _ => Err(RuntimeError::NotInstance(*line)),
            },
            Expr::Set(line, object, name, value) => match self.evaluate(object)? {
                Value::Instance(inst) => {
                    let value = self.evaluate(value)?;
                    inst.set(name.to_owned(), value.clone());
                    Ok(value)
                }
                _ => Err(RuntimeError::NoFields(*line)),
            },
            Expr::Assign(var, value) => {
                let value = self.evaluate(value)?;
                self.assign_var(var, value.clone())?;
                Ok(value)
            }
            Expr::Variable(var) | Expr::This(var) => self.lookup_var(var),
            Expr::Super(var, method_line, method) => self.eval_super(var, *method_line, method),
            Expr::Lambda(decl) => Ok(Value::Fun(LoxFunction::new(
                Rc::clone(decl),
                self.env.clone(),
                false,
            ))),
            Expr::Group(inner) => self.evaluate(inner),
        }
    }

    fn eval_binary(&mut self, left: Value, op: &BinOp, right: Value) -> RunResult<Value> {
        match op {
            BinOp::Add(line) => match (left, right) {
                (Value::Num(lhs), Value::Num(rhs)) => Ok(Value::Num(lhs + rhs)),
                (Value::Str(lhs), Value::Str(rhs)) => Ok(Value::Str(lhs + &rhs)),
                _ => Err(RuntimeError::AddUnsupported(*line)),
            },
            BinOp::Sub(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Num(lhs - rhs))
            }
            BinOp::Mul(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Num(lhs * rhs))
            }
            BinOp::Div(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Num(lhs / rhs))
            }
            BinOp::Lt(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Bool(lhs < rhs))
            }
            BinOp::LtEq(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Bool(lhs <= rhs))
            }
            BinOp::Gt(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Bool(lhs > rhs))
            }
            BinOp::GtEq(line) => {
                let (lhs, rhs) = num_operands(left, right, *line)?;
                Ok(Value::Bool(lhs >= rhs))
            }
            BinOp::EqEq(_) => Ok(Value::Bool(left == right)),
            BinOp::NotEq(_) => Ok(Value::Bool(left != right)),
        }
    }

    fn eval_super(&mut self, var: &Var, method_line: usize, method: &str) -> RunResult<Value> {
        let dist = self
            .hops
            .get(&var.id)
            .copied()
            .ok_or_else(|| RuntimeError::UndefinedVar(var.line, var.name.to_owned()))?;

        let superclass = match self.env.get_at(dist, "super") {
            Some(Value::Class(class)) => class,
            _ => return Err(RuntimeError::UndefinedVar(var.line, String::from("super"))),
        };
        // The receiver scope sits one hop inside the `super` scope.
        let object = match self.env.get_at(dist - 1, "this") {
            Some(Value::Instance(inst)) => inst,
            _ => return Err(RuntimeError::UndefinedVar(var.line, String::from("this"))),
        };

        let method = superclass
            .find_method(method)
            .ok_or_else(|| RuntimeError::UndefinedProp(method_line, method.to_owned()))?;
        Ok(Value::Fun(method.bind(object)))
    }

    fn lookup_var(&self, var: &Var) -> RunResult<Value> {
        let found = match self.hops.get(&var.id) {
            Some(&dist) => self.env.get_at(dist, &var.name),
            None => self.globals.get(&var.name),
        };
        found.ok_or_else(|| RuntimeError::UndefinedVar(var.line, var.name.to_owned()))
    }

    fn assign_var(&mut self, var: &Var, value: Value) -> RunResult<()> {
        let ok = match self.hops.get(&var.id) {
            Some(&dist) => self.env.assign_at(dist, &var.name, value),
            None => self.globals.assign(&var.name, value),
        };
        if ok {
            Ok(())
        } else {
            Err(RuntimeError::UndefinedVar(var.line, var.name.to_owned()))
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn num_operands(left: Value, right: Value, line: usize) -> RunResult<(f64, f64)> {
    match (left, right) {
        (Value::Num(lhs), Value::Num(rhs)) => Ok((lhs, rhs)),
        _ => Err(RuntimeError::BinNonNumeric(line)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::resolver::Resolver;

    fn run(src: &str) -> Result<Vec<String>, RuntimeError> {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Interpreter::with_sink(PrintSink::Buffer(Rc::clone(&buffer)));

        let lexed = Lexer::new(src).scan();
        assert!(lexed.errors.is_empty(), "{:?}", lexed.errors);
        let parsed = Parser::new(lexed.spans).parse();
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let resolved = Resolver::new()
            .resolve(parsed.decls)
            .expect("program should resolve");

        rt.interpret(resolved)?;
        let lines = buffer.borrow().clone();
        Ok(lines)
    }

    fn run_ok(src: &str) -> Vec<String> {
        run(src).expect("program should run")
    }

    fn run_err(src: &str) -> RuntimeError {
        run(src).expect_err("program should fault")
    }

    #[test]
    fn arithmetic_and_number_formatting() {
        let lines = run_ok("print 2 + 2; print 2.5 + 0.25; print 7 / 2; print -3;");
        assert_eq!(vec!["4", "2.75", "3.5", "-3"], lines);
    }

    #[test]
    fn string_concatenation() {
        let lines = run_ok(r#"print "foo" + "bar";"#);
        assert_eq!(vec!["foobar"], lines);
    }

    #[test]
    fn add_faults_when_only_one_operand_is_a_string() {
        assert!(matches!(
            run_err(r#"print 1 + "a";"#),
            RuntimeError::AddUnsupported(1)
        ));
        assert!(matches!(
            run_err(r#"print "a" + 1;"#),
            RuntimeError::AddUnsupported(1)
        ));
    }

    #[test]
    fn comparison_requires_numbers() {
        assert!(matches!(
            run_err(r#"print 1 < "a";"#),
            RuntimeError::BinNonNumeric(1)
        ));
    }

    #[test]
    fn negation_requires_a_number() {
        assert!(matches!(
            run_err(r#"print -"a";"#),
            RuntimeError::UniNonNumeric(1)
        ));
    }

    #[test]
    fn equality_has_no_coercion() {
        let lines = run_ok(
            "print nil == nil;\
             print nil == false;\
             print 1 == 1;\
             print 1 == \"1\";\
             print \"a\" != \"b\";",
        );
        assert_eq!(vec!["true", "false", "true", "false", "true"], lines);
    }

    #[test]
    fn zero_and_empty_string_are_truthy() {
        let lines = run_ok(
            "if (0) print \"zero\";\
             if (\"\") print \"empty\";\
             if (nil) print \"nil\";\
             if (false) print \"false\";",
        );
        assert_eq!(vec!["zero", "empty"], lines);
    }

    #[test]
    fn logical_operators_yield_operand_values() {
        let lines = run_ok("print 1 or 2; print nil or \"x\"; print nil and 1; print 1 and 2;");
        assert_eq!(vec!["1", "x", "nil", "2"], lines);
    }

    #[test]
    fn shadowing_block_scenario() {
        let lines = run_ok("var a = 1; { var a = a + 1; print a; } print a;");
        assert_eq!(vec!["2", "1"], lines);
    }

    #[test]
    fn block_environment_is_restored_after_exit() {
        let lines = run_ok("var a = \"outer\"; { var a = \"inner\"; } print a;");
        assert_eq!(vec!["outer"], lines);
    }

    #[test]
    fn closures_persist_state_across_calls() {
        let lines = run_ok(
            "fun make_counter() {\
               var count = 0;\
               fun next() { count = count + 1; return count; }\
               return next;\
             }\
             var counter = make_counter();\
             print counter();\
             print counter();",
        );
        assert_eq!(vec!["1", "2"], lines);
    }

    #[test]
    fn closures_capture_their_defining_scope_not_the_call_site() {
        let lines = run_ok(
            "var tag = \"global\";\
             fun show() { print tag; }\
             fun shadow() { var tag = \"local\"; show(); }\
             shadow();",
        );
        assert_eq!(vec!["global"], lines);
    }

    #[test]
    fn lambda_captures_like_a_named_function() {
        let lines = run_ok(
            "var add;\
             { var n = 10; add = fun (x) { return n + x; }; }\
             print add(5);",
        );
        assert_eq!(vec!["15"], lines);
    }

    #[test]
    fn recursion_resolves_through_the_global_scope() {
        let lines = run_ok(
            "fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); }\
             print fib(10);",
        );
        assert_eq!(vec!["55"], lines);
    }

    #[test]
    fn return_unwinds_through_nested_blocks_and_loops() {
        let lines = run_ok("fun f() { while (true) { return 7; } } print f();");
        assert_eq!(vec!["7"], lines);
    }

    #[test]
    fn for_loop_desugars_and_scopes_its_variable() {
        let lines = run_ok(
            "var sum = 0;\
             for (var i = 1; i <= 3; i = i + 1) sum = sum + i;\
             print sum;",
        );
        assert_eq!(vec!["6"], lines);
    }

    #[test]
    fn for_loop_variable_is_not_visible_after_the_loop() {
        let err = run_err("for (var i = 0; i < 1; i = i + 1) {} print i;");
        assert!(matches!(err, RuntimeError::UndefinedVar(1, name) if name == "i"));
    }

    #[test]
    fn arity_mismatch_reports_expected_and_actual() {
        let err = run_err("fun f(a) { return a; } f(1, 2);");
        assert!(matches!(err, RuntimeError::ArityMismatch(1, 1, 2)));
        assert_eq!(
            "[line 1] runtime error: Expected 1 argument(s) but got 2.",
            err.to_string()
        );
    }

    #[test]
    fn calling_a_non_callable_faults() {
        let err = run_err("var x = 1; x();");
        assert!(matches!(err, RuntimeError::NotCallable(1)));
    }

    #[test]
    fn reading_an_undefined_variable_faults() {
        let err = run_err("print missing;");
        assert!(matches!(err, RuntimeError::UndefinedVar(1, name) if name == "missing"));
    }

    #[test]
    fn assigning_an_undeclared_variable_faults() {
        let err = run_err("missing = 1;");
        assert!(matches!(err, RuntimeError::UndefinedVar(1, name) if name == "missing"));
    }

    #[test]
    fn class_call_returns_an_instance() {
        let lines = run_ok("class A {} print A(); print A;");
        assert_eq!(vec!["A instance", "A"], lines);
    }

    #[test]
    fn constructor_stores_fields_on_the_instance() {
        let lines = run_ok(
            "class Point { init(x, y) { this.x = x; this.y = y; } }\
             var p = Point(1, 2);\
             print p.x + p.y;",
        );
        assert_eq!(vec!["3"], lines);
    }

    #[test]
    fn class_call_yields_the_instance_despite_early_return_in_init() {
        let lines = run_ok("class A { init() { return; } } print A();");
        assert_eq!(vec!["A instance"], lines);
    }

    #[test]
    fn direct_initializer_call_yields_the_receiver_on_implicit_completion() {
        let lines = run_ok(
            "class A { init() { this.v = 1; } }\
             var a = A();\
             print a == a.init();",
        );
        assert_eq!(vec!["true"], lines);
    }

    #[test]
    fn property_reads_check_fields_before_methods() {
        let lines = run_ok(
            "class A { m() { return 1; } }\
             var a = A();\
             print a.m();\
             a.m = fun () { return 2; };\
             print a.m();",
        );
        assert_eq!(vec!["1", "2"], lines);
    }

    #[test]
    fn property_writes_stay_on_the_instance() {
        let lines = run_ok(
            "class A {}\
             var a = A();\
             var b = A();\
             a.v = 1;\
             print a.v;\
             print b == a;",
        );
        assert_eq!(vec!["1", "false"], lines);
    }

    #[test]
    fn undefined_property_faults() {
        let err = run_err("class A {} print A().missing;");
        assert!(matches!(err, RuntimeError::UndefinedProp(1, name) if name == "missing"));
    }

    #[test]
    fn property_access_on_non_instance_faults() {
        assert!(matches!(
            run_err("print (1).x;"),
            RuntimeError::NotInstance(1)
        ));
        assert!(matches!(
            run_err("var a = 1; a.x = 2;"),
            RuntimeError::NoFields(1)
        ));
    }

    #[test]
    fn superclass_must_be_a_class() {
        let err = run_err("var NotAClass = 1; class A < NotAClass {}");
        assert!(matches!(err, RuntimeError::NotSuperclass(1)));
    }

    #[test]
    fn bound_method_keeps_its_receiver() {
        let lines = run_ok(
            "class A { init() { this.v = 5; } get() { return this.v; } }\
             var m = A().get;\
             print m();",
        );
        assert_eq!(vec!["5"], lines);
    }

    #[test]
    fn methods_dispatch_through_the_superclass_chain() {
        let lines = run_ok(
            "class A { m() { return \"A\"; } }\
             class B < A {}\
             print B().m();",
        );
        assert_eq!(vec!["A"], lines);
    }

    #[test]
    fn super_dispatch_scenario() {
        let lines = run_ok(
            "class A { init(v) { this.v = v; } get() { return this.v; } }\
             class B < A { get() { return super.get() + 1; } }\
             print B(5).get();",
        );
        assert_eq!(vec!["6"], lines);
    }

    #[test]
    fn super_method_runs_with_the_subclass_receiver() {
        let lines = run_ok(
            "class A { who() { return this.name; } m() { return this.who(); } }\
             class B < A { m() { return super.m(); } }\
             var b = B();\
             b.name = \"b\";\
             print b.m();",
        );
        assert_eq!(vec!["b"], lines);
    }

    #[test]
    fn super_skips_the_dynamic_class_override() {
        let lines = run_ok(
            "class A { m() { return \"A\"; } }\
             class B < A { m() { return super.m() + \"B\"; } }\
             class C < B { m() { return super.m() + \"C\"; } }\
             print C().m();",
        );
        assert_eq!(vec!["ABC"], lines);
    }

    #[test]
    fn class_body_may_reference_its_own_class_name() {
        let lines = run_ok("class A { make() { return A(); } } print A().make();");
        assert_eq!(vec!["A instance"], lines);
    }

    #[test]
    fn functions_and_natives_stringify() {
        let lines = run_ok("fun f() {} print f; print clock; var g = fun () {}; print g;");
        assert_eq!(vec!["<fn f>", "<native fn>", "<fn>"], lines);
    }

    #[test]
    fn native_clock_returns_a_number() {
        let lines = run_ok("print clock() >= 0;");
        assert_eq!(vec!["true"], lines);
    }

    #[test]
    fn repl_programs_share_globals_and_ids() {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Interpreter::with_sink(PrintSink::Buffer(Rc::clone(&buffer)));
        let mut next_id = 0;

        for src in ["var a = 1;", "fun f() { return a; }", "print f() + a;"] {
            let lexed = Lexer::new(src).scan();
            assert!(lexed.errors.is_empty());
            let parsed = Parser::with_next_id(lexed.spans, next_id).parse();
            assert!(parsed.errors.is_empty());
            next_id = parsed.next_id;
            let resolved = Resolver::new()
                .resolve(parsed.decls)
                .expect("line should resolve");
            rt.interpret(resolved).expect("line should run");
        }

        assert_eq!(vec!["2"], *buffer.borrow());
    }
}

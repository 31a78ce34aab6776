use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::ast::{BinOp, LogOp, UniOp};
use crate::ast::{Body, Decl, Expr, FunDecl, Param, Primitive, Stmt, Var};
use crate::ast::{Span, Token};
use crate::ParsedProgram;

/// A syntax error. The parser records it and re-synchronizes at the next
/// statement boundary, so one bad statement does not hide the rest.
#[derive(Debug, Error)]
pub enum ParseError {
    /// (line, what, found)
    #[error("[line {0}] parse error: expected {1}, found '{2}'")]
    Expected(usize, &'static str, Token),
    /// (line)
    #[error("[line {0}] parse error: invalid assignment target")]
    InvalidAssignTarget(usize),
}

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    spans: Vec<Span>,
    idx: usize,
    next_id: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(spans: Vec<Span>) -> Self {
        Self::with_next_id(spans, 0)
    }

    /// Continue numbering reference nodes from `next_id`. The REPL threads
    /// this across lines so ids stay unique per interpreter session.
    pub fn with_next_id(spans: Vec<Span>, next_id: usize) -> Self {
        Self {
            spans,
            idx: 0,
            next_id,
            errors: Vec::new(),
        }
    }

    pub fn parse(mut self) -> ParsedProgram {
        let mut decls = Vec::new();

        while !self.is_at_end() {
            if let Some(decl) = self.declaration() {
                decls.push(decl);
            }
        }

        debug!("parsed {} declarations, {} errors", decls.len(), self.errors.len());
        ParsedProgram {
            decls,
            errors: self.errors,
            next_id: self.next_id,
        }
    }

    fn is_at_end(&self) -> bool {
        self.idx >= self.spans.len() || self.spans[self.idx].token == Token::Eof
    }

    fn peek(&self) -> &Span {
        &self.spans[self.idx]
    }

    fn peek_line(&self) -> usize {
        self.spans[self.idx].line
    }

    fn advance(&mut self) -> Span {
        let curr = self.spans[self.idx].clone();
        if !self.is_at_end() {
            self.idx += 1;
        }
        curr
    }

    fn check(&self, token: &Token) -> bool {
        !self.is_at_end() && self.peek().token == *token
    }

    fn check_next_ident(&self) -> bool {
        self.idx + 1 < self.spans.len()
            && matches!(self.spans[self.idx + 1].token, Token::Ident(_))
    }

    fn matches(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    /// Require `token` next or fail with a description of what was wanted.
    fn expect(&mut self, token: &Token, what: &'static str) -> ParseResult<usize> {
        if self.check(token) {
            let line = self.peek_line();
            self.idx += 1;
            Ok(line)
        } else {
            let span = self.peek();
            Err(ParseError::Expected(span.line, what, span.token.clone()))
        }
    }

    fn expect_ident(&mut self, what: &'static str) -> ParseResult<(String, usize)> {
        let span = self.peek();
        match &span.token {
            Token::Ident(name) => {
                let out = (name.clone(), span.line);
                self.idx += 1;
                Ok(out)
            }
            other => Err(ParseError::Expected(span.line, what, other.clone())),
        }
    }

    fn make_var(&mut self, name: String, line: usize) -> Var {
        let id = self.next_id;
        self.next_id += 1;
        Var::new(id, name, line)
    }

    /// Skip forward to the most likely start of the next statement.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.advance().token == Token::Semi {
                return;
            }
            match self.peek().token {
                Token::Class
                | Token::Fun
                | Token::Var
                | Token::For
                | Token::If
                | Token::While
                | Token::Print
                | Token::Ret => return,
                _ => {}
            }
        }
    }

    fn declaration(&mut self) -> Option<Decl> {
        // `fun` not followed by a name is a lambda expression, left for
        // the statement path.
        let result = if self.matches(&Token::Class) {
            self.class_decl()
        } else if self.check(&Token::Fun) && self.check_next_ident() {
            self.idx += 1;
            self.function("function name").map(|f| Decl::Function(Rc::new(f)))
        } else if self.matches(&Token::Var) {
            self.var_decl()
        } else {
            self.statement().map(Decl::Statement)
        };

        match result {
            Ok(decl) => Some(decl),
            Err(err) => {
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }

    fn class_decl(&mut self) -> ParseResult<Decl> {
        let (name, line) = self.expect_ident("class name")?;

        let superclass = if self.matches(&Token::Lt) {
            let (parent, parent_line) = self.expect_ident("superclass name")?;
            Some(self.make_var(parent, parent_line))
        } else {
            None
        };

        self.expect(&Token::Lbrace, "'{' before class body")?;
        let mut methods = Vec::new();
        while !self.is_at_end() && !self.check(&Token::Rbrace) {
            methods.push(Rc::new(self.function("method name")?));
        }
        self.expect(&Token::Rbrace, "'}' after class body")?;

        Ok(Decl::Class(line, name, superclass, methods))
    }

    /// The shared tail of named functions and methods: name, parameter
    /// list, body.
    fn function(&mut self, what: &'static str) -> ParseResult<FunDecl> {
        let (name, line) = self.expect_ident(what)?;
        let params = self.parameters()?;
        self.expect(&Token::Lbrace, "'{' before function body")?;
        let body = self.block()?;
        Ok(FunDecl {
            name,
            params,
            body,
            line,
        })
    }

    fn parameters(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(&Token::Lparen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&Token::Rparen) {
            loop {
                let (name, line) = self.expect_ident("parameter name")?;
                params.push(Param { name, line });
                if !self.matches(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::Rparen, "')' after parameters")?;
        Ok(params)
    }

    fn var_decl(&mut self) -> ParseResult<Decl> {
        let (name, line) = self.expect_ident("variable name")?;
        let value = if self.matches(&Token::Eq) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(&Token::Semi, "';' after variable declaration")?;
        Ok(Decl::Var(line, name, value))
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.check(&Token::Print) {
            let line = self.advance().line;
            let expr = self.expression()?;
            self.expect(&Token::Semi, "';' after value")?;
            return Ok(Stmt::Print(line, expr));
        }

        if self.check(&Token::Ret) {
            let line = self.advance().line;
            let value = if self.check(&Token::Semi) {
                None
            } else {
                Some(self.expression()?)
            };
            self.expect(&Token::Semi, "';' after return value")?;
            return Ok(Stmt::Return(line, value));
        }

        if self.matches(&Token::If) {
            return self.if_statement();
        }
        if self.matches(&Token::While) {
            return self.while_statement();
        }
        if self.matches(&Token::For) {
            return self.for_statement();
        }
        if self.matches(&Token::Lbrace) {
            return Ok(Stmt::Block(self.block()?));
        }

        let expr = self.expression()?;
        self.expect(&Token::Semi, "';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(&Token::Lparen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(&Token::Rparen, "')' after condition")?;

        let then = Box::new(self.statement()?);
        let otherwise = if self.matches(&Token::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If(condition, then, otherwise))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(&Token::Lparen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(&Token::Rparen, "')' after condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While(condition, body))
    }

    /// `for` never reaches the evaluator; it desugars into the equivalent
    /// block/while statements right here.
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.expect(&Token::Lparen, "'(' after 'for'")?;

        let init = if self.matches(&Token::Semi) {
            None
        } else if self.matches(&Token::Var) {
            Some(self.var_decl()?)
        } else {
            let expr = self.expression()?;
            self.expect(&Token::Semi, "';' after loop initializer")?;
            Some(Decl::Statement(Stmt::Expression(expr)))
        };

        let condition = if self.check(&Token::Semi) {
            Expr::Literal(Primitive::Bool(true, line))
        } else {
            self.expression()?
        };
        self.expect(&Token::Semi, "';' after loop condition")?;

        let post = if self.check(&Token::Rparen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::Rparen, "')' after for clauses")?;

        let mut body = self.statement()?;
        if let Some(post) = post {
            body = Stmt::Block(vec![
                Decl::Statement(body),
                Decl::Statement(Stmt::Expression(post)),
            ]);
        }

        let along = Stmt::While(condition, Box::new(body));
        Ok(match init {
            Some(init) => Stmt::Block(vec![init, Decl::Statement(along)]),
            None => along,
        })
    }

    fn block(&mut self) -> ParseResult<Body> {
        let mut body = Vec::new();
        while !self.is_at_end() && !self.check(&Token::Rbrace) {
            if let Some(decl) = self.declaration() {
                body.push(decl);
            }
        }
        self.expect(&Token::Rbrace, "'}' after block")?;
        Ok(body)
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logical_or()?;

        if self.check(&Token::Eq) {
            let line = self.advance().line;
            let value = Box::new(self.assignment()?);
            return match expr {
                Expr::Variable(var) => Ok(Expr::Assign(var, value)),
                Expr::Get(line, object, name) => Ok(Expr::Set(line, object, name, value)),
                _ => Err(ParseError::InvalidAssignTarget(line)),
            };
        }

        Ok(expr)
    }

    fn consume_or_op(&mut self) -> Option<LogOp> {
        if self.check(&Token::Or) {
            Some(LogOp::Or(self.advance().line))
        } else {
            None
        }
    }

    fn consume_and_op(&mut self) -> Option<LogOp> {
        if self.check(&Token::And) {
            Some(LogOp::And(self.advance().line))
        } else {
            None
        }
    }

    fn consume_equality_op(&mut self) -> Option<BinOp> {
        if self.is_at_end() {
            return None;
        }
        let curr = self.peek();
        let op = match curr.token {
            Token::EqEq => BinOp::EqEq(curr.line),
            Token::BangEq => BinOp::NotEq(curr.line),
            _ => return None,
        };
        self.idx += 1;
        Some(op)
    }

    fn consume_compare_op(&mut self) -> Option<BinOp> {
        if self.is_at_end() {
            return None;
        }
        let curr = self.peek();
        let op = match curr.token {
            Token::Lt => BinOp::Lt(curr.line),
            Token::LtEq => BinOp::LtEq(curr.line),
            Token::Gt => BinOp::Gt(curr.line),
            Token::GtEq => BinOp::GtEq(curr.line),
            _ => return None,
        };
        self.idx += 1;
        Some(op)
    }

    fn consume_additive_op(&mut self) -> Option<BinOp> {
        if self.is_at_end() {
            return None;
        }
        let curr = self.peek();
        let op = match curr.token {
            Token::Plus => BinOp::Add(curr.line),
            Token::Minus => BinOp::Sub(curr.line),
            _ => return None,
        };
        self.idx += 1;
        Some(op)
    }

    fn consume_multiplicative_op(&mut self) -> Option<BinOp> {
        if self.is_at_end() {
            return None;
        }
        let curr = self.peek();
        let op = match curr.token {
            Token::Star => BinOp::Mul(curr.line),
            Token::Slash => BinOp::Div(curr.line),
            _ => return None,
        };
        self.idx += 1;
        Some(op)
    }

    fn consume_unary_op(&mut self) -> Option<UniOp> {
        if self.is_at_end() {
            return None;
        }
        let curr = self.peek();
        let op = match curr.token {
            Token::Minus => UniOp::Neg(curr.line),
            Token::Bang => UniOp::Not(curr.line),
            _ => return None,
        };
        self.idx += 1;
        Some(op)
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.logical_and()?;
        while let Some(op) = self.consume_or_op() {
            let rhs = self.logical_and()?;
            expr = Expr::Logical(Box::new(expr), op, Box::new(rhs));
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while let Some(op) = self.consume_and_op() {
            let rhs = self.equality()?;
            expr = Expr::Logical(Box::new(expr), op, Box::new(rhs));
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        while let Some(op) = self.consume_equality_op() {
            let rhs = self.comparison()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(rhs));
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.addition()?;
        while let Some(op) = self.consume_compare_op() {
            let rhs = self.addition()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(rhs));
        }
        Ok(expr)
    }

    fn addition(&mut self) -> ParseResult<Expr> {
        let mut expr = self.multiply()?;
        while let Some(op) = self.consume_additive_op() {
            let rhs = self.multiply()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(rhs));
        }
        Ok(expr)
    }

    fn multiply(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        while let Some(op) = self.consume_multiplicative_op() {
            let rhs = self.unary()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(rhs));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if let Some(op) = self.consume_unary_op() {
            let rhs = self.unary()?;
            return Ok(Expr::Unary(op, Box::new(rhs)));
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.check(&Token::Lparen) {
                let line = self.advance().line;
                let args = self.arguments()?;
                expr = Expr::Call(line, Box::new(expr), args);
            } else if self.matches(&Token::Dot) {
                let (name, line) = self.expect_ident("property name after '.'")?;
                expr = Expr::Get(line, Box::new(expr), name);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&Token::Rparen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::Rparen, "')' after arguments")?;
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let curr = self.advance();

        let expr = match curr.token {
            Token::Nil => Expr::Literal(Primitive::Nil(curr.line)),
            Token::True => Expr::Literal(Primitive::Bool(true, curr.line)),
            Token::False => Expr::Literal(Primitive::Bool(false, curr.line)),
            Token::Num(n) => Expr::Literal(Primitive::Num(n, curr.line)),
            Token::Str(s) => Expr::Literal(Primitive::Str(s, curr.line)),
            Token::Ident(name) => Expr::Variable(self.make_var(name, curr.line)),
            Token::This => Expr::This(self.make_var(String::from("this"), curr.line)),
            Token::Super => {
                self.expect(&Token::Dot, "'.' after 'super'")?;
                let (method, method_line) = self.expect_ident("superclass method name")?;
                let var = self.make_var(String::from("super"), curr.line);
                Expr::Super(var, method_line, method)
            }
            Token::Fun => {
                let params = self.parameters()?;
                self.expect(&Token::Lbrace, "'{' before function body")?;
                let body = self.block()?;
                Expr::Lambda(Rc::new(FunDecl {
                    name: String::new(),
                    params,
                    body,
                    line: curr.line,
                }))
            }
            Token::Lparen => {
                let inner = self.expression()?;
                self.expect(&Token::Rparen, "')' after expression")?;
                Expr::Group(Box::new(inner))
            }
            other => return Err(ParseError::Expected(curr.line, "expression", other)),
        };

        Ok(expr)
    }
}

//! Recursive-descent parser
//!
//! ```text
//! program := stmt (SEP stmt)*
//! stmt    := IDENT '=' expr | expr
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '//' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := postfix ('**' unary)?
//! postfix := primary ('[' expr ']')*
//! primary := NUMBER | STRING | IDENT | IDENT '(' args ')' | '(' expr ')' | '[' args ']'
//! ```

use super::lexer::{Spanned, Token};
use super::SandboxError;

/// Tokens accepted in one program
const MAX_TOKENS: usize = 4096;
/// Nested sub-expressions (parentheses, calls, unary operators)
const MAX_NESTING: usize = 64;
/// Expression nodes in one program; bounds the depth of any tree
const MAX_NODES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Number(f64),
    Text(String),
    Name(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Stmt {
    Assign(String, Expr),
    Expr(Expr),
}

pub(super) fn parse(tokens: &[Spanned]) -> Result<Vec<Stmt>, SandboxError> {
    if tokens.len() > MAX_TOKENS {
        return Err(SandboxError::TooComplex {
            limit: "token",
            max: MAX_TOKENS,
        });
    }
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        nodes: 0,
    }
    .program()
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|s| &s.token);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SandboxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> SandboxError {
        match self.tokens.get(self.pos) {
            Some(spanned) => SandboxError::UnexpectedToken {
                found: spanned.token.describe(),
                pos: spanned.pos,
            },
            None => SandboxError::UnexpectedEnd,
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        if self.depth == MAX_NESTING {
            return Err(SandboxError::TooComplex {
                limit: "nesting",
                max: MAX_NESTING,
            });
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn node(&mut self, expr: Expr) -> Result<Expr, SandboxError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(SandboxError::TooComplex {
                limit: "expression size",
                max: MAX_NODES,
            });
        }
        Ok(expr)
    }

    fn program(mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&Token::Separator) {}
            if self.peek().is_none() {
                return Ok(statements);
            }
            statements.push(self.statement()?);
            if self.peek().is_some() {
                self.expect(&Token::Separator)?;
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, SandboxError> {
        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            return Ok(Stmt::Assign(name, self.expr()?));
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, SandboxError> {
        self.nested(Self::sum)
    }

    fn sum(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn term(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::SlashSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn unary(&mut self) -> Result<Expr, SandboxError> {
        self.nested(Self::signed)
    }

    fn signed(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            return self.node(Expr::Neg(Box::new(inner)));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, SandboxError> {
        let base = self.postfix()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.unary()?;
            return self.node(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.primary()?;
        while self.eat(&Token::LBracket) {
            let index = self.expr()?;
            self.expect(&Token::RBracket)?;
            expr = self.node(Expr::Index(Box::new(expr), Box::new(index)))?;
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, SandboxError> {
        let Some(token) = self.advance().cloned() else {
            return Err(SandboxError::UnexpectedEnd);
        };
        match token {
            Token::Number(n) => self.node(Expr::Number(n)),
            Token::Text(s) => self.node(Expr::Text(s)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments(&Token::RParen)?;
                    self.node(Expr::Call(name, args))
                } else {
                    self.node(Expr::Name(name))
                }
            }
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let items = self.arguments(&Token::RBracket)?;
                self.node(Expr::List(items))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed
    fn arguments(&mut self, close: &Token) -> Result<Vec<Expr>, SandboxError> {
        let mut args = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(args);
            }
            args.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                return Ok(args);
            }
        }
    }
}

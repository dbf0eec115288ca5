//! Parser for the nodus dialect
//!
//! Produces the `Program` AST that loaders compile, the bytecache persists
//! (via serde/bincode) and the interpreter executes.

use crate::engine::lexer::{lex, Tok, Token};
use crate::error::ExecError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assign {
        target: Target,
        value: Expr,
        line: u32,
    },
    Expr {
        expr: Expr,
        line: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    Member(Expr, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Name(String),
    Member(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
    Object(Vec<(String, Expr)>),
    List(Vec<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

pub fn parse(source: &str) -> Result<Program, ExecError> {
    let tokens = lex(source)?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Tok) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Tok, what: &str) -> Result<(), ExecError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ExecError::script(format!("expected {}", what), self.line()))
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Tok::Newline) | Some(Tok::Semi)) {
            self.pos += 1;
        }
    }

    fn program(&mut self) -> Result<Program, ExecError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.peek().is_none() {
                break;
            }
            stmts.push(self.statement()?);
            match self.peek() {
                None => break,
                Some(Tok::Newline) | Some(Tok::Semi) => {}
                Some(_) => {
                    return Err(ExecError::script(
                        "expected end of statement",
                        self.line(),
                    ))
                }
            }
        }
        Ok(Program { stmts })
    }

    fn statement(&mut self) -> Result<Stmt, ExecError> {
        let line = self.line();
        let expr = self.expression()?;
        if self.eat(&Tok::Assign) {
            let target = match expr {
                Expr::Name(name) => Target::Name(name),
                Expr::Member(obj, name) => Target::Member(*obj, name),
                _ => {
                    return Err(ExecError::script(
                        "cannot assign to this expression",
                        line,
                    ))
                }
            };
            let value = self.expression()?;
            Ok(Stmt::Assign {
                target,
                value,
                line,
            })
        } else {
            Ok(Stmt::Expr { expr, line })
        }
    }

    fn expression(&mut self) -> Result<Expr, ExecError> {
        let left = self.postfix()?;
        match self.peek() {
            Some(Tok::EqEq) => {
                self.pos += 1;
                let right = self.postfix()?;
                Ok(Expr::Eq(Box::new(left), Box::new(right)))
            }
            Some(Tok::NotEq) => {
                self.pos += 1;
                let right = self.postfix()?;
                Ok(Expr::Ne(Box::new(left), Box::new(right)))
            }
            _ => Ok(left),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ExecError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                let name = match self.next() {
                    Some(Tok::Ident(name)) => name,
                    _ => {
                        return Err(ExecError::script(
                            "expected attribute name after '.'",
                            self.line(),
                        ))
                    }
                };
                expr = Expr::Member(Box::new(expr), name);
            } else if self.peek() == Some(&Tok::LParen) {
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() != Some(&Tok::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                        if self.peek() == Some(&Tok::RParen) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RParen, "')'")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ExecError> {
        let line = self.line();
        match self.next() {
            Some(Tok::Null) => Ok(Expr::Null),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::Num(n)) => Ok(Expr::Num(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Ident(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                let inner = self.expression()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::LBrace) => {
                let mut pairs = Vec::new();
                if self.peek() != Some(&Tok::RBrace) {
                    loop {
                        let key = match self.next() {
                            Some(Tok::Ident(name)) => name,
                            Some(Tok::Str(s)) => s,
                            _ => {
                                return Err(ExecError::script(
                                    "expected object key",
                                    self.line(),
                                ))
                            }
                        };
                        self.expect(Tok::Colon, "':'")?;
                        pairs.push((key, self.expression()?));
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                        if self.peek() == Some(&Tok::RBrace) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBrace, "'}'")?;
                Ok(Expr::Object(pairs))
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Tok::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                        if self.peek() == Some(&Tok::RBracket) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            _ => Err(ExecError::script("expected expression", line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let p = parse("x = 1").unwrap();
        assert_eq!(p.stmts.len(), 1);
        assert!(matches!(
            &p.stmts[0],
            Stmt::Assign {
                target: Target::Name(n),
                value: Expr::Num(v),
                ..
            } if n == "x" && *v == 1.0
        ));
    }

    #[test]
    fn test_parse_member_assignment() {
        let p = parse("exports.x = 1").unwrap();
        assert!(matches!(
            &p.stmts[0],
            Stmt::Assign {
                target: Target::Member(Expr::Name(obj), attr),
                ..
            } if obj == "exports" && attr == "x"
        ));
    }

    #[test]
    fn test_parse_require_call() {
        let p = parse("b = require('./b')").unwrap();
        match &p.stmts[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Call(callee, args) => {
                    assert_eq!(**callee, Expr::Name("require".into()));
                    assert_eq!(args, &vec![Expr::Str("./b".into())]);
                }
                other => panic!("unexpected value {:?}", other),
            },
            other => panic!("unexpected stmt {:?}", other),
        }
    }

    #[test]
    fn test_parse_object_literal_multiline() {
        let p = parse("exports = {\n  x: 1,\n  name: 'demo',\n}").unwrap();
        match &p.stmts[0] {
            Stmt::Assign { value: Expr::Object(pairs), .. } => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].0, "x");
            }
            other => panic!("unexpected stmt {:?}", other),
        }
    }

    #[test]
    fn test_parse_chained_members_and_calls() {
        let p = parse("v = require.resolve('./b')").unwrap();
        match &p.stmts[0] {
            Stmt::Assign { value: Expr::Call(callee, _), .. } => {
                assert!(matches!(&**callee, Expr::Member(_, name) if name == "resolve"));
            }
            other => panic!("unexpected stmt {:?}", other),
        }
    }

    #[test]
    fn test_parse_equality() {
        let p = parse("assert(a.x == 1)").unwrap();
        assert_eq!(p.stmts.len(), 1);
    }

    #[test]
    fn test_semicolons_separate_statements() {
        let p = parse("a = 1; b = 2; assert(b == 2)").unwrap();
        assert_eq!(p.stmts.len(), 3);
    }

    #[test]
    fn test_statement_lines_survive() {
        let p = parse("a = 1\n\nassert(a)").unwrap();
        match &p.stmts[1] {
            Stmt::Expr { line, .. } => assert_eq!(*line, 3),
            other => panic!("unexpected stmt {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("1 = x").is_err());
        assert!(parse("x = ").is_err());
        assert!(parse("{a: }").is_err());
        assert!(parse("f(1,").is_err());
    }

    #[test]
    fn test_bincode_roundtrip() {
        let p = parse("exports = {x: 1}\nassert(exports.x == 1)").unwrap();
        let bytes = bincode::serialize(&p).unwrap();
        let back: Program = bincode::deserialize(&bytes).unwrap();
        assert_eq!(p, back);
    }
}

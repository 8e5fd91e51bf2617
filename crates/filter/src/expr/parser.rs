use super::lexer::{Spanned, Token, excerpt, tokenize};
use super::{CompareOp, Expr, Operand};
use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;
use regex::{Regex, RegexBuilder};

/// Recursive-descent parser. Precedence from loosest to tightest:
/// `OR`, `AND`, `NOT`, then a single predicate.
pub(super) struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    position: usize,
    case_sensitive: bool,
}

impl<'a> Parser<'a> {
    pub(super) fn new(input: &'a str, case_sensitive: bool) -> Result<Self> {
        Ok(Self { input, tokens: tokenize(input)?, position: 0, case_sensitive })
    }

    pub(super) fn parse(mut self) -> Result<Expr> {
        let expr = self.or()?;
        if self.position < self.tokens.len() {
            return Err(self.error_here("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|s| s.token.clone());
        self.position += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self, position: usize) -> usize {
        self.tokens.get(position).map(|s| s.span.start).unwrap_or(self.input.len())
    }

    fn error_at(&self, position: usize, reason: &str) -> Error {
        let reason = match self.tokens.get(position) {
            Some(_) => reason.to_string(),
            None => format!("{reason}: unexpected end of input"),
        };
        ErrorKind::Filter { clause: excerpt(self.input, self.offset(position)), reason }.into()
    }

    fn error_here(&self, reason: &str) -> Error {
        self.error_at(self.position, reason)
    }

    fn expect(&mut self, expected: Token, reason: &str) -> Result<()> {
        if self.eat(&expected) { Ok(()) } else { Err(self.error_here(reason)) }
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Expr> {
        if self.eat(&Token::LParen) {
            let inner = self.or()?;
            self.expect(Token::RParen, "expected `)`")?;
            return Ok(inner);
        }
        let start = self.position;
        let operand = self.operand()?;
        let negated = matches!(self.peek(), Some(Token::Not)) && matches!(self.peek_at(1), Some(Token::Like | Token::In));
        if negated {
            self.position += 1;
        }
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::NotEq) => CompareOp::NotEq,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::LtEq) => CompareOp::LtEq,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::GtEq) => CompareOp::GtEq,
            Some(Token::Like) => {
                self.position += 1;
                let pattern_at = self.position;
                let Some(Token::Str(pattern)) = self.advance() else {
                    return Err(self.error_at(pattern_at, "LIKE expects a quoted pattern"));
                };
                let regex = like_regex(&pattern, self.case_sensitive)
                    .map_err(|_| self.error_at(pattern_at, "invalid LIKE pattern"))?;
                return Ok(Expr::Like { operand, pattern: regex, negated });
            },
            Some(Token::In) => {
                self.position += 1;
                self.expect(Token::LParen, "IN expects a parenthesized list")?;
                let mut list = vec![self.operand()?];
                while self.eat(&Token::Comma) {
                    list.push(self.operand()?);
                }
                self.expect(Token::RParen, "expected `)` to close the IN list")?;
                return Ok(Expr::In { operand, list, negated });
            },
            Some(Token::Is) => {
                self.position += 1;
                let negated = self.eat(&Token::Not);
                self.expect(Token::Null, "IS expects NULL or NOT NULL")?;
                return Ok(Expr::IsNull { operand, negated });
            },
            _ => {
                // A bare operand is a boolean test, e.g. `[metadata.public]`.
                return match operand {
                    Operand::Field(_) | Operand::Literal(Value::Bool(_)) => Ok(Expr::Truthy(operand)),
                    Operand::Literal(_) => Err(self.error_at(start, "expected a comparison")),
                };
            },
        };
        self.position += 1;
        let right = self.operand()?;
        Ok(Expr::Compare { left: operand, op, right })
    }

    fn operand(&mut self) -> Result<Operand> {
        let at = self.position;
        let operand = match self.advance() {
            Some(Token::Ident(name)) => Operand::Field(name),
            Some(Token::Str(text)) => Operand::Literal(Value::String(text)),
            Some(Token::Integer(i)) => Operand::Literal(Value::Integer(i)),
            Some(Token::Float(f)) => Operand::Literal(Value::Float(f)),
            Some(Token::True) => Operand::Literal(Value::Bool(true)),
            Some(Token::False) => Operand::Literal(Value::Bool(false)),
            Some(Token::Null) => Operand::Literal(Value::Null),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Integer(i)) => Operand::Literal(Value::Integer(-i)),
                Some(Token::Float(f)) => Operand::Literal(Value::Float(-f)),
                _ => return Err(self.error_at(at, "expected a number after `-`")),
            },
            _ => return Err(self.error_at(at, "expected a field name or a value")),
        };
        Ok(operand)
    }
}

/// Translate a `LIKE` pattern into an anchored regex. `%` and `*` match any
/// run of characters, `_` and `?` match exactly one.
fn like_regex(pattern: &str, case_sensitive: bool) -> std::result::Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' | '*' => translated.push_str(".*"),
            '_' | '?' => translated.push('.'),
            c => translated.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    translated.push('$');
    RegexBuilder::new(&translated).case_insensitive(!case_sensitive).dot_matches_new_line(true).build()
}

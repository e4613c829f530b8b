//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons (chained),
//! postfix (`[..]`, `.method(..)`), primaries.

use super::ast::{CmpOp, Expr, Literal};
use super::lexer::{Spanned, Token, tokenize};
use crate::error::EvalError;

/// Nesting limit for brackets, calls and `not` chains.
pub const MAX_DEPTH: usize = 64;

pub(crate) fn parse(src: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {}", other.describe()))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        // tokenize always ends with Eof
        let last = self.tokens.len().saturating_sub(1);
        self.tokens
            .get((self.pos + ahead).min(last))
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |s| s.offset)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), EvalError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                token.describe(),
                self.peek().describe()
            )))
        }
    }

    fn error(&self, reason: String) -> EvalError {
        EvalError::Syntax {
            offset: self.offset(),
            reason,
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<Expr, EvalError> {
        self.nested(Self::or_expr)
    }

    fn or_expr(&mut self) -> Result<Expr, EvalError> {
        let first = self.and_expr()?;
        if self.peek() != &Token::Or {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Token::Or) {
            operands.push(self.and_expr()?);
        }
        Ok(Expr::Or(operands))
    }

    fn and_expr(&mut self) -> Result<Expr, EvalError> {
        let first = self.not_expr()?;
        if self.peek() != &Token::And {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Token::And) {
            operands.push(self.not_expr()?);
        }
        Ok(Expr::And(operands))
    }

    fn not_expr(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&Token::Not) {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.postfix()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.postfix()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                rest,
            })
        }
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match (self.peek(), self.peek_at(1)) {
            (Token::Not, Token::In) => {
                self.advance();
                CmpOp::NotIn
            }
            (Token::Is, Token::Not) => {
                self.advance();
                CmpOp::IsNot
            }
            (Token::EqEq, _) => CmpOp::Eq,
            (Token::NotEq, _) => CmpOp::Ne,
            (Token::Lt, _) => CmpOp::Lt,
            (Token::Le, _) => CmpOp::Le,
            (Token::Gt, _) => CmpOp::Gt,
            (Token::Ge, _) => CmpOp::Ge,
            (Token::In, _) => CmpOp::In,
            (Token::Is, _) => CmpOp::Is,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// Each `[..]` or `.name` link adds one level to the tree, so every
    /// link counts against [`MAX_DEPTH`] until the chain ends.
    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let entry_depth = self.depth;
        let result = self.postfix_chain();
        self.depth = entry_depth;
        result
    }

    fn postfix_chain(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek(), Token::LBracket | Token::Dot) {
                if self.depth >= MAX_DEPTH {
                    return Err(EvalError::TooDeep { limit: MAX_DEPTH });
                }
                self.depth += 1;
            }
            if self.eat(&Token::LBracket) {
                let key = self.expression()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    key: Box::new(key),
                };
            } else if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Token::Name(name) => name,
                    other => {
                        return Err(self.error(format!(
                            "expected attribute name, found {}",
                            other.describe()
                        )));
                    }
                };
                if self.eat(&Token::LParen) {
                    let args = self.sequence(&Token::RParen)?;
                    expr = Expr::Call {
                        target: Box::new(expr),
                        method: name,
                        args,
                    };
                } else {
                    expr = Expr::Attr {
                        target: Box::new(expr),
                        name,
                    };
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let offset = self.offset();
        match self.advance() {
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Num(n) => Ok(Expr::Literal(Literal::Num(n))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::None => Ok(Expr::Literal(Literal::None)),
            Token::Name(name) => Ok(Expr::Name(name)),
            Token::Minus => match self.advance() {
                Token::Num(n) => Ok(Expr::Literal(Literal::Num(-n))),
                other => Err(EvalError::Syntax {
                    offset,
                    reason: format!(
                        "unary '-' applies to numbers only, found {}",
                        other.describe()
                    ),
                }),
            },
            Token::LParen => self.parenthesized(),
            Token::LBracket => Ok(Expr::List(self.sequence(&Token::RBracket)?)),
            other => Err(EvalError::Syntax {
                offset,
                reason: format!("unexpected {}", other.describe()),
            }),
        }
    }

    /// `( expr )` groups; `()` and `( expr , ... )` build tuples.
    fn parenthesized(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&Token::RParen) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat(&Token::RParen) {
            return Ok(first);
        }
        self.expect(&Token::Comma)?;
        let mut items = vec![first];
        items.extend(self.sequence(&Token::RParen)?);
        Ok(Expr::List(items))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: &Token) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }
}

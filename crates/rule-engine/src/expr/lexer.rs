//! Tokenizer for rule expressions.

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Name(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Minus,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    In,
    Is,
    True,
    False,
    None,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        let symbol = match self {
            Self::Name(name) => return format!("name '{name}'"),
            Self::Str(_) => return "string literal".to_owned(),
            Self::Num(_) => return "number".to_owned(),
            Self::Eof => return "end of input".to_owned(),
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Minus => "-",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::In => "in",
            Self::Is => "is",
            Self::True => "True",
            Self::False => "False",
            Self::None => "None",
        };
        format!("'{symbol}'")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut lexer = Lexer {
        src,
        chars: src.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Spanned, EvalError> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some((offset, c)) = self.chars.next() else {
            return Ok(Spanned {
                token: Token::Eof,
                offset: self.src.len(),
            });
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '-' => Token::Minus,
            '=' => self.expect_eq(offset, Token::EqEq)?,
            '!' => self.expect_eq(offset, Token::NotEq)?,
            '<' => self.with_optional_eq(Token::Le, Token::Lt),
            '>' => self.with_optional_eq(Token::Ge, Token::Gt),
            '"' | '\'' => Token::Str(self.string(offset, c)?),
            c if c.is_ascii_digit() => Token::Num(self.number(offset)?),
            c if c.is_alphabetic() || c == '_' => self.word(offset),
            other => {
                return Err(EvalError::Syntax {
                    offset,
                    reason: format!("unexpected character '{other}'"),
                });
            }
        };
        Ok(Spanned { token, offset })
    }

    fn expect_eq(&mut self, offset: usize, token: Token) -> Result<Token, EvalError> {
        if self.chars.next_if(|(_, c)| *c == '=').is_some() {
            Ok(token)
        } else {
            Err(EvalError::Syntax {
                offset,
                reason: "expected '=' to form a comparison operator".to_owned(),
            })
        }
    }

    fn with_optional_eq(&mut self, with_eq: Token, without: Token) -> Token {
        if self.chars.next_if(|(_, c)| *c == '=').is_some() {
            with_eq
        } else {
            without
        }
    }

    fn string(&mut self, start: usize, quote: char) -> Result<String, EvalError> {
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(EvalError::Syntax {
                    offset: start,
                    reason: "unterminated string literal".to_owned(),
                });
            };
            match c {
                c if c == quote => return Ok(out),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, e @ ('\\' | '\'' | '"'))) => out.push(e),
                    // unknown escapes stay verbatim
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => {
                        return Err(EvalError::Syntax {
                            offset: start,
                            reason: "unterminated string literal".to_owned(),
                        });
                    }
                },
                c => out.push(c),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<f64, EvalError> {
        let mut end = start + 1;
        while let Some((i, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '_') {
            end = i + c.len_utf8();
        }
        // a fraction needs a digit after the dot, otherwise the dot is a method call
        let mut lookahead = self.chars.clone();
        if let (Some((_, '.')), Some((_, d))) = (lookahead.next(), lookahead.next()) {
            if d.is_ascii_digit() {
                self.chars.next();
                while let Some((i, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
                    end = i + c.len_utf8();
                }
            }
        }
        let text = self.src[start..end].replace('_', "");
        text.parse::<f64>().map_err(|e| EvalError::Syntax {
            offset: start,
            reason: format!("invalid number '{text}': {e}"),
        })
    }

    fn word(&mut self, start: usize) -> Token {
        let mut end = start + 1;
        while let Some((i, c)) = self
            .chars
            .next_if(|(_, c)| c.is_alphanumeric() || *c == '_')
        {
            end = i + c.len_utf8();
        }
        match &self.src[start..end] {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "is" => Token::Is,
            "True" | "true" => Token::True,
            "False" | "false" => Token::False,
            "None" | "null" => Token::None,
            name => Token::Name(name.to_owned()),
        }
    }
}

//! Token stream to datum.
//!
//! A recursive descent parser with one token of lookahead. Reader macros
//! expand during parsing: `'x` to `(quote x)`, `` `x `` to
//! `(quasiquote x)`, `,x` to `(unquote x)`, and `,@x` to
//! `(unquote-splicing x)`. Lists may carry a dotted tail; `#(...)` builds
//! a vector. Errors report the byte offset of the offending token.

use std::iter::Peekable;
use std::rc::Rc;

use crate::Error;
use crate::lexer::{Lexer, Token};
use crate::number::Number;
use crate::value::{Value, vec_to_improper_list, vec_to_list};

struct Parser<'a> {
    tokens: Peekable<Lexer<'a>>,
    len: usize,
}

/// Parse exactly one datum from the input; trailing tokens are an error.
pub fn parse(input: &str) -> Result<Value, Error> {
    let mut parser = Parser {
        tokens: Lexer::new(input).peekable(),
        len: input.len(),
    };
    let datum = parser.datum()?;
    match parser.next_token()? {
        None => Ok(datum),
        Some((pos, token)) => Err(Error::parse(
            pos,
            format!("unexpected trailing input {token:?}"),
        )),
    }
}

/// Parse every datum in the input, for program text holding several
/// top-level forms.
pub fn parse_all(input: &str) -> Result<Vec<Value>, Error> {
    let mut parser = Parser {
        tokens: Lexer::new(input).peekable(),
        len: input.len(),
    };
    let mut data = Vec::new();
    while parser.tokens.peek().is_some() {
        data.push(parser.datum()?);
    }
    Ok(data)
}

impl Parser<'_> {
    fn next_token(&mut self) -> Result<Option<(usize, Token)>, Error> {
        self.tokens.next().transpose()
    }

    fn datum(&mut self) -> Result<Value, Error> {
        match self.next_token()? {
            None => Err(Error::parse(self.len, "unexpected end of input")),
            Some((pos, token)) => self.datum_from(pos, token),
        }
    }

    fn datum_from(&mut self, pos: usize, token: Token) -> Result<Value, Error> {
        match token {
            Token::LParen => self.list_tail(pos),
            Token::LVec => self.vector_tail(pos),
            Token::Quote => self.reader_macro("quote"),
            Token::Backtick => self.reader_macro("quasiquote"),
            Token::Comma => self.reader_macro("unquote"),
            Token::CommaAt => self.reader_macro("unquote-splicing"),
            Token::Num(text) => Number::parse(&text)
                .map(Value::Number)
                .ok_or_else(|| Error::parse(pos, format!("number out of range: {text}"))),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Boolean(b) => Ok(Value::Bool(b)),
            Token::Character(c) => Ok(Value::Char(c)),
            Token::Ident(name) => Ok(Value::Symbol(name)),
            // keywords are ordinary symbols at the datum level
            Token::Lambda => Ok(Value::Symbol("lambda".into())),
            Token::If => Ok(Value::Symbol("if".into())),
            Token::Define => Ok(Value::Symbol("define".into())),
            Token::RParen => Err(Error::parse(pos, "unexpected )")),
            Token::Dot => Err(Error::parse(pos, "unexpected .")),
        }
    }

    /// Everything after a `(`: elements, an optional `. tail`, then `)`.
    fn list_tail(&mut self, open_pos: usize) -> Result<Value, Error> {
        let mut elements = Vec::new();
        loop {
            match self.next_token()? {
                None => return Err(Error::parse(open_pos, "unclosed (")),
                Some((_, Token::RParen)) => return Ok(vec_to_list(elements)),
                Some((pos, Token::Dot)) => {
                    if elements.is_empty() {
                        return Err(Error::parse(pos, "unexpected ."));
                    }
                    elements.push(self.datum()?);
                    return match self.next_token()? {
                        Some((_, Token::RParen)) => Ok(vec_to_improper_list(elements)),
                        Some((pos, token)) => {
                            Err(Error::parse(pos, format!("expected ) after dotted tail, got {token:?}")))
                        }
                        None => Err(Error::parse(open_pos, "unclosed (")),
                    };
                }
                Some((pos, token)) => elements.push(self.datum_from(pos, token)?),
            }
        }
    }

    fn vector_tail(&mut self, open_pos: usize) -> Result<Value, Error> {
        let mut elements = Vec::new();
        loop {
            match self.next_token()? {
                None => return Err(Error::parse(open_pos, "unclosed #(")),
                Some((_, Token::RParen)) => return Ok(Value::Vector(Rc::new(elements))),
                Some((pos, Token::Dot)) => return Err(Error::parse(pos, "unexpected . in vector")),
                Some((pos, token)) => elements.push(self.datum_from(pos, token)?),
            }
        }
    }

    fn reader_macro(&mut self, tag: &str) -> Result<Value, Error> {
        let datum = self.datum()?;
        Ok(vec_to_list(vec![Value::Symbol(tag.into()), datum]))
    }
}

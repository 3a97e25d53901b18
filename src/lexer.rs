//! Character stream to token stream.
//!
//! The lexer is a state machine over the input text: a dispatcher looks at
//! the next character and hands off to one recognizer per token class. The
//! regular token bodies (numbers, identifiers) are recognized with nom
//! combinators; strings and characters need lookahead decisions nom makes
//! awkward and are scanned by hand.
//!
//! Tokens are produced lazily through the [`Iterator`] impl together with
//! their byte offset, and the parser never needs more than one token of
//! lookahead. The identifiers `lambda`, `if` and `define` are reclassified
//! as keyword tokens.

use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, one_of},
    combinator::{opt, recognize},
    sequence::pair,
};

use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Quote,
    Backtick,
    Comma,
    CommaAt,
    Dot,
    /// `#(`, the start of a vector literal
    LVec,
    Ident(String),
    /// Unconverted numeric text; the parser decides int versus real
    Num(String),
    Str(String),
    Boolean(bool),
    Character(char),
    Lambda,
    If,
    Define,
}

fn is_identifier_initial(c: char) -> bool {
    c.is_ascii_alphabetic() || "!$%&*/:<=>?^_~".contains(c)
}

fn is_identifier_subsequent(c: char) -> bool {
    is_identifier_initial(c) || c.is_ascii_digit() || "+-.@".contains(c)
}

fn lex_number_span(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(one_of("+-")),
        pair(
            take_while(|c: char| c.is_ascii_digit()),
            opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit()))),
        ),
    ))
    .parse(input)
}

fn lex_identifier_span(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(is_identifier_initial),
        take_while(is_identifier_subsequent),
    ))
    .parse(input)
}

/// Lazy tokenizer over a borrowed input string.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, pos: 0 }
    }

    /// Skip whitespace and `;` line comments.
    fn skip_atmosphere(&mut self) {
        let mut rest = &self.input[self.pos..];
        loop {
            let trimmed = rest.trim_start_matches([' ', '\t', '\n', '\r']);
            if let Some(stripped) = trimmed.strip_prefix(';') {
                rest = match stripped.find('\n') {
                    Some(i) => &stripped[i + 1..],
                    None => "",
                };
            } else {
                rest = trimmed;
                break;
            }
        }
        self.pos = self.input.len() - rest.len();
    }

    fn number(&self, rest: &str, start: usize) -> Result<(Token, usize), Error> {
        // the dispatcher guarantees at least one digit is present
        let span = match lex_number_span(rest) {
            Ok((_, span)) => span,
            Err(_) => return Err(Error::lex(start, "bad number syntax")),
        };
        if let Some(c) = rest[span.len()..].chars().next()
            && c.is_alphanumeric()
        {
            let seen = &rest[..span.len() + c.len_utf8()];
            return Err(Error::lex(start, format!("bad number syntax: {seen:?}")));
        }
        Ok((Token::Num(span.to_string()), span.len()))
    }

    fn string(&self, rest: &str, start: usize) -> Result<(Token, usize), Error> {
        let mut out = String::new();
        let mut chars = rest.char_indices();
        chars.next(); // opening quote
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Ok((Token::Str(out), i + 1)),
                '\n' => return Err(Error::lex(start + i, "unterminated quoted string")),
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((j, c)) => {
                        return Err(Error::lex(
                            start + j,
                            format!("unknown escape sequence \\{c}"),
                        ));
                    }
                    None => return Err(Error::lex(start + i, "unterminated quoted string")),
                },
                c => out.push(c),
            }
        }
        Err(Error::lex(start, "unterminated quoted string"))
    }

    fn boolean(&self, rest: &str, start: usize) -> Result<(Token, usize), Error> {
        let value = match rest[1..].chars().next() {
            Some('t') => true,
            Some('f') => false,
            _ => return Err(Error::lex(start, "bad boolean value")),
        };
        if let Some(c) = rest[2..].chars().next()
            && c.is_alphanumeric()
        {
            return Err(Error::lex(start, "bad boolean value"));
        }
        Ok((Token::Boolean(value), 2))
    }

    /// `#\c`, `#\x<hex>`, or a named character.
    fn character(&self, rest: &str, start: usize) -> Result<(Token, usize), Error> {
        let body = &rest[2..];
        let first = match body.chars().next() {
            Some(c) => c,
            None => return Err(Error::lex(start, "bad character")),
        };
        if !first.is_alphanumeric() {
            return Ok((Token::Character(first), 2 + first.len_utf8()));
        }

        let run: &str = &body[..body
            .char_indices()
            .find(|(_, c)| !c.is_alphanumeric())
            .map(|(i, _)| i)
            .unwrap_or(body.len())];
        let consumed = 2 + run.len();

        if run.len() == 1 {
            return Ok((Token::Character(first), consumed));
        }
        if let Some(hex) = run.strip_prefix('x')
            && hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            let c = u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Error::lex(start, format!("bad character escape #\\{run}")))?;
            return Ok((Token::Character(c), consumed));
        }
        match run {
            "space" => Ok((Token::Character(' '), consumed)),
            "newline" => Ok((Token::Character('\n'), consumed)),
            "tab" => Ok((Token::Character('\t'), consumed)),
            _ => Err(Error::lex(start, format!("bad character name #\\{run}"))),
        }
    }

    fn identifier(&self, rest: &str, start: usize) -> Result<(Token, usize), Error> {
        let span = match lex_identifier_span(rest) {
            Ok((_, span)) => span,
            Err(_) => {
                let c = rest.chars().next().unwrap_or_default();
                return Err(Error::lex(start, format!("bad identifier starting {c:?}")));
            }
        };
        let token = match span {
            "lambda" => Token::Lambda,
            "if" => Token::If,
            "define" => Token::Define,
            ident => Token::Ident(ident.to_string()),
        };
        Ok((token, span.len()))
    }

    fn scan(&mut self) -> Option<Result<(usize, Token), Error>> {
        self.skip_atmosphere();
        let start = self.pos;
        let rest = &self.input[self.pos..];
        let mut chars = rest.chars();
        let first = chars.next()?;

        let result = match first {
            '(' => Ok((Token::LParen, 1)),
            ')' => Ok((Token::RParen, 1)),
            '\'' => Ok((Token::Quote, 1)),
            '`' => Ok((Token::Backtick, 1)),
            ',' => {
                if chars.next() == Some('@') {
                    Ok((Token::CommaAt, 2))
                } else {
                    Ok((Token::Comma, 1))
                }
            }
            '.' => {
                if chars.next().is_some_and(|c| c.is_ascii_digit()) {
                    self.number(rest, start)
                } else {
                    Ok((Token::Dot, 1))
                }
            }
            '+' | '-' => {
                if chars.next().is_some_and(|c| c.is_ascii_digit()) {
                    self.number(rest, start)
                } else {
                    Ok((Token::Ident(first.to_string()), 1))
                }
            }
            '"' => self.string(rest, start),
            '#' => match chars.next() {
                Some('t') | Some('f') => self.boolean(rest, start),
                Some('\\') => self.character(rest, start),
                Some('(') => Ok((Token::LVec, 2)),
                _ => Err(Error::lex(start, "bad # sequence")),
            },
            c if c.is_ascii_digit() => self.number(rest, start),
            _ => self.identifier(rest, start),
        };

        match result {
            Ok((token, len)) => {
                self.pos += len;
                Some(Ok((start, token)))
            }
            Err(e) => {
                // a lexical error poisons the rest of the stream
                self.pos = self.input.len();
                Some(Err(e))
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<(usize, Token), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan()
    }
}

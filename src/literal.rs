//! Parser for the literal mappings oracles reply with.
//!
//! Accepts JSON objects and Python-style dict literals: single or double
//! quoted strings, `None`/`null`, `True`/`False`, lists or tuples, and
//! trailing commas. Parsing starts at the first `{` so surrounding prose or
//! code fences are skipped; anything after the closing brace is ignored.

use std::{iter::Peekable, str::CharIndices};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Map(Vec<(String, Literal)>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Parses the first mapping literal in `text`, keeping entry order.
pub fn parse_mapping(text: &str) -> Result<Vec<(String, Literal)>, String> {
    let start = text
        .find('{')
        .ok_or_else(|| "reply does not contain a '{' mapping".to_string())?;
    let mut parser = Parser {
        src: &text[start..],
        chars: text[start..].char_indices().peekable(),
    };
    match parser.value()? {
        Literal::Map(entries) => Ok(entries),
        other => Err(format!("expected a mapping, found {other:?}")),
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while let Some((_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn expect(&mut self, wanted: char) -> Result<(), String> {
        match self.peek() {
            Some(ch) if ch == wanted => {
                self.chars.next();
                Ok(())
            }
            Some(ch) => Err(format!("expected '{wanted}', found '{ch}'")),
            None => Err(format!("expected '{wanted}', found end of reply")),
        }
    }

    fn value(&mut self) -> Result<Literal, String> {
        match self.peek() {
            Some('{') => self.map(),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some(quote @ ('\'' | '"')) => self.string(quote).map(Literal::Str),
            Some(ch) if ch == '-' || ch.is_ascii_digit() => Ok(self.number()),
            Some(ch) if ch.is_ascii_alphabetic() => self.keyword(),
            Some(ch) => Err(format!("unexpected character '{ch}'")),
            None => Err("unexpected end of reply".to_string()),
        }
    }

    fn map(&mut self) -> Result<Literal, String> {
        self.expect('{')?;
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some('}') {
                self.chars.next();
                return Ok(Literal::Map(entries));
            }
            let key = match self.value()? {
                Literal::Str(key) => key,
                Literal::Number(key) => key,
                other => return Err(format!("mapping keys must be strings, found {other:?}")),
            };
            self.expect(':')?;
            let value = self.value()?;
            entries.push((key, value));
            match self.peek() {
                Some(',') => {
                    self.chars.next();
                }
                Some('}') => {}
                Some(ch) => return Err(format!("expected ',' or '}}', found '{ch}'")),
                None => return Err("unterminated mapping".to_string()),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Literal, String> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(close) {
                self.chars.next();
                return Ok(Literal::List(items));
            }
            items.push(self.value()?);
            match self.peek() {
                Some(',') => {
                    self.chars.next();
                }
                Some(ch) if ch == close => {}
                Some(ch) => return Err(format!("expected ',' or '{close}', found '{ch}'")),
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, String> {
        self.chars.next();
        let mut out = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err("unterminated string".to_string())
    }

    fn number(&mut self) -> Literal {
        let start = self.chars.peek().map(|(idx, _)| *idx).unwrap_or(0);
        let mut end = start;
        while let Some((idx, ch)) = self.chars.peek() {
            if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E') {
                end = idx + ch.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        Literal::Number(self.src[start..end].to_string())
    }

    fn keyword(&mut self) -> Result<Literal, String> {
        let mut word = String::new();
        while let Some((_, ch)) = self.chars.peek() {
            if ch.is_ascii_alphanumeric() || *ch == '_' {
                word.push(*ch);
                self.chars.next();
            } else {
                break;
            }
        }
        match word.as_str() {
            "None" | "null" => Ok(Literal::None),
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            other => Err(format!("unexpected bare word '{other}'")),
        }
    }
}

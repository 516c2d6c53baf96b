//! Object-literal notation used for structured LM output
//!
//! Structured values travel through prompts as constructor-style literals:
//!
//! ```text
//! Solution(question='Compute 1 + 1', final_answer=2)
//! [1, 2.5, 'x', True, None]
//! {'key': 'value'}
//! ```
//!
//! Parsing maps them onto JSON values. A constructor call becomes an object
//! whose `_type` key holds the constructor name (the last segment of a dotted
//! name). Formatting is the inverse.

use serde_json::{Map, Number, Value};

use crate::{Error, Result};

/// Key holding the constructor name of a parsed object literal.
pub const TYPE_KEY: &str = "_type";

/// Parse an LM response into a JSON value.
///
/// Surrounding whitespace and a single Markdown code fence are ignored.
///
/// # Errors
///
/// Returns [`Error::Parse`] when the text is not exactly one literal.
pub fn parse_literal(text: &str) -> Result<Value> {
    let body = strip_code_fence(text.trim());
    let mut parser = Parser::new(body);
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, then the closing fence.
    let rest = rest.find('\n').map_or("", |nl| &rest[nl + 1..]);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: &str) -> Error {
        Error::parse(format!("{message} at offset {} in {:?}", self.pos, self.src))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.list(),
            Some('{') => self.dict(),
            Some(q @ ('\'' | '"')) => self.string(q).map(Value::String),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma-separated items up to `close`, allowing a trailing comma.
    fn sequence(&mut self, close: char, mut item: impl FnMut(&mut Self) -> Result<()>) -> Result<()> {
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(());
            }
            item(self)?;
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(c) if c == close => return Ok(()),
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.expect('[')?;
        let mut items = Vec::new();
        self.sequence(']', |p| {
            items.push(p.value()?);
            Ok(())
        })?;
        Ok(Value::Array(items))
    }

    fn dict(&mut self) -> Result<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        self.sequence('}', |p| {
            p.skip_ws();
            let key = match p.peek() {
                Some(q @ ('\'' | '"')) => p.string(q)?,
                _ => p.identifier()?,
            };
            p.expect(':')?;
            let value = p.value()?;
            map.insert(key, value);
            Ok(())
        })?;
        Ok(Value::Object(map))
    }

    fn string(&mut self, quote: char) -> Result<String> {
        self.pos += quote.len_utf8();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' | 'e' | 'E' => is_float = true,
                '-' | '+' if matches!(self.src[..self.pos].chars().last(), Some('e' | 'E')) => {}
                _ => break,
            }
            self.pos += 1;
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| Error::parse(format!("invalid number '{text}'")))
    }

    fn identifier(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            self.pos += self.peek().map_or(1, char::len_utf8);
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn word(&mut self) -> Result<Value> {
        let name = self.identifier()?;
        self.skip_ws();
        if self.peek() == Some('(') {
            return self.constructor(&name);
        }
        match name.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => Err(Error::parse(format!("unknown name '{name}'"))),
        }
    }

    fn constructor(&mut self, name: &str) -> Result<Value> {
        let short = name.rsplit('.').next().unwrap_or(name);
        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Value::String(short.to_string()));
        self.expect('(')?;
        self.sequence(')', |p| {
            let field = p.identifier()?;
            p.expect('=')?;
            let value = p.value()?;
            map.insert(field, value);
            Ok(())
        })?;
        Ok(Value::Object(map))
    }
}

/// Format a JSON value in object-literal notation.
///
/// Objects carrying a `_type` key render as constructor calls with fields in
/// key order; see [`Schema::format`](super::Schema::format) for schema order.
#[must_use]
pub fn format_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

pub(crate) fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => match map.get(TYPE_KEY).and_then(Value::as_str) {
            Some(name) => {
                let fields = map.iter().filter(|(k, _)| k.as_str() != TYPE_KEY);
                write_constructor(out, name, fields);
            }
            None => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_string(out, k);
                    out.push_str(": ");
                    write_value(out, v);
                }
                out.push('}');
            }
        },
    }
}

fn write_constructor<'v>(
    out: &mut String,
    name: &str,
    fields: impl Iterator<Item = (&'v String, &'v Value)>,
) {
    out.push_str(name);
    out.push('(');
    for (i, (k, v)) in fields.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(k);
        out.push('=');
        write_value(out, v);
    }
    out.push(')');
}

fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

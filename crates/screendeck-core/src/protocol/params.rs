//! Tokenizer and writer for satellite argument lists.
//!
//! A line looks like:
//!
//! ```text
//! ADD-DEVICE DEVICEID=pad-1 PRODUCT_NAME="Screen Deck" KEYS_TOTAL=32
//! ^command   ^named params ...
//! ```
//!
//! Tokens after the command are either `KEY=VALUE` pairs or bare words
//! (`OK`, `ERROR`, a ping payload).  Values that contain whitespace or quotes
//! are wrapped in double quotes; inside quotes `\"` and `\\` are escapes.

use std::fmt::{Display, Write as _};
use std::str::FromStr;

use super::codec::ProtocolError;

/// A tokenized line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamList {
    pub command: String,
    /// Bare words in the order they appeared.
    pub words: Vec<String>,
    /// `KEY=VALUE` pairs in the order they appeared.
    pub params: Vec<(String, String)>,
}

impl ParamList {
    /// Splits `line` into command, bare words and named parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedLine`] for an empty line or an
    /// unterminated quoted value.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut chars = line.chars().peekable();
        let mut tokens: Vec<(Option<String>, String)> = Vec::new();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let Some(&first) = chars.peek() else { break };

            if first == '"' {
                chars.next();
                tokens.push((None, read_quoted(&mut chars, line)?));
                continue;
            }

            let mut head = String::new();
            let mut key = None;
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                chars.next();
                if c == '=' && key.is_none() {
                    key = Some(std::mem::take(&mut head));
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        head = read_quoted(&mut chars, line)?;
                        break;
                    }
                    continue;
                }
                head.push(c);
            }
            tokens.push((key, head));
        }

        let mut iter = tokens.into_iter();
        let command = match iter.next() {
            Some((None, cmd)) if !cmd.is_empty() => cmd,
            _ => return Err(ProtocolError::MalformedLine(line.to_string())),
        };

        let mut words = Vec::new();
        let mut params = Vec::new();
        for (key, value) in iter {
            match key {
                Some(k) => params.push((k, value)),
                None => words.push(value),
            }
        }

        Ok(Self {
            command,
            words,
            params,
        })
    }

    /// Value of the first parameter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key`, or [`ProtocolError::MissingParam`].
    pub fn require(&self, key: &str) -> Result<&str, ProtocolError> {
        self.get(key).ok_or_else(|| ProtocolError::MissingParam {
            command: self.command.clone(),
            param: key.to_string(),
        })
    }

    /// Parses `key` with [`FromStr`], `None` if absent.
    pub fn parse_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>, ProtocolError> {
        self.get(key)
            .map(|raw| {
                raw.parse().map_err(|_| ProtocolError::InvalidParam {
                    param: key.to_string(),
                    value: raw.to_string(),
                })
            })
            .transpose()
    }

    /// Parses a required `key` with [`FromStr`].
    pub fn parse_required<T: FromStr>(&self, key: &str) -> Result<T, ProtocolError> {
        self.parse_opt(key)?.ok_or_else(|| ProtocolError::MissingParam {
            command: self.command.clone(),
            param: key.to_string(),
        })
    }

    /// Boolean parameter: `true|false|1|0`; a bare word with the same name
    /// counts as `true`.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, ProtocolError> {
        match self.get(key) {
            Some(raw) => parse_bool(raw)
                .map(Some)
                .ok_or_else(|| ProtocolError::InvalidParam {
                    param: key.to_string(),
                    value: raw.to_string(),
                }),
            None if self.words.iter().any(|w| w == key) => Ok(Some(true)),
            None => Ok(None),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: &str,
) -> Result<String, ProtocolError> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => break,
            },
            other => out.push(other),
        }
    }
    Err(ProtocolError::MalformedLine(line.to_string()))
}

/// Builds an outbound line one token at a time.
#[derive(Debug)]
pub struct LineWriter {
    buf: String,
}

impl LineWriter {
    pub fn new(command: &str) -> Self {
        Self {
            buf: command.to_string(),
        }
    }

    /// Appends a bare word, quoting it if necessary.
    pub fn word(mut self, word: &str) -> Self {
        self.buf.push(' ');
        push_value(&mut self.buf, word);
        self
    }

    /// Appends `KEY=VALUE`, quoting the value if necessary.
    pub fn param(mut self, key: &str, value: impl Display) -> Self {
        let _ = write!(self.buf, " {key}=");
        push_value(&mut self.buf, &value.to_string());
        self
    }

    /// Appends `KEY=true|false`.
    pub fn flag(self, key: &str, value: bool) -> Self {
        self.param(key, if value { "true" } else { "false" })
    }

    /// Returns the line without its terminator.
    pub fn finish(self) -> String {
        self.buf
    }
}

fn push_value(buf: &mut String, value: &str) {
    let needs_quotes =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quotes {
        buf.push_str(value);
        return;
    }
    buf.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}

// ── Tests ─────────────────────────────────────────────────────────────────────

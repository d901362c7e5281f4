//! Rendering of result values as Lua source text.
//!
//! The host `load`s whatever we print, so every value has to come out as a
//! literal the Lua lexer reads back unchanged. Strings use long brackets
//! (`[==[ ... ]==]`) and are never escaped; the bracket level is chosen so
//! the content cannot close the literal early.

use std::collections::BTreeSet;

use unportable_contracts::CALLBACK_FUNCTION_NAME;

const BOOL_TRUE: &[u8] = b"true";
const BOOL_FALSE: &[u8] = b"false";
const NIL: &[u8] = b"nil";
const TABLE_BRACE_LEFT: u8 = b'{';
const TABLE_BRACE_RIGHT: u8 = b'}';
const TABLE_SEPARATOR: u8 = b',';
const QUOTE_SEP: u8 = b'=';
const QUOTE_LEFT: u8 = b'[';
const QUOTE_RIGHT: u8 = b']';
const CALL_PAREN_LEFT: u8 = b'(';
const CALL_PAREN_RIGHT: u8 = b')';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Raw bytes, quoted exactly like `Str`. Lua strings are byte strings.
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// Encodes `value` at `level` into a fresh buffer.
pub fn encode(value: &Value, level: usize) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, level, &mut out);
    out
}

/// Appends the literal for `value` to `out`.
///
/// Tuples at level 0 are a call's argument list and get no braces; nested
/// tuples become table constructors.
pub fn encode_into(value: &Value, level: usize, out: &mut Vec<u8>) {
    match value {
        Value::Nil => out.extend_from_slice(NIL),
        Value::Bool(true) => out.extend_from_slice(BOOL_TRUE),
        Value::Bool(false) => out.extend_from_slice(BOOL_FALSE),
        Value::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::Str(s) => quote_long_string(s.as_bytes(), out),
        Value::Bytes(b) => quote_long_string(b, out),
        Value::Tuple(items) => {
            let braced = level > 0;
            if braced {
                out.push(TABLE_BRACE_LEFT);
            }
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(TABLE_SEPARATOR);
                }
                encode_into(item, level + 1, out);
            }
            if braced {
                out.push(TABLE_BRACE_RIGHT);
            }
        }
    }
}

/// Renders `_(...)`. A tuple supplies the argument list; any other value is
/// the single argument.
pub fn render_call(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(CALLBACK_FUNCTION_NAME.as_bytes());
    out.push(CALL_PAREN_LEFT);
    encode_into(value, 0, &mut out);
    out.push(CALL_PAREN_RIGHT);
    out
}

/// Smallest `=` count whose bracket pair appears nowhere in `content`.
///
/// Every `[` or `]` followed by a run of `=` and another `[` or `]` rules out
/// that run length. Occurrences may overlap (`]=]]` rules out both 1 and 0),
/// and a trailing `]` plus `=` run rules out its length as well.
pub fn long_bracket_level(content: &[u8]) -> usize {
    let mut used = BTreeSet::new();
    for (i, &b) in content.iter().enumerate() {
        if b != QUOTE_LEFT && b != QUOTE_RIGHT {
            continue;
        }
        let run = content[i + 1..]
            .iter()
            .take_while(|&&c| c == QUOTE_SEP)
            .count();
        match content.get(i + 1 + run) {
            Some(&next) if next == QUOTE_LEFT || next == QUOTE_RIGHT => {
                used.insert(run);
            }
            // A trailing `]=*` would pair with the closing bracket.
            None if b == QUOTE_RIGHT => {
                used.insert(run);
            }
            _ => {}
        }
    }
    (0..).find(|level| !used.contains(level)).unwrap_or(0)
}

fn quote_long_string(content: &[u8], out: &mut Vec<u8>) {
    let level = long_bracket_level(content);
    out.push(QUOTE_LEFT);
    out.extend(std::iter::repeat(QUOTE_SEP).take(level));
    out.push(QUOTE_LEFT);
    // The lexer swallows one line break right after the opening bracket.
    if let Some(&first @ (b'\n' | b'\r')) = content.first() {
        out.push(first);
    }
    out.extend_from_slice(content);
    out.push(QUOTE_RIGHT);
    out.extend(std::iter::repeat(QUOTE_SEP).take(level));
    out.push(QUOTE_RIGHT);
}

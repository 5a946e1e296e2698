//! json_encode().
//!
//! Reference: php-src/ext/json/json_encoder.c

use std::fmt::Write;

use thiserror::Error;

use crate::value::{format_double, ArrayKey, Value};

pub const JSON_HEX_TAG: u32 = 1;
pub const JSON_HEX_AMP: u32 = 2;
pub const JSON_HEX_APOS: u32 = 4;
pub const JSON_HEX_QUOT: u32 = 8;
pub const JSON_FORCE_OBJECT: u32 = 16;
pub const JSON_UNESCAPED_SLASHES: u32 = 64;
pub const JSON_PRETTY_PRINT: u32 = 128;
pub const JSON_UNESCAPED_UNICODE: u32 = 256;
pub const JSON_PARTIAL_OUTPUT_ON_ERROR: u32 = 512;
pub const JSON_PRESERVE_ZERO_FRACTION: u32 = 1024;
pub const JSON_THROW_ON_ERROR: u32 = 4194304;

/// Names of the flag constants, for constant lookup in scripts.
pub const JSON_CONSTANTS: [(&str, u32); 11] = [
    ("JSON_HEX_TAG", JSON_HEX_TAG),
    ("JSON_HEX_AMP", JSON_HEX_AMP),
    ("JSON_HEX_APOS", JSON_HEX_APOS),
    ("JSON_HEX_QUOT", JSON_HEX_QUOT),
    ("JSON_FORCE_OBJECT", JSON_FORCE_OBJECT),
    ("JSON_UNESCAPED_SLASHES", JSON_UNESCAPED_SLASHES),
    ("JSON_PRETTY_PRINT", JSON_PRETTY_PRINT),
    ("JSON_UNESCAPED_UNICODE", JSON_UNESCAPED_UNICODE),
    ("JSON_PARTIAL_OUTPUT_ON_ERROR", JSON_PARTIAL_OUTPUT_ON_ERROR),
    ("JSON_PRESERVE_ZERO_FRACTION", JSON_PRESERVE_ZERO_FRACTION),
    ("JSON_THROW_ON_ERROR", JSON_THROW_ON_ERROR),
];

const MAX_DEPTH: usize = 512;

// ── JSON error codes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JsonError {
    #[error("Maximum stack depth exceeded")]
    Depth,
    #[error("Recursion detected")]
    Recursion,
    #[error("Inf and NaN cannot be JSON encoded")]
    InfOrNan,
}

impl JsonError {
    /// json_last_error() code.
    pub fn code(self) -> i64 {
        match self {
            JsonError::Depth => 1,
            JsonError::Recursion => 6,
            JsonError::InfOrNan => 7,
        }
    }
}

// ── json_encode ──────────────────────────────────────────────────────────────

/// json_encode() - Returns the JSON representation of a value.
///
/// Floats are written with `serialize_precision` digits.
pub fn json_encode(value: &Value, options: u32, serialize_precision: i64) -> Result<String, JsonError> {
    let mut encoder = Encoder {
        options,
        precision: serialize_precision,
        stack: Vec::new(),
        buf: String::new(),
    };
    encoder.encode_value(value, 0)?;
    Ok(encoder.buf)
}

struct Encoder {
    options: u32,
    precision: i64,
    /// Objects being encoded, for recursion detection.
    stack: Vec<u64>,
    buf: String,
}

impl Encoder {
    fn has(&self, flag: u32) -> bool {
        self.options & flag != 0
    }

    fn encode_value(&mut self, value: &Value, depth: usize) -> Result<(), JsonError> {
        if depth > MAX_DEPTH {
            return Err(JsonError::Depth);
        }
        match value {
            Value::Null => self.buf.push_str("null"),
            Value::Bool(true) => self.buf.push_str("true"),
            Value::Bool(false) => self.buf.push_str("false"),
            Value::Long(n) => {
                let _ = write!(self.buf, "{}", n);
            }
            Value::Double(f) => {
                if !f.is_finite() {
                    return Err(JsonError::InfOrNan);
                }
                let text = format_double(*f, self.precision).replace('E', "e");
                self.buf.push_str(&text);
                if self.has(JSON_PRESERVE_ZERO_FRACTION) && !text.contains(['.', 'e']) {
                    self.buf.push_str(".0");
                }
            }
            Value::String(s) => self.encode_string(s),
            Value::Array(arr) => {
                if arr.is_list() && !self.has(JSON_FORCE_OBJECT) {
                    let items: Vec<&Value> = arr.values().collect();
                    self.encode_list(&items, depth)?;
                } else {
                    let entries: Vec<(String, Value)> = arr
                        .iter()
                        .map(|(key, item)| {
                            let key = match key {
                                ArrayKey::Int(n) => n.to_string(),
                                ArrayKey::String(s) => s.clone(),
                            };
                            (key, item.clone())
                        })
                        .collect();
                    self.encode_object(&entries, depth)?;
                }
            }
            Value::Object(obj) => {
                let id = obj.id();
                if self.stack.contains(&id) {
                    return Err(JsonError::Recursion);
                }
                let entries: Vec<(String, Value)> = obj
                    .borrow()
                    .properties
                    .iter()
                    .map(|(name, item)| (name.clone(), item.clone()))
                    .collect();
                self.stack.push(id);
                let result = self.encode_object(&entries, depth);
                self.stack.pop();
                result?;
            }
        }
        Ok(())
    }

    fn encode_list(&mut self, items: &[&Value], depth: usize) -> Result<(), JsonError> {
        self.buf.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.buf.push(',');
            }
            self.newline(depth + 1);
            self.encode_value(item, depth + 1)?;
        }
        if !items.is_empty() {
            self.newline(depth);
        }
        self.buf.push(']');
        Ok(())
    }

    fn encode_object(&mut self, entries: &[(String, Value)], depth: usize) -> Result<(), JsonError> {
        self.buf.push('{');
        for (i, (key, item)) in entries.iter().enumerate() {
            if i > 0 {
                self.buf.push(',');
            }
            self.newline(depth + 1);
            self.encode_string(key);
            self.buf.push(':');
            if self.has(JSON_PRETTY_PRINT) {
                self.buf.push(' ');
            }
            self.encode_value(item, depth + 1)?;
        }
        if !entries.is_empty() {
            self.newline(depth);
        }
        self.buf.push('}');
        Ok(())
    }

    fn newline(&mut self, depth: usize) {
        if self.has(JSON_PRETTY_PRINT) {
            self.buf.push('\n');
            for _ in 0..depth {
                self.buf.push_str("    ");
            }
        }
    }

    fn encode_string(&mut self, s: &str) {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for ch in s.chars() {
            match ch {
                '"' if self.has(JSON_HEX_QUOT) => out.push_str("\\u0022"),
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '/' if self.has(JSON_UNESCAPED_SLASHES) => out.push('/'),
                '/' => out.push_str("\\/"),
                '\x08' => out.push_str("\\b"),
                '\x0C' => out.push_str("\\f"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '<' if self.has(JSON_HEX_TAG) => out.push_str("\\u003C"),
                '>' if self.has(JSON_HEX_TAG) => out.push_str("\\u003E"),
                '&' if self.has(JSON_HEX_AMP) => out.push_str("\\u0026"),
                '\'' if self.has(JSON_HEX_APOS) => out.push_str("\\u0027"),
                c if c < '\x20' => {
                    let _ = write!(out, "\\u{:04x}", c as u32);
                }
                c if !c.is_ascii() && !self.has(JSON_UNESCAPED_UNICODE) => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        let _ = write!(out, "\\u{:04x}", unit);
                    }
                }
                c => out.push(c),
            }
        }
        out.push('"');
        self.buf.push_str(&out);
    }
}

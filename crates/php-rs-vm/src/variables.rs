//! PHP variable functions: serialize, unserialize, var_export, var_dump and
//! print_r.
//!
//! Reference: php-src/ext/standard/var.c, var_unserializer.re

use thiserror::Error;

use crate::value::{format_double, ArrayKey, ObjectData, ObjectRef, PhpArray, PhpObject, Value};

/// serialize() failure; thrown to the script as an Exception.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("Serialization of '{0}' is not allowed")]
    NotAllowed(String),
}

// ── serialize ────────────────────────────────────────────────────────────────

/// serialize() - Generates a storable representation of a value.
///
/// PHP serialization format:
///   N;                      - NULL
///   b:0;  b:1;              - boolean
///   i:42;                   - integer
///   d:3.14;                 - float (serialize_precision digits)
///   s:5:"hello";            - string (byte length)
///   a:2:{...}               - array
///   O:8:"stdClass":1:{...}  - object
pub fn serialize(value: &Value, serialize_precision: i64) -> Result<String, SerializeError> {
    let mut out = String::new();
    serialize_into(value, serialize_precision, &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn serialize_into(
    value: &Value,
    precision: i64,
    stack: &mut Vec<u64>,
    out: &mut String,
) -> Result<(), SerializeError> {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => out.push_str(if *b { "b:1;" } else { "b:0;" }),
        Value::Long(n) => out.push_str(&format!("i:{};", n)),
        Value::Double(f) => out.push_str(&format!("d:{};", format_double(*f, precision))),
        Value::String(s) => serialize_string(s, out),
        Value::Array(arr) => {
            out.push_str(&format!("a:{}:{{", arr.len()));
            for (key, item) in arr.iter() {
                serialize_key(key, out);
                serialize_into(item, precision, stack, out)?;
            }
            out.push('}');
        }
        Value::Object(obj) => {
            let id = obj.id();
            if stack.contains(&id) {
                out.push_str("N;");
                return Ok(());
            }
            let object = obj.borrow();
            if matches!(object.data, ObjectData::Closure(_)) {
                return Err(SerializeError::NotAllowed(object.class_name.clone()));
            }
            stack.push(id);
            out.push_str(&format!(
                "O:{}:\"{}\":{}:{{",
                object.class_name.len(),
                object.class_name,
                object.properties.len()
            ));
            for (name, item) in &object.properties {
                serialize_string(name, out);
                serialize_into(item, precision, stack, out)?;
            }
            out.push('}');
            stack.pop();
        }
    }
    Ok(())
}

fn serialize_string(s: &str, out: &mut String) {
    out.push_str(&format!("s:{}:\"{}\";", s.len(), s));
}

fn serialize_key(key: &ArrayKey, out: &mut String) {
    match key {
        ArrayKey::Int(n) => out.push_str(&format!("i:{};", n)),
        ArrayKey::String(s) => serialize_string(s, out),
    }
}

// ── unserialize ──────────────────────────────────────────────────────────────

/// unserialize() - Creates a PHP value from a stored representation.
///
/// On malformed input returns the byte offset where decoding stopped, as
/// reported in "Error at offset X of Y bytes".
pub fn unserialize(input: &str) -> Result<Value, usize> {
    // Trailing bytes after the first complete value are ignored
    let (value, _) = unserialize_value(input.as_bytes(), 0)?;
    Ok(value)
}

fn unserialize_value(data: &[u8], pos: usize) -> Result<(Value, usize), usize> {
    match data.get(pos) {
        Some(b'N') => {
            expect_byte(data, pos + 1, b';')?;
            Ok((Value::Null, pos + 2))
        }
        Some(b'b') => {
            expect_byte(data, pos + 1, b':')?;
            let (text, end) = read_until(data, pos + 2, b';')?;
            match text {
                "0" => Ok((Value::Bool(false), end)),
                "1" => Ok((Value::Bool(true), end)),
                _ => Err(pos),
            }
        }
        Some(b'i') => {
            expect_byte(data, pos + 1, b':')?;
            let (text, end) = read_until(data, pos + 2, b';')?;
            let n: i64 = text.parse().map_err(|_| pos)?;
            Ok((Value::Long(n), end))
        }
        Some(b'd') => {
            expect_byte(data, pos + 1, b':')?;
            let (text, end) = read_until(data, pos + 2, b';')?;
            let f = match text {
                "INF" => f64::INFINITY,
                "-INF" => f64::NEG_INFINITY,
                "NAN" => f64::NAN,
                _ => text.parse().map_err(|_| pos)?,
            };
            Ok((Value::Double(f), end))
        }
        Some(b's') => {
            let (s, end) = unserialize_string(data, pos)?;
            Ok((Value::String(s), end))
        }
        Some(b'a') => {
            expect_byte(data, pos + 1, b':')?;
            let (count, mut cur) = read_count(data, pos + 2)?;
            expect_byte(data, cur, b'{')?;
            cur += 1;
            let mut arr = PhpArray::new();
            for _ in 0..count {
                let (key, next) = unserialize_value(data, cur)?;
                let key = match key {
                    Value::Long(n) => ArrayKey::Int(n),
                    Value::String(s) => ArrayKey::from_string(&s),
                    _ => return Err(cur),
                };
                let (item, next) = unserialize_value(data, next)?;
                arr.insert(key, item);
                cur = next;
            }
            expect_byte(data, cur, b'}')?;
            Ok((Value::Array(arr), cur + 1))
        }
        Some(b'O') => {
            let (class_name, mut cur) = unserialize_string(data, pos)
                .map(|(name, end)| (name, end - 1))
                .map_err(|_| pos)?;
            expect_byte(data, cur, b':')?;
            let (count, next) = read_count(data, cur + 1)?;
            cur = next;
            expect_byte(data, cur, b'{')?;
            cur += 1;
            let mut object = PhpObject::new(class_name);
            for _ in 0..count {
                let (name, next) = unserialize_value(data, cur)?;
                let name = match name {
                    Value::Long(n) => n.to_string(),
                    Value::String(s) => s,
                    _ => return Err(cur),
                };
                let (item, next) = unserialize_value(data, next)?;
                object.set_property(name, item);
                cur = next;
            }
            expect_byte(data, cur, b'}')?;
            Ok((Value::Object(ObjectRef::new(object)), cur + 1))
        }
        _ => Err(pos),
    }
}

/// `s:LEN:"...";` (and the `O:LEN:"Name"` prefix, whose `;` is a `:`).
fn unserialize_string(data: &[u8], pos: usize) -> Result<(String, usize), usize> {
    expect_byte(data, pos + 1, b':')?;
    let (len, colon) = read_count(data, pos + 2)?;
    expect_byte(data, colon, b'"')?;
    let start = colon + 1;
    let end = start.checked_add(len).ok_or(pos)?;
    expect_byte(data, end, b'"')?;
    match data.get(end + 1) {
        Some(b';') | Some(b':') => {}
        _ => return Err(end + 1),
    }
    let s = std::str::from_utf8(&data[start..end]).map_err(|_| pos)?;
    Ok((s.to_string(), end + 2))
}

/// Decimal count terminated by `:`; returns the count and the offset after
/// the colon.
fn read_count(data: &[u8], start: usize) -> Result<(usize, usize), usize> {
    let (text, end) = read_until(data, start, b':')?;
    let count = text.parse().map_err(|_| start)?;
    Ok((count, end))
}

/// Text up to `terminator`; returns it with the offset after the terminator.
fn read_until(data: &[u8], start: usize, terminator: u8) -> Result<(&str, usize), usize> {
    let end = memchr_byte(terminator, data, start).ok_or(start)?;
    let text = std::str::from_utf8(&data[start..end]).map_err(|_| start)?;
    Ok((text, end + 1))
}

fn expect_byte(data: &[u8], pos: usize, expected: u8) -> Result<(), usize> {
    if data.get(pos) == Some(&expected) {
        Ok(())
    } else {
        Err(pos)
    }
}

fn memchr_byte(needle: u8, data: &[u8], start: usize) -> Option<usize> {
    data.get(start..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| p + start)
}

// ── var_export ───────────────────────────────────────────────────────────────

/// var_export() - Outputs or returns a parsable string representation.
pub fn var_export(value: &Value, serialize_precision: i64) -> String {
    let mut out = String::new();
    export_into(value, 1, serialize_precision, &mut Vec::new(), &mut out);
    out
}

fn export_into(value: &Value, level: usize, precision: i64, stack: &mut Vec<u64>, out: &mut String) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Long(n) => out.push_str(&n.to_string()),
        Value::Double(f) => {
            let text = format_double(*f, precision);
            out.push_str(&text);
            if f.is_finite() && !text.contains(['.', 'E']) {
                out.push_str(".0");
            }
        }
        Value::String(s) => export_string(s, out),
        Value::Array(arr) => {
            if level > 1 {
                out.push('\n');
                push_spaces(out, level - 1);
            }
            out.push_str("array (\n");
            for (key, item) in arr.iter() {
                push_spaces(out, level + 1);
                match key {
                    ArrayKey::Int(n) => out.push_str(&n.to_string()),
                    ArrayKey::String(s) => export_string(s, out),
                }
                out.push_str(" => ");
                export_into(item, level + 2, precision, stack, out);
                out.push_str(",\n");
            }
            if level > 1 {
                push_spaces(out, level - 1);
            }
            out.push(')');
        }
        Value::Object(obj) => {
            let id = obj.id();
            if stack.contains(&id) {
                out.push_str("NULL");
                return;
            }
            stack.push(id);
            if level > 1 {
                out.push('\n');
                push_spaces(out, level - 1);
            }
            let object = obj.borrow();
            let is_std = object.class_name.eq_ignore_ascii_case("stdClass");
            if is_std {
                out.push_str("(object) array(\n");
            } else {
                out.push_str(&format!("\\{}::__set_state(array(\n", object.class_name));
            }
            for (name, item) in &object.properties {
                push_spaces(out, level + 2);
                export_string(name, out);
                out.push_str(" => ");
                export_into(item, level + 2, precision, stack, out);
                out.push_str(",\n");
            }
            if level > 1 {
                push_spaces(out, level - 1);
            }
            out.push_str(if is_std { ")" } else { "))" });
            stack.pop();
        }
    }
}

fn export_string(s: &str, out: &mut String) {
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("' . \"\\0\" . '"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
}

fn push_spaces(out: &mut String, count: usize) {
    out.extend(std::iter::repeat_n(' ', count));
}

// ── var_dump ─────────────────────────────────────────────────────────────────

/// var_dump() - Dumps information about a variable.
pub fn var_dump(value: &Value, serialize_precision: i64) -> String {
    let mut out = String::new();
    dump_into(value, 1, serialize_precision, &mut Vec::new(), &mut out);
    out
}

fn dump_into(value: &Value, level: usize, precision: i64, stack: &mut Vec<u64>, out: &mut String) {
    if level > 1 {
        push_spaces(out, level - 1);
    }
    match value {
        Value::Null => out.push_str("NULL\n"),
        Value::Bool(b) => out.push_str(&format!("bool({})\n", b)),
        Value::Long(n) => out.push_str(&format!("int({})\n", n)),
        Value::Double(f) => out.push_str(&format!("float({})\n", format_double(*f, precision))),
        Value::String(s) => out.push_str(&format!("string({}) \"{}\"\n", s.len(), s)),
        Value::Array(arr) => {
            out.push_str(&format!("array({}) {{\n", arr.len()));
            for (key, item) in arr.iter() {
                push_spaces(out, level + 1);
                match key {
                    ArrayKey::Int(n) => out.push_str(&format!("[{}]=>\n", n)),
                    ArrayKey::String(s) => out.push_str(&format!("[\"{}\"]=>\n", s)),
                }
                dump_into(item, level + 2, precision, stack, out);
            }
            if level > 1 {
                push_spaces(out, level - 1);
            }
            out.push_str("}\n");
        }
        Value::Object(obj) => {
            let id = obj.id();
            if stack.contains(&id) {
                out.push_str("*RECURSION*\n");
                return;
            }
            stack.push(id);
            let object = obj.borrow();
            out.push_str(&format!(
                "object({})#{} ({}) {{\n",
                object.class_name,
                object.object_id,
                object.properties.len()
            ));
            for (name, item) in &object.properties {
                push_spaces(out, level + 1);
                out.push_str(&format!("[\"{}\"]=>\n", name));
                dump_into(item, level + 2, precision, stack, out);
            }
            if level > 1 {
                push_spaces(out, level - 1);
            }
            out.push_str("}\n");
            stack.pop();
        }
    }
}

// ── print_r ──────────────────────────────────────────────────────────────────

/// print_r() - Prints human-readable information about a variable.
pub fn print_r(value: &Value, precision: i64) -> String {
    let mut out = String::new();
    print_r_into(value, 0, precision, &mut Vec::new(), &mut out);
    out
}

fn print_r_into(value: &Value, indent: usize, precision: i64, stack: &mut Vec<u64>, out: &mut String) {
    match value {
        Value::Array(arr) => {
            out.push_str("Array\n");
            let entries = arr.iter().map(|(key, item)| (key.to_string(), item));
            print_hash(entries, indent, precision, stack, out);
        }
        Value::Object(obj) => {
            let id = obj.id();
            let object = obj.borrow();
            out.push_str(&format!("{} Object\n", object.class_name));
            if stack.contains(&id) {
                out.push_str(" *RECURSION*");
                return;
            }
            stack.push(id);
            let entries = object.properties.iter().map(|(name, item)| (name.clone(), item));
            print_hash(entries, indent, precision, stack, out);
            stack.pop();
        }
        other => out.push_str(&other.to_php_string_with(precision)),
    }
}

fn print_hash<'v>(
    entries: impl Iterator<Item = (String, &'v Value)>,
    indent: usize,
    precision: i64,
    stack: &mut Vec<u64>,
    out: &mut String,
) {
    push_spaces(out, indent);
    out.push_str("(\n");
    for (key, item) in entries {
        push_spaces(out, indent + 4);
        out.push_str(&format!("[{}] => ", key));
        print_r_into(item, indent + 8, precision, stack, out);
        out.push('\n');
    }
    push_spaces(out, indent);
    out.push_str(")\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[Value]) -> Value {
        Value::Array(values.iter().cloned().collect())
    }

    fn std_object(props: &[(&str, Value)]) -> Value {
        let mut object = PhpObject::new("stdClass");
        for (name, value) in props {
            object.set_property(*name, value.clone());
        }
        Value::Object(ObjectRef::new(object))
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(serialize(&Value::Null, -1).unwrap(), "N;");
        assert_eq!(serialize(&Value::Bool(true), -1).unwrap(), "b:1;");
        assert_eq!(serialize(&Value::Long(42), -1).unwrap(), "i:42;");
        assert_eq!(serialize(&Value::Double(3.14159), -1).unwrap(), "d:3.14159;");
        assert_eq!(serialize(&Value::Double(1.0), -1).unwrap(), "d:1;");
        assert_eq!(
            serialize(&Value::string("hello"), -1).unwrap(),
            "s:5:\"hello\";"
        );
    }

    #[test]
    fn test_serialize_utf8_counts_bytes() {
        assert_eq!(serialize(&Value::string("é"), -1).unwrap(), "s:2:\"é\";");
    }

    #[test]
    fn test_serialize_nested_array() {
        let value = list(&[
            list(&[Value::Long(1), Value::Long(2), Value::Long(3)]),
            list(&[Value::string("a"), Value::string("b"), Value::string("c")]),
        ]);
        assert_eq!(
            serialize(&value, -1).unwrap(),
            "a:2:{i:0;a:3:{i:0;i:1;i:1;i:2;i:2;i:3;}i:1;a:3:{i:0;s:1:\"a\";i:1;s:1:\"b\";i:2;s:1:\"c\";}}"
        );
    }

    #[test]
    fn test_serialize_std_object() {
        let value = std_object(&[
            ("I", Value::Long(3)),
            ("S", Value::string("Hello")),
        ]);
        assert_eq!(
            serialize(&value, -1).unwrap(),
            "O:8:\"stdClass\":2:{s:1:\"I\";i:3;s:1:\"S\";s:5:\"Hello\";}"
        );
    }

    #[test]
    fn test_serialize_recursive_object() {
        let value = std_object(&[]);
        if let Value::Object(obj) = &value {
            obj.borrow_mut().set_property("me", value.clone());
        }
        assert_eq!(
            serialize(&value, -1).unwrap(),
            "O:8:\"stdClass\":1:{s:2:\"me\";N;}"
        );
    }

    #[test]
    fn test_unserialize_primitives() {
        assert_eq!(unserialize("N;"), Ok(Value::Null));
        assert_eq!(unserialize("b:0;"), Ok(Value::Bool(false)));
        assert_eq!(unserialize("i:-7;"), Ok(Value::Long(-7)));
        assert_eq!(unserialize("d:0.5;"), Ok(Value::Double(0.5)));
        assert_eq!(unserialize("s:3:\"a;b\";"), Ok(Value::string("a;b")));
    }

    #[test]
    fn test_unserialize_array_and_object() {
        let value = unserialize("a:2:{i:0;s:1:\"x\";s:1:\"k\";b:1;}").unwrap();
        let Value::Array(arr) = value else {
            panic!("expected array");
        };
        assert_eq!(arr.get_int(0), Some(&Value::string("x")));
        assert_eq!(arr.get_str("k"), Some(&Value::Bool(true)));

        let value = unserialize("O:8:\"stdClass\":1:{s:1:\"a\";i:1;}").unwrap();
        let Value::Object(obj) = value else {
            panic!("expected object");
        };
        assert_eq!(obj.class_name(), "stdClass");
        assert_eq!(obj.borrow().get_property("a"), Some(&Value::Long(1)));
    }

    #[test]
    fn test_unserialize_error_offset() {
        assert_eq!(unserialize(""), Err(0));
        assert_eq!(unserialize("i:12"), Err(2));
        assert_eq!(unserialize("a:1:{i:0;}"), Err(9));
    }

    #[test]
    fn test_var_export_scalars() {
        assert_eq!(var_export(&Value::Null, -1), "NULL");
        assert_eq!(var_export(&Value::Bool(false), -1), "false");
        assert_eq!(var_export(&Value::Double(1.0), -1), "1.0");
        assert_eq!(var_export(&Value::Double(0.5), -1), "0.5");
        assert_eq!(var_export(&Value::string("it's"), -1), "'it\\'s'");
    }

    #[test]
    fn test_var_export_nested_array() {
        let value = list(&[Value::Long(1), list(&[Value::Long(2)])]);
        assert_eq!(
            var_export(&value, -1),
            "array (\n  0 => 1,\n  1 => \n  array (\n    0 => 2,\n  ),\n)"
        );
    }

    #[test]
    fn test_var_export_std_object() {
        let value = std_object(&[("a", Value::Long(1))]);
        assert_eq!(var_export(&value, -1), "(object) array(\n   'a' => 1,\n)");
    }

    #[test]
    fn test_var_dump() {
        let value = list(&[Value::Long(1), Value::string("b")]);
        assert_eq!(
            var_dump(&value, -1),
            "array(2) {\n  [0]=>\n  int(1)\n  [1]=>\n  string(1) \"b\"\n}\n"
        );
        assert_eq!(var_dump(&Value::Double(1.0), -1), "float(1)\n");
    }

    #[test]
    fn test_print_r() {
        let value = list(&[Value::Long(1), list(&[Value::Long(2)])]);
        assert_eq!(
            print_r(&value, 14),
            "Array\n(\n    [0] => 1\n    [1] => Array\n        (\n            [0] => 2\n        )\n\n)\n"
        );
        assert_eq!(print_r(&Value::Bool(true), 14), "1");
    }
}

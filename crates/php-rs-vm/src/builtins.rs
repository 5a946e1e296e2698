//! Built-in functions available to embedded scripts.
//!
//! Reference: php-src/ext/standard/basic_functions.stub.php

use php_rs_runtime::ErrorLevel;

use crate::json::{json_encode, JSON_THROW_ON_ERROR};
use crate::sapi::{ExistsCheck, HeaderOp};
use crate::value::{is_numeric_str, ArrayKey, PhpArray, Value};
use crate::variables::{print_r, serialize, unserialize, var_dump, var_export};
use crate::vm::{instance_of, ExecResult, Interrupt, Vm};

/// Names of every built-in function, lowercase.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "array_key_exists",
    "array_keys",
    "array_map",
    "array_values",
    "boolval",
    "call_user_func",
    "count",
    "doubleval",
    "error_get_last",
    "error_log",
    "error_reporting",
    "floatval",
    "function_exists",
    "get_class",
    "gettype",
    "header",
    "header_remove",
    "implode",
    "in_array",
    "ini_get",
    "ini_restore",
    "ini_set",
    "intval",
    "is_array",
    "is_bool",
    "is_callable",
    "is_double",
    "is_float",
    "is_int",
    "is_integer",
    "is_long",
    "is_null",
    "is_numeric",
    "is_object",
    "is_scalar",
    "is_string",
    "json_encode",
    "json_last_error",
    "json_last_error_msg",
    "php_sapi_name",
    "print_r",
    "property_exists",
    "serialize",
    "str_contains",
    "str_repeat",
    "strlen",
    "strtolower",
    "strtoupper",
    "strval",
    "trigger_error",
    "trim",
    "unserialize",
    "user_error",
    "var_dump",
    "var_export",
];

impl Vm {
    pub(crate) fn builtin_exists(&self, name: &str) -> bool {
        BUILTIN_FUNCTIONS.binary_search(&name).is_ok()
    }

    /// Run a built-in by lowercase name; None if there is no such built-in.
    pub(crate) fn call_builtin(&mut self, name: &str, args: &[Value]) -> Option<ExecResult<Value>> {
        if !self.builtin_exists(name) {
            return None;
        }
        Some(self.dispatch_builtin(name, args))
    }

    fn dispatch_builtin(&mut self, name: &str, args: &[Value]) -> ExecResult<Value> {
        match name {
            // ── Strings ─────────────────────────────────────────────────────
            "strlen" => {
                self.expect_args(name, args, 1, 1)?;
                let s = self.string_arg(name, args, 0, "string")?;
                Ok(Value::Long(s.len() as i64))
            }
            "strtoupper" | "strtolower" => {
                self.expect_args(name, args, 1, 1)?;
                let s = self.string_arg(name, args, 0, "string")?;
                Ok(Value::String(if name == "strtoupper" {
                    s.to_ascii_uppercase()
                } else {
                    s.to_ascii_lowercase()
                }))
            }
            "str_repeat" => {
                self.expect_args(name, args, 2, 2)?;
                let s = self.string_arg(name, args, 0, "string")?;
                let times = self.int_arg(name, args, 1, "times")?;
                if times < 0 {
                    return self.throw_error(
                        "ValueError",
                        "str_repeat(): Argument #2 ($times) must be greater than or equal to 0",
                    );
                }
                let times = times as usize;
                self.reserve(s.len().checked_mul(times))?;
                Ok(Value::String(s.repeat(times)))
            }
            "str_contains" => {
                self.expect_args(name, args, 2, 2)?;
                let haystack = self.string_arg(name, args, 0, "haystack")?;
                let needle = self.string_arg(name, args, 1, "needle")?;
                Ok(Value::Bool(haystack.contains(&needle)))
            }
            "trim" => {
                self.expect_args(name, args, 1, 2)?;
                let s = self.string_arg(name, args, 0, "string")?;
                let chars = match args.get(1) {
                    Some(_) => self.string_arg(name, args, 1, "characters")?,
                    None => " \n\r\t\u{0B}\0".to_string(),
                };
                Ok(Value::string(s.trim_matches(|c: char| chars.contains(c))))
            }
            "implode" => {
                self.expect_args(name, args, 1, 2)?;
                let (separator, pieces) = match (&args[0], args.get(1)) {
                    (Value::Array(arr), None) => (String::new(), arr.clone()),
                    (_, Some(Value::Array(arr))) => {
                        (self.string_arg(name, args, 0, "separator")?, arr.clone())
                    }
                    (_, None) => {
                        return self.throw_error(
                            "TypeError",
                            "implode(): Argument #1 ($pieces) must be of type array, string given",
                        )
                    }
                    (_, Some(other)) => {
                        return self.throw_error(
                            "TypeError",
                            format!(
                                "implode(): Argument #2 ($array) must be of type ?array, {} given",
                                other.type_name()
                            ),
                        )
                    }
                };
                let mut parts = Vec::with_capacity(pieces.len());
                for value in pieces.values() {
                    parts.push(self.stringify(value)?);
                }
                Ok(Value::String(parts.join(&separator)))
            }

            // ── Types ───────────────────────────────────────────────────────
            "is_array" | "is_bool" | "is_callable" | "is_double" | "is_float" | "is_int"
            | "is_integer" | "is_long" | "is_null" | "is_numeric" | "is_object"
            | "is_scalar" | "is_string" => {
                self.expect_args(name, args, 1, 1)?;
                let value = &args[0];
                let result = match name {
                    "is_array" => matches!(value, Value::Array(_)),
                    "is_bool" => matches!(value, Value::Bool(_)),
                    "is_double" | "is_float" => matches!(value, Value::Double(_)),
                    "is_int" | "is_integer" | "is_long" => matches!(value, Value::Long(_)),
                    "is_null" => value.is_null(),
                    "is_object" => matches!(value, Value::Object(_)),
                    "is_string" => matches!(value, Value::String(_)),
                    "is_scalar" => matches!(
                        value,
                        Value::Bool(_) | Value::Long(_) | Value::Double(_) | Value::String(_)
                    ),
                    "is_numeric" => match value {
                        Value::Long(_) | Value::Double(_) => true,
                        Value::String(s) => is_numeric_str(s),
                        _ => false,
                    },
                    _ => match value {
                        Value::String(s) => self.function_exists(s),
                        Value::Object(obj) => obj.closure().is_some(),
                        _ => false,
                    },
                };
                Ok(Value::Bool(result))
            }
            "gettype" => {
                self.expect_args(name, args, 1, 1)?;
                Ok(Value::string(args[0].gettype()))
            }
            "get_class" => {
                self.expect_args(name, args, 0, 1)?;
                match args.first() {
                    Some(Value::Object(obj)) => Ok(Value::String(obj.class_name())),
                    Some(other) => self.throw_error(
                        "TypeError",
                        format!(
                            "get_class(): Argument #1 ($object) must be of type object, {} given",
                            other.type_name()
                        ),
                    ),
                    None => self.throw_error(
                        "Error",
                        "get_class() without arguments must be called from within a class",
                    ),
                }
            }
            "intval" => {
                self.expect_args(name, args, 1, 2)?;
                let base = match args.get(1) {
                    Some(_) => self.int_arg(name, args, 1, "base")?,
                    None => 10,
                };
                Ok(Value::Long(match &args[0] {
                    Value::String(s) if base != 10 => parse_int_base(s, base),
                    other => other.to_long(),
                }))
            }
            "floatval" | "doubleval" => {
                self.expect_args(name, args, 1, 1)?;
                Ok(Value::Double(args[0].to_double()))
            }
            "strval" => {
                self.expect_args(name, args, 1, 1)?;
                Ok(Value::String(self.stringify(&args[0])?))
            }
            "boolval" => {
                self.expect_args(name, args, 1, 1)?;
                Ok(Value::Bool(args[0].to_bool()))
            }

            // ── Arrays ──────────────────────────────────────────────────────
            "count" => {
                self.expect_args(name, args, 1, 2)?;
                let recursive = match args.get(1) {
                    Some(_) => self.int_arg(name, args, 1, "mode")? == 1,
                    None => false,
                };
                match &args[0] {
                    Value::Array(arr) => Ok(Value::Long(count_array(arr, recursive))),
                    other => self.throw_error(
                        "TypeError",
                        format!(
                            "count(): Argument #1 ($value) must be of type Countable|array, {} given",
                            other.type_name()
                        ),
                    ),
                }
            }
            "array_keys" | "array_values" => {
                self.expect_args(name, args, 1, 1)?;
                let arr = self.array_arg(name, args, 0)?;
                let result: PhpArray = if name == "array_keys" {
                    arr.keys().map(ArrayKey::to_value).collect()
                } else {
                    arr.values().cloned().collect()
                };
                Ok(Value::Array(result))
            }
            "in_array" => {
                self.expect_args(name, args, 2, 3)?;
                let arr = self.array_arg(name, args, 1)?;
                let strict = args.get(2).is_some_and(Value::to_bool);
                let needle = &args[0];
                let found = arr.values().any(|value| {
                    if strict {
                        value.strict_eq(needle)
                    } else {
                        value.loose_eq(needle)
                    }
                });
                Ok(Value::Bool(found))
            }
            "array_key_exists" => {
                self.expect_args(name, args, 2, 2)?;
                let arr = self.array_arg(name, args, 1)?;
                let key = match &args[0] {
                    Value::Null => Some(ArrayKey::String(String::new())),
                    other => ArrayKey::from_value(other),
                };
                match key {
                    Some(key) => Ok(Value::Bool(arr.contains_key(&key))),
                    None => self.throw_error(
                        "TypeError",
                        "array_key_exists(): Argument #1 ($key) must be a valid array offset type",
                    ),
                }
            }
            "array_map" => {
                self.expect_args(name, args, 2, 2)?;
                let arr = self.array_arg(name, args, 1)?;
                let mut out = PhpArray::new();
                for (key, value) in arr.iter() {
                    let mapped = if args[0].is_null() {
                        value.clone()
                    } else {
                        self.call_value(&args[0], vec![value.clone()])?
                    };
                    out.insert(key.clone(), mapped);
                }
                Ok(Value::Array(out))
            }

            // ── Functions ───────────────────────────────────────────────────
            "call_user_func" => {
                self.expect_args(name, args, 1, usize::MAX)?;
                self.call_value(&args[0], args[1..].to_vec())
            }
            "function_exists" => {
                self.expect_args(name, args, 1, 1)?;
                let function = self.string_arg(name, args, 0, "function")?;
                Ok(Value::Bool(self.function_exists(&function)))
            }
            "property_exists" => {
                self.expect_args(name, args, 2, 2)?;
                let property = self.string_arg(name, args, 1, "property")?;
                Ok(Value::Bool(match &args[0] {
                    Value::Object(obj) => match obj.receiver() {
                        Some(id) => self.sapi.receiver_exists(id, &property, ExistsCheck::Exists),
                        None => obj.borrow().properties.contains_key(&property),
                    },
                    _ => false,
                }))
            }

            // ── Variable handling ───────────────────────────────────────────
            "serialize" => {
                self.expect_args(name, args, 1, 1)?;
                match serialize(&args[0], self.serialize_precision()) {
                    Ok(text) => Ok(Value::String(text)),
                    Err(err) => self.throw_error("Exception", err.to_string()),
                }
            }
            "unserialize" => {
                self.expect_args(name, args, 1, 2)?;
                let data = self.string_arg(name, args, 0, "data")?;
                match unserialize(&data) {
                    Ok(value) => Ok(value),
                    Err(offset) => {
                        self.report(
                            ErrorLevel::Notice,
                            format!(
                                "unserialize(): Error at offset {} of {} bytes",
                                offset,
                                data.len()
                            ),
                        );
                        Ok(Value::Bool(false))
                    }
                }
            }
            "var_export" => {
                self.expect_args(name, args, 1, 2)?;
                let text = var_export(&args[0], self.serialize_precision());
                if args.get(1).is_some_and(Value::to_bool) {
                    return Ok(Value::String(text));
                }
                self.echo(&text);
                Ok(Value::Null)
            }
            "var_dump" => {
                self.expect_args(name, args, 1, usize::MAX)?;
                for value in args {
                    let text = var_dump(value, self.serialize_precision());
                    self.echo(&text);
                }
                Ok(Value::Null)
            }
            "print_r" => {
                self.expect_args(name, args, 1, 2)?;
                let text = print_r(&args[0], self.precision());
                if args.get(1).is_some_and(Value::to_bool) {
                    return Ok(Value::String(text));
                }
                self.echo(&text);
                Ok(Value::Bool(true))
            }
            "json_encode" => {
                self.expect_args(name, args, 1, 3)?;
                let flags = match args.get(1) {
                    Some(_) => self.int_arg(name, args, 1, "flags")? as u32,
                    None => 0,
                };
                match json_encode(&args[0], flags, self.serialize_precision()) {
                    Ok(text) => {
                        self.json_error = None;
                        Ok(Value::String(text))
                    }
                    Err(err) if flags & JSON_THROW_ON_ERROR != 0 => Err(Interrupt::Throw(
                        self.create_exception("JsonException", err.to_string(), err.code()),
                    )),
                    Err(err) => {
                        self.json_error = Some(err);
                        Ok(Value::Bool(false))
                    }
                }
            }
            "json_last_error" => {
                self.expect_args(name, args, 0, 0)?;
                Ok(Value::Long(self.json_error.map_or(0, |err| err.code())))
            }
            "json_last_error_msg" => {
                self.expect_args(name, args, 0, 0)?;
                Ok(Value::String(match self.json_error {
                    Some(err) => err.to_string(),
                    None => "No error".to_string(),
                }))
            }

            // ── Errors and configuration ────────────────────────────────────
            "trigger_error" | "user_error" => {
                self.expect_args(name, args, 1, 2)?;
                let message = self.string_arg(name, args, 0, "message")?;
                let level = match args.get(1) {
                    Some(_) => self.int_arg(name, args, 1, "error_level")?,
                    None => ErrorLevel::UserNotice.mask() as i64,
                };
                let level = match ErrorLevel::from_u32(level as u32) {
                    Some(ErrorLevel::UserError) => {
                        return self.fatal(ErrorLevel::UserError, message);
                    }
                    Some(
                        level @ (ErrorLevel::UserWarning
                        | ErrorLevel::UserNotice
                        | ErrorLevel::UserDeprecated),
                    ) => level,
                    _ => {
                        return self.throw_error(
                            "ValueError",
                            format!(
                                "{}(): Argument #2 ($error_level) must be one of E_USER_ERROR, E_USER_WARNING, E_USER_NOTICE, or E_USER_DEPRECATED",
                                name
                            ),
                        )
                    }
                };
                self.report(level, message);
                Ok(Value::Bool(true))
            }
            "error_log" => {
                self.expect_args(name, args, 1, 4)?;
                let message = self.string_arg(name, args, 0, "message")?;
                self.sapi.log(self.context, &format!("{}\n", message));
                Ok(Value::Bool(true))
            }
            "error_reporting" => {
                self.expect_args(name, args, 0, 1)?;
                let old = self.errors.error_reporting() as i64;
                if let Some(level) = args.first() {
                    if !level.is_null() {
                        let level = level.to_long().to_string();
                        self.ini.set("error_reporting", level.as_str());
                        self.errors.apply_ini("error_reporting", &level);
                    }
                }
                Ok(Value::Long(old))
            }
            "error_get_last" => {
                self.expect_args(name, args, 0, 0)?;
                Ok(match self.errors.last_error() {
                    None => Value::Null,
                    Some(error) => {
                        let mut arr = PhpArray::new();
                        arr.insert(ArrayKey::from_string("type"), Value::Long(error.level.mask() as i64));
                        arr.insert(ArrayKey::from_string("message"), Value::String(error.message.clone()));
                        arr.insert(
                            ArrayKey::from_string("file"),
                            Value::String(error.file.clone().unwrap_or_default()),
                        );
                        arr.insert(
                            ArrayKey::from_string("line"),
                            Value::Long(error.line.unwrap_or(0) as i64),
                        );
                        Value::Array(arr)
                    }
                })
            }
            "ini_get" => {
                self.expect_args(name, args, 1, 1)?;
                let directive = self.string_arg(name, args, 0, "option")?;
                Ok(match self.ini.get_entry(&directive) {
                    Some(entry) => Value::String(entry.value.clone()),
                    None => Value::Bool(false),
                })
            }
            "ini_set" => {
                self.expect_args(name, args, 2, 2)?;
                let directive = self.string_arg(name, args, 0, "option")?;
                let value = match &args[1] {
                    Value::Bool(b) => if *b { "1" } else { "" }.to_string(),
                    _ => self.string_arg(name, args, 1, "value")?,
                };
                match self.ini.set(&directive, value.as_str()) {
                    Some(old) => {
                        self.errors.apply_ini(&directive, &value);
                        Ok(Value::String(old))
                    }
                    None => Ok(Value::Bool(false)),
                }
            }
            "ini_restore" => {
                self.expect_args(name, args, 1, 1)?;
                let directive = self.string_arg(name, args, 0, "option")?;
                self.ini.restore(&directive);
                let value = self.ini.get(&directive).to_string();
                self.errors.apply_ini(&directive, &value);
                Ok(Value::Null)
            }

            // ── SAPI ────────────────────────────────────────────────────────
            "header" => {
                self.expect_args(name, args, 1, 3)?;
                let line = self.string_arg(name, args, 0, "header")?;
                let replace = args.get(1).map_or(true, Value::to_bool);
                // Status lines are not forwarded to the host
                if !line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("HTTP/")) {
                    let op = if replace { HeaderOp::Replace } else { HeaderOp::Append };
                    self.sapi.set_header(self.context, op, &line);
                }
                Ok(Value::Null)
            }
            "header_remove" => {
                self.expect_args(name, args, 0, 1)?;
                match args.first() {
                    Some(value) if !value.is_null() => {
                        let header = self.string_arg(name, args, 0, "name")?;
                        self.sapi.set_header(self.context, HeaderOp::Delete, &header);
                    }
                    _ => self.sapi.set_header(self.context, HeaderOp::DeleteAll, ""),
                }
                Ok(Value::Null)
            }
            "php_sapi_name" => {
                self.expect_args(name, args, 0, 0)?;
                Ok(Value::string(self.sapi.name()))
            }

            _ => self.throw_error("Error", format!("Call to undefined function {}()", name)),
        }
    }

    // ── Argument helpers ────────────────────────────────────────────────────

    fn expect_args(&self, name: &str, args: &[Value], min: usize, max: usize) -> ExecResult<()> {
        if args.len() >= min && args.len() <= max {
            return Ok(());
        }
        let (bound, expected) = if min == max {
            ("exactly", min)
        } else if args.len() < min {
            ("at least", min)
        } else {
            ("at most", max)
        };
        self.throw_error(
            "ArgumentCountError",
            format!(
                "{}() expects {} {} argument{}, {} given",
                name,
                bound,
                expected,
                if expected == 1 { "" } else { "s" },
                args.len()
            ),
        )
    }

    /// A `string` parameter under coercive typing.
    fn string_arg(&mut self, name: &str, args: &[Value], index: usize, param: &str) -> ExecResult<String> {
        match &args[index] {
            Value::Null => {
                self.report(
                    ErrorLevel::Deprecated,
                    format!(
                        "{}(): Passing null to parameter #{} (${}) of type string is deprecated",
                        name,
                        index + 1,
                        param
                    ),
                );
                Ok(String::new())
            }
            Value::Array(_) => self.type_error(name, index, param, "string", &args[index]),
            Value::Object(obj) if !instance_of(&obj.class_name(), "Throwable") => {
                self.type_error(name, index, param, "string", &args[index])
            }
            value => self.stringify(value),
        }
    }

    /// An `int` parameter under coercive typing.
    fn int_arg(&mut self, name: &str, args: &[Value], index: usize, param: &str) -> ExecResult<i64> {
        match &args[index] {
            Value::Long(n) => Ok(*n),
            Value::Bool(b) => Ok(*b as i64),
            Value::Double(f) if f.is_finite() => Ok(*f as i64),
            Value::String(s) if is_numeric_str(s) => Ok(args[index].to_long()),
            Value::Null => {
                self.report(
                    ErrorLevel::Deprecated,
                    format!(
                        "{}(): Passing null to parameter #{} (${}) of type int is deprecated",
                        name,
                        index + 1,
                        param
                    ),
                );
                Ok(0)
            }
            other => self.type_error(name, index, param, "int", other),
        }
    }

    fn array_arg(&self, name: &str, args: &[Value], index: usize) -> ExecResult<PhpArray> {
        match &args[index] {
            Value::Array(arr) => Ok(arr.clone()),
            other => self.type_error(name, index, "array", "array", other),
        }
    }

    fn type_error<T>(&self, name: &str, index: usize, param: &str, expected: &str, given: &Value) -> ExecResult<T> {
        self.throw_error(
            "TypeError",
            format!(
                "{}(): Argument #{} (${}) must be of type {}, {} given",
                name,
                index + 1,
                param,
                expected,
                given.type_name()
            ),
        )
    }
}

fn count_array(arr: &PhpArray, recursive: bool) -> i64 {
    let mut total = arr.len() as i64;
    if recursive {
        for value in arr.values() {
            if let Value::Array(inner) = value {
                total += count_array(inner, true);
            }
        }
    }
    total
}

/// intval() with an explicit base; base 0 picks it from the prefix.
fn parse_int_base(s: &str, base: i64) -> i64 {
    let s = s.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let lower = s.to_ascii_lowercase();
    let (base, digits) = match base {
        16 | 0 if lower.starts_with("0x") => (16, &s[2..]),
        8 | 0 if lower.starts_with("0o") => (8, &s[2..]),
        2 | 0 if lower.starts_with("0b") => (2, &s[2..]),
        0 if lower.starts_with('0') && s.len() > 1 => (8, &s[1..]),
        0 => (10, s),
        base => (base, s),
    };
    if !(2..=36).contains(&base) {
        return 0;
    }
    let mut value: i64 = 0;
    for ch in digits.chars() {
        let Some(digit) = ch.to_digit(base as u32) else {
            break;
        };
        value = match value.checked_mul(base).and_then(|v| v.checked_add(digit as i64)) {
            Some(v) => v,
            None => return if negative { i64::MIN } else { i64::MAX },
        };
    }
    if negative {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use crate::sapi::HeaderOp;
    use crate::value::Value;
    use crate::vm::tests::new_vm;
    use crate::vm::VmError;

    use super::{parse_int_base, BUILTIN_FUNCTIONS};

    fn output_of(code: &str) -> String {
        let (mut vm, sapi) = new_vm();
        vm.eval(code).unwrap_or_else(|e| panic!("eval failed: {:?}", e));
        sapi.output()
    }

    #[test]
    fn test_builtin_table_is_sorted() {
        let mut sorted = BUILTIN_FUNCTIONS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, BUILTIN_FUNCTIONS);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            output_of("echo strlen('héllo'), strtoupper('abc'), trim('  x  '), str_repeat('ab', 2);"),
            "6ABCxabab"
        );
        assert_eq!(output_of("echo implode(', ', [1, 'two', 3.5]);"), "1, two, 3.5");
    }

    #[test]
    fn test_strlen_without_arguments_throws() {
        let (mut vm, sapi) = new_vm();
        let err = vm.eval("strlen();").unwrap_err();
        assert_eq!(
            err,
            VmError::Uncaught {
                class: "ArgumentCountError".to_string(),
                message: "strlen() expects exactly 1 argument, 0 given".to_string()
            }
        );
        assert!(sapi
            .log
            .borrow()
            .contains("Uncaught ArgumentCountError: strlen() expects exactly 1 argument, 0 given"));
    }

    #[test]
    fn test_str_repeat_respects_memory_limit() {
        let (mut vm, sapi) = new_vm();
        assert_eq!(
            vm.eval("return strlen(str_repeat('ab', PHP_INT_MAX));"),
            Err(VmError::Fatal("Possible integer overflow in memory allocation".to_string()))
        );
        assert_eq!(
            sapi.log.borrow().as_str(),
            "PHP Fatal error:  Possible integer overflow in memory allocation in php-rs-engine on line 1\n"
        );

        let (mut vm, _) = new_vm();
        vm.ini_set("memory_limit", "1K");
        assert!(matches!(
            vm.eval("return str_repeat('x', 2048);"),
            Err(VmError::Fatal(message)) if message.starts_with("Allowed memory size of 1024 bytes")
        ));
        assert_eq!(vm.eval("return str_repeat('', PHP_INT_MAX);"), Ok(Value::string("")));
        assert_eq!(vm.eval("return strlen(str_repeat('x', 1000));"), Ok(Value::Long(1000)));
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(
            output_of("try { strlen([]); } catch (TypeError $e) { echo $e->getMessage(); }"),
            "strlen(): Argument #1 ($string) must be of type string, array given"
        );
        assert_eq!(
            output_of("try { count(5); } catch (TypeError $e) { echo $e->getMessage(); }"),
            "count(): Argument #1 ($value) must be of type Countable|array, int given"
        );
    }

    #[test]
    fn test_type_predicates() {
        assert_eq!(
            output_of("var_dump(is_int(1), is_numeric('1e3'), is_numeric('abc'), is_callable('strlen'), gettype(1.5));"),
            "bool(true)\nbool(true)\nbool(false)\nbool(true)\nstring(6) \"double\"\n"
        );
    }

    #[test]
    fn test_intval_bases() {
        assert_eq!(parse_int_base("ff", 16), 255);
        assert_eq!(parse_int_base("0x1A", 16), 26);
        assert_eq!(parse_int_base("0x1A", 0), 26);
        assert_eq!(parse_int_base("012", 0), 10);
        assert_eq!(parse_int_base("-101", 2), -5);
        assert_eq!(output_of("echo intval('42abc'), intval('z', 36);"), "4235");
    }

    #[test]
    fn test_array_functions() {
        assert_eq!(
            output_of(
                "$a = ['x' => 1, 'y' => [2, 3]];
                 echo count($a), count($a, COUNT_RECURSIVE), implode(',', array_keys($a)),
                     in_array('1', $a) ? 'y' : 'n', in_array('1', $a, true) ? 'y' : 'n',
                     array_key_exists('y', $a) ? 'y' : 'n';
                 echo implode(',', array_map(fn($v) => $v * 2, [1, 2]));"
            ),
            "24x,yyny2,4"
        );
    }

    #[test]
    fn test_serialize_and_unserialize() {
        assert_eq!(output_of("echo serialize(['a' => true]);"), "a:1:{s:1:\"a\";b:1;}");
        let (mut vm, sapi) = new_vm();
        assert_eq!(vm.eval("return unserialize('i:12');"), Ok(Value::Bool(false)));
        assert_eq!(
            sapi.log.borrow().as_str(),
            "PHP Notice:  unserialize(): Error at offset 2 of 4 bytes in php-rs-engine on line 1\n"
        );
        assert_eq!(
            output_of("try { serialize(fn() => 1); } catch (Exception $e) { echo $e->getMessage(); }"),
            "Serialization of 'Closure' is not allowed"
        );
    }

    #[test]
    fn test_json_encode() {
        assert_eq!(
            output_of("echo json_encode(['Goodbye', 'Doge']), json_encode(['a' => 1.0]);"),
            "[\"Goodbye\",\"Doge\"]{\"a\":1}"
        );
        assert_eq!(
            output_of("var_dump(json_encode(NAN)); echo json_last_error(), json_last_error_msg();"),
            "bool(false)\n7Inf and NaN cannot be JSON encoded"
        );
        assert_eq!(
            output_of("try { json_encode(INF, JSON_THROW_ON_ERROR); } catch (JsonException $e) { echo $e->getCode(); }"),
            "7"
        );
    }

    #[test]
    fn test_trigger_error_levels() {
        let (mut vm, sapi) = new_vm();
        vm.eval("trigger_error('Test Error');").unwrap();
        assert_eq!(
            sapi.log.borrow().as_str(),
            "PHP Notice:  Test Error in php-rs-engine on line 1\n"
        );
        assert_eq!(
            vm.eval("trigger_error('Stop', E_USER_ERROR); echo 'after';"),
            Err(VmError::Fatal("Stop".to_string()))
        );
        assert_eq!(sapi.output(), "");
        assert!(matches!(
            vm.eval("trigger_error('x', E_WARNING);"),
            Err(VmError::Uncaught { ref class, .. }) if class == "ValueError"
        ));
    }

    #[test]
    fn test_error_log_goes_to_sapi_log() {
        let (mut vm, sapi) = new_vm();
        vm.eval("error_log('plain message');").unwrap();
        assert_eq!(sapi.log.borrow().as_str(), "plain message\n");
    }

    #[test]
    fn test_error_reporting_and_last_error() {
        let (mut vm, sapi) = new_vm();
        let old = vm.eval("return error_reporting(0);").unwrap();
        assert_eq!(old, Value::Long(32767));
        vm.eval("$x = $undefined;").unwrap();
        assert_eq!(sapi.log.borrow().as_str(), "");
        assert_eq!(
            vm.eval("return error_get_last()['message'];"),
            Ok(Value::string("Undefined variable $undefined"))
        );
    }

    #[test]
    fn test_ini_functions() {
        let (mut vm, _) = new_vm();
        assert_eq!(vm.eval("return ini_get('precision');"), Ok(Value::string("14")));
        assert_eq!(vm.eval("return ini_get('no_such_directive');"), Ok(Value::Bool(false)));
        assert_eq!(vm.eval("return ini_set('precision', '4');"), Ok(Value::string("14")));
        assert_eq!(vm.eval("return (string) (1/3);"), Ok(Value::string("0.3333")));
        vm.eval("ini_restore('precision');").unwrap();
        assert_eq!(vm.ini().get("precision"), "14");
    }

    #[test]
    fn test_header_functions() {
        let (mut vm, sapi) = new_vm();
        vm.eval(
            "header('X-A: 1'); header('X-A: 2', false); header('HTTP/1.1 404 Not Found');
             header_remove('X-A'); header_remove();",
        )
        .unwrap();
        assert_eq!(
            *sapi.headers.borrow(),
            vec![
                (HeaderOp::Replace, "X-A: 1".to_string()),
                (HeaderOp::Append, "X-A: 2".to_string()),
                (HeaderOp::Delete, "X-A".to_string()),
                (HeaderOp::DeleteAll, String::new()),
            ]
        );
    }

    #[test]
    fn test_var_output_functions() {
        assert_eq!(output_of("var_export([1, 'a' => false]);"), "array (\n  0 => 1,\n  'a' => false,\n)");
        assert_eq!(output_of("echo print_r([1], true);"), "Array\n(\n    [0] => 1\n)\n");
        assert_eq!(output_of("echo php_sapi_name();"), "embed");
    }
}

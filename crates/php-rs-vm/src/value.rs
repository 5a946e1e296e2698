//! PHP value type for VM execution.
//!
//! The zval equivalent: scalars by value, arrays as ordered hash maps with
//! copy-on-assign semantics, objects as shared handles.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::sapi::ObjectId;
use crate::vm::Closure;

/// Default `precision` INI value, used where no request is at hand.
pub const DEFAULT_PRECISION: i64 = 14;

/// A PHP value used during VM execution.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Array(PhpArray),
    Object(ObjectRef),
}

/// Failure of an arithmetic operator; the VM turns these into
/// `DivisionByZeroError` / `TypeError` exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperatorError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Unsupported operand types: {lhs} {op} {rhs}")]
    Unsupported {
        op: &'static str,
        lhs: String,
        rhs: String,
    },
}

impl Value {
    /// Shorthand for a string value.
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    // =========================================================================
    // Type information
    // =========================================================================

    /// Type name as used in PHP 8 error messages (`int`, `array`, class name).
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Long(_) => "int".to_string(),
            Value::Double(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(o) => o.class_name(),
        }
    }

    /// Result of gettype().
    pub fn gettype(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Long(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    // =========================================================================
    // Type coercion (PHP semantics)
    // =========================================================================

    /// Convert to PHP integer (matching PHP's type juggling).
    pub fn to_long(&self) -> i64 {
        match self {
            Value::Null => 0,
            Value::Bool(b) => *b as i64,
            Value::Long(n) => *n,
            Value::Double(f) => double_to_long(*f),
            Value::String(s) => match numeric_prefix(s) {
                Some(Numeric::Long(n)) => n,
                Some(Numeric::Double(f)) => double_to_long(f),
                None => 0,
            },
            Value::Array(a) => !a.is_empty() as i64,
            Value::Object(_) => 1,
        }
    }

    /// Convert to PHP float.
    pub fn to_double(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => *b as i64 as f64,
            Value::Long(n) => *n as f64,
            Value::Double(f) => *f,
            Value::String(s) => match numeric_prefix(s) {
                Some(Numeric::Long(n)) => n as f64,
                Some(Numeric::Double(f)) => f,
                None => 0.0,
            },
            Value::Array(a) => !a.is_empty() as i64 as f64,
            Value::Object(_) => 1.0,
        }
    }

    /// Convert to PHP boolean.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Long(n) => *n != 0,
            Value::Double(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Array(a) => !a.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Convert to PHP string with the default `precision`. Objects have no
    /// string form here and yield `""`; the VM raises the conversion error.
    pub fn to_php_string(&self) -> String {
        self.to_php_string_with(DEFAULT_PRECISION)
    }

    /// Convert to PHP string, formatting floats with `precision` digits.
    pub fn to_php_string_with(&self, precision: i64) -> String {
        match self {
            Value::Null | Value::Bool(false) => String::new(),
            Value::Bool(true) => "1".to_string(),
            Value::Long(n) => n.to_string(),
            Value::Double(f) => format_double(*f, precision),
            Value::String(s) => s.clone(),
            Value::Array(_) => "Array".to_string(),
            Value::Object(_) => String::new(),
        }
    }

    /// `(array)` cast.
    pub fn to_array(&self) -> PhpArray {
        match self {
            Value::Null => PhpArray::new(),
            Value::Array(a) => a.clone(),
            Value::Object(o) => {
                let mut arr = PhpArray::new();
                for (name, value) in &o.borrow().properties {
                    arr.insert(ArrayKey::from_string(name), value.clone());
                }
                arr
            }
            other => {
                let mut arr = PhpArray::new();
                arr.push(other.clone());
                arr
            }
        }
    }

    /// Numeric value for arithmetic, or None for arrays, objects and
    /// non-numeric strings (PHP 8 throws for those). Leading-numeric strings
    /// ("5 apples") use their prefix.
    fn to_numeric(&self) -> Option<Numeric> {
        match self {
            Value::Null => Some(Numeric::Long(0)),
            Value::Bool(b) => Some(Numeric::Long(*b as i64)),
            Value::Long(n) => Some(Numeric::Long(*n)),
            Value::Double(f) => Some(Numeric::Double(*f)),
            Value::String(s) => numeric_prefix(s),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    // =========================================================================
    // PHP comparison operators
    // =========================================================================

    /// Loose equality (==) using PHP 8 comparison rules.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Value::Object(a), Value::Object(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.class_name == b.class_name
                    && a.properties.len() == b.properties.len()
                    && a.properties
                        .iter()
                        .all(|(k, v)| b.properties.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Strict equality (===).
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb))
            }
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// PHP 8 ordering; None when the operands are uncomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Bool(a), _) => Some(a.cmp(&other.to_bool())),
            (_, Bool(b)) => Some(self.to_bool().cmp(b)),
            (Null, String(s)) => Some("".cmp(s.as_str())),
            (String(s), Null) => Some(s.as_str().cmp("")),
            (Null, _) => Some(false.cmp(&other.to_bool())),
            (_, Null) => Some(self.to_bool().cmp(&false)),
            (Long(a), Long(b)) => Some(a.cmp(b)),
            (Long(_) | Double(_), Long(_) | Double(_)) => {
                self.to_double().partial_cmp(&other.to_double())
            }
            (String(a), String(b)) => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(a.as_bytes().cmp(b.as_bytes())),
            },
            (Long(_) | Double(_), String(s)) => match parse_numeric(s) {
                Some(n) => self.to_numeric().and_then(|m| m.partial_cmp(&n)),
                None => Some(self.to_php_string().as_bytes().cmp(s.as_bytes())),
            },
            (String(s), Long(_) | Double(_)) => match parse_numeric(s) {
                Some(n) => other.to_numeric().and_then(|m| n.partial_cmp(&m)),
                None => Some(s.as_bytes().cmp(other.to_php_string().as_bytes())),
            },
            (Array(a), Array(b)) => {
                if a.len() != b.len() {
                    return Some(a.len().cmp(&b.len()));
                }
                for (key, va) in a.iter() {
                    let vb = b.get(key)?;
                    match va.compare(vb)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(Ordering::Equal)
            }
            (Array(_), _) => Some(Ordering::Greater),
            (_, Array(_)) => Some(Ordering::Less),
            (Object(a), Object(b)) => {
                if self.loose_eq(other) {
                    Some(Ordering::Equal)
                } else if a.class_name() == b.class_name() {
                    let (a, b) = (a.borrow(), b.borrow());
                    for (key, va) in &a.properties {
                        let vb = b.properties.get(key)?;
                        match va.compare(vb)? {
                            Ordering::Equal => continue,
                            unequal => return Some(unequal),
                        }
                    }
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
            (Object(_), _) => Some(Ordering::Greater),
            (_, Object(_)) => Some(Ordering::Less),
        }
    }

    /// PHP spaceship operator (<=>).
    pub fn spaceship(&self, other: &Value) -> i64 {
        match self.compare(other) {
            Some(Ordering::Less) => -1,
            Some(Ordering::Equal) => 0,
            Some(Ordering::Greater) | None => 1,
        }
    }

    /// PHP less-than comparison.
    pub fn is_smaller(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    /// PHP less-or-equal comparison.
    pub fn is_smaller_or_equal(&self, other: &Value) -> bool {
        matches!(
            self.compare(other),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    fn operands(
        &self,
        other: &Value,
        op: &'static str,
    ) -> Result<(Numeric, Numeric), OperatorError> {
        match (self.to_numeric(), other.to_numeric()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(OperatorError::Unsupported {
                op,
                lhs: self.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, OperatorError> {
        if let (Value::Array(a), Value::Array(b)) = (self, other) {
            return Ok(Value::Array(a.union(b)));
        }
        Ok(match self.operands(other, "+")? {
            (Numeric::Long(a), Numeric::Long(b)) => match a.checked_add(b) {
                Some(r) => Value::Long(r),
                None => Value::Double(a as f64 + b as f64),
            },
            (a, b) => Value::Double(a.as_f64() + b.as_f64()),
        })
    }

    pub fn sub(&self, other: &Value) -> Result<Value, OperatorError> {
        Ok(match self.operands(other, "-")? {
            (Numeric::Long(a), Numeric::Long(b)) => match a.checked_sub(b) {
                Some(r) => Value::Long(r),
                None => Value::Double(a as f64 - b as f64),
            },
            (a, b) => Value::Double(a.as_f64() - b.as_f64()),
        })
    }

    pub fn mul(&self, other: &Value) -> Result<Value, OperatorError> {
        Ok(match self.operands(other, "*")? {
            (Numeric::Long(a), Numeric::Long(b)) => match a.checked_mul(b) {
                Some(r) => Value::Long(r),
                None => Value::Double(a as f64 * b as f64),
            },
            (a, b) => Value::Double(a.as_f64() * b.as_f64()),
        })
    }

    pub fn div(&self, other: &Value) -> Result<Value, OperatorError> {
        let (a, b) = self.operands(other, "/")?;
        if b.as_f64() == 0.0 {
            return Err(OperatorError::DivisionByZero);
        }
        Ok(match (a, b) {
            (Numeric::Long(a), Numeric::Long(b)) if a % b == 0 && !(a == i64::MIN && b == -1) => {
                Value::Long(a / b)
            }
            (a, b) => Value::Double(a.as_f64() / b.as_f64()),
        })
    }

    pub fn modulo(&self, other: &Value) -> Result<Value, OperatorError> {
        self.operands(other, "%")?;
        let a = self.to_long();
        let b = other.to_long();
        if b == 0 {
            return Err(OperatorError::ModuloByZero);
        }
        Ok(Value::Long(a.wrapping_rem(b)))
    }

    pub fn pow(&self, other: &Value) -> Result<Value, OperatorError> {
        Ok(match self.operands(other, "**")? {
            (Numeric::Long(a), Numeric::Long(b)) if b >= 0 => {
                match u32::try_from(b).ok().and_then(|b| a.checked_pow(b)) {
                    Some(r) => Value::Long(r),
                    None => Value::Double((a as f64).powf(b as f64)),
                }
            }
            (a, b) => Value::Double(a.as_f64().powf(b.as_f64())),
        })
    }

    /// Unary minus.
    pub fn negate(&self) -> Result<Value, OperatorError> {
        match self.to_numeric() {
            Some(Numeric::Long(n)) => Ok(match n.checked_neg() {
                Some(r) => Value::Long(r),
                None => Value::Double(-(n as f64)),
            }),
            Some(Numeric::Double(f)) => Ok(Value::Double(-f)),
            None => Err(OperatorError::Unsupported {
                op: "*",
                lhs: self.type_name(),
                rhs: "int".to_string(),
            }),
        }
    }

    /// Unary plus: the numeric value of the operand.
    pub fn to_number(&self) -> Result<Value, OperatorError> {
        match self.to_numeric() {
            Some(Numeric::Long(n)) => Ok(Value::Long(n)),
            Some(Numeric::Double(f)) => Ok(Value::Double(f)),
            None => Err(OperatorError::Unsupported {
                op: "*",
                lhs: self.type_name(),
                rhs: "int".to_string(),
            }),
        }
    }

    pub fn bw_and(&self, other: &Value) -> Result<Value, OperatorError> {
        self.operands(other, "&")?;
        Ok(Value::Long(self.to_long() & other.to_long()))
    }

    pub fn bw_or(&self, other: &Value) -> Result<Value, OperatorError> {
        self.operands(other, "|")?;
        Ok(Value::Long(self.to_long() | other.to_long()))
    }

    pub fn bw_xor(&self, other: &Value) -> Result<Value, OperatorError> {
        self.operands(other, "^")?;
        Ok(Value::Long(self.to_long() ^ other.to_long()))
    }

    pub fn bw_not(&self) -> Result<Value, OperatorError> {
        match self {
            Value::Long(_) | Value::Double(_) => Ok(Value::Long(!self.to_long())),
            _ => Err(OperatorError::Unsupported {
                op: "~",
                lhs: self.type_name(),
                rhs: String::new(),
            }),
        }
    }

    /// Increment (++$a).
    pub fn increment(&self) -> Value {
        match self {
            Value::Long(n) => match n.checked_add(1) {
                Some(r) => Value::Long(r),
                None => Value::Double(*n as f64 + 1.0),
            },
            Value::Double(f) => Value::Double(f + 1.0),
            Value::Null => Value::Long(1),
            Value::String(s) => {
                // PHP alphanumeric increment: "a" -> "b", "z" -> "aa"
                if s.is_empty() {
                    return Value::String("1".to_string());
                }
                match parse_numeric(s) {
                    Some(Numeric::Long(n)) => Value::Long(n.wrapping_add(1)),
                    Some(Numeric::Double(f)) => Value::Double(f + 1.0),
                    None => Value::String(php_increment_string(s)),
                }
            }
            // PHP: booleans, arrays and objects are unaffected by ++
            _ => self.clone(),
        }
    }

    /// Decrement (--$a).
    pub fn decrement(&self) -> Value {
        match self {
            Value::Long(n) => match n.checked_sub(1) {
                Some(r) => Value::Long(r),
                None => Value::Double(*n as f64 - 1.0),
            },
            Value::Double(f) => Value::Double(f - 1.0),
            Value::String(s) => match parse_numeric(s) {
                Some(Numeric::Long(n)) => Value::Long(n.wrapping_sub(1)),
                Some(Numeric::Double(f)) => Value::Double(f - 1.0),
                None if s.is_empty() => Value::Long(-1),
                None => self.clone(),
            },
            // PHP: null is unaffected by --
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_php_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Double(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<PhpArray> for Value {
    fn from(a: PhpArray) -> Self {
        Value::Array(a)
    }
}

// =============================================================================
// Objects
// =============================================================================

thread_local! {
    static NEXT_OBJECT_ID: Cell<u64> = const { Cell::new(1) };
}

/// What backs an object beyond its property table.
#[derive(Debug, Clone)]
pub enum ObjectData {
    /// stdClass, exceptions and other property bags.
    Plain,
    /// An anonymous function (class `Closure`).
    Closure(Rc<Closure>),
    /// A host object reached through the SAPI receiver callbacks.
    Receiver(ObjectId),
}

/// A PHP object instance.
#[derive(Debug, Clone)]
pub struct PhpObject {
    /// The class name this object is an instance of.
    pub class_name: String,
    /// Instance properties (name → value), in declaration order.
    pub properties: IndexMap<String, Value>,
    /// Object handle, unique within the thread (spl_object_id).
    pub object_id: u64,
    pub data: ObjectData,
}

impl PhpObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self::with_data(class_name, ObjectData::Plain)
    }

    pub fn with_data(class_name: impl Into<String>, data: ObjectData) -> Self {
        let object_id = NEXT_OBJECT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            class_name: class_name.into(),
            properties: IndexMap::new(),
            object_id,
            data,
        }
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }
}

/// Shared handle to an object: assignment copies the handle, not the object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<PhpObject>>);

impl ObjectRef {
    pub fn new(object: PhpObject) -> Self {
        ObjectRef(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, PhpObject> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, PhpObject> {
        self.0.borrow_mut()
    }

    /// Same instance (===).
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> u64 {
        self.0.borrow().object_id
    }

    pub fn class_name(&self) -> String {
        self.0.borrow().class_name.clone()
    }

    /// Handle of the host object, for receiver instances.
    pub fn receiver(&self) -> Option<ObjectId> {
        match self.0.borrow().data {
            ObjectData::Receiver(id) => Some(id),
            _ => None,
        }
    }

    pub fn closure(&self) -> Option<Rc<Closure>> {
        match &self.0.borrow().data {
            ObjectData::Closure(closure) => Some(Rc::clone(closure)),
            _ => None,
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(o) => write!(f, "{}#{}", o.class_name, o.object_id),
            Err(_) => write!(f, "object(borrowed)"),
        }
    }
}

// =============================================================================
// PhpArray - ordered hash map
// =============================================================================

/// Key type for PHP arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    String(String),
}

impl ArrayKey {
    /// String key, normalised to an integer key when it is a canonical
    /// decimal integer ("12" → 12, but "012" stays a string).
    pub fn from_string(s: &str) -> ArrayKey {
        match s.parse::<i64>() {
            Ok(n) if n.to_string() == s => ArrayKey::Int(n),
            _ => ArrayKey::String(s.to_string()),
        }
    }

    /// Key for an offset value; None for illegal offset types.
    pub fn from_value(value: &Value) -> Option<ArrayKey> {
        Some(match value {
            Value::Null => ArrayKey::String(String::new()),
            Value::Bool(b) => ArrayKey::Int(*b as i64),
            Value::Long(n) => ArrayKey::Int(*n),
            Value::Double(f) => ArrayKey::Int(double_to_long(*f)),
            Value::String(s) => ArrayKey::from_string(s),
            Value::Array(_) | Value::Object(_) => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            ArrayKey::Int(n) => Value::Long(*n),
            ArrayKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(n) => write!(f, "{}", n),
            ArrayKey::String(s) => write!(f, "{}", s),
        }
    }
}

/// A PHP array: ordered map with integer and string keys.
#[derive(Debug, Clone, Default)]
pub struct PhpArray {
    entries: IndexMap<ArrayKey, Value>,
    next_int_key: i64,
}

impl PhpArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push a value with the next integer key.
    pub fn push(&mut self, value: Value) {
        let key = self.next_int_key;
        self.insert(ArrayKey::Int(key), value);
    }

    /// Insert or overwrite, keeping the position of an existing key.
    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        if let ArrayKey::Int(n) = key {
            if n >= self.next_int_key {
                self.next_int_key = n.saturating_add(1);
            }
        }
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_int(&self, key: i64) -> Option<&Value> {
        self.entries.get(&ArrayKey::Int(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries.get(&ArrayKey::from_string(key))
    }

    /// Slot for `key`, created as null when missing.
    pub fn entry_mut(&mut self, key: ArrayKey) -> &mut Value {
        if !self.entries.contains_key(&key) {
            self.insert(key.clone(), Value::Null);
        }
        self.entries.entry(key).or_default()
    }

    /// Slot for `$a[] = ...`.
    pub fn push_slot(&mut self) -> &mut Value {
        let key = ArrayKey::Int(self.next_int_key);
        self.entry_mut(key)
    }

    /// Remove by key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &ArrayKey) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    /// Keys are exactly 0..n-1 in order (array_is_list).
    pub fn is_list(&self) -> bool {
        self.entries
            .keys()
            .enumerate()
            .all(|(i, key)| *key == ArrayKey::Int(i as i64))
    }

    /// PHP array union: $a + $b (keeps existing keys from $a, adds new from $b).
    pub fn union(&self, other: &PhpArray) -> PhpArray {
        let mut result = self.clone();
        for (key, value) in other.iter() {
            if !result.contains_key(key) {
                result.insert(key.clone(), value.clone());
            }
        }
        result
    }
}

impl FromIterator<Value> for PhpArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut arr = PhpArray::new();
        for value in iter {
            arr.push(value);
        }
        arr
    }
}

impl FromIterator<(ArrayKey, Value)> for PhpArray {
    fn from_iter<I: IntoIterator<Item = (ArrayKey, Value)>>(iter: I) -> Self {
        let mut arr = PhpArray::new();
        for (key, value) in iter {
            arr.insert(key, value);
        }
        arr
    }
}

// =============================================================================
// Numeric strings and float formatting
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Long(i64),
    Double(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Long(n) => n as f64,
            Numeric::Double(f) => f,
        }
    }
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Long(a), Numeric::Long(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

fn double_to_long(f: f64) -> i64 {
    if !f.is_finite() {
        0
    } else if f >= i64::MAX as f64 || f < i64::MIN as f64 {
        // PHP 8 on 64-bit: out of range is undefined, modular in practice
        (f % 18446744073709551616.0) as i128 as i64
    } else {
        f as i64
    }
}

/// Length of the longest numeric prefix of `s` (after leading whitespace),
/// and whether it contains a fraction or exponent.
fn scan_number(s: &str) -> (usize, bool) {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    let mut is_float = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            is_float = true;
            i = j;
        }
    }
    if digits == 0 {
        return (0, false);
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            is_float = true;
            i = j;
        }
    }
    (i, is_float)
}

fn numeric_from(text: &str, is_float: bool) -> Option<Numeric> {
    if !is_float {
        if let Ok(n) = text.parse::<i64>() {
            return Some(Numeric::Long(n));
        }
    }
    text.parse::<f64>().ok().map(Numeric::Double)
}

/// Leading-numeric interpretation ("12abc" → 12), as used by casts.
fn numeric_prefix(s: &str) -> Option<Numeric> {
    let s = s.trim_start_matches([' ', '\t', '\n', '\r', '\x0B', '\x0C']);
    let (len, is_float) = scan_number(s);
    if len == 0 {
        return None;
    }
    numeric_from(&s[..len], is_float)
}

/// Whole-string numeric interpretation (PHP 8 numeric strings allow
/// surrounding whitespace).
fn parse_numeric(s: &str) -> Option<Numeric> {
    let s = s.trim_matches([' ', '\t', '\n', '\r', '\x0B', '\x0C']);
    let (len, is_float) = scan_number(s);
    if len == 0 || len != s.len() {
        return None;
    }
    numeric_from(s, is_float)
}

/// is_numeric()
pub fn is_numeric_str(s: &str) -> bool {
    parse_numeric(s).is_some()
}

/// Format a float like PHP's `%.*G` with the given `precision`; `-1` picks
/// the shortest representation that round-trips (`serialize_precision=-1`).
pub fn format_double(f: f64, precision: i64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let formatted = if precision < 0 {
        format!("{:e}", f.abs())
    } else {
        format!("{:.*e}", (precision.max(1) - 1) as usize, f.abs())
    };
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exponent: i64 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = match digits.trim_end_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let limit = if precision < 0 { 17 } else { precision.max(1) };

    let mut out = String::new();
    if f < 0.0 {
        out.push('-');
    }
    if exponent < -4 || exponent >= limit {
        out.push_str(&digits[..1]);
        out.push('.');
        if digits.len() > 1 {
            out.push_str(&digits[1..]);
        } else {
            out.push('0');
        }
        out.push('E');
        out.push(if exponent < 0 { '-' } else { '+' });
        out.push_str(&exponent.abs().to_string());
    } else if exponent < 0 {
        out.push_str("0.");
        for _ in 0..(-exponent - 1) {
            out.push('0');
        }
        out.push_str(digits);
    } else {
        let int_len = exponent as usize + 1;
        if digits.len() <= int_len {
            out.push_str(digits);
            for _ in digits.len()..int_len {
                out.push('0');
            }
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    }
    out
}

/// PHP-style alphanumeric string increment.
fn php_increment_string(s: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    let mut carry = true;

    for i in (0..chars.len()).rev() {
        if !carry {
            break;
        }
        let ch = chars[i];
        match ch {
            'a'..='y' | 'A'..='Y' | '0'..='8' => {
                chars[i] = (ch as u8 + 1) as char;
                carry = false;
            }
            'z' => chars[i] = 'a',
            'Z' => chars[i] = 'A',
            '9' => chars[i] = '0',
            _ => carry = false,
        }
    }

    if carry {
        // Prepend: "z" -> "aa", "Z" -> "AA", "9" -> "10"
        let prefix = match chars[0] {
            'a'..='z' => 'a',
            'A'..='Z' => 'A',
            _ => '1',
        };
        chars.insert(0, prefix);
    }

    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    #[test]
    fn test_to_long() {
        assert_eq!(Value::Null.to_long(), 0);
        assert_eq!(Value::Bool(true).to_long(), 1);
        assert_eq!(Value::Double(3.14159).to_long(), 3);
        assert_eq!(s("123").to_long(), 123);
        assert_eq!(s("12abc").to_long(), 12);
        assert_eq!(s("1e3").to_long(), 1000);
        assert_eq!(s("Hello World").to_long(), 0);
        assert_eq!(Value::Array(PhpArray::new()).to_long(), 0);
        assert_eq!(
            Value::Array([Value::Long(1)].into_iter().collect()).to_long(),
            1
        );
    }

    #[test]
    fn test_to_double() {
        assert_eq!(Value::Long(42).to_double(), 42.0);
        assert_eq!(s("1.5").to_double(), 1.5);
        assert_eq!(s(" .5x").to_double(), 0.5);
    }

    #[test]
    fn test_to_bool() {
        assert!(!Value::Null.to_bool());
        assert!(!Value::Long(0).to_bool());
        assert!(!s("").to_bool());
        assert!(!s("0").to_bool());
        assert!(s("0.0").to_bool());
        assert!(!Value::Array(PhpArray::new()).to_bool());
        assert!(Value::Object(ObjectRef::new(PhpObject::new("stdClass"))).to_bool());
    }

    #[test]
    fn test_to_string() {
        assert_eq!(Value::Null.to_php_string(), "");
        assert_eq!(Value::Bool(true).to_php_string(), "1");
        assert_eq!(Value::Bool(false).to_php_string(), "");
        assert_eq!(Value::Long(42).to_php_string(), "42");
        assert_eq!(Value::Double(3.14159).to_php_string(), "3.14159");
        assert_eq!(Value::Double(1.0).to_php_string(), "1");
        assert_eq!(Value::Array(PhpArray::new()).to_php_string(), "Array");
    }

    #[test]
    fn test_format_double_precision() {
        assert_eq!(format_double(0.1 + 0.2, 14), "0.3");
        assert_eq!(format_double(0.1 + 0.2, -1), "0.30000000000000004");
        assert_eq!(format_double(1e15, 14), "1.0E+15");
        assert_eq!(format_double(1e25, -1), "1.0E+25");
        assert_eq!(format_double(123456.0, 14), "123456");
        assert_eq!(format_double(-1.5e-7, 14), "-1.5E-7");
        assert_eq!(format_double(0.0001, 14), "0.0001");
        assert_eq!(format_double(f64::INFINITY, 14), "INF");
        assert_eq!(format_double(-0.0, 14), "-0");
    }

    #[test]
    fn test_loose_eq_php8() {
        assert!(Value::Long(0).loose_eq(&Value::Bool(false)));
        assert!(s("1").loose_eq(&Value::Long(1)));
        assert!(s("1.0").loose_eq(&s("1")));
        assert!(Value::Null.loose_eq(&s("")));
        // PHP 8: non-numeric strings no longer equal 0
        assert!(!Value::Long(0).loose_eq(&s("a")));
    }

    #[test]
    fn test_strict_eq() {
        assert!(!Value::Long(1).strict_eq(&Value::Double(1.0)));
        assert!(!s("1").strict_eq(&Value::Long(1)));
        let obj = ObjectRef::new(PhpObject::new("stdClass"));
        let other = ObjectRef::new(PhpObject::new("stdClass"));
        assert!(Value::Object(obj.clone()).strict_eq(&Value::Object(obj.clone())));
        assert!(!Value::Object(obj.clone()).strict_eq(&Value::Object(other.clone())));
        assert!(Value::Object(obj).loose_eq(&Value::Object(other)));
    }

    #[test]
    fn test_comparison() {
        assert!(Value::Long(1).is_smaller(&Value::Double(1.5)));
        assert!(s("abc").is_smaller(&s("abd")));
        assert!(s("10").compare(&s("9")) == Some(Ordering::Greater));
        assert_eq!(Value::Long(2).spaceship(&Value::Long(1)), 1);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(Value::Long(2).add(&Value::Long(3)), Ok(Value::Long(5)));
        assert_eq!(
            Value::Double(1.5).add(&Value::Long(2)),
            Ok(Value::Double(3.5))
        );
        assert_eq!(
            Value::Long(i64::MAX).add(&Value::Long(1)),
            Ok(Value::Double(i64::MAX as f64 + 1.0))
        );
        assert_eq!(Value::Long(10).div(&Value::Long(4)), Ok(Value::Double(2.5)));
        assert_eq!(Value::Long(10).div(&Value::Long(5)), Ok(Value::Long(2)));
        assert_eq!(
            Value::Long(1).div(&Value::Long(0)),
            Err(OperatorError::DivisionByZero)
        );
        assert_eq!(
            Value::Long(1).modulo(&Value::Long(0)),
            Err(OperatorError::ModuloByZero)
        );
        assert_eq!(Value::Long(2).pow(&Value::Long(10)), Ok(Value::Long(1024)));
    }

    #[test]
    fn test_unsupported_operands() {
        let err = Value::Array(PhpArray::new())
            .add(&Value::Long(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported operand types: array + int");

        let err = s("abc").mul(&Value::Long(1)).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported operand types: string * int");
        assert_eq!(s("5 apples").add(&Value::Long(1)), Ok(Value::Long(6)));
    }

    #[test]
    fn test_increment() {
        assert_eq!(Value::Long(5).increment(), Value::Long(6));
        assert_eq!(Value::Null.increment(), Value::Long(1));
        assert_eq!(s("a").increment(), s("b"));
        assert_eq!(s("Az").increment(), s("Ba"));
        assert_eq!(s("zz").increment(), s("aaa"));
        assert_eq!(Value::Null.decrement(), Value::Null);
    }

    #[test]
    fn test_array_keys_normalise() {
        let mut arr = PhpArray::new();
        arr.insert(ArrayKey::from_string("5"), Value::Long(1));
        arr.insert(ArrayKey::from_string("05"), Value::Long(2));
        arr.push(Value::Long(3));
        assert_eq!(arr.get_int(5), Some(&Value::Long(1)));
        assert_eq!(arr.get_str("05"), Some(&Value::Long(2)));
        assert_eq!(arr.get_int(6), Some(&Value::Long(3)));
        assert!(!arr.is_list());
    }

    #[test]
    fn test_array_remove_keeps_order() {
        let mut arr: PhpArray = [Value::Long(1), Value::Long(2), Value::Long(3)]
            .into_iter()
            .collect();
        arr.remove(&ArrayKey::Int(1));
        let keys: Vec<_> = arr.keys().cloned().collect();
        assert_eq!(keys, vec![ArrayKey::Int(0), ArrayKey::Int(2)]);
        arr.push(Value::Long(4));
        assert_eq!(arr.get_int(3), Some(&Value::Long(4)));
    }

    #[test]
    fn test_array_union() {
        let a: PhpArray = [Value::Long(1)].into_iter().collect();
        let b: PhpArray = [Value::Long(9), Value::Long(2)].into_iter().collect();
        let u = a.union(&b);
        assert_eq!(u.len(), 2);
        assert_eq!(u.get_int(0), Some(&Value::Long(1)));
    }

    #[test]
    fn test_object_handles_are_shared() {
        let obj = ObjectRef::new(PhpObject::new("stdClass"));
        let alias = Value::Object(obj.clone());
        obj.borrow_mut().set_property("a", Value::Long(1));
        match alias {
            Value::Object(o) => assert_eq!(o.borrow().get_property("a"), Some(&Value::Long(1))),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric_str("42"));
        assert!(is_numeric_str(" 4.2e1 "));
        assert!(!is_numeric_str("42abc"));
        assert!(!is_numeric_str("."));
    }
}
